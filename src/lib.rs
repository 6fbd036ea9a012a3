// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)] // Duplicate match arms

// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains

// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`

// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_safety_doc)] // Docs for `unsafe` functions
#![warn(missing_docs)]

//! # mod_player
//!
//! A real-time playback engine for tracker music modules (MOD, XM, S3M, IT and
//! friends).
//!
//! The engine owns one module decoder and one pull-based output stream. The
//! stream's real-time thread calls back into the engine for audio while any
//! other thread drives the transport: load, play, pause, stop, seek, and the
//! playback parameters (repeat count, gain, stereo separation, tempo, pitch).
//!
//! Format parsing and the audio device are both capabilities supplied by the
//! caller:
//!
//! - [`DecoderFactory`] / [`ModuleDecoder`]: builds a decoder from module bytes
//!   and renders interleaved stereo `f32` frames
//! - [`OutputBackend`] / [`OutputStream`]: opens a stereo `f32` output stream
//!   that pulls from a [`RenderCallback`]
//!
//! Enable the `cpal` feature for [`CpalBackend`], an output backend on the
//! platform's default audio host.
//!
//! ## Error Handling
//!
//! Operations that can fail return [`PlaybackResult`]:
//!
//! ```rust,ignore
//! use mod_player::PlaybackError;
//!
//! match engine.play() {
//!     Ok(()) => {}
//!     Err(PlaybackError::NoModuleLoaded) => eprintln!("load something first"),
//!     Err(err) if err.is_stream_error() => eprintln!("audio device problem: {err}"),
//!     Err(err) => eprintln!("playback failed: {err}"),
//! }
//! ```
//!
//! Queries never fail. With nothing loaded they return neutral values: `-1`
//! for order/pattern/row, `0` for counts, `0.0` for position and duration,
//! `1.0` for tempo and pitch factors and an empty string for metadata.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and installs no subscriber; attach one in
//! the application to see them.
//!
//! ## Events
//!
//! [`Engine::events`] returns a receiver of [`PlaybackEvent`]s (start, pause,
//! stop, end of track, stream loss and recovery). The queue is bounded and
//! never blocks the audio thread.

mod config;
mod error;
pub mod playback;

#[cfg(test)]
mod test_support;

pub use crate::config::{DEFAULT_EVENT_CAPACITY, DEFAULT_SAMPLE_RATE, EngineConfig};
pub use crate::error::{PlaybackError, PlaybackResult};
pub use crate::playback::{
    CHANNEL_COUNT, CallbackResult, Control, DecoderFactory, Direction, Engine, ModuleDecoder,
    ModuleInfo, NEUTRAL_FACTOR, OutputBackend, OutputStream, PerformanceMode, PlaybackEvent,
    PlaybackState, RenderCallback, RenderParam, SampleFormat, SharingMode, StreamConfig,
};
pub use crate::playback::state::keys as metadata_keys;

#[cfg(feature = "cpal")]
pub use crate::playback::{CpalBackend, CpalStream};
