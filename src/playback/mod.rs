//! Real-time playback of tracker modules.
//!
//! - [`traits`]: the decoder and output-transport capabilities the engine drives
//! - [`engine`]: control-plane operations (load, play, pause, stop, seek, queries)
//! - `render`: the pull callback run on the transport's real-time thread
//! - `stream`: output stream lifecycle and recovery after transport errors
//! - [`state`]: transport state, events and module information
//! - `devices`: cpal-backed output transport (feature `cpal`)
//!
//! # Example
//!
//! ```rust,ignore
//! use mod_player::{CpalBackend, Engine, EngineConfig};
//!
//! let engine = Engine::new(MyDecoderFactory, CpalBackend::new(), EngineConfig::default());
//! engine.load_from_path("space_debris.mod")?;
//! engine.set_repeat_count(-1);
//! engine.play()?;
//! ```

pub mod engine;
pub mod state;
pub mod traits;

mod render;
mod stream;

#[cfg(feature = "cpal")]
mod devices;

pub use engine::{Engine, NEUTRAL_FACTOR};
pub use state::{ModuleInfo, PlaybackEvent, PlaybackState};
pub use traits::{
    CHANNEL_COUNT, CallbackResult, Control, DecoderFactory, Direction, ModuleDecoder,
    OutputBackend, OutputStream, PerformanceMode, RenderCallback, RenderParam, SampleFormat,
    SharingMode, StreamConfig,
};

#[cfg(feature = "cpal")]
pub use devices::{CpalBackend, CpalStream};
