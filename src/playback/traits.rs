//! Capability traits the engine is built against.
//!
//! The engine never parses tracker formats or talks to an audio device itself.
//! It drives a [`ModuleDecoder`] produced by a [`DecoderFactory`] and an
//! [`OutputStream`] opened through an [`OutputBackend`], and hands the backend a
//! [`RenderCallback`] to pull audio from.

use crate::error::{PlaybackError, PlaybackResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of interleaved channels the engine renders.
pub const CHANNEL_COUNT: usize = 2;

/// Floating-point controls understood by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Playback speed multiplier, pitch unchanged
    TempoFactor,
    /// Pitch multiplier, tempo unchanged
    PitchFactor,
}

impl Control {
    /// The decoder-side control key
    pub const fn key(self) -> &'static str {
        match self {
            Self::TempoFactor => "play.tempo_factor",
            Self::PitchFactor => "play.pitch_factor",
        }
    }
}

/// Render parameters forwarded to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderParam {
    /// Master gain in millibel (0 = unity)
    MasterGainMillibel(i32),
    /// Stereo separation in percent (0-200, 100 = unmodified)
    StereoSeparationPercent(i32),
}

/// A decoder owning exactly one loaded module.
///
/// Implementations are not required to be thread-safe; the engine serializes
/// every call behind its decoder mutex.
pub trait ModuleDecoder: Send {
    /// Render up to `out.len() / 2` interleaved stereo frames.
    ///
    /// Returns the number of frames written. Zero signals end of data.
    fn render_interleaved_stereo(&mut self, sample_rate: u32, out: &mut [f32]) -> usize;

    /// Current playback position in seconds
    fn position_seconds(&self) -> f64;

    /// Estimated module duration in seconds
    fn duration_seconds(&self) -> f64;

    /// Reposition playback. The decoder clamps out-of-range positions and
    /// returns the position actually applied.
    fn set_position_seconds(&mut self, seconds: f64) -> f64;

    /// Set repeat count: -1 infinite, 0 play once, n repeat n times
    fn set_repeat_count(&mut self, count: i32);

    /// Set a render parameter
    fn set_render_param(&mut self, param: RenderParam);

    /// Set a floating-point control
    fn set_control(&mut self, control: Control, value: f64);

    /// Read a floating-point control
    fn control(&self, control: Control) -> f64;

    /// Look up a metadata string such as `title` or `type_long`
    fn metadata(&self, key: &str) -> Option<String>;

    /// Current order index
    fn current_order(&self) -> i32;

    /// Pattern at the current order
    fn current_pattern(&self) -> i32;

    /// Row within the current pattern
    fn current_row(&self) -> i32;

    /// Number of channels in the module
    fn num_channels(&self) -> i32;

    /// Number of patterns
    fn num_patterns(&self) -> i32;

    /// Number of entries in the order list
    fn num_orders(&self) -> i32;

    /// Number of instruments
    fn num_instruments(&self) -> i32;

    /// Number of samples
    fn num_samples(&self) -> i32;
}

/// Constructs decoders from raw module bytes.
pub trait DecoderFactory: Send + Sync {
    /// Decoder type produced by this factory
    type Decoder: ModuleDecoder + 'static;

    /// Build a decoder for `bytes`, or reject malformed/unsupported input.
    fn create(&self, bytes: &[u8]) -> PlaybackResult<Self::Decoder>;
}

/// What the transport should do after a render callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    /// Keep calling the render callback
    Continue,
    /// Stop calling the render callback until restarted
    Stop,
}

/// Stream direction. Only output is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Playback to a device
    Output,
}

/// Transport performance hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PerformanceMode {
    /// No preference
    None,
    /// Favour battery life over latency
    PowerSaving,
    /// Lowest achievable latency
    #[default]
    LowLatency,
}

/// Device sharing preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SharingMode {
    /// Exclusive device access where supported
    #[default]
    Exclusive,
    /// Shared with other applications
    Shared,
}

/// Sample format delivered to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 32-bit float, interleaved
    F32,
}

/// Parameters for opening an output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Always [`Direction::Output`]
    pub direction: Direction,
    /// Latency / power preference
    pub performance_mode: PerformanceMode,
    /// Exclusive or shared device access
    pub sharing_mode: SharingMode,
    /// Always [`SampleFormat::F32`]
    pub sample_format: SampleFormat,
    /// Always [`CHANNEL_COUNT`]
    pub channels: u16,
    /// Fixed output sample rate
    pub sample_rate: u32,
    /// Requested callback size in frames, `None` lets the transport choose
    pub buffer_frames: Option<u32>,
    /// Output device name, `None` for the default device
    pub device: Option<String>,
}

/// The engine side of an output stream: render source and error sink.
pub trait RenderCallback: Send + Sync {
    /// Fill `out` with interleaved stereo samples.
    ///
    /// Runs on the transport's real-time thread and must return promptly.
    fn render(&self, out: &mut [f32]) -> CallbackResult;

    /// Notification that the transport hit an unrecoverable error and has
    /// already closed the stream.
    ///
    /// Transports deliver this from a thread of their choosing, never from
    /// inside one of the stream's `request_*` calls.
    fn on_error_after_close(&self, error: PlaybackError);
}

/// An open, pull-based output stream.
pub trait OutputStream: Send {
    /// Begin (or resume) invoking the render callback
    fn request_start(&mut self) -> PlaybackResult<()>;

    /// Suspend the render callback, keeping buffered state
    fn request_pause(&mut self) -> PlaybackResult<()>;

    /// Stop invoking the render callback
    fn request_stop(&mut self) -> PlaybackResult<()>;

    /// Release the stream. Safe to call more than once.
    fn close(&mut self);
}

/// Opens output streams.
pub trait OutputBackend: Send + Sync {
    /// Stream type produced by this backend
    type Stream: OutputStream + 'static;

    /// Open a stream that pulls audio from `callback` and reports
    /// unrecoverable errors to it.
    fn open(
        &self,
        config: &StreamConfig,
        callback: Arc<dyn RenderCallback>,
    ) -> PlaybackResult<Self::Stream>;
}
