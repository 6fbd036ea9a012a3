//! Engine configuration.

use crate::playback::traits::{
    CHANNEL_COUNT, Direction, PerformanceMode, SampleFormat, SharingMode, StreamConfig,
};
use serde::{Deserialize, Serialize};

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default depth of the engine event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate the decoder renders at
    pub sample_rate: u32,

    /// Transport latency preference
    pub performance_mode: PerformanceMode,

    /// Device sharing preference
    pub sharing_mode: SharingMode,

    /// Callback size in frames (None = transport default)
    pub buffer_frames: Option<u32>,

    /// Preferred output device (None = use default)
    pub preferred_device: Option<String>,

    /// Whether to reopen the stream after an unrecoverable transport error
    pub recreate_on_error: bool,

    /// Maximum number of undelivered engine events
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            performance_mode: PerformanceMode::LowLatency,
            sharing_mode: SharingMode::Exclusive,
            buffer_frames: None,
            preferred_device: None,
            recreate_on_error: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create configuration that trades latency for fewer wakeups
    pub fn power_saving() -> Self {
        Self {
            performance_mode: PerformanceMode::PowerSaving,
            sharing_mode: SharingMode::Shared,
            buffer_frames: Some(2048),
            ..Self::default()
        }
    }

    /// Set output sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set callback size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = Some(frames);
        self
    }

    /// Set preferred device
    pub fn with_device(mut self, device_name: impl Into<String>) -> Self {
        self.preferred_device = Some(device_name.into());
        self
    }

    /// Enable or disable stream recreation after transport errors
    pub fn with_recreate_on_error(mut self, enable: bool) -> Self {
        self.recreate_on_error = enable;
        self
    }

    /// Set event queue depth (at least 1)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Stream parameters handed to the output backend.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            direction: Direction::Output,
            performance_mode: self.performance_mode,
            sharing_mode: self.sharing_mode,
            sample_format: SampleFormat::F32,
            channels: CHANNEL_COUNT as u16,
            sample_rate: self.sample_rate,
            buffer_frames: self.buffer_frames,
            device: self.preferred_device.clone(),
        }
    }
}
