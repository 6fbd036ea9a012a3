//! Transport state, engine events and module information.

use super::traits::ModuleDecoder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Current state of playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlaybackState {
    /// No module loaded
    Idle = 0,
    /// Module loaded, never started
    Loaded = 1,
    /// Currently playing
    Playing = 2,
    /// Paused, position retained
    Paused = 3,
    /// Stopped, position reset to the start
    Stopped = 4,
    /// Module played to its natural end
    Ended = 5,
}

impl PlaybackState {
    /// Check if playback is active
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Check if playback can be started/resumed
    pub const fn can_play(self) -> bool {
        matches!(
            self,
            Self::Loaded | Self::Paused | Self::Stopped | Self::Ended
        )
    }

    /// Check if playback can be paused
    pub const fn can_pause(self) -> bool {
        matches!(self, Self::Playing)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loaded,
            2 => Self::Playing,
            3 => Self::Paused,
            4 => Self::Stopped,
            5 => Self::Ended,
            _ => Self::Idle,
        }
    }
}

/// Lock-free cell holding a [`PlaybackState`].
#[derive(Debug)]
pub(crate) struct AtomicPlaybackState(AtomicU8);

impl AtomicPlaybackState {
    pub(crate) const fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: PlaybackState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Replace `from` with `to`, leaving any other state untouched.
    pub(crate) fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A module was loaded
    Loaded(ModuleInfo),
    /// The module was unloaded
    Unloaded,
    /// Playback started or resumed
    Started,
    /// Playback paused
    Paused,
    /// Playback stopped and rewound
    Stopped,
    /// The module reached its natural end
    EndOfTrack,
    /// The transport closed the stream after an unrecoverable error
    StreamLost(String),
    /// A replacement stream was opened after a transport error
    StreamRecovered,
}

/// Metadata keys queried for [`ModuleInfo`].
pub mod keys {
    /// Module title
    pub const TITLE: &str = "title";
    /// Module author
    pub const ARTIST: &str = "artist";
    /// Short format name, e.g. `xm`
    pub const TYPE: &str = "type";
    /// Long format name, e.g. `FastTracker 2`
    pub const TYPE_LONG: &str = "type_long";
    /// Tracker that wrote the module
    pub const TRACKER: &str = "tracker";
    /// Song message / comments
    pub const MESSAGE: &str = "message";
}

/// Snapshot of a loaded module's metadata and structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module title
    pub title: String,
    /// Module author
    pub artist: String,
    /// Short format name, e.g. `it`, `xm`, `mod`, `s3m`
    pub module_type: String,
    /// Long format name
    pub type_long: String,
    /// Tracker used to create the module
    pub tracker: String,
    /// Song message / comments
    pub message: String,
    /// Estimated duration in seconds
    pub duration_seconds: f64,
    /// Number of channels
    pub num_channels: i32,
    /// Number of patterns
    pub num_patterns: i32,
    /// Number of orders in the sequence
    pub num_orders: i32,
    /// Number of instruments
    pub num_instruments: i32,
    /// Number of samples
    pub num_samples: i32,
}

impl ModuleInfo {
    pub(crate) fn from_decoder<D: ModuleDecoder + ?Sized>(decoder: &D) -> Self {
        let text = |key: &str| decoder.metadata(key).unwrap_or_default();

        Self {
            title: text(keys::TITLE),
            artist: text(keys::ARTIST),
            module_type: text(keys::TYPE),
            type_long: text(keys::TYPE_LONG),
            tracker: text(keys::TRACKER),
            message: text(keys::MESSAGE),
            duration_seconds: decoder.duration_seconds(),
            num_channels: decoder.num_channels(),
            num_patterns: decoder.num_patterns(),
            num_orders: decoder.num_orders(),
            num_instruments: decoder.num_instruments(),
            num_samples: decoder.num_samples(),
        }
    }
}
