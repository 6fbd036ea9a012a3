//! Error types for playback engine operations.

use std::path::PathBuf;

/// Playback-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// An operation that needs a module was called with nothing loaded
    #[error("No module loaded")]
    NoModuleLoaded,

    /// An operation that needs an output stream was called without one
    #[error("No audio output stream available")]
    NoStream,

    /// The decoder rejected the supplied module bytes
    #[error("Failed to load module: {0}")]
    Load(String),

    /// The module file could not be read
    #[error("Failed to read module file {path}: {source}")]
    Io {
        /// Path that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The transport refused to open a stream
    #[error("Failed to open output stream: {0}")]
    StreamOpen(String),

    /// A start/pause/stop request was rejected by the transport
    #[error("Stream {operation} failed: {details}")]
    StreamControl {
        /// The request that failed
        operation: &'static str,
        /// Transport-provided reason
        details: String,
    },

    /// The transport closed the stream after an unrecoverable error
    #[error("Stream lost: {0}")]
    StreamLost(String),

    /// Backend-specific errors (CPAL, etc.)
    #[error("Backend error: {backend} - {details}")]
    Backend {
        /// Backend name
        backend: &'static str,
        /// Backend-provided reason
        details: String,
    },
}

impl PlaybackError {
    /// Create a load error
    pub fn load(details: impl Into<String>) -> Self {
        Self::Load(details.into())
    }

    /// Create a stream open error
    pub fn stream_open(details: impl Into<String>) -> Self {
        Self::StreamOpen(details.into())
    }

    /// Create a stream control error for the given request
    pub fn stream_control(operation: &'static str, details: impl Into<String>) -> Self {
        Self::StreamControl {
            operation,
            details: details.into(),
        }
    }

    /// Create a stream lost error
    pub fn stream_lost(details: impl Into<String>) -> Self {
        Self::StreamLost(details.into())
    }

    /// Create a backend error
    pub fn backend(backend: &'static str, details: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            details: details.into(),
        }
    }

    /// Check if this error is a missing module or missing stream precondition
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::NoModuleLoaded | Self::NoStream)
    }

    /// Check if this error originated in the output transport
    pub const fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::StreamOpen(_)
                | Self::StreamControl { .. }
                | Self::StreamLost(_)
                | Self::Backend { .. }
        )
    }

    /// Check if a later call can be expected to succeed without reloading
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::NoStream
            | Self::StreamControl { .. }
            | Self::StreamLost(_)
            | Self::Backend { .. } => true,
            _ => false,
        }
    }
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Convert CPAL errors to PlaybackError
#[cfg(feature = "cpal")]
impl From<cpal::BuildStreamError> for PlaybackError {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::stream_open(format!("Failed to build stream: {}", err))
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::PlayStreamError> for PlaybackError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::stream_control("start", err.to_string())
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::PauseStreamError> for PlaybackError {
    fn from(err: cpal::PauseStreamError) -> Self {
        Self::stream_control("pause", err.to_string())
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::DevicesError> for PlaybackError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::backend("cpal", format!("Failed to enumerate devices: {}", err))
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::StreamError> for PlaybackError {
    fn from(err: cpal::StreamError) -> Self {
        Self::stream_lost(err.to_string())
    }
}
