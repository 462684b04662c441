use std::path::PathBuf;

use thiserror::Error;

use super::types::FrameMemory;

/// Failures surfaced by a playback session.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The pipeline never reached a ready state. Missing files, bad codecs and
    /// failed GPU context negotiation all land here.
    #[error("failed to open {}: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },

    #[error("pipeline rejected seek to {target:.3}s")]
    SeekRejected { target: f64 },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl PlaybackError {
    pub fn open_failed(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        PlaybackError::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors reported by a decode pipeline backend.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn decoder: {0}")]
    Spawn(String),

    #[error("failed to probe media: {0}")]
    Probe(String),

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("decoder error: {0}")]
    Decode(String),

    #[error("decode worker disconnected")]
    Disconnected,
}

/// Errors from handing a frame to the GPU.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge cannot display {0:?}-resident frames")]
    UnsupportedMemory(FrameMemory),

    #[error("frame payload is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}
