//! Seam between the playback controller and whatever actually decodes video.
//!
//! A pipeline accepts commands synchronously and reports back through an
//! inbound [`PipelineEvent`] channel. The controller drains that channel once
//! per `update()`, so every flag transition becomes visible on the UI thread.

use std::time::Duration;

use super::error::PipelineError;
use super::types::{DecodedFrame, FrameMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Torn down. Worker threads are joined; no further events are sent.
    Null,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Flushing, accurate seek commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekRequest {
    /// Jump to `target` and keep playing forward to the end.
    To(Duration),
    /// Play the range `start..stop` in `direction`. `stop: None` means the end
    /// of the stream. Reverse ranges start at `stop` and run down to `start`.
    Range {
        direction: Direction,
        start: Duration,
        stop: Option<Duration>,
    },
}

/// Shared GPU resources a zero-copy pipeline needs before it can upload frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Device,
    Queue,
}

#[derive(Clone)]
pub enum SharedContext {
    Device(wgpu::Device),
    Queue(wgpu::Queue),
}

impl SharedContext {
    pub fn kind(&self) -> ContextKind {
        match self {
            SharedContext::Device(_) => ContextKind::Device,
            SharedContext::Queue(_) => ContextKind::Queue,
        }
    }
}

/// Notifications from the decode side.
pub enum PipelineEvent {
    /// A new frame reached the sink. The handler takes its own reference.
    Frame(DecodedFrame),
    /// The end of the current playback range was reached. This fires both for
    /// forward playback hitting the end and for reverse playback hitting the
    /// start; the pipeline has no separate start-of-stream signal.
    EndOfStream,
    Error(PipelineError),
    /// The pipeline cannot make progress until it is handed this context.
    NeedContext(ContextKind),
}

impl std::fmt::Debug for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::Frame(frame) => f.debug_tuple("Frame").field(&frame.pts()).finish(),
            PipelineEvent::EndOfStream => f.write_str("EndOfStream"),
            PipelineEvent::Error(e) => f.debug_tuple("Error").field(e).finish(),
            PipelineEvent::NeedContext(kind) => f.debug_tuple("NeedContext").field(kind).finish(),
        }
    }
}

/// Command surface of a decode pipeline. All methods must return promptly.
pub trait DecodePipeline: Send {
    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError>;

    fn query_duration(&self) -> Option<Duration>;

    /// Timestamp of the frame most recently delivered to the sink.
    fn query_position(&self) -> Option<Duration>;

    fn seek(&mut self, request: SeekRequest) -> Result<(), PipelineError>;

    /// Advance by `frames` frames in the current direction.
    fn step(&mut self, frames: u32) -> Result<(), PipelineError>;

    /// Contexts that must be provided before the pipeline counts as ready.
    fn required_contexts(&self) -> &[ContextKind] {
        &[]
    }

    fn set_context(&mut self, context: SharedContext) -> Result<(), PipelineError> {
        Err(PipelineError::Rejected(format!(
            "pipeline does not use a {:?} context",
            context.kind()
        )))
    }

    fn frame_memory(&self) -> FrameMemory {
        FrameMemory::Host
    }
}

pub fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Convert seconds to a `Duration`, saturating negatives and NaN to zero.
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_nan_seconds_saturate() {
        assert_eq!(duration_from_secs(-1.0), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs(1.5), Duration::from_millis(1500));
        assert!((secs(Duration::from_millis(250)) - 0.25).abs() < 1e-12);
    }
}
