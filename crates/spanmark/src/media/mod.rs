//! Video playback: decode pipeline, frame retention, GPU hand-off and the
//! controller that ties them to the UI loop.

pub mod error;
pub mod pipeline;
pub mod ring;
pub mod session;
pub mod texture;
pub mod types;
pub mod video;

pub use error::PlaybackError;
pub use session::PlaybackSession;
pub use texture::GpuShare;
pub use video::PipelineOptions;
