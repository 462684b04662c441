pub mod overlay;
pub mod theme;
pub mod transport_bar;
pub mod video_view;

pub use overlay::EguiOverlay;
pub use transport_bar::{PlayerAction, TransportBar, TransportInfo};
pub use video_view::VideoView;
