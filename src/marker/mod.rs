pub mod adapter;
pub mod detection;

pub use adapter::{JsonMarkerDetector, MarkerAdapter, MarkerDetector};
pub use detection::{Corner, RawCorner, RawDetection, TagDetection};
