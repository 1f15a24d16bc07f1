pub mod annotator;
pub mod candidate;
pub mod contour;
pub mod frame;
pub mod pixel;
pub mod registry;
pub mod selector;
pub mod source;
pub mod target_detector;
pub mod telemetry;
pub mod utils;
