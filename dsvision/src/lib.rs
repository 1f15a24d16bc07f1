// THEORY:
// This file is the main entry point for the `dsvision` library crate.
// It exports the `ProcessingLoop` and the boundary traits it is generic over
// (`FrameSource`, `TelemetryPublisher`, `StreamSink`), plus the telemetry table
// and camera discovery used at startup. Network transports live in the
// `dsvision_streamer` crate; process wiring lives in the `dsvision` binary.

pub mod core_modules;
pub mod pipeline;

pub use core_modules::candidate::{BoundingBox, Candidate, DetectionResult, ExtractError};
pub use core_modules::frame::{Frame, FrameBuffers, HsvFrame};
pub use core_modules::registry::{
    CameraEndpoint, CameraRegistry, RegistryError, RetryError, RetryPolicy, discover_camera,
};
pub use core_modules::selector::{GearReading, GearSource, NOT_DETECTED, TapeSelection};
pub use core_modules::source::{Acquire, FrameSource, StreamSink};
pub use core_modules::target_detector::{DetectorConfig, TargetCategory, TargetDetector};
pub use core_modules::telemetry::{NetworkTable, SubTable, TelemetryPublisher};
pub use core_modules::utils::image_helper::image_helper::{EncodeError, decode_jpeg_into, encode_jpeg};
pub use pipeline::{CycleOutcome, CycleReport, DisplayMode, LoopConfig, LoopStats, ProcessingLoop};
