// THEORY:
// The `pipeline` module is the top-level API of the vision core. `ProcessingLoop`
// owns the reusable frame buffers, the two target detectors and the injected
// boundaries (frame source, telemetry publishers, stream sink), and runs the
// per-cycle stages strictly in sequence on one thread.
//
// A cycle either skips or runs to completion:
// - Skipped: the source produced nothing within a frame interval. No buffer is
//   processed, nothing is published or streamed, and the next acquisition starts
//   immediately. There is no extra sleep.
// - Processed: acquire, colour transform, detect, select, annotate, publish, stream.
//   Every per-candidate failure is absorbed inside the stage that meets it.
//
// No state crosses cycles other than the buffers themselves and the counters
// used for the heartbeat log.

use crate::core_modules::annotator::Annotator;
use crate::core_modules::candidate::DetectionResult;
use crate::core_modules::frame::{Frame, FrameBuffers, HsvFrame};
use crate::core_modules::pixel::pixel::convert_frame;
use crate::core_modules::selector::{
    GearReading, GearSource, TapeSelection, publish_gears, select_gears, select_tape,
};
use crate::core_modules::source::{Acquire, FrameSource, StreamSink};
use crate::core_modules::target_detector::{DetectorConfig, DetectorConfigError, TargetDetector};
use crate::core_modules::telemetry::TelemetryPublisher;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Processed cycles between heartbeat log lines.
const HEARTBEAT_INTERVAL: u64 = 30;
/// Weight of the newest sample in the smoothed frame rate.
const FPS_SMOOTHING: f64 = 0.1;

/// What the annotated output stream shows underneath the boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// The camera frame as acquired.
    #[default]
    Input,
    /// The HSV buffer, channels laid out the way an HSV image looks when a BGR
    /// viewer displays it.
    Hsv,
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(DisplayMode::Input),
            "hsv" => Ok(DisplayMode::Hsv),
            other => Err(format!("unknown display mode '{other}' (expected input or hsv)")),
        }
    }
}

/// Configuration for the ProcessingLoop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub width: u32,
    pub height: u32,
    pub tape: DetectorConfig,
    pub gear: DetectorConfig,
    #[serde(default)]
    pub gear_source: GearSource,
    #[serde(default)]
    pub display: DisplayMode,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            tape: DetectorConfig::tape(),
            gear: DetectorConfig::gear(),
            gear_source: GearSource::default(),
            display: DisplayMode::default(),
        }
    }
}

/// What one processed cycle selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub tape: TapeSelection,
    pub gear_centers: Vec<GearReading>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped,
    Processed(CycleReport),
}

/// Running counters for the heartbeat log.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub cycles: u64,
    pub processed: u64,
    pub skipped: u64,
    /// Exponentially smoothed processed-frame rate.
    pub fps: f64,
}

/// The main, top-level struct for the vision core.
pub struct ProcessingLoop<S, P, K> {
    config: LoopConfig,
    source: S,
    tape_publisher: P,
    gear_publisher: P,
    sink: K,
    buffers: FrameBuffers,
    tape_detector: TargetDetector,
    gear_detector: TargetDetector,
    annotator: Annotator,
    stats: LoopStats,
    last_processed: Option<Instant>,
}

impl<S, P, K> ProcessingLoop<S, P, K>
where
    S: FrameSource,
    P: TelemetryPublisher,
    K: StreamSink,
{
    pub fn new(
        config: LoopConfig,
        source: S,
        tape_publisher: P,
        gear_publisher: P,
        sink: K,
    ) -> Result<Self, DetectorConfigError> {
        let tape_detector = TargetDetector::new(config.tape, config.width, config.height)?;
        let gear_detector = TargetDetector::new(config.gear, config.width, config.height)?;
        Ok(Self {
            buffers: FrameBuffers::new(config.width, config.height),
            config,
            source,
            tape_publisher,
            gear_publisher,
            sink,
            tape_detector,
            gear_detector,
            annotator: Annotator::default(),
            stats: LoopStats::default(),
            last_processed: None,
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    pub fn tape_publisher(&self) -> &P {
        &self.tape_publisher
    }

    pub fn gear_publisher(&self) -> &P {
        &self.gear_publisher
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Runs cycles back to back until the process exits.
    pub fn run(mut self) -> ! {
        tracing::info!(
            width = self.config.width,
            height = self.config.height,
            gear_source = ?self.config.gear_source,
            display = ?self.config.display,
            "processing loop started"
        );
        loop {
            self.run_cycle();
        }
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;

        // Stage 1: Acquisition
        if self.source.acquire(&mut self.buffers.input) == Acquire::Empty {
            self.stats.skipped += 1;
            tracing::trace!(cycle = self.stats.cycles, "no frame available");
            return CycleOutcome::Skipped;
        }

        // Stage 2: Colour Transform and Display Copy
        convert_frame(&self.buffers.input, &mut self.buffers.hsv);
        match self.config.display {
            DisplayMode::Input => self.buffers.display.copy_from(&self.buffers.input),
            DisplayMode::Hsv => hsv_as_display(&self.buffers.hsv, &mut self.buffers.display),
        }

        // Stage 3: Detection and Selection
        let tape = self.tape_detector.detect_hsv(&self.buffers.hsv);
        let tape_selection = select_tape(&tape);
        let gear: DetectionResult = match self.config.gear_source {
            GearSource::Gear => self.gear_detector.detect_hsv(&self.buffers.hsv),
            GearSource::Tape => tape,
        };
        let gear_readings = select_gears(&gear);

        // Stage 4: Annotation
        self.annotator.annotate(&mut self.buffers.display, gear.candidates());

        // Stage 5: Publication
        tape_selection.publish(&mut self.tape_publisher);
        publish_gears(&gear_readings, &mut self.gear_publisher);
        self.sink.stream(&self.buffers.display);

        self.record_processed();
        CycleOutcome::Processed(CycleReport {
            tape: tape_selection,
            gear_centers: gear_readings,
        })
    }

    fn record_processed(&mut self) {
        let now = Instant::now();
        if let Some(previous) = self.last_processed.replace(now) {
            let elapsed = now.duration_since(previous).as_secs_f64();
            if elapsed > 0.0 {
                let sample = 1.0 / elapsed;
                self.stats.fps = if self.stats.fps == 0.0 {
                    sample
                } else {
                    self.stats.fps + FPS_SMOOTHING * (sample - self.stats.fps)
                };
            }
        }
        self.stats.processed += 1;

        if self.stats.processed % HEARTBEAT_INTERVAL == 0 {
            tracing::debug!(
                cycles = self.stats.cycles,
                processed = self.stats.processed,
                skipped = self.stats.skipped,
                fps = self.stats.fps,
                "heartbeat"
            );
        }
    }
}

/// Lays (H, S, V) into (B, G, R) of the display frame.
fn hsv_as_display(hsv: &HsvFrame, display: &mut Frame) {
    for (out, pixel) in display
        .as_raw_mut()
        .chunks_exact_mut(3)
        .zip(hsv.as_raw().chunks_exact(3))
    {
        out[0] = pixel[2];
        out[1] = pixel[1];
        out[2] = pixel[0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::source::NullSink;
    use image::{Rgb, RgbImage};

    struct Still(Frame);

    impl FrameSource for Still {
        fn acquire(&mut self, frame: &mut Frame) -> Acquire {
            frame.copy_from(&self.0);
            Acquire::Frame
        }
    }

    struct Discard;

    impl TelemetryPublisher for Discard {
        fn publish(&mut self, _name: &str, _value: f64) {}
    }

    fn small_config() -> LoopConfig {
        LoopConfig {
            width: 32,
            height: 24,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn hsv_display_swaps_channels() {
        let mut hsv = HsvFrame::new(1, 1);
        hsv.as_raw_mut().copy_from_slice(&[10, 20, 30]);
        let mut display = Frame::new(1, 1);
        hsv_as_display(&hsv, &mut display);
        assert_eq!(display.as_raw(), &[30, 20, 10]);
    }

    #[test]
    fn stats_count_processed_cycles() {
        let still = Still(Frame::from_image(RgbImage::from_pixel(32, 24, Rgb([1, 2, 3]))));
        let mut pipeline =
            ProcessingLoop::new(small_config(), still, Discard, Discard, NullSink).unwrap();
        for _ in 0..3 {
            assert!(matches!(pipeline.run_cycle(), CycleOutcome::Processed(_)));
        }
        let stats = pipeline.stats();
        assert_eq!((stats.cycles, stats.processed, stats.skipped), (3, 3, 0));
    }

    #[test]
    fn display_buffer_is_never_reallocated() {
        let still = Still(Frame::from_image(RgbImage::from_pixel(32, 24, Rgb([1, 2, 3]))));
        let mut pipeline =
            ProcessingLoop::new(small_config(), still, Discard, Discard, NullSink).unwrap();
        let input = pipeline.buffers().input.as_raw().as_ptr();
        let display = pipeline.buffers().display.as_raw().as_ptr();
        pipeline.run_cycle();
        pipeline.run_cycle();
        assert_eq!(pipeline.buffers().input.as_raw().as_ptr(), input);
        assert_eq!(pipeline.buffers().display.as_raw().as_ptr(), display);
    }

    #[test]
    fn invalid_detector_config_is_rejected() {
        let mut config = small_config();
        config.gear.filter.min_width = 50;
        config.gear.filter.max_width = 10;
        let still = Still(Frame::new(32, 24));
        assert!(ProcessingLoop::new(config, still, Discard, Discard, NullSink).is_err());
    }

    #[test]
    fn display_mode_parses() {
        assert_eq!("HSV".parse::<DisplayMode>(), Ok(DisplayMode::Hsv));
        assert!("depth".parse::<DisplayMode>().is_err());
    }
}
