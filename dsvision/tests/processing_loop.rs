use dsvision::core_modules::selector::{TAPE_ONE_KEY, TAPE_TWO_KEY, gear_key};
use dsvision::core_modules::telemetry::TableValue;
use dsvision::{
    Acquire, CycleOutcome, DetectorConfig, Frame, FrameSource, GearSource, LoopConfig, NetworkTable,
    ProcessingLoop, StreamSink, TelemetryPublisher,
};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 220, 0]);
const GREY: Rgb<u8> = Rgb([90, 90, 90]);

/// Plays back a fixed script; `None` entries and an exhausted script yield `Empty`.
struct ScriptedSource {
    script: VecDeque<Option<RgbImage>>,
}

impl ScriptedSource {
    fn new(script: impl IntoIterator<Item = Option<RgbImage>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn acquire(&mut self, frame: &mut Frame) -> Acquire {
        match self.script.pop_front().flatten() {
            Some(image) => {
                frame.overwrite_from(&image);
                Acquire::Frame
            }
            None => Acquire::Empty,
        }
    }
}

#[derive(Clone, Default)]
struct Recorder {
    writes: Rc<RefCell<Vec<(String, f64)>>>,
}

impl Recorder {
    fn take(&self) -> Vec<(String, f64)> {
        std::mem::take(&mut *self.writes.borrow_mut())
    }
}

impl TelemetryPublisher for Recorder {
    fn publish(&mut self, name: &str, value: f64) {
        self.writes.borrow_mut().push((name.to_string(), value));
    }
}

#[derive(Clone, Default)]
struct CapturingSink {
    frames: Rc<RefCell<Vec<Frame>>>,
}

impl StreamSink for CapturingSink {
    fn stream(&mut self, frame: &Frame) {
        self.frames.borrow_mut().push(frame.clone());
    }
}

fn scene(rects: &[(i32, i32, u32, u32, Rgb<u8>)]) -> RgbImage {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, GREY);
    for &(x, y, w, h, color) in rects {
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), color);
    }
    image
}

fn config() -> LoopConfig {
    let mut tape = DetectorConfig::tape();
    tape.filter.min_area = 0.0;
    tape.filter.min_perimeter = 0.0;
    LoopConfig {
        width: WIDTH,
        height: HEIGHT,
        tape,
        ..LoopConfig::default()
    }
}

fn recording_loop(
    config: LoopConfig,
    source: ScriptedSource,
) -> (
    ProcessingLoop<ScriptedSource, Recorder, CapturingSink>,
    Recorder,
    Recorder,
    CapturingSink,
) {
    let (tape, gear, sink) = (Recorder::default(), Recorder::default(), CapturingSink::default());
    let pipeline =
        ProcessingLoop::new(config, source, tape.clone(), gear.clone(), sink.clone()).unwrap();
    (pipeline, tape, gear, sink)
}

fn value(writes: &[(String, f64)], key: &str) -> Option<f64> {
    writes.iter().rev().find(|(name, _)| name == key).map(|(_, v)| *v)
}

#[test]
fn single_tape_fills_slot_one_and_sentinels_slot_two() {
    let source = ScriptedSource::new([Some(scene(&[(10, 10, 20, 30, GREEN)]))]);
    let (mut pipeline, tape, _, _) = recording_loop(config(), source);

    let CycleOutcome::Processed(report) = pipeline.run_cycle() else {
        panic!("expected a processed cycle");
    };
    assert_eq!(report.tape.one, Some(20));
    assert_eq!(report.tape.two, None);

    let writes = tape.take();
    assert_eq!(value(&writes, TAPE_ONE_KEY), Some(20.0));
    assert_eq!(value(&writes, TAPE_TWO_KEY), Some(-1.0));
}

#[test]
fn two_tapes_fill_both_slots_in_detector_order() {
    let source = ScriptedSource::new([Some(scene(&[
        (0, 0, 4, 4, GREEN),
        (100, 0, 10, 10, GREEN),
    ]))]);
    let (mut pipeline, tape, _, _) = recording_loop(config(), source);
    pipeline.run_cycle();

    let writes = tape.take();
    assert_eq!(value(&writes, TAPE_ONE_KEY), Some(2.0));
    assert_eq!(value(&writes, TAPE_TWO_KEY), Some(105.0));
}

#[test]
fn tape_leaving_the_left_edge_is_still_tracked() {
    let source = ScriptedSource::new([
        Some(scene(&[(0, 40, 6, 30, GREEN)])),
        Some(scene(&[(0, 40, 2, 30, GREEN)])),
    ]);
    let (mut pipeline, tape, _, _) = recording_loop(config(), source);

    pipeline.run_cycle();
    assert_eq!(value(&tape.take(), TAPE_ONE_KEY), Some(3.0));
    pipeline.run_cycle();
    let writes = tape.take();
    assert_eq!(value(&writes, TAPE_ONE_KEY), Some(1.0));
    assert_eq!(value(&writes, TAPE_TWO_KEY), Some(-1.0));
}

#[test]
fn no_tape_publishes_both_sentinels() {
    let source = ScriptedSource::new([Some(scene(&[]))]);
    let (mut pipeline, tape, gear, _) = recording_loop(config(), source);
    pipeline.run_cycle();

    assert_eq!(
        tape.take(),
        vec![(TAPE_ONE_KEY.to_string(), -1.0), (TAPE_TWO_KEY.to_string(), -1.0)]
    );
    assert!(gear.take().is_empty(), "no gear keys without gear candidates");
}

#[test]
fn empty_frames_write_nothing_and_leave_prior_values() {
    let table = NetworkTable::new();
    let root = table.sub_table("CameraPublisher");
    let source = ScriptedSource::new([
        Some(scene(&[(10, 10, 20, 30, GREEN), (60, 60, 12, 12, YELLOW)])),
        None,
        None,
        None,
    ]);
    let sink = CapturingSink::default();
    let mut pipeline = ProcessingLoop::new(
        config(),
        source,
        root.sub_table("Retrotape"),
        root.sub_table("Gear"),
        sink.clone(),
    )
    .unwrap();

    assert!(matches!(pipeline.run_cycle(), CycleOutcome::Processed(_)));
    let before = table.snapshot();
    assert_eq!(
        before["/CameraPublisher/Retrotape/Tape One Center"],
        TableValue::Number(20.0)
    );

    let mut updates = table.subscribe();
    for _ in 0..3 {
        assert_eq!(pipeline.run_cycle(), CycleOutcome::Skipped);
    }
    assert!(updates.try_recv().is_err(), "skipped cycles must not publish");
    assert_eq!(table.snapshot(), before);
    assert_eq!(sink.frames.borrow().len(), 1, "skipped cycles must not stream");

    let stats = pipeline.stats();
    assert_eq!((stats.cycles, stats.processed, stats.skipped), (4, 1, 3));
}

#[test]
fn gear_key_count_matches_gear_candidates() {
    let source = ScriptedSource::new([
        Some(scene(&[(10, 10, 12, 12, YELLOW), (60, 10, 12, 12, YELLOW), (110, 10, 12, 12, YELLOW)])),
        Some(scene(&[(10, 10, 12, 12, YELLOW)])),
        Some(scene(&[])),
    ]);
    let (mut pipeline, _, gear, _) = recording_loop(config(), source);

    let mut counts = Vec::new();
    for _ in 0..3 {
        pipeline.run_cycle();
        counts.push(gear.take());
    }

    assert_eq!(counts[0].len(), 3);
    assert_eq!(
        counts[0].iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
        vec![gear_key(0), gear_key(1), gear_key(2)]
    );
    assert_eq!(counts[1], vec![(gear_key(0), 16.0)]);
    assert!(counts[2].is_empty());
}

#[test]
fn gear_source_selects_which_detector_feeds_gear_keys() {
    let image = scene(&[(10, 10, 8, 30, GREEN), (60, 10, 8, 30, GREEN), (110, 60, 12, 12, YELLOW)]);

    let (mut from_gear, _, gear_keys, _) =
        recording_loop(config(), ScriptedSource::new([Some(image.clone())]));
    from_gear.run_cycle();
    assert_eq!(gear_keys.take(), vec![(gear_key(0), 116.0)]);

    let tape_sourced = LoopConfig {
        gear_source: GearSource::Tape,
        ..config()
    };
    let (mut from_tape, _, gear_keys, _) =
        recording_loop(tape_sourced, ScriptedSource::new([Some(image)]));
    from_tape.run_cycle();
    assert_eq!(gear_keys.take(), vec![(gear_key(0), 14.0), (gear_key(1), 64.0)]);
}

#[test]
fn gear_boxes_are_drawn_on_the_streamed_frame_only() {
    let image = scene(&[(40, 40, 20, 20, YELLOW)]);
    let (mut pipeline, _, _, sink) = recording_loop(config(), ScriptedSource::new([Some(image.clone())]));
    pipeline.run_cycle();

    let frames = sink.frames.borrow();
    assert_eq!(frames.len(), 1);
    let streamed = frames[0].image();
    assert_eq!(*streamed.get_pixel(40, 50), Rgb([0, 0, 0]));
    assert_eq!(*streamed.get_pixel(5, 5), GREY);
    assert_eq!(pipeline.buffers().input.image(), &image);
}
