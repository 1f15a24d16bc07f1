//! Command-line and environment configuration of the coprocessor.

use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use dsvision::core_modules::target_detector::{DetectorConfig, TargetCategory};
use dsvision::{DisplayMode, GearSource, LoopConfig, RetryPolicy};
use serde::Deserialize;

/// Ports the field network leaves open for camera streams.
pub const STREAM_PORT_RANGE: RangeInclusive<u16> = 1180..=1190;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Reads the camera's MJPEG stream over HTTP.
    Mjpeg,
    /// Opens the camera through OpenCV `VideoCapture`.
    Opencv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GearSourceArg {
    Gear,
    Tape,
}

impl From<GearSourceArg> for GearSource {
    fn from(arg: GearSourceArg) -> Self {
        match arg {
            GearSourceArg::Gear => GearSource::Gear,
            GearSourceArg::Tape => GearSource::Tape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisplayArg {
    Input,
    Hsv,
}

impl From<DisplayArg> for DisplayMode {
    fn from(arg: DisplayArg) -> Self {
        match arg {
            DisplayArg::Input => DisplayMode::Input,
            DisplayArg::Hsv => DisplayMode::Hsv,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "dsvision")]
#[command(about = "Tracks retro-reflective tape and gear markers and publishes their positions to the robot")]
#[command(version)]
pub struct Cli {
    /// Team number; also determines the fallback camera address.
    #[arg(long, env = "DSV_TEAM", default_value_t = 5957)]
    pub team: u16,

    /// Name the camera registers under in the CameraPublisher table.
    #[arg(long, env = "DSV_CAMERA_NAME", default_value = "Axis 5957")]
    pub camera_name: String,

    /// Camera URL used when discovery finds nothing usable. Defaults to the
    /// team's Axis camera at 10.TE.AM.19.
    #[arg(long, env = "DSV_FALLBACK_URL")]
    pub fallback_url: Option<String>,

    #[arg(long, env = "DSV_BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: IpAddr,

    /// Port of the raw camera relay.
    #[arg(long, env = "DSV_RAW_PORT", default_value_t = 1185)]
    pub raw_port: u16,

    /// Port of the annotated output stream.
    #[arg(long, env = "DSV_ANNOTATED_PORT", default_value_t = 1186)]
    pub annotated_port: u16,

    /// Port of the telemetry table endpoint.
    #[arg(long, env = "DSV_TABLE_PORT", default_value_t = 5800)]
    pub table_port: u16,

    #[arg(long, env = "DSV_WIDTH", default_value_t = 640)]
    pub width: u32,

    #[arg(long, env = "DSV_HEIGHT", default_value_t = 480)]
    pub height: u32,

    /// Output frame rate; one frame interval bounds each acquisition.
    #[arg(long, env = "DSV_FPS", default_value_t = 30)]
    pub fps: u32,

    #[arg(long, env = "DSV_JPEG_QUALITY", default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Delay between camera registry polls.
    #[arg(long, env = "DSV_DISCOVERY_INTERVAL_MS", default_value_t = 500)]
    pub discovery_interval_ms: u64,

    /// Give up waiting for camera registrations after this many polls.
    /// Unset means wait forever, which is what a robot that boots after the
    /// coprocessor needs.
    #[arg(long, env = "DSV_DISCOVERY_MAX_ATTEMPTS")]
    pub discovery_max_attempts: Option<usize>,

    /// Skip discovery and connect to the fallback URL directly.
    #[arg(long, env = "DSV_SKIP_DISCOVERY")]
    pub skip_discovery: bool,

    /// Which detector feeds the Gear telemetry and annotation.
    #[arg(long, env = "DSV_GEAR_SOURCE", value_enum, default_value_t = GearSourceArg::Gear)]
    pub gear_source: GearSourceArg,

    /// What the annotated stream shows under the boxes.
    #[arg(long, env = "DSV_DISPLAY", value_enum, default_value_t = DisplayArg::Input)]
    pub display: DisplayArg,

    /// JSON file overriding the tape and/or gear detector parameters.
    #[arg(long, env = "DSV_DETECTORS")]
    pub detectors: Option<PathBuf>,

    #[arg(long, env = "DSV_BACKEND", value_enum, default_value_t = Backend::Mjpeg)]
    pub backend: Backend,
}

/// Contents of the `--detectors` file. Either category may be left out.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorOverrides {
    pub tape: Option<DetectorConfig>,
    pub gear: Option<DetectorConfig>,
}

impl DetectorOverrides {
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        let overrides: Self = serde_json::from_str(json).context("parsing detector overrides")?;
        if let Some(tape) = &overrides.tape {
            if tape.category != TargetCategory::Tape {
                bail!("the tape entry must have category \"tape\"");
            }
        }
        if let Some(gear) = &overrides.gear {
            if gear.category != TargetCategory::Gear {
                bail!("the gear entry must have category \"gear\"");
            }
        }
        Ok(overrides)
    }
}

/// Fully resolved and validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub camera_name: String,
    pub fallback_url: String,
    pub raw_addr: SocketAddr,
    pub annotated_addr: SocketAddr,
    pub table_addr: SocketAddr,
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
    pub discovery: RetryPolicy,
    pub skip_discovery: bool,
    pub backend: Backend,
    pub pipeline: LoopConfig,
}

/// Axis camera address on the field network: 10.TE.AM.19.
pub fn team_camera_url(team: u16) -> String {
    format!(
        "http://10.{}.{}.19/axis-cgi/mjpg/video.cgi",
        team / 100,
        team % 100
    )
}

impl Cli {
    pub fn settings(&self) -> anyhow::Result<Settings> {
        for (flag, port) in [("--raw-port", self.raw_port), ("--annotated-port", self.annotated_port)] {
            if !STREAM_PORT_RANGE.contains(&port) {
                bail!(
                    "{flag} {port} is outside the permitted stream ports {}-{}",
                    STREAM_PORT_RANGE.start(),
                    STREAM_PORT_RANGE.end()
                );
            }
        }
        if self.raw_port == self.annotated_port {
            bail!("--raw-port and --annotated-port must differ");
        }
        if self.width == 0 || self.height == 0 {
            bail!("frame size must be non-zero, got {}x{}", self.width, self.height);
        }
        if self.fps == 0 {
            bail!("--fps must be at least 1");
        }
        if self.discovery_max_attempts == Some(0) {
            bail!("--discovery-max-attempts must be at least 1 when set");
        }

        let overrides = match &self.detectors {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                DetectorOverrides::parse(&json)
                    .with_context(|| format!("in {}", path.display()))?
            }
            None => DetectorOverrides::default(),
        };

        let pipeline = LoopConfig {
            width: self.width,
            height: self.height,
            tape: overrides.tape.unwrap_or_else(DetectorConfig::tape),
            gear: overrides.gear.unwrap_or_else(DetectorConfig::gear),
            gear_source: self.gear_source.into(),
            display: self.display.into(),
        };
        pipeline.tape.validate()?;
        pipeline.gear.validate()?;

        let interval = Duration::from_millis(self.discovery_interval_ms);
        Ok(Settings {
            camera_name: self.camera_name.clone(),
            fallback_url: self
                .fallback_url
                .clone()
                .unwrap_or_else(|| team_camera_url(self.team)),
            raw_addr: SocketAddr::new(self.bind_host, self.raw_port),
            annotated_addr: SocketAddr::new(self.bind_host, self.annotated_port),
            table_addr: SocketAddr::new(self.bind_host, self.table_port),
            frame_interval: Duration::from_secs(1) / self.fps,
            jpeg_quality: self.jpeg_quality,
            discovery: match self.discovery_max_attempts {
                Some(limit) => RetryPolicy::bounded(interval, limit),
                None => RetryPolicy::unbounded(interval),
            },
            skip_discovery: self.skip_discovery,
            backend: self.backend,
            pipeline,
        })
    }
}
