use anyhow::Context;
use clap::Parser;
use dsvision::core_modules::registry::CAMERA_PUBLISHER_TABLE;
use dsvision::core_modules::selector::{GEAR_TABLE, RETROTAPE_TABLE};
use dsvision::{CameraEndpoint, FrameSource, NetworkTable, ProcessingLoop, discover_camera};
use dsvision_streamer::{FrameBus, MjpegSink, start_mjpeg_server, start_table_server};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

mod camera;
mod config;
#[cfg(feature = "opencv")]
mod opencv_camera;

use camera::{MjpegCamera, MjpegCameraConfig};
use config::{Backend, Cli, Settings};

/// Frames buffered per stream bus before slow clients start skipping.
const STREAM_BUS_CAPACITY: usize = 4;
const CAMERA_REOPEN_DELAY: Duration = Duration::from_secs(1);
const CAMERA_STALL_TIMEOUT: Duration = Duration::from_secs(3);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_timer(fmt::time::Uptime::default())
        .try_init();
}

fn main() -> anyhow::Result<()> {
    // --- 1. Configuration & Logging ---
    let cli = Cli::parse();
    init_tracing();
    let settings = cli.settings().context("invalid configuration")?;
    tracing::info!(
        camera = %settings.camera_name,
        raw = %settings.raw_addr,
        annotated = %settings.annotated_addr,
        table = %settings.table_addr,
        "starting dsvision"
    );

    // --- 2. Network Boundaries ---
    // Servers run on the runtime's worker threads; the processing loop keeps the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building async runtime")?;
    let table = NetworkTable::new();
    let raw_bus = FrameBus::new(STREAM_BUS_CAPACITY);
    let annotated_bus = FrameBus::new(STREAM_BUS_CAPACITY);
    runtime.block_on(async {
        start_table_server(table.clone(), settings.table_addr).await?;
        start_mjpeg_server(raw_bus.clone(), settings.raw_addr).await?;
        start_mjpeg_server(annotated_bus.clone(), settings.annotated_addr).await?;
        anyhow::Ok(())
    })?;

    // --- 3. Camera Discovery ---
    let endpoint = if settings.skip_discovery {
        tracing::warn!(url = %settings.fallback_url, "discovery skipped, using fallback camera url");
        CameraEndpoint::Fallback(settings.fallback_url.clone())
    } else {
        discover_camera(
            &table,
            &settings.camera_name,
            &settings.fallback_url,
            settings.discovery,
        )
        .context("camera discovery")?
    };

    // --- 4. Frame Source ---
    let source = open_source(&settings, &endpoint, raw_bus)?;

    // --- 5. Processing Loop ---
    let publisher = table.sub_table(CAMERA_PUBLISHER_TABLE);
    let sink = MjpegSink::new(annotated_bus, settings.jpeg_quality);
    let pipeline = ProcessingLoop::new(
        settings.pipeline.clone(),
        source,
        publisher.sub_table(RETROTAPE_TABLE),
        publisher.sub_table(GEAR_TABLE),
        sink,
    )?;

    // Keeps the servers alive for as long as the loop runs, which is forever.
    let _runtime = runtime;
    pipeline.run()
}

fn open_source(
    settings: &Settings,
    endpoint: &CameraEndpoint,
    raw_bus: FrameBus,
) -> anyhow::Result<Box<dyn FrameSource>> {
    let urls = endpoint.urls();
    match settings.backend {
        Backend::Mjpeg => {
            let camera = MjpegCamera::spawn(
                MjpegCameraConfig {
                    urls,
                    frame_interval: settings.frame_interval,
                    reopen_delay: CAMERA_REOPEN_DELAY,
                    stall_timeout: CAMERA_STALL_TIMEOUT,
                },
                raw_bus,
            )?;
            Ok(Box::new(camera))
        }
        #[cfg(feature = "opencv")]
        Backend::Opencv => {
            let camera = opencv_camera::OpencvCamera::open(&urls, raw_bus, settings.jpeg_quality)?;
            Ok(Box::new(camera))
        }
        #[cfg(not(feature = "opencv"))]
        Backend::Opencv => {
            anyhow::bail!("the opencv backend needs a build with `--features opencv`")
        }
    }
}
