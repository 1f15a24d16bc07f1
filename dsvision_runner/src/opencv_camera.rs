//! OpenCV `VideoCapture` frame source.

use anyhow::Context;
use dsvision::{Acquire, Frame, FrameSource, encode_jpeg};
use dsvision_streamer::FrameBus;
use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};

pub struct OpencvCamera {
    capture: VideoCapture,
    bgr: Mat,
    rgb: Mat,
    relay: FrameBus,
    jpeg_quality: u8,
    relay_buffer: Vec<u8>,
}

impl OpencvCamera {
    /// Opens the first URL that OpenCV accepts.
    pub fn open(urls: &[String], relay: FrameBus, jpeg_quality: u8) -> anyhow::Result<Self> {
        for url in urls {
            let capture = VideoCapture::from_file(url, videoio::CAP_ANY)
                .with_context(|| format!("opening {url}"))?;
            if capture.is_opened().unwrap_or(false) {
                tracing::info!(%url, "opencv capture opened");
                return Ok(Self {
                    capture,
                    bgr: Mat::default(),
                    rgb: Mat::default(),
                    relay,
                    jpeg_quality,
                    relay_buffer: Vec::new(),
                });
            }
            tracing::warn!(%url, "opencv could not open camera");
        }
        anyhow::bail!("no camera url could be opened with opencv")
    }

    fn read_into(&mut self, frame: &mut Frame) -> opencv::Result<bool> {
        if !self.capture.read(&mut self.bgr)? || self.bgr.empty() {
            return Ok(false);
        }
        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let size = self.rgb.size()?;
        let (width, height) = (size.width as u32, size.height as u32);
        let bytes = self.rgb.data_bytes()?;

        if (width, height) == (frame.width(), frame.height()) {
            frame.as_raw_mut().copy_from_slice(bytes);
        } else {
            let Some(image) = RgbImage::from_raw(width, height, bytes.to_vec()) else {
                return Ok(false);
            };
            frame.overwrite_from(&image);
        }
        Ok(true)
    }

    fn relay(&mut self, frame: &Frame) {
        match encode_jpeg(frame, self.jpeg_quality, &mut self.relay_buffer) {
            Ok(()) => {
                self.relay
                    .publish(frame.width(), frame.height(), self.relay_buffer.as_slice());
            }
            Err(err) => tracing::debug!("raw relay encode failed: {err}"),
        }
    }
}

impl FrameSource for OpencvCamera {
    fn acquire(&mut self, frame: &mut Frame) -> Acquire {
        match self.read_into(frame) {
            Ok(true) => {
                self.relay(frame);
                Acquire::Frame
            }
            Ok(false) => Acquire::Empty,
            Err(err) => {
                tracing::trace!("opencv read failed: {err}");
                Acquire::Empty
            }
        }
    }
}
