use dsvision::{EncodeError, Frame, StreamSink, encode_jpeg};

use crate::FrameBus;

/// Encodes each display frame as JPEG and publishes it on a `FrameBus`.
pub struct MjpegSink {
    bus: FrameBus,
    quality: u8,
    scratch: Vec<u8>,
    failures: u64,
}

impl MjpegSink {
    pub fn new(bus: FrameBus, quality: u8) -> Self {
        Self {
            bus,
            quality,
            scratch: Vec::new(),
            failures: 0,
        }
    }

    pub fn bus(&self) -> &FrameBus {
        &self.bus
    }

    fn encode_and_publish(&mut self, frame: &Frame) -> Result<(), EncodeError> {
        encode_jpeg(frame, self.quality, &mut self.scratch)?;
        self.bus
            .publish(frame.width(), frame.height(), self.scratch.as_slice());
        Ok(())
    }
}

impl StreamSink for MjpegSink {
    fn stream(&mut self, frame: &Frame) {
        if let Err(err) = self.encode_and_publish(frame) {
            self.failures += 1;
            // First failure and then every hundredth, so a bad encoder cannot flood the log.
            if self.failures % 100 == 1 {
                tracing::warn!(failures = self.failures, "dropping annotated frame: {err}");
            }
        }
    }
}
