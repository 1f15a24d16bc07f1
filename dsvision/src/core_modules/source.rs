//! The frame input and output boundaries of the processing loop.

use crate::core_modules::frame::Frame;

/// Result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// A fresh frame was written into the buffer.
    Frame,
    /// Nothing usable arrived within one frame interval. The buffer content is
    /// unspecified and must not be processed.
    Empty,
}

/// Produces camera frames.
///
/// `acquire` must return within roughly one frame interval. Hardware hiccups
/// surface as `Acquire::Empty`, never as an error or an indefinite block.
pub trait FrameSource {
    fn acquire(&mut self, frame: &mut Frame) -> Acquire;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn acquire(&mut self, frame: &mut Frame) -> Acquire {
        (**self).acquire(frame)
    }
}

/// Consumes the annotated output frame. Fire-and-forget.
pub trait StreamSink {
    fn stream(&mut self, frame: &Frame);
}

impl<K: StreamSink + ?Sized> StreamSink for Box<K> {
    fn stream(&mut self, frame: &Frame) {
        (**self).stream(frame);
    }
}

/// A sink that drops every frame. Used when no output stream is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn stream(&mut self, _frame: &Frame) {}
}
