// THEORY:
// The `frame` module owns the raster types that flow through one processing cycle.
// A `Frame` is a fixed-resolution RGB8 image. An `HsvFrame` is the same raster
// re-expressed in the OpenCV 8-bit HSV convention (H 0..=179, S and V 0..=255).
//
// Key architectural principles:
// 1.  **Allocate Once**: `FrameBuffers` holds one buffer per named role (input,
//     hsv, display). They are created when the loop is built and overwritten in
//     place on every cycle. Nothing here grows or shrinks after construction.
// 2.  **Fixed Resolution**: Writers that receive a raster of a different size
//     (a camera that renegotiated its mode) resample into the existing buffer
//     instead of replacing it.
// 3.  **Dumb Containers**: These types only know how to copy bytes around.
//     Colour maths lives in `pixel`, detection in `target_detector`.

use image::{imageops, RgbImage};

/// One raster image captured from the camera this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Creates a black frame of the given resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Raw interleaved RGB bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// Overwrites this frame with `source`, resampling when the resolutions differ.
    /// The backing buffer is never reallocated.
    pub fn overwrite_from(&mut self, source: &RgbImage) {
        if source.dimensions() == self.image.dimensions() {
            self.as_raw_mut().copy_from_slice(source.as_raw());
        } else {
            let resized = imageops::resize(
                source,
                self.image.width(),
                self.image.height(),
                imageops::FilterType::Triangle,
            );
            self.as_raw_mut().copy_from_slice(resized.as_raw());
        }
    }

    /// Copies another frame of identical resolution into this one.
    pub fn copy_from(&mut self, other: &Frame) {
        self.overwrite_from(&other.image);
    }
}

/// A frame converted to HSV. Stored as three interleaved bytes per pixel: H, S, V.
#[derive(Debug, Clone, PartialEq)]
pub struct HsvFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl HsvFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The (h, s, v) triple at pixel (x, y).
    pub fn get(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let index = ((y * self.width + x) * 3) as usize;
        (self.data[index], self.data[index + 1], self.data[index + 2])
    }
}

/// The reusable per-role buffers of the processing loop.
#[derive(Debug)]
pub struct FrameBuffers {
    /// Written by the `FrameSource` each cycle.
    pub input: Frame,
    /// The colour-space transform of `input`, shared by both detectors.
    pub hsv: HsvFrame,
    /// The copy that gets annotated and streamed to operators.
    pub display: Frame,
}

impl FrameBuffers {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            input: Frame::new(width, height),
            hsv: HsvFrame::new(width, height),
            display: Frame::new(width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn overwrite_keeps_the_buffer_address() {
        let mut frame = Frame::new(4, 4);
        let before = frame.as_raw().as_ptr();

        let source = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        frame.overwrite_from(&source);

        assert_eq!(frame.as_raw().as_ptr(), before);
        assert_eq!(frame.image().get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn overwrite_resamples_mismatched_sources() {
        let mut frame = Frame::new(8, 6);
        let source = RgbImage::from_pixel(16, 12, Rgb([200, 100, 50]));
        frame.overwrite_from(&source);

        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(frame.image().get_pixel(4, 3), &Rgb([200, 100, 50]));
    }

    #[test]
    fn hsv_frame_indexes_interleaved_triples() {
        let mut hsv = HsvFrame::new(3, 2);
        let index = ((1 * 3 + 2) * 3) as usize;
        hsv.as_raw_mut()[index..index + 3].copy_from_slice(&[60, 255, 128]);
        assert_eq!(hsv.get(2, 1), (60, 255, 128));
        assert_eq!(hsv.get(0, 0), (0, 0, 0));
    }
}
