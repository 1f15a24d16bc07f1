//! Draws candidate bounding boxes onto the display frame.

use crate::core_modules::candidate::Candidate;
use crate::core_modules::frame::Frame;
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotator {
    pub color: Rgb<u8>,
    /// Line weight in pixels, growing inward from the box edge.
    pub thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            color: Rgb([0, 0, 0]),
            thickness: 2,
        }
    }
}

impl Annotator {
    pub fn new(color: Rgb<u8>, thickness: u32) -> Self {
        Self { color, thickness }
    }

    /// Outlines every candidate in place. Boxes reaching past the frame are clipped.
    pub fn annotate<'a>(&self, frame: &mut Frame, candidates: impl IntoIterator<Item = &'a Candidate>) {
        for candidate in candidates {
            let bounds = candidate.bounding_box;
            // The outline spans (x, y) to (x + width, y + height) inclusive.
            let outer_width = i64::from(bounds.width) + 1;
            let outer_height = i64::from(bounds.height) + 1;

            for inset in 0..i64::from(self.thickness) {
                let width = outer_width - 2 * inset;
                let height = outer_height - 2 * inset;
                if width <= 0 || height <= 0 {
                    break;
                }
                let rect = Rect::at(bounds.x + inset as i32, bounds.y + inset as i32)
                    .of_size(width as u32, height as u32);
                draw_hollow_rect_mut(frame.image_mut(), rect, self.color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::candidate::BoundingBox;
    use image::RgbImage;

    fn white_frame() -> Frame {
        Frame::from_image(RgbImage::from_pixel(64, 48, Rgb([255, 255, 255])))
    }

    fn candidate(x: i32, y: i32, width: i32, height: i32) -> Candidate {
        Candidate::from_box(BoundingBox::new(x, y, width, height))
    }

    #[test]
    fn no_candidates_leaves_frame_identical() {
        let mut frame = white_frame();
        let before = frame.clone();
        Annotator::default().annotate(&mut frame, &[]);
        assert_eq!(frame, before);
    }

    #[test]
    fn outline_is_two_pixels_thick() {
        let mut frame = white_frame();
        Annotator::default().annotate(&mut frame, &[candidate(10, 10, 20, 10)]);
        let image = frame.image();

        let black = Rgb([0, 0, 0]);
        let white = Rgb([255, 255, 255]);
        assert_eq!(*image.get_pixel(10, 15), black);
        assert_eq!(*image.get_pixel(11, 15), black);
        assert_eq!(*image.get_pixel(12, 15), white);
        assert_eq!(*image.get_pixel(30, 15), black);
        assert_eq!(*image.get_pixel(29, 15), black);
        assert_eq!(*image.get_pixel(20, 20), black);
        assert_eq!(*image.get_pixel(20, 21), white);
        assert_eq!(*image.get_pixel(9, 15), white);
    }

    #[test]
    fn out_of_bounds_boxes_are_clipped() {
        let mut frame = white_frame();
        let annotator = Annotator::default();
        annotator.annotate(
            &mut frame,
            &[candidate(-10, -10, 100, 100), candidate(500, 500, 4, 4)],
        );
        assert_eq!(*frame.image().get_pixel(30, 30), Rgb([255, 255, 255]));
    }

    #[test]
    fn tiny_boxes_do_not_panic() {
        let mut frame = white_frame();
        Annotator::new(Rgb([255, 0, 0]), 5).annotate(&mut frame, &[candidate(3, 3, 1, 1)]);
        assert_eq!(*frame.image().get_pixel(3, 3), Rgb([255, 0, 0]));
    }
}
