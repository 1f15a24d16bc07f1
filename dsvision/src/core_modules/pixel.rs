// THEORY:
// The `pixel` module holds the single-pixel colour heuristics the detectors rely on.
// Everything here looks at one pixel at a time, never at neighbours.
//
// Target signatures are expressed in HSV because the retro-reflective tape lights
// up in the hue of the LED ring while its brightness swings wildly with distance.
// Thresholding hue and saturation separately from value is what makes the
// filter stable under those swings.
//
// Convention: 8-bit OpenCV HSV. Hue is halved to fit a byte (0..=179), saturation
// and value span 0..=255. Detector configs written for GRIP/OpenCV pipelines can
// therefore be reused verbatim.

pub mod pixel {
    use crate::core_modules::frame::{Frame, HsvFrame};

    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// Converts one RGB pixel to (H, S, V) in 8-bit OpenCV units.
    pub fn rgb_to_hsv(red: u8, green: u8, blue: u8) -> (Hue, Saturation, Value) {
        let red_computed = red as f32;
        let green_computed = green as f32;
        let blue_computed = blue as f32;

        let maximum_channel = red_computed.max(green_computed.max(blue_computed));
        let minimum_channel = red_computed.min(green_computed.min(blue_computed));
        let chroma = maximum_channel - minimum_channel;

        let value = maximum_channel;
        let saturation = if maximum_channel > 0.0 {
            255.0 * chroma / maximum_channel
        } else {
            0.0
        };

        if chroma <= 1e-6 {
            return (0, saturation.round() as Saturation, value as Value);
        }

        let inverse_chroma = 1.0 / chroma;
        let (base_difference, sector_offset) = if maximum_channel == red_computed {
            (green_computed - blue_computed, 0.0)
        } else if maximum_channel == green_computed {
            (blue_computed - red_computed, 2.0)
        } else {
            (red_computed - green_computed, 4.0)
        };

        let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }
        // 360 degrees would round to 180, which is outside the byte convention.
        let hue = ((hue_degrees / 2.0).round() as u16 % 180) as Hue;

        (hue, saturation.round() as Saturation, value as Value)
    }

    /// Converts a whole frame into the preallocated `hsv` buffer.
    pub fn convert_frame(input: &Frame, hsv: &mut HsvFrame) {
        for (rgb, out) in input
            .as_raw()
            .chunks_exact(3)
            .zip(hsv.as_raw_mut().chunks_exact_mut(3))
        {
            let (h, s, v) = rgb_to_hsv(rgb[0], rgb[1], rgb[2]);
            out[0] = h;
            out[1] = s;
            out[2] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;
    use crate::core_modules::frame::{Frame, HsvFrame};
    use image::{Rgb, RgbImage};

    #[test]
    fn primaries_land_on_opencv_hues() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(255, 255, 0), (30, 255, 255));
    }

    #[test]
    fn greys_have_no_hue_or_saturation() {
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
        assert_eq!(rgb_to_hsv(128, 128, 128), (0, 0, 128));
        assert_eq!(rgb_to_hsv(255, 255, 255), (0, 0, 255));
    }

    #[test]
    fn hue_wraps_below_180() {
        // Magenta-red sits just under 360 degrees.
        let (h, _, _) = rgb_to_hsv(255, 0, 1);
        assert!(h < 180);
    }

    #[test]
    fn convert_frame_fills_every_pixel() {
        let frame = Frame::from_image(RgbImage::from_pixel(5, 4, Rgb([0, 255, 0])));
        let mut hsv = HsvFrame::new(5, 4);
        convert_frame(&frame, &mut hsv);
        for y in 0..4 {
            for x in 0..5 {
                assert_eq!(hsv.get(x, y), (60, 255, 255));
            }
        }
    }
}
