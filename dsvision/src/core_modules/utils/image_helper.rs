pub mod image_helper {
    use crate::core_modules::frame::Frame;
    use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
    use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder};
    use std::io::Cursor;

    #[derive(thiserror::Error, Debug)]
    pub enum EncodeError {
        #[error("jpeg quality {0} is outside 1..=100")]
        Quality(u8),
        #[error(transparent)]
        Image(#[from] image::ImageError),
    }

    /// Encodes `frame` as a baseline JPEG into `out`, replacing its contents.
    pub fn encode_jpeg(frame: &Frame, quality: u8, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        if !(1..=100).contains(&quality) {
            return Err(EncodeError::Quality(quality));
        }
        out.clear();
        let encoder = JpegEncoder::new_with_quality(&mut *out, quality);
        encoder.write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(())
    }

    /// Decodes a JPEG into `frame`, resampling when the sizes differ.
    ///
    /// A colour JPEG of the frame's size decodes straight into the frame's
    /// buffer; anything else goes through an intermediate image.
    pub fn decode_jpeg_into(bytes: &[u8], frame: &mut Frame) -> Result<(), EncodeError> {
        let decoder = JpegDecoder::new(Cursor::new(bytes))?;
        if decoder.dimensions() == (frame.width(), frame.height())
            && decoder.color_type() == ColorType::Rgb8
        {
            decoder.read_image(frame.as_raw_mut())?;
            return Ok(());
        }
        let decoded = DynamicImage::from_decoder(decoder)?;
        frame.overwrite_from(&decoded.into_rgb8());
        Ok(())
    }
}
