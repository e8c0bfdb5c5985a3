use std::io::Cursor;

use ember_core::Image;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder, ImageError};
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame buffer")]
    Empty,
    #[error("jpeg decode failed: {0}")]
    Jpeg(#[from] ImageError),
    #[error("frame is {actual_w}x{actual_h}, expected {expected_w}x{expected_h}")]
    FrameSize {
        expected_w: usize,
        expected_h: usize,
        actual_w: usize,
        actual_h: usize,
    },
    #[error("unsupported color type {0:?}, expected RGB8 or L8")]
    ColorType(ColorType),
    #[error("could not allocate {bytes} byte decode buffer")]
    Alloc { bytes: usize },
}

/// Decodes a JPEG frame into a freshly allocated RGB888 image.
///
/// The frame must match the configured sensor resolution exactly. Grayscale
/// frames are expanded to equal RGB channels inside the same buffer. The
/// decode buffer is reserved fallibly and is dropped on every error path.
pub fn decode_rgb888(
    jpeg: &[u8],
    expected_w: usize,
    expected_h: usize,
) -> Result<Image<u8>, DecodeError> {
    if jpeg.is_empty() {
        return Err(DecodeError::Empty);
    }

    let decoder = JpegDecoder::new(Cursor::new(jpeg))?;
    let (w, h) = decoder.dimensions();
    let (actual_w, actual_h) = (w as usize, h as usize);
    if (actual_w, actual_h) != (expected_w, expected_h) {
        return Err(DecodeError::FrameSize {
            expected_w,
            expected_h,
            actual_w,
            actual_h,
        });
    }

    let color = decoder.color_type();
    if !matches!(color, ColorType::Rgb8 | ColorType::L8) {
        return Err(DecodeError::ColorType(color));
    }

    let mut rgb = Image::try_new_fill(actual_w, actual_h, RGB_CHANNELS, 0u8).map_err(|_| {
        DecodeError::Alloc {
            bytes: actual_w * actual_h * RGB_CHANNELS,
        }
    })?;
    if color == ColorType::L8 {
        let data = rgb.data_mut();
        let pixels = actual_w * actual_h;
        decoder.read_image(&mut data[..pixels])?;
        expand_luma_in_place(data, pixels);
    } else {
        decoder.read_image(rgb.data_mut())?;
    }
    tracing::trace!(width = actual_w, height = actual_h, "decoded frame");
    Ok(rgb)
}

/// Spreads `pixels` luma bytes at the front of `data` to RGB triples.
///
/// Walks backwards: pixel `i` is written to `3i..3i + 3`, which never
/// overlaps a luma byte that is still unread.
fn expand_luma_in_place(data: &mut [u8], pixels: usize) {
    for i in (0..pixels).rev() {
        let v = data[i];
        data[i * RGB_CHANNELS..(i + 1) * RGB_CHANNELS].fill(v);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};

    use super::{DecodeError, decode_rgb888, expand_luma_in_place};

    fn encode(img: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .expect("jpeg encode");
        bytes
    }

    #[test]
    fn decodes_flat_color_frame() {
        let img = RgbImage::from_pixel(32, 24, Rgb([200, 40, 10]));
        let jpeg = encode(DynamicImage::ImageRgb8(img));

        let rgb = decode_rgb888(&jpeg, 32, 24).expect("decodes");
        assert_eq!(rgb.width(), 32);
        assert_eq!(rgb.height(), 24);
        assert_eq!(rgb.channels(), 3);
        let px = rgb.as_view().pixel(16, 12).expect("in bounds");
        assert!(px[0].abs_diff(200) <= 8);
        assert!(px[1].abs_diff(40) <= 8);
        assert!(px[2].abs_diff(10) <= 8);
    }

    #[test]
    fn rejects_wrong_resolution() {
        let jpeg = encode(DynamicImage::ImageRgb8(RgbImage::new(16, 16)));
        assert!(matches!(
            decode_rgb888(&jpeg, 32, 24),
            Err(DecodeError::FrameSize {
                actual_w: 16,
                actual_h: 16,
                ..
            })
        ));
    }

    #[test]
    fn grayscale_frames_expand_to_rgb() {
        let img = GrayImage::from_fn(32, 24, |x, _| Luma([if x < 16 { 40 } else { 220 }]));
        let jpeg = encode(DynamicImage::ImageLuma8(img));

        let rgb = decode_rgb888(&jpeg, 32, 24).expect("decodes");
        assert_eq!(rgb.channels(), 3);
        for (x, expected) in [(4, 40u8), (28, 220)] {
            let px = rgb.as_view().pixel(x, 12).expect("in bounds");
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert!(px[0].abs_diff(expected) <= 8, "x={x}: {px:?}");
        }
    }

    #[test]
    fn luma_expansion_keeps_pixel_order() {
        let mut data = vec![1u8, 2, 3, 0, 0, 0, 0, 0, 0];
        expand_luma_in_place(&mut data, 3);
        assert_eq!(data, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn garbage_and_empty_input_fail_softly() {
        assert!(matches!(decode_rgb888(&[], 32, 24), Err(DecodeError::Empty)));
        assert!(decode_rgb888(&[0xde, 0xad, 0xbe, 0xef], 32, 24).is_err());
    }
}
