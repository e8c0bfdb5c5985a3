use ember_core::{Error as CoreError, GammaTable, ImageView, NearestMap, TensorRepr};
use thiserror::Error;

use crate::decode::RGB_CHANNELS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillError {
    #[error("source is {actual_w}x{actual_h}, map expects {expected_w}x{expected_h}")]
    SourceSize {
        expected_w: usize,
        expected_h: usize,
        actual_w: usize,
        actual_h: usize,
    },
    #[error("source has {0} channels, expected 3")]
    Channels(usize),
    #[error("input tensor holds {actual} bytes, expected {expected}")]
    TensorSize { expected: usize, actual: usize },
}

/// Writes a model input tensor from a decoded RGB frame.
///
/// Gamma correction and the tensor encoding are folded into one 256-entry
/// table at construction, so the per-pixel work is two index lookups and a
/// small copy.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    map: NearestMap,
    repr: TensorRepr,
    encoded: [[u8; 4]; 256],
}

impl Preprocessor {
    pub fn new(
        src_w: usize,
        src_h: usize,
        dst_w: usize,
        dst_h: usize,
        gamma: &GammaTable,
        repr: TensorRepr,
    ) -> Result<Self, CoreError> {
        let map = NearestMap::new(src_w, src_h, dst_w, dst_h)?;
        let mut encoded = [[0u8; 4]; 256];
        for (v, out) in encoded.iter_mut().enumerate() {
            *out = repr.encode_corrected(gamma.apply(v as u8));
        }
        Ok(Self { map, repr, encoded })
    }

    pub fn repr(&self) -> TensorRepr {
        self.repr
    }

    pub fn map(&self) -> &NearestMap {
        &self.map
    }

    /// Bytes the destination tensor must hold.
    pub fn tensor_len(&self) -> usize {
        let (dst_w, dst_h) = self.map.dst_dims();
        dst_w * dst_h * RGB_CHANNELS * self.repr.element_size()
    }

    /// Fills `dst` (NHWC, batch 1) from `src`.
    ///
    /// Validation happens before the first write: on error `dst` is untouched.
    pub fn fill(&self, src: &ImageView<'_, u8>, dst: &mut [u8]) -> Result<(), FillError> {
        let (expected_w, expected_h) = self.map.src_dims();
        if (src.width(), src.height()) != (expected_w, expected_h) {
            return Err(FillError::SourceSize {
                expected_w,
                expected_h,
                actual_w: src.width(),
                actual_h: src.height(),
            });
        }
        if src.channels() != RGB_CHANNELS {
            return Err(FillError::Channels(src.channels()));
        }
        let expected = self.tensor_len();
        if dst.len() != expected {
            return Err(FillError::TensorSize {
                expected,
                actual: dst.len(),
            });
        }

        match self.repr.element_size() {
            1 => self.fill_sized::<1>(src, dst),
            _ => self.fill_sized::<4>(src, dst),
        }
        Ok(())
    }

    fn fill_sized<const SIZE: usize>(&self, src: &ImageView<'_, u8>, dst: &mut [u8]) {
        if let Some(src_contig) = src.as_contiguous_slice() {
            self.fill_contiguous::<SIZE>(src_contig, src.stride(), dst);
        } else {
            self.fill_fallback::<SIZE>(src, dst);
        }
    }

    fn fill_contiguous<const SIZE: usize>(&self, src: &[u8], src_stride: usize, dst: &mut [u8]) {
        let px_bytes = RGB_CHANNELS * SIZE;
        let row_bytes = self.map.xs().len() * px_bytes;
        for (&sy, dst_row) in self.map.ys().iter().zip(dst.chunks_exact_mut(row_bytes)) {
            let row_start = sy * src_stride;
            for (&sx, out) in self.map.xs().iter().zip(dst_row.chunks_exact_mut(px_bytes)) {
                let idx = row_start + sx * RGB_CHANNELS;
                // SAFETY:
                // - `fill` checked the view dims against the map's source dims.
                // - `NearestMap` clamps every `sx < width` and `sy < height`.
                // - A contiguous view holds `width * height * 3` elements.
                let px = unsafe { src.get_unchecked(idx..idx + RGB_CHANNELS) };
                for (c, &v) in px.iter().enumerate() {
                    out[c * SIZE..(c + 1) * SIZE].copy_from_slice(&self.encoded[v as usize][..SIZE]);
                }
            }
        }
    }

    fn fill_fallback<const SIZE: usize>(&self, src: &ImageView<'_, u8>, dst: &mut [u8]) {
        let px_bytes = RGB_CHANNELS * SIZE;
        let row_bytes = self.map.xs().len() * px_bytes;
        for (&sy, dst_row) in self.map.ys().iter().zip(dst.chunks_exact_mut(row_bytes)) {
            let src_row = src.row(sy);
            for (&sx, out) in self.map.xs().iter().zip(dst_row.chunks_exact_mut(px_bytes)) {
                let px = &src_row[sx * RGB_CHANNELS..(sx + 1) * RGB_CHANNELS];
                for (c, &v) in px.iter().enumerate() {
                    out[c * SIZE..(c + 1) * SIZE].copy_from_slice(&self.encoded[v as usize][..SIZE]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ember_core::{GammaTable, Image, ImageView, TensorRepr};

    use super::{FillError, Preprocessor};

    fn gradient(width: usize, height: usize) -> Image<u8> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, (x + y) as u8]);
            }
        }
        Image::from_vec(width, height, 3, data).expect("valid image")
    }

    #[test]
    fn unsigned_fill_samples_center_crop() {
        let src = gradient(8, 4);
        let prep = Preprocessor::new(8, 4, 2, 2, &GammaTable::identity(), TensorRepr::UnsignedByte)
            .expect("valid geometry");
        let mut dst = vec![0u8; prep.tensor_len()];
        prep.fill(&src.as_view(), &mut dst).expect("fills");

        // side 4, margin 2, ratio 2: columns {2, 4}, rows {0, 2}
        assert_eq!(
            dst,
            vec![
                2, 0, 2, 4, 0, 4, //
                2, 2, 4, 4, 2, 6, //
            ]
        );
    }

    #[test]
    fn gamma_is_applied_per_channel() {
        let src = Image::from_vec(1, 1, 3, vec![255u8, 128, 0]).expect("valid image");
        let prep = Preprocessor::new(1, 1, 1, 1, &GammaTable::new(12.0), TensorRepr::UnsignedByte)
            .expect("valid geometry");
        let mut dst = vec![9u8; 3];
        prep.fill(&src.as_view(), &mut dst).expect("fills");
        assert_eq!(dst, vec![255, 0, 0]);
    }

    #[test]
    fn signed_fill_uses_affine_quantization() {
        let src = Image::from_vec(1, 1, 3, vec![0u8, 255, 51]).expect("valid image");
        let repr = TensorRepr::SignedByte {
            scale: 1.0 / 255.0,
            zero_point: -128,
        };
        let prep = Preprocessor::new(1, 1, 1, 1, &GammaTable::identity(), repr)
            .expect("valid geometry");
        let mut dst = vec![0u8; 3];
        prep.fill(&src.as_view(), &mut dst).expect("fills");
        assert_eq!(dst.iter().map(|&b| b as i8).collect::<Vec<_>>(), vec![-128, 127, -77]);
    }

    #[test]
    fn float_fill_normalizes() {
        let src = Image::from_vec(1, 1, 3, vec![0u8, 255, 51]).expect("valid image");
        let prep = Preprocessor::new(1, 1, 1, 1, &GammaTable::identity(), TensorRepr::Float)
            .expect("valid geometry");
        let mut dst = vec![0u8; prep.tensor_len()];
        assert_eq!(dst.len(), 12);
        prep.fill(&src.as_view(), &mut dst).expect("fills");

        let values: Vec<f32> = dst
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 1.0);
        assert!((values[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn strided_view_matches_contiguous() {
        let src = gradient(10, 6);
        let mut padded = Vec::new();
        for y in 0..6 {
            padded.extend_from_slice(src.as_view().row(y));
            padded.extend_from_slice(&[0xAA; 6]);
        }
        let strided = ImageView::from_slice(10, 6, 3, 36, &padded).expect("valid view");
        assert!(!strided.is_contiguous());

        let prep = Preprocessor::new(10, 6, 4, 4, &GammaTable::new(2.2), TensorRepr::Float)
            .expect("valid geometry");
        let mut a = vec![0u8; prep.tensor_len()];
        let mut b = vec![0u8; prep.tensor_len()];
        prep.fill(&src.as_view(), &mut a).expect("fills");
        prep.fill(&strided, &mut b).expect("fills");
        assert_eq!(a, b);
    }

    #[test]
    fn mismatches_are_rejected_before_writing() {
        let src = gradient(8, 4);
        let prep = Preprocessor::new(8, 4, 2, 2, &GammaTable::identity(), TensorRepr::UnsignedByte)
            .expect("valid geometry");

        let mut short = vec![7u8; 5];
        assert_eq!(
            prep.fill(&src.as_view(), &mut short),
            Err(FillError::TensorSize {
                expected: 12,
                actual: 5
            })
        );
        assert!(short.iter().all(|&b| b == 7));

        let other = gradient(6, 4);
        let mut dst = vec![7u8; 12];
        assert!(matches!(
            prep.fill(&other.as_view(), &mut dst),
            Err(FillError::SourceSize { .. })
        ));
        assert!(dst.iter().all(|&b| b == 7));
    }
}
