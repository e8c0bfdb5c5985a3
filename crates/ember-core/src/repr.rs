/// Numeric representation of a bound model tensor.
///
/// Resolved once when the engine binds its input and output tensors, then
/// used to pick a specialized fill or decode routine instead of branching on
/// the element type per pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorRepr {
    /// Raw `0..=255` values.
    UnsignedByte,
    /// Affine-quantized signed bytes: `real = (stored - zero_point) * scale`.
    SignedByte { scale: f32, zero_point: i32 },
    /// Little-endian `f32`, normalized to `0.0..=1.0` for image inputs.
    Float,
}

impl TensorRepr {
    pub fn element_size(self) -> usize {
        match self {
            Self::UnsignedByte | Self::SignedByte { .. } => 1,
            Self::Float => 4,
        }
    }

    /// `false` when a signed-byte scale is zero, negative or not finite.
    ///
    /// Such a tensor quantizes every value to its zero point.
    pub fn is_well_formed(self) -> bool {
        match self {
            Self::SignedByte { scale, .. } => scale.is_finite() && scale > 0.0,
            Self::UnsignedByte | Self::Float => true,
        }
    }

    /// Encodes one gamma-corrected channel value into its stored form.
    #[inline(always)]
    pub fn encode_corrected(self, corrected: u8) -> [u8; 4] {
        match self {
            Self::UnsignedByte => [corrected, 0, 0, 0],
            Self::SignedByte { scale, zero_point } => {
                let q = quantize_i8(corrected as f32 / 255.0, scale, zero_point);
                [q as u8, 0, 0, 0]
            }
            Self::Float => (corrected as f32 / 255.0).to_le_bytes(),
        }
    }

    /// Decodes element `index` of a tensor buffer into a probability-like
    /// real value.
    ///
    /// Unsigned bytes map through `v / 255`, signed bytes through the affine
    /// pair, floats are used as stored.
    pub fn decode(self, data: &[u8], index: usize) -> Option<f32> {
        match self {
            Self::UnsignedByte => data.get(index).map(|&v| v as f32 / 255.0),
            Self::SignedByte { scale, zero_point } => data
                .get(index)
                .map(|&v| dequantize_i8(v as i8, scale, zero_point)),
            Self::Float => {
                let start = index.checked_mul(4)?;
                let bytes = data.get(start..start + 4)?;
                Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
        }
    }
}

/// `round(real / scale + zero_point)` saturated to `i8`.
///
/// A non-positive or non-finite scale stores the zero point.
#[inline(always)]
pub fn quantize_i8(real: f32, scale: f32, zero_point: i32) -> i8 {
    let q = if scale.is_finite() && scale > 0.0 {
        (real / scale).round() + zero_point as f32
    } else {
        zero_point as f32
    };
    q.clamp(i8::MIN as f32, i8::MAX as f32) as i8
}

#[inline(always)]
pub fn dequantize_i8(q: i8, scale: f32, zero_point: i32) -> f32 {
    (q as i32 - zero_point) as f32 * scale
}

#[cfg(test)]
mod tests {
    use super::{TensorRepr, dequantize_i8, quantize_i8};

    #[test]
    fn signed_round_trip_within_one_step() {
        let params = [
            (1.0f32 / 255.0, -128i32),
            (0.003_921_569, -128),
            (0.01, -100),
            (1.0 / 128.0, -128),
        ];
        for (scale, zero_point) in params {
            for v in 0..=255u8 {
                let real = v as f32 / 255.0;
                let q = quantize_i8(real, scale, zero_point);
                let back = dequantize_i8(q, scale, zero_point);
                assert!(
                    (back - real).abs() <= scale + 1e-6,
                    "v={v} scale={scale} zp={zero_point} back={back}"
                );
            }
        }
    }

    #[test]
    fn quantize_saturates() {
        assert_eq!(quantize_i8(10.0, 0.01, 0), 127);
        assert_eq!(quantize_i8(-10.0, 0.01, 0), -128);
        assert_eq!(quantize_i8(0.5, 0.0, 3), 3);
    }

    #[test]
    fn degenerate_signed_scales_are_not_well_formed() {
        assert!(TensorRepr::UnsignedByte.is_well_formed());
        assert!(TensorRepr::Float.is_well_formed());
        let signed = |scale| TensorRepr::SignedByte {
            scale,
            zero_point: 0,
        };
        assert!(signed(1.0 / 255.0).is_well_formed());
        for scale in [0.0, -0.5, f32::NAN, f32::INFINITY] {
            assert!(!signed(scale).is_well_formed(), "scale {scale}");
        }
    }

    #[test]
    fn encode_per_representation() {
        assert_eq!(TensorRepr::UnsignedByte.encode_corrected(200)[0], 200);

        let signed = TensorRepr::SignedByte {
            scale: 1.0 / 255.0,
            zero_point: -128,
        };
        assert_eq!(signed.encode_corrected(0)[0] as i8, -128);
        assert_eq!(signed.encode_corrected(255)[0] as i8, 127);

        let float = TensorRepr::Float.encode_corrected(51);
        assert!((f32::from_le_bytes(float) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn decode_per_representation() {
        assert_eq!(TensorRepr::UnsignedByte.decode(&[0, 255], 1), Some(1.0));

        let signed = TensorRepr::SignedByte {
            scale: 0.5,
            zero_point: -2,
        };
        assert_eq!(signed.decode(&[2u8], 0), Some(2.0));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.3f32.to_le_bytes());
        bytes.extend_from_slice(&0.7f32.to_le_bytes());
        assert_eq!(TensorRepr::Float.decode(&bytes, 1), Some(0.7));
        assert_eq!(TensorRepr::Float.decode(&bytes, 2), None);
    }
}
