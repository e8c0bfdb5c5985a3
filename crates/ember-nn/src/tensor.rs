use crate::model::{ElementType, MAX_RANK, Quantization, TensorDesc};

/// Type, shape and quantization of a tensor, without its storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorMeta<'a> {
    pub dtype: ElementType,
    pub shape: &'a [usize],
    pub quant: Quantization,
}

impl<'a> TensorMeta<'a> {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype.size()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Shape left-padded with ones to rank 4.
    pub fn dims4(&self) -> [usize; MAX_RANK] {
        let mut dims = [1usize; MAX_RANK];
        let skip = MAX_RANK - self.shape.len().min(MAX_RANK);
        for (d, &s) in dims[skip..].iter_mut().zip(self.shape) {
            *d = s;
        }
        dims
    }
}

impl<'m> TensorDesc<'m> {
    pub fn meta(&self) -> TensorMeta<'_> {
        TensorMeta {
            dtype: self.dtype,
            shape: &self.shape,
            quant: self.quant,
        }
    }
}

/// Read access to a tensor's elements as real values.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    meta: TensorMeta<'a>,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// `data` must hold exactly `meta.byte_len()` bytes.
    pub(crate) fn new(meta: TensorMeta<'a>, data: &'a [u8]) -> Option<Self> {
        (data.len() == meta.byte_len()).then_some(Self { meta, data })
    }

    /// View over a buffer the arena plan sized for `meta`.
    pub(crate) fn planned(meta: TensorMeta<'a>, data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len(), meta.byte_len());
        Self { meta, data }
    }

    pub fn meta(&self) -> TensorMeta<'a> {
        self.meta
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Element `i`, dequantized.
    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        let q = self.meta.quant;
        match self.meta.dtype {
            ElementType::F32 => f32::from_le_bytes(word(self.data, i)),
            ElementType::U8 => dequantize(self.data[i] as i32, q),
            ElementType::I8 => dequantize(self.data[i] as i8 as i32, q),
            ElementType::I32 => dequantize(i32::from_le_bytes(word(self.data, i)), q),
        }
    }

    /// Element `i` as a raw integer, for index tensors (axes, paddings, shapes).
    pub fn get_i32(&self, i: usize) -> i32 {
        match self.meta.dtype {
            ElementType::I32 => i32::from_le_bytes(word(self.data, i)),
            ElementType::U8 => self.data[i] as i32,
            ElementType::I8 => self.data[i] as i8 as i32,
            ElementType::F32 => f32::from_le_bytes(word(self.data, i)) as i32,
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

/// Write access to a tensor, quantizing real values on store.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    meta: TensorMeta<'a>,
    data: &'a mut [u8],
}

impl<'a> TensorViewMut<'a> {
    pub(crate) fn new(meta: TensorMeta<'a>, data: &'a mut [u8]) -> Option<Self> {
        if data.len() == meta.byte_len() {
            Some(Self { meta, data })
        } else {
            None
        }
    }

    pub fn meta(&self) -> TensorMeta<'a> {
        self.meta
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Stores `v` at element `i`, rounding and saturating for integer types.
    #[inline]
    pub fn set(&mut self, i: usize, v: f32) {
        let q = self.meta.quant;
        match self.meta.dtype {
            ElementType::F32 => self.data[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes()),
            ElementType::U8 => self.data[i] = quantize(v, q, 0, 255) as u8,
            ElementType::I8 => self.data[i] = quantize(v, q, -128, 127) as i8 as u8,
            ElementType::I32 => {
                let stored = quantize(v, q, i32::MIN as i64, i32::MAX as i64) as i32;
                self.data[i * 4..i * 4 + 4].copy_from_slice(&stored.to_le_bytes());
            }
        }
    }

    pub fn as_view(&self) -> TensorView<'_> {
        TensorView {
            meta: self.meta,
            data: &*self.data,
        }
    }
}

#[inline(always)]
fn word(data: &[u8], i: usize) -> [u8; 4] {
    let b = &data[i * 4..i * 4 + 4];
    [b[0], b[1], b[2], b[3]]
}

#[inline(always)]
fn dequantize(stored: i32, q: Quantization) -> f32 {
    if q.scale == 0.0 {
        stored as f32
    } else {
        (stored - q.zero_point) as f32 * q.scale
    }
}

#[inline(always)]
fn quantize(v: f32, q: Quantization, lo: i64, hi: i64) -> i64 {
    if v.is_nan() {
        return (q.zero_point as i64).clamp(lo, hi);
    }
    let scaled = if q.scale == 0.0 || !q.scale.is_finite() {
        v.round() as i64
    } else {
        (v / q.scale).round() as i64 + q.zero_point as i64
    };
    scaled.clamp(lo, hi)
}
