use crate::Error;

/// Owned interleaved image with a tight stride.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

impl<T> Image<T> {
    pub fn from_vec(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<T>,
    ) -> Result<Self, Error> {
        if channels == 0 {
            return Err(Error::InvalidChannels(channels));
        }

        let expected = element_count(width, height, channels).ok_or(Error::SizeMismatch {
            expected: usize::MAX,
            actual: data.len(),
        })?;

        if data.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn as_view(&self) -> ImageView<'_, T> {
        ImageView {
            width: self.width,
            height: self.height,
            channels: self.channels,
            stride: self.width * self.channels,
            data: &self.data,
        }
    }
}

impl<T: Clone> Image<T> {
    /// Allocates a filled image, reporting allocation failure instead of
    /// aborting.
    pub fn try_new_fill(
        width: usize,
        height: usize,
        channels: usize,
        value: T,
    ) -> Result<Self, Error> {
        if channels == 0 {
            return Err(Error::InvalidChannels(channels));
        }
        let len = element_count(width, height, channels).ok_or(Error::Alloc {
            bytes: usize::MAX,
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| Error::Alloc {
            bytes: len.saturating_mul(size_of::<T>()),
        })?;
        data.resize(len, value);

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a, T> {
    width: usize,
    height: usize,
    channels: usize,
    stride: usize,
    data: &'a [T],
}

impl<'a, T> ImageView<'a, T> {
    pub fn from_slice(
        width: usize,
        height: usize,
        channels: usize,
        stride: usize,
        data: &'a [T],
    ) -> Result<Self, Error> {
        if channels == 0 {
            return Err(Error::InvalidChannels(channels));
        }
        let row_len = width.checked_mul(channels).ok_or(Error::InvalidStride)?;
        if stride < row_len {
            return Err(Error::InvalidStride);
        }

        let min_len = min_required_len(row_len, height, stride).ok_or(Error::SizeMismatch {
            expected: usize::MAX,
            actual: data.len(),
        })?;

        if data.len() < min_len {
            return Err(Error::SizeMismatch {
                expected: min_len,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            stride,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the `width * channels` elements of row `y`.
    pub fn row(&self, y: usize) -> &'a [T] {
        assert!(y < self.height, "row index out of bounds");
        let start = y * self.stride;
        &self.data[start..start + self.width * self.channels]
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<&'a [T]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y * self.stride + x * self.channels;
        self.data.get(idx..idx + self.channels)
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride == self.width * self.channels
    }

    pub fn as_contiguous_slice(&self) -> Option<&'a [T]> {
        if !self.is_contiguous() {
            return None;
        }
        let len = self.width * self.height * self.channels;
        self.data.get(0..len)
    }
}

fn element_count(width: usize, height: usize, channels: usize) -> Option<usize> {
    width.checked_mul(height)?.checked_mul(channels)
}

fn min_required_len(row_len: usize, height: usize, stride: usize) -> Option<usize> {
    if row_len == 0 || height == 0 {
        return Some(0);
    }

    let rows_before_last = height.checked_sub(1)?;
    let base = rows_before_last.checked_mul(stride)?;
    base.checked_add(row_len)
}
