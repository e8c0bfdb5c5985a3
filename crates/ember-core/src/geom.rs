use crate::Error;
use crate::border::clamp_index;

/// Centered square region of a source frame.
///
/// The side is the shorter source dimension; the longer dimension loses equal
/// margins on both ends instead of being squashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareCrop {
    pub margin_x: usize,
    pub margin_y: usize,
    pub side: usize,
}

impl SquareCrop {
    pub fn centered(src_w: usize, src_h: usize) -> Result<Self, Error> {
        if src_w == 0 || src_h == 0 {
            return Err(Error::EmptyGeometry {
                width: src_w,
                height: src_h,
            });
        }
        let side = src_w.min(src_h);
        Ok(Self {
            margin_x: (src_w - side) / 2,
            margin_y: (src_h - side) / 2,
            side,
        })
    }
}

/// Precomputed nearest-neighbour source indices for every destination column
/// and row.
///
/// `sx = margin_x + floor(x * side / dst_w)` and likewise for rows, clamped to
/// the source bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearestMap {
    src_w: usize,
    src_h: usize,
    crop: SquareCrop,
    xs: Vec<usize>,
    ys: Vec<usize>,
}

impl NearestMap {
    pub fn new(src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Result<Self, Error> {
        if dst_w == 0 || dst_h == 0 {
            return Err(Error::EmptyGeometry {
                width: dst_w,
                height: dst_h,
            });
        }
        let crop = SquareCrop::centered(src_w, src_h)?;
        let ratio_x = crop.side as f32 / dst_w as f32;
        let ratio_y = crop.side as f32 / dst_h as f32;

        let xs = (0..dst_w)
            .map(|x| axis_index(crop.margin_x, x, ratio_x, src_w))
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::OutOfBounds)?;
        let ys = (0..dst_h)
            .map(|y| axis_index(crop.margin_y, y, ratio_y, src_h))
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::OutOfBounds)?;

        Ok(Self {
            src_w,
            src_h,
            crop,
            xs,
            ys,
        })
    }

    pub fn src_dims(&self) -> (usize, usize) {
        (self.src_w, self.src_h)
    }

    pub fn dst_dims(&self) -> (usize, usize) {
        (self.xs.len(), self.ys.len())
    }

    pub fn crop(&self) -> SquareCrop {
        self.crop
    }

    /// Source columns, one per destination column.
    pub fn xs(&self) -> &[usize] {
        &self.xs
    }

    /// Source rows, one per destination row.
    pub fn ys(&self) -> &[usize] {
        &self.ys
    }

    pub fn source_of(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        Some((*self.xs.get(x)?, *self.ys.get(y)?))
    }
}

fn axis_index(margin: usize, d: usize, ratio: f32, len: usize) -> Option<usize> {
    let offset = (d as f32 * ratio) as isize;
    clamp_index(margin as isize + offset, len)
}
