/// Pins `i` to `[0, len)`, returning `None` only for empty axes.
///
/// Negative indices map to the first element and overflowing indices to the
/// last; there is no wraparound.
pub fn clamp_index(i: isize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if i < 0 {
        Some(0)
    } else {
        Some((i as usize).min(len - 1))
    }
}
