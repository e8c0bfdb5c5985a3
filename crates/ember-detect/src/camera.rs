use std::ops::Deref;

use crate::error::CameraError;

/// A source of compressed frames.
///
/// A frame is borrowed from the camera and handed back when the guard drops,
/// so at most one frame is held at a time.
pub trait Camera {
    type Frame<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    fn acquire(&mut self) -> Result<Self::Frame<'_>, CameraError>;
}

/// Cycles through in-memory JPEG frames.
#[derive(Debug, Default)]
pub struct ReplayCamera {
    frames: Vec<Vec<u8>>,
    next: usize,
    released: u64,
}

impl ReplayCamera {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames,
            next: 0,
            released: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames handed back so far.
    pub fn released(&self) -> u64 {
        self.released
    }
}

pub struct ReplayFrame<'a> {
    bytes: &'a [u8],
    released: &'a mut u64,
}

impl Deref for ReplayFrame<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl Drop for ReplayFrame<'_> {
    fn drop(&mut self) {
        *self.released += 1;
        tracing::trace!(released = *self.released, "frame returned");
    }
}

impl Camera for ReplayCamera {
    type Frame<'a> = ReplayFrame<'a>;

    fn acquire(&mut self) -> Result<ReplayFrame<'_>, CameraError> {
        let Self {
            frames,
            next,
            released,
        } = self;
        if frames.is_empty() {
            return Err(CameraError::NoFrame);
        }
        let bytes = &frames[*next % frames.len()];
        *next = next.wrapping_add(1);
        Ok(ReplayFrame { bytes, released })
    }
}

#[cfg(test)]
mod tests {
    use super::{Camera, ReplayCamera};
    use crate::error::CameraError;

    #[test]
    fn cycles_and_counts_releases() {
        let mut cam = ReplayCamera::new(vec![vec![1], vec![2, 2]]);
        let seen: Vec<usize> = (0..5)
            .map(|_| cam.acquire().map(|f| f.len()).expect("frame"))
            .collect();
        assert_eq!(seen, vec![1, 2, 1, 2, 1]);
        assert_eq!(cam.released(), 5);
    }

    #[test]
    fn empty_camera_has_no_frames() {
        let mut cam = ReplayCamera::default();
        assert!(matches!(cam.acquire(), Err(CameraError::NoFrame)));
    }
}
