use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("out of bounds")]
    OutOfBounds,
    #[error("invalid stride")]
    InvalidStride,
    #[error("invalid channel count {0}")]
    InvalidChannels(usize),
    #[error("empty geometry: {width}x{height}")]
    EmptyGeometry { width: usize, height: usize },
    #[error("failed to reserve {bytes} bytes")]
    Alloc { bytes: usize },
}
