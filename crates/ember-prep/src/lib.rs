//! Frame preprocessing for the fire classifier.
//!
//! A compressed camera frame is decoded into a temporary RGB888 buffer that
//! lives only for the duration of one classification call, then
//! [`Preprocessor::fill`] writes the model input tensor in one pass:
//!
//! - centered square crop of the source (side margins are discarded),
//! - nearest-neighbour downsample through a precomputed [`NearestMap`],
//! - per-channel gamma lookup,
//! - conversion to the input tensor's [`TensorRepr`].
//!
//! The representation is matched once per frame, outside the pixel loop.
//!
//! [`NearestMap`]: ember_core::NearestMap
//! [`TensorRepr`]: ember_core::TensorRepr

mod decode;
mod fill;

pub use decode::{DecodeError, RGB_CHANNELS, decode_rgb888};
pub use fill::{FillError, Preprocessor};
