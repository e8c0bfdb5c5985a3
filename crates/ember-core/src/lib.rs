//! Foundational primitives for the ember fire-detection pipeline.
//!
//! ## Image Views and Stride
//! Images are interleaved: each pixel is `channels` consecutive elements.
//! `stride` is the distance, in elements, between adjacent row starts and may
//! be greater than `width * channels`, so a view can borrow a padded decode
//! buffer without copying. The square crop is not a view: it is folded into
//! the [`NearestMap`] source indices.
//!
//! ## Crop and Resample
//! The classifier looks at a centered square crop of the camera frame and
//! downsamples it with nearest-neighbour sampling. [`NearestMap`] precomputes
//! the source column and row for every destination coordinate once, so the
//! per-frame loop only performs table lookups. Indices are clamped to the
//! last valid row/column; nothing is ever sampled outside the source.
//!
//! ## Tensor Representation
//! [`TensorRepr`] tags the element type of a model tensor together with its
//! affine quantization pair, resolved once when tensors are bound.

mod border;
mod error;
mod gamma;
mod geom;
mod image;
mod repr;

pub use border::clamp_index;
pub use error::Error;
pub use gamma::{DEFAULT_GAMMA_FLOOR, GammaTable};
pub use geom::{NearestMap, SquareCrop};
pub use image::{Image, ImageView};
pub use repr::{TensorRepr, dequantize_i8, quantize_i8};
