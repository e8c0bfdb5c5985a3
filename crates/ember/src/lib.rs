//! Umbrella crate for the ember workspace.
//!
//! The interpreter is re-exported as [`nn`]; its names overlap with the
//! detection layer's, so it is not flattened into the root.

pub use ember_core::*;
pub use ember_detect::*;
pub use ember_nn as nn;
pub use ember_prep::*;
