use ember_nn::{AllocError, ArenaError, ElementType, InvokeError, ModelError, ResolverError};
use ember_prep::{DecodeError, FillError};
use thiserror::Error;

/// Boot failures. Any of these leaves the engine permanently failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BootError {
    #[error("engine was already initialized")]
    AlreadyInitialized,
    #[error("tensor arena: {0}")]
    Arena(#[from] ArenaError),
    #[error("model: {0}")]
    Model(#[from] ModelError),
    #[error("operator registration: {0}")]
    Resolver(#[from] ResolverError),
    #[error("tensor allocation: {0}")]
    Alloc(#[from] AllocError),
    #[error("input tensor shape {actual:?}, expected {expected:?}")]
    InputShape {
        expected: [usize; 4],
        actual: Vec<usize>,
    },
    #[error("input tensor type {0:?} is not u8, i8 or f32")]
    InputType(ElementType),
    #[error("input tensor quantization scale {0} is not a positive finite number")]
    InputQuantization(f32),
    #[error("output tensor has {0} elements, expected 1 or 2")]
    OutputArity(usize),
    #[error("output tensor type {0:?} is not u8, i8 or f32")]
    OutputType(ElementType),
    #[error("output tensor quantization scale {0} is not a positive finite number")]
    OutputQuantization(f32),
    #[error("preprocessing geometry: {0}")]
    Geometry(#[from] ember_core::Error),
}

/// Per-frame failures; `Engine::predict` turns each into a zero score.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("engine is not ready")]
    NotReady,
    #[error("empty frame")]
    EmptyFrame,
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("preprocess: {0}")]
    Fill(#[from] FillError),
    #[error("invoke: {0}")]
    Invoke(#[from] InvokeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera has no frame available")]
    NoFrame,
}
