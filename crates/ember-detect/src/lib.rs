//! On-device fire detection.
//!
//! ## Engine
//! [`Engine`] owns a fixed tensor arena and one interpreter for the whole
//! process lifetime. [`Engine::init`] runs once: it builds the gamma table,
//! allocates the arena (external pool first, internal pool as fallback),
//! loads and checks the model, binds the input and output tensors and
//! prepares the preprocessor. Any failure leaves the engine permanently
//! `Failed`, and every later prediction scores `0.0`.
//!
//! ## Sampling and Shared State
//! [`SamplingPolicy`] classifies every Nth frame and publishes the result to
//! a [`DetectionCell`], which readers load as one consistent
//! [`DetectionSnapshot`] without waiting for inference.
//!
//! ## Status
//! [`StatusReport`] renders the snapshot as the JSON body served to clients;
//! the header sets for the status and capture responses live in [`status`].

pub mod config;
pub mod status;

mod camera;
mod demo;
mod engine;
mod error;
mod monitor;
mod policy;
mod score;
mod state;

pub use camera::{Camera, ReplayCamera, ReplayFrame};
pub use config::{DetectorConfig, EngineConfig, PolicyConfig};
pub use demo::{DemoInput, demo_model};
pub use engine::{Engine, EngineState};
pub use error::{BootError, CameraError, PredictError};
pub use monitor::Monitor;
pub use policy::{Classifier, FrameOutcome, SamplingPolicy};
pub use score::ScoreInterpreter;
pub use state::{DetectionCell, DetectionSnapshot};
pub use status::StatusReport;
