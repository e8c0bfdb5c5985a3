use ember_core::{GammaTable, TensorRepr};
use ember_nn::{
    ArenaPool, ElementType, HeapPool, Interpreter, Model, TensorArena, TensorMeta, fire_ops,
};
use ember_prep::{Preprocessor, decode_rgb888};

use crate::config::EngineConfig;
use crate::error::{BootError, PredictError};
use crate::policy::Classifier;
use crate::score::ScoreInterpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Failed,
}

#[derive(Debug)]
struct Runtime<'m> {
    interpreter: Interpreter<'m>,
    prep: Preprocessor,
    score: ScoreInterpreter,
    gamma: GammaTable,
}

#[derive(Debug)]
enum Lifecycle<'m> {
    Uninitialized,
    Ready(Box<Runtime<'m>>),
    Failed(BootError),
}

/// The fire classifier: owns the tensor arena, the interpreter and the bound
/// input and output representations.
///
/// Initialization is one-shot. `Ready` and `Failed` are terminal.
pub struct Engine<'m> {
    model: &'m [u8],
    config: EngineConfig,
    primary: Box<dyn ArenaPool + Send>,
    secondary: Box<dyn ArenaPool + Send>,
    lifecycle: Lifecycle<'m>,
}

impl std::fmt::Debug for Engine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("model_bytes", &self.model.len())
            .field("config", &self.config)
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.name())
            .field("state", &self.state())
            .finish()
    }
}

impl<'m> Engine<'m> {
    /// An uninitialized engine using the external heap pool first and the
    /// internal one as fallback.
    pub fn new(model: &'m [u8], config: EngineConfig) -> Self {
        Self::with_pools(
            model,
            config,
            Box::new(HeapPool::external()),
            Box::new(HeapPool::internal()),
        )
    }

    pub fn with_pools(
        model: &'m [u8],
        config: EngineConfig,
        primary: Box<dyn ArenaPool + Send>,
        secondary: Box<dyn ArenaPool + Send>,
    ) -> Self {
        Self {
            model,
            config,
            primary,
            secondary,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn state(&self) -> EngineState {
        match self.lifecycle {
            Lifecycle::Uninitialized => EngineState::Uninitialized,
            Lifecycle::Ready(_) => EngineState::Ready,
            Lifecycle::Failed(_) => EngineState::Failed,
        }
    }

    pub fn boot_error(&self) -> Option<&BootError> {
        match &self.lifecycle {
            Lifecycle::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Allocates the arena, loads the model, binds tensors and builds the
    /// gamma table.
    ///
    /// Only the first call does anything; later calls return
    /// [`BootError::AlreadyInitialized`] and leave the state alone.
    pub fn init(&mut self, gamma_exponent: f32) -> Result<(), BootError> {
        if !matches!(self.lifecycle, Lifecycle::Uninitialized) {
            return Err(BootError::AlreadyInitialized);
        }
        match self.boot(gamma_exponent) {
            Ok(runtime) => {
                tracing::info!(
                    arena_size = runtime.interpreter.arena_size(),
                    arena_used = runtime.interpreter.arena_used(),
                    input = ?runtime.prep.repr(),
                    output = ?runtime.score.repr(),
                    "engine ready"
                );
                self.lifecycle = Lifecycle::Ready(Box::new(runtime));
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "engine initialization failed");
                self.lifecycle = Lifecycle::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn boot(&self, gamma_exponent: f32) -> Result<Runtime<'m>, BootError> {
        let cfg = &self.config;
        let gamma = GammaTable::new(gamma_exponent);
        let arena = TensorArena::allocate(cfg.arena_size, &*self.primary, &*self.secondary)?;
        tracing::info!(bytes = arena.len(), pool = arena.source(), "tensor arena allocated");

        let model = Model::parse(self.model)?;
        let resolver = fire_ops()?;
        let interpreter = Interpreter::new(model, &resolver, arena)?;

        let input_repr = bind_input(interpreter.input_meta(), cfg.input_shape())?;
        let score = ScoreInterpreter::bind(interpreter.output_meta())?;
        let prep = Preprocessor::new(
            cfg.source_width,
            cfg.source_height,
            cfg.tensor_width,
            cfg.tensor_height,
            &gamma,
            input_repr,
        )?;

        Ok(Runtime {
            interpreter,
            prep,
            score,
            gamma,
        })
    }

    /// Fire probability for one JPEG frame.
    ///
    /// Never fails: any error is logged and scored as `0.0`.
    pub fn predict(&mut self, jpeg: &[u8]) -> f32 {
        match self.try_predict(jpeg) {
            Ok(score) => score,
            Err(err) => {
                tracing::warn!(error = %err, "prediction failed, scoring frame as 0");
                0.0
            }
        }
    }

    pub fn try_predict(&mut self, jpeg: &[u8]) -> Result<f32, PredictError> {
        let Lifecycle::Ready(rt) = &mut self.lifecycle else {
            return Err(PredictError::NotReady);
        };
        if jpeg.is_empty() {
            return Err(PredictError::EmptyFrame);
        }

        {
            let rgb = decode_rgb888(jpeg, self.config.source_width, self.config.source_height)?;
            rt.prep.fill(&rgb.as_view(), rt.interpreter.input_mut())?;
        }
        rt.interpreter.invoke()?;
        let score = rt.score.read(rt.interpreter.output().bytes());
        tracing::debug!(score, "frame scored");
        Ok(score)
    }

    /// Input tensor bytes, once ready.
    pub fn input_tensor(&self) -> Option<&[u8]> {
        match &self.lifecycle {
            Lifecycle::Ready(rt) => Some(rt.interpreter.input()),
            _ => None,
        }
    }

    /// Gamma table built at initialization.
    pub fn gamma(&self) -> Option<&GammaTable> {
        match &self.lifecycle {
            Lifecycle::Ready(rt) => Some(&rt.gamma),
            _ => None,
        }
    }

    pub fn input_repr(&self) -> Option<TensorRepr> {
        match &self.lifecycle {
            Lifecycle::Ready(rt) => Some(rt.prep.repr()),
            _ => None,
        }
    }
}

impl Classifier for Engine<'_> {
    fn predict(&mut self, jpeg: &[u8]) -> f32 {
        Engine::predict(self, jpeg)
    }
}

/// Checks the model input against the configured tensor and resolves its
/// representation.
fn bind_input(meta: TensorMeta<'_>, expected: [usize; 4]) -> Result<TensorRepr, BootError> {
    if meta.shape != expected {
        return Err(BootError::InputShape {
            expected,
            actual: meta.shape.to_vec(),
        });
    }
    match meta.dtype {
        ElementType::U8 => Ok(TensorRepr::UnsignedByte),
        ElementType::I8 => {
            let repr = TensorRepr::SignedByte {
                scale: meta.quant.scale,
                zero_point: meta.quant.zero_point,
            };
            if repr.is_well_formed() {
                Ok(repr)
            } else {
                Err(BootError::InputQuantization(meta.quant.scale))
            }
        }
        ElementType::F32 => Ok(TensorRepr::Float),
        other => Err(BootError::InputType(other)),
    }
}
