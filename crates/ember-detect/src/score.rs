use ember_core::TensorRepr;
use ember_nn::{ElementType, TensorMeta};

use crate::error::BootError;

/// Turns the model output into a single fire probability.
///
/// A one-element output is the probability itself; with two elements index 1
/// is the fire class. Wider outputs are rejected when binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInterpreter {
    repr: TensorRepr,
    fire_index: usize,
}

impl ScoreInterpreter {
    pub fn new(repr: TensorRepr, elements: usize) -> Result<Self, BootError> {
        let fire_index = match elements {
            1 => 0,
            2 => 1,
            n => return Err(BootError::OutputArity(n)),
        };
        if let TensorRepr::SignedByte { scale, .. } = repr
            && !repr.is_well_formed()
        {
            return Err(BootError::OutputQuantization(scale));
        }
        Ok(Self { repr, fire_index })
    }

    /// Binds to the model's output tensor.
    pub fn bind(meta: TensorMeta<'_>) -> Result<Self, BootError> {
        let repr = match meta.dtype {
            ElementType::F32 => TensorRepr::Float,
            ElementType::U8 => TensorRepr::UnsignedByte,
            ElementType::I8 => TensorRepr::SignedByte {
                scale: meta.quant.scale,
                zero_point: meta.quant.zero_point,
            },
            other => return Err(BootError::OutputType(other)),
        };
        Self::new(repr, meta.len())
    }

    pub fn repr(&self) -> TensorRepr {
        self.repr
    }

    pub fn fire_index(&self) -> usize {
        self.fire_index
    }

    /// Fire probability in `[0, 1]`; NaN and short buffers read as 0.
    pub fn read(&self, output: &[u8]) -> f32 {
        let score = self.repr.decode(output, self.fire_index).unwrap_or(0.0);
        if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
    }
}
