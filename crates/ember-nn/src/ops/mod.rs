//! Operator kernels and the bounded resolver that registers them.
//!
//! Kernels compute in `f32` over NHWC tensors and requantize on store, so a
//! single implementation serves float and quantized graphs.

mod conv;
mod dense;
mod elementwise;
mod pool;
mod shape;
mod softmax;

use crate::error::{KernelError, ResolverError};
use crate::model::{MAX_OP_INPUTS, OpCode, OpOptions, TensorDesc};
use crate::tensor::{TensorMeta, TensorView, TensorViewMut};

/// Registrations the fire classifier resolver can hold.
pub const RESOLVER_CAPACITY: usize = 25;

/// Shape and constant access for an operator during allocation.
pub struct PrepareContext<'a, 'm> {
    pub(crate) inputs: [Option<&'a TensorDesc<'m>>; MAX_OP_INPUTS],
    pub(crate) input_count: usize,
    pub(crate) output: &'a TensorDesc<'m>,
    pub(crate) options: &'a OpOptions,
}

impl<'a, 'm> PrepareContext<'a, 'm> {
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn input(&self, i: usize) -> Result<TensorMeta<'a>, KernelError> {
        self.optional_input(i).ok_or(KernelError::MissingInput(i))
    }

    pub fn optional_input(&self, i: usize) -> Option<TensorMeta<'a>> {
        self.inputs.get(i).copied().flatten().map(TensorDesc::meta)
    }

    /// Input `i`, which must be baked into the model.
    pub fn constant(&self, i: usize) -> Result<TensorView<'a>, KernelError> {
        let desc = self
            .inputs
            .get(i)
            .copied()
            .flatten()
            .ok_or(KernelError::MissingInput(i))?;
        desc.data
            .and_then(|data| TensorView::new(desc.meta(), data))
            .ok_or(KernelError::NotConstant(i))
    }

    pub fn output(&self) -> TensorMeta<'a> {
        self.output.meta()
    }

    pub fn options(&self) -> &'a OpOptions {
        self.options
    }

    pub(crate) fn expect_inputs(&self, min: usize, max: usize) -> Result<(), KernelError> {
        if (min..=max).contains(&self.input_count) {
            Ok(())
        } else {
            Err(KernelError::InputCount {
                min,
                max,
                actual: self.input_count,
            })
        }
    }
}

/// Tensor access for one operator evaluation.
pub struct OpContext<'a> {
    pub(crate) inputs: [Option<TensorView<'a>>; MAX_OP_INPUTS],
    pub(crate) output: TensorViewMut<'a>,
    pub(crate) options: &'a OpOptions,
}

impl<'a> OpContext<'a> {
    pub fn input(&self, i: usize) -> Result<TensorView<'a>, KernelError> {
        self.optional_input(i).ok_or(KernelError::MissingInput(i))
    }

    pub fn optional_input(&self, i: usize) -> Option<TensorView<'a>> {
        self.inputs.get(i).copied().flatten()
    }

    pub fn output(&mut self) -> &mut TensorViewMut<'a> {
        &mut self.output
    }

    pub fn options(&self) -> &'a OpOptions {
        self.options
    }
}

pub type PrepareFn = fn(&PrepareContext<'_, '_>) -> Result<(), KernelError>;
pub type EvalFn = fn(&mut OpContext<'_>) -> Result<(), KernelError>;

#[derive(Clone, Copy)]
pub struct Registration {
    pub code: OpCode,
    pub prepare: PrepareFn,
    pub eval: EvalFn,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("code", &self.code).finish()
    }
}

/// Built-in kernel for `code`.
pub fn builtin(code: OpCode) -> Registration {
    let (prepare, eval): (PrepareFn, EvalFn) = match code {
        OpCode::Conv2D => (conv::prepare_conv, conv::eval_conv),
        OpCode::DepthwiseConv2D => (conv::prepare_depthwise, conv::eval_depthwise),
        OpCode::AveragePool2D => (pool::prepare_average, pool::eval_average),
        OpCode::Mean => (pool::prepare_mean, pool::eval_mean),
        OpCode::FullyConnected => (dense::prepare, dense::eval),
        OpCode::Softmax => (softmax::prepare, softmax::eval),
        OpCode::Logistic => (softmax::prepare_logistic, softmax::eval_logistic),
        OpCode::Add => (elementwise::prepare_binary, elementwise::eval_add),
        OpCode::Mul => (elementwise::prepare_binary, elementwise::eval_mul),
        OpCode::Minimum => (elementwise::prepare_binary, elementwise::eval_minimum),
        OpCode::Maximum => (elementwise::prepare_binary, elementwise::eval_maximum),
        OpCode::Quantize | OpCode::Dequantize => {
            (elementwise::prepare_convert, elementwise::eval_convert)
        }
        OpCode::Reshape => (shape::prepare_reshape, shape::eval_reshape),
        OpCode::Pad => (shape::prepare_pad, shape::eval_pad),
        OpCode::Concatenation => (shape::prepare_concat, shape::eval_concat),
    };
    Registration {
        code,
        prepare,
        eval,
    }
}

/// Fixed-capacity operator registry.
///
/// Only registered operators can be instantiated; a model using anything
/// else fails at allocation time.
#[derive(Debug, Clone)]
pub struct OpResolver<const N: usize> {
    entries: [Option<Registration>; N],
    len: usize,
}

impl<const N: usize> Default for OpResolver<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> OpResolver<N> {
    pub fn new() -> Self {
        Self {
            entries: [None; N],
            len: 0,
        }
    }

    /// Registers the built-in kernel for `code`.
    pub fn add(&mut self, code: OpCode) -> Result<(), ResolverError> {
        self.register(builtin(code))
    }

    pub fn register(&mut self, registration: Registration) -> Result<(), ResolverError> {
        if self.find(registration.code).is_some() {
            return Err(ResolverError::Duplicate(registration.code));
        }
        let slot = self
            .entries
            .get_mut(self.len)
            .ok_or(ResolverError::Full { capacity: N })?;
        *slot = Some(registration);
        self.len += 1;
        Ok(())
    }

    pub fn find(&self, code: OpCode) -> Option<&Registration> {
        self.entries[..self.len]
            .iter()
            .flatten()
            .find(|r| r.code == code)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

/// Resolver holding the sixteen operators the fire classifier uses.
pub fn fire_ops() -> Result<OpResolver<RESOLVER_CAPACITY>, ResolverError> {
    let mut resolver = OpResolver::new();
    for code in OpCode::ALL {
        resolver.add(code)?;
    }
    Ok(resolver)
}

/// Output spatial size and leading pad for one axis.
pub(crate) fn conv_out(
    padding: crate::model::Padding,
    input: usize,
    filter: usize,
    stride: usize,
) -> (usize, usize) {
    use crate::model::Padding;
    match padding {
        Padding::Valid => ((input.saturating_sub(filter)) / stride + 1, 0),
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = ((out - 1) * stride + filter).saturating_sub(input);
            (out, needed / 2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OpResolver, RESOLVER_CAPACITY, conv_out, fire_ops};
    use crate::error::ResolverError;
    use crate::model::{OpCode, Padding};

    #[test]
    fn fire_resolver_registers_every_opcode() {
        let resolver = fire_ops().expect("fits");
        assert_eq!(resolver.len(), 16);
        assert_eq!(resolver.capacity(), RESOLVER_CAPACITY);
        for code in OpCode::ALL {
            assert!(resolver.find(code).is_some(), "{code:?} missing");
        }
    }

    #[test]
    fn resolver_is_bounded_and_rejects_duplicates() {
        let mut resolver = OpResolver::<2>::new();
        resolver.add(OpCode::Add).expect("fits");
        assert_eq!(resolver.add(OpCode::Add), Err(ResolverError::Duplicate(OpCode::Add)));
        resolver.add(OpCode::Mul).expect("fits");
        assert_eq!(
            resolver.add(OpCode::Softmax),
            Err(ResolverError::Full { capacity: 2 })
        );
        assert!(resolver.find(OpCode::Softmax).is_none());
    }

    #[test]
    fn padding_geometry() {
        assert_eq!(conv_out(Padding::Same, 96, 3, 2), (48, 0));
        assert_eq!(conv_out(Padding::Same, 5, 3, 1), (5, 1));
        assert_eq!(conv_out(Padding::Valid, 5, 3, 1), (3, 0));
        assert_eq!(conv_out(Padding::Valid, 96, 3, 2), (47, 0));
    }
}
