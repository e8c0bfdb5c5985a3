//! Static-arena neural network interpreter.
//!
//! A [`Model`] is parsed from a versioned descriptor that borrows its
//! constants, every operator is resolved against a bounded [`OpResolver`],
//! and all activations are placed in one [`TensorArena`] by a lifetime-aware
//! plan. Nothing is allocated once the [`Interpreter`] is built.

mod arena;
mod builder;
mod error;
mod interpreter;
mod model;
mod ops;
mod tensor;

pub use arena::{ArenaPlan, ArenaPool, HeapPool, TENSOR_ALIGN, TensorArena};
pub use builder::ModelBuilder;
pub use error::{AllocError, ArenaError, InvokeError, KernelError, ModelError, ResolverError};
pub use interpreter::Interpreter;
pub use model::{
    ABSENT_TENSOR, Activation, ConvOptions, ElementType, MAGIC, MAX_OP_INPUTS, MAX_RANK, Model,
    OpCode, OpOptions, Operator, Padding, PoolOptions, Quantization, SCHEMA_VERSION, TensorDesc,
};
pub use ops::{
    EvalFn, OpContext, OpResolver, PrepareContext, PrepareFn, RESOLVER_CAPACITY, Registration,
    builtin, fire_ops,
};
pub use tensor::{TensorMeta, TensorView, TensorViewMut};

#[cfg(test)]
pub(crate) mod testing {
    use crate::{AllocError, HeapPool, Interpreter, Model, TensorArena, fire_ops};

    pub fn try_build(bytes: &[u8]) -> Result<Interpreter<'_>, AllocError> {
        let model = Model::parse(bytes).expect("valid model");
        let resolver = fire_ops().expect("resolver");
        let arena = TensorArena::allocate(64 * 1024, &HeapPool::external(), &HeapPool::internal())
            .expect("arena");
        Interpreter::new(model, &resolver, arena)
    }

    /// Runs a model with an `f32` input and returns its output as reals.
    pub fn run_single(bytes: &[u8], input: &[f32]) -> Vec<f32> {
        let mut interp = try_build(bytes).expect("allocates");
        let dst = interp.input_mut();
        assert_eq!(dst.len(), input.len() * 4, "input size");
        for (chunk, v) in dst.chunks_exact_mut(4).zip(input) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        interp.invoke().expect("invokes");
        interp.output().to_vec()
    }
}
