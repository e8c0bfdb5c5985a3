use std::ops::Range;

use crate::arena::{ArenaPlan, TensorArena};
use crate::error::{AllocError, InvokeError};
use crate::model::{MAX_OP_INPUTS, Model, TensorDesc};
use crate::ops::{OpContext, OpResolver, PrepareContext, Registration};
use crate::tensor::{TensorMeta, TensorView, TensorViewMut};

/// Executes a parsed model inside a fixed tensor arena.
///
/// Construction resolves every operator, plans tensor placement, checks the
/// plan fits the arena and runs each kernel's prepare step. After that,
/// [`Interpreter::invoke`] performs no allocation.
#[derive(Debug)]
pub struct Interpreter<'m> {
    model: Model<'m>,
    kernels: Vec<Registration>,
    plan: ArenaPlan,
    arena: TensorArena,
}

impl<'m> Interpreter<'m> {
    pub fn new<const N: usize>(
        model: Model<'m>,
        resolver: &OpResolver<N>,
        arena: TensorArena,
    ) -> Result<Self, AllocError> {
        let mut kernels = Vec::with_capacity(model.operators().len());
        for (op, operator) in model.operators().iter().enumerate() {
            let registration = resolver
                .find(operator.code)
                .ok_or(AllocError::UnregisteredOperator {
                    op,
                    code: operator.code,
                })?;
            kernels.push(*registration);
        }

        let plan = ArenaPlan::new(&model);
        if plan.required() > arena.len() {
            return Err(AllocError::ArenaTooSmall {
                required: plan.required(),
                available: arena.len(),
            });
        }

        for (op, (operator, kernel)) in model.operators().iter().zip(&kernels).enumerate() {
            let tensors = model.tensors();
            let mut inputs = [None; MAX_OP_INPUTS];
            for (slot, index) in inputs.iter_mut().zip(&operator.inputs) {
                *slot = index.map(|i| &tensors[i]);
            }
            let ctx = PrepareContext {
                inputs,
                input_count: operator.inputs.len(),
                output: &tensors[operator.output],
                options: &operator.options,
            };
            (kernel.prepare)(&ctx).map_err(|source| AllocError::Prepare {
                op,
                code: operator.code,
                source,
            })?;
        }

        tracing::debug!(
            operators = kernels.len(),
            arena_used = plan.required(),
            arena_size = arena.len(),
            arena_pool = arena.source(),
            "tensors allocated"
        );
        Ok(Self {
            model,
            kernels,
            plan,
            arena,
        })
    }

    pub fn model(&self) -> &Model<'m> {
        &self.model
    }

    /// Bytes of the arena the tensor plan occupies.
    pub fn arena_used(&self) -> usize {
        self.plan.required()
    }

    pub fn arena_size(&self) -> usize {
        self.arena.len()
    }

    pub fn input_meta(&self) -> TensorMeta<'_> {
        self.model.tensors()[self.model.input_index()].meta()
    }

    pub fn output_meta(&self) -> TensorMeta<'_> {
        self.model.tensors()[self.model.output_index()].meta()
    }

    /// Raw bytes of the input tensor.
    pub fn input_mut(&mut self) -> &mut [u8] {
        let range = self.range(self.model.input_index());
        &mut self.arena.bytes_mut()[range]
    }

    pub fn input(&self) -> &[u8] {
        &self.arena.bytes()[self.range(self.model.input_index())]
    }

    pub fn output(&self) -> TensorView<'_> {
        let index = self.model.output_index();
        let meta = self.model.tensors()[index].meta();
        TensorView::planned(meta, &self.arena.bytes()[self.range(index)])
    }

    /// Runs every operator in order.
    pub fn invoke(&mut self) -> Result<(), InvokeError> {
        let tensors = self.model.tensors();
        for (op, (operator, kernel)) in self.model.operators().iter().zip(&self.kernels).enumerate() {
            let out_range = range_of(&self.plan, tensors, operator.output);
            let (head, rest) = self.arena.bytes_mut().split_at_mut(out_range.start);
            let (out_bytes, tail) = rest.split_at_mut(out_range.len());
            let head: &[u8] = head;
            let tail: &[u8] = tail;

            let mut inputs = [None; MAX_OP_INPUTS];
            for (slot, index) in inputs.iter_mut().zip(&operator.inputs) {
                let Some(t) = *index else { continue };
                let desc = &tensors[t];
                let bytes = match desc.data {
                    Some(data) => data,
                    None => {
                        let r = range_of(&self.plan, tensors, t);
                        if r.end <= out_range.start {
                            &head[r]
                        } else if r.start >= out_range.end {
                            &tail[r.start - out_range.end..r.end - out_range.end]
                        } else {
                            return Err(InvokeError::Aliasing { op });
                        }
                    }
                };
                *slot = TensorView::new(desc.meta(), bytes);
            }

            let output = TensorViewMut::new(tensors[operator.output].meta(), out_bytes)
                .ok_or(InvokeError::Aliasing { op })?;
            let mut ctx = OpContext {
                inputs,
                output,
                options: &operator.options,
            };
            (kernel.eval)(&mut ctx).map_err(|source| InvokeError::Kernel {
                op,
                code: operator.code,
                source,
            })?;
        }
        Ok(())
    }

    fn range(&self, tensor: usize) -> Range<usize> {
        range_of(&self.plan, self.model.tensors(), tensor)
    }
}

/// Arena bytes of an activation tensor. Every tensor an operator touches is
/// placed by the plan.
fn range_of(plan: &ArenaPlan, tensors: &[TensorDesc<'_>], tensor: usize) -> Range<usize> {
    let start = plan.offset(tensor).unwrap_or(0);
    start..start + tensors[tensor].byte_len()
}
