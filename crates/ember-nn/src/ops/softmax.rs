use super::{OpContext, PrepareContext};
use crate::error::KernelError;
use crate::model::OpOptions;

pub(super) fn prepare(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(1, 1)?;
    let OpOptions::Softmax { beta } = *ctx.options() else {
        return Err(KernelError::Options);
    };
    if !beta.is_finite() {
        return Err(KernelError::Options);
    }
    let input = ctx.input(0)?;
    if input.rank() == 0 || ctx.output().shape != input.shape {
        return Err(KernelError::Shape("softmax output must match input"));
    }
    Ok(())
}

/// Softmax over the innermost axis.
pub(super) fn eval(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let OpOptions::Softmax { beta } = *ctx.options() else {
        return Err(KernelError::Options);
    };
    let depth = input.meta().shape.last().copied().unwrap_or(1);
    let out = ctx.output();

    for row in 0..input.len() / depth {
        let base = row * depth;
        let max = (0..depth)
            .map(|d| input.get(base + d))
            .fold(f32::NEG_INFINITY, f32::max);
        let sum: f32 = (0..depth)
            .map(|d| ((input.get(base + d) - max) * beta).exp())
            .sum();
        for d in 0..depth {
            out.set(base + d, ((input.get(base + d) - max) * beta).exp() / sum);
        }
    }
    Ok(())
}

pub(super) fn prepare_logistic(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(1, 1)?;
    if ctx.output().len() != ctx.input(0)?.len() {
        return Err(KernelError::Shape("logistic output must match input"));
    }
    Ok(())
}

pub(super) fn eval_logistic(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let out = ctx.output();
    for i in 0..input.len() {
        out.set(i, 1.0 / (1.0 + (-input.get(i)).exp()));
    }
    Ok(())
}
