use super::{OpContext, PrepareContext};
use crate::error::KernelError;
use crate::model::{Activation, OpOptions};
use crate::tensor::TensorMeta;

/// `small` broadcasts against `out` when it is a scalar or its shape, minus
/// leading ones, is a suffix of `out`'s shape.
fn broadcasts(small: TensorMeta<'_>, out: TensorMeta<'_>) -> bool {
    if small.len() == 1 {
        return true;
    }
    let start = small.shape.iter().position(|&d| d != 1).unwrap_or(small.shape.len());
    let trimmed = &small.shape[start..];
    out.shape.ends_with(trimmed)
}

pub(super) fn prepare_binary(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(2, 2)?;
    let (a, b, out) = (ctx.input(0)?, ctx.input(1)?, ctx.output());
    if out.len() != a.len().max(b.len()) || !broadcasts(a, out) || !broadcasts(b, out) {
        return Err(KernelError::Shape("operands do not broadcast to the output"));
    }
    Ok(())
}

fn fused(options: &OpOptions) -> Activation {
    match *options {
        OpOptions::Fused(a) => a,
        _ => Activation::None,
    }
}

fn eval_binary(ctx: &mut OpContext<'_>, f: impl Fn(f32, f32) -> f32) -> Result<(), KernelError> {
    let a = ctx.input(0)?;
    let b = ctx.input(1)?;
    let act = fused(ctx.options());
    let out = ctx.output();
    for i in 0..out.len() {
        let v = f(a.get(i % a.len()), b.get(i % b.len()));
        out.set(i, act.apply(v));
    }
    Ok(())
}

pub(super) fn eval_add(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    eval_binary(ctx, |a, b| a + b)
}

pub(super) fn eval_mul(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    eval_binary(ctx, |a, b| a * b)
}

pub(super) fn eval_minimum(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    eval_binary(ctx, f32::min)
}

pub(super) fn eval_maximum(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    eval_binary(ctx, f32::max)
}

pub(super) fn prepare_convert(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(1, 1)?;
    if ctx.output().len() != ctx.input(0)?.len() {
        return Err(KernelError::Shape("conversion output must match input"));
    }
    Ok(())
}

/// Quantize and dequantize: both requantize element by element.
pub(super) fn eval_convert(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let out = ctx.output();
    for i in 0..input.len() {
        out.set(i, input.get(i));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builder::ModelBuilder;
    use crate::model::{Activation, ElementType, OpCode, OpOptions, Quantization};
    use crate::testing::{run_single, try_build};

    fn binary(code: OpCode, rhs_shape: &[usize], rhs: &[f32], options: OpOptions) -> Vec<u8> {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 2, 2], q);
        let c = b.constant_f32(rhs_shape, rhs);
        let y = b.activation(ElementType::F32, &[1, 2, 2], q);
        b.op(code, &[x, c], y, options);
        b.io(x, y);
        b.build()
    }

    #[test]
    fn add_broadcasts_trailing_axis() {
        let model = binary(OpCode::Add, &[2], &[10.0, 20.0], OpOptions::Fused(Activation::None));
        assert_eq!(
            run_single(&model, &[1.0, 2.0, 3.0, 4.0]),
            vec![11.0, 22.0, 13.0, 24.0]
        );
    }

    #[test]
    fn mul_with_scalar_and_relu() {
        let model = binary(OpCode::Mul, &[1], &[-2.0], OpOptions::Fused(Activation::Relu));
        assert_eq!(run_single(&model, &[1.0, -2.0, 3.0, -4.0]), vec![0.0, 4.0, 0.0, 8.0]);
    }

    #[test]
    fn minimum_and_maximum() {
        let min = binary(OpCode::Minimum, &[1, 1, 2], &[0.0, 5.0], OpOptions::None);
        let max = binary(OpCode::Maximum, &[1, 1, 2], &[0.0, 5.0], OpOptions::None);
        let input = [-1.0, 6.0, 1.0, 2.0];
        assert_eq!(run_single(&min, &input), vec![-1.0, 5.0, 0.0, 2.0]);
        assert_eq!(run_single(&max, &input), vec![0.0, 6.0, 1.0, 5.0]);
    }

    #[test]
    fn incompatible_shapes_fail_to_prepare() {
        let model = binary(OpCode::Add, &[3], &[1.0, 2.0, 3.0], OpOptions::Fused(Activation::None));
        assert!(try_build(&model).is_err());
    }

    #[test]
    fn quantize_then_dequantize() {
        let mut b = ModelBuilder::new();
        let x = b.activation(ElementType::F32, &[3], Quantization::default());
        let q = b.activation(ElementType::U8, &[3], Quantization::new(0.5, 10));
        let y = b.activation(ElementType::F32, &[3], Quantization::default());
        b.op(OpCode::Quantize, &[x], q, OpOptions::None);
        b.op(OpCode::Dequantize, &[q], y, OpOptions::None);
        b.io(x, y);

        // -10 saturates at stored 0 -> real -5
        assert_eq!(run_single(&b.build(), &[1.0, 1.2, -10.0]), vec![1.0, 1.0, -5.0]);
    }
}
