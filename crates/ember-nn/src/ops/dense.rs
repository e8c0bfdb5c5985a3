use super::{OpContext, PrepareContext};
use crate::error::KernelError;
use crate::model::{Activation, OpOptions};

fn activation(options: &OpOptions) -> Result<Activation, KernelError> {
    match *options {
        OpOptions::Fused(a) => Ok(a),
        _ => Err(KernelError::Options),
    }
}

pub(super) fn prepare(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(2, 3)?;
    activation(ctx.options())?;
    let input = ctx.input(0)?;
    let weights = ctx.input(1)?;
    if weights.rank() != 2 {
        return Err(KernelError::Shape("weights must be [units, depth]"));
    }
    let (units, depth) = (weights.shape[0], weights.shape[1]);
    if !input.len().is_multiple_of(depth) {
        return Err(KernelError::Shape("input size is not a multiple of weight depth"));
    }
    if let Some(bias) = ctx.optional_input(2)
        && bias.len() != units
    {
        return Err(KernelError::Shape("bias length differs from units"));
    }
    if ctx.output().len() != input.len() / depth * units {
        return Err(KernelError::Shape("fully connected output size"));
    }
    Ok(())
}

pub(super) fn eval(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let weights = ctx.input(1)?;
    let bias = ctx.optional_input(2);
    let act = activation(ctx.options())?;
    let (units, depth) = match weights.meta().shape {
        &[units, depth] => (units, depth),
        _ => return Err(KernelError::Shape("weights must be [units, depth]")),
    };
    let batches = input.len() / depth;
    let out = ctx.output();

    for b in 0..batches {
        for u in 0..units {
            let mut acc = bias.map_or(0.0, |t| t.get(u));
            for d in 0..depth {
                acc += input.get(b * depth + d) * weights.get(u * depth + d);
            }
            out.set(b * units + u, act.apply(acc));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builder::ModelBuilder;
    use crate::model::{Activation, ElementType, OpCode, OpOptions, Quantization};
    use crate::testing::run_single;

    #[test]
    fn dense_with_bias_and_relu6() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 3], q);
        let w = b.constant_f32(&[2, 3], &[1.0, 1.0, 1.0, -1.0, 0.0, 2.0]);
        let bias = b.constant_f32(&[2], &[0.5, 0.0]);
        let y = b.activation(ElementType::F32, &[1, 2], q);
        b.op(OpCode::FullyConnected, &[x, w, bias], y, OpOptions::Fused(Activation::Relu6));
        b.io(x, y);

        assert_eq!(run_single(&b.build(), &[1.0, 2.0, 3.0]), vec![6.0, 5.0]);
        assert_eq!(run_single(&b.build(), &[3.0, 0.0, 0.0]), vec![3.5, 0.0]);
    }

    #[test]
    fn quantized_weights_are_dequantized() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 2], q);
        let w = b.constant_i8(&[1, 2], &[4, -4], Quantization::new(0.25, 0));
        let y = b.activation(ElementType::F32, &[1, 1], q);
        b.op(OpCode::FullyConnected, &[x, w], y, OpOptions::Fused(Activation::None));
        b.io(x, y);

        assert_eq!(run_single(&b.build(), &[3.0, 1.0]), vec![2.0]);
    }
}
