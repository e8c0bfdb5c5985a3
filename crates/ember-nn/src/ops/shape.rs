use super::{OpContext, PrepareContext};
use crate::error::KernelError;
use crate::model::{MAX_OP_INPUTS, MAX_RANK, OpOptions};
use crate::tensor::{TensorMeta, TensorView};

pub(super) fn prepare_reshape(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(1, 2)?;
    if ctx.output().len() != ctx.input(0)?.len() {
        return Err(KernelError::Shape("reshape must preserve the element count"));
    }
    Ok(())
}

pub(super) fn eval_reshape(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let out = ctx.output();
    for i in 0..input.len() {
        out.set(i, input.get(i));
    }
    Ok(())
}

/// `(before, after)` per axis, aligned to rank 4.
fn paddings(input: TensorMeta<'_>, pads: TensorView<'_>) -> Result<[(usize, usize); MAX_RANK], KernelError> {
    let rank = input.rank();
    if pads.len() != rank * 2 {
        return Err(KernelError::Shape("paddings must be [rank, 2]"));
    }
    let mut out = [(0usize, 0usize); MAX_RANK];
    let offset = MAX_RANK - rank;
    for axis in 0..rank {
        let before = usize::try_from(pads.get_i32(axis * 2))
            .map_err(|_| KernelError::Shape("negative padding"))?;
        let after = usize::try_from(pads.get_i32(axis * 2 + 1))
            .map_err(|_| KernelError::Shape("negative padding"))?;
        out[offset + axis] = (before, after);
    }
    Ok(out)
}

pub(super) fn prepare_pad(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(2, 2)?;
    let input = ctx.input(0)?;
    let pads = paddings(input, ctx.constant(1)?)?;
    let id = input.dims4();
    let mut expected = [0usize; MAX_RANK];
    for d in 0..MAX_RANK {
        expected[d] = id[d] + pads[d].0 + pads[d].1;
    }
    if ctx.output().dims4() != expected || ctx.output().rank() != input.rank() {
        return Err(KernelError::Shape("pad output shape"));
    }
    Ok(())
}

/// Zero padding; integer outputs store their zero point.
pub(super) fn eval_pad(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let pads = paddings(input.meta(), ctx.input(1)?)?;
    let id = input.meta().dims4();
    let out = ctx.output();
    let od = out.meta().dims4();

    let inside = |d: usize, o: usize| o.checked_sub(pads[d].0).filter(|&i| i < id[d]);
    let mut o = 0usize;
    for o0 in 0..od[0] {
        for o1 in 0..od[1] {
            for o2 in 0..od[2] {
                for o3 in 0..od[3] {
                    let v = match (inside(0, o0), inside(1, o1), inside(2, o2), inside(3, o3)) {
                        (Some(i0), Some(i1), Some(i2), Some(i3)) => {
                            input.get(((i0 * id[1] + i1) * id[2] + i2) * id[3] + i3)
                        }
                        _ => 0.0,
                    };
                    out.set(o, v);
                    o += 1;
                }
            }
        }
    }
    Ok(())
}

fn concat_axis(options: &OpOptions, rank: usize) -> Result<usize, KernelError> {
    let OpOptions::Concat { axis, .. } = *options else {
        return Err(KernelError::Options);
    };
    let rank = rank as i32;
    let axis = if axis < 0 { axis + rank } else { axis };
    if (0..rank).contains(&axis) {
        Ok(axis as usize)
    } else {
        Err(KernelError::Shape("concatenation axis out of range"))
    }
}

pub(super) fn prepare_concat(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(1, MAX_OP_INPUTS)?;
    let output = ctx.output();
    let axis = concat_axis(ctx.options(), output.rank())?;
    let mut along = 0usize;
    for i in 0..ctx.input_count() {
        let input = ctx.input(i)?;
        if input.rank() != output.rank() {
            return Err(KernelError::Shape("concatenation inputs differ in rank"));
        }
        let same_elsewhere = input
            .shape
            .iter()
            .zip(output.shape)
            .enumerate()
            .all(|(d, (a, b))| d == axis || a == b);
        if !same_elsewhere {
            return Err(KernelError::Shape("concatenation inputs differ off-axis"));
        }
        along += input.shape[axis];
    }
    if along != output.shape[axis] {
        return Err(KernelError::Shape("concatenation output size along axis"));
    }
    Ok(())
}

pub(super) fn eval_concat(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let options = ctx.options();
    let OpOptions::Concat { activation, .. } = *options else {
        return Err(KernelError::Options);
    };
    let inputs = ctx.inputs;
    let out = ctx.output();
    let shape = out.meta().shape;
    let axis = concat_axis(options, shape.len())?;
    let outer: usize = shape[..axis].iter().product();

    let mut o = 0usize;
    for block in 0..outer {
        for input in inputs.iter().flatten() {
            let chunk = input.len() / outer;
            for k in 0..chunk {
                out.set(o, activation.apply(input.get(block * chunk + k)));
                o += 1;
            }
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
    fn reshape_keeps_values() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 2, 2, 1], q);
        let y = b.activation(ElementType::F32, &[1, 4], q);
        b.op(OpCode::Reshape, &[x], y, OpOptions::None);
        b.io(x, y);
        assert_eq!(run_single(&b.build(), &[1.0, 2.0, 3.0, 4.0]), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn pad_surrounds_with_zero() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 2], q);
        let pads = b.constant_i32(&[2, 2], &[0, 0, 1, 2]);
        let y = b.activation(ElementType::F32, &[1, 5], q);
        b.op(OpCode::Pad, &[x, pads], y, OpOptions::None);
        b.io(x, y);
        assert_eq!(run_single(&b.build(), &[7.0, 8.0]), vec![0.0, 7.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn concat_interleaves_along_last_axis() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[2, 1], q);
        let c = b.constant_f32(&[2, 2], &[10.0, 11.0, 20.0, 21.0]);
        let y = b.activation(ElementType::F32, &[2, 3], q);
        b.op(
            OpCode::Concatenation,
            &[x, c],
            y,
            OpOptions::Concat {
                axis: -1,
                activation: Activation::None,
            },
        );
        b.io(x, y);
        assert_eq!(
            run_single(&b.build(), &[1.0, 2.0]),
            vec![1.0, 10.0, 11.0, 2.0, 20.0, 21.0]
        );
    }
}
