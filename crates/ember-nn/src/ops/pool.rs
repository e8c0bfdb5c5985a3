use super::{OpContext, PrepareContext, conv_out};
use crate::error::KernelError;
use crate::model::{MAX_RANK, OpOptions, PoolOptions};
use crate::tensor::{TensorMeta, TensorView};

fn pool_options(options: &OpOptions) -> Result<PoolOptions, KernelError> {
    match *options {
        OpOptions::Pool(p)
            if p.stride_w > 0 && p.stride_h > 0 && p.filter_w > 0 && p.filter_h > 0 =>
        {
            Ok(p)
        }
        _ => Err(KernelError::Options),
    }
}

pub(super) fn prepare_average(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(1, 1)?;
    let opts = pool_options(ctx.options())?;
    let input = ctx.input(0)?;
    if input.rank() != 4 {
        return Err(KernelError::Shape("average pool expects rank-4 input"));
    }
    let [n, h, w, c] = input.dims4();
    let (out_h, _) = conv_out(opts.padding, h, opts.filter_h, opts.stride_h);
    let (out_w, _) = conv_out(opts.padding, w, opts.filter_w, opts.stride_w);
    if ctx.output().dims4() != [n, out_h, out_w, c] {
        return Err(KernelError::Shape("average pool output shape"));
    }
    Ok(())
}

/// Averages over the filter taps that fall inside the input.
pub(super) fn eval_average(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let opts = pool_options(ctx.options())?;
    let [batch, in_h, in_w, ch] = input.meta().dims4();
    let (out_h, pad_top) = conv_out(opts.padding, in_h, opts.filter_h, opts.stride_h);
    let (out_w, pad_left) = conv_out(opts.padding, in_w, opts.filter_w, opts.stride_w);
    let out = ctx.output();

    for n in 0..batch {
        for oy in 0..out_h {
            let y0 = (oy * opts.stride_h).saturating_sub(pad_top);
            let y1 = (oy * opts.stride_h + opts.filter_h).saturating_sub(pad_top).min(in_h);
            for ox in 0..out_w {
                let x0 = (ox * opts.stride_w).saturating_sub(pad_left);
                let x1 = (ox * opts.stride_w + opts.filter_w).saturating_sub(pad_left).min(in_w);
                let count = (y1.saturating_sub(y0) * x1.saturating_sub(x0)).max(1) as f32;
                for c in 0..ch {
                    let mut sum = 0.0f32;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            sum += input.get(((n * in_h + y) * in_w + x) * ch + c);
                        }
                    }
                    let o = ((n * out_h + oy) * out_w + ox) * ch + c;
                    out.set(o, opts.activation.apply(sum / count));
                }
            }
        }
    }
    Ok(())
}

/// Reduction mask over the rank-4 padded input.
fn reduced_axes(input: TensorMeta<'_>, axes: TensorView<'_>) -> Result<[bool; MAX_RANK], KernelError> {
    let rank = input.rank() as i32;
    let offset = MAX_RANK - input.rank();
    let mut mask = [false; MAX_RANK];
    for i in 0..axes.len() {
        let mut axis = axes.get_i32(i);
        if axis < 0 {
            axis += rank;
        }
        if !(0..rank).contains(&axis) {
            return Err(KernelError::Shape("mean axis out of range"));
        }
        mask[offset + axis as usize] = true;
    }
    Ok(mask)
}

pub(super) fn prepare_mean(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    ctx.expect_inputs(2, 2)?;
    let OpOptions::Reduce { keep_dims } = *ctx.options() else {
        return Err(KernelError::Options);
    };
    let input = ctx.input(0)?;
    let mask = reduced_axes(input, ctx.constant(1)?)?;
    let dims = input.dims4();
    let kept: usize = (0..MAX_RANK).filter(|&d| !mask[d]).map(|d| dims[d]).product();

    let output = ctx.output();
    if output.len() != kept || (keep_dims && output.rank() != input.rank()) {
        return Err(KernelError::Shape("mean output shape"));
    }
    Ok(())
}

pub(super) fn eval_mean(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let mask = reduced_axes(input.meta(), ctx.input(1)?)?;
    let id = input.meta().dims4();
    let mut od = id;
    let mut count = 1usize;
    for d in 0..MAX_RANK {
        if mask[d] {
            od[d] = 1;
            count *= id[d];
        }
    }
    let inv = 1.0 / count as f32;
    let span = |d: usize, o: usize| if mask[d] { 0..id[d] } else { o..o + 1 };
    let out = ctx.output();

    let mut o = 0usize;
    for o0 in 0..od[0] {
        for o1 in 0..od[1] {
            for o2 in 0..od[2] {
                for o3 in 0..od[3] {
                    let mut sum = 0.0f32;
                    for i0 in span(0, o0) {
                        for i1 in span(1, o1) {
                            for i2 in span(2, o2) {
                                let row = ((i0 * id[1] + i1) * id[2] + i2) * id[3];
                                for i3 in span(3, o3) {
                                    sum += input.get(row + i3);
                                }
                            }
                        }
                    }
                    out.set(o, sum * inv);
                    o += 1;
                }
            }
        }
    }
    Ok(())
}
