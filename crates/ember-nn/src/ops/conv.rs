use super::{OpContext, PrepareContext, conv_out};
use crate::error::KernelError;
use crate::model::{ConvOptions, OpOptions};
use crate::tensor::{TensorMeta, TensorView};

fn conv_options(options: &OpOptions) -> Result<ConvOptions, KernelError> {
    match *options {
        OpOptions::Conv(c) if c.stride_w > 0 && c.stride_h > 0 => Ok(c),
        _ => Err(KernelError::Options),
    }
}

struct Geometry {
    batch: usize,
    in_h: usize,
    in_w: usize,
    in_c: usize,
    k_h: usize,
    k_w: usize,
    out_h: usize,
    out_w: usize,
    out_c: usize,
    pad_top: usize,
    pad_left: usize,
}

fn geometry(
    input: TensorMeta<'_>,
    filter: TensorMeta<'_>,
    opts: &ConvOptions,
    depthwise: bool,
) -> Result<Geometry, KernelError> {
    if input.rank() != 4 || filter.rank() != 4 {
        return Err(KernelError::Shape("convolution expects rank-4 input and filter"));
    }
    let [batch, in_h, in_w, in_c] = input.dims4();
    let [f0, k_h, k_w, f3] = filter.dims4();
    let out_c = if depthwise {
        if f0 != 1 || f3 != in_c * opts.depth_multiplier {
            return Err(KernelError::Shape("depthwise filter must be [1, kh, kw, c * multiplier]"));
        }
        f3
    } else {
        if f3 != in_c {
            return Err(KernelError::Shape("filter depth differs from input channels"));
        }
        f0
    };
    let (out_h, pad_top) = conv_out(opts.padding, in_h, k_h, opts.stride_h);
    let (out_w, pad_left) = conv_out(opts.padding, in_w, k_w, opts.stride_w);
    Ok(Geometry {
        batch,
        in_h,
        in_w,
        in_c,
        k_h,
        k_w,
        out_h,
        out_w,
        out_c,
        pad_top,
        pad_left,
    })
}

fn check(ctx: &PrepareContext<'_, '_>, depthwise: bool) -> Result<(), KernelError> {
    ctx.expect_inputs(2, 3)?;
    let opts = conv_options(ctx.options())?;
    if depthwise && opts.depth_multiplier == 0 {
        return Err(KernelError::Options);
    }
    let g = geometry(ctx.input(0)?, ctx.input(1)?, &opts, depthwise)?;
    if let Some(bias) = ctx.optional_input(2)
        && bias.len() != g.out_c
    {
        return Err(KernelError::Shape("bias length differs from output channels"));
    }
    if ctx.output().dims4() != [g.batch, g.out_h, g.out_w, g.out_c] {
        return Err(KernelError::Shape("convolution output shape"));
    }
    Ok(())
}

pub(super) fn prepare_conv(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    check(ctx, false)
}

pub(super) fn prepare_depthwise(ctx: &PrepareContext<'_, '_>) -> Result<(), KernelError> {
    check(ctx, true)
}

#[inline(always)]
fn bias_at(bias: Option<TensorView<'_>>, c: usize) -> f32 {
    bias.map_or(0.0, |b| b.get(c))
}

/// Input row/column for output position `o` and filter tap `k`, if inside.
#[inline(always)]
fn tap(o: usize, k: usize, stride: usize, pad: usize, len: usize) -> Option<usize> {
    (o * stride + k).checked_sub(pad).filter(|&i| i < len)
}

pub(super) fn eval_conv(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let filter = ctx.input(1)?;
    let bias = ctx.optional_input(2);
    let opts = conv_options(ctx.options())?;
    let g = geometry(input.meta(), filter.meta(), &opts, false)?;
    let out = ctx.output();

    for n in 0..g.batch {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                for oc in 0..g.out_c {
                    let mut acc = bias_at(bias, oc);
                    for ky in 0..g.k_h {
                        let Some(iy) = tap(oy, ky, opts.stride_h, g.pad_top, g.in_h) else {
                            continue;
                        };
                        for kx in 0..g.k_w {
                            let Some(ix) = tap(ox, kx, opts.stride_w, g.pad_left, g.in_w) else {
                                continue;
                            };
                            let in_base = ((n * g.in_h + iy) * g.in_w + ix) * g.in_c;
                            let f_base = ((oc * g.k_h + ky) * g.k_w + kx) * g.in_c;
                            for ic in 0..g.in_c {
                                acc += input.get(in_base + ic) * filter.get(f_base + ic);
                            }
                        }
                    }
                    let o = ((n * g.out_h + oy) * g.out_w + ox) * g.out_c + oc;
                    out.set(o, opts.activation.apply(acc));
                }
            }
        }
    }
    Ok(())
}

pub(super) fn eval_depthwise(ctx: &mut OpContext<'_>) -> Result<(), KernelError> {
    let input = ctx.input(0)?;
    let filter = ctx.input(1)?;
    let bias = ctx.optional_input(2);
    let opts = conv_options(ctx.options())?;
    let g = geometry(input.meta(), filter.meta(), &opts, true)?;
    let mult = opts.depth_multiplier;
    let out = ctx.output();

    for n in 0..g.batch {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                for oc in 0..g.out_c {
                    let ic = oc / mult;
                    let mut acc = bias_at(bias, oc);
                    for ky in 0..g.k_h {
                        let Some(iy) = tap(oy, ky, opts.stride_h, g.pad_top, g.in_h) else {
                            continue;
                        };
                        for kx in 0..g.k_w {
                            let Some(ix) = tap(ox, kx, opts.stride_w, g.pad_left, g.in_w) else {
                                continue;
                            };
                            let i = ((n * g.in_h + iy) * g.in_w + ix) * g.in_c + ic;
                            let f = (ky * g.k_w + kx) * g.out_c + oc;
                            acc += input.get(i) * filter.get(f);
                        }
                    }
                    let o = ((n * g.out_h + oy) * g.out_w + ox) * g.out_c + oc;
                    out.set(o, opts.activation.apply(acc));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builder::ModelBuilder;
    use crate::model::{
        Activation, ConvOptions, ElementType, OpCode, OpOptions, Padding, Quantization,
    };
    use crate::testing::run_single;

    #[test]
    fn conv_same_padding_sums_neighbourhood() {
        // 3x3 all-ones filter over a 3x3 single-channel ramp.
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 3, 3, 1], q);
        let w = b.constant_f32(&[1, 3, 3, 1], &[1.0; 9]);
        let bias = b.constant_f32(&[1], &[0.5]);
        let y = b.activation(ElementType::F32, &[1, 3, 3, 1], q);
        b.op(
            OpCode::Conv2D,
            &[x, w, bias],
            y,
            OpOptions::Conv(ConvOptions::default()),
        );
        b.io(x, y);

        let out = run_single(&b.build(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(out[0], 1.0 + 2.0 + 4.0 + 5.0 + 0.5);
        assert_eq!(out[4], 45.5);
        assert_eq!(out[8], 5.0 + 6.0 + 8.0 + 9.0 + 0.5);
    }

    #[test]
    fn conv_valid_stride_and_relu() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 4, 4, 1], q);
        let w = b.constant_f32(&[1, 2, 2, 1], &[-1.0, 0.0, 0.0, 1.0]);
        let y = b.activation(ElementType::F32, &[1, 2, 2, 1], q);
        b.op_with_optional(
            OpCode::Conv2D,
            &[Some(x), Some(w), None],
            y,
            OpOptions::Conv(ConvOptions {
                stride_w: 2,
                stride_h: 2,
                padding: Padding::Valid,
                activation: Activation::Relu,
                depth_multiplier: 1,
            }),
        );
        b.io(x, y);

        let input: Vec<f32> = (0..16).map(|v| if v == 5 { -10.0 } else { v as f32 }).collect();
        // window at (0,0): -x[0] + x[5] = -10 -> relu 0; others: x[k+5] - x[k] = 5
        assert_eq!(run_single(&b.build(), &input), vec![0.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn depthwise_scales_each_channel() {
        let mut b = ModelBuilder::new();
        let q = Quantization::default();
        let x = b.activation(ElementType::F32, &[1, 1, 2, 2], q);
        let w = b.constant_f32(&[1, 1, 1, 4], &[1.0, 10.0, 2.0, 20.0]);
        let y = b.activation(ElementType::F32, &[1, 1, 2, 4], q);
        b.op(
            OpCode::DepthwiseConv2D,
            &[x, w],
            y,
            OpOptions::Conv(ConvOptions {
                depth_multiplier: 2,
                ..ConvOptions::default()
            }),
        );
        b.io(x, y);

        let out = run_single(&b.build(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out, vec![1.0, 10.0, 4.0, 40.0, 3.0, 30.0, 8.0, 80.0]);
    }
}
