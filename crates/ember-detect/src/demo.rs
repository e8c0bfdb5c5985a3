//! A tiny valid fire model for smoke runs and tests.
//!
//! It averages each colour channel after gamma correction and scores
//! `8r - 4g - 4b - 1` through a sigmoid (one class) or a softmax against a
//! zero logit (two or more classes), so saturated red frames score high and
//! dark or grey frames score low.

use ember_nn::{Activation, ElementType, ModelBuilder, OpCode, OpOptions, Quantization};

use crate::config::{TENSOR_CHANNELS, TENSOR_HEIGHT, TENSOR_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoInput {
    U8,
    I8,
    F32,
}

const FIRE_WEIGHTS: [f32; 3] = [8.0, -4.0, -4.0];
const FIRE_BIAS: f32 = -1.0;

/// Serializes the demo model for a `[1, 96, 96, 3]` input and `classes`
/// output elements; the last element is the fire class.
pub fn demo_model(input: DemoInput, classes: usize) -> Vec<u8> {
    let classes = classes.max(1);
    let mut b = ModelBuilder::new();
    let (dtype, quant) = match input {
        DemoInput::U8 => (ElementType::U8, Quantization::new(1.0 / 255.0, 0)),
        DemoInput::I8 => (ElementType::I8, Quantization::new(1.0 / 255.0, -128)),
        DemoInput::F32 => (ElementType::F32, Quantization::default()),
    };
    let f = Quantization::default();

    let x = b.activation(dtype, &[1, TENSOR_HEIGHT, TENSOR_WIDTH, TENSOR_CHANNELS], quant);
    let axes = b.constant_i32(&[2], &[1, 2]);
    let pooled = b.activation(ElementType::F32, &[1, TENSOR_CHANNELS], f);
    b.op(OpCode::Mean, &[x, axes], pooled, OpOptions::Reduce { keep_dims: false });

    let mut weights = vec![0.0f32; classes * TENSOR_CHANNELS];
    weights[(classes - 1) * TENSOR_CHANNELS..].copy_from_slice(&FIRE_WEIGHTS);
    let mut bias = vec![0.0f32; classes];
    bias[classes - 1] = FIRE_BIAS;
    let w = b.constant_f32(&[classes, TENSOR_CHANNELS], &weights);
    let bias = b.constant_f32(&[classes], &bias);
    let logits = b.activation(ElementType::F32, &[1, classes], f);
    b.op(
        OpCode::FullyConnected,
        &[pooled, w, bias],
        logits,
        OpOptions::Fused(Activation::None),
    );

    let probs = b.activation(ElementType::F32, &[1, classes], f);
    if classes == 1 {
        b.op(OpCode::Logistic, &[logits], probs, OpOptions::None);
    } else {
        b.op(OpCode::Softmax, &[logits], probs, OpOptions::Softmax { beta: 1.0 });
    }
    b.io(x, probs);
    b.build()
}

#[cfg(test)]
mod tests {
    use ember_nn::Model;

    use super::{DemoInput, demo_model};

    #[test]
    fn demo_models_parse() {
        for input in [DemoInput::U8, DemoInput::I8, DemoInput::F32] {
            for classes in 1..=3 {
                let bytes = demo_model(input, classes);
                let model = Model::parse(&bytes).expect("valid model");
                assert_eq!(model.operators().len(), 3);
                let out = model.tensor(model.output_index()).expect("output");
                assert_eq!(out.shape, vec![1, classes]);
            }
        }
    }
}
