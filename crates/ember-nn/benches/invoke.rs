use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ember_nn::{
    Activation, ConvOptions, ElementType, HeapPool, Interpreter, Model, ModelBuilder, OpCode,
    OpOptions, Padding, Quantization, TensorArena, fire_ops,
};

/// Small MobileNet-style head on a 96x96 RGB input.
fn tiny_cnn() -> Vec<u8> {
    let mut b = ModelBuilder::new();
    let q = Quantization::default();
    let x = b.activation(ElementType::U8, &[1, 96, 96, 3], Quantization::new(1.0 / 255.0, 0));

    let w1: Vec<f32> = (0..8 * 3 * 3 * 3).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect();
    let k1 = b.constant_f32(&[8, 3, 3, 3], &w1);
    let c1 = b.activation(ElementType::F32, &[1, 48, 48, 8], q);
    b.op(
        OpCode::Conv2D,
        &[x, k1],
        c1,
        OpOptions::Conv(ConvOptions {
            stride_w: 2,
            stride_h: 2,
            padding: Padding::Same,
            activation: Activation::Relu6,
            depth_multiplier: 1,
        }),
    );

    let w2: Vec<f32> = (0..3 * 3 * 8).map(|i| ((i % 5) as f32 - 2.0) * 0.2).collect();
    let k2 = b.constant_f32(&[1, 3, 3, 8], &w2);
    let c2 = b.activation(ElementType::F32, &[1, 24, 24, 8], q);
    b.op(
        OpCode::DepthwiseConv2D,
        &[c1, k2],
        c2,
        OpOptions::Conv(ConvOptions {
            stride_w: 2,
            stride_h: 2,
            activation: Activation::Relu,
            ..ConvOptions::default()
        }),
    );

    let axes = b.constant_i32(&[2], &[1, 2]);
    let pooled = b.activation(ElementType::F32, &[1, 8], q);
    b.op(OpCode::Mean, &[c2, axes], pooled, OpOptions::Reduce { keep_dims: false });

    let fc_weights: Vec<f32> = (0..16)
        .map(|i| if i < 8 { 0.1 * i as f32 } else { -0.1 * (i - 8) as f32 })
        .collect();
    let fc = b.constant_f32(&[2, 8], &fc_weights);
    let logits = b.activation(ElementType::F32, &[1, 2], q);
    b.op(OpCode::FullyConnected, &[pooled, fc], logits, OpOptions::Fused(Activation::None));

    let probs = b.activation(ElementType::F32, &[1, 2], q);
    b.op(OpCode::Softmax, &[logits], probs, OpOptions::Softmax { beta: 1.0 });
    b.io(x, probs);
    b.build()
}

fn bench_invoke(c: &mut Criterion) {
    let bytes = tiny_cnn();
    let model = Model::parse(&bytes).expect("valid model");
    let resolver = fire_ops().expect("resolver");
    let arena = TensorArena::allocate(250 * 1024, &HeapPool::external(), &HeapPool::internal())
        .expect("arena");
    let mut interp = Interpreter::new(model, &resolver, arena).expect("allocates");
    for (i, v) in interp.input_mut().iter_mut().enumerate() {
        *v = (i % 251) as u8;
    }

    c.bench_function("invoke_tiny_cnn_96x96", |b| {
        b.iter(|| {
            interp.invoke().expect("invokes");
            black_box(interp.output().get(1));
        });
    });
}

criterion_group!(benches, bench_invoke);
criterion_main!(benches);
