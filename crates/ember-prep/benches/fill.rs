use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ember_core::{GammaTable, Image, TensorRepr};
use ember_prep::Preprocessor;

fn qvga_frame() -> Image<u8> {
    let width = 320usize;
    let height = 240usize;
    let mut data = Vec::with_capacity(width * height * 3);
    for i in 0..(width * height * 3) {
        data.push((i % 251) as u8);
    }
    Image::from_vec(width, height, 3, data).expect("valid image")
}

fn bench_fill(c: &mut Criterion) {
    let frame = qvga_frame();
    let view = frame.as_view();
    let gamma = GammaTable::new(12.0);
    let reprs = [
        ("u8", TensorRepr::UnsignedByte),
        (
            "i8",
            TensorRepr::SignedByte {
                scale: 1.0 / 255.0,
                zero_point: -128,
            },
        ),
        ("f32", TensorRepr::Float),
    ];

    for (name, repr) in reprs {
        let prep = Preprocessor::new(320, 240, 96, 96, &gamma, repr).expect("valid geometry");
        let mut dst = vec![0u8; prep.tensor_len()];
        c.bench_function(&format!("fill_qvga_to_96x96_{name}"), |b| {
            b.iter(|| {
                prep.fill(black_box(&view), black_box(&mut dst))
                    .expect("fills");
            });
        });
    }
}

criterion_group!(benches, bench_fill);
criterion_main!(benches);
