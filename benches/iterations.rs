use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use ndarray::Array2;
use overfit::prelude::*;

criterion_group!(benches, fit_epoch, evaluate, build_default);
criterion_main!(benches);

const ROWS: usize = 512;

fn fit_epoch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit one epoch");
    group.throughput(criterion::Throughput::Elements(ROWS as u64));
    group.bench_function("plain", |b| epoch_per_second(b, vec![128.into(), 64.into()]));
    group.bench_function("dropout", |b| {
        epoch_per_second(b, vec![128.into(), dropout(0.5), 64.into(), dropout(0.5)])
    });
    group.bench_function("batch norm", |b| {
        epoch_per_second(b, vec![128.into(), batch_norm(), 64.into(), batch_norm()])
    });
    group.bench_function("noise", |b| {
        epoch_per_second(b, vec![gaussian_noise(0.1), 128.into(), 64.into()])
    });
}

fn evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.throughput(criterion::Throughput::Elements(ROWS as u64));
    group.bench_function("plain", evaluate_per_second);
}

fn build_default(c: &mut Criterion) {
    c.bench_function("build default model", |b| {
        b.iter(|| ModelBuilder::default().build())
    });
}

fn partition() -> Partition {
    let inputs = Array2::from_shape_fn((ROWS, 784), |(r, c)| ((r * 7 + c) % 256) as f32 / 255.);
    let labels = (0..ROWS).map(|r| (r % 10) as u8).collect::<Vec<_>>();
    let targets = one_hot(&labels, 10).unwrap();
    Partition::new(inputs, targets).unwrap()
}

fn epoch_per_second(b: &mut Bencher, layers: Vec<LayerBuilder>) {
    let data = partition();
    let mut nn = ModelBuilder::explicit(layers).build().unwrap();
    nn.compile(Optimizer::adam(), Loss::SoftmaxAndCrossEntropy, 0.001)
        .unwrap();
    let options = FitOptions {
        epochs: 1,
        batch_size: 32,
        seed: 1,
    };

    b.iter(|| nn.fit(&data, &data, &options, &mut []));
}

fn evaluate_per_second(b: &mut Bencher) {
    let data = partition();
    let nn = ModelBuilder::explicit([128usize, 64]).build().unwrap();

    b.iter(|| nn.evaluate(&data));
}
