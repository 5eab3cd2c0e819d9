use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vpucost::optimizer::{intra_tile_split, DpuLayer, SplitOptions};
use vpucost::{
    DataType, DpuWorkload, ExecutionMode, InputVersion, ModelBuilder, ModelVersion, Operation, VpuCostModel, VpuDevice,
    VpuTensor,
};

fn conv(w: u32, h: u32, c: u32) -> DpuWorkload {
    DpuWorkload::new(
        VpuDevice::Vpu27,
        Operation::Convolution,
        VpuTensor::new([w, h, c, 1], DataType::Uint8),
        VpuTensor::new([w, h, c, 1], DataType::Uint8),
        ExecutionMode::Cuboid16x16,
    )
    .with_kernel([3, 3], [1, 1], [1, 1, 1, 1])
}

/// Two dense layers over the V11 descriptor, enough to make inference cost visible.
fn mlp_model() -> VpuCostModel {
    let width = InputVersion::V11.width();
    let hidden = 32;
    let w1: Vec<f32> = (0..width * hidden).map(|i| ((i % 13) as f32 - 6.0) * 0.01).collect();
    let w2: Vec<f32> = (0..hidden).map(|i| (i % 5) as f32 * 0.1).collect();
    let bytes = ModelBuilder::new(ModelVersion::parse("mlp-11-2"), width)
        .dense(hidden, w1, Some(vec![0.5; hidden]))
        .relu()
        .dense(1, w2, Some(vec![1000.0]))
        .to_bytes()
        .unwrap();
    VpuCostModel::from_bytes(&bytes).unwrap()
}

fn bench_dpu(c: &mut Criterion) {
    let theoretical = VpuCostModel::new();
    let nn = mlp_model();
    let wl = conv(56, 56, 64);

    let mut group = c.benchmark_group("dpu");
    group.bench_function("theoretical", |b| b.iter(|| theoretical.dpu(black_box(&wl))));
    group.bench_function("nn", |b| b.iter(|| nn.dpu(black_box(&wl))));
    group.finish();
}

fn bench_dpu_batch(c: &mut Criterion) {
    let nn = mlp_model();
    let mut group = c.benchmark_group("dpu_batch");
    for n in [1usize, 16, 128] {
        let workloads: Vec<_> = (0..n).map(|i| conv(16 + (i as u32 % 8) * 4, 16, 64)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &workloads, |b, wls| {
            b.iter(|| nn.dpu_batch(black_box(wls)))
        });
    }
    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let model = VpuCostModel::new();
    let layer = DpuLayer::new(conv(64, 64, 128));
    let sequential = SplitOptions { n_dpu: 4, ..Default::default() };
    let parallel = SplitOptions { parallel: true, ..sequential.clone() };

    let mut group = c.benchmark_group("intra_tile_split");
    group.sample_size(20);
    group.bench_function("sequential", |b| b.iter(|| intra_tile_split(&model, black_box(&layer), &sequential, None)));
    group.bench_function("parallel", |b| b.iter(|| intra_tile_split(&model, black_box(&layer), &parallel, None)));
    group.finish();
}

criterion_group!(benches, bench_dpu, bench_dpu_batch, bench_split);
criterion_main!(benches);
