#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use vpucost::{
    DataType, DpuWorkload, ExecutionMode, InputVersion, ModelBuilder, ModelVersion, Operation, VpuDevice, VpuTensor,
};

pub fn conv(in_c: u32, out_c: u32, k: u32, pad: u32) -> DpuWorkload {
    let out = 16 + 2 * pad - k + 1;
    DpuWorkload::new(
        VpuDevice::Vpu27,
        Operation::Convolution,
        VpuTensor::new([16, 16, in_c, 1], DataType::Uint8),
        VpuTensor::new([out, out, out_c, 1], DataType::Uint8),
        ExecutionMode::Cuboid16x16,
    )
    .with_kernel([k, k], [1, 1], [pad; 4])
}

/// Sanitizer-clean workloads for VPU 2.7 drawn from a seeded generator.
pub struct WorkloadGenerator {
    rng: StdRng,
}

impl WorkloadGenerator {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn next_workload(&mut self) -> DpuWorkload {
        let op = *[Operation::Convolution, Operation::DwConvolution, Operation::MaxPool, Operation::Eltwise]
            .choose(&mut self.rng)
            .unwrap();
        let dtype = *[DataType::Uint8, DataType::Float16].choose(&mut self.rng).unwrap();
        let mode = *[ExecutionMode::Cuboid16x16, ExecutionMode::Cuboid8x16, ExecutionMode::Cuboid4x16]
            .choose(&mut self.rng)
            .unwrap();

        let out_c = match op {
            Operation::DwConvolution | Operation::MaxPool => *[16, 32, 64].choose(&mut self.rng).unwrap(),
            _ => 16 * self.rng.gen_range(1..=8),
        };
        let in_c = match op {
            Operation::Convolution => 16 * self.rng.gen_range(1..=8),
            _ => out_c,
        };
        let (k, s) = match op {
            Operation::Eltwise => (1, 1),
            _ => (*[1, 3, 5].choose(&mut self.rng).unwrap(), self.rng.gen_range(1..=2)),
        };
        let pad = if k > 1 { self.rng.gen_range(0..=k / 2) } else { 0 };

        let in_w = self.rng.gen_range(k.max(4)..=32);
        let in_h = self.rng.gen_range(k.max(4)..=32);
        let out_w = (in_w + 2 * pad - k) / s + 1;
        let out_h = (in_h + 2 * pad - k) / s + 1;

        DpuWorkload::new(
            VpuDevice::Vpu27,
            op,
            VpuTensor::new([in_w, in_h, in_c, 1], dtype),
            VpuTensor::new([out_w, out_h, out_c, 1], dtype),
            mode,
        )
        .with_kernel([k, k], [s, s], [pad; 4])
    }

    pub fn batch(&mut self, n: usize) -> Vec<DpuWorkload> {
        (0..n).map(|_| self.next_workload()).collect()
    }
}

/// A single dense layer over the `version` descriptor with non-negative weights, so every
/// descriptor maps to a distinct positive cycle count.
pub fn linear_model(version: InputVersion, output_version: u32, bias: f32) -> Vec<u8> {
    let width = version.width();
    let weights: Vec<f32> = (0..width).map(|i| (i % 7) as f32 * 5.0 + 2.5).collect();
    let name = format!("linear-{}-{}", version.number(), output_version);
    ModelBuilder::new(ModelVersion::parse(&name), width)
        .dense(1, weights, Some(vec![bias]))
        .to_bytes()
        .unwrap()
}
