use serde::{Deserialize, Serialize};

use crate::core::tensor::Shape;
use crate::core::types::{DataType, Operation};
use crate::core::workload::HaloInfoHwc;
use crate::validation::operation::DpuOperation;
use crate::validation::valid_values::DeviceValidValues;

/// CMX footprint of one workload, every tensor aligned to the device page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemorySize {
    pub cmx: u64,
    pub input_0: u64,
    pub input_1: u64,
    pub output_0: u64,
    pub inplace_output: bool,
    pub cmx_overhead: u64,
    pub ignore_overhead: bool,
}

pub fn align_to(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Shape grown (positive `sign`) or shrunk (negative) by a halo, clamped at zero.
fn halo_adjusted_volume(shape: Shape, halo: &HaloInfoHwc, sign: i64) -> u64 {
    let w = shape[0] as i64 + sign * (halo.left as i64 + halo.right as i64);
    let h = shape[1] as i64 + sign * (halo.top as i64 + halo.bottom as i64);
    let c = shape[2] as i64 + sign * (halo.front as i64 + halo.back as i64);
    let b = shape[3] as i64;
    (w.max(0) * h.max(0) * c.max(0) * b.max(0)) as u64
}

fn bytes_of(volume: u64, dtype: DataType) -> u64 {
    volume * dtype.bytes() as u64
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryCalculator {
    pub ignore_overhead: bool,
}

impl Default for MemoryCalculator {
    fn default() -> Self {
        Self { ignore_overhead: true }
    }
}

impl MemoryCalculator {
    pub fn new(ignore_overhead: bool) -> Self {
        Self { ignore_overhead }
    }

    pub fn compute_memory(&self, op: &DpuOperation, table: &DeviceValidValues) -> MemorySize {
        let alignment = table.alignment as u64;

        let input_0 = align_to(Self::input_0_bytes(op), alignment);
        let input_1 = align_to(op.behaviour.weights_bytes(op), alignment);
        let output_0 = align_to(Self::output_0_bytes(op), alignment);
        let inplace_output = op.behaviour.output_in_place(op);
        let cmx_overhead = table.cmx_overhead_bytes as u64;

        let cmx = if self.ignore_overhead { 0 } else { cmx_overhead }
            + input_0
            + input_1
            + if inplace_output { 0 } else { output_0 };

        MemorySize {
            cmx,
            input_0,
            input_1,
            output_0,
            inplace_output,
            cmx_overhead,
            ignore_overhead: self.ignore_overhead,
        }
    }

    /// Activation bytes read from this tile's CMX.
    fn input_0_bytes(op: &DpuOperation) -> u64 {
        let t = &op.input_0;
        if op.sep.sep_activators {
            let pointers: u64 = op.sep.storage_elements_pointers.iter().map(|&d| d as u64).product();
            let actual: u64 = op.sep.actual_activators_input.iter().map(|&d| d as u64).product();
            return pointers * 4 + bytes_of(actual, t.dtype);
        }

        let volume = if op.operation == Operation::CmConvolution {
            let padded_channels = if t.channels() < 5 { 4 } else { 16 };
            t.width() as u64 * t.height() as u64 * padded_channels * t.batches() as u64
        } else {
            halo_adjusted_volume(t.shape, &op.halo.input_0_halo, -1)
        };

        let mut bytes = bytes_of(volume, t.dtype);
        if t.sparsity {
            // one bit per element of sparsity map
            bytes += volume.div_ceil(8);
        }
        bytes
    }

    fn output_0_bytes(op: &DpuOperation) -> u64 {
        let t = &op.output_0;
        let volume = halo_adjusted_volume(t.shape, &op.halo.output_0_inbound_halo, 1);
        let mut bytes = bytes_of(volume, t.dtype);
        if t.sparsity {
            bytes += volume.div_ceil(8);
        }
        bytes
    }
}
