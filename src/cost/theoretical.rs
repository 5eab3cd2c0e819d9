//! Closed-form DPU cycles: MAC-bound compute against CMX read bandwidth.
//!
//! Sparsity is not credited here. The NN learns it; the fallback ignores it.

use crate::core::cycles::{CyclesInterfaceType, START_ERROR_RANGE};
use crate::core::device::HwCharacteristics;
use crate::core::types::{mpe_mode_to_nthw_ntk_grid, VpuDevice};
use crate::validation::operation::DpuOperation;

/// Sum of `start, start - step, ...` while positive.
fn stepped_sum(start: i64, step: i64) -> i64 {
    if step <= 0 {
        return start.max(0);
    }
    let mut sum = 0;
    let mut i = start;
    while i > 0 {
        sum += i;
        i -= step;
    }
    sum
}

/// Sum of `i·j` over the diagonal walk `(a, b), (a - sa, b - sb), ...` while both are positive.
fn corner_sum(a: i64, sa: i64, b: i64, sb: i64) -> i64 {
    let (sa, sb) = (sa.max(1), sb.max(1));
    let mut sum = 0;
    let (mut i, mut j) = (a, b);
    while i > 0 && j > 0 {
        sum += i * j;
        i -= sa;
        j -= sb;
    }
    sum
}

/// MACs the DPU skips because padded zeros are treated as sparse.
pub fn padding_skip_cycles(op: &DpuOperation) -> u64 {
    let k = &op.kernel;
    let (kw, kh) = (k.width as i64, k.height as i64);
    let (sw, sh) = (k.stride_w.max(1) as i64, k.stride_h.max(1) as i64);
    let (pt, pb, pl, pr) = (k.pad_top as i64, k.pad_bottom as i64, k.pad_left as i64, k.pad_right as i64);
    let in_w = op.input_0.width() as i64;
    let in_h = op.input_0.height() as i64;

    let right_edge = pr - in_w % sw;
    let bottom_edge = pb - in_h % sh;

    let cols = (in_w + sw - 1) / sw;
    let rows = (in_h + sh - 1) / sh;

    let mut top = stepped_sum(pt, sh) * kw * cols;
    let mut bottom = stepped_sum(bottom_edge, sh) * kw * cols;
    let left = stepped_sum(pl, sw) * kh * rows;
    let right = stepped_sum(right_edge, sw) * kh * rows;

    // corners are counted once by a row and once by a column
    top -= corner_sum(pt, sh, pl, sw);
    top -= corner_sum(pt, sh, right_edge, sw);
    bottom -= corner_sum(bottom_edge, sh, pl, sw);
    bottom -= corner_sum(bottom_edge, sh, right_edge, sw);

    let total = (top + bottom + left + right).max(0) as u64;
    total * op.input_0.channels() as u64 * op.output_0.channels() as u64
}

/// CMX read bound in DPU cycles. Zero on generations whose NN already models it.
pub fn cmx_read_cycles(op: &DpuOperation, hw: &HwCharacteristics) -> u64 {
    if matches!(op.device, VpuDevice::Vpu20 | VpuDevice::Vpu21) {
        return 0;
    }
    let [gx, gy, gz] = mpe_mode_to_nthw_ntk_grid(op.execution_order).map(|g| g.max(1) as f64);
    let out = &op.output_0;
    let num_wt_grids = (out.channels() as f64 / gz).ceil();
    let num_act_grids = (out.height() as f64 / gy).ceil() * (out.width() as f64 / gx).ceil();
    let kernel_area = (op.kernel.width * op.kernel.height) as f64;
    let in_channels = op.input_0.channels() as f64;
    let elem_bytes = op.input_0.dtype.bytes() as f64;

    let act_elems = (num_wt_grids * out.height() as f64 * out.width() as f64 * in_channels * kernel_area).ceil();
    let wt_elems = (num_act_grids * out.channels() as f64 * in_channels * kernel_area).ceil();
    let bytes = (act_elems + wt_elems) * elem_bytes;

    let reads = bytes / (hw.cmx_word_size_bytes as f64 * hw.cmx_read_ports as f64);
    (reads * hw.cmx_fclk as f64 / hw.dpu_fclk as f64).ceil() as u64
}

/// Theoretical cycles of one sanitized operation on `hw`.
pub fn dpu_theoretical_cycles(op: &DpuOperation, hw: &HwCharacteristics) -> CyclesInterfaceType {
    let kernel_area = op.kernel.width as u64 * op.kernel.height as u64;
    let mut cycles = kernel_area * op.output_0.volume();
    let mut nr_macs = hw.nr_macs as u64;

    if op.operation.is_elementwise() {
        let mt = if op.output_write_tiles > 1 { 2 } else { 1 };
        let ppe = (hw.nr_ppe / mt).max(1) as u64;
        cycles = op.input_0.volume().div_ceil(ppe);
    }
    if op.operation.is_convolution() {
        cycles = (cycles * op.input_0.channels() as u64).saturating_sub(padding_skip_cycles(op));
    } else {
        nr_macs = (nr_macs / hw.input_channels_mac.max(1) as u64).max(1);
    }

    cycles = cycles.div_ceil(nr_macs);
    if op.native_comp_is_fp() {
        cycles *= hw.fp_to_int_resource_ratio as u64;
    }

    let bound = cycles.max(cmx_read_cycles(op, hw));
    bound.min(START_ERROR_RANGE as u64) as CyclesInterfaceType
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::VpuTensor;
    use crate::core::types::{DataType, ExecutionMode, Operation};
    use crate::core::workload::DpuWorkload;
    use crate::validation::sanitizer::DpuOperationSanitizer;

    fn op(wl: DpuWorkload) -> DpuOperation {
        DpuOperationSanitizer::default().sanitize(&wl).unwrap()
    }

    fn conv(c: u32, k: u32, pad: u32, dtype: DataType) -> DpuOperation {
        let out = 16 + 2 * pad - k + 1;
        op(DpuWorkload::new(
            VpuDevice::Vpu27,
            Operation::Convolution,
            VpuTensor::new([16, 16, c, 1], dtype),
            VpuTensor::new([out, out, 64, 1], dtype),
            ExecutionMode::Cuboid16x16,
        )
        .with_kernel([k, k], [1, 1], [pad; 4]))
    }

    #[test]
    fn test_stepped_sums() {
        assert_eq!(stepped_sum(3, 1), 6);
        assert_eq!(stepped_sum(3, 2), 4);
        assert_eq!(stepped_sum(0, 1), 0);
        assert_eq!(stepped_sum(-1, 1), 0);
        assert_eq!(corner_sum(2, 1, 2, 1), 4 + 1);
    }

    #[test]
    fn test_no_padding_no_skip() {
        assert_eq!(padding_skip_cycles(&conv(64, 3, 0, DataType::Uint8)), 0);
        assert!(padding_skip_cycles(&conv(64, 3, 1, DataType::Uint8)) > 0);
    }

    #[test]
    fn test_conv_compute_bound() {
        let o = conv(64, 1, 0, DataType::Uint8);
        let hw = HwCharacteristics::vpu_2_7();
        // 16*16*64 outputs * 64 input channels / 2048 MACs
        let compute = (16 * 16 * 64 * 64u64).div_ceil(2048);
        assert_eq!(dpu_theoretical_cycles(&o, &hw) as u64, compute.max(cmx_read_cycles(&o, &hw)));
    }

    #[test]
    fn test_float_costs_more() {
        let hw = HwCharacteristics::vpu_2_7();
        let int = dpu_theoretical_cycles(&conv(64, 3, 1, DataType::Uint8), &hw);
        let fp = dpu_theoretical_cycles(&conv(64, 3, 1, DataType::Float16), &hw);
        assert!(fp > int, "fp {} int {}", fp, int);
    }

    #[test]
    fn test_eltwise_owt_halves_ppe() {
        let hw = HwCharacteristics::vpu_2_7();
        let mut o = op(DpuWorkload::new(
            VpuDevice::Vpu27,
            Operation::Eltwise,
            VpuTensor::new([64, 64, 64, 1], DataType::Uint8),
            VpuTensor::new([64, 64, 64, 1], DataType::Uint8),
            ExecutionMode::Cuboid8x16,
        ));
        let single = dpu_theoretical_cycles(&o, &hw);
        o.output_write_tiles = 2;
        let multi = dpu_theoretical_cycles(&o, &hw);
        assert!(multi >= single);
    }
}
