//! Candidate generation: how one tile's layer is cut into DPU workloads.

use std::collections::BTreeSet;

use crate::core::types::{mpe_mode_to_grid, ExecutionMode, Operation, VpuDevice};
use crate::core::workload::DpuWorkload;
use crate::optimizer::layer::DpuLayer;

/// Smallest and largest exponent of the power-of-two Z tiles used to size the Z pool.
const MIN_VALID_ZTILE_EXPONENT: u32 = 4;
const MAX_VALID_ZTILE_EXPONENT: u32 = 8;
const DEFAULT_ZTILE_VALUE: u32 = 16;

/// Channel sizes allowed when a layer has a maximum Z tile.
const MAX_Z_TILES: [u32; 3] = [16, 32, 64];

/// Execution modes worth trying for `layer`, in search order.
pub fn valid_execution_modes(layer: &DpuLayer) -> Vec<ExecutionMode> {
    let op = layer.op();
    match layer.device() {
        VpuDevice::Vpu20 | VpuDevice::Vpu21 => match op {
            Operation::Convolution | Operation::CmConvolution => vec![ExecutionMode::Matrix, ExecutionMode::Vector],
            _ if layer.input().is_float() => vec![ExecutionMode::VectorFp16],
            _ => vec![ExecutionMode::Vector],
        },
        VpuDevice::Vpu27 | VpuDevice::Vpu40 => match op {
            Operation::CmConvolution | Operation::DwConvolution | Operation::AvePool | Operation::MaxPool => {
                vec![ExecutionMode::Cuboid16x16]
            }
            Operation::Eltwise | Operation::EltwiseMul => vec![ExecutionMode::Cuboid8x16],
            _ => vec![ExecutionMode::Cuboid16x16, ExecutionMode::Cuboid8x16, ExecutionMode::Cuboid4x16],
        },
    }
}

/// Layers whose channel slices must stay within [`MAX_Z_TILES`].
pub fn require_max_z_tile(layer: &DpuLayer) -> bool {
    layer.device().is_cuboid_generation()
        && matches!(
            layer.op(),
            Operation::CmConvolution | Operation::MaxPool | Operation::DwConvolution | Operation::AvePool
        )
}

/// `max_range` divided by its power-of-two divisors, keeping those within `max_limit`.
pub fn splits_from_range(max_range: u32, max_limit: u32) -> Vec<u32> {
    let bound = (max_range as f64).log2();
    (0..32u32)
        .take_while(|&idx| (idx as f64) < bound)
        .map(|idx| 1u32 << idx)
        .filter(|pow| max_range % pow == 0 && max_range / pow <= max_limit)
        .map(|pow| max_range / pow)
        .collect()
}

/// Multiples of `n_dpu` up to `max_splits`.
fn dpu_multiples(n_dpu: u32, max_splits: u32) -> impl Iterator<Item = u32> {
    let step = n_dpu.max(1) as usize;
    (step as u32..=max_splits).step_by(step)
}

/// Infers the input tensor of a tile from its output.
///
/// Padding survives only on the edges the tile shares with the layer boundary.
pub fn infer_input_shape(wl: &mut DpuWorkload, layer: &DpuLayer) {
    let out = wl.outputs[0];
    let layer_out = layer.output();
    let [ow, oh, _, _] = wl.offsets;
    let [top, bottom, left, right] = layer.workload.padding;
    wl.padding = [
        if oh == 0 { top } else { 0 },
        if oh + out.height() == layer_out.height() { bottom } else { 0 },
        if ow == 0 { left } else { 0 },
        if ow + out.width() == layer_out.width() { right } else { 0 },
    ];

    let [kw, kh] = wl.kernels;
    let [sw, sh] = wl.strides;
    let in_w = (out.width() as i64 - 1) * sw as i64 + kw as i64 - (wl.padding[2] + wl.padding[3]) as i64;
    let in_h = (out.height() as i64 - 1) * sh as i64 + kh as i64 - (wl.padding[0] + wl.padding[1]) as i64;
    let in_c = if wl.op.is_convolution() { layer.input().channels() } else { out.channels() };

    let input = &mut wl.inputs[0];
    input.shape = [in_w.max(1) as u32, in_h.max(1) as u32, in_c, out.batches()];
}

fn create_tile(layer: &DpuLayer, mode: ExecutionMode, shape: [u32; 4], offsets: [u32; 4]) -> DpuWorkload {
    let mut wl = layer.workload.clone();
    wl.outputs[0].shape = shape;
    wl.offsets = offsets;
    wl.execution_order = mode;
    infer_input_shape(&mut wl, layer);
    wl
}

/// `n` channel slices of at most `round_up(ceil(Z / n), grid_z)` channels.
///
/// `None` when the slices cannot be made grid aligned, when fewer than `n` non-empty slices
/// result, or when a slice falls outside `valid_z` (if given).
pub fn split_over_z(layer: &DpuLayer, mode: ExecutionMode, n: u32, valid_z: &[u32]) -> Option<Vec<DpuWorkload>> {
    let grid_z = mpe_mode_to_grid(mode)[2];
    let out = layer.output();
    let z = out.channels();
    if z < grid_z || z % grid_z != 0 || n == 0 {
        return None;
    }

    let max_z = z.div_ceil(n).next_multiple_of(grid_z);
    let mut remaining = z;
    let mut workloads = Vec::with_capacity(n as usize);
    for idx in 0..n {
        let channels = remaining.min(max_z);
        if channels == 0 || channels % grid_z != 0 {
            return None;
        }
        if !valid_z.is_empty() && !valid_z.contains(&channels) {
            return None;
        }
        workloads.push(create_tile(layer, mode, [out.width(), out.height(), channels, 1], [0, 0, idx * max_z, 0]));
        remaining -= channels;
    }
    Some(workloads)
}

/// A `width_factor × height_factor` grid of tiles with blocks rounded up to the MPE grid.
pub fn split_over_hw(layer: &DpuLayer, mode: ExecutionMode, width_factor: u32, height_factor: u32) -> Vec<DpuWorkload> {
    let [grid_x, grid_y, _, _] = mpe_mode_to_grid(mode);
    let out = layer.output();
    let (width, height) = (out.width(), out.height());

    let max_width = width.div_ceil(width_factor.max(1)).next_multiple_of(grid_x);
    let max_height = height.div_ceil(height_factor.max(1)).next_multiple_of(grid_y);
    let cols = width.div_ceil(max_width);
    let rows = height.div_ceil(max_height);

    let mut workloads = Vec::with_capacity((cols * rows) as usize);
    let mut remaining_height = height;
    for row in 0..rows {
        let tile_height = remaining_height.min(max_height);
        let mut remaining_width = width;
        for col in 0..cols {
            let tile_width = remaining_width.min(max_width);
            remaining_width -= tile_width;
            workloads.push(create_tile(
                layer,
                mode,
                [tile_width, tile_height, out.channels(), 1],
                [col * max_width, row * max_height, 0, 0],
            ));
        }
        remaining_height -= tile_height;
    }
    workloads
}

/// `(n / i, i)` then `(i, n / i)` for every divisor `i ≤ √n`, without repeats.
fn factor_pairs(n: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            pairs.push((n / i, i));
            if i != n / i {
                pairs.push((i, n / i));
            }
        }
        i += 1;
    }
    pairs
}

/// One way of cutting a layer into workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tiler {
    /// Channel slices.
    Z,
    /// Every factorization of the workload count over width and height.
    Hw,
    /// Rows only.
    H,
    /// Columns only.
    W,
}

impl Tiler {
    /// Workload counts to try, ascending.
    pub fn split_pool(self, layer: &DpuLayer, n_dpu: u32, mode: ExecutionMode, max_workloads: u32) -> BTreeSet<u32> {
        match self {
            Tiler::Z => Self::z_pool(layer, n_dpu, mode, max_workloads),
            Tiler::Hw | Tiler::H | Tiler::W => Self::hw_pool(layer, n_dpu, mode, max_workloads),
        }
    }

    fn z_pool(layer: &DpuLayer, n_dpu: u32, mode: ExecutionMode, max_workloads: u32) -> BTreeSet<u32> {
        let op = layer.op();
        if n_dpu == 1 && matches!(op, Operation::Convolution | Operation::Eltwise) {
            return BTreeSet::from([1]);
        }
        if mode != ExecutionMode::Vector && op != Operation::Convolution {
            return BTreeSet::from([1]);
        }

        let z = layer.output().channels();
        let max_splits_in_z: Vec<u32> = (MIN_VALID_ZTILE_EXPONENT..MAX_VALID_ZTILE_EXPONENT)
            .flat_map(|i| {
                let tile = 1u32 << i;
                [tile, tile + DEFAULT_ZTILE_VALUE]
            })
            .map(|tile| z.div_ceil(tile))
            .collect();
        let max_z = max_splits_in_z.iter().copied().max().unwrap_or(1);
        let max_splits = max_workloads.min(max_z);

        let mut pool: BTreeSet<u32> = dpu_multiples(n_dpu, max_splits).collect();
        for splits in max_splits_in_z {
            pool.extend(splits_from_range(splits, max_splits));
        }
        pool.insert(1);
        pool
    }

    fn hw_pool(layer: &DpuLayer, n_dpu: u32, mode: ExecutionMode, max_workloads: u32) -> BTreeSet<u32> {
        let mut pool = BTreeSet::from([1]);
        if n_dpu == 1 {
            return pool;
        }
        let [grid_x, grid_y, _, _] = mpe_mode_to_grid(mode);
        let out = layer.output();
        let max_xy = out.height().div_ceil(grid_y) * out.width().div_ceil(grid_x);
        let max_splits = max_workloads.min(max_xy);

        pool.extend(dpu_multiples(n_dpu, max_splits));
        pool.extend(splits_from_range(max_xy, max_splits));
        pool
    }

    /// All candidate workload lists with `n` workloads.
    pub fn tile(self, layer: &DpuLayer, mode: ExecutionMode, n: u32) -> Vec<Vec<DpuWorkload>> {
        if n == 1 {
            let out = layer.output();
            return vec![vec![create_tile(layer, mode, out.shape, [0, 0, 0, 0])]];
        }
        match self {
            Tiler::Z => {
                let valid_z: &[u32] = if require_max_z_tile(layer) { &MAX_Z_TILES } else { &[] };
                split_over_z(layer, mode, n, valid_z).into_iter().collect()
            }
            Tiler::Hw => {
                let out = layer.output();
                factor_pairs(n)
                    .into_iter()
                    .filter(|&(w, h)| w <= out.width() && h <= out.height())
                    .map(|(w, h)| split_over_hw(layer, mode, w, h))
                    .collect()
            }
            Tiler::H => vec![split_over_hw(layer, mode, 1, n)],
            Tiler::W => vec![split_over_hw(layer, mode, n, 1)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::VpuTensor;
    use crate::core::types::DataType;

    fn layer(op: Operation, device: VpuDevice, w: u32, h: u32, c: u32) -> DpuLayer {
        let in_c = if op == Operation::Convolution { 32 } else { c };
        DpuLayer::new(
            DpuWorkload::new(
                device,
                op,
                VpuTensor::new([w, h, in_c, 1], DataType::Uint8),
                VpuTensor::new([w, h, c, 1], DataType::Uint8),
                ExecutionMode::Cuboid16x16,
            )
            .with_kernel([3, 3], [1, 1], [1, 1, 1, 1]),
        )
    }

    fn covered_volume(workloads: &[DpuWorkload]) -> u64 {
        workloads.iter().map(|wl| wl.outputs[0].volume()).sum()
    }

    #[test]
    fn test_split_range() {
        assert_eq!(splits_from_range(16, 128), vec![16, 8, 4, 2]);
        assert_eq!(splits_from_range(16, 5), vec![4, 2]);
        assert_eq!(splits_from_range(6, 128), vec![6, 3]);
        assert!(splits_from_range(1, 128).is_empty());
    }

    #[test]
    fn test_factor_pairs() {
        assert_eq!(factor_pairs(6), vec![(6, 1), (1, 6), (3, 2), (2, 3)]);
        assert_eq!(factor_pairs(4), vec![(4, 1), (1, 4), (2, 2)]);
    }

    #[test]
    fn test_modes_table() {
        let conv = layer(Operation::Convolution, VpuDevice::Vpu27, 16, 16, 64);
        assert_eq!(valid_execution_modes(&conv).len(), 3);
        let elt = layer(Operation::Eltwise, VpuDevice::Vpu27, 16, 16, 64);
        assert_eq!(valid_execution_modes(&elt), vec![ExecutionMode::Cuboid8x16]);
        let conv20 = layer(Operation::Convolution, VpuDevice::Vpu20, 16, 16, 64);
        assert_eq!(valid_execution_modes(&conv20), vec![ExecutionMode::Matrix, ExecutionMode::Vector]);
    }

    #[test]
    fn test_z_split_aligned() {
        let l = layer(Operation::Convolution, VpuDevice::Vpu27, 16, 16, 64);
        let wls = split_over_z(&l, ExecutionMode::Cuboid16x16, 4, &[]).unwrap();
        assert_eq!(wls.len(), 4);
        assert!(wls.iter().all(|wl| wl.outputs[0].channels() == 16));
        assert_eq!(wls[3].offsets, [0, 0, 48, 0]);
        assert_eq!(covered_volume(&wls), l.output().volume());
        // conv tiles read every input channel
        assert!(wls.iter().all(|wl| wl.inputs[0].channels() == 32));
    }

    #[test]
    fn test_z_split_rejects_short_lists() {
        let l = layer(Operation::Convolution, VpuDevice::Vpu27, 16, 16, 64);
        // 32-channel chunks leave the third slice empty
        assert!(split_over_z(&l, ExecutionMode::Cuboid16x16, 3, &[]).is_none());
        let odd = layer(Operation::Convolution, VpuDevice::Vpu27, 16, 16, 40);
        assert!(split_over_z(&odd, ExecutionMode::Cuboid16x16, 2, &[]).is_none());
    }

    #[test]
    fn test_max_z_tile() {
        let dw = layer(Operation::DwConvolution, VpuDevice::Vpu27, 16, 16, 256);
        assert!(require_max_z_tile(&dw));
        assert!(Tiler::Z.tile(&dw, ExecutionMode::Cuboid16x16, 2).is_empty());
        assert_eq!(Tiler::Z.tile(&dw, ExecutionMode::Cuboid16x16, 4).len(), 1);
    }

    #[test]
    fn test_hw_split_covers_output() {
        let l = layer(Operation::Convolution, VpuDevice::Vpu20, 30, 22, 64);
        let wls = split_over_hw(&l, ExecutionMode::Matrix, 2, 3);
        assert_eq!(covered_volume(&wls), l.output().volume());
        assert!(wls.iter().all(|wl| wl.outputs[0].channels() % 16 == 0));
        for wl in &wls {
            assert!(wl.offsets[0] + wl.outputs[0].width() <= 30);
            assert!(wl.offsets[1] + wl.outputs[0].height() <= 22);
        }
    }

    #[test]
    fn test_padding_only_on_boundary() {
        let l = layer(Operation::Convolution, VpuDevice::Vpu20, 16, 16, 64);
        let wls = split_over_hw(&l, ExecutionMode::Matrix, 1, 2);
        assert_eq!(wls.len(), 2);
        assert_eq!(wls[0].padding, [1, 0, 1, 1]);
        assert_eq!(wls[1].padding, [0, 1, 1, 1]);
        // 8 rows, 3x3 kernel, one padded row
        assert_eq!(wls[0].inputs[0].height(), 9);
        assert_eq!(wls[0].inputs[0].width(), 16);
    }

    #[test]
    fn test_pools() {
        let conv = layer(Operation::Convolution, VpuDevice::Vpu27, 16, 16, 64);
        assert_eq!(Tiler::Z.split_pool(&conv, 1, ExecutionMode::Cuboid16x16, 128), BTreeSet::from([1]));
        assert_eq!(Tiler::Hw.split_pool(&conv, 1, ExecutionMode::Cuboid16x16, 128), BTreeSet::from([1]));

        let conv20 = layer(Operation::Convolution, VpuDevice::Vpu20, 16, 16, 64);
        let pool = Tiler::Z.split_pool(&conv20, 5, ExecutionMode::Vector, 128);
        // ceil(64 / 16) = 4 bounds the pool
        assert_eq!(pool, BTreeSet::from([1, 2, 4]));
        let hw = Tiler::Hw.split_pool(&conv20, 5, ExecutionMode::Matrix, 128);
        assert!(hw.contains(&5) && hw.contains(&15) && hw.contains(&16));
        assert!(hw.iter().all(|&n| n <= 16));
    }
}
