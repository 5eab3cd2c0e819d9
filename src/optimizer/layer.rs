use serde::{Deserialize, Serialize};

use crate::core::device::HwCharacteristics;
use crate::core::tensor::VpuTensor;
use crate::core::types::{ExecutionMode, Operation, VpuDevice};
use crate::core::workload::DpuWorkload;

/// How a layer is spread over the CMX tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VpuTilingStrategy {
    /// Clustering: every tile computes the whole layer.
    #[default]
    None,
    Soh,
    Sok,
    Sow,
    Sohw,
    Sohk,
}

impl VpuTilingStrategy {
    /// Inter-tile strategies a device supports.
    pub fn valid_for(device: VpuDevice) -> &'static [VpuTilingStrategy] {
        use VpuTilingStrategy::*;
        match device {
            VpuDevice::Vpu40 => &[None, Soh, Sok, Sow, Sohw, Sohk],
            _ => &[None, Soh, Sok],
        }
    }
}

/// Input extent that produces `output` rows or columns.
pub fn helper_input_dim(output: u32, kernel: u32, total_padding: u32, stride: u32) -> u32 {
    let input = (output as i64 - 1) * stride as i64 - total_padding as i64 + kernel as i64;
    input.max(0) as u32
}

/// A whole operator as handed to the split search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpuLayer {
    pub workload: DpuWorkload,
    pub name: String,
    pub compiler_pass: String,
    pub strategy: VpuTilingStrategy,
    pub n_tiles: u32,
    pub n_dpu: u32,
}

impl DpuLayer {
    /// Wraps `workload` with the device's default execution mode and DPU count.
    pub fn new(mut workload: DpuWorkload) -> Self {
        workload.execution_order = Self::default_execution_mode(workload.device, &workload.inputs[0]);
        let n_dpu = HwCharacteristics::for_device(workload.device).dpu_per_tile;
        Self {
            workload,
            name: String::new(),
            compiler_pass: String::new(),
            strategy: VpuTilingStrategy::None,
            n_tiles: 1,
            n_dpu,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_strategy(mut self, strategy: VpuTilingStrategy, n_tiles: u32) -> Self {
        self.strategy = strategy;
        self.n_tiles = n_tiles.max(1);
        self
    }

    fn default_execution_mode(device: VpuDevice, input: &VpuTensor) -> ExecutionMode {
        if device.is_cuboid_generation() {
            ExecutionMode::Cuboid16x16
        } else if input.is_float() {
            ExecutionMode::VectorFp16
        } else {
            ExecutionMode::Matrix
        }
    }

    pub fn device(&self) -> VpuDevice {
        self.workload.device
    }

    pub fn op(&self) -> Operation {
        self.workload.op
    }

    pub fn input(&self) -> &VpuTensor {
        &self.workload.inputs[0]
    }

    pub fn output(&self) -> &VpuTensor {
        &self.workload.outputs[0]
    }

    /// Bytes of one dense kernel plus a 16-byte table entry per output channel.
    pub fn weight_footprint(&self) -> u64 {
        let wl = &self.workload;
        let mut kernels = self.output().dtype.bytes() as u64 * wl.kernels[0] as u64 * wl.kernels[1] as u64;
        if matches!(self.op(), Operation::Convolution | Operation::CmConvolution) {
            kernels *= self.input().channels() as u64;
        }
        kernels + self.output().channels() as u64 * 16
    }

    /// Every tile computes the full layer.
    pub fn clustering(&self, n_tiles: u32) -> Vec<DpuLayer> {
        vec![self.tile_copy(); n_tiles.max(1) as usize]
    }

    /// Output rows split evenly over the tiles; weights replicated.
    pub fn split_over_h(&self, n_tiles: u32) -> Vec<DpuLayer> {
        let n_tiles = n_tiles.max(1);
        let mut height = self.output().height();
        let max_tile_height = height.div_ceil(n_tiles);
        let wl = &self.workload;
        let total_pad = wl.padding[0] + wl.padding[1];

        let mut tiles = Vec::with_capacity(n_tiles as usize);
        for _ in 0..n_tiles {
            let tile_height = height.min(max_tile_height);
            height -= tile_height;
            if tile_height == 0 {
                continue;
            }
            let mut tile = self.tile_copy();
            tile.workload.outputs[0].shape[1] = tile_height;
            tile.workload.inputs[0].shape[1] = helper_input_dim(tile_height, wl.kernels[1], total_pad, wl.strides[1]);
            tiles.push(tile);
        }
        tiles
    }

    /// Output channels split over the tiles in `rounding`-aligned slices; activations replicated.
    pub fn split_over_k(&self, n_tiles: u32, rounding: u32) -> Vec<DpuLayer> {
        let n_tiles = n_tiles.max(1);
        let mut channels = self.output().channels();
        let max_tile_channels = channels.div_ceil(n_tiles).next_multiple_of(rounding.max(1));

        let mut tiles = Vec::with_capacity(n_tiles as usize);
        for _ in 0..n_tiles {
            let tile_channels = channels.min(max_tile_channels);
            channels -= tile_channels;
            if tile_channels == 0 {
                continue;
            }
            let mut tile = self.tile_copy();
            tile.workload.outputs[0].set_channels(tile_channels);
            if self.op().keeps_channels() {
                tile.workload.inputs[0].set_channels(tile_channels);
            }
            tiles.push(tile);
        }
        tiles
    }

    /// Per-tile layers for `strategy`. Strategies without a dedicated split fall back to clustering.
    pub fn split_across_tiles(&self, strategy: VpuTilingStrategy, n_tiles: u32) -> Vec<DpuLayer> {
        match strategy {
            VpuTilingStrategy::Soh => self.split_over_h(n_tiles),
            VpuTilingStrategy::Sok => self.split_over_k(n_tiles, 16),
            VpuTilingStrategy::None => self.clustering(n_tiles),
            other => {
                log::warn!("{:?} has no inter-tile split, using clustering for '{}'", other, self.name);
                self.clustering(n_tiles)
            }
        }
    }

    fn tile_copy(&self) -> DpuLayer {
        DpuLayer { n_tiles: 1, ..self.clone() }
    }
}

impl From<DpuWorkload> for DpuLayer {
    fn from(workload: DpuWorkload) -> Self {
        Self::new(workload)
    }
}
