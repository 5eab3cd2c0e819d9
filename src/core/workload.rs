//! Workload descriptors handed to the cost model.

use serde::{Deserialize, Serialize};

use crate::core::tensor::{Shape, VpuTensor};
use crate::core::types::{
    ActivationFunction, DataType, ExecutionMode, IsiStrategy, MemoryLocation, Operation, Swizzling, VpuDevice,
};

/// Per-edge halo in TBLRFB order (top, bottom, left, right, front, back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HaloInfoHwc {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
    pub front: i32,
    pub back: i32,
}

impl HaloInfoHwc {
    pub fn new(top: i32, bottom: i32, left: i32, right: i32, front: i32, back: i32) -> Self {
        Self { top, bottom, left, right, front, back }
    }

    pub fn as_array(&self) -> [i32; 6] {
        [self.top, self.bottom, self.left, self.right, self.front, self.back]
    }

    pub fn is_all_positive(&self) -> bool {
        self.as_array().iter().all(|&v| v >= 0)
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|&v| v == 0)
    }
}

/// Halo exchanged with neighbouring tiles.
///
/// The input memory tensor is the compute tensor minus `input_0_halo` (negative values
/// extend it). The output memory tensor is the compute tensor plus `output_0_inbound_halo`.
/// `output_0_halo` and its broadcast count describe rows written into other tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HaloWorkload {
    pub input_0_halo: HaloInfoHwc,
    pub output_0_halo: HaloInfoHwc,
    pub output_0_halo_broadcast_cnt: HaloInfoHwc,
    pub output_0_inbound_halo: HaloInfoHwc,
}

impl HaloWorkload {
    pub fn is_empty(&self) -> bool {
        self.input_0_halo.is_zero()
            && self.output_0_halo.is_zero()
            && self.output_0_halo_broadcast_cnt.is_zero()
            && self.output_0_inbound_halo.is_zero()
    }
}

/// Storage element pointer mode: activations reached through a table of 32-bit pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SepModeInfo {
    pub sep_activators: bool,
    pub storage_elements_pointers: Shape,
    pub actual_activators_input: Shape,
    pub no_sparse_map: bool,
}

impl Default for SepModeInfo {
    fn default() -> Self {
        Self {
            sep_activators: false,
            storage_elements_pointers: [0, 0, 0, 0],
            actual_activators_input: [0, 0, 0, 0],
            no_sparse_map: true,
        }
    }
}

/// One DPU workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpuWorkload {
    pub device: VpuDevice,
    pub op: Operation,
    pub inputs: [VpuTensor; 1],
    pub outputs: [VpuTensor; 1],
    /// [W, H]
    pub kernels: [u32; 2],
    /// [W, H]
    pub strides: [u32; 2],
    /// [T, B, L, R]
    pub padding: [u32; 4],
    pub execution_order: ExecutionMode,
    pub activation_function: ActivationFunction,
    pub act_sparsity: f32,
    pub weight_sparsity: f32,
    pub input_swizzling: [Swizzling; 2],
    pub output_swizzling: [Swizzling; 1],
    pub output_write_tiles: u32,
    /// Position inside the parent layer, [W, H, C, B].
    pub offsets: [u32; 4],
    pub isi_strategy: IsiStrategy,
    pub weight_sparsity_enabled: bool,
    pub halo: HaloWorkload,
    pub sep_activators: SepModeInfo,
    /// Defaults to the input datatype when absent.
    pub weight_type: Option<DataType>,
    pub in_place_output_memory: Option<bool>,
    pub weightless_operation: Option<bool>,
    pub layer_info: String,
}

impl DpuWorkload {
    pub fn new(
        device: VpuDevice,
        op: Operation,
        input: VpuTensor,
        output: VpuTensor,
        execution_order: ExecutionMode,
    ) -> Self {
        Self {
            device,
            op,
            inputs: [input],
            outputs: [output],
            kernels: [1, 1],
            strides: [1, 1],
            padding: [0, 0, 0, 0],
            execution_order,
            activation_function: ActivationFunction::None,
            act_sparsity: 0.0,
            weight_sparsity: 0.0,
            input_swizzling: [Swizzling::Key0; 2],
            output_swizzling: [Swizzling::Key0],
            output_write_tiles: 1,
            offsets: [0, 0, 0, 0],
            isi_strategy: IsiStrategy::Clustering,
            weight_sparsity_enabled: false,
            halo: HaloWorkload::default(),
            sep_activators: SepModeInfo::default(),
            weight_type: None,
            in_place_output_memory: None,
            weightless_operation: None,
            layer_info: String::new(),
        }
    }

    pub fn with_kernel(mut self, kernels: [u32; 2], strides: [u32; 2], padding: [u32; 4]) -> Self {
        self.kernels = kernels;
        self.strides = strides;
        self.padding = padding;
        self
    }

    pub fn with_swizzling(mut self, input: [Swizzling; 2], output: Swizzling) -> Self {
        self.input_swizzling = input;
        self.output_swizzling = [output];
        self
    }

    pub fn with_act_sparsity(mut self, sparsity: f32) -> Self {
        self.inputs[0].sparsity = true;
        self.act_sparsity = sparsity;
        self
    }

    pub fn with_weight_sparsity(mut self, sparsity: f32) -> Self {
        self.weight_sparsity_enabled = true;
        self.weight_sparsity = sparsity;
        self
    }

    pub fn with_output_write_tiles(mut self, owt: u32, isi: IsiStrategy) -> Self {
        self.output_write_tiles = owt;
        self.isi_strategy = isi;
        self
    }

    pub fn with_halo(mut self, halo: HaloWorkload) -> Self {
        self.halo = halo;
        self
    }

    pub fn weight_type(&self) -> DataType {
        self.weight_type.unwrap_or(self.inputs[0].dtype)
    }

    pub fn act_sparsity_active(&self) -> bool {
        self.inputs[0].sparsity
    }

    pub fn both_sparsities_active(&self) -> bool {
        self.inputs[0].sparsity && self.weight_sparsity_enabled
    }

    /// Copy with activation sparsity switched off.
    pub fn without_act_sparsity(&self) -> Self {
        let mut wl = self.clone();
        wl.inputs[0].sparsity = false;
        wl.act_sparsity = 0.0;
        wl
    }

    /// Copy with weight sparsity switched off.
    pub fn without_weight_sparsity(&self) -> Self {
        let mut wl = self.clone();
        wl.weight_sparsity_enabled = false;
        wl.weight_sparsity = 0.0;
        wl
    }
}

/// A single DMA transfer between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaWorkload {
    pub device: VpuDevice,
    pub input: VpuTensor,
    pub output: VpuTensor,
    pub input_location: MemoryLocation,
    pub output_location: MemoryLocation,
    pub output_write_tiles: u32,
}

impl DmaWorkload {
    pub fn new(
        device: VpuDevice,
        input: VpuTensor,
        output: VpuTensor,
        input_location: MemoryLocation,
        output_location: MemoryLocation,
    ) -> Self {
        Self { device, input, output, input_location, output_location, output_write_tiles: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> DpuWorkload {
        DpuWorkload::new(
            VpuDevice::Vpu27,
            Operation::Convolution,
            VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
            VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
            ExecutionMode::Cuboid16x16,
        )
    }

    #[test]
    fn test_sparsity_toggles() {
        let wl = conv().with_act_sparsity(0.3).with_weight_sparsity(0.5);
        assert!(wl.both_sparsities_active());

        let no_act = wl.without_act_sparsity();
        assert!(!no_act.inputs[0].sparsity);
        assert_eq!(no_act.act_sparsity, 0.0);
        assert!(no_act.weight_sparsity_enabled);

        let no_wt = wl.without_weight_sparsity();
        assert!(!no_wt.weight_sparsity_enabled);
        assert_eq!(no_wt.weight_sparsity, 0.0);
        assert!(no_wt.inputs[0].sparsity);
    }

    #[test]
    fn test_weight_type_defaults_to_input() {
        let mut wl = conv();
        assert_eq!(wl.weight_type(), DataType::Uint8);
        wl.weight_type = Some(DataType::Int8);
        assert_eq!(wl.weight_type(), DataType::Int8);
    }
}
