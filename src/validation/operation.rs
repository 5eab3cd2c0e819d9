use serde::{Deserialize, Serialize};

use crate::core::tensor::VpuTensor;
use crate::core::types::{ActivationFunction, ExecutionMode, IsiStrategy, Operation, Swizzling, VpuDevice};
use crate::core::workload::{DpuWorkload, HaloWorkload, SepModeInfo};
use crate::validation::behaviours::OpBehaviour;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelInfo {
    pub width: u32,
    pub height: u32,
    pub stride_w: u32,
    pub stride_h: u32,
    pub pad_top: u32,
    pub pad_bottom: u32,
    pub pad_left: u32,
    pub pad_right: u32,
}

/// Canonical, sanitized form of a workload with its weight tensor made explicit.
///
/// Only the sanitizer builds these; everything downstream (memory, encoders, theoretical
/// cycles) reads from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpuOperation {
    pub device: VpuDevice,
    pub operation: Operation,
    pub behaviour: OpBehaviour,
    pub input_0: VpuTensor,
    pub input_1: VpuTensor,
    pub output_0: VpuTensor,
    pub kernel: KernelInfo,
    pub execution_order: ExecutionMode,
    pub activation_function: ActivationFunction,
    pub act_sparsity: f32,
    pub weight_sparsity: f32,
    pub input_swizzling: [Swizzling; 2],
    pub output_swizzling: Swizzling,
    pub output_write_tiles: u32,
    pub isi_strategy: IsiStrategy,
    pub offsets: [u32; 4],
    pub halo: HaloWorkload,
    pub sep: SepModeInfo,
    pub in_place_output_memory: Option<bool>,
    pub weightless_operation: Option<bool>,
}

impl DpuOperation {
    pub fn new(wl: &DpuWorkload, behaviour: OpBehaviour) -> Self {
        let input_0 = wl.inputs[0];
        let output_0 = wl.outputs[0];
        let input_1 = behaviour.weight_tensor(
            &input_0,
            &output_0,
            wl.kernels,
            wl.weight_type(),
            wl.weight_sparsity_enabled,
        );
        Self {
            device: wl.device,
            operation: wl.op,
            behaviour,
            input_0,
            input_1,
            output_0,
            kernel: KernelInfo {
                width: wl.kernels[0],
                height: wl.kernels[1],
                stride_w: wl.strides[0],
                stride_h: wl.strides[1],
                pad_top: wl.padding[0],
                pad_bottom: wl.padding[1],
                pad_left: wl.padding[2],
                pad_right: wl.padding[3],
            },
            execution_order: wl.execution_order,
            activation_function: wl.activation_function,
            act_sparsity: wl.act_sparsity,
            weight_sparsity: wl.weight_sparsity,
            input_swizzling: wl.input_swizzling,
            output_swizzling: wl.output_swizzling[0],
            output_write_tiles: wl.output_write_tiles,
            isi_strategy: wl.isi_strategy,
            offsets: wl.offsets,
            halo: wl.halo,
            sep: wl.sep_activators,
            in_place_output_memory: wl.in_place_output_memory,
            weightless_operation: wl.weightless_operation,
        }
    }

    pub fn weight_sparsity_enabled(&self) -> bool {
        self.input_1.sparsity
    }

    pub fn act_sparsity_enabled(&self) -> bool {
        self.input_0.sparsity
    }

    /// Float MAC path for these operand types.
    pub fn native_comp_is_fp(&self) -> bool {
        crate::core::device::HwCharacteristics::native_comp_is_fp(self.input_0.dtype, self.input_1.dtype)
    }
}
