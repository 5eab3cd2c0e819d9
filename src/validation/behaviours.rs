//! Operation-specific rules, one variant per canonical operation kind.
//!
//! The variant is chosen once by the sanitizer and carried inside [`DpuOperation`], so the
//! memory calculator, the ideal-cycle formulas and the checker never re-dispatch on
//! [`Operation`].

use serde::{Deserialize, Serialize};

use crate::core::tensor::VpuTensor;
use crate::core::types::{DataType, Layout, Operation};
use crate::validation::operation::DpuOperation;
use crate::validation::valid_values::{ChannelRange, DeviceValidValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpBehaviour {
    Convolution,
    CmConvolution,
    DwConvolution,
    Eltwise,
    MaxPool,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Bytes of `elements` values stored at `bits` each, rounded up to whole bytes.
fn packed_bytes(elements: u64, bits: u32) -> u64 {
    (elements * bits as u64).div_ceil(8)
}

impl OpBehaviour {
    /// Behaviour of an already canonical operation. `None` for operations without DPU support.
    pub fn for_operation(op: Operation) -> Option<Self> {
        match op {
            Operation::Convolution => Some(Self::Convolution),
            Operation::CmConvolution => Some(Self::CmConvolution),
            Operation::DwConvolution | Operation::AvePool => Some(Self::DwConvolution),
            Operation::Eltwise | Operation::EltwiseMul => Some(Self::Eltwise),
            Operation::MaxPool => Some(Self::MaxPool),
            Operation::LayerNorm => None,
        }
    }

    pub fn input_channels(&self, op: Operation, table: &DeviceValidValues) -> ChannelRange {
        table.input_channels_range(op)
    }

    /// Inclusive kernel (and stride) upper bounds.
    pub fn kernel_max(&self, table: &DeviceValidValues) -> u32 {
        match self {
            Self::Eltwise => 1,
            _ => table.kernel_max,
        }
    }

    pub fn stride_max(&self, table: &DeviceValidValues) -> u32 {
        match self {
            Self::Eltwise => 1,
            _ => table.stride_max,
        }
    }

    pub fn has_weights(&self) -> bool {
        !matches!(self, Self::MaxPool)
    }

    pub fn has_weight_table(&self) -> bool {
        matches!(self, Self::Convolution | Self::CmConvolution | Self::DwConvolution)
    }

    pub fn allows_weight_sparsity(&self) -> bool {
        matches!(self, Self::Convolution)
    }

    pub fn allows_act_sparsity(&self) -> bool {
        matches!(self, Self::Convolution | Self::Eltwise)
    }

    pub fn allows_sep(&self) -> bool {
        matches!(self, Self::Convolution)
    }

    /// ELTWISE never broadcasts and never splits over K.
    pub fn allows_output_write_tiles(&self, owt: u32) -> bool {
        match self {
            Self::Eltwise => owt == 1,
            _ => true,
        }
    }

    /// Weight tensor (`input_1`) implied by the activation and output tensors.
    pub fn weight_tensor(
        &self,
        input_0: &VpuTensor,
        output_0: &VpuTensor,
        kernels: [u32; 2],
        weight_type: DataType,
        weight_sparsity_enabled: bool,
    ) -> VpuTensor {
        let [kw, kh] = kernels;
        let k = output_0.channels();
        let (shape, layout) = match self {
            Self::Convolution | Self::CmConvolution => ([kw, kh, input_0.channels(), k], Layout::Zxy),
            Self::DwConvolution => ([kw, kh, 1, k], Layout::Zxy),
            Self::Eltwise => (input_0.shape, input_0.layout),
            Self::MaxPool => ([0, 0, 0, 0], Layout::Invalid),
        };
        VpuTensor { shape, dtype: weight_type, layout, sparsity: weight_sparsity_enabled }
    }

    /// Bytes of one output channel's kernel, rounded to 32 bytes. Zero without weights.
    pub fn kernel_volume_bytes(&self, op: &DpuOperation) -> u64 {
        let bits = op.input_1.dtype.bits();
        let kernel_area = op.kernel.width as u64 * op.kernel.height as u64;
        match self {
            Self::Convolution | Self::CmConvolution => {
                align_up(packed_bytes(kernel_area * op.input_0.channels() as u64, bits), 32)
            }
            Self::DwConvolution => align_up(packed_bytes(kernel_area, bits), 32),
            Self::Eltwise | Self::MaxPool => 0,
        }
    }

    /// Unaligned weight footprint: kernels, sparsity bitmap and weight table.
    pub fn weights_bytes(&self, op: &DpuOperation) -> u64 {
        let k = op.output_0.channels() as u64;
        match self {
            Self::MaxPool => 0,
            Self::Eltwise => {
                if op.weightless_operation.unwrap_or(false) {
                    0
                } else {
                    op.input_1.size()
                }
            }
            _ => {
                let mut size = self.kernel_volume_bytes(op) * k;
                if op.weight_sparsity_enabled() {
                    let sparse = (size as f64 * op.weight_sparsity as f64).floor() as u64;
                    let kernel_elems =
                        op.input_0.channels() as u64 * op.kernel.width as u64 * op.kernel.height as u64;
                    let bitmap = k * align_up(kernel_elems.div_ceil(8), 16);
                    size = size - sparse.min(size) + bitmap;
                }
                if self.has_weight_table() {
                    size += 16 * k;
                }
                size
            }
        }
    }

    /// MAC operations needed for the output, no sparsity credited.
    pub fn ideal_mac_operations(&self, op: &DpuOperation) -> u64 {
        let kernel_area = op.kernel.width as u64 * op.kernel.height as u64;
        let out_volume = op.output_0.volume();
        match self {
            Self::Convolution | Self::CmConvolution => {
                let mut channels = op.input_0.channels() as u64;
                if op.device.is_cuboid_generation() && channels < 16 {
                    channels = 16;
                }
                kernel_area * out_volume * channels
            }
            Self::Eltwise => op.input_0.volume(),
            Self::DwConvolution | Self::MaxPool => kernel_area * out_volume,
        }
    }

    /// Output shares the input buffer.
    pub fn output_in_place(&self, op: &DpuOperation) -> bool {
        match self {
            Self::Eltwise => op.in_place_output_memory.unwrap_or(
                op.input_0.layout == op.output_0.layout && op.input_0.dtype.bytes() == op.output_0.dtype.bytes(),
            ),
            _ => false,
        }
    }
}
