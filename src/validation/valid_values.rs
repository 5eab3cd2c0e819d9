//! Device capability tables: what each VPU generation accepts for a single workload.

use serde::{Deserialize, Serialize};

use crate::core::types::{DataType, ExecutionMode, IsiStrategy, Layout, Operation, Swizzling, VpuDevice};

/// Set of accepted channel counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelRange {
    /// `min..=max`, multiples of `step`.
    Stepped { min: u32, max: u32, step: u32 },
    List(Vec<u32>),
}

impl ChannelRange {
    pub fn contains(&self, value: u32) -> bool {
        match self {
            Self::Stepped { min, max, step } => {
                value >= *min && value <= *max && (*step <= 1 || value % step == 0)
            }
            Self::List(values) => values.contains(&value),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Stepped { min, max, step } => format!("[{}..{} step {}]", min, max, step),
            Self::List(values) => format!("{:?}", values),
        }
    }
}

/// Per-generation validation table. Built once and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceValidValues {
    pub device: VpuDevice,
    pub valid_operations: Vec<Operation>,
    pub valid_execution_modes: Vec<ExecutionMode>,
    pub valid_swizzlings: Vec<Swizzling>,
    pub valid_layouts: Vec<Layout>,
    pub valid_datatypes: Vec<DataType>,
    pub output_write_tile_options: Vec<u32>,
    pub isi_strategy_options: Vec<IsiStrategy>,
    pub cmx_kb: u32,
    /// CMX page size every tensor is rounded up to.
    pub alignment: u32,
    pub cmx_overhead_bytes: u32,
    pub channels_max: u32,
    pub cm_conv_channels_max: u32,
    pub spatial_max: u32,
    pub kernel_max: u32,
    pub stride_max: u32,
    /// Input halo may be negative (memory tensor larger than the compute tensor).
    pub negative_input_halo: bool,
    /// Output halo and inbound halo are modelled.
    pub output_halo: bool,
}

impl DeviceValidValues {
    pub fn vpu_2_7() -> Self {
        Self {
            device: VpuDevice::Vpu27,
            valid_operations: vec![
                Operation::Convolution,
                Operation::DwConvolution,
                Operation::Eltwise,
                Operation::EltwiseMul,
                Operation::MaxPool,
                Operation::CmConvolution,
            ],
            valid_execution_modes: vec![
                ExecutionMode::Cuboid4x16,
                ExecutionMode::Cuboid8x16,
                ExecutionMode::Cuboid16x16,
            ],
            valid_swizzlings: vec![
                Swizzling::Key0,
                Swizzling::Key1,
                Swizzling::Key2,
                Swizzling::Key3,
                Swizzling::Key4,
                Swizzling::Key5,
            ],
            valid_layouts: vec![Layout::Zxy, Layout::Xyz, Layout::Xzy, Layout::Yxz, Layout::Yzx, Layout::Zyx],
            valid_datatypes: vec![DataType::Uint8, DataType::Float16],
            output_write_tile_options: vec![1, 2],
            isi_strategy_options: vec![IsiStrategy::Clustering, IsiStrategy::SplitOverH, IsiStrategy::SplitOverK],
            cmx_kb: 2 * 1024,
            alignment: 16384,
            cmx_overhead_bytes: 80 * 1024 + 16 * 1024,
            channels_max: 8192,
            cm_conv_channels_max: 16,
            spatial_max: 8192,
            kernel_max: 11,
            stride_max: 7,
            negative_input_halo: false,
            output_halo: false,
        }
    }

    pub fn vpu_4_0() -> Self {
        Self {
            device: VpuDevice::Vpu40,
            output_write_tile_options: vec![1, 2, 3, 4, 5, 6],
            cmx_kb: 1536,
            negative_input_halo: true,
            output_halo: true,
            ..Self::vpu_2_7()
        }
    }

    pub fn cmx_size_bytes(&self) -> u64 {
        self.cmx_kb as u64 * 1024
    }

    pub fn is_valid_operation(&self, op: Operation) -> bool {
        self.valid_operations.contains(&op)
    }

    /// Integer types collapse to UINT8, float types to FLOAT16.
    pub fn restrict_datatype(&self, dtype: DataType) -> DataType {
        if dtype.is_float() {
            DataType::Float16
        } else {
            DataType::Uint8
        }
    }

    pub fn adapt_layout(&self, layout: Layout) -> Layout {
        match layout {
            Layout::ZMajor => Layout::Zxy,
            Layout::CMajor => Layout::Xyz,
            other => other,
        }
    }

    /// Every key is accepted from 2.7 on.
    pub fn adapt_swizzling(&self, swizzling: Swizzling) -> Swizzling {
        swizzling
    }

    pub fn input_channels_range(&self, op: Operation) -> ChannelRange {
        match op {
            Operation::DwConvolution | Operation::MaxPool | Operation::AvePool => ChannelRange::List(vec![16, 32, 64]),
            Operation::CmConvolution => ChannelRange::Stepped { min: 1, max: self.cm_conv_channels_max - 1, step: 1 },
            _ => self.output_channels_range(),
        }
    }

    pub fn output_channels_range(&self) -> ChannelRange {
        ChannelRange::Stepped { min: 16, max: self.channels_max, step: 16 }
    }
}

/// Validation tables for every generation the sanitizer supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTables {
    tables: Vec<DeviceValidValues>,
}

impl Default for DeviceTables {
    fn default() -> Self {
        Self { tables: vec![DeviceValidValues::vpu_2_7(), DeviceValidValues::vpu_4_0()] }
    }
}

impl DeviceTables {
    pub fn new(tables: Vec<DeviceValidValues>) -> Self {
        Self { tables }
    }

    pub fn get(&self, device: VpuDevice) -> Option<&DeviceValidValues> {
        self.tables.iter().find(|t| t.device == device)
    }

    pub fn is_supported(&self, device: VpuDevice) -> bool {
        self.get(device).is_some()
    }
}
