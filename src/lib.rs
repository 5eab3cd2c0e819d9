//! # vpucost: Cycle Cost Model for VPU DPU Workloads
//!
//! Predicts how many cycles one DPU workload takes on a given VPU generation, and searches
//! for the cheapest way to split a layer into workloads across the DPUs of a tile.
//!
//! ## Core Modules
//!
//! - **[`core`]**: Devices, tensors, workloads and cycle codes.
//! - **[`validation`]**: Sanitizer, per-operation rules and the CMX memory calculator.
//! - **[`inference`]**: Descriptor encoders and the safetensors NN runtime.
//! - **[`cost`]**: The [`VpuCostModel`] façade with its theoretical and DMA formulas.
//! - **[`optimizer`]**: Intra-tile split search and layer cost.
//!
//! ## Example
//!
//! ```
//! use vpucost::{DataType, DpuWorkload, ExecutionMode, Operation, VpuCostModel, VpuDevice, VpuTensor};
//!
//! let model = VpuCostModel::new();
//! let wl = DpuWorkload::new(
//!     VpuDevice::Vpu27,
//!     Operation::Convolution,
//!     VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
//!     VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
//!     ExecutionMode::Cuboid16x16,
//! );
//! assert!(model.dpu(&wl) > 0);
//! ```

pub mod core;
pub mod cost;
pub mod inference;
pub mod optimizer;
pub mod validation;

pub use crate::core::config::{init_logging, CostModelConfig};
pub use crate::core::cycles::{CostError, CyclesInterfaceType};
pub use crate::core::device::{HwCatalog, HwCharacteristics};
pub use crate::core::error::VpuError;
pub use crate::core::tensor::VpuTensor;
pub use crate::core::types::{
    ActivationFunction, DataType, ExecutionMode, IsiStrategy, Layout, MemoryLocation, Operation, Swizzling, VpuDevice,
};
pub use crate::core::workload::{DmaWorkload, DpuWorkload};
pub use crate::cost::{DpuInfoPack, VpuCostModel};
pub use crate::inference::{InputVersion, ModelBuilder, ModelVersion, OutputVersion};
pub use crate::optimizer::{
    intra_tile_split, layer_cost, split_layer, DpuLayer, LayerPlacement, SplitError, SplitOptions,
};
pub use crate::validation::{DpuOperation, DpuOperationSanitizer, SanityReport};
