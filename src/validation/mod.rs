//! # Workload Validation
//!
//! - **[`valid_values`]:** Device capability tables ([`DeviceTables`]).
//! - **[`behaviours`]:** Closed set of per-operation rules.
//! - **[`sanitizer`]:** Canonicalization and refusal of infeasible workloads.
//! - **[`memory`]:** Aligned CMX footprint of a canonical operation.

pub mod valid_values;
pub mod behaviours;
pub mod operation;
pub mod checker;
pub mod memory;
pub mod sanitizer;

pub use behaviours::OpBehaviour;
pub use memory::{MemoryCalculator, MemorySize};
pub use operation::{DpuOperation, KernelInfo};
pub use sanitizer::{DpuOperationSanitizer, SanityReport};
pub use valid_values::{DeviceTables, DeviceValidValues};
