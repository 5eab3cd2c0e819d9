//! # Core Abstractions
//!
//! Vocabulary shared by every other module.
//!
//! - **[`types`]:** Enumerated hardware domains (devices, datatypes, operations, modes).
//! - **[`tensor`] / [`workload`]:** Tensor, DPU workload and DMA workload descriptors.
//! - **[`cycles`]:** Cycle counts and the error codes folded into their range.
//! - **[`device`]:** Per-generation performance constants.
//! - **[`config`]:** Cost model configuration and logging setup.

pub mod types;
pub mod tensor;
pub mod workload;
pub mod cycles;
pub mod device;
pub mod config;
pub mod error;
