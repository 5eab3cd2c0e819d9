//! # Cost Model
//!
//! [`VpuCostModel`] answers DPU and DMA cycle queries. It prefers the NN when one is loaded
//! and otherwise falls back to the closed forms in [`theoretical`].

pub mod dma;
pub mod info;
pub mod model;
pub mod theoretical;

pub use dma::dma_cycles;
pub use info::{ideal_cycles, DpuInfoPack, IdealCycles};
pub use model::VpuCostModel;
pub use theoretical::{cmx_read_cycles, dpu_theoretical_cycles, padding_skip_cycles};
