//! # Split Search
//!
//! - **[`layer`]:** Whole operators and their inter-tile splits.
//! - **[`tiler`]:** Z and HW tilers that generate candidate workload lists.
//! - **[`split`]:** Candidate costing, scheduling on the tile's DPUs and selection, and the
//!   cost of a whole layer over several tiles.

pub mod layer;
pub mod split;
pub mod tiler;

pub use layer::{DpuLayer, VpuTilingStrategy};
pub use split::{
    best_layer_cost, dpu_schedule, intra_tile_split, layer_cost, split_layer, weights_prefetch_cycles,
    DpuWorkloadsWithCost, LayerPlacement, LayerSplitInfo, OneTileLayerInfo, SplitError, SplitOptions,
    VpuOptimizationTarget, VpuSplitStrategy,
};
pub use tiler::Tiler;
