//! Intra-tile split search and whole-layer cost.
//!
//! Every strategy, execution mode and workload count is tried in a fixed order. The
//! candidate with the strictly smallest cost wins, so ties go to the first one generated.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::cycles::{
    is_error_code, CyclesInterfaceType, ERROR_TILE_OUTPUT, ERROR_TILE_SPLIT_ZERO_CYC_OUTPUT, START_ERROR_RANGE,
};
use crate::core::tensor::VpuTensor;
use crate::core::types::{DataType, MemoryLocation};
use crate::core::workload::DpuWorkload;
use crate::cost::model::VpuCostModel;
use crate::optimizer::layer::{DpuLayer, VpuTilingStrategy};
use crate::optimizer::tiler::{require_max_z_tile, valid_execution_modes, Tiler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VpuSplitStrategy {
    HwTiling,
    ZTiling,
    HTiling,
    WTiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VpuOptimizationTarget {
    #[default]
    Latency,
    Power,
    Efficiency,
}

/// Knobs of the intra-tile search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    pub max_workloads: u32,
    /// Microseconds the split may take to run; 0 leaves `max_workloads` alone.
    pub max_latency_us: u32,
    /// DPUs sharing the tile. 0 uses the layer's count.
    pub n_dpu: u32,
    /// Cycles added per workload by the runtime.
    pub runtime_overhead: u32,
    pub target: VpuOptimizationTarget,
    pub strategies: Vec<VpuSplitStrategy>,
    /// Cost candidates on the rayon pool.
    pub parallel: bool,
    /// Keep every evaluated candidate in the [`OneTileLayerInfo`]s of [`split_layer`].
    pub keep_all_candidates: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_workloads: 128,
            max_latency_us: 0,
            n_dpu: 0,
            runtime_overhead: 0,
            target: VpuOptimizationTarget::Latency,
            strategies: vec![VpuSplitStrategy::HwTiling, VpuSplitStrategy::ZTiling],
            parallel: false,
            keep_all_candidates: false,
        }
    }
}

impl SplitOptions {
    fn resolved_n_dpu(&self, layer: &DpuLayer) -> u32 {
        if self.n_dpu > 0 {
            self.n_dpu
        } else {
            layer.n_dpu.max(1)
        }
    }

    /// `max_workloads`, further capped by what the latency budget can dispatch.
    pub fn effective_max_workloads(&self, dpu_fclk_mhz: u32) -> u32 {
        if self.max_latency_us == 0 {
            return self.max_workloads;
        }
        let budget = self.max_latency_us as u64 * dpu_fclk_mhz as u64 / (self.runtime_overhead as u64 + 1);
        let budget = budget.clamp(1, u32::MAX as u64) as u32;
        self.max_workloads.min(budget)
    }
}

/// Makespan cost plus the workloads that achieve it.
pub type DpuWorkloadsWithCost = (CyclesInterfaceType, Vec<DpuWorkload>);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitError {
    #[error("no valid split found (all candidates zero: {all_zero})")]
    NoValidSplit { all_zero: bool },
    #[error("DMA transfer rejected with code {code}")]
    Transfer { code: CyclesInterfaceType },
}

impl SplitError {
    pub fn code(self) -> CyclesInterfaceType {
        match self {
            SplitError::NoValidSplit { all_zero: true } => ERROR_TILE_SPLIT_ZERO_CYC_OUTPUT,
            SplitError::NoValidSplit { all_zero: false } => ERROR_TILE_OUTPUT,
            SplitError::Transfer { code } => code,
        }
    }
}

/// Result of the intra-tile search on one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneTileLayerInfo {
    pub inter_tile_split_layer: DpuLayer,
    pub best_intra_tile_split: DpuWorkloadsWithCost,
    pub all_intra_tile_splits: Vec<DpuWorkloadsWithCost>,
}

pub type LayerSplitInfo = Vec<OneTileLayerInfo>;

/// Makespan of `costs` on `n_processors` when each task goes to the least loaded one.
pub fn dpu_schedule(
    n_processors: u32,
    costs: &[CyclesInterfaceType],
    runtime_overhead: CyclesInterfaceType,
) -> CyclesInterfaceType {
    let mut queue: BinaryHeap<Reverse<u64>> = (0..n_processors.max(1)).map(|_| Reverse(0)).collect();
    for &cost in costs {
        if let Some(Reverse(least)) = queue.pop() {
            queue.push(Reverse(least + cost as u64 + runtime_overhead as u64));
        }
    }
    let makespan = queue.into_iter().map(|Reverse(t)| t).max().unwrap_or(0);
    makespan.min(START_ERROR_RANGE as u64) as CyclesInterfaceType
}

/// Outcome of costing one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CandidateCost {
    Feasible { cycles: CyclesInterfaceType, score: f64 },
    Zero,
    Rejected(CyclesInterfaceType),
}

impl CandidateCost {
    fn reported(self) -> CyclesInterfaceType {
        match self {
            CandidateCost::Feasible { cycles, .. } => cycles,
            CandidateCost::Zero => 0,
            CandidateCost::Rejected(code) => code,
        }
    }
}

fn tiling_algorithms(layer: &DpuLayer, options: &SplitOptions, n_dpu: u32) -> Vec<Tiler> {
    let hw_allowed = !require_max_z_tile(layer)
        && !(n_dpu == 1 && options.strategies.contains(&VpuSplitStrategy::ZTiling));
    options
        .strategies
        .iter()
        .filter_map(|strategy| match strategy {
            VpuSplitStrategy::ZTiling => Some(Tiler::Z),
            VpuSplitStrategy::HwTiling if hw_allowed => Some(Tiler::Hw),
            VpuSplitStrategy::HTiling if hw_allowed => Some(Tiler::H),
            VpuSplitStrategy::WTiling if hw_allowed => Some(Tiler::W),
            _ => None,
        })
        .collect()
}

fn generate_candidates(
    layer: &DpuLayer,
    options: &SplitOptions,
    n_dpu: u32,
    max_workloads: u32,
) -> Vec<Vec<DpuWorkload>> {
    let modes = valid_execution_modes(layer);
    let mut candidates = Vec::new();
    for tiler in tiling_algorithms(layer, options, n_dpu) {
        for &mode in &modes {
            for n in tiler.split_pool(layer, n_dpu, mode, max_workloads) {
                candidates.extend(tiler.tile(layer, mode, n));
            }
        }
    }
    candidates
}

fn cost_candidate(
    model: &VpuCostModel,
    workloads: &[DpuWorkload],
    n_dpu: u32,
    options: &SplitOptions,
) -> CandidateCost {
    let cycles = model.dpu_batch(workloads);
    if let Some(&code) = cycles.iter().find(|&&c| is_error_code(c)) {
        return CandidateCost::Rejected(code);
    }
    let makespan = dpu_schedule(n_dpu, &cycles, options.runtime_overhead);
    if makespan == 0 {
        return CandidateCost::Zero;
    }

    let score = match options.target {
        VpuOptimizationTarget::Latency => makespan as f64,
        VpuOptimizationTarget::Efficiency => {
            // makespan over the fraction of DPU time spent on ideal MAC work
            let ideal: u64 = workloads.iter().map(|wl| model.dpu_info(wl).efficiency_ideal_cycles).sum();
            let busy = makespan as f64 * n_dpu as f64;
            if ideal == 0 {
                makespan as f64
            } else {
                makespan as f64 * busy / ideal as f64
            }
        }
        VpuOptimizationTarget::Power => unreachable!("power target rejected before the search"),
    };
    CandidateCost::Feasible { cycles: makespan, score }
}

/// Cheapest way to cut `layer` into DPU workloads on one tile.
///
/// When `all_splits` is given, every evaluated candidate is appended to it with its makespan,
/// or the error code that excluded it.
///
/// # Panics
///
/// On [`VpuOptimizationTarget::Power`], which has no cost function.
pub fn intra_tile_split(
    model: &VpuCostModel,
    layer: &DpuLayer,
    options: &SplitOptions,
    mut all_splits: Option<&mut Vec<DpuWorkloadsWithCost>>,
) -> Result<DpuWorkloadsWithCost, SplitError> {
    if options.target == VpuOptimizationTarget::Power {
        panic!("the power optimization target has no cost function");
    }

    let n_dpu = options.resolved_n_dpu(layer);
    let max_workloads = options.effective_max_workloads(model.hw(layer.device()).dpu_fclk);
    let candidates = generate_candidates(layer, options, n_dpu, max_workloads);

    let costs: Vec<CandidateCost> = if options.parallel {
        candidates.par_iter().map(|c| cost_candidate(model, c, n_dpu, options)).collect()
    } else {
        candidates.iter().map(|c| cost_candidate(model, c, n_dpu, options)).collect()
    };

    let mut best: Option<(f64, usize)> = None;
    let mut any_nonzero = false;
    for (idx, cost) in costs.iter().enumerate() {
        match *cost {
            CandidateCost::Feasible { score, .. } => {
                any_nonzero = true;
                if best.map_or(true, |(s, _)| score < s) {
                    best = Some((score, idx));
                }
            }
            CandidateCost::Zero => {
                let n = candidates[idx].len();
                log::debug!("'{}': candidate {} with {} workloads costs zero cycles", layer.name, idx, n);
            }
            CandidateCost::Rejected(code) => {
                any_nonzero = true;
                let n = candidates[idx].len();
                log::debug!("'{}': candidate {} with {} workloads rejected ({})", layer.name, idx, n, code);
            }
        }
    }

    let best = best.map(|(_, idx)| idx);
    let all_zero = !costs.is_empty() && !any_nonzero;

    let mut winner = None;
    for (idx, (workloads, cost)) in candidates.into_iter().zip(costs).enumerate() {
        if Some(idx) == best {
            winner = Some((cost.reported(), workloads.clone()));
        }
        if let Some(store) = all_splits.as_deref_mut() {
            store.push((cost.reported(), workloads));
        }
    }

    winner.ok_or(SplitError::NoValidSplit { all_zero })
}

/// Splits `layer` over `n_tiles` with `strategy`, then searches every tile.
pub fn split_layer(
    model: &VpuCostModel,
    layer: &DpuLayer,
    options: &SplitOptions,
    strategy: VpuTilingStrategy,
    n_tiles: u32,
) -> Result<LayerSplitInfo, SplitError> {
    layer
        .split_across_tiles(strategy, n_tiles)
        .into_iter()
        .map(|tile| {
            let mut all = Vec::new();
            let store = options.keep_all_candidates.then_some(&mut all);
            let best = intra_tile_split(model, &tile, options, store)?;
            Ok(OneTileLayerInfo {
                inter_tile_split_layer: tile,
                best_intra_tile_split: best,
                all_intra_tile_splits: all,
            })
        })
        .collect()
}

/// Where a layer's tensors live around its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPlacement {
    /// The input is fetched from DDR before the layer runs.
    pub input_in_ddr: bool,
    /// The output is spilled to DDR after the layer runs.
    pub output_in_ddr: bool,
    /// Weights are prefetched while the previous layer runs. When off, the layer takes at
    /// least as long as its weight transfer.
    pub prefetching: bool,
}

impl Default for LayerPlacement {
    fn default() -> Self {
        Self { input_in_ddr: false, output_in_ddr: false, prefetching: true }
    }
}

/// DMA of the weights and weight table from DDR. Under SOK every tile receives a slice.
pub fn weights_prefetch_cycles(
    model: &VpuCostModel,
    layer: &DpuLayer,
    strategy: VpuTilingStrategy,
    n_tiles: u32,
) -> CyclesInterfaceType {
    let bytes = layer.weight_footprint().min(u32::MAX as u64) as u32;
    let weights = VpuTensor::new([bytes, 1, 1, 1], DataType::Uint8);
    let output_write_tiles = if strategy == VpuTilingStrategy::Sok { n_tiles.max(1) } else { 1 };
    model.dma(layer.device(), &weights, &weights, MemoryLocation::Dram, MemoryLocation::Cmx, output_write_tiles)
}

/// Cycles of `layer` on `n_tiles` tiles with `strategy`: the slowest tile's best split, the
/// weight transfer bound and any DDR traffic from `placement`.
///
/// # Panics
///
/// On [`VpuOptimizationTarget::Power`], like [`intra_tile_split`].
pub fn layer_cost(
    model: &VpuCostModel,
    layer: &DpuLayer,
    options: &SplitOptions,
    strategy: VpuTilingStrategy,
    n_tiles: u32,
    placement: LayerPlacement,
) -> Result<CyclesInterfaceType, SplitError> {
    let tiles = split_layer(model, layer, options, strategy, n_tiles)?;
    let mut cost = tiles.iter().map(|t| t.best_intra_tile_split.0 as u64).max().unwrap_or(0);

    let transfer = |cycles: CyclesInterfaceType| {
        if is_error_code(cycles) {
            Err(SplitError::Transfer { code: cycles })
        } else {
            Ok(cycles as u64)
        }
    };
    if !placement.prefetching {
        cost = cost.max(transfer(weights_prefetch_cycles(model, layer, strategy, n_tiles))?);
    }
    let device = layer.device();
    if placement.input_in_ddr {
        let input = layer.input();
        cost += transfer(model.dma(device, input, input, MemoryLocation::Dram, MemoryLocation::Cmx, 1))?;
    }
    if placement.output_in_ddr {
        let output = layer.output();
        cost += transfer(model.dma(device, output, output, MemoryLocation::Dram, MemoryLocation::Cmx, 1))?;
    }
    Ok(cost.min(START_ERROR_RANGE as u64) as CyclesInterfaceType)
}

/// The cheapest [`layer_cost`] over the inter-tile strategies the device supports.
/// Ties go to the strategy listed first in [`VpuTilingStrategy::valid_for`].
pub fn best_layer_cost(
    model: &VpuCostModel,
    layer: &DpuLayer,
    options: &SplitOptions,
    n_tiles: u32,
    placement: LayerPlacement,
) -> Result<(VpuTilingStrategy, CyclesInterfaceType), SplitError> {
    let mut best: Option<(VpuTilingStrategy, CyclesInterfaceType)> = None;
    let mut first_error = None;
    for &strategy in VpuTilingStrategy::valid_for(layer.device()) {
        match layer_cost(model, layer, options, strategy, n_tiles, placement) {
            Ok(cycles) if best.map_or(true, |(_, b)| cycles < b) => best = Some((strategy, cycles)),
            Ok(_) => {}
            Err(e) => {
                log::debug!("'{}': {:?} over {} tiles failed: {}", layer.name, strategy, n_tiles, e);
                first_error.get_or_insert(e);
            }
        }
    }
    best.ok_or(first_error.unwrap_or(SplitError::NoValidSplit { all_zero: false }))
}
