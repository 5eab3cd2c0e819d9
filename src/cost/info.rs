//! Ideal (MAC-bound) cycles and the all-in-one [`DpuInfoPack`].

use serde::{Deserialize, Serialize};

use crate::core::cycles::{is_error_code, CyclesInterfaceType};
use crate::core::device::HwCharacteristics;
use crate::validation::operation::DpuOperation;

/// MAC counts and the cycles they need on a perfectly fed array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdealCycles {
    /// MACs the hardware really executes once sparsity is credited.
    pub sparse_mac_operations: u64,
    /// Mathematical MAC count.
    pub dense_mac_operations: u64,
    pub power_ideal_cycles: u64,
    pub efficiency_ideal_cycles: u64,
}

fn density(enabled: bool, sparsity: f32) -> f64 {
    if enabled {
        (1.0 - sparsity as f64).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

pub fn ideal_cycles(op: &DpuOperation, hw: &HwCharacteristics) -> IdealCycles {
    let dense = op.behaviour.ideal_mac_operations(op);
    let nr_macs = hw.nr_macs_for(op.native_comp_is_fp()).max(1) as u64;

    let act_dense = density(op.act_sparsity_enabled(), op.act_sparsity);
    let wt_dense = density(op.weight_sparsity_enabled(), op.weight_sparsity);
    let sparse = (dense as f64 * act_dense.min(wt_dense)).ceil() as u64;

    IdealCycles {
        sparse_mac_operations: sparse,
        dense_mac_operations: dense,
        power_ideal_cycles: sparse.div_ceil(nr_macs),
        efficiency_ideal_cycles: dense.div_ceil(nr_macs),
    }
}

/// `ideal / cycles`, zero when `cycles` is zero or an error code.
pub fn relative_utilization(cycles: CyclesInterfaceType, ideal: u64) -> f32 {
    if cycles == 0 || is_error_code(cycles) {
        return 0.0;
    }
    ideal as f32 / cycles as f32
}

/// Everything known about one workload, gathered in one pass.
///
/// Zero values mean the field could not be computed (the workload was refused).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DpuInfoPack {
    pub dpu_cycles: CyclesInterfaceType,
    pub err_info: String,
    /// NN value before post-processing, or the theoretical cycles without a model.
    pub raw_cycles: f32,
    pub power_ideal_cycles: u64,
    pub efficiency_ideal_cycles: u64,
    pub hw_theoretical_cycles: u64,
    pub sparse_mac_operations: u64,
    pub dense_mac_operations: u64,
    /// Sparsity-aware MAC utilization, `power_ideal_cycles / dpu_cycles`.
    pub mac_utilization: f32,
    pub power_activity_factor: f32,
    pub efficiency_activity_factor: f32,
    pub energy: f32,
}

impl DpuInfoPack {
    /// Fills the derived fields from `dpu_cycles` and the ideal counts.
    pub fn apply_ideal(&mut self, ideal: IdealCycles) {
        self.sparse_mac_operations = ideal.sparse_mac_operations;
        self.dense_mac_operations = ideal.dense_mac_operations;
        self.power_ideal_cycles = ideal.power_ideal_cycles;
        self.efficiency_ideal_cycles = ideal.efficiency_ideal_cycles;

        self.mac_utilization = relative_utilization(self.dpu_cycles, ideal.power_ideal_cycles);
        self.power_activity_factor = self.mac_utilization;
        self.efficiency_activity_factor = relative_utilization(self.dpu_cycles, ideal.efficiency_ideal_cycles);
        self.energy = if is_error_code(self.dpu_cycles) {
            0.0
        } else {
            self.power_activity_factor * self.dpu_cycles as f32
        };
    }
}
