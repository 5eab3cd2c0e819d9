mod common;

use proptest::prelude::*;

use common::{conv, WorkloadGenerator};
use vpucost::core::cycles::is_error_code;
use vpucost::core::device::HwCharacteristics;
use vpucost::cost::{ideal_cycles, DpuInfoPack};
use vpucost::inference::InputVersion;
use vpucost::optimizer::dpu_schedule;
use vpucost::validation::DpuOperationSanitizer;
use vpucost::{DataType, VpuCostModel};

proptest! {
    #[test]
    fn prop_power_never_exceeds_efficiency(act in 0.0f32..=1.0, weight in 0.0f32..=1.0, act_on: bool, weight_on: bool) {
        let mut wl = conv(64, 64, 3, 1);
        if act_on {
            wl = wl.with_act_sparsity(act);
        }
        if weight_on {
            wl = wl.with_weight_sparsity(weight);
        }
        let op = DpuOperationSanitizer::default().sanitize(&wl).unwrap();
        let ideal = ideal_cycles(&op, &HwCharacteristics::vpu_2_7());
        prop_assert!(ideal.power_ideal_cycles <= ideal.efficiency_ideal_cycles);
        if !act_on && !weight_on {
            prop_assert_eq!(ideal.power_ideal_cycles, ideal.efficiency_ideal_cycles);
        }
    }

    #[test]
    fn prop_encoders_write_what_they_simulate(seed in any::<u64>()) {
        let sanitizer = DpuOperationSanitizer::default();
        let mut generator = WorkloadGenerator::new(seed);
        let wl = generator.next_workload();
        if let Ok(op) = sanitizer.sanitize(&wl) {
            for version in [InputVersion::V01, InputVersion::V10, InputVersion::V11, InputVersion::V12] {
                let encoder = version.encoder().unwrap();
                let mut buf = vec![0.0f32; encoder.width()];
                prop_assert_eq!(encoder.simulate(&op), encoder.encode(&op, &mut buf));
            }
        }
    }

    #[test]
    fn prop_generated_workloads_are_costed(seed in any::<u64>()) {
        let model = VpuCostModel::new();
        let wl = WorkloadGenerator::new(seed).next_workload();
        let cycles = model.dpu(&wl);
        prop_assert!(!is_error_code(cycles), "{:?} -> {}", wl, model.dpu_msg(&wl).1);
        prop_assert!(cycles > 0);
    }

    #[test]
    fn prop_weight_footprint_is_page_aligned(seed in any::<u64>()) {
        let sanitizer = DpuOperationSanitizer::default();
        let wl = WorkloadGenerator::new(seed).next_workload();
        let op = sanitizer.sanitize(&wl).unwrap();
        let memory = sanitizer.compute_memory(&op).unwrap();
        prop_assert_eq!(memory.input_1 % 16384, 0);
    }

    #[test]
    fn prop_kernel_volume_is_word_aligned(
        seed in any::<u64>(),
        weight_type in prop::sample::select(vec![
            None,
            Some(DataType::Uint4),
            Some(DataType::Int4),
            Some(DataType::Int8),
        ]),
    ) {
        let sanitizer = DpuOperationSanitizer::default();
        let mut wl = WorkloadGenerator::new(seed).next_workload();
        wl.weight_type = weight_type;
        if let Ok(op) = sanitizer.sanitize(&wl) {
            prop_assert_eq!(op.behaviour.kernel_volume_bytes(&op) % 32, 0);
        }
    }

    #[test]
    fn prop_schedule_bounds(costs in prop::collection::vec(0u32..100_000, 0..40), n in 1u32..8) {
        let makespan = dpu_schedule(n, &costs, 0) as u64;
        let total: u64 = costs.iter().map(|&c| c as u64).sum();
        let largest = costs.iter().copied().max().unwrap_or(0) as u64;
        prop_assert!(makespan >= largest);
        prop_assert!(makespan >= total.div_ceil(n as u64));
        prop_assert!(makespan <= total);
    }

    #[test]
    fn prop_info_energy_consistent(seed in any::<u64>()) {
        let model = VpuCostModel::new();
        let wl = WorkloadGenerator::new(seed).next_workload();
        let info: DpuInfoPack = model.dpu_info(&wl);
        prop_assert_eq!(info.energy, info.power_activity_factor * info.dpu_cycles as f32);
        prop_assert!(info.power_ideal_cycles <= info.efficiency_ideal_cycles);
    }
}
