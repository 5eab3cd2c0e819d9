//! Closed-form DMA transfer cycles.

use crate::core::cycles::{cost_adder, CostError, CyclesInterfaceType, START_ERROR_RANGE};
use crate::core::device::HwCharacteristics;
use crate::core::tensor::VpuTensor;
use crate::core::types::{MemoryLocation, VpuDevice};
use crate::core::workload::DmaWorkload;

/// Properties of one end of a transfer that change its CMX word size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EndMode {
    compressed: bool,
    permuted: bool,
    half_duplex: bool,
}

fn sram_word_size(tensor: &VpuTensor, mode: EndMode) -> u64 {
    if mode.permuted {
        return tensor.dtype.bytes().max(1) as u64;
    }
    let full_duplex = if mode.compressed { 64 } else { 32 };
    let word = if mode.half_duplex { full_duplex / 2 } else { full_duplex };
    tensor.size().min(word).max(1)
}

/// DPU cycles per byte moved at `location`.
fn cycles_per_byte(hw: &HwCharacteristics, tensor: &VpuTensor, location: MemoryLocation, mode: EndMode) -> f64 {
    match location {
        MemoryLocation::Dram => hw.dpu_fclk as f64 / hw.dram_bandwidth_mbps as f64,
        _ => hw.dpu_fclk as f64 / hw.cmx_fclk as f64 / sram_word_size(tensor, mode) as f64,
    }
}

fn transfer_cycles(bytes: u64, cycles_per_byte: f64) -> CyclesInterfaceType {
    let c = (bytes as f64 * cycles_per_byte).ceil();
    c.min(START_ERROR_RANGE as f64) as CyclesInterfaceType
}

pub fn dma_cycles(hw: &HwCharacteristics, wl: &DmaWorkload) -> Result<CyclesInterfaceType, CostError> {
    if hw.device != wl.device || hw.dram_bandwidth_mbps == 0 || hw.cmx_fclk == 0 || hw.dpu_fclk == 0 {
        return Err(CostError::InvalidInputDevice);
    }

    // CMX to CMX is half duplex up to 2.7
    let half_duplex = wl.device <= VpuDevice::Vpu27
        && wl.input_location == MemoryLocation::Cmx
        && wl.output_location == MemoryLocation::Cmx;
    let layout_changes = wl.input.layout != wl.output.layout;
    let size_changes = wl.input.size() != wl.output.size();

    let in_mode = EndMode {
        compressed: size_changes && wl.input_location == MemoryLocation::Cmx,
        permuted: layout_changes && wl.input_location == MemoryLocation::Cmx,
        half_duplex,
    };
    let out_mode = EndMode {
        compressed: size_changes && wl.output_location == MemoryLocation::Cmx,
        permuted: layout_changes && wl.output_location == MemoryLocation::Cmx,
        half_duplex,
    };

    let input_cycles = transfer_cycles(wl.input.size(), cycles_per_byte(hw, &wl.input, wl.input_location, in_mode));
    let output_cycles =
        transfer_cycles(wl.output.size(), cycles_per_byte(hw, &wl.output, wl.output_location, out_mode));

    let latency = hw.dma_latency(wl.input_location).max(hw.dma_latency(wl.output_location));
    Ok(cost_adder(latency, input_cycles.max(output_cycles)))
}
