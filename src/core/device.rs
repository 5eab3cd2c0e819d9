use serde::{Deserialize, Serialize};

use crate::core::types::{DataType, MemoryLocation, VpuDevice};

/// Performance-relevant constants of one VPU generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwCharacteristics {
    pub device: VpuDevice,
    pub name: String,

    // Clocks (MHz)
    pub dpu_fclk: u32,
    pub cmx_fclk: u32,

    // Memory system
    pub cmx_word_size_bytes: u32,
    pub dma_engine_bytes_per_cycle: u32,
    pub cmx_read_ports: u32,
    pub dram_bandwidth_mbps: u32,
    pub dram_latency_ns: u32,
    pub cmx_latency_cmx_clk: u32,

    // Compute
    pub nr_macs: u32,
    pub fp_to_int_resource_ratio: u32,
    pub nr_ppe: u32,
    pub input_channels_mac: u32,
    pub dpu_per_tile: u32,
}

impl HwCharacteristics {
    pub fn vpu_2_0() -> Self {
        Self {
            device: VpuDevice::Vpu20,
            name: "VPU 2.0".to_string(),
            dpu_fclk: 700,
            cmx_fclk: 700,
            cmx_word_size_bytes: 16,
            dma_engine_bytes_per_cycle: 32,
            cmx_read_ports: 4,
            dram_bandwidth_mbps: 20000,
            dram_latency_ns: 0,
            cmx_latency_cmx_clk: 0,
            nr_macs: 256,
            fp_to_int_resource_ratio: 4,
            nr_ppe: 16,
            input_channels_mac: 1,
            dpu_per_tile: 5,
        }
    }

    pub fn vpu_2_1() -> Self {
        Self {
            device: VpuDevice::Vpu21,
            name: "VPU 2.1".to_string(),
            dpu_fclk: 850,
            cmx_fclk: 850,
            ..Self::vpu_2_0()
        }
    }

    pub fn vpu_2_7() -> Self {
        Self {
            device: VpuDevice::Vpu27,
            name: "VPU 2.7".to_string(),
            dpu_fclk: 1300,
            cmx_fclk: 975,
            cmx_word_size_bytes: 16,
            dma_engine_bytes_per_cycle: 32,
            cmx_read_ports: 8,
            dram_bandwidth_mbps: 27000,
            dram_latency_ns: 956,
            cmx_latency_cmx_clk: 16,
            nr_macs: 2048,
            fp_to_int_resource_ratio: 2,
            nr_ppe: 64,
            input_channels_mac: 8,
            dpu_per_tile: 1,
        }
    }

    pub fn vpu_4_0() -> Self {
        Self {
            device: VpuDevice::Vpu40,
            name: "VPU 4.0".to_string(),
            dpu_fclk: 1700,
            cmx_word_size_bytes: 32,
            dma_engine_bytes_per_cycle: 64,
            dram_bandwidth_mbps: 45000,
            cmx_latency_cmx_clk: 32,
            ..Self::vpu_2_7()
        }
    }

    pub fn for_device(device: VpuDevice) -> Self {
        match device {
            VpuDevice::Vpu20 => Self::vpu_2_0(),
            VpuDevice::Vpu21 => Self::vpu_2_1(),
            VpuDevice::Vpu27 => Self::vpu_2_7(),
            VpuDevice::Vpu40 => Self::vpu_4_0(),
        }
    }

    /// DMA setup latency in DPU cycles.
    pub fn dma_latency(&self, location: MemoryLocation) -> u32 {
        match location {
            MemoryLocation::Dram => {
                ((self.dram_latency_ns as u64 * self.dpu_fclk as u64) / 1000) as u32
            }
            _ => ((self.cmx_latency_cmx_clk as u64 * self.dpu_fclk as u64) / self.cmx_fclk as u64) as u32,
        }
    }

    /// MACs per cycle once the float/int resource ratio is applied.
    pub fn nr_macs_for(&self, native_fp: bool) -> u32 {
        if native_fp {
            self.nr_macs.div_ceil(self.fp_to_int_resource_ratio)
        } else {
            self.nr_macs
        }
    }

    /// True when the MAC array computes in floating point for these operand types.
    pub fn native_comp_is_fp(input: DataType, weights: DataType) -> bool {
        input.is_float() || weights.is_float()
    }
}

/// One immutable [`HwCharacteristics`] per generation, built once and shared by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwCatalog {
    devices: [HwCharacteristics; 4],
}

impl Default for HwCatalog {
    fn default() -> Self {
        Self {
            devices: [
                HwCharacteristics::vpu_2_0(),
                HwCharacteristics::vpu_2_1(),
                HwCharacteristics::vpu_2_7(),
                HwCharacteristics::vpu_4_0(),
            ],
        }
    }
}

impl HwCatalog {
    pub fn get(&self, device: VpuDevice) -> &HwCharacteristics {
        // one entry per generation, indexed by discriminant
        &self.devices[device as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dma_latency() {
        let hw = HwCharacteristics::vpu_2_7();
        assert_eq!(hw.dma_latency(MemoryLocation::Dram), 1242);
        assert_eq!(hw.dma_latency(MemoryLocation::Cmx), 21);

        let old = HwCharacteristics::vpu_2_0();
        assert_eq!(old.dma_latency(MemoryLocation::Dram), 0);
        assert_eq!(old.dma_latency(MemoryLocation::Cmx), 0);

        let next = HwCharacteristics::vpu_4_0();
        assert_eq!(next.dma_latency(MemoryLocation::Dram), 1625);
        assert_eq!(next.dma_latency(MemoryLocation::Cmx), 55);
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = HwCatalog::default();
        for d in [VpuDevice::Vpu20, VpuDevice::Vpu21, VpuDevice::Vpu27, VpuDevice::Vpu40] {
            assert_eq!(catalog.get(d).device, d);
        }
    }

    #[test]
    fn test_catalog_needs_every_generation() {
        let full = serde_json::to_value(HwCatalog::default()).unwrap();
        let back: HwCatalog = serde_json::from_value(full.clone()).unwrap();
        assert_eq!(back.get(VpuDevice::Vpu40).device, VpuDevice::Vpu40);

        let mut short = full;
        short["devices"].as_array_mut().unwrap().pop();
        assert!(serde_json::from_value::<HwCatalog>(short).is_err());
    }

    #[test]
    fn test_profile_roundtrips_through_json() {
        let hw = HwCharacteristics::vpu_4_0();
        let text = serde_json::to_string(&hw).unwrap();
        let back: HwCharacteristics = serde_json::from_str(&text).unwrap();
        assert_eq!(back, hw);
    }
}
