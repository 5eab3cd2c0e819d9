use serde::{Deserialize, Serialize};

use crate::core::types::{DataType, Layout};

/// Shape in WHCB order.
pub type Shape = [u32; 4];

/// A tensor as the DPU sees it: shape, element type, memory layout and whether the
/// activation stream carries a sparsity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VpuTensor {
    pub shape: Shape,
    pub dtype: DataType,
    pub layout: Layout,
    pub sparsity: bool,
}

impl Default for VpuTensor {
    fn default() -> Self {
        Self {
            shape: [1, 1, 1, 1],
            dtype: DataType::Uint8,
            layout: Layout::Zxy,
            sparsity: false,
        }
    }
}

impl VpuTensor {
    pub fn new(shape: Shape, dtype: DataType) -> Self {
        Self { shape, dtype, ..Default::default() }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_sparsity(mut self, sparsity: bool) -> Self {
        self.sparsity = sparsity;
        self
    }

    pub fn width(&self) -> u32 {
        self.shape[0]
    }

    pub fn height(&self) -> u32 {
        self.shape[1]
    }

    pub fn channels(&self) -> u32 {
        self.shape[2]
    }

    pub fn batches(&self) -> u32 {
        self.shape[3]
    }

    pub fn volume(&self) -> u64 {
        self.shape.iter().map(|&d| d as u64).product()
    }

    /// Dense size in bytes.
    pub fn size(&self) -> u64 {
        self.volume() * self.dtype.bytes() as u64
    }

    pub fn set_channels(&mut self, channels: u32) {
        self.shape[2] = channels;
    }

    pub fn is_float(&self) -> bool {
        self.dtype.is_float()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_uses_element_width() {
        let t = VpuTensor::new([56, 56, 16, 1], DataType::Uint8);
        assert_eq!(t.volume(), 50176);
        assert_eq!(t.size(), 50176);

        let f = VpuTensor::new([56, 56, 16, 1], DataType::Float16);
        assert_eq!(f.size(), 2 * 50176);
    }
}
