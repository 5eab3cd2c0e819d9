use serde::{Deserialize, Serialize};
use std::fmt;

/// An enumerated domain with contiguous discriminants starting at zero.
///
/// The cardinality is declared by the variant list itself, so feature schemas can size
/// one-hot blocks from it instead of relying on a trailing sentinel variant.
pub trait EnumDomain: Copy + Eq + fmt::Debug + 'static {
    const NAME: &'static str;
    const VARIANTS: &'static [Self];

    fn index(self) -> usize;

    fn cardinality() -> usize {
        Self::VARIANTS.len()
    }

    fn from_index(idx: usize) -> Option<Self> {
        Self::VARIANTS.get(idx).copied()
    }
}

macro_rules! enum_domain {
    ($ty:ident, $name:literal, [$($variant:ident),+ $(,)?]) => {
        impl EnumDomain for $ty {
            const NAME: &'static str = $name;
            const VARIANTS: &'static [Self] = &[$($ty::$variant),+];

            fn index(self) -> usize {
                self as usize
            }
        }

        impl $ty {
            pub fn to_f32(self) -> f32 {
                self.index() as f32
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VpuDevice {
    Vpu20,
    Vpu21,
    Vpu27,
    Vpu40,
}

enum_domain!(VpuDevice, "VPUDevice", [Vpu20, Vpu21, Vpu27, Vpu40]);

impl VpuDevice {
    /// Devices from 2.7 on use cuboid execution modes.
    pub fn is_cuboid_generation(self) -> bool {
        self >= VpuDevice::Vpu27
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Uint8,
    Int8,
    Float16,
    Bfloat16,
    Bf8,
    Hf8,
    Uint4,
    Int4,
    Uint2,
    Int2,
    Uint1,
    Int1,
    Int32,
    Float32,
}

enum_domain!(
    DataType,
    "DataType",
    [Uint8, Int8, Float16, Bfloat16, Bf8, Hf8, Uint4, Int4, Uint2, Int2, Uint1, Int1, Int32, Float32]
);

impl DataType {
    /// Storage size of one element. Sub-byte types still occupy one byte in CMX.
    pub fn bytes(self) -> u32 {
        match self {
            Self::Float16 | Self::Bfloat16 => 2,
            Self::Int32 | Self::Float32 => 4,
            _ => 1,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Uint4 | Self::Int4 => 4,
            Self::Uint2 | Self::Int2 => 2,
            Self::Uint1 | Self::Int1 => 1,
            _ => self.bytes() * 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Bfloat16 | Self::Bf8 | Self::Hf8 | Self::Float32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Convolution,
    DwConvolution,
    Eltwise,
    MaxPool,
    AvePool,
    CmConvolution,
    LayerNorm,
    EltwiseMul,
}

enum_domain!(
    Operation,
    "Operation",
    [Convolution, DwConvolution, Eltwise, MaxPool, AvePool, CmConvolution, LayerNorm, EltwiseMul]
);

impl Operation {
    pub fn is_elementwise(self) -> bool {
        matches!(self, Self::Eltwise | Self::EltwiseMul)
    }

    /// Operations whose output channel count is bound to the input channel count.
    pub fn keeps_channels(self) -> bool {
        matches!(
            self,
            Self::Eltwise | Self::EltwiseMul | Self::DwConvolution | Self::MaxPool | Self::AvePool
        )
    }

    pub fn is_convolution(self) -> bool {
        matches!(self, Self::Convolution | Self::CmConvolution)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivationFunction {
    #[default]
    None,
    Relu,
    Lrelu,
    Add,
    Sub,
    Mult,
}

enum_domain!(ActivationFunction, "ActivationFunction", [None, Relu, Lrelu, Add, Sub, Mult]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Swizzling {
    #[default]
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
}

enum_domain!(Swizzling, "Swizzling", [Key0, Key1, Key2, Key3, Key4, Key5]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    Vector,
    Matrix,
    VectorFp16,
    Cuboid16x16,
    Cuboid8x16,
    Cuboid4x16,
}

enum_domain!(
    ExecutionMode,
    "ExecutionMode",
    [Vector, Matrix, VectorFp16, Cuboid16x16, Cuboid8x16, Cuboid4x16]
);

/// MPE grid of an execution mode as (X, Y, Z, B).
pub fn mpe_mode_to_grid(mode: ExecutionMode) -> [u32; 4] {
    match mode {
        ExecutionMode::Vector => [16, 1, 16, 1],
        ExecutionMode::VectorFp16 => [4, 1, 16, 1],
        _ => [4, 4, 16, 1],
    }
}

/// NTHW/NTK cuboid sizes for 2.7+ modes as (X, Y, Z).
pub fn mpe_mode_to_nthw_ntk_grid(mode: ExecutionMode) -> [u32; 3] {
    match mode {
        ExecutionMode::Cuboid4x16 => [8, 8, 256],
        ExecutionMode::Cuboid8x16 => [16, 8, 128],
        ExecutionMode::Cuboid16x16 => [16, 16, 64],
        _ => [1, 1, 1],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    ZMajor,
    CMajor,
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    #[default]
    Zxy,
    Zyx,
    Invalid,
}

enum_domain!(Layout, "Layout", [ZMajor, CMajor, Xyz, Xzy, Yxz, Yzx, Zxy, Zyx, Invalid]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsiStrategy {
    #[default]
    Clustering,
    SplitOverH,
    SplitOverK,
}

enum_domain!(IsiStrategy, "ISIStrategy", [Clustering, SplitOverH, SplitOverK]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryLocation {
    Dram,
    Cmx,
    Csram,
    Upa,
}

enum_domain!(MemoryLocation, "MemoryLocation", [Dram, Cmx, Csram, Upa]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinalities() {
        assert_eq!(VpuDevice::cardinality(), 4);
        assert_eq!(DataType::cardinality(), 14);
        assert_eq!(Operation::cardinality(), 8);
        assert_eq!(ActivationFunction::cardinality(), 6);
        assert_eq!(Swizzling::cardinality(), 6);
        assert_eq!(ExecutionMode::cardinality(), 6);
        assert_eq!(Layout::cardinality(), 9);
        assert_eq!(IsiStrategy::cardinality(), 3);
    }

    #[test]
    fn test_index_matches_variant_order() {
        for (i, v) in DataType::VARIANTS.iter().enumerate() {
            assert_eq!(v.index(), i);
            assert_eq!(DataType::from_index(i), Some(*v));
        }
        assert_eq!(Operation::from_index(8), None);
    }

    #[test]
    fn test_datatype_sizes() {
        assert_eq!(DataType::Uint8.bytes(), 1);
        assert_eq!(DataType::Float16.bytes(), 2);
        assert_eq!(DataType::Bfloat16.bytes(), 2);
        assert_eq!(DataType::Int32.bytes(), 4);
        assert_eq!(DataType::Uint4.bytes(), 1);
        assert_eq!(DataType::Uint4.bits(), 4);
        assert!(DataType::Bf8.is_float());
        assert!(!DataType::Int8.is_float());
    }

    #[test]
    fn test_grids() {
        assert_eq!(mpe_mode_to_grid(ExecutionMode::Vector), [16, 1, 16, 1]);
        assert_eq!(mpe_mode_to_grid(ExecutionMode::VectorFp16), [4, 1, 16, 1]);
        assert_eq!(mpe_mode_to_grid(ExecutionMode::Cuboid16x16), [4, 4, 16, 1]);
    }
}
