//! Model naming and output interpretation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::VpuError;

/// `NAME-VI-VO` as stored in the model metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub input_version: u32,
    pub output_version: u32,
}

impl Default for ModelVersion {
    fn default() -> Self {
        Self { name: "none".to_string(), input_version: 1, output_version: 1 }
    }
}

impl ModelVersion {
    /// Missing or unparsable parts keep their defaults.
    pub fn parse(raw: &str) -> Self {
        let mut version = Self::default();
        let mut parts = raw.split('-');
        if let Some(name) = parts.next().filter(|s| !s.is_empty()) {
            version.name = name.to_string();
        }
        if let Some(vi) = parts.next().and_then(|s| s.trim().parse().ok()) {
            version.input_version = vi;
        }
        if let Some(vo) = parts.next().and_then(|s| s.trim().parse().ok()) {
            version.output_version = vo;
        }
        version
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.input_version, self.output_version)
    }
}

/// How the raw network output maps to cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputVersion {
    /// 0: the newest models predict cycles directly.
    Latest,
    /// 1: overhead factor over theoretical cycles, at least 1 for dense workloads.
    HwOverheadBounded,
    /// 2
    Cycles,
    /// 3
    HwOverheadUnbounded,
}

impl OutputVersion {
    pub fn from_number(version: u32) -> Option<Self> {
        match version {
            0 => Some(Self::Latest),
            1 => Some(Self::HwOverheadBounded),
            2 => Some(Self::Cycles),
            3 => Some(Self::HwOverheadUnbounded),
            _ => None,
        }
    }

    pub fn resolve(model: &ModelVersion) -> Result<Self, VpuError> {
        Self::from_number(model.output_version).ok_or_else(|| VpuError::UnsupportedOutputVersion {
            version: model.output_version,
            model: model.name.clone(),
        })
    }

    pub fn is_hw_overhead(self) -> bool {
        matches!(self, Self::HwOverheadBounded | Self::HwOverheadUnbounded)
    }

    /// Cycles from one raw output. `theoretical` is only read for overhead models.
    pub fn to_cycles(self, raw: f32, theoretical: u32, any_sparsity: bool) -> f32 {
        match self {
            Self::Latest | Self::Cycles => raw,
            Self::HwOverheadUnbounded => raw * theoretical as f32,
            Self::HwOverheadBounded => {
                let overhead = if !any_sparsity && raw < 1.0 { 1.0 } else { raw };
                overhead * theoretical as f32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_name() {
        let v = ModelVersion::parse("VPU27-11-3");
        assert_eq!(v.name, "VPU27");
        assert_eq!(v.input_version, 11);
        assert_eq!(v.output_version, 3);
        assert_eq!(v.to_string(), "VPU27-11-3");
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(ModelVersion::parse(""), ModelVersion::default());
        assert_eq!(ModelVersion::parse("abc").to_string(), "abc-1-1");
        assert_eq!(ModelVersion::parse("abc-x-0").to_string(), "abc-1-0");
    }

    #[test]
    fn test_output_mapping() {
        assert_eq!(OutputVersion::Cycles.to_cycles(120.0, 100, false), 120.0);
        assert_eq!(OutputVersion::HwOverheadUnbounded.to_cycles(0.5, 100, false), 50.0);
        assert_eq!(OutputVersion::HwOverheadBounded.to_cycles(0.5, 100, false), 100.0);
        assert_eq!(OutputVersion::HwOverheadBounded.to_cycles(0.5, 100, true), 50.0);
        assert_eq!(OutputVersion::HwOverheadBounded.to_cycles(1.5, 100, false), 150.0);
    }

    #[test]
    fn test_unknown_output_version() {
        let v = ModelVersion::parse("m-12-9");
        assert!(matches!(
            OutputVersion::resolve(&v),
            Err(VpuError::UnsupportedOutputVersion { version: 9, .. })
        ));
    }
}
