//! Cycle counts and the error codes that share their numeric range.
//!
//! Inside the crate failures travel as [`CostError`]. At the public `dpu*` boundary they are
//! folded into the top of the `u32` range so a compiler can consume one scalar type.
//! [`CostError::code`] and [`CostError::from_code`] are the only conversions between the two.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CyclesInterfaceType = u32;

pub const MAX_CYCLES: CyclesInterfaceType = CyclesInterfaceType::MAX;

/// Values strictly above this are error codes.
pub const START_ERROR_RANGE: CyclesInterfaceType = MAX_CYCLES - 1000;

pub const ERROR_INPUT_TOO_BIG: CyclesInterfaceType = MAX_CYCLES;
pub const ERROR_INVALID_INPUT_CONFIGURATION: CyclesInterfaceType = MAX_CYCLES - 1;
pub const ERROR_INVALID_INPUT_DEVICE: CyclesInterfaceType = MAX_CYCLES - 2;
pub const ERROR_INVALID_INPUT_OPERATION: CyclesInterfaceType = MAX_CYCLES - 3;
pub const ERROR_INVALID_OUTPUT_RANGE: CyclesInterfaceType = MAX_CYCLES - 4;
pub const ERROR_TILE_OUTPUT: CyclesInterfaceType = MAX_CYCLES - 5;
pub const ERROR_TILE_SPLIT_ZERO_CYC_OUTPUT: CyclesInterfaceType = MAX_CYCLES - 6;
pub const ERROR_TILE_SPLIT_EXCEPTION: CyclesInterfaceType = MAX_CYCLES - 7;
pub const ERROR_INVALID_LAYER_CONFIGURATION: CyclesInterfaceType = MAX_CYCLES - 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostError {
    #[error("input too big for CMX")]
    InputTooBig,
    #[error("invalid input configuration")]
    InvalidInputConfiguration,
    #[error("invalid input device")]
    InvalidInputDevice,
    #[error("invalid input operation")]
    InvalidInputOperation,
    #[error("inferred value outside the valid output range")]
    InvalidOutputRange,
    #[error("tile output error")]
    TileOutput,
    #[error("tile split produced zero cycles")]
    TileSplitZeroCycOutput,
    #[error("tile split exception")]
    TileSplitException,
    #[error("invalid layer configuration")]
    InvalidLayerConfiguration,
    /// A code inside the error range without a dedicated name.
    #[error("unknown error code {0}")]
    Other(CyclesInterfaceType),
}

impl CostError {
    pub fn code(self) -> CyclesInterfaceType {
        match self {
            Self::InputTooBig => ERROR_INPUT_TOO_BIG,
            Self::InvalidInputConfiguration => ERROR_INVALID_INPUT_CONFIGURATION,
            Self::InvalidInputDevice => ERROR_INVALID_INPUT_DEVICE,
            Self::InvalidInputOperation => ERROR_INVALID_INPUT_OPERATION,
            Self::InvalidOutputRange => ERROR_INVALID_OUTPUT_RANGE,
            Self::TileOutput => ERROR_TILE_OUTPUT,
            Self::TileSplitZeroCycOutput => ERROR_TILE_SPLIT_ZERO_CYC_OUTPUT,
            Self::TileSplitException => ERROR_TILE_SPLIT_EXCEPTION,
            Self::InvalidLayerConfiguration => ERROR_INVALID_LAYER_CONFIGURATION,
            Self::Other(code) => code,
        }
    }

    /// `None` for values that are plain cycle counts.
    pub fn from_code(code: CyclesInterfaceType) -> Option<Self> {
        if !is_error_code(code) {
            return None;
        }
        Some(match code {
            ERROR_INPUT_TOO_BIG => Self::InputTooBig,
            ERROR_INVALID_INPUT_CONFIGURATION => Self::InvalidInputConfiguration,
            ERROR_INVALID_INPUT_DEVICE => Self::InvalidInputDevice,
            ERROR_INVALID_INPUT_OPERATION => Self::InvalidInputOperation,
            ERROR_INVALID_OUTPUT_RANGE => Self::InvalidOutputRange,
            ERROR_TILE_OUTPUT => Self::TileOutput,
            ERROR_TILE_SPLIT_ZERO_CYC_OUTPUT => Self::TileSplitZeroCycOutput,
            ERROR_TILE_SPLIT_EXCEPTION => Self::TileSplitException,
            ERROR_INVALID_LAYER_CONFIGURATION => Self::InvalidLayerConfiguration,
            other => Self::Other(other),
        })
    }
}

pub fn is_error_code(cycles: CyclesInterfaceType) -> bool {
    cycles > START_ERROR_RANGE
}

/// Folds an internal result into the boundary scalar.
pub fn to_interface(result: Result<CyclesInterfaceType, CostError>) -> CyclesInterfaceType {
    match result {
        Ok(cycles) => cycles.min(START_ERROR_RANGE),
        Err(e) => e.code(),
    }
}

/// Inverse of [`to_interface`].
pub fn from_interface(cycles: CyclesInterfaceType) -> Result<CyclesInterfaceType, CostError> {
    match CostError::from_code(cycles) {
        Some(e) => Err(e),
        None => Ok(cycles),
    }
}

/// Adds two costs. An error on either side wins (left first); sums saturate below the error range.
pub fn cost_adder(a: CyclesInterfaceType, b: CyclesInterfaceType) -> CyclesInterfaceType {
    if is_error_code(a) {
        return a;
    }
    if is_error_code(b) {
        return b;
    }
    let sum = a as u64 + b as u64;
    sum.min(START_ERROR_RANGE as u64) as CyclesInterfaceType
}

/// Rounds a float prediction up to whole cycles, clamped below the error range.
pub fn to_cycles(value: f32) -> CyclesInterfaceType {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let c = value.ceil() as f64;
    c.min(START_ERROR_RANGE as f64) as CyclesInterfaceType
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_isomorphic() {
        let all = [
            CostError::InputTooBig,
            CostError::InvalidInputConfiguration,
            CostError::InvalidInputDevice,
            CostError::InvalidInputOperation,
            CostError::InvalidOutputRange,
            CostError::TileOutput,
            CostError::TileSplitZeroCycOutput,
            CostError::TileSplitException,
            CostError::InvalidLayerConfiguration,
        ];
        for e in all {
            assert!(is_error_code(e.code()));
            assert_eq!(CostError::from_code(e.code()), Some(e));
        }
        assert_eq!(CostError::from_code(1234), None);
        assert_eq!(CostError::from_code(START_ERROR_RANGE), None);
        assert_eq!(CostError::from_code(START_ERROR_RANGE + 1), Some(CostError::Other(START_ERROR_RANGE + 1)));
    }

    #[test]
    fn test_error_values() {
        assert_eq!(ERROR_INPUT_TOO_BIG, u32::MAX);
        assert_eq!(ERROR_INVALID_INPUT_CONFIGURATION, u32::MAX - 1);
        assert_eq!(ERROR_INVALID_LAYER_CONFIGURATION, u32::MAX - 8);
    }

    #[test]
    fn test_cost_adder() {
        assert_eq!(cost_adder(10, 20), 30);
        assert_eq!(cost_adder(ERROR_TILE_OUTPUT, 20), ERROR_TILE_OUTPUT);
        assert_eq!(cost_adder(20, ERROR_INPUT_TOO_BIG), ERROR_INPUT_TOO_BIG);
        assert_eq!(cost_adder(START_ERROR_RANGE, 5), START_ERROR_RANGE);
    }

    #[test]
    fn test_to_cycles_rounds_up() {
        assert_eq!(to_cycles(10.1), 11);
        assert_eq!(to_cycles(10.0), 10);
        assert_eq!(to_cycles(-3.0), 0);
        assert_eq!(to_cycles(f32::NAN), 0);
    }
}
