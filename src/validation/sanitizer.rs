use serde::{Deserialize, Serialize};

use crate::core::cycles::CostError;
use crate::core::types::Operation;
use crate::core::workload::DpuWorkload;
use crate::validation::behaviours::OpBehaviour;
use crate::validation::checker::WorkloadChecker;
use crate::validation::memory::{MemoryCalculator, MemorySize};
use crate::validation::operation::DpuOperation;
use crate::validation::valid_values::DeviceTables;

/// Outcome of sanitization with the reason a workload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SanityReport {
    pub error: Option<CostError>,
    pub info: String,
}

impl SanityReport {
    pub fn is_usable(&self) -> bool {
        self.error.is_none()
    }

    fn fail(error: CostError, info: impl Into<String>) -> Self {
        Self { error: Some(error), info: info.into() }
    }

    /// Error to report for a refused workload.
    pub fn cost_error(&self) -> CostError {
        self.error.unwrap_or(CostError::InvalidInputConfiguration)
    }
}

/// Turns raw workloads into canonical, hardware-legal [`DpuOperation`]s.
#[derive(Debug, Clone, Default)]
pub struct DpuOperationSanitizer {
    tables: DeviceTables,
    memory: MemoryCalculator,
}

impl DpuOperationSanitizer {
    pub fn new(tables: DeviceTables, memory: MemoryCalculator) -> Self {
        Self { tables, memory }
    }

    pub fn tables(&self) -> &DeviceTables {
        &self.tables
    }

    pub fn memory_calculator(&self) -> &MemoryCalculator {
        &self.memory
    }

    /// Folds numerically equivalent operations into one canonical form.
    pub fn canonicalize(wl: &mut DpuWorkload) {
        if wl.op == Operation::AvePool {
            wl.op = Operation::DwConvolution;
        }
        if wl.op == Operation::Convolution && (1..16).contains(&wl.inputs[0].channels()) {
            wl.op = Operation::CmConvolution;
        }
        if wl.op.keeps_channels() && wl.inputs[0].channels() != wl.outputs[0].channels() {
            log::warn!(
                "Changed input channels from {} to {} for {:?}",
                wl.inputs[0].channels(),
                wl.outputs[0].channels(),
                wl.op
            );
            let channels = wl.outputs[0].channels();
            wl.inputs[0].set_channels(channels);
        }
    }

    /// Sanitizes in place and returns the canonical operation, or the reason it is refused.
    pub fn check_and_sanitize(&self, wl: &mut DpuWorkload) -> Result<DpuOperation, SanityReport> {
        let Some(config) = self.tables.get(wl.device) else {
            return Err(SanityReport::fail(
                CostError::InvalidInputDevice,
                format!("device {:?} is not supported", wl.device),
            ));
        };

        Self::canonicalize(wl);

        let behaviour = match OpBehaviour::for_operation(wl.op) {
            Some(b) if config.is_valid_operation(wl.op) => b,
            _ => {
                return Err(SanityReport::fail(
                    CostError::InvalidInputOperation,
                    format!("operation {:?} is not supported on {:?}", wl.op, wl.device),
                ))
            }
        };

        wl.inputs[0].dtype = config.restrict_datatype(wl.inputs[0].dtype);
        wl.outputs[0].dtype = config.restrict_datatype(wl.outputs[0].dtype);
        if let Some(wt) = wl.weight_type {
            wl.weight_type = Some(config.restrict_datatype(wt));
        }

        wl.inputs[0].layout = config.adapt_layout(wl.inputs[0].layout);
        wl.outputs[0].layout = config.adapt_layout(wl.outputs[0].layout);
        for s in wl.input_swizzling.iter_mut().chain(wl.output_swizzling.iter_mut()) {
            *s = config.adapt_swizzling(*s);
        }

        let op = DpuOperation::new(wl, behaviour);

        let memory = self.memory.compute_memory(&op, config);
        if memory.cmx > config.cmx_size_bytes() {
            return Err(SanityReport::fail(
                CostError::InputTooBig,
                format!("needs {} bytes of CMX, {} available", memory.cmx, config.cmx_size_bytes()),
            ));
        }

        let findings = WorkloadChecker::new(config).check_workload_consistency(&op);
        if !findings.is_empty() {
            return Err(SanityReport::fail(CostError::InvalidInputConfiguration, findings.to_text()));
        }

        Ok(op)
    }

    /// Like [`Self::check_and_sanitize`] but leaves the caller's workload untouched.
    pub fn sanitize(&self, wl: &DpuWorkload) -> Result<DpuOperation, SanityReport> {
        let mut copy = wl.clone();
        self.check_and_sanitize(&mut copy)
    }

    /// Footprint of a canonical operation, `None` for unsupported devices.
    pub fn compute_memory(&self, op: &DpuOperation) -> Option<MemorySize> {
        let config = self.tables.get(op.device)?;
        Some(self.memory.compute_memory(op, config))
    }
}
