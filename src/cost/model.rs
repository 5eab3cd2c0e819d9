use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::config::CostModelConfig;
use crate::core::cycles::{to_cycles, to_interface, CostError, CyclesInterfaceType};
use crate::core::device::{HwCatalog, HwCharacteristics};
use crate::core::error::VpuError;
use crate::core::tensor::VpuTensor;
use crate::core::types::{MemoryLocation, VpuDevice};
use crate::core::workload::{DmaWorkload, DpuWorkload};
use crate::cost::dma::dma_cycles;
use crate::cost::info::{ideal_cycles, DpuInfoPack};
use crate::cost::theoretical::dpu_theoretical_cycles;
use crate::inference::context::ExecutionContext;
use crate::inference::encoder::Encoder;
use crate::inference::model::InferenceModel;
use crate::inference::runtime::Runtime;
use crate::inference::schema::dma::dma_encoder;
use crate::inference::schema::dpu::InputVersion;
use crate::inference::version::{ModelVersion, OutputVersion};
use crate::validation::memory::MemoryCalculator;
use crate::validation::operation::DpuOperation;
use crate::validation::sanitizer::DpuOperationSanitizer;
use crate::validation::valid_values::DeviceTables;

/// Raw network outputs outside `[0, MAX_RAW_OUTPUT]` are rejected.
pub const MAX_RAW_OUTPUT: f32 = 4.0e9;

/// Idle contexts kept for reuse; any beyond this are dropped when returned.
pub const MAX_POOLED_CONTEXTS: usize = 16;

/// Outcome of one sanitize/infer/post-process pass.
#[derive(Debug, Clone)]
struct Evaluation {
    cycles: Result<CyclesInterfaceType, CostError>,
    info: String,
    raw: f32,
}

impl Evaluation {
    fn refused(error: CostError, info: String) -> Self {
        Self { cycles: Err(error), info, raw: 0.0 }
    }

    fn code(&self) -> CyclesInterfaceType {
        to_interface(self.cycles)
    }
}

/// Paired encoder and output interpretation for a loaded network.
#[derive(Debug)]
struct NnPath {
    encoder: Encoder<DpuOperation>,
    output: OutputVersion,
}

/// Cycle cost model for DPU and DMA workloads.
///
/// Uses the NN when one is loaded, theoretical cycles otherwise. The model is shared
/// immutably. Each call borrows an [`ExecutionContext`] from a small pool for the length of
/// one inference, or runs in a context the caller owns (see [`Self::dpu_batch_with`]).
pub struct VpuCostModel {
    config: CostModelConfig,
    sanitizer: DpuOperationSanitizer,
    hw: HwCatalog,
    runtime: Runtime,
    nn: Option<NnPath>,
    contexts: Mutex<Vec<ExecutionContext>>,
}

impl std::fmt::Debug for VpuCostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpuCostModel")
            .field("model", self.runtime.model_version())
            .field("nn_initialized", &self.nn_initialized())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for VpuCostModel {
    fn default() -> Self {
        Self::new()
    }
}

impl VpuCostModel {
    /// Theoretical cycles only.
    pub fn new() -> Self {
        Self::theoretical_only(CostModelConfig::default(), InferenceModel::empty())
    }

    pub fn with_config(config: CostModelConfig) -> Result<Self, VpuError> {
        let model = match &config.model_path {
            Some(path) => InferenceModel::from_file(path),
            None => InferenceModel::empty(),
        };
        Self::assemble(model, config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, config: CostModelConfig) -> Result<Self, VpuError> {
        let config = config.with_model(path);
        Self::with_config(config)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VpuError> {
        Self::assemble(InferenceModel::from_bytes(bytes), CostModelConfig::default())
    }

    pub fn from_static(bytes: &'static [u8]) -> Result<Self, VpuError> {
        Self::assemble(InferenceModel::from_static(bytes), CostModelConfig::default())
    }

    fn theoretical_only(config: CostModelConfig, model: InferenceModel) -> Self {
        let sanitizer =
            DpuOperationSanitizer::new(DeviceTables::default(), MemoryCalculator::new(config.ignore_cmx_overhead));
        let runtime = Runtime::new(Arc::new(model), config.batch_size);
        Self {
            config,
            sanitizer,
            hw: HwCatalog::default(),
            runtime,
            nn: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Pairs a loaded model with its encoder and output interpretation.
    ///
    /// A model that failed to load is not an error: the result simply runs without NN.
    fn assemble(model: InferenceModel, config: CostModelConfig) -> Result<Self, VpuError> {
        if !model.is_initialized() {
            return Ok(Self::theoretical_only(config, model));
        }

        let version = model.version().clone();
        let input = InputVersion::from_number(version.input_version).ok_or_else(|| {
            VpuError::UnsupportedInputVersion { version: version.input_version, model: version.name.clone() }
        })?;
        let output = OutputVersion::resolve(&version)?;
        let encoder = input.encoder()?;
        if encoder.width() != model.input_size() {
            return Err(VpuError::InputSizeMismatch { encoder: encoder.width(), model: model.input_size() });
        }

        log::info!("Cost model {} uses {:?} descriptors and {:?} outputs", version, input, output);
        let mut this = Self::theoretical_only(config, model);
        this.nn = Some(NnPath { encoder, output });
        Ok(this)
    }

    pub fn nn_initialized(&self) -> bool {
        self.nn.is_some()
    }

    pub fn model_version(&self) -> &ModelVersion {
        self.runtime.model_version()
    }

    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    pub fn sanitizer(&self) -> &DpuOperationSanitizer {
        &self.sanitizer
    }

    pub fn hw(&self, device: VpuDevice) -> &HwCharacteristics {
        self.hw.get(device)
    }

    /// Scratch sized for this model, for use with [`Self::dpu_batch_with`].
    pub fn new_context(&self) -> ExecutionContext {
        self.runtime.default_context()
    }

    #[cfg(test)]
    fn pooled_contexts(&self) -> usize {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs `f` in a pooled context. The pool lock is not held while `f` runs.
    fn with_context<R>(&self, f: impl FnOnce(&mut ExecutionContext) -> R) -> R {
        let pooled = self.contexts.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let mut ctx = pooled.unwrap_or_else(|| self.runtime.default_context());
        let result = f(&mut ctx);
        let mut pool = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < MAX_POOLED_CONTEXTS {
            pool.push(ctx);
        }
        result
    }

    /// Raw network outputs, one per operation.
    fn infer(
        &self,
        encoder: &Encoder<DpuOperation>,
        ops: &[&DpuOperation],
        ctx: Option<&mut ExecutionContext>,
    ) -> Vec<f32> {
        let width = encoder.width();
        let mut descriptors = vec![0.0f32; width * ops.len()];
        for (op, slot) in ops.iter().zip(descriptors.chunks_mut(width)) {
            encoder.encode(op, slot);
        }
        let out_size = self.runtime.output_size().max(1);
        let first = |ctx: &mut ExecutionContext| -> Vec<f32> {
            self.runtime.predict(ctx, &descriptors).chunks(out_size).map(|row| row[0]).collect()
        };
        match ctx {
            Some(ctx) => first(ctx),
            None => self.with_context(first),
        }
    }

    fn post_process(&self, nn: &NnPath, raw: f32, op: &DpuOperation, info: String) -> Evaluation {
        if !raw.is_finite() || !(0.0..=MAX_RAW_OUTPUT).contains(&raw) {
            let info = format!("NN output {} out of range", raw);
            return Evaluation { cycles: Err(CostError::InvalidOutputRange), info, raw };
        }
        let theoretical =
            if nn.output.is_hw_overhead() { dpu_theoretical_cycles(op, self.hw.get(op.device)) } else { 0 };
        let any_sparsity = op.act_sparsity_enabled() || op.weight_sparsity_enabled();
        let cycles = to_cycles(nn.output.to_cycles(raw, theoretical, any_sparsity));
        if self.config.profiling {
            log::trace!("{:?} raw {} -> {} cycles", op.operation, raw, cycles);
        }
        Evaluation { cycles: Ok(cycles), info, raw }
    }

    fn theoretical(&self, op: &DpuOperation, info: String) -> Evaluation {
        if !self.config.use_theoretical_fallback {
            let info = "no NN loaded and theoretical fallback disabled".to_string();
            return Evaluation { cycles: Ok(0), info, raw: 0.0 };
        }
        let cycles = dpu_theoretical_cycles(op, self.hw.get(op.device));
        Evaluation { cycles: Ok(cycles), info, raw: cycles as f32 }
    }

    /// Workloads to cost for `wl`: the two single-sparsity variants when both sparsities are
    /// on, `wl` itself otherwise. A dual workload the sanitizer refuses has no variants.
    fn variants(&self, wl: &DpuWorkload) -> Result<Vec<DpuWorkload>, Evaluation> {
        if !wl.both_sparsities_active() {
            return Ok(vec![wl.clone()]);
        }
        self.sanitizer.sanitize(wl).map_err(|report| Evaluation::refused(report.cost_error(), report.info))?;
        Ok(vec![wl.without_act_sparsity(), wl.without_weight_sparsity()])
    }

    /// Costs many workloads with one inference call. Element `i` answers `workloads[i]`.
    fn evaluate_all(&self, workloads: &[DpuWorkload], ctx: Option<&mut ExecutionContext>) -> Vec<Evaluation> {
        let sanitized: Vec<Result<DpuOperation, Evaluation>> = workloads
            .iter()
            .map(|wl| {
                self.sanitizer
                    .sanitize(wl)
                    .map_err(|report| Evaluation::refused(report.cost_error(), report.info))
            })
            .collect();

        let Some(nn) = &self.nn else {
            return sanitized
                .into_iter()
                .map(|r| match r {
                    Ok(op) => self.theoretical(&op, String::new()),
                    Err(e) => e,
                })
                .collect();
        };

        let valid: Vec<&DpuOperation> = sanitized.iter().filter_map(|r| r.as_ref().ok()).collect();
        let mut raw = self.infer(&nn.encoder, &valid, ctx).into_iter();
        sanitized
            .into_iter()
            .map(|r| match r {
                Ok(op) => match raw.next() {
                    Some(value) => self.post_process(nn, value, &op, String::new()),
                    None => Evaluation::refused(CostError::InvalidOutputRange, "NN produced no output".to_string()),
                },
                Err(e) => e,
            })
            .collect()
    }

    /// Applies the dual-sparsity rule: the cheaper of the two single-sparsity variants.
    fn evaluate_batch(&self, workloads: &[DpuWorkload], ctx: Option<&mut ExecutionContext>) -> Vec<Evaluation> {
        let groups: Vec<Result<Vec<DpuWorkload>, Evaluation>> =
            workloads.iter().map(|wl| self.variants(wl)).collect();
        let flat: Vec<DpuWorkload> = groups.iter().filter_map(|g| g.as_ref().ok()).flatten().cloned().collect();
        let mut results = self.evaluate_all(&flat, ctx).into_iter();

        groups
            .into_iter()
            .map(|group| {
                let group = match group {
                    Ok(group) => group,
                    Err(refused) => return refused,
                };
                let mut best: Option<Evaluation> = None;
                for _ in &group {
                    let Some(candidate) = results.next() else { break };
                    best = match best {
                        Some(b) if b.code() <= candidate.code() => Some(b),
                        _ => Some(candidate),
                    };
                }
                best.unwrap_or_else(|| Evaluation::refused(CostError::InvalidInputConfiguration, String::new()))
            })
            .collect()
    }

    fn evaluate(&self, wl: &DpuWorkload) -> Evaluation {
        self.evaluate_batch(std::slice::from_ref(wl), None)
            .into_iter()
            .next()
            .unwrap_or_else(|| Evaluation::refused(CostError::InvalidInputConfiguration, String::new()))
    }

    /// Cycles of one DPU workload, or an error code from [`crate::core::cycles`].
    pub fn dpu(&self, wl: &DpuWorkload) -> CyclesInterfaceType {
        self.evaluate(wl).code()
    }

    /// Like [`Self::dpu`], with the sanitizer findings for refused workloads.
    pub fn dpu_msg(&self, wl: &DpuWorkload) -> (CyclesInterfaceType, String) {
        let eval = self.evaluate(wl);
        (eval.code(), eval.info)
    }

    /// Element-wise equal to calling [`Self::dpu`] on each workload.
    pub fn dpu_batch(&self, workloads: &[DpuWorkload]) -> Vec<CyclesInterfaceType> {
        self.evaluate_batch(workloads, None).iter().map(Evaluation::code).collect()
    }

    /// [`Self::dpu_batch`] running inference in a context the caller owns.
    pub fn dpu_batch_with(&self, ctx: &mut ExecutionContext, workloads: &[DpuWorkload]) -> Vec<CyclesInterfaceType> {
        self.evaluate_batch(workloads, Some(ctx)).iter().map(Evaluation::code).collect()
    }

    /// Cycles plus ideal cycles, utilization and energy.
    pub fn dpu_info(&self, wl: &DpuWorkload) -> DpuInfoPack {
        let eval = self.evaluate(wl);
        let mut pack =
            DpuInfoPack { dpu_cycles: eval.code(), err_info: eval.info, raw_cycles: eval.raw, ..Default::default() };

        if let Ok(op) = self.sanitizer.sanitize(wl) {
            let hw = self.hw.get(op.device);
            pack.hw_theoretical_cycles = dpu_theoretical_cycles(&op, hw) as u64;
            pack.apply_ideal(ideal_cycles(&op, hw));
        }
        pack
    }

    /// Closed-form theoretical cycles, ignoring any loaded NN.
    pub fn dpu_theoretical(&self, wl: &DpuWorkload) -> CyclesInterfaceType {
        match self.sanitizer.sanitize(wl) {
            Ok(op) => dpu_theoretical_cycles(&op, self.hw.get(op.device)),
            Err(report) => report.cost_error().code(),
        }
    }

    pub fn dma(
        &self,
        device: VpuDevice,
        input: &VpuTensor,
        output: &VpuTensor,
        input_location: MemoryLocation,
        output_location: MemoryLocation,
        output_write_tiles: u32,
    ) -> CyclesInterfaceType {
        let mut wl = DmaWorkload::new(device, *input, *output, input_location, output_location);
        wl.output_write_tiles = output_write_tiles;
        self.dma_workload(&wl)
    }

    pub fn dma_workload(&self, wl: &DmaWorkload) -> CyclesInterfaceType {
        to_interface(dma_cycles(self.hw.get(wl.device), wl))
    }

    /// Feature vector of a DMA transfer, for diagnostics.
    pub fn dma_descriptor(&self, wl: &DmaWorkload) -> Result<Vec<f32>, VpuError> {
        Ok(dma_encoder()?.encode_vec(wl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cycles::{is_error_code, ERROR_INVALID_INPUT_DEVICE};
    use crate::core::types::{DataType, ExecutionMode, Operation};
    use crate::inference::model::ModelBuilder;

    fn linear() -> VpuCostModel {
        let width = InputVersion::V11.width();
        let weights: Vec<f32> = (0..width).map(|i| (i % 5) as f32 + 1.0).collect();
        let bytes = ModelBuilder::new(ModelVersion::parse("linear-11-2"), width)
            .dense(1, weights, Some(vec![100.0]))
            .to_bytes()
            .unwrap();
        VpuCostModel::from_bytes(&bytes).unwrap()
    }

    fn conv() -> DpuWorkload {
        DpuWorkload::new(
            VpuDevice::Vpu27,
            Operation::Convolution,
            VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
            VpuTensor::new([16, 16, 64, 1], DataType::Uint8),
            ExecutionMode::Cuboid16x16,
        )
        .with_kernel([3, 3], [1, 1], [1, 1, 1, 1])
    }

    #[test]
    fn test_theoretical_fallback() {
        let model = VpuCostModel::new();
        assert!(!model.nn_initialized());
        let cycles = model.dpu(&conv());
        assert!(cycles > 0 && !is_error_code(cycles));
        assert_eq!(cycles, model.dpu_theoretical(&conv()));
    }

    #[test]
    fn test_unsupported_device_code() {
        let model = VpuCostModel::new();
        let mut wl = conv();
        wl.device = VpuDevice::Vpu20;
        let (code, info) = model.dpu_msg(&wl);
        assert_eq!(code, ERROR_INVALID_INPUT_DEVICE);
        assert!(!info.is_empty());
    }

    #[test]
    fn test_fallback_disabled() {
        let config = CostModelConfig { use_theoretical_fallback: false, ..Default::default() };
        let model = VpuCostModel::with_config(config).unwrap();
        let (cycles, info) = model.dpu_msg(&conv());
        assert_eq!(cycles, 0);
        assert!(info.contains("fallback disabled"), "{}", info);
    }

    #[test]
    fn test_context_pool_is_bounded() {
        let model = linear();
        assert!(model.nn_initialized());
        let expected = model.dpu(&conv());
        assert_eq!(model.pooled_contexts(), 1);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..MAX_POOLED_CONTEXTS * 2).map(|_| s.spawn(|| model.dpu(&conv()))).collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
        assert!(model.pooled_contexts() <= MAX_POOLED_CONTEXTS);
        assert!(model.pooled_contexts() >= 1);
    }

    #[test]
    fn test_caller_context_skips_pool() {
        let model = linear();
        let workloads = vec![conv(), conv().with_act_sparsity(0.5), conv()];
        let mut ctx = model.new_context();
        assert_eq!(model.dpu_batch_with(&mut ctx, &workloads), model.dpu_batch(&workloads));
        // the pooled call above made exactly one context
        assert_eq!(model.pooled_contexts(), 1);
    }

    #[test]
    fn test_small_buffer_means_no_model() {
        let model = VpuCostModel::from_bytes(&[0u8; 4]).unwrap();
        assert!(!model.nn_initialized());
    }
}
