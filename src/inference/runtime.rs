use std::sync::Arc;

use crate::inference::context::ExecutionContext;
use crate::inference::model::InferenceModel;
use crate::inference::version::ModelVersion;

/// Shared, immutable executor for one model. Callers bring their own [`ExecutionContext`].
#[derive(Debug, Clone)]
pub struct Runtime {
    model: Arc<InferenceModel>,
    batch: usize,
}

impl Runtime {
    pub fn new(model: Arc<InferenceModel>, batch: usize) -> Self {
        Self { model, batch: batch.max(1) }
    }

    pub fn model(&self) -> &Arc<InferenceModel> {
        &self.model
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_initialized()
    }

    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.model.output_size()
    }

    pub fn model_version(&self) -> &ModelVersion {
        self.model.version()
    }

    /// Batch width of contexts made by [`Self::default_context`].
    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn create_context(&self, batch: usize) -> ExecutionContext {
        ExecutionContext::new(batch, self.model.max_width())
    }

    pub fn default_context(&self) -> ExecutionContext {
        self.create_context(self.batch)
    }

    /// Runs every complete row of `inputs` and returns `rows · output_size` values.
    ///
    /// Inputs longer than the context batch are processed in context-sized slices; a short
    /// last slice is run with only its own rows, so results never depend on the batch width.
    pub fn predict<'c>(&self, ctx: &'c mut ExecutionContext, inputs: &[f32]) -> &'c [f32] {
        ctx.output.clear();
        let in_size = self.model.input_size();
        if !self.model.is_initialized() || in_size == 0 {
            return &ctx.output;
        }
        debug_assert_eq!(inputs.len() % in_size, 0, "input is not a whole number of rows");
        ctx.ensure_width(self.model.max_width());

        let rows_total = inputs.len() / in_size;
        let out_size = self.model.output_size();
        ctx.output.reserve(rows_total * out_size);

        for chunk in inputs[..rows_total * in_size].chunks(ctx.batch() * in_size) {
            let rows = chunk.len() / in_size;
            ctx.ping[..chunk.len()].copy_from_slice(chunk);
            let mut width = in_size;
            for layer in self.model.layers() {
                let next = layer.output_width(width);
                layer.forward(&ctx.ping[..rows * width], rows, width, &mut ctx.pong[..rows * next]);
                std::mem::swap(&mut ctx.ping, &mut ctx.pong);
                width = next;
            }
            ctx.output.extend_from_slice(&ctx.ping[..rows * width]);
        }
        &ctx.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::ModelBuilder;

    fn runtime() -> Runtime {
        let bytes = ModelBuilder::new(ModelVersion::parse("t-10-2"), 2)
            .dense(3, vec![1.0, -1.0, 0.5, 2.0, 1.0, -0.5], Some(vec![0.1, 0.2, 0.3]))
            .relu()
            .dense(1, vec![1.0, 1.0, 1.0], None)
            .to_bytes()
            .unwrap();
        Runtime::new(Arc::new(InferenceModel::from_bytes(&bytes)), 1)
    }

    #[test]
    fn test_single_row() {
        let rt = runtime();
        let mut ctx = rt.default_context();
        // [1, 1] -> [3.1, 0.2, 0.3] -> 3.6
        let out = rt.predict(&mut ctx, &[1.0, 1.0]);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 3.6).abs() < 1e-5);
    }

    #[test]
    fn test_batch_invariance() {
        let rt = runtime();
        let inputs: Vec<f32> = (0..14).map(|i| (i as f32 * 0.37).sin()).collect();
        let mut single = rt.create_context(1);
        let expected = rt.predict(&mut single, &inputs).to_vec();
        for batch in [2, 3, 4, 16] {
            let mut ctx = rt.create_context(batch);
            assert_eq!(rt.predict(&mut ctx, &inputs), expected.as_slice(), "batch {}", batch);
        }
    }

    #[test]
    fn test_uninitialized_returns_nothing() {
        let rt = Runtime::new(Arc::new(InferenceModel::empty()), 4);
        let mut ctx = rt.default_context();
        assert!(rt.predict(&mut ctx, &[1.0, 2.0]).is_empty());
        assert!(!rt.is_initialized());
    }
}
