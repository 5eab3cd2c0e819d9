/// Per-caller scratch for one [`crate::inference::runtime::Runtime`].
///
/// A context holds `batch` rows of the widest activation twice (ping/pong) plus the
/// collected outputs. It is never shared between threads.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    batch: usize,
    width: usize,
    pub(crate) ping: Vec<f32>,
    pub(crate) pong: Vec<f32>,
    pub(crate) output: Vec<f32>,
}

impl ExecutionContext {
    pub fn new(batch: usize, width: usize) -> Self {
        let batch = batch.max(1);
        Self {
            batch,
            width,
            ping: vec![0.0; batch * width],
            pong: vec![0.0; batch * width],
            output: Vec::with_capacity(batch),
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Grows the scratch buffers for a wider network. Never shrinks.
    pub(crate) fn ensure_width(&mut self, width: usize) {
        if width > self.width {
            self.width = width;
            self.ping.resize(self.batch * width, 0.0);
            self.pong.resize(self.batch * width, 0.0);
        }
    }
}
