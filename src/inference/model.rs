//! Trained cost models stored as safetensors blobs.
//!
//! Metadata keys: `name` (`NAME-VI-VO`), `layers` (JSON list of [`LayerSpec`]) and
//! `input_size`. Layer `i` reads its tensors from `layer.{i}.weight`, `layer.{i}.bias`
//! and `layer.{i}.target`, stored as F32 or F16.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use half::f16;
use memmap2::Mmap;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::core::error::VpuError;
use crate::inference::layers::{Dense, Knn, Layer, LayerSpec};
use crate::inference::version::ModelVersion;

/// Buffers shorter than this cannot hold a safetensors header and mean "no model".
pub const MIN_MODEL_BYTES: usize = 8;

pub const META_NAME: &str = "name";
pub const META_LAYERS: &str = "layers";
pub const META_INPUT_SIZE: &str = "input_size";

enum ModelSource {
    Mapped(Mmap),
    Owned(Vec<u8>),
    Static(&'static [u8]),
}

impl ModelSource {
    fn bytes(&self) -> &[u8] {
        match self {
            ModelSource::Mapped(m) => &m[..],
            ModelSource::Owned(v) => v.as_slice(),
            ModelSource::Static(s) => s,
        }
    }
}

/// Immutable network. A model that failed to load is kept as a non-initialized value.
pub struct InferenceModel {
    version: ModelVersion,
    input_size: usize,
    layers: Vec<Layer>,
    source: Option<ModelSource>,
}

impl std::fmt::Debug for InferenceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceModel")
            .field("version", &self.version)
            .field("input_size", &self.input_size)
            .field("layers", &self.layers.len())
            .field("blob_len", &self.blob_len())
            .finish()
    }
}

impl Default for InferenceModel {
    fn default() -> Self {
        Self::empty()
    }
}

impl InferenceModel {
    pub fn empty() -> Self {
        Self { version: ModelVersion::default(), input_size: 0, layers: Vec::new(), source: None }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mapped = File::open(path).and_then(|file| {
            // SAFETY: the file is opened read-only and the mapping is never written.
            unsafe { Mmap::map(&file) }
        });
        match mapped {
            Ok(map) => Self::load(ModelSource::Mapped(map), &path.display().to_string()),
            Err(e) => {
                log::warn!("Cannot open model {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    /// Copies `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::load(ModelSource::Owned(bytes.to_vec()), "<buffer>")
    }

    /// Adopts a buffer that outlives the model without copying it.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self::load(ModelSource::Static(bytes), "<static>")
    }

    fn load(source: ModelSource, origin: &str) -> Self {
        let bytes = source.bytes();
        if bytes.len() < MIN_MODEL_BYTES {
            log::warn!("Model {} is {} bytes, running without NN", origin, bytes.len());
            return Self::empty();
        }
        match parse(bytes) {
            Ok((version, input_size, layers)) => {
                log::info!("Loaded model {} from {} ({} layers)", version, origin, layers.len());
                Self { version, input_size, layers, source: Some(source) }
            }
            Err(e) => {
                log::warn!("Model {} is unusable: {}", origin, e);
                Self::empty()
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.layers.is_empty()
    }

    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.layers.iter().fold(self.input_size, |w, l| l.output_width(w))
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Widest activation any layer reads or writes.
    pub fn max_width(&self) -> usize {
        let mut width = self.input_size;
        let mut max = width;
        for layer in &self.layers {
            width = layer.output_width(width);
            max = max.max(width);
        }
        max
    }

    pub fn blob_len(&self) -> usize {
        self.source.as_ref().map_or(0, |s| s.bytes().len())
    }
}

fn metadata_value<'a>(meta: &'a HashMap<String, String>, key: &str) -> Result<&'a str, VpuError> {
    meta.get(key)
        .map(String::as_str)
        .ok_or_else(|| VpuError::Model(format!("metadata key '{}' missing", key)))
}

fn parse(bytes: &[u8]) -> Result<(ModelVersion, usize, Vec<Layer>), VpuError> {
    let (_, header) = SafeTensors::read_metadata(bytes)?;
    let meta = header.metadata().clone().unwrap_or_default();

    let version = meta.get(META_NAME).map(|n| ModelVersion::parse(n)).unwrap_or_default();
    let specs: Vec<LayerSpec> = serde_json::from_str(metadata_value(&meta, META_LAYERS)?)?;
    let input_size: usize = metadata_value(&meta, META_INPUT_SIZE)?
        .trim()
        .parse()
        .map_err(|e| VpuError::Model(format!("input_size: {}", e)))?;
    if specs.is_empty() || input_size == 0 {
        return Err(VpuError::Model("model has no layers".to_string()));
    }

    let tensors = SafeTensors::deserialize(bytes)?;
    let mut width = input_size;
    let mut layers = Vec::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        let layer = match spec {
            LayerSpec::Relu => Layer::Relu,
            LayerSpec::Sigmoid => Layer::Sigmoid,
            LayerSpec::L2Norm => Layer::L2Norm,
            LayerSpec::Dense => {
                let (shape, weight) = read_tensor(&tensors, &format!("layer.{}.weight", i))?;
                let out = matrix_columns(&shape, width, i)?;
                let bias_name = format!("layer.{}.bias", i);
                let bias =
                    if has_tensor(&tensors, &bias_name) { Some(read_tensor(&tensors, &bias_name)?.1) } else { None };
                Layer::Dense(Dense::new(width, out, weight, bias)?)
            }
            LayerSpec::Knn { n_neighbors } => {
                let (shape, weight) = read_tensor(&tensors, &format!("layer.{}.weight", i))?;
                let n_points = matrix_columns(&shape, width, i)?;
                let (_, target) = read_tensor(&tensors, &format!("layer.{}.target", i))?;
                Layer::Knn(Knn::new(width, n_points, *n_neighbors, weight, target)?)
            }
        };
        width = layer.output_width(width);
        layers.push(layer);
    }
    Ok((version, input_size, layers))
}

fn matrix_columns(shape: &[usize], rows: usize, layer: usize) -> Result<usize, VpuError> {
    match shape {
        [r, c] if *r == rows => Ok(*c),
        _ => Err(VpuError::Model(format!("layer {} weight shape {:?} does not take {} inputs", layer, shape, rows))),
    }
}

fn has_tensor(tensors: &SafeTensors<'_>, name: &str) -> bool {
    tensors.names().iter().any(|n| n.as_str() == name)
}

fn read_tensor(tensors: &SafeTensors<'_>, name: &str) -> Result<(Vec<usize>, Vec<f32>), VpuError> {
    let view = tensors.tensor(name)?;
    let data = view.data();
    let values = match view.dtype() {
        Dtype::F32 => data.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        Dtype::F16 => data.chunks_exact(2).map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32()).collect(),
        other => return Err(VpuError::Model(format!("tensor {} has unsupported dtype {:?}", name, other))),
    };
    Ok((view.shape().to_vec(), values))
}

struct PendingTensor {
    name: String,
    shape: Vec<usize>,
    values: Vec<f32>,
}

/// Writes models in the format [`InferenceModel`] reads.
#[derive(Default)]
pub struct ModelBuilder {
    version: ModelVersion,
    input_size: usize,
    width: usize,
    half: bool,
    specs: Vec<LayerSpec>,
    tensors: Vec<PendingTensor>,
}

impl ModelBuilder {
    pub fn new(version: ModelVersion, input_size: usize) -> Self {
        Self { version, input_size, width: input_size, ..Self::default() }
    }

    /// Store tensors as F16.
    pub fn half_precision(mut self, half: bool) -> Self {
        self.half = half;
        self
    }

    fn push_tensor(&mut self, suffix: &str, shape: Vec<usize>, values: Vec<f32>) {
        let name = format!("layer.{}.{}", self.specs.len(), suffix);
        self.tensors.push(PendingTensor { name, shape, values });
    }

    /// `weight` is `[current width][out_features]`, row-major.
    pub fn dense(mut self, out_features: usize, weight: Vec<f32>, bias: Option<Vec<f32>>) -> Self {
        self.push_tensor("weight", vec![self.width, out_features], weight);
        if let Some(b) = bias {
            self.push_tensor("bias", vec![out_features], b);
        }
        self.specs.push(LayerSpec::Dense);
        self.width = out_features;
        self
    }

    pub fn relu(mut self) -> Self {
        self.specs.push(LayerSpec::Relu);
        self
    }

    pub fn sigmoid(mut self) -> Self {
        self.specs.push(LayerSpec::Sigmoid);
        self
    }

    pub fn l2_norm(mut self) -> Self {
        self.specs.push(LayerSpec::L2Norm);
        self
    }

    /// `points` is `[current width][targets.len()]`, row-major.
    pub fn knn(mut self, n_neighbors: usize, points: Vec<f32>, targets: Vec<f32>) -> Self {
        let n = targets.len();
        self.push_tensor("weight", vec![self.width, n], points);
        self.push_tensor("target", vec![n], targets);
        self.specs.push(LayerSpec::Knn { n_neighbors });
        self.width = 1;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VpuError> {
        let dtype = if self.half { Dtype::F16 } else { Dtype::F32 };
        let raw: Vec<Vec<u8>> = self
            .tensors
            .iter()
            .map(|t| {
                if self.half {
                    let halves: Vec<f16> = t.values.iter().map(|&v| f16::from_f32(v)).collect();
                    bytemuck::cast_slice::<f16, u8>(&halves).to_vec()
                } else {
                    bytemuck::cast_slice::<f32, u8>(&t.values).to_vec()
                }
            })
            .collect();

        let mut views = Vec::with_capacity(self.tensors.len());
        for (t, data) in self.tensors.iter().zip(&raw) {
            views.push((t.name.clone(), TensorView::new(dtype, t.shape.clone(), data)?));
        }

        let mut meta = HashMap::new();
        meta.insert(META_NAME.to_string(), self.version.to_string());
        meta.insert(META_LAYERS.to_string(), serde_json::to_string(&self.specs)?);
        meta.insert(META_INPUT_SIZE.to_string(), self.input_size.to_string());

        safetensors::serialize(views, &Some(meta)).map_err(|e| VpuError::Serialize(e.to_string()))
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), VpuError> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> ModelBuilder {
        ModelBuilder::new(ModelVersion::parse("tiny-10-2"), 3)
            .dense(2, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], Some(vec![0.0, 1.0]))
            .relu()
            .dense(1, vec![1.0, 1.0], None)
    }

    #[test]
    fn test_builder_round_trip() {
        let model = InferenceModel::from_bytes(&tiny().to_bytes().unwrap());
        assert!(model.is_initialized());
        assert_eq!(model.version().to_string(), "tiny-10-2");
        assert_eq!(model.input_size(), 3);
        assert_eq!(model.output_size(), 1);
        assert_eq!(model.max_width(), 3);
        assert_eq!(model.layers().len(), 3);
    }

    #[test]
    fn test_half_precision_tensors() {
        let bytes = tiny().half_precision(true).to_bytes().unwrap();
        let model = InferenceModel::from_bytes(&bytes);
        assert!(model.is_initialized());
        assert_eq!(model.layers()[0], tiny_dense());
    }

    fn tiny_dense() -> Layer {
        Layer::Dense(Dense::new(3, 2, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], Some(vec![0.0, 1.0])).unwrap())
    }

    #[test]
    fn test_garbage_is_not_initialized() {
        assert!(!InferenceModel::from_bytes(&[]).is_initialized());
        assert!(!InferenceModel::from_bytes(&[1, 2, 3]).is_initialized());
        assert!(!InferenceModel::from_bytes(&[0xff; 64]).is_initialized());
        assert!(!InferenceModel::from_file("/nonexistent/model.safetensors").is_initialized());
    }

    #[test]
    fn test_inconsistent_shapes_rejected() {
        let bad = ModelBuilder::new(ModelVersion::default(), 4).dense(2, vec![0.0; 6], None);
        match bad.to_bytes() {
            Ok(bytes) => assert!(!InferenceModel::from_bytes(&bytes).is_initialized()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_from_file_maps_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.safetensors");
        tiny().write_file(&path).unwrap();
        let model = InferenceModel::from_file(&path);
        assert!(model.is_initialized());
        assert_eq!(model.blob_len() as u64, std::fs::metadata(&path).unwrap().len());
    }
}
