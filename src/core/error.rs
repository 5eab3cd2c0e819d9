use thiserror::Error;

/// Construction-time failures. Hardware-feasibility problems never use this type; they
/// travel as [`crate::core::cycles::CostError`].
#[derive(Error, Debug)]
pub enum VpuError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Input interface version {version} is not supported (model '{model}')")]
    UnsupportedInputVersion { version: u32, model: String },
    #[error("Output interface version {version} is not supported (model '{model}')")]
    UnsupportedOutputVersion { version: u32, model: String },
    #[error("Encoder produces {encoder} features but the model expects {model}")]
    InputSizeMismatch { encoder: usize, model: usize },
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Model serialization failed: {0}")]
    Serialize(String),
    #[error("Invalid model: {0}")]
    Model(String),
    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),
}
