//! # NN Inference
//!
//! - **[`schema`] / [`encoder`]:** Fixed-width descriptors of sanitized workloads.
//! - **[`model`]:** safetensors loading and writing.
//! - **[`runtime`] / [`context`]:** Shared executor with per-caller scratch.
//! - **[`version`]:** Model naming and output post-processing.

pub mod context;
pub mod encoder;
pub mod layers;
pub mod model;
pub mod runtime;
pub mod schema;
pub mod version;

pub use context::ExecutionContext;
pub use encoder::Encoder;
pub use model::{InferenceModel, ModelBuilder};
pub use runtime::Runtime;
pub use schema::dpu::InputVersion;
pub use version::{ModelVersion, OutputVersion};
