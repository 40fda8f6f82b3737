//! Image-to-3D model generation module.

mod provider;
pub mod providers;
mod scope;
mod types;

pub use provider::{ModelProvider, ModelProviderExt};
pub use scope::JobScope;
pub use types::{
    AssetReference, CompletedJob, GeneratedModel, ImageFormat, JobHandle, JobOutput, JobSnapshot,
    JobStatus, ModelFormat, ModelGenerationRequest, ModelMetadata, ModelProviderKind, OutputKind,
};
