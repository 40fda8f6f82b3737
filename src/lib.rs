#![warn(missing_docs)]
//! MeshGen - turn images into 3D models through a remote generation API.
//!
//! A generation uploads a local image, creates an asynchronous job for it,
//! polls the job until it finishes and downloads the resulting model.
//!
//! # Quick Start
//!
//! ```no_run
//! use meshgen::{ModelGenerationRequest, ModelProvider, TripoProvider};
//!
//! #[tokio::main]
//! async fn main() -> meshgen::Result<()> {
//!     let provider = TripoProvider::builder().build()?;
//!     let request = ModelGenerationRequest::new("chair.jpg");
//!     let model = provider.generate(&request).await?;
//!     model.save("chair.glb")?;
//!     Ok(())
//! }
//! ```
//!
//! # Bounded waiting
//!
//! Every request has a deadline (`timeout`, 10 minutes by default) and
//! may carry a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! either one stops polling with [`MeshGenError::Timeout`] or
//! [`MeshGenError::Cancelled`].
//!
//! # Features
//!
//! - `tripo`: Tripo3D image-to-model provider
//! - `model`: All model providers
//! - `cli`: Command-line interface

pub mod config;
mod error;
pub mod model;

// Re-export error types at crate root
pub use error::{MeshGenError, Result};

pub use config::ClientConfig;

pub use model::{
    AssetReference, CompletedJob, GeneratedModel, ImageFormat, JobHandle, JobOutput, JobScope,
    JobSnapshot, JobStatus, ModelFormat, ModelGenerationRequest, ModelMetadata, ModelProvider,
    ModelProviderExt, ModelProviderKind, OutputKind,
};

#[cfg(feature = "tripo")]
pub use model::providers::{TripoProvider, TripoProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::ClientConfig;
    pub use crate::error::{MeshGenError, Result};
    pub use crate::model::{
        GeneratedModel, ModelGenerationRequest, ModelProvider, ModelProviderExt,
    };

    #[cfg(feature = "tripo")]
    pub use crate::model::providers::TripoProvider;
}
