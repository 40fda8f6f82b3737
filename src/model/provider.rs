//! Model provider trait and utilities.

use crate::error::Result;
use crate::model::types::{GeneratedModel, ModelGenerationRequest, ModelProviderKind};
use async_trait::async_trait;
use std::path::Path;

/// Trait for image-to-3D generation providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Uploads the source image, runs the remote job and downloads the result.
    async fn generate(&self, request: &ModelGenerationRequest) -> Result<GeneratedModel>;

    /// Returns the kind of this provider.
    fn kind(&self) -> ModelProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        match self.kind() {
            ModelProviderKind::Tripo => "Tripo3D",
        }
    }

    /// Checks that the provider is reachable and accepts the configured key.
    async fn health_check(&self) -> Result<()>;
}

/// Extension trait for writing generated models to disk.
#[async_trait]
pub trait ModelProviderExt: ModelProvider {
    /// Generates a model and writes it to `path`, replacing any existing file.
    async fn generate_to_file(
        &self,
        request: &ModelGenerationRequest,
        path: &Path,
    ) -> Result<GeneratedModel> {
        let model = self.generate(request).await?;
        model.save(path)?;
        Ok(model)
    }
}

impl<T: ModelProvider> ModelProviderExt for T {}
