//! Core types for image-to-3D generation.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Supported source image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG format.
    Jpeg,
    /// PNG format.
    Png,
    /// WebP format. Also used for unrecognized extensions.
    #[default]
    WebP,
}

impl ImageFormat {
    /// Returns the canonical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    /// Returns the `file.type` value sent when creating a job.
    pub fn file_type(&self) -> &'static str {
        self.extension()
    }

    /// Maps a known extension to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects the format from a path's extension, falling back to WebP.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default()
    }
}

/// Formats a generated model can be delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Binary glTF.
    #[default]
    Glb,
    /// JSON glTF.
    Gltf,
    /// Autodesk FBX.
    Fbx,
    /// Wavefront OBJ.
    Obj,
    /// Apple USDZ.
    Usdz,
    /// Stereolithography.
    Stl,
}

impl ModelFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Glb => "glb",
            Self::Gltf => "gltf",
            Self::Fbx => "fbx",
            Self::Obj => "obj",
            Self::Usdz => "usdz",
            Self::Stl => "stl",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Glb => "model/gltf-binary",
            Self::Gltf => "model/gltf+json",
            Self::Fbx => "application/octet-stream",
            Self::Obj => "model/obj",
            Self::Usdz => "model/vnd.usdz+zip",
            Self::Stl => "model/stl",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "glb" => Some(Self::Glb),
            "gltf" => Some(Self::Gltf),
            "fbx" => Some(Self::Fbx),
            "obj" => Some(Self::Obj),
            "usdz" => Some(Self::Usdz),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }

    /// Infers the format from a download URL, ignoring query and fragment.
    /// Defaults to GLB.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .and_then(|(_, ext)| Self::from_extension(ext))
            .unwrap_or_default()
    }
}

/// Model provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProviderKind {
    /// Tripo3D image-to-model API.
    Tripo,
}

impl std::fmt::Display for ModelProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tripo => write!(f, "tripo"),
        }
    }
}

/// Opaque token identifying an uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetReference(String);

impl AssetReference {
    /// Wraps a provider-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a remote asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wraps a provider-issued job id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the job id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a remote job as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a worker.
    Queued,
    /// Being processed.
    Running,
    /// Finished with output.
    Success,
    /// Finished with an error.
    Failed,
    /// Cancelled on the provider side.
    Cancelled,
    /// Reported as unknown, or a status this client does not recognize.
    Unknown,
}

impl JobStatus {
    /// Parses a provider status string. Unrecognized values map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Returns true once no further polling should happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// Returns the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of output a completed job can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Final textured model.
    Model,
    /// Untextured base mesh.
    BaseModel,
    /// PBR-textured model.
    PbrModel,
}

impl OutputKind {
    /// Selection priority, highest first.
    pub const PRIORITY: [OutputKind; 3] = [Self::Model, Self::BaseModel, Self::PbrModel];

    /// Returns the provider field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::BaseModel => "base_model",
            Self::PbrModel => "pbr_model",
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output links of a successful job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Final model URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Base mesh URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    /// PBR model URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbr_model: Option<String>,
    /// Any other fields (rendered previews and the like).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl JobOutput {
    /// Returns the URL for one output kind, if present and non-empty.
    pub fn get(&self, kind: OutputKind) -> Option<&str> {
        let url = match kind {
            OutputKind::Model => self.model.as_deref(),
            OutputKind::BaseModel => self.base_model.as_deref(),
            OutputKind::PbrModel => self.pbr_model.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }

    /// Picks the artifact to download: `model`, then `base_model`, then `pbr_model`.
    pub fn select(&self) -> Option<(OutputKind, &str)> {
        OutputKind::PRIORITY
            .into_iter()
            .find_map(|kind| self.get(kind).map(|url| (kind, url)))
    }
}

/// One status query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    /// Job queried.
    pub handle: JobHandle,
    /// Normalized status.
    pub status: JobStatus,
    /// Status string exactly as the provider sent it.
    pub raw_status: String,
    /// Progress percentage, when reported.
    pub progress: Option<u32>,
    /// Output links, present once the job succeeded.
    pub output: Option<JobOutput>,
}

/// A finished job with its selected artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    /// Which output was chosen.
    pub output_kind: OutputKind,
    /// Download URL of the chosen output.
    pub url: String,
    /// Number of status queries issued.
    pub poll_count: u32,
}

/// A request to turn a local image into a 3D model.
#[derive(Debug, Clone)]
pub struct ModelGenerationRequest {
    /// Source image on local disk.
    pub image_path: PathBuf,
    /// Overall deadline, overriding the provider default.
    pub timeout: Option<Duration>,
    /// Token that aborts the request between network calls and polls.
    pub cancel: Option<CancellationToken>,
}

impl ModelGenerationRequest {
    /// Creates a new request for the given image.
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            timeout: None,
            cancel: None,
        }
    }

    /// Sets the overall deadline for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the detected source image format.
    pub fn image_format(&self) -> ImageFormat {
        ImageFormat::from_path(&self.image_path)
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Remote job id.
    pub task_id: Option<String>,
    /// Output kind that was downloaded.
    pub output_kind: Option<OutputKind>,
    /// URL the artifact was downloaded from.
    pub source_url: Option<String>,
    /// Number of status queries issued.
    pub poll_count: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A generated 3D model with its data and metadata.
#[derive(Debug, Clone)]
#[must_use = "generated model should be saved or processed"]
pub struct GeneratedModel {
    /// Raw model bytes.
    pub data: Vec<u8>,
    /// Model format.
    pub format: ModelFormat,
    /// Provider that generated this model.
    pub provider: ModelProviderKind,
    /// Generation metadata.
    pub metadata: ModelMetadata,
}

impl GeneratedModel {
    /// Creates a new generated model.
    pub fn new(
        data: Vec<u8>,
        format: ModelFormat,
        provider: ModelProviderKind,
        metadata: ModelMetadata,
    ) -> Self {
        Self {
            data,
            format,
            provider,
            metadata,
        }
    }

    /// Returns the size of the model data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the model to `path`, replacing any existing file.
    ///
    /// Bytes go to a temporary file in the same directory first and are
    /// renamed into place only after a complete write, so a failure never
    /// leaves a truncated file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        tracing::debug!(path = %path.display(), bytes = self.data.len(), "saved model");
        Ok(())
    }
}
