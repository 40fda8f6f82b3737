//! Tripo3D image-to-model provider.
//!
//! One generation runs four stages in order: upload the image, create an
//! `image_to_model` task for the returned token, poll the task until it is
//! terminal, then download the selected model file.

use crate::config::{ClientConfig, API_KEY_ENV, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
use crate::error::{parse_retry_after, sanitize_error_message, MeshGenError, Result};
use crate::model::provider::ModelProvider;
use crate::model::scope::JobScope;
use crate::model::types::{
    AssetReference, CompletedJob, GeneratedModel, ImageFormat, JobHandle, JobOutput, JobSnapshot,
    JobStatus, ModelFormat, ModelGenerationRequest, ModelMetadata, ModelProviderKind,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

const TASK_TYPE: &str = "image_to_model";
const HEALTH_CHECK_TASK: &str = "meshgen-health-check";

/// Pipeline stage, used to attribute HTTP failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Upload,
    Submit,
    Status,
    Download,
}

impl Stage {
    fn error(self, status: u16, message: String) -> MeshGenError {
        match self {
            Self::Upload => MeshGenError::Upload { status, message },
            Self::Submit => MeshGenError::Submission { status, message },
            Self::Status => MeshGenError::StatusQuery { status, message },
            Self::Download => MeshGenError::Download { status, message },
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Submit => "task creation",
            Self::Status => "task status",
            Self::Download => "download",
        }
    }
}

/// Builder for [`TripoProvider`].
#[derive(Debug, Clone)]
pub struct TripoProviderBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for TripoProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TripoProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every setting from an existing config.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.api_key = Some(config.api_key);
        self.base_url = Some(config.base_url);
        self.poll_interval = config.poll_interval;
        self.timeout = config.timeout;
        self
    }

    /// Sets the API key. Falls back to `TRIPO_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API root (e.g. a staging host or a local mock).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the wait between status queries.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum time one generation may take.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<TripoProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| {
                MeshGenError::Auth(format!("{API_KEY_ENV} not set and no API key provided"))
            })?;

        let mut config = ClientConfig::new(api_key);
        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        config.poll_interval = self.poll_interval;
        config.timeout = self.timeout;

        TripoProvider::from_config(config)
    }
}

/// Tripo3D image-to-model provider.
pub struct TripoProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for TripoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripoProvider")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TripoProvider {
    /// Creates a new [`TripoProviderBuilder`].
    pub fn builder() -> TripoProviderBuilder {
        TripoProviderBuilder::new()
    }

    /// Creates a provider from a validated config.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.normalized_base_url().to_string(),
            api_key: config.api_key,
            poll_interval: config.poll_interval,
            timeout: config.timeout,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn parse_error(
        &self,
        stage: Stage,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> MeshGenError {
        let mut message = match serde_json::from_str::<TripoErrorResponse>(text) {
            Ok(resp) => match resp.suggestion {
                Some(hint) => format!("{} (code {}): {}", resp.message, resp.code, hint),
                None => format!("{} (code {})", resp.message, resp.code),
            },
            Err(_) => text.to_string(),
        };

        if status == 429 {
            if let Some(secs) = parse_retry_after(headers) {
                message = format!("{message} (retry after {secs}s)");
            }
        }

        stage.error(status, sanitize_error_message(&message))
    }

    /// Reads the body and strictly decodes the `{code, message, data}` envelope.
    async fn read_envelope<T: DeserializeOwned>(
        &self,
        stage: Stage,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(self.parse_error(stage, status.as_u16(), &text, &headers));
        }

        let envelope: TripoEnvelope<serde_json::Value> =
            serde_json::from_str(&text).map_err(|e| {
                MeshGenError::MalformedResponse(format!("{} response: {e}", stage.as_str()))
            })?;

        if envelope.code != 0 {
            let message = envelope
                .message
                .map(|m| sanitize_error_message(&m))
                .unwrap_or_else(|| "no message".into());
            return Err(stage.error(
                status.as_u16(),
                format!("{} (code {})", message, envelope.code),
            ));
        }

        let data = envelope.data.ok_or_else(|| {
            MeshGenError::MalformedResponse(format!("{} response has no data", stage.as_str()))
        })?;

        serde_json::from_value(data).map_err(|e| {
            MeshGenError::MalformedResponse(format!("{} response data: {e}", stage.as_str()))
        })
    }

    /// Uploads a local image and returns its token and detected format.
    pub async fn upload(&self, path: &Path) -> Result<(AssetReference, ImageFormat)> {
        let format = ImageFormat::from_path(path);
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("image.{}", format.extension()));

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(format.mime_type())
            .map_err(|e| MeshGenError::InvalidRequest(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("Authorization", self.auth_header())
            .multipart(form)
            .send()
            .await?;

        let data: TripoUploadData = self.read_envelope(Stage::Upload, response).await?;
        if data.image_token.trim().is_empty() {
            return Err(MeshGenError::MalformedResponse(
                "upload response has an empty image_token".into(),
            ));
        }

        Ok((AssetReference::new(data.image_token), format))
    }

    /// Creates an image-to-model task for an uploaded asset.
    pub async fn submit(&self, asset: &AssetReference, format: ImageFormat) -> Result<JobHandle> {
        if asset.as_str().is_empty() {
            return Err(MeshGenError::InvalidRequest("empty asset reference".into()));
        }

        let body = TripoTaskRequest {
            task_type: TASK_TYPE,
            file: TripoFileRef {
                file_type: format.file_type(),
                file_token: asset.as_str(),
            },
        };

        let response = self
            .client
            .post(format!("{}/task", self.base_url))
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let data: TripoTaskData = self.read_envelope(Stage::Submit, response).await?;
        if data.task_id.trim().is_empty() {
            return Err(MeshGenError::MalformedResponse(
                "task creation response has an empty task_id".into(),
            ));
        }

        Ok(JobHandle::new(data.task_id))
    }

    /// Queries a task's status once.
    pub async fn status(&self, handle: &JobHandle) -> Result<JobSnapshot> {
        let response = self
            .client
            .get(format!("{}/task/{}", self.base_url, handle))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        let data: TripoStatusData = self.read_envelope(Stage::Status, response).await?;

        Ok(JobSnapshot {
            handle: handle.clone(),
            status: JobStatus::parse(&data.status),
            raw_status: data.status,
            progress: data.progress,
            output: data.output,
        })
    }

    /// Polls until the task is terminal and returns the artifact to download.
    pub async fn poll_until_ready(
        &self,
        handle: &JobHandle,
        scope: &JobScope,
    ) -> Result<CompletedJob> {
        let mut poll_count = 0u32;

        loop {
            let snapshot = scope.run(self.status(handle)).await?;
            poll_count += 1;

            match snapshot.status {
                JobStatus::Success => {
                    let output = snapshot.output.unwrap_or_default();
                    let (output_kind, url) = output.select().ok_or_else(|| {
                        MeshGenError::MissingArtifact {
                            task_id: handle.to_string(),
                            output: describe_output(&output),
                        }
                    })?;
                    return Ok(CompletedJob {
                        output_kind,
                        url: url.to_string(),
                        poll_count,
                    });
                }
                JobStatus::Queued | JobStatus::Running => {
                    tracing::debug!(
                        task_id = %handle,
                        status = %snapshot.status,
                        progress = snapshot.progress,
                        elapsed_secs = scope.elapsed().as_secs(),
                        "polling Tripo task"
                    );
                    scope.wait(self.poll_interval).await?;
                }
                JobStatus::Failed | JobStatus::Cancelled | JobStatus::Unknown => {
                    return Err(MeshGenError::JobFailed {
                        task_id: handle.to_string(),
                        status: snapshot.status,
                        raw_status: snapshot.raw_status,
                    });
                }
            }
        }
    }

    /// Downloads a finished artifact.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(Stage::Download, status.as_u16(), &text, &headers));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn describe_output(output: &JobOutput) -> String {
    serde_json::to_string(output).unwrap_or_else(|_| "<unprintable>".into())
}

#[async_trait]
impl ModelProvider for TripoProvider {
    async fn generate(&self, request: &ModelGenerationRequest) -> Result<GeneratedModel> {
        let start = Instant::now();
        let scope = JobScope::new(
            request.timeout.unwrap_or(self.timeout),
            request.cancel.clone(),
        );

        let (asset, format) = scope.run(self.upload(&request.image_path)).await?;
        tracing::debug!(format = format.mime_type(), "uploaded source image to Tripo");

        let handle = scope.run(self.submit(&asset, format)).await?;
        tracing::debug!(task_id = %handle, "submitted Tripo image-to-model task");

        let completed = self.poll_until_ready(&handle, &scope).await?;
        tracing::debug!(
            task_id = %handle,
            output = %completed.output_kind,
            polls = completed.poll_count,
            "Tripo task complete"
        );

        let data = scope.run(self.download(&completed.url)).await?;

        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(GeneratedModel::new(
            data,
            ModelFormat::from_url(&completed.url),
            ModelProviderKind::Tripo,
            ModelMetadata {
                task_id: Some(handle.to_string()),
                output_kind: Some(completed.output_kind),
                source_url: Some(completed.url),
                poll_count: completed.poll_count,
                duration_ms: Some(duration_ms),
            },
        ))
    }

    fn kind(&self) -> ModelProviderKind {
        ModelProviderKind::Tripo
    }

    /// Sends one authenticated status query for a placeholder task.
    ///
    /// Any answer short of 401/403 means the endpoint is reachable and the
    /// key was accepted, including a 404 or an error envelope for the
    /// unknown task.
    async fn health_check(&self) -> Result<()> {
        match self.status(&JobHandle::new(HEALTH_CHECK_TASK)).await {
            Ok(_) => Ok(()),
            Err(MeshGenError::StatusQuery { status, message }) => match status {
                401 | 403 => Err(MeshGenError::Auth(message)),
                404 => Ok(()),
                s if (200..300).contains(&s) => Ok(()),
                _ => Err(MeshGenError::StatusQuery { status, message }),
            },
            Err(e) => Err(e),
        }
    }
}

// Request types

#[derive(Debug, Serialize)]
struct TripoTaskRequest<'a> {
    #[serde(rename = "type")]
    task_type: &'a str,
    file: TripoFileRef<'a>,
}

#[derive(Debug, Serialize)]
struct TripoFileRef<'a> {
    #[serde(rename = "type")]
    file_type: &'a str,
    file_token: &'a str,
}

// Response types

#[derive(Debug, Deserialize)]
struct TripoEnvelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TripoUploadData {
    image_token: String,
}

#[derive(Debug, Deserialize)]
struct TripoTaskData {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TripoStatusData {
    status: String,
    #[serde(default)]
    progress: Option<u32>,
    #[serde(default)]
    output: Option<JobOutput>,
}

#[derive(Debug, Deserialize)]
struct TripoErrorResponse {
    code: i64,
    message: String,
    #[serde(default)]
    suggestion: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TripoProvider {
        TripoProviderBuilder::new()
            .api_key("tsk_test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = TripoProviderBuilder::new()
            .api_key("tsk_test")
            .base_url("http://localhost:9000/v2/openapi/")
            .poll_interval(Duration::from_millis(250))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        assert_eq!(provider.base_url, "http://localhost:9000/v2/openapi");
        assert_eq!(provider.poll_interval, Duration::from_millis(250));
        assert_eq!(provider.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_defaults() {
        let provider = provider();
        assert_eq!(provider.base_url, crate::config::DEFAULT_BASE_URL);
        assert_eq!(provider.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_from_config() {
        let mut config = ClientConfig::new("tsk_cfg");
        config.poll_interval = Duration::from_secs(1);
        let provider = TripoProviderBuilder::new().config(config).build().unwrap();
        assert_eq!(provider.api_key, "tsk_cfg");
        assert_eq!(provider.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_builder_rejects_invalid_timing() {
        let result = TripoProviderBuilder::new()
            .api_key("tsk_test")
            .poll_interval(Duration::from_secs(10))
            .timeout(Duration::from_secs(1))
            .build();
        assert!(matches!(result, Err(MeshGenError::Config(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", provider());
        assert!(!debug.contains("tsk_test"));
    }

    #[test]
    fn test_task_request_serialization() {
        let req = TripoTaskRequest {
            task_type: TASK_TYPE,
            file: TripoFileRef {
                file_type: "jpg",
                file_token: "tok-1",
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "image_to_model",
                "file": {"type": "jpg", "file_token": "tok-1"}
            })
        );
    }

    #[test]
    fn test_upload_envelope_deserialization() {
        let json = r#"{"code": 0, "data": {"image_token": "tok-1"}}"#;
        let resp: TripoEnvelope<TripoUploadData> = serde_json::from_str(json).unwrap();
        assert_eq!(resp.code, 0);
        assert_eq!(resp.data.unwrap().image_token, "tok-1");
    }

    #[test]
    fn test_upload_envelope_missing_token_is_error() {
        let json = r#"{"code": 0, "data": {"fileName": "api/abc.png"}}"#;
        assert!(serde_json::from_str::<TripoEnvelope<TripoUploadData>>(json).is_err());
    }

    #[test]
    fn test_status_deserialization() {
        let json = r#"{
            "code": 0,
            "data": {
                "task_id": "job-1",
                "type": "image_to_model",
                "status": "success",
                "progress": 100,
                "output": {
                    "model": "https://example.com/m.glb",
                    "rendered_image": "https://example.com/r.webp"
                }
            }
        }"#;
        let resp: TripoEnvelope<TripoStatusData> = serde_json::from_str(json).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.status, "success");
        assert_eq!(data.progress, Some(100));
        let output = data.output.unwrap();
        assert_eq!(output.model.as_deref(), Some("https://example.com/m.glb"));
    }

    #[test]
    fn test_status_running_without_output() {
        let json =
            r#"{"code": 0, "data": {"task_id": "job-1", "status": "running", "progress": 40}}"#;
        let resp: TripoEnvelope<TripoStatusData> = serde_json::from_str(json).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(JobStatus::parse(&data.status), JobStatus::Running);
        assert!(data.output.is_none());
    }

    #[test]
    fn test_parse_error_unauthorized_stays_stage_error() {
        let headers = reqwest::header::HeaderMap::new();
        let body = r#"{"code": 1002, "message": "Authentication failed"}"#;

        let err = provider().parse_error(Stage::Upload, 401, body, &headers);
        match err {
            MeshGenError::Upload { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Authentication failed (code 1002)");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = provider().parse_error(Stage::Submit, 403, body, &headers);
        assert!(matches!(err, MeshGenError::Submission { status: 403, .. }));
    }

    #[test]
    fn test_parse_error_download_401_is_download_error() {
        let err = provider().parse_error(
            Stage::Download,
            403,
            "AccessDenied",
            &reqwest::header::HeaderMap::new(),
        );
        assert!(matches!(err, MeshGenError::Download { status: 403, .. }));
    }

    #[test]
    fn test_parse_error_rate_limited_keeps_stage() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        let err = provider().parse_error(Stage::Status, 429, "slow down", &headers);
        match &err {
            MeshGenError::StatusQuery { status, message } => {
                assert_eq!(*status, 429);
                assert_eq!(message, "slow down (retry after 12s)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_rate_limited());

        let err = provider().parse_error(
            Stage::Download,
            429,
            "SlowDown",
            &reqwest::header::HeaderMap::new(),
        );
        assert!(matches!(err, MeshGenError::Download { status: 429, .. }));
    }

    #[test]
    fn test_parse_error_decodes_before_truncating() {
        let hint = "h".repeat(800);
        let body = format!(
            r#"{{"code": 2002, "message": "Invalid file token", "suggestion": "{hint}"}}"#
        );
        let err = provider().parse_error(
            Stage::Submit,
            400,
            &body,
            &reqwest::header::HeaderMap::new(),
        );
        match err {
            MeshGenError::Submission { message, .. } => {
                assert!(message.starts_with("Invalid file token (code 2002): hhh"));
                assert!(message.ends_with("..."));
                assert!(!message.contains('{'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_redacts_key_in_json_body() {
        let err = provider().parse_error(
            Stage::Upload,
            400,
            r#"{"error":"bad key","key":"tsk_live_abc123"}"#,
            &reqwest::header::HeaderMap::new(),
        );
        let message = err.to_string();
        assert!(!message.contains("tsk_live_abc123"));
        assert!(message.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_error_stage_mapping() {
        let headers = reqwest::header::HeaderMap::new();
        let p = provider();

        let err = p.parse_error(
            Stage::Submit,
            400,
            r#"{"code": 2002, "message": "Invalid file token", "suggestion": "Upload again"}"#,
            &headers,
        );
        match err {
            MeshGenError::Submission { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid file token (code 2002): Upload again");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = p.parse_error(Stage::Upload, 500, "internal", &headers);
        assert!(matches!(err, MeshGenError::Upload { status: 500, .. }));

        let err = p.parse_error(Stage::Status, 502, "bad gateway", &headers);
        assert!(matches!(err, MeshGenError::StatusQuery { status: 502, .. }));
    }

    #[test]
    fn test_describe_output() {
        let output: JobOutput = serde_json::from_str(r#"{"rendered_image": "R"}"#).unwrap();
        assert_eq!(describe_output(&output), r#"{"rendered_image":"R"}"#);
    }
}
