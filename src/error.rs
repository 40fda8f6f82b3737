//! Error types for model generation.

use crate::model::JobStatus;
use std::time::Duration;

/// Maximum length of a provider message carried inside an error.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur during model generation.
#[derive(Debug, thiserror::Error)]
pub enum MeshGenError {
    /// API key missing or rejected by the provider.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The asset upload was rejected.
    #[error("upload failed: {status} - {message}")]
    Upload { status: u16, message: String },

    /// The job-creation request was rejected.
    #[error("job submission failed: {status} - {message}")]
    Submission { status: u16, message: String },

    /// A job status query was rejected.
    #[error("status query failed: {status} - {message}")]
    StatusQuery { status: u16, message: String },

    /// The job reached a failure terminal state.
    #[error("job {task_id} ended with status {status} ({raw_status})")]
    JobFailed {
        task_id: String,
        status: JobStatus,
        raw_status: String,
    },

    /// The job reported success but returned no usable output URL.
    #[error("job {task_id} succeeded but returned no model URL (output: {output})")]
    MissingArtifact { task_id: String, output: String },

    /// Downloading the finished artifact failed.
    #[error("download failed: {status} - {message}")]
    Download { status: u16, message: String },

    /// Provider response did not match the expected schema.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Deadline elapsed before the job finished.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Caller cancelled the request.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g., reading the source image, saving the model).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeshGenError {
    /// Returns true if this error is likely transient and worth retrying.
    ///
    /// Nothing in this crate retries; callers decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            _ => self
                .http_status()
                .is_some_and(|status| status == 429 || status >= 500),
        }
    }

    /// Returns true if a stage was rejected with HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        self.http_status() == Some(429)
    }

    /// Returns the HTTP status attached to a stage error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Upload { status, .. }
            | Self::Submission { status, .. }
            | Self::StatusQuery { status, .. }
            | Self::Download { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reads a `Retry-After` header expressed in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Redacts credentials and caps the length of a provider message.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let text = redact(text, "Bearer ", true);
    let text = redact(&text, "tsk_", false);

    if text.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = text.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        return format!("{cut}...");
    }
    text
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Replaces the token starting at (or, with `keep_marker`, following) every
/// occurrence of `marker`.
fn redact(text: &str, marker: &str, keep_marker: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find(marker) {
        out.push_str(&rest[..idx]);
        let token_start = if keep_marker {
            out.push_str(marker);
            idx + marker.len()
        } else {
            idx
        };
        let tail = &rest[token_start..];
        let len = tail.find(|c: char| !is_token_char(c)).unwrap_or(tail.len());
        if len > 0 {
            out.push_str("[REDACTED]");
        }
        rest = &tail[len..];
    }

    out.push_str(rest);
    out
}

/// Result type alias for model generation operations.
pub type Result<T> = std::result::Result<T, MeshGenError>;
