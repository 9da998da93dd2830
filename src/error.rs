//! Error types for pergola generation.

use std::time::Duration;

use http::StatusCode;
use serde_json::Value;

use crate::replicate::PredictionStatus;

/// Longest upstream message surfaced to callers.
const MAX_MESSAGE_LEN: usize = 500;

/// Errors that can occur while handling a generation request.
#[derive(Debug, thiserror::Error)]
pub enum PergolaError {
    /// Malformed or missing input.
    #[error("{0}")]
    BadRequest(String),

    /// Request used a method other than POST.
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// Decoded image exceeds the configured limit.
    #[error("Image too large ({size} bytes, limit {limit}). Please upload a smaller image.")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Required configuration (e.g. the API token) is missing.
    #[error("Missing {0}")]
    Misconfigured(String),

    /// Staging the image with the upstream file endpoint failed.
    #[error("Image upload failed: {message}")]
    UpstreamUpload {
        message: String,
        details: Option<Value>,
    },

    /// The upstream rejected the prediction request.
    #[error("Failed to start prediction: {}", describe_status(.status, .message))]
    UpstreamSubmit {
        status: Option<u16>,
        message: String,
        details: Option<Value>,
    },

    /// A status poll against the upstream failed.
    #[error("Prediction status check failed: {}", describe_status(.status, .message))]
    UpstreamPoll { status: Option<u16>, message: String },

    /// The prediction reached a non-success terminal state.
    #[error("Generation {status}")]
    GenerationFailed {
        status: PredictionStatus,
        details: Option<Value>,
    },

    /// The prediction succeeded but carried no output.
    #[error("Generation succeeded but returned no image")]
    MissingOutput,

    /// The deadline passed while polling.
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    /// Unexpected failure inside the handler.
    #[error("internal error: {0}")]
    Internal(String),

    /// The upload client was asked to send an empty image.
    #[error("Please upload an image first!")]
    NoImageSelected,

    /// The generation endpoint answered with an error (client side).
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Image decoding or encoding failed (client side).
    #[error("image processing failed: {0}")]
    Image(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g. reading the source photo).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_status(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("{status} - {message}"),
        None => message.to_string(),
    }
}

impl PergolaError {
    /// HTTP status code returned to callers for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::NoImageSelected => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamUpload { .. }
            | Self::UpstreamSubmit { .. }
            | Self::UpstreamPoll { .. }
            | Self::GenerationFailed { .. }
            | Self::MissingOutput
            | Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Misconfigured(_)
            | Self::Internal(_)
            | Self::Image(_)
            | Self::Io(_)
            | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable kebab-case code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::NoImageSelected => "bad-request",
            Self::MethodNotAllowed => "method-not-allowed",
            Self::PayloadTooLarge { .. } => "payload-too-large",
            Self::Misconfigured(_) => "server-misconfigured",
            Self::UpstreamUpload { .. } => "upstream-upload-failed",
            Self::UpstreamSubmit { .. } => "upstream-submit-failed",
            Self::UpstreamPoll { .. } => "upstream-poll-failed",
            Self::Network(_) => "upstream-unreachable",
            Self::GenerationFailed { .. } => "upstream-generation-failed",
            Self::MissingOutput => "upstream-missing-output",
            Self::Timeout(_) => "generation-timeout",
            Self::Rejected { .. } => "rejected",
            Self::Internal(_) | Self::Image(_) | Self::Io(_) | Self::Json(_) => "internal",
        }
    }

    /// Returns true for failures that should not leak their message to callers.
    pub fn is_internal(&self) -> bool {
        self.code() == "internal"
    }

    /// Diagnostic payload attached to the error, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::UpstreamUpload { details, .. }
            | Self::UpstreamSubmit { details, .. }
            | Self::GenerationFailed { details, .. } => details.clone(),
            _ if self.is_internal() => Some(Value::String(self.to_string())),
            _ => None,
        }
    }
}

/// Collapses whitespace and truncates an upstream error message.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_MESSAGE_LEN {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(MAX_MESSAGE_LEN).collect();
    truncated.push('…');
    truncated
}

/// Result type alias for pergola operations.
pub type Result<T> = std::result::Result<T, PergolaError>;
