use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::data_url::to_data_url;
use crate::error::{PergolaError, Result};
use crate::types::{GenerationResult, DEFAULT_FILENAME};

use super::resize::PreparedImage;

/// Message shown when the service answers without an image or an error.
pub const NO_IMAGE_RETURNED: &str = "No image returned";

/// What the caller wants rendered.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Encoded photo bytes; empty means nothing was selected.
    pub image: Vec<u8>,
    /// MIME type of `image`.
    pub mime: String,
    /// Filename reported to the service.
    pub filename: String,
    /// Requested pergola colour.
    pub color: Option<String>,
    /// Free-text note.
    pub notes: Option<String>,
}

impl UploadRequest {
    /// Builds a request from a prepared photo.
    pub fn new(image: PreparedImage) -> Self {
        Self {
            image: image.bytes,
            mime: image.mime,
            filename: DEFAULT_FILENAME.to_string(),
            color: None,
            notes: None,
        }
    }

    /// Sets the reported filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Sets the pergola colour.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Sets the free-text note.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    image: String,
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
}

/// Client for a deployed generation endpoint.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    endpoint: String,
}

impl UploadClient {
    /// Creates a client posting to `endpoint` (e.g. `http://host/api/generate`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), endpoint)
    }

    /// Creates a client reusing an existing HTTP client.
    pub fn with_http_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the photo and returns the rendered image URL.
    ///
    /// An empty photo is refused without contacting the service. Failures
    /// are not retried.
    pub async fn generate(&self, request: &UploadRequest) -> Result<GenerationResult> {
        if request.image.is_empty() {
            return Err(PergolaError::NoImageSelected);
        }

        let payload = Payload {
            image: to_data_url(&request.mime, &request.image),
            filename: &request.filename,
            color: request.color.as_deref().filter(|c| !c.trim().is_empty()),
            prompt: request.notes.as_deref().filter(|n| !n.trim().is_empty()),
        };

        tracing::info!(
            endpoint = %self.endpoint,
            bytes = request.image.len(),
            "requesting pergola render"
        );

        let response = self.http.post(&self.endpoint).json(&payload).send().await?;
        let status = response.status();
        let text = response.text().await?;

        interpret_response(status.as_u16(), &text)
    }

    /// Downloads a rendered image to `path`, returning the number of bytes written.
    pub async fn download(&self, url: &str, path: &Path) -> Result<u64> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(path, &bytes).await?;
        tracing::debug!(url, path = %path.display(), bytes = bytes.len(), "saved render");
        Ok(bytes.len() as u64)
    }
}

/// Maps the service's answer onto a result or a user-facing rejection.
fn interpret_response(status: u16, text: &str) -> Result<GenerationResult> {
    let body: Option<Value> = serde_json::from_str(text).ok();
    let field = |key: &str| {
        body.as_ref()
            .and_then(|b| b.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if (200..300).contains(&status) {
        if let Some(image) = field("image") {
            return Ok(GenerationResult { image });
        }
    }

    Err(PergolaError::Rejected {
        status: if (200..300).contains(&status) { 502 } else { status },
        message: field("error").unwrap_or_else(|| NO_IMAGE_RETURNED.to_string()),
    })
}
