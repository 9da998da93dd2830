//! HTTP client for the Replicate API.

use crate::config::{HandlerConfig, ModelAddressing, UploadMode, DEFAULT_API_BASE};
use crate::error::{sanitize_error_message, PergolaError, Result};
use crate::replicate::types::{
    Prediction, PredictionInput, SubmitBody, UploadSlot, UploadSlotRequest, UploadedFile,
};
use crate::replicate::PredictionApi;
use crate::types::EmbeddedImage;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

/// Builder for [`ReplicateClient`].
#[derive(Debug, Clone)]
pub struct ReplicateClientBuilder {
    api_token: Option<String>,
    api_base: String,
    model: ModelAddressing,
    upload_mode: UploadMode,
    http: Option<reqwest::Client>,
}

impl Default for ReplicateClientBuilder {
    fn default() -> Self {
        Self {
            api_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: ModelAddressing::default(),
            upload_mode: UploadMode::default(),
            http: None,
        }
    }
}

impl ReplicateClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API token sent as a bearer credential.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the API base URL (useful for tests and proxies).
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Sets the prediction addressing mode.
    pub fn model(mut self, model: ModelAddressing) -> Self {
        self.model = model;
        self
    }

    /// Sets the staging handshake.
    pub fn upload_mode(mut self, mode: UploadMode) -> Self {
        self.upload_mode = mode;
        self
    }

    /// Reuses an existing HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Builds the client.
    pub fn build(self) -> ReplicateClient {
        ReplicateClient {
            client: self.http.unwrap_or_default(),
            api_token: self.api_token,
            api_base: self.api_base.trim_end_matches('/').to_string(),
            model: self.model,
            upload_mode: self.upload_mode,
        }
    }
}

/// Replicate API client.
///
/// Holds no per-request state; one instance is shared by all invocations.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    client: reqwest::Client,
    api_token: Option<String>,
    api_base: String,
    model: ModelAddressing,
    upload_mode: UploadMode,
}

impl ReplicateClient {
    /// Creates a new [`ReplicateClientBuilder`].
    pub fn builder() -> ReplicateClientBuilder {
        ReplicateClientBuilder::new()
    }

    /// Builds a client from handler configuration.
    pub fn from_config(config: &HandlerConfig) -> Self {
        let mut builder = Self::builder()
            .api_base(config.api_base.clone())
            .model(config.model.clone())
            .upload_mode(config.upload_mode);
        if let Some(token) = &config.api_token {
            builder = builder.api_token(token.clone());
        }
        builder.build()
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Requests an upload slot, then PUTs the bytes to it.
    async fn upload_via_slot(&self, image: &EmbeddedImage, filename: &str) -> Result<String> {
        let url = format!("{}/uploads", self.api_base);

        let response = self
            .authorized(self.client.post(&url))
            .json(&UploadSlotRequest { filename })
            .send()
            .await
            .map_err(|e| upload_error(format!("Failed to get upload URL: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, details) = parse_error(status, &text);
            return Err(upload_error(
                format!("Failed to get upload URL: {message}"),
                details,
            ));
        }

        let slot: UploadSlot = response
            .json()
            .await
            .map_err(|e| upload_error(format!("Unexpected upload slot response: {e}"), None))?;

        let put = self
            .client
            .put(&slot.upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| upload_error(format!("Upload failed: {e}"), None))?;

        let put_status = put.status();
        if !put_status.is_success() {
            let text = put.text().await.unwrap_or_default();
            let (_, details) = parse_error(put_status, &text);
            return Err(upload_error(
                format!("Upload failed: {}", put_status.as_u16()),
                details,
            ));
        }

        tracing::debug!(serve_url = %slot.serve_url, bytes = image.size(), "staged image via upload slot");
        Ok(slot.serve_url)
    }

    /// Posts the bytes as a multipart form to the files endpoint.
    async fn upload_multipart(&self, image: &EmbeddedImage, filename: &str) -> Result<String> {
        let url = format!("{}/files", self.api_base);

        let part = reqwest::multipart::Part::bytes(image.bytes.clone())
            .file_name(filename.to_string())
            .mime_str(&image.mime)
            .map_err(|e| upload_error(format!("Invalid image content type: {e}"), None))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authorized(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, details) = parse_error(status, &text);
            return Err(upload_error(message, details));
        }

        let file: UploadedFile = response
            .json()
            .await
            .map_err(|e| upload_error(format!("Unexpected files response: {e}"), None))?;

        let reference = file
            .reference()
            .ok_or_else(|| upload_error("files endpoint returned no file reference".into(), None))?;

        tracing::debug!(reference = %reference, bytes = image.size(), "staged image via multipart upload");
        Ok(reference)
    }
}

#[async_trait]
impl PredictionApi for ReplicateClient {
    async fn stage_image(&self, image: &EmbeddedImage, filename: &str) -> Result<String> {
        match self.upload_mode {
            UploadMode::Slot => self.upload_via_slot(image, filename).await,
            UploadMode::Multipart => self.upload_multipart(image, filename).await,
        }
    }

    async fn submit(&self, input: &PredictionInput) -> Result<Prediction> {
        let url = self.model.submit_url(&self.api_base);
        let version = match &self.model {
            ModelAddressing::Version(version) => Some(version.as_str()),
            ModelAddressing::Endpoint(_) => None,
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&SubmitBody { version, input })
            .send()
            .await
            .map_err(|e| PergolaError::UpstreamSubmit {
                status: None,
                message: e.to_string(),
                details: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, details) = parse_error(status, &text);
            return Err(PergolaError::UpstreamSubmit {
                status: Some(status.as_u16()),
                message,
                details,
            });
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| PergolaError::UpstreamSubmit {
                status: Some(status.as_u16()),
                message: format!("Unexpected prediction response: {e}"),
                details: None,
            })
    }

    async fn fetch(&self, prediction: &Prediction) -> Result<Prediction> {
        let url = match prediction.poll_url() {
            Some(url) => url.to_string(),
            None => format!("{}/predictions/{}", self.api_base, prediction.id),
        };

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PergolaError::UpstreamPoll {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, _) = parse_error(status, &text);
            return Err(PergolaError::UpstreamPoll {
                status: Some(status.as_u16()),
                message,
            });
        }

        let mut next: Prediction =
            response
                .json()
                .await
                .map_err(|e| PergolaError::UpstreamPoll {
                    status: Some(status.as_u16()),
                    message: format!("Unexpected prediction response: {e}"),
                })?;

        if next.urls.is_none() {
            next.urls = prediction.urls.clone();
        }
        Ok(next)
    }
}

fn upload_error(message: String, details: Option<Value>) -> PergolaError {
    PergolaError::UpstreamUpload { message, details }
}

/// Extracts a readable message and the raw payload from an upstream error body.
///
/// Replicate answers with `{"detail": ...}` (sometimes `{"error": ...}` or a
/// problem-details `title`); anything else is passed through as text.
fn parse_error(status: StatusCode, text: &str) -> (String, Option<Value>) {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("upstream error")
            .to_string()
    };

    match serde_json::from_str::<Value>(text) {
        Ok(body) => {
            let message = ["detail", "error", "title"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str))
                .map(sanitize_error_message)
                .unwrap_or_else(fallback);
            (message, Some(body))
        }
        Err(_) => {
            let message = sanitize_error_message(text);
            if message.is_empty() {
                (fallback(), None)
            } else {
                (message.clone(), Some(Value::String(message)))
            }
        }
    }
}
