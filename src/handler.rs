//! The generation endpoint contract, independent of any HTTP framework.
//!
//! [`GenerationHandler::handle`] takes the request method and raw body and
//! always produces a JSON response; no error escapes it.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HandlerConfig;
use crate::data_url::parse_image_field;
use crate::error::{PergolaError, Result};
use crate::generate::Generator;
use crate::replicate::{PredictionApi, ReplicateClient};
use crate::types::{ErrorBody, GenerationRequest, GenerationResult, ImageSource};

/// Incoming JSON body.
///
/// `image`/`imageBase64` and `prompt`/`notes` are accepted as aliases; the
/// first non-empty value wins.
#[derive(Debug, Default, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    image: Option<String>,
    #[serde(default, rename = "imageBase64")]
    image_base64: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

fn first_present(a: Option<String>, b: Option<String>) -> Option<String> {
    a.filter(|v| !v.trim().is_empty())
        .or_else(|| b.filter(|v| !v.trim().is_empty()))
}

/// JSON body of a handler response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// `{ "image": <url> }`
    Success(GenerationResult),
    /// `{ "error": <message>, "details"?: <value> }`
    Error(ErrorBody),
}

/// Status and body produced for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// JSON body.
    pub body: ResponseBody,
}

/// Stateless generation handler; one instance serves every request.
pub struct GenerationHandler {
    config: Arc<HandlerConfig>,
    generator: Generator,
}

impl GenerationHandler {
    /// Creates a handler talking to Replicate as described by `config`.
    pub fn new(config: HandlerConfig) -> Self {
        let client = ReplicateClient::from_config(&config);
        Self::with_upstream(config, Arc::new(client))
    }

    /// Creates a handler backed by an arbitrary prediction provider.
    pub fn with_upstream(config: HandlerConfig, api: Arc<dyn PredictionApi>) -> Self {
        let generator = Generator::new(api, &config);
        Self {
            config: Arc::new(config),
            generator,
        }
    }

    /// Configuration this handler was built with.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Handles one invocation.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> HandlerResponse {
        match self.process(method, body).await {
            Ok(result) => HandlerResponse {
                status: StatusCode::OK,
                body: ResponseBody::Success(result),
            },
            Err(err) => self.error_response(err),
        }
    }

    async fn process(&self, method: &Method, body: &[u8]) -> Result<GenerationResult> {
        if *method != Method::POST {
            return Err(PergolaError::MethodNotAllowed);
        }

        let request = self.parse_request(body)?;

        if self.config.api_token.is_none() {
            return Err(PergolaError::Misconfigured("REPLICATE_API_TOKEN".into()));
        }

        self.generator.generate(&request).await
    }

    /// Validates the body into a request without touching the network.
    fn parse_request(&self, body: &[u8]) -> Result<GenerationRequest> {
        let invalid = || PergolaError::BadRequest("Invalid JSON body".into());
        let body: GenerateBody = if body.iter().all(u8::is_ascii_whitespace) {
            GenerateBody::default()
        } else {
            let value: Value = serde_json::from_slice(body).map_err(|_| invalid())?;
            if !value.is_object() {
                return Err(invalid());
            }
            serde_json::from_value(value).map_err(|_| invalid())?
        };

        let raw_image = first_present(body.image, body.image_base64)
            .ok_or_else(|| PergolaError::BadRequest("No image provided".into()))?;
        let image = parse_image_field(&raw_image)?;

        if let ImageSource::Embedded(embedded) = &image {
            if embedded.size() > self.config.max_image_bytes {
                return Err(PergolaError::PayloadTooLarge {
                    size: embedded.size(),
                    limit: self.config.max_image_bytes,
                });
            }
        }

        Ok(GenerationRequest {
            image,
            filename: body
                .filename
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| self.config.default_filename.clone()),
            color: body.color,
            note: first_present(body.prompt, body.notes),
        })
    }

    fn error_response(&self, err: PergolaError) -> HandlerResponse {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::warn!(code = err.code(), %status, "generation request failed: {err}");
        } else {
            tracing::debug!(code = err.code(), %status, "rejected generation request: {err}");
        }

        let error = if err.is_internal() {
            "Server error".to_string()
        } else {
            err.to_string()
        };
        let details = if self.config.debug {
            err.details()
        } else {
            None
        };

        HandlerResponse {
            status,
            body: ResponseBody::Error(ErrorBody { error, details }),
        }
    }
}
