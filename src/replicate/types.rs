//! Wire types for the Replicate API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    /// Queued, not yet running.
    Starting,
    /// Model is running.
    Processing,
    /// Finished with output.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled upstream.
    Canceled,
    /// Any state this crate does not know; treated as still running.
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    /// Returns true once the prediction will no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction output: either a single URL or an ordered list of URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    /// A single output reference.
    One(String),
    /// Several outputs; the first is the primary image.
    Many(Vec<String>),
}

impl PredictionOutput {
    /// The primary output reference.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(url) => Some(url.as_str()),
            Self::Many(urls) => urls.first().map(String::as_str),
        }
        .filter(|url| !url.is_empty())
    }
}

/// Links returned alongside a prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionUrls {
    /// URL to poll for status.
    #[serde(default)]
    pub get: Option<String>,
    /// URL to cancel the prediction.
    #[serde(default)]
    pub cancel: Option<String>,
}

/// A prediction job as reported by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Prediction identifier.
    pub id: String,
    /// Current status.
    pub status: PredictionStatus,
    /// Output, present once succeeded.
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    /// Poll/cancel links.
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
    /// Upstream error payload for failed predictions.
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// URL this prediction is polled at, if the upstream supplied one.
    pub fn poll_url(&self) -> Option<&str> {
        self.urls.as_ref().and_then(|urls| urls.get.as_deref())
    }
}

/// Model input submitted with a prediction.
///
/// The source photo is sent under `image_field`, since models disagree on
/// the key (`image`, `input_image`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    /// Synthesised prompt.
    pub prompt: String,
    /// Hosted reference to the source photo.
    pub image: String,
    /// Input key the model expects the photo under.
    pub image_field: String,
    /// Guidance scale, if configured.
    pub guidance: Option<f32>,
}

impl Serialize for PredictionInput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let len = if self.guidance.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("prompt", &self.prompt)?;
        map.serialize_entry(&self.image_field, &self.image)?;
        if let Some(guidance) = self.guidance {
            map.serialize_entry("guidance", &guidance)?;
        }
        map.end()
    }
}

/// Body of a prediction submission.
#[derive(Debug, Serialize)]
pub(crate) struct SubmitBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,
    pub input: &'a PredictionInput,
}

/// Body of an upload slot request.
#[derive(Debug, Serialize)]
pub(crate) struct UploadSlotRequest<'a> {
    pub filename: &'a str,
}

/// Response to an upload slot request.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadSlot {
    pub upload_url: String,
    pub serve_url: String,
}

/// Response of the multipart files endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadedFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub urls: Option<UploadedFileUrls>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadedFileUrls {
    #[serde(default)]
    pub get: Option<String>,
}

impl UploadedFile {
    /// Retrievable URL if present, otherwise the file handle.
    pub fn reference(self) -> Option<String> {
        self.urls
            .and_then(|urls| urls.get)
            .or(self.id)
            .filter(|r| !r.is_empty())
    }
}
