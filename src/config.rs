//! Handler configuration.
//!
//! Everything the handler needs from the environment is collected into a
//! [`HandlerConfig`] once at startup and injected at construction.

use std::time::Duration;

use crate::prompt::BASE_PROMPT;
use crate::types::DEFAULT_FILENAME;

/// Default Replicate API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// Model used when neither a version nor an endpoint is configured.
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-kontext-pro";

/// Input key the default model reads the source photo from.
pub const DEFAULT_IMAGE_FIELD: &str = "input_image";

/// Default decoded image limit (9.5 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 9 * 1024 * 1024 + 512 * 1024;

/// How predictions are addressed on the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAddressing {
    /// A pinned model version, submitted to `/predictions`.
    Version(String),
    /// A model endpoint URL, or an `owner/name` path expanded against the API base.
    Endpoint(String),
}

impl ModelAddressing {
    /// Picks the addressing mode, preferring a version identifier.
    pub fn select(version: Option<String>, endpoint: Option<String>) -> Self {
        match (non_empty(version), non_empty(endpoint)) {
            (Some(version), _) => Self::Version(version),
            (None, Some(endpoint)) => Self::Endpoint(endpoint),
            (None, None) => Self::Endpoint(DEFAULT_MODEL.to_string()),
        }
    }

    /// URL predictions are submitted to.
    pub fn submit_url(&self, api_base: &str) -> String {
        let base = api_base.trim_end_matches('/');
        match self {
            Self::Version(_) => format!("{base}/predictions"),
            Self::Endpoint(endpoint)
                if endpoint.starts_with("http://") || endpoint.starts_with("https://") =>
            {
                endpoint.clone()
            }
            Self::Endpoint(path) => {
                format!("{base}/models/{}/predictions", path.trim_matches('/'))
            }
        }
    }
}

impl Default for ModelAddressing {
    fn default() -> Self {
        Self::Endpoint(DEFAULT_MODEL.to_string())
    }
}

/// Handshake used to stage inline images with the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadMode {
    /// Request an upload slot, then PUT the raw bytes.
    #[default]
    Slot,
    /// Single multipart POST to the files endpoint.
    Multipart,
}

impl UploadMode {
    /// Parses `slot` / `multipart` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "slot" | "uploads" => Some(Self::Slot),
            "multipart" | "files" => Some(Self::Multipart),
            _ => None,
        }
    }
}

/// Configuration injected into the generation handler.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Upstream API token. Generation is refused when absent.
    pub api_token: Option<String>,
    /// Base URL of the upstream API.
    pub api_base: String,
    /// Prediction addressing mode.
    pub model: ModelAddressing,
    /// Staging handshake.
    pub upload_mode: UploadMode,
    /// Wait between status polls.
    pub poll_interval: Duration,
    /// Wall-clock deadline measured from submission.
    pub timeout: Duration,
    /// Largest accepted decoded image.
    pub max_image_bytes: usize,
    /// Filename used when the caller omits one.
    pub default_filename: String,
    /// Style description the prompt starts from.
    pub base_prompt: String,
    /// Input key the model expects the photo under.
    pub image_field: String,
    /// Guidance scale passed to the model, if any.
    pub guidance: Option<f32>,
    /// Echo diagnostic details to callers.
    pub debug: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: ModelAddressing::default(),
            upload_mode: UploadMode::default(),
            poll_interval: Duration::from_millis(1500),
            timeout: Duration::from_secs(120),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            default_filename: DEFAULT_FILENAME.to_string(),
            base_prompt: BASE_PROMPT.to_string(),
            image_field: DEFAULT_IMAGE_FIELD.to_string(),
            guidance: Some(3.5),
            debug: false,
        }
    }
}

impl HandlerConfig {
    /// Creates a new [`HandlerConfigBuilder`].
    pub fn builder() -> HandlerConfigBuilder {
        HandlerConfigBuilder::default()
    }

    /// Reads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    ///
    /// Unparsable numeric values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let upload_mode = match lookup("REPLICATE_UPLOAD_MODE") {
            Some(raw) => UploadMode::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown REPLICATE_UPLOAD_MODE, using slot uploads");
                UploadMode::Slot
            }),
            None => defaults.upload_mode,
        };

        let poll_interval = parse_number::<u64>(&lookup, "PERGOLA_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let timeout = parse_number::<u64>(&lookup, "PERGOLA_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let max_image_bytes = parse_number::<usize>(&lookup, "PERGOLA_MAX_IMAGE_BYTES")
            .unwrap_or(defaults.max_image_bytes);

        Self {
            api_token: non_empty(lookup("REPLICATE_API_TOKEN")),
            api_base: non_empty(lookup("REPLICATE_API_BASE")).unwrap_or(defaults.api_base),
            model: ModelAddressing::select(
                lookup("REPLICATE_MODEL_VERSION"),
                lookup("REPLICATE_MODEL_ENDPOINT"),
            ),
            upload_mode,
            image_field: non_empty(lookup("REPLICATE_IMAGE_FIELD")).unwrap_or(defaults.image_field),
            poll_interval,
            timeout,
            max_image_bytes,
            debug: lookup("DEBUG").map(|v| parse_flag(&v)).unwrap_or(false),
            ..defaults
        }
    }

    /// Largest request body the server must accept: a base64 data URL of a
    /// maximum-size image plus room for the other fields.
    pub fn max_body_bytes(&self) -> usize {
        self.max_image_bytes / 3 * 4 + 64 * 1024
    }
}

/// Builder for [`HandlerConfig`].
#[derive(Debug, Clone, Default)]
pub struct HandlerConfigBuilder {
    config: HandlerConfig,
}

impl HandlerConfigBuilder {
    /// Starts from environment-derived values instead of defaults.
    pub fn from_env() -> Self {
        Self {
            config: HandlerConfig::from_env(),
        }
    }

    /// Sets the upstream API token.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(token.into());
        self
    }

    /// Sets the upstream API base URL.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    /// Addresses predictions by model version.
    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.config.model = ModelAddressing::Version(version.into());
        self
    }

    /// Addresses predictions by model endpoint.
    pub fn model_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.model = ModelAddressing::Endpoint(endpoint.into());
        self
    }

    /// Sets the staging handshake.
    pub fn upload_mode(mut self, mode: UploadMode) -> Self {
        self.config.upload_mode = mode;
        self
    }

    /// Sets the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Sets the generation deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the decoded image size limit.
    pub fn max_image_bytes(mut self, limit: usize) -> Self {
        self.config.max_image_bytes = limit;
        self
    }

    /// Sets the style description the prompt starts from.
    pub fn base_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.base_prompt = prompt.into();
        self
    }

    /// Sets the input key the model expects the photo under.
    pub fn image_field(mut self, field: impl Into<String>) -> Self {
        self.config.image_field = field.into();
        self
    }

    /// Sets or clears the guidance scale.
    pub fn guidance(mut self, guidance: Option<f32>) -> Self {
        self.config.guidance = guidance;
        self
    }

    /// Enables echoing of diagnostic details.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> HandlerConfig {
        self.config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
