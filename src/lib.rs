#![warn(missing_docs)]
//! Pergola - AI pergola renderings of customer photos via Replicate.
//!
//! A customer uploads a photo of their outdoor space together with a
//! preferred colour and a free-text note; the generation handler stages the
//! photo with Replicate, submits an image-editing prediction, polls it to a
//! terminal state and answers with the URL of the rendered image.
//!
//! # Quick Start - Service
//!
//! ```no_run
//! use std::sync::Arc;
//! use pergola::{server, GenerationHandler, HandlerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let handler = Arc::new(GenerationHandler::new(HandlerConfig::from_env()));
//!     server::serve("127.0.0.1:8080".parse().unwrap(), handler).await
//! }
//! ```
//!
//! # Quick Start - Client
//!
//! ```no_run
//! use pergola::client::{prepare_image, ResizeOptions, UploadClient, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> pergola::Result<()> {
//!     let photo = prepare_image(std::fs::read("garden.jpg")?, &ResizeOptions::default())?;
//!     let client = UploadClient::new("http://127.0.0.1:8080/api/generate");
//!     let result = client
//!         .generate(&UploadRequest::new(photo).with_color("anthracite"))
//!         .await?;
//!     println!("{}", result.image);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `cli` (default): the `pergola` binary (`serve` and `render`)

pub mod client;
pub mod config;
mod data_url;
mod error;
pub mod generate;
pub mod handler;
pub mod prompt;
pub mod replicate;
pub mod server;
mod types;

#[cfg(test)]
mod testing;

pub use config::{HandlerConfig, HandlerConfigBuilder, ModelAddressing, UploadMode};
pub use data_url::{parse_image_field, to_data_url};
pub use error::{PergolaError, Result};
pub use generate::Generator;
pub use handler::{GenerationHandler, HandlerResponse, ResponseBody};
pub use replicate::{PredictionApi, ReplicateClient};
pub use types::{
    EmbeddedImage, ErrorBody, GenerationRequest, GenerationResult, ImageFormat, ImageSource,
    DEFAULT_FILENAME,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{UploadClient, UploadRequest};
    pub use crate::error::{PergolaError, Result};
    pub use crate::handler::GenerationHandler;
    pub use crate::replicate::PredictionApi;
    pub use crate::types::{GenerationRequest, GenerationResult, ImageSource};
    pub use crate::HandlerConfig;
}
