//! Replicate upstream: staging uploads, prediction submission and polling.

mod client;
mod types;

pub use client::{ReplicateClient, ReplicateClientBuilder};
pub use types::{Prediction, PredictionInput, PredictionOutput, PredictionStatus, PredictionUrls};

use crate::error::Result;
use crate::types::EmbeddedImage;
use async_trait::async_trait;

/// Operations the generation flow needs from the prediction provider.
///
/// Every call is a single outbound request (or handshake); the caller owns
/// sequencing, polling cadence and the deadline.
#[async_trait]
pub trait PredictionApi: Send + Sync {
    /// Stages inline image bytes and returns a reference the model can read.
    async fn stage_image(&self, image: &EmbeddedImage, filename: &str) -> Result<String>;

    /// Submits a prediction.
    async fn submit(&self, input: &PredictionInput) -> Result<Prediction>;

    /// Re-fetches the current state of a prediction.
    async fn fetch(&self, prediction: &Prediction) -> Result<Prediction>;
}
