//! The staging → submit → poll flow behind every generation request.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::HandlerConfig;
use crate::error::{PergolaError, Result};
use crate::prompt::build_prompt;
use crate::replicate::{Prediction, PredictionApi, PredictionInput, PredictionStatus};
use crate::types::{GenerationRequest, GenerationResult, ImageSource};

/// Stand-in deadline for timeouts that overflow the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runs one generation against a [`PredictionApi`].
///
/// Strictly sequential: at most one outbound call is in flight, and the poll
/// loop never outlives its deadline.
pub struct Generator {
    api: Arc<dyn PredictionApi>,
    base_prompt: String,
    image_field: String,
    guidance: Option<f32>,
    poll_interval: Duration,
    timeout: Duration,
}

impl Generator {
    /// Creates a generator using the prompt and polling settings from `config`.
    pub fn new(api: Arc<dyn PredictionApi>, config: &HandlerConfig) -> Self {
        Self {
            api,
            base_prompt: config.base_prompt.clone(),
            image_field: config.image_field.clone(),
            guidance: config.guidance,
            poll_interval: config.poll_interval,
            timeout: config.timeout,
        }
    }

    /// Stages the image if needed, submits the prediction and waits for it.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let image = match &request.image {
            ImageSource::Hosted(url) => url.clone(),
            ImageSource::Embedded(embedded) => {
                self.api.stage_image(embedded, &request.filename).await?
            }
        };

        let input = PredictionInput {
            prompt: build_prompt(
                &self.base_prompt,
                request.color.as_deref(),
                request.note.as_deref(),
            ),
            image,
            image_field: self.image_field.clone(),
            guidance: self.guidance,
        };

        let started = Instant::now();
        let deadline = self.deadline_from(started);
        let prediction = tokio::time::timeout_at(deadline, self.api.submit(&input))
            .await
            .map_err(|_| self.timed_out(None))??;
        tracing::info!(
            prediction_id = %prediction.id,
            status = %prediction.status,
            "submitted prediction"
        );

        let prediction = self.wait_for_terminal(prediction, started, deadline).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match prediction.status {
            PredictionStatus::Succeeded => {
                let image = prediction
                    .output
                    .as_ref()
                    .and_then(|output| output.first())
                    .ok_or(PergolaError::MissingOutput)?
                    .to_string();
                tracing::info!(prediction_id = %prediction.id, elapsed_ms, "generation complete");
                Ok(GenerationResult { image })
            }
            status => {
                tracing::warn!(prediction_id = %prediction.id, %status, elapsed_ms, "generation did not succeed");
                Err(PergolaError::GenerationFailed {
                    status,
                    details: prediction.error,
                })
            }
        }
    }

    /// Deadline for a prediction submitted at `started`.
    ///
    /// Timeouts too large to represent never expire in practice.
    fn deadline_from(&self, started: Instant) -> Instant {
        started
            .checked_add(self.timeout)
            .or_else(|| started.checked_add(FAR_FUTURE))
            .unwrap_or(started)
    }

    /// Polls until the prediction is terminal or the deadline passes.
    ///
    /// No request is issued once the deadline has been reached, and a poll
    /// still in flight at the deadline is dropped; the job is left running
    /// upstream.
    async fn wait_for_terminal(
        &self,
        mut prediction: Prediction,
        started: Instant,
        deadline: Instant,
    ) -> Result<Prediction> {
        loop {
            if prediction.status.is_terminal() {
                return Ok(prediction);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(Some(&prediction)));
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                return Err(self.timed_out(Some(&prediction)));
            }

            prediction = tokio::time::timeout_at(deadline, self.api.fetch(&prediction))
                .await
                .map_err(|_| self.timed_out(Some(&prediction)))??;
            tracing::debug!(
                prediction_id = %prediction.id,
                status = %prediction.status,
                elapsed_secs = started.elapsed().as_secs(),
                "polled prediction"
            );
        }
    }

    fn timed_out(&self, prediction: Option<&Prediction>) -> PergolaError {
        match prediction {
            Some(prediction) => tracing::warn!(
                prediction_id = %prediction.id,
                status = %prediction.status,
                timeout_secs = self.timeout.as_secs(),
                "abandoning prediction after deadline"
            ),
            None => tracing::warn!(
                timeout_secs = self.timeout.as_secs(),
                "prediction submission did not answer before deadline"
            ),
        }
        PergolaError::Timeout(self.timeout)
    }
}
