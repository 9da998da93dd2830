//! Scripted [`PredictionApi`] used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PergolaError, Result};
use crate::replicate::{Prediction, PredictionApi, PredictionInput, PredictionStatus, PredictionUrls};
use crate::types::EmbeddedImage;

/// Builds a prediction with the given status and a poll URL.
pub(crate) fn prediction(status: PredictionStatus) -> Prediction {
    Prediction {
        id: "p-test".into(),
        status,
        output: None,
        urls: Some(PredictionUrls {
            get: Some("https://api.replicate.test/v1/predictions/p-test".into()),
            cancel: None,
        }),
        error: None,
    }
}

/// Replays a fixed script of upstream responses and counts every call.
pub(crate) struct ScriptedApi {
    submitted: Prediction,
    polls: Mutex<VecDeque<Prediction>>,
    repeat_last: Option<Prediction>,
    fail_stage: bool,
    submit_delay: Option<Duration>,
    fetch_delay: Option<Duration>,
    stage_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    processing_polls: AtomicUsize,
    last_input: Mutex<Option<PredictionInput>>,
}

impl ScriptedApi {
    pub(crate) const STAGED_URL: &'static str = "https://api.replicate.test/files/staged.jpg";

    /// `submitted` answers the submission; `polls` answer successive fetches.
    pub(crate) fn new(submitted: Prediction, polls: Vec<Prediction>) -> Self {
        Self {
            submitted,
            polls: Mutex::new(polls.into()),
            repeat_last: None,
            fail_stage: false,
            submit_delay: None,
            fetch_delay: None,
            stage_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            processing_polls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    /// Every fetch answers with `poll`.
    pub(crate) fn always(submitted: Prediction, poll: Prediction) -> Self {
        let mut api = Self::new(submitted, Vec::new());
        api.repeat_last = Some(poll);
        api
    }

    /// Makes staging fail as the upstream upload endpoint would.
    pub(crate) fn failing_stage(mut self) -> Self {
        self.fail_stage = true;
        self
    }

    /// Makes every submission take `delay` before answering.
    pub(crate) fn slow_submit(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Makes every fetch take `delay` before answering.
    pub(crate) fn slow_fetch(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub(crate) fn stage_calls(&self) -> usize {
        self.stage_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Fetches answered with `processing`.
    pub(crate) fn processing_polls(&self) -> usize {
        self.processing_polls.load(Ordering::SeqCst)
    }

    /// Total outbound calls of any kind.
    pub(crate) fn total_calls(&self) -> usize {
        self.stage_calls() + self.submit_calls() + self.fetch_calls()
    }

    pub(crate) fn submitted_input(&self) -> Option<PredictionInput> {
        self.last_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionApi for ScriptedApi {
    async fn stage_image(&self, _image: &EmbeddedImage, _filename: &str) -> Result<String> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stage {
            return Err(PergolaError::UpstreamUpload {
                message: "Failed to get upload URL: Unauthorized".into(),
                details: Some(serde_json::json!({"detail": "Unauthorized"})),
            });
        }
        Ok(Self::STAGED_URL.to_string())
    }

    async fn submit(&self, input: &PredictionInput) -> Result<Prediction> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(input.clone());
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.submitted.clone())
    }

    async fn fetch(&self, _prediction: &Prediction) -> Result<Prediction> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat_last.clone())
            .ok_or_else(|| PergolaError::Internal("poll script exhausted".into()))?;
        if next.status == PredictionStatus::Processing {
            self.processing_polls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(next)
    }
}
