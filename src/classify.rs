//! Classification service seam
//!
//! Audio-to-text happens outside the daemon. The cycle only needs the
//! transcript text back, within a ceiling it enforces itself.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use crate::capture::CaptureSegment;

/// Errors from a classification request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    #[error("classification service unreachable: {0}")]
    Transport(String),

    #[error("classification rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed classification response: {0}")]
    Malformed(String),

    #[error("classification unavailable: {0}")]
    Unavailable(String),
}

/// External audio-to-text service
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, segment: &CaptureSegment) -> Result<String, ClassifyError>;
}

/// Run a classification under a caller-enforced ceiling
pub async fn classify_within(
    classifier: &dyn Classifier,
    segment: &CaptureSegment,
    ceiling: Duration,
) -> Result<String, ClassifyError> {
    match timeout(ceiling, classifier.classify(segment)).await {
        Ok(result) => result,
        Err(_) => Err(ClassifyError::Timeout(ceiling)),
    }
}

/// Response body expected from the classification endpoint
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    text: String,
}

/// Classifier backed by an HTTP transcription sidecar
///
/// POSTs the raw segment bytes and expects `{"text": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClassifyError::Unavailable(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, segment: &CaptureSegment) -> Result<String, ClassifyError> {
        debug!(
            segment_id = segment.id(),
            bytes = segment.audio().len(),
            recorded_ms = segment.recorded_for().as_millis() as u64,
            "submitting segment"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("x-segment-id", segment.id().to_string())
            .body(segment.audio().to_vec())
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Malformed(e.to_string()))?;
        Ok(body.text)
    }
}

/// Classifier used when no endpoint is configured; every segment is "no match"
#[derive(Debug, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _segment: &CaptureSegment) -> Result<String, ClassifyError> {
        Err(ClassifyError::Unavailable(
            "no classifier endpoint configured".to_string(),
        ))
    }
}
