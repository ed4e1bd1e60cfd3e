use super::pipeline::InferencePipeline;
use crate::domain::detection::{DetectionError, DetectionOutcome, ImagePayload};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Async entry point for both transports.
///
/// Pipeline work runs on the blocking pool, at most `max_concurrent` requests
/// at a time, and each request is cut off after `deadline`.
#[derive(Clone)]
pub struct ClassifyImageUseCase {
    pipeline: Arc<InferencePipeline>,
    permits: Arc<Semaphore>,
    deadline: Duration,
}

impl ClassifyImageUseCase {
    pub fn new(pipeline: Arc<InferencePipeline>, max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            deadline,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.pipeline.model_loaded()
    }

    /// Dropping the returned future abandons the request. A pipeline call
    /// already on the blocking pool finishes in the background and its
    /// result is discarded.
    pub async fn execute(&self, payload: ImagePayload) -> DetectionOutcome {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.deadline, self.run(payload)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                error!(error = %err, "Inference task failed");
                err.into()
            }
            Err(_) => {
                warn!(deadline = ?self.deadline, "Inference deadline exceeded");
                DetectionError::DeadlineExceeded(self.deadline).into()
            }
        };

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Request finished");
        outcome
    }

    async fn run(&self, payload: ImagePayload) -> Result<DetectionOutcome, DetectionError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(DetectionError::internal)?;

        let pipeline = self.pipeline.clone();
        tokio::task::spawn_blocking(move || {
            // Held until the pipeline returns, even if the caller gave up.
            let _permit = permit;
            pipeline.detect(&payload)
        })
        .await
        .map_err(DetectionError::internal)
    }
}
