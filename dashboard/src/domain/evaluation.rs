//! Judge scoring of a session's two tracks
//!
//! Holds a single cached result plus the `evaluating` and `ready` (modal
//! open) flags. Concurrent calls are not deduplicated.

use std::sync::Arc;

use agentmark::{Backend, BackendError, EvaluationResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("No session to evaluate")]
    MissingSession,

    #[error("Evaluation failed: {0}")]
    Backend(#[from] BackendError),
}

pub struct EvaluationCoordinator {
    backend: Arc<dyn Backend>,
    cached: Option<EvaluationResult>,
    evaluating: bool,
    ready: bool,
}

impl EvaluationCoordinator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            cached: None,
            evaluating: false,
            ready: false,
        }
    }

    pub fn cached(&self) -> Option<&EvaluationResult> {
        self.cached.as_ref()
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Load a result from elsewhere (a saved trajectory), or clear it
    pub fn set_cached(&mut self, result: Option<EvaluationResult>) {
        self.cached = result;
    }

    /// Close the result view
    pub fn dismiss(&mut self) {
        self.ready = false;
    }

    /// Score the session, reusing the cached result unless `force` is set.
    pub async fn evaluate(
        &mut self,
        session_id: &str,
        language: &str,
        force: bool,
    ) -> Result<EvaluationResult, EvaluationError> {
        if session_id.is_empty() {
            return Err(EvaluationError::MissingSession);
        }
        if !force && let Some(cached) = &self.cached {
            self.ready = true;
            return Ok(cached.clone());
        }

        self.evaluating = true;
        self.ready = true;
        let result = self.backend.evaluate_session(session_id, language).await;
        self.evaluating = false;

        match result {
            Ok(result) => {
                tracing::info!(
                    session_id,
                    primary = result.primary_score,
                    baseline = result.baseline_score,
                    "Evaluation complete"
                );
                self.cached = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "Evaluation failed");
                self.ready = false;
                Err(e.into())
            }
        }
    }
}
