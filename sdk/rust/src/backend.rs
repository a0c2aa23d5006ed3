//! Backend trait: the logical operations the dashboard needs from the
//! execution and storage service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkStream;
use crate::error::BackendError;
use crate::types::{EvaluationResult, HistoryTurn, LocalizedTitle, Trajectory};

/// A freshly created execution session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: String,
    /// Query as echoed back by the backend
    pub initial_query: String,
}

/// A session re-bound to a persisted trajectory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredSession {
    pub session_id: String,
    /// Number of steps the backend replayed into the new session
    pub restored_steps: usize,
}

/// Execution and storage backend.
///
/// Execution operations (`start_session`, `restore_session`, `advance_step`,
/// `continue_session`, `evaluate_session`) address a live session by id and
/// report an unknown id as [`BackendError::NotFound`]. Storage operations
/// manage the saved-history collection.
#[async_trait]
pub trait Backend: Send + Sync {
    // =========================================================================
    // Execution
    // =========================================================================

    /// Create a session for `query`, hiding `payload` in the primary track
    async fn start_session(
        &self,
        api_key: Option<&str>,
        query: &str,
        payload: &str,
    ) -> Result<StartedSession, BackendError>;

    /// Bind a new session to the persisted trajectory `trajectory_id`
    async fn restore_session(
        &self,
        api_key: Option<&str>,
        trajectory_id: &str,
    ) -> Result<RestoredSession, BackendError>;

    /// Run one turn of both tracks, streaming its chunks
    async fn advance_step(&self, session_id: &str) -> Result<ChunkStream, BackendError>;

    /// Append a user message to both tracks and re-open the session
    async fn continue_session(&self, session_id: &str, message: &str) -> Result<(), BackendError>;

    /// Score both tracks of a session
    async fn evaluate_session(
        &self,
        session_id: &str,
        language: &str,
    ) -> Result<EvaluationResult, BackendError>;

    /// Summarize a conversation into a short title
    async fn generate_title(&self, history: &[HistoryTurn]) -> Result<String, BackendError>;

    // =========================================================================
    // Storage
    // =========================================================================

    /// Saved trajectories for a scope (e.g. `benchmark`)
    async fn list_trajectories(&self, scope: &str) -> Result<Vec<Trajectory>, BackendError>;

    /// Insert or overwrite a trajectory, returning its id
    async fn save_trajectory(
        &self,
        title: &LocalizedTitle,
        trajectory: &Trajectory,
        id: Option<&str>,
    ) -> Result<String, BackendError>;

    async fn delete_trajectory(&self, id: &str) -> Result<(), BackendError>;

    /// Delete several trajectories, returning how many existed
    async fn batch_delete_trajectories(&self, ids: &[String]) -> Result<u64, BackendError>;

    /// Delete every trajectory, returning how many existed
    async fn clear_all(&self) -> Result<u64, BackendError>;

    async fn toggle_pin(&self, id: &str) -> Result<(), BackendError>;
}
