//! Saved-history collection
//!
//! `ScenarioStore` owns the list of persisted trajectories for one scope and
//! keeps it fresh after every mutation. Listing failures are swallowed (the
//! previous collection stays visible); mutation failures propagate.

use std::sync::Arc;

use agentmark::{Backend, BackendError, Trajectory};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to {op} saved history: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: BackendError,
    },
}

impl StoreError {
    fn request(op: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| Self::Request { op, source }
    }
}

/// Pin flag as stored by the history backend
pub fn is_pinned(trajectory: &Trajectory) -> bool {
    ["is_pinned", "isPinned", "pinned"]
        .iter()
        .find_map(|key| trajectory.extra.get(*key))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

pub struct ScenarioStore {
    backend: Arc<dyn Backend>,
    scope: String,
    trajectories: Vec<Trajectory>,
}

impl ScenarioStore {
    pub fn new(backend: Arc<dyn Backend>, scope: impl Into<String>) -> Self {
        Self {
            backend,
            scope: scope.into(),
            trajectories: Vec::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn list(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn get(&self, id: &str) -> Option<&Trajectory> {
        self.trajectories.iter().find(|t| t.id == id)
    }

    /// Reload the collection. Failures keep the previous one.
    pub async fn refresh(&mut self) {
        match self.backend.list_trajectories(&self.scope).await {
            Ok(trajectories) => {
                tracing::debug!(scope = %self.scope, count = trajectories.len(), "Saved history loaded");
                self.trajectories = trajectories;
            }
            Err(e) => {
                tracing::error!(scope = %self.scope, error = %e, "Failed to load saved history");
            }
        }
    }

    /// Persist a trajectory and return the id it was stored under.
    ///
    /// Id precedence: explicit override, then the trajectory's own id unless
    /// it is a local draft, then none (the backend assigns one).
    pub async fn save(
        &mut self,
        trajectory: &Trajectory,
        id_override: Option<&str>,
    ) -> Result<String, StoreError> {
        let id = id_override.or_else(|| (!trajectory.is_draft()).then_some(trajectory.id.as_str()));
        let saved_id = self
            .backend
            .save_trajectory(&trajectory.title, trajectory, id)
            .await
            .map_err(StoreError::request("save"))?;
        tracing::debug!(id = %saved_id, steps = trajectory.steps.len(), "Trajectory saved");
        self.refresh().await;
        Ok(saved_id)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if let Err(e) = self.backend.delete_trajectory(id).await {
            tracing::error!(id, error = %e, "Delete failed");
            return Err(StoreError::request("delete")(e));
        }
        self.refresh().await;
        Ok(())
    }

    pub async fn batch_delete(&mut self, ids: &[String]) -> Result<u64, StoreError> {
        let deleted = match self.backend.batch_delete_trajectories(ids).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(count = ids.len(), error = %e, "Batch delete failed");
                return Err(StoreError::request("batch delete")(e));
            }
        };
        tracing::info!(requested = ids.len(), deleted, "Batch deleted saved trajectories");
        self.refresh().await;
        Ok(deleted)
    }

    pub async fn clear_all(&mut self) -> Result<u64, StoreError> {
        let deleted = match self.backend.clear_all().await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(error = %e, "Clear all failed");
                return Err(StoreError::request("clear")(e));
            }
        };
        tracing::info!(deleted, "Saved history cleared");
        self.refresh().await;
        Ok(deleted)
    }

    pub async fn toggle_pin(&mut self, id: &str) -> Result<(), StoreError> {
        if let Err(e) = self.backend.toggle_pin(id).await {
            tracing::error!(id, error = %e, "Toggle pin failed");
            return Err(StoreError::request("pin")(e));
        }
        self.refresh().await;
        Ok(())
    }

    /// Mirror the live trajectory into the collection. Only replaces an
    /// existing entry with the same id; never inserts.
    pub fn sync_live(&mut self, live: &Trajectory) {
        if let Some(entry) = self.trajectories.iter_mut().find(|t| t.id == live.id) {
            *entry = live.clone();
        }
    }
}
