//! Debounced persistence of the live trajectory

use std::sync::Arc;
use std::time::Duration;

use agentmark::{Backend, LocalizedTitle, Trajectory};
use tokio::task::JoinHandle;

use crate::core::constants::TITLE_PREVIEW_CHARS;
use crate::utils::string::truncate_preview;

/// Title for a trajectory nobody named yet: a preview of the first message.
pub fn derive_title(trajectory: &Trajectory) -> Option<LocalizedTitle> {
    if !trajectory.title.is_placeholder() {
        return None;
    }
    let first = trajectory.steps.first()?;
    let source = if trajectory.user_query.trim().is_empty() {
        &first.primary.thought
    } else {
        &trajectory.user_query
    };
    if source.trim().is_empty() {
        return None;
    }
    Some(LocalizedTitle::same(truncate_preview(source, TITLE_PREVIEW_CHARS)))
}

pub struct AutoSaver {
    backend: Arc<dyn Backend>,
    debounce: Duration,
    pending: Option<JoinHandle<()>>,
}

impl AutoSaver {
    pub fn new(backend: Arc<dyn Backend>, debounce: Duration) -> Self {
        Self {
            backend,
            debounce,
            pending: None,
        }
    }

    /// Save `snapshot` once the debounce window passes without another call.
    /// An unnamed trajectory is saved under a title derived from its first
    /// message.
    pub fn schedule(&mut self, snapshot: Trajectory) {
        self.cancel();
        let backend = self.backend.clone();
        let debounce = self.debounce;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let title = derive_title(&snapshot).unwrap_or_else(|| snapshot.title.clone());
            let id = (!snapshot.is_draft()).then_some(snapshot.id.as_str());
            match backend.save_trajectory(&title, &snapshot, id).await {
                Ok(saved_id) => {
                    tracing::debug!(id = %saved_id, steps = snapshot.steps.len(), "Auto-saved trajectory")
                }
                Err(e) => tracing::warn!(id = %snapshot.id, error = %e, "Auto-save failed"),
            }
        }));
    }

    /// Drop a pending write
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for a pending write to land, up to `timeout`
    pub async fn flush(&mut self, timeout: Duration) {
        let Some(handle) = self.pending.take() else {
            return;
        };
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Auto-save did not finish in time");
        }
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.cancel();
    }
}
