//! Live session orchestration
//!
//! `LiveSession` drives one backend session: it starts or restores it,
//! advances it one streamed step at a time, folds chunks into the live
//! trajectory, continues it with user messages and persists it.
//!
//! An advance is split in three so a driver can interleave chunk arrival
//! with timers and user input:
//!
//! ```text
//! begin_advance() -> PendingAdvance
//!     ingest(&mut pending, chunk)   (for every chunk)
//! complete_advance(pending, failure)
//! ```
//!
//! The busy flag is held by `PendingAdvance`, so at most one advance is
//! outstanding and dropping it releases the flag.

mod autosave;
mod error;
mod merge;
mod playback;


pub use autosave::{AutoSaver, derive_title};
pub use error::SessionError;
pub use merge::is_terminal;
pub use playback::{AutoPlay, BusyFlag, BusyGuard};

use std::sync::Arc;
use std::time::Duration;

use agentmark::{
    Agent, Backend, BackendError, ChunkStream, DRAFT_ID_PREFIX, EvaluationResult, HistoryTurn,
    LocalizedTitle, SESSION_ID_PREFIX, Step, StepChunk, Trajectory,
};
use futures::StreamExt;

use crate::core::config::AppConfig;
use crate::core::constants::{
    DEFAULT_AUTOPLAY_INTERVAL_MS, DEFAULT_AUTOSAVE_DEBOUNCE_MS, DEFAULT_PAYLOAD, LIVE_SESSION_TITLE,
    LIVE_TASK_NAME, NEW_CHAT_TITLE_EN, NEW_CHAT_TITLE_ZH, TITLE_PREVIEW_CHARS,
};
use crate::core::secret::Secret;
use crate::domain::scenarios::ScenarioStore;
use crate::utils::string::truncate_preview;
use crate::utils::time::{clock_timestamp, unix_millis};

// =============================================================================
// Types
// =============================================================================

/// Backend session bound to a trajectory.
///
/// The trajectory id is the persistence key. The session id only addresses
/// the backend and changes on every restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub trajectory_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Ready,
    Advancing,
    AutoPlaying,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub api_key: Option<Secret>,
    pub payload: String,
    pub autoplay_interval: Duration,
    pub autosave_debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            payload: DEFAULT_PAYLOAD.to_string(),
            autoplay_interval: Duration::from_millis(DEFAULT_AUTOPLAY_INTERVAL_MS),
            autosave_debounce: Duration::from_millis(DEFAULT_AUTOSAVE_DEBOUNCE_MS),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api_key: config.backend.api_key.clone(),
            payload: config.session.payload.clone(),
            autoplay_interval: config.playback.autoplay_interval,
            autosave_debounce: config.playback.autosave_debounce,
        }
    }
}

/// Query and payload of the most recent start
#[derive(Debug, Clone)]
struct PendingQuery {
    query: String,
    payload: String,
}

/// An advance whose stream is open
pub struct PendingAdvance {
    trajectory_id: String,
    step_index: usize,
    stream: ChunkStream,
    received_result: bool,
    primary_thought: String,
    baseline_thought: String,
    _guard: BusyGuard,
}

impl PendingAdvance {
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn trajectory_id(&self) -> &str {
        &self.trajectory_id
    }

    pub async fn next_chunk(&mut self) -> Option<Result<StepChunk, BackendError>> {
        self.stream.next().await
    }

    fn thought_mut(&mut self, agent: Agent) -> &mut String {
        match agent {
            Agent::Primary => &mut self.primary_thought,
            Agent::Baseline => &mut self.baseline_thought,
        }
    }
}

pub enum Advance {
    /// Both agents already finished; nothing was requested
    Terminal,
    Started(PendingAdvance),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceReport {
    pub step_index: usize,
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Terminal,
    Completed(AdvanceReport),
}

/// Which branch a continuation took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuePath {
    /// No session was bound; the message started a new one
    Started,
    /// Message appended to the bound session
    Continued { restored: bool },
}

// =============================================================================
// LiveSession
// =============================================================================

pub struct LiveSession {
    backend: Arc<dyn Backend>,
    api_key: Option<Secret>,
    default_payload: String,
    session: Option<Session>,
    trajectory: Option<Trajectory>,
    cursor: usize,
    autoplay: AutoPlay,
    busy: BusyFlag,
    initializing: bool,
    pending_query: Option<PendingQuery>,
    autosaver: AutoSaver,
}

impl LiveSession {
    pub fn new(backend: Arc<dyn Backend>, options: SessionOptions) -> Self {
        Self {
            autosaver: AutoSaver::new(backend.clone(), options.autosave_debounce),
            backend,
            api_key: options.api_key,
            default_payload: options.payload,
            session: None,
            trajectory: None,
            cursor: 0,
            autoplay: AutoPlay::new(options.autoplay_interval),
            busy: BusyFlag::default(),
            initializing: false,
            pending_query: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.initializing {
            SessionState::Initializing
        } else if self.session.is_none() {
            SessionState::Idle
        } else if self.busy.is_busy() {
            SessionState::Advancing
        } else if self.autoplay.is_playing() {
            SessionState::AutoPlaying
        } else {
            SessionState::Ready
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.autoplay.is_playing()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn autoplay_interval(&self) -> Duration {
        self.autoplay.interval()
    }

    pub fn default_payload(&self) -> &str {
        &self.default_payload
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(Secret::expose)
    }

    // =========================================================================
    // Start
    // =========================================================================

    pub async fn start(&mut self, query: &str, payload: &str) -> Result<(), SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::InvalidInput("query must not be empty".to_string()));
        }
        let Some(api_key) = self.api_key.clone() else {
            return Err(SessionError::InvalidInput(
                "an API key is required to start a session".to_string(),
            ));
        };

        self.autoplay.pause();
        self.initializing = true;
        let result = self
            .backend
            .start_session(Some(api_key.expose()), query, payload)
            .await;
        self.initializing = false;

        let started = match result {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start session");
                self.session = None;
                return Err(SessionError::Initialization(e));
            }
        };

        let mut trajectory = Trajectory::empty(
            started.session_id.clone(),
            LocalizedTitle::same(LIVE_SESSION_TITLE),
            LIVE_TASK_NAME,
        );
        trajectory.user_query = if started.initial_query.is_empty() {
            query.to_string()
        } else {
            started.initial_query
        };
        trajectory.payload = Some(payload.to_string());

        tracing::info!(session_id = %started.session_id, "Session started");
        self.session = Some(Session {
            session_id: started.session_id.clone(),
            trajectory_id: started.session_id,
        });
        self.trajectory = Some(trajectory);
        self.cursor = 0;
        self.pending_query = Some(PendingQuery {
            query: query.to_string(),
            payload: payload.to_string(),
        });
        self.autoplay.play();
        Ok(())
    }

    // =========================================================================
    // Advance
    // =========================================================================

    /// Append a placeholder step and open the step stream.
    pub async fn begin_advance(&mut self) -> Result<Advance, SessionError> {
        let guard = self.busy.try_acquire().ok_or(SessionError::Busy)?;
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or(SessionError::NoSession)?;
        let trajectory = self.trajectory.as_mut().ok_or(SessionError::NoSession)?;

        if merge::is_terminal(&trajectory.steps) {
            tracing::info!(trajectory_id = %trajectory.id, "Both agents finished");
            self.autoplay.pause();
            return Ok(Advance::Terminal);
        }

        let placeholder = merge::placeholder(&trajectory.steps, Some(clock_timestamp()));
        let step_index = trajectory.push_step(placeholder);
        let trajectory_id = trajectory.id.clone();
        self.cursor = (self.cursor + 1).min(trajectory.steps.len());

        let stream = match self.open_stream(&session_id).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(trajectory_id = %trajectory_id, error = %e, "Failed to open step stream");
                self.remove_placeholder(&trajectory_id, step_index);
                self.autoplay.pause();
                return Err(e);
            }
        };

        tracing::debug!(trajectory_id = %trajectory_id, step_index, "Advance started");
        Ok(Advance::Started(PendingAdvance {
            trajectory_id,
            step_index,
            stream,
            received_result: false,
            primary_thought: String::new(),
            baseline_thought: String::new(),
            _guard: guard,
        }))
    }

    async fn open_stream(&mut self, session_id: &str) -> Result<ChunkStream, SessionError> {
        match self.backend.advance_step(session_id).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.is_not_found() => {
                tracing::warn!(session_id, "Session expired on backend, recovering");
                let session_id = self.recover().await?;
                Ok(self.backend.advance_step(&session_id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fold one chunk into the in-progress step. Chunks for a conversation
    /// that is no longer live are dropped.
    pub fn ingest(&mut self, pending: &mut PendingAdvance, chunk: StepChunk) {
        let Some(step) = self
            .trajectory
            .as_mut()
            .filter(|t| t.id == pending.trajectory_id)
            .and_then(|t| t.steps.get_mut(pending.step_index))
        else {
            tracing::debug!(trajectory_id = %pending.trajectory_id, "Dropping chunk for inactive conversation");
            return;
        };

        match chunk {
            StepChunk::Thought { agent, content } => {
                if content.is_empty() {
                    return;
                }
                let accumulated = pending.thought_mut(agent);
                accumulated.push_str(&content);
                merge::track_mut(step, agent).thought = accumulated.clone();
            }
            StepChunk::Result { agent, data } => {
                pending.received_result = true;
                merge::apply_result(step, agent, data);
            }
        }
    }

    /// Finish an advance: roll back an empty placeholder, then either report
    /// the stream failure or schedule an auto-save.
    pub fn complete_advance(
        &mut self,
        pending: PendingAdvance,
        failure: Option<BackendError>,
    ) -> Result<AdvanceReport, SessionError> {
        let step_index = pending.step_index;
        let rolled_back = self
            .trajectory
            .as_ref()
            .filter(|t| t.id == pending.trajectory_id)
            .and_then(|t| t.steps.get(step_index))
            .is_some_and(|step| merge::should_rollback(step, pending.received_result));
        if rolled_back {
            tracing::debug!(step_index, "No data for step, rolling back placeholder");
            self.remove_placeholder(&pending.trajectory_id, step_index);
        }
        drop(pending);

        if let Some(e) = failure {
            tracing::error!(step_index, error = %e, "Step stream interrupted");
            self.autoplay.pause();
            return Err(SessionError::Stream(e));
        }

        self.schedule_autosave();
        Ok(AdvanceReport {
            step_index,
            rolled_back,
        })
    }

    /// Begin, drain and complete one advance.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome, SessionError> {
        let mut pending = match self.begin_advance().await? {
            Advance::Terminal => return Ok(AdvanceOutcome::Terminal),
            Advance::Started(pending) => pending,
        };
        let mut failure = None;
        while let Some(chunk) = pending.next_chunk().await {
            match chunk {
                Ok(chunk) => self.ingest(&mut pending, chunk),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.complete_advance(pending, failure)
            .map(AdvanceOutcome::Completed)
    }

    fn remove_placeholder(&mut self, trajectory_id: &str, step_index: usize) {
        if let Some(trajectory) = self.trajectory.as_mut().filter(|t| t.id == trajectory_id) {
            trajectory.remove_step(step_index);
            self.cursor = self.cursor.min(trajectory.steps.len());
        }
    }

    // =========================================================================
    // Playback
    // =========================================================================

    pub fn play(&mut self) {
        self.autoplay.play();
    }

    pub fn pause(&mut self) {
        self.autoplay.pause();
    }

    /// Auto-play tick. Skipped while paused, unbound or busy.
    pub async fn tick(&mut self) -> Result<Option<Advance>, SessionError> {
        if self.session.is_none() || !self.autoplay.should_fire(self.busy.is_busy()) {
            return Ok(None);
        }
        self.begin_advance().await.map(Some)
    }

    pub fn step_back(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn step_forward(&mut self) {
        let len = self.trajectory.as_ref().map_or(0, |t| t.steps.len());
        self.cursor = (self.cursor + 1).min(len);
    }

    // =========================================================================
    // Continue
    // =========================================================================

    /// Send a user message to the conversation identified by `active_id`.
    pub async fn continue_with(
        &mut self,
        prompt: &str,
        active_id: &str,
        store: &mut ScenarioStore,
    ) -> Result<ContinuePath, SessionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::InvalidInput("message must not be empty".to_string()));
        }
        let _guard = self.busy.try_acquire().ok_or(SessionError::Busy)?;

        if self.session.is_none() {
            self.start_from_message(prompt, store).await?;
            return Ok(ContinuePath::Started);
        }

        let mut restored = false;
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.trajectory_id != active_id)
        {
            self.rebind(active_id, store).await?;
            restored = true;
        }

        let trajectory = self.trajectory.as_mut().ok_or(SessionError::NoSession)?;
        trajectory.push_step(Step::user_input(0, prompt, Some(clock_timestamp())));
        self.cursor = (self.cursor + 1).min(trajectory.steps.len());

        let session_id = self
            .session_id()
            .map(str::to_string)
            .ok_or(SessionError::NoSession)?;
        match self.backend.continue_session(&session_id, prompt).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(session_id = %session_id, "Session expired on backend, recovering");
                let session_id = self.recover().await?;
                self.backend.continue_session(&session_id, prompt).await?;
                restored = true;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Continue failed");
                return Err(e.into());
            }
        }

        self.autoplay.play();
        self.schedule_autosave();
        Ok(ContinuePath::Continued { restored })
    }

    async fn start_from_message(
        &mut self,
        prompt: &str,
        store: &mut ScenarioStore,
    ) -> Result<(), SessionError> {
        let stale_draft = self
            .trajectory
            .as_ref()
            .filter(|t| t.title.en == NEW_CHAT_TITLE_EN && t.id.starts_with(SESSION_ID_PREFIX))
            .map(|t| t.id.clone());

        let payload = self.default_payload.clone();
        self.start(prompt, &payload).await?;

        if let Some(id) = stale_draft
            && let Err(e) = store.delete(&id).await
        {
            tracing::debug!(id = %id, error = %e, "Could not delete empty draft");
        }

        if let Some(trajectory) = self.trajectory.as_mut() {
            trajectory.title = LocalizedTitle::same(truncate_preview(prompt, TITLE_PREVIEW_CHARS));
            if let Err(e) = store.save(trajectory, None).await {
                tracing::warn!(id = %trajectory.id, error = %e, "Failed to save new conversation");
            }
        }
        Ok(())
    }

    /// Point the bound session at `trajectory_id` through a backend restore.
    async fn rebind(
        &mut self,
        trajectory_id: &str,
        store: &ScenarioStore,
    ) -> Result<(), SessionError> {
        let restored = self
            .backend
            .restore_session(self.api_key(), trajectory_id)
            .await
            .map_err(|source| {
                tracing::error!(trajectory_id, error = %source, "Restore failed");
                SessionError::Restore {
                    trajectory_id: trajectory_id.to_string(),
                    source,
                }
            })?;
        tracing::info!(trajectory_id, session_id = %restored.session_id, "Session restored");

        if self.trajectory.as_ref().is_none_or(|t| t.id != trajectory_id)
            && let Some(saved) = store.get(trajectory_id)
        {
            self.cursor = saved.steps.len();
            self.trajectory = Some(saved.clone());
        }
        self.session = Some(Session {
            session_id: restored.session_id,
            trajectory_id: trajectory_id.to_string(),
        });
        Ok(())
    }

    /// Re-establish the backend session after it expired.
    ///
    /// A trajectory that produced steps before the one just appended is
    /// restored; otherwise the session is started again from its query.
    /// The bound session is only replaced once that succeeds.
    async fn recover(&mut self) -> Result<String, SessionError> {
        let trajectory_id = self
            .session
            .as_ref()
            .map(|s| s.trajectory_id.clone())
            .ok_or(SessionError::NoSession)?;
        let trajectory = self.trajectory.as_ref().ok_or(SessionError::NoSession)?;

        let session_id = if trajectory.steps.len() > 1 {
            self.backend
                .restore_session(self.api_key(), &trajectory_id)
                .await
                .map_err(|source| SessionError::Restore {
                    trajectory_id: trajectory_id.clone(),
                    source,
                })?
                .session_id
        } else {
            let query = if trajectory.user_query.is_empty() {
                self.pending_query
                    .as_ref()
                    .map(|p| p.query.clone())
                    .unwrap_or_default()
            } else {
                trajectory.user_query.clone()
            };
            let payload = trajectory
                .payload
                .clone()
                .or_else(|| self.pending_query.as_ref().map(|p| p.payload.clone()))
                .unwrap_or_else(|| self.default_payload.clone());
            self.backend
                .start_session(self.api_key(), &query, &payload)
                .await
                .map_err(SessionError::Initialization)?
                .session_id
        };

        tracing::info!(trajectory_id = %trajectory_id, session_id = %session_id, "Session recovered");
        self.session = Some(Session {
            session_id: session_id.clone(),
            trajectory_id,
        });
        Ok(session_id)
    }

    // =========================================================================
    // Conversation switching
    // =========================================================================

    /// Make a saved trajectory the live one, ready to be continued.
    pub fn adopt(&mut self, trajectory: Trajectory) {
        tracing::debug!(trajectory_id = %trajectory.id, steps = trajectory.steps.len(), "Adopting saved trajectory");
        self.session = Some(Session {
            session_id: trajectory.id.clone(),
            trajectory_id: trajectory.id.clone(),
        });
        self.cursor = trajectory.steps.len();
        self.trajectory = Some(trajectory);
        self.autoplay.pause();
    }

    /// Persist the current conversation and switch to an empty draft.
    /// Returns the draft id.
    pub async fn new_conversation(&mut self, store: &mut ScenarioStore) -> String {
        self.autosaver.cancel();

        if let Some(trajectory) = self.trajectory.as_mut().filter(|t| !t.steps.is_empty()) {
            if trajectory.title.is_placeholder() {
                let history: Vec<HistoryTurn> =
                    trajectory.steps.iter().map(HistoryTurn::from_step).collect();
                match self.backend.generate_title(&history).await {
                    Ok(title) if !title.trim().is_empty() => {
                        trajectory.title = LocalizedTitle::same(title.trim());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Title generation failed"),
                }
                if let Some(title) = derive_title(trajectory) {
                    trajectory.title = title;
                }
            }
            if let Err(e) = store.save(trajectory, None).await {
                tracing::error!(id = %trajectory.id, error = %e, "Failed to save conversation");
            }
        }

        let id = format!("{DRAFT_ID_PREFIX}{}", unix_millis());
        self.trajectory = Some(Trajectory::empty(
            id.clone(),
            LocalizedTitle::new(NEW_CHAT_TITLE_EN, NEW_CHAT_TITLE_ZH),
            NEW_CHAT_TITLE_EN,
        ));
        self.session = None;
        self.pending_query = None;
        self.cursor = 0;
        self.autoplay.pause();
        id
    }

    /// Back to idle
    pub fn reset(&mut self) {
        self.autoplay.pause();
        self.session = None;
        self.trajectory = None;
        self.pending_query = None;
        self.cursor = 0;
    }

    pub fn attach_evaluation(&mut self, result: EvaluationResult) {
        if let Some(trajectory) = self.trajectory.as_mut() {
            trajectory.evaluation = Some(result);
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    fn schedule_autosave(&mut self) {
        if let Some(trajectory) = &self.trajectory {
            self.autosaver.schedule(trajectory.clone());
        }
    }

    /// Wait for a pending auto-save
    pub async fn flush(&mut self, timeout: Duration) {
        if !self.autosaver.is_pending() {
            return;
        }
        tracing::debug!("Waiting for pending auto-save");
        self.autosaver.flush(timeout).await;
    }
}
