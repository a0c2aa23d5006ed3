//! Facade over the live session, saved history and evaluation
//!
//! Decides which trajectory is "active" (shown), keeps the saved copy of the
//! live trajectory in sync after every command and exposes the erasure view
//! for the revealed steps.

use std::borrow::Cow;
use std::sync::Arc;

use agentmark::{
    Backend, BackendError, EvaluationResult, LocalizedTitle, Step, StepChunk, Trajectory,
};

use super::erasure::ErasureView;
use super::evaluation::{EvaluationCoordinator, EvaluationError};
use super::scenarios::{ScenarioStore, StoreError};
use super::session::{
    Advance, AdvanceOutcome, AdvanceReport, ContinuePath, LiveSession, PendingAdvance,
    SessionError, SessionOptions,
};
use crate::core::config::AppConfig;
use crate::core::constants::{
    DEFAULT_LANGUAGE, EMPTY_TRAJECTORY_ID, LIVE_TASK_NAME, MAX_ERASURE_RATE, NEW_SESSION_TITLE_EN,
    NEW_SESSION_TITLE_ZH, NO_CONVERSATION_TITLE_EN, NO_CONVERSATION_TITLE_ZH,
};

pub struct Simulation {
    session: LiveSession,
    store: ScenarioStore,
    evaluation: EvaluationCoordinator,
    active_id: String,
    erasure_rate: u32,
    language: String,
}

impl Simulation {
    pub fn new(backend: Arc<dyn Backend>, config: &AppConfig) -> Self {
        let mut simulation = Self::with_options(
            backend,
            SessionOptions::from_config(config),
            &config.history_scope,
        );
        simulation.set_erasure_rate(config.erasure_rate);
        simulation.language = config.session.language.clone();
        simulation
    }

    pub fn with_options(backend: Arc<dyn Backend>, options: SessionOptions, scope: &str) -> Self {
        Self {
            session: LiveSession::new(backend.clone(), options),
            store: ScenarioStore::new(backend.clone(), scope),
            evaluation: EvaluationCoordinator::new(backend),
            active_id: EMPTY_TRAJECTORY_ID.to_string(),
            erasure_rate: 0,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn session(&self) -> &LiveSession {
        &self.session
    }

    pub fn store(&self) -> &ScenarioStore {
        &self.store
    }

    pub fn evaluation(&self) -> &EvaluationCoordinator {
        &self.evaluation
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn erasure_rate(&self) -> u32 {
        self.erasure_rate
    }

    /// Load the saved history
    pub async fn load(&mut self) {
        self.store.refresh().await;
    }

    // =========================================================================
    // View
    // =========================================================================

    fn live_is_active(&self) -> bool {
        self.session
            .trajectory()
            .is_some_and(|t| t.id == self.active_id)
    }

    /// Live trajectory if it is the active one, else the saved one, else a
    /// placeholder.
    pub fn active_trajectory(&self) -> Cow<'_, Trajectory> {
        if self.active_id.is_empty() {
            return Cow::Owned(Trajectory::empty(
                "",
                LocalizedTitle::new(NO_CONVERSATION_TITLE_EN, NO_CONVERSATION_TITLE_ZH),
                LIVE_TASK_NAME,
            ));
        }
        if let Some(live) = self.session.trajectory().filter(|t| t.id == self.active_id) {
            return Cow::Borrowed(live);
        }
        if let Some(saved) = self.store.get(&self.active_id) {
            return Cow::Borrowed(saved);
        }
        Cow::Owned(Trajectory::empty(
            EMPTY_TRAJECTORY_ID,
            LocalizedTitle::new(NEW_SESSION_TITLE_EN, NEW_SESSION_TITLE_ZH),
            LIVE_TASK_NAME,
        ))
    }

    /// Number of revealed steps of the active trajectory
    pub fn cursor(&self) -> usize {
        if self.live_is_active() {
            self.session.cursor()
        } else {
            0
        }
    }

    pub fn visible_steps(&self) -> Vec<Step> {
        let active = self.active_trajectory();
        let end = self.cursor().min(active.steps.len());
        active.steps[..end].to_vec()
    }

    pub fn erasure(&self) -> ErasureView {
        ErasureView::compute(self.erasure_rate, self.cursor())
    }

    pub fn set_erasure_rate(&mut self, rate: u32) {
        self.erasure_rate = rate.min(MAX_ERASURE_RATE);
    }

    /// Show `id`. A saved trajectory with steps becomes the live one so it
    /// can be continued.
    pub fn select(&mut self, id: &str) {
        self.active_id = id.to_string();
        if self.live_is_active() {
            return;
        }
        if let Some(saved) = self.store.get(id).filter(|t| !t.steps.is_empty()).cloned() {
            self.evaluation.set_cached(saved.evaluation.clone());
            self.session.adopt(saved);
        }
    }

    /// Mirror the live trajectory into the saved history
    fn sync(&mut self) {
        if self.live_is_active()
            && let Some(result) = self.evaluation.cached().cloned()
        {
            self.session.attach_evaluation(result);
        }
        if let Some(live) = self.session.trajectory() {
            self.store.sync_live(live);
        }
    }

    // =========================================================================
    // Session commands
    // =========================================================================

    pub async fn start(&mut self, query: &str, payload: Option<&str>) -> Result<(), SessionError> {
        let payload = payload
            .map(str::to_string)
            .unwrap_or_else(|| self.session.default_payload().to_string());
        self.evaluation.set_cached(None);
        self.session.start(query, &payload).await?;
        if let Some(live) = self.session.trajectory() {
            self.active_id = live.id.clone();
        }
        self.sync();
        Ok(())
    }

    pub async fn advance(&mut self) -> Result<AdvanceOutcome, SessionError> {
        let result = self.session.advance().await;
        self.sync();
        result
    }

    pub async fn begin_advance(&mut self) -> Result<Advance, SessionError> {
        let result = self.session.begin_advance().await;
        self.sync();
        result
    }

    pub fn ingest(&mut self, pending: &mut PendingAdvance, chunk: StepChunk) {
        self.session.ingest(pending, chunk);
        self.sync();
    }

    pub fn complete_advance(
        &mut self,
        pending: PendingAdvance,
        failure: Option<BackendError>,
    ) -> Result<AdvanceReport, SessionError> {
        let result = self.session.complete_advance(pending, failure);
        self.sync();
        result
    }

    pub async fn tick(&mut self) -> Result<Option<Advance>, SessionError> {
        let result = self.session.tick().await;
        self.sync();
        result
    }

    pub fn play(&mut self) {
        self.session.play();
    }

    pub fn pause(&mut self) {
        self.session.pause();
    }

    pub fn step_back(&mut self) {
        self.session.step_back();
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Send a user message to the active conversation.
    pub async fn continue_with(&mut self, prompt: &str) -> Result<ContinuePath, SessionError> {
        let active_id = self.active_id.clone();
        if !self.live_is_active()
            && let Some(saved) = self.store.get(&active_id).cloned()
        {
            self.evaluation.set_cached(saved.evaluation.clone());
            self.session.adopt(saved);
        }
        if self.session.session().is_none() {
            self.evaluation.set_cached(None);
        }

        let result = self
            .session
            .continue_with(prompt, &active_id, &mut self.store)
            .await;
        if let Ok(ContinuePath::Started) = result
            && let Some(live) = self.session.trajectory()
        {
            self.active_id = live.id.clone();
        }
        self.sync();
        result
    }

    /// Persist the current conversation and switch to an empty draft.
    pub async fn new_conversation(&mut self) -> String {
        self.evaluation.set_cached(None);
        let id = self.session.new_conversation(&mut self.store).await;
        self.active_id = id.clone();
        self.sync();
        id
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Drop the live trajectory when its saved copy was deleted, so the next
    /// new conversation does not persist it again.
    fn forget_live_if(&mut self, deleted: impl Fn(&str) -> bool) {
        if self.session.trajectory().is_some_and(|t| deleted(&t.id)) {
            self.session.reset();
        }
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        self.forget_live_if(|live| live == id);
        if id == self.active_id {
            match self.store.list().first().map(|t| t.id.clone()) {
                Some(first) => self.select(&first),
                None => {
                    self.new_conversation().await;
                }
            }
        }
        self.sync();
        Ok(())
    }

    pub async fn batch_delete(&mut self, ids: &[String]) -> Result<u64, StoreError> {
        let deleted = self.store.batch_delete(ids).await?;
        self.forget_live_if(|live| ids.iter().any(|id| id == live));
        if ids.contains(&self.active_id) {
            self.new_conversation().await;
        }
        self.sync();
        Ok(deleted)
    }

    pub async fn clear_all(&mut self) -> Result<u64, StoreError> {
        let deleted = self.store.clear_all().await?;
        self.forget_live_if(|_| true);
        self.new_conversation().await;
        Ok(deleted)
    }

    pub async fn toggle_pin(&mut self, id: &str) -> Result<(), StoreError> {
        self.store.toggle_pin(id).await?;
        self.sync();
        Ok(())
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Score the bound session, or the active trajectory when none is bound.
    pub async fn evaluate(&mut self, force: bool) -> Result<EvaluationResult, EvaluationError> {
        let session_id = self
            .session
            .session_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.active_id.clone());
        let language = self.language.clone();
        let result = self.evaluation.evaluate(&session_id, &language, force).await;
        self.sync();
        result
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = language.to_string();
    }

    pub fn dismiss_evaluation(&mut self) {
        self.evaluation.dismiss();
    }

    /// Wait for a pending auto-save
    pub async fn flush(&mut self, timeout: std::time::Duration) {
        self.session.flush(timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::secret::Secret;
    use crate::domain::testing::{Call, ScriptedBackend, StepScript, evaluation, saved, tool_result};
    use agentmark::Agent;
    use std::time::Duration;

    const FIRST_SESSION: &str = "sess_1700000000_custom";

    fn simulation(backend: &Arc<ScriptedBackend>) -> Simulation {
        let options = SessionOptions {
            api_key: Some(Secret::new("sk-test")),
            autosave_debounce: Duration::from_millis(10),
            ..SessionOptions::default()
        };
        Simulation::with_options(backend.clone(), options, "benchmark")
    }

    fn tool_turn() -> StepScript {
        StepScript::Chunks(vec![
            tool_result(Agent::Primary, "Call: weather"),
            tool_result(Agent::Baseline, "Call: search"),
        ])
    }

    #[tokio::test]
    async fn test_initial_placeholder() {
        let backend = Arc::new(ScriptedBackend::new());
        let sim = simulation(&backend);
        let active = sim.active_trajectory();
        assert_eq!(active.id, "empty-initial");
        assert_eq!(active.title, LocalizedTitle::new("New Session", "新会话"));
        assert!(sim.visible_steps().is_empty());
        assert!(sim.erasure().erased.is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection_placeholder() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut sim = simulation(&backend);
        sim.select("");
        let active = sim.active_trajectory();
        assert_eq!(active.id, "");
        assert_eq!(active.title.zh, "无对话");
    }

    #[tokio::test]
    async fn test_select_adopts_saved_and_loads_evaluation() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut with_eval = saved("sess_10_a", 3);
        with_eval.evaluation = Some(evaluation(9.0, 3.0));
        backend.set_history(vec![with_eval, saved("sess_11_b", 2)]);
        let mut sim = simulation(&backend);
        sim.load().await;

        sim.select("sess_10_a");
        assert_eq!(sim.session().session_id(), Some("sess_10_a"));
        assert_eq!(sim.cursor(), 3);
        assert_eq!(sim.visible_steps().len(), 3);
        assert_eq!(sim.evaluation().cached(), Some(&evaluation(9.0, 3.0)));

        sim.select("sess_11_b");
        assert_eq!(sim.session().session_id(), Some("sess_11_b"));
        assert!(sim.evaluation().cached().is_none());
    }

    #[tokio::test]
    async fn test_live_run_syncs_history_and_erasure() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut sim = simulation(&backend);
        sim.set_erasure_rate(250);
        assert_eq!(sim.erasure_rate(), 100);

        sim.start("weather in Paris", None).await.unwrap();
        assert_eq!(sim.active_id(), FIRST_SESSION);
        backend.push_step(tool_turn());
        sim.advance().await.unwrap();
        sim.flush(Duration::from_secs(1)).await;
        sim.load().await;

        assert_eq!(sim.visible_steps().len(), 1);
        let erased: Vec<usize> = sim.erasure().erased.into_iter().collect();
        assert_eq!(erased, vec![0, 1]);
        assert!(sim.store().get(FIRST_SESSION).is_some());

        backend.push_step(tool_turn());
        sim.advance().await.unwrap();
        assert_eq!(sim.store().get(FIRST_SESSION).unwrap().steps.len(), 2);
    }

    #[tokio::test]
    async fn test_start_uses_default_payload() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut sim = simulation(&backend);
        sim.start("weather", None).await.unwrap();
        assert!(matches!(
            &backend.calls()[0],
            Call::Start { payload, .. } if payload == "1101"
        ));
    }

    #[tokio::test]
    async fn test_delete_active_selects_first_remaining() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_history(vec![saved("sess_10_a", 1), saved("sess_11_b", 2)]);
        let mut sim = simulation(&backend);
        sim.load().await;
        sim.select("sess_10_a");

        sim.delete("sess_10_a").await.unwrap();
        assert_eq!(sim.active_id(), "sess_11_b");
        assert_eq!(sim.session().session_id(), Some("sess_11_b"));

        sim.delete("sess_11_b").await.unwrap();
        assert!(sim.active_id().starts_with("new_"));
        assert_eq!(sim.active_trajectory().title.en, "New Chat");
        assert!(sim.store().list().is_empty());
        assert_eq!(backend.count(|c| matches!(c, Call::Save { .. })), 0);
    }

    #[tokio::test]
    async fn test_delete_other_keeps_selection() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_history(vec![saved("sess_10_a", 1), saved("sess_11_b", 2)]);
        let mut sim = simulation(&backend);
        sim.load().await;
        sim.select("sess_10_a");

        sim.delete("sess_11_b").await.unwrap();
        assert_eq!(sim.active_id(), "sess_10_a");
        assert_eq!(sim.store().list().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_delete_including_active_starts_new_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_history(vec![saved("sess_10_a", 1), saved("sess_11_b", 1)]);
        let mut sim = simulation(&backend);
        sim.load().await;
        sim.select("sess_11_b");

        let deleted = sim
            .batch_delete(&["sess_10_a".to_string(), "sess_11_b".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(sim.active_id().starts_with("new_"));
    }

    #[tokio::test]
    async fn test_clear_all_starts_new_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_history(vec![saved("sess_10_a", 1)]);
        let mut sim = simulation(&backend);
        sim.load().await;

        assert_eq!(sim.clear_all().await.unwrap(), 1);
        assert!(sim.store().list().is_empty());
        assert!(sim.active_id().starts_with("new_"));
    }

    #[tokio::test]
    async fn test_evaluate_attaches_result_to_live() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_history(vec![saved("sess_10_a", 2)]);
        let mut sim = simulation(&backend);
        sim.load().await;
        sim.select("sess_10_a");

        let result = sim.evaluate(false).await.unwrap();
        assert_eq!(result, evaluation(8.0, 6.0));
        assert_eq!(
            sim.active_trajectory().evaluation.as_ref(),
            Some(&evaluation(8.0, 6.0))
        );
        assert_eq!(
            sim.store().get("sess_10_a").unwrap().evaluation.as_ref(),
            Some(&evaluation(8.0, 6.0))
        );
        assert!(backend.calls().contains(&Call::Evaluate {
            session_id: "sess_10_a".to_string(),
            language: "en".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_evaluate_without_anything_selected() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut sim = simulation(&backend);
        sim.select("");
        assert!(matches!(
            sim.evaluate(false).await,
            Err(EvaluationError::MissingSession)
        ));
    }

    #[tokio::test]
    async fn test_continue_saved_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_history(vec![saved("sess_10_a", 2)]);
        let mut sim = simulation(&backend);
        sim.load().await;
        sim.select("sess_10_a");

        let path = sim.continue_with("and tomorrow?").await.unwrap();
        assert_eq!(path, ContinuePath::Continued { restored: false });
        assert_eq!(sim.active_trajectory().steps.len(), 3);
        assert_eq!(sim.store().get("sess_10_a").unwrap().steps.len(), 3);
        assert_eq!(backend.count(|c| matches!(c, Call::Restore { .. })), 0);
    }

    #[tokio::test]
    async fn test_continue_from_draft_starts_session() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut sim = simulation(&backend);
        let draft = sim.new_conversation().await;
        assert_eq!(sim.active_id(), draft);

        let path = sim.continue_with("weather in Paris").await.unwrap();
        assert_eq!(path, ContinuePath::Started);
        assert_eq!(sim.active_id(), FIRST_SESSION);
        assert_eq!(sim.active_trajectory().title.en, "weather in Paris");
        assert!(sim.session().is_playing());
    }
}
