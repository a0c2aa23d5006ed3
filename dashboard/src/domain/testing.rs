//! Scripted in-process backend for orchestrator and facade tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use agentmark::{
    Agent, Backend, BackendError, ChunkStream, EvaluationResult, HistoryTurn, LocalizedTitle,
    RestoredSession, StartedSession, Step, StepChunk, StepResult, StepType, TrackState, Trajectory,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

/// Every request the backend received, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start { query: String, payload: String, api_key: Option<String> },
    Restore { trajectory_id: String },
    Advance { session_id: String },
    Continue { session_id: String, message: String },
    Evaluate { session_id: String, language: String },
    GenerateTitle { turns: usize },
    List { scope: String },
    Save { id: Option<String>, title: LocalizedTitle, steps: usize },
    Delete { id: String },
    BatchDelete { ids: Vec<String> },
    ClearAll,
    TogglePin { id: String },
}

/// Scripted outcome of one request
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    NotFound,
    Fail(String),
}

impl Outcome {
    fn into_result(self) -> Result<(), BackendError> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::NotFound => Err(BackendError::not_found("Session not found")),
            Outcome::Fail(msg) => Err(BackendError::status(500, msg)),
        }
    }
}

/// Scripted answer to one advance request
#[derive(Debug, Clone)]
pub enum StepScript {
    Chunks(Vec<StepChunk>),
    ChunksThenError(Vec<StepChunk>, String),
    Open(Outcome),
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    history: Vec<Trajectory>,
    starts: VecDeque<Outcome>,
    restores: VecDeque<Outcome>,
    advances: VecDeque<StepScript>,
    continues: VecDeque<Outcome>,
    evaluations: VecDeque<Result<EvaluationResult, String>>,
    title: Option<String>,
    fail_listing: bool,
    fail_storage: bool,
}

#[derive(Default)]
pub struct ScriptedBackend {
    inner: Mutex<Inner>,
    counter: AtomicU64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_secs(&self) -> u64 {
        1_700_000_000 + self.counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn set_history(&self, history: Vec<Trajectory>) {
        self.inner.lock().history = history;
    }

    pub fn history(&self) -> Vec<Trajectory> {
        self.inner.lock().history.clone()
    }

    pub fn push_start(&self, outcome: Outcome) {
        self.inner.lock().starts.push_back(outcome);
    }

    pub fn push_restore(&self, outcome: Outcome) {
        self.inner.lock().restores.push_back(outcome);
    }

    pub fn push_step(&self, script: StepScript) {
        self.inner.lock().advances.push_back(script);
    }

    pub fn push_continue(&self, outcome: Outcome) {
        self.inner.lock().continues.push_back(outcome);
    }

    pub fn push_evaluation(&self, result: Result<EvaluationResult, String>) {
        self.inner.lock().evaluations.push_back(result);
    }

    pub fn set_title(&self, title: Option<&str>) {
        self.inner.lock().title = title.map(str::to_string);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.inner.lock().fail_listing = fail;
    }

    pub fn fail_storage(&self, fail: bool) {
        self.inner.lock().fail_storage = fail;
    }

    fn record(&self, call: Call) {
        self.inner.lock().calls.push(call);
    }

    fn storage_guard(&self) -> Result<(), BackendError> {
        if self.inner.lock().fail_storage {
            Err(BackendError::status(503, "storage unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn start_session(
        &self,
        api_key: Option<&str>,
        query: &str,
        payload: &str,
    ) -> Result<StartedSession, BackendError> {
        self.record(Call::Start {
            query: query.to_string(),
            payload: payload.to_string(),
            api_key: api_key.map(str::to_string),
        });
        let outcome = self.inner.lock().starts.pop_front().unwrap_or(Outcome::Ok);
        outcome.into_result()?;
        Ok(StartedSession {
            session_id: format!("sess_{}_custom", self.next_secs()),
            initial_query: query.to_string(),
        })
    }

    async fn restore_session(
        &self,
        _api_key: Option<&str>,
        trajectory_id: &str,
    ) -> Result<RestoredSession, BackendError> {
        self.record(Call::Restore {
            trajectory_id: trajectory_id.to_string(),
        });
        let outcome = self.inner.lock().restores.pop_front().unwrap_or(Outcome::Ok);
        outcome.into_result()?;
        Ok(RestoredSession {
            session_id: format!("sess_{}_{}_restored", self.next_secs(), trajectory_id),
            restored_steps: 0,
        })
    }

    async fn advance_step(&self, session_id: &str) -> Result<ChunkStream, BackendError> {
        self.record(Call::Advance {
            session_id: session_id.to_string(),
        });
        let script = self
            .inner
            .lock()
            .advances
            .pop_front()
            .unwrap_or(StepScript::Chunks(Vec::new()));
        let items: Vec<Result<StepChunk, BackendError>> = match script {
            StepScript::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            StepScript::ChunksThenError(chunks, msg) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(BackendError::Stream(msg))))
                .collect(),
            StepScript::Open(outcome) => {
                outcome.into_result()?;
                Vec::new()
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn continue_session(&self, session_id: &str, message: &str) -> Result<(), BackendError> {
        self.record(Call::Continue {
            session_id: session_id.to_string(),
            message: message.to_string(),
        });
        let outcome = self.inner.lock().continues.pop_front().unwrap_or(Outcome::Ok);
        outcome.into_result()
    }

    async fn evaluate_session(
        &self,
        session_id: &str,
        language: &str,
    ) -> Result<EvaluationResult, BackendError> {
        self.record(Call::Evaluate {
            session_id: session_id.to_string(),
            language: language.to_string(),
        });
        match self.inner.lock().evaluations.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(msg)) => Err(BackendError::status(500, msg)),
            None => Ok(evaluation(8.0, 6.0)),
        }
    }

    async fn generate_title(&self, history: &[HistoryTurn]) -> Result<String, BackendError> {
        self.record(Call::GenerateTitle {
            turns: history.len(),
        });
        self.inner
            .lock()
            .title
            .clone()
            .ok_or_else(|| BackendError::status(500, "title model unavailable"))
    }

    async fn list_trajectories(&self, scope: &str) -> Result<Vec<Trajectory>, BackendError> {
        self.record(Call::List {
            scope: scope.to_string(),
        });
        let inner = self.inner.lock();
        if inner.fail_listing {
            return Err(BackendError::status(503, "listing unavailable"));
        }
        Ok(inner.history.clone())
    }

    async fn save_trajectory(
        &self,
        title: &LocalizedTitle,
        trajectory: &Trajectory,
        id: Option<&str>,
    ) -> Result<String, BackendError> {
        self.record(Call::Save {
            id: id.map(str::to_string),
            title: title.clone(),
            steps: trajectory.steps.len(),
        });
        self.storage_guard()?;
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("sess_{}_saved", self.next_secs()));
        let mut stored = trajectory.clone();
        stored.id = id.clone();
        stored.title = title.clone();

        let mut inner = self.inner.lock();
        match inner.history.iter_mut().find(|t| t.id == id) {
            Some(existing) => {
                stored.extra = std::mem::take(&mut existing.extra);
                *existing = stored;
            }
            None => inner.history.insert(0, stored),
        }
        Ok(id)
    }

    async fn delete_trajectory(&self, id: &str) -> Result<(), BackendError> {
        self.record(Call::Delete { id: id.to_string() });
        self.storage_guard()?;
        let mut inner = self.inner.lock();
        let before = inner.history.len();
        inner.history.retain(|t| t.id != id);
        if inner.history.len() == before {
            return Err(BackendError::not_found("Scenario not found"));
        }
        Ok(())
    }

    async fn batch_delete_trajectories(&self, ids: &[String]) -> Result<u64, BackendError> {
        self.record(Call::BatchDelete { ids: ids.to_vec() });
        self.storage_guard()?;
        let mut inner = self.inner.lock();
        let before = inner.history.len();
        inner.history.retain(|t| !ids.contains(&t.id));
        Ok((before - inner.history.len()) as u64)
    }

    async fn clear_all(&self) -> Result<u64, BackendError> {
        self.record(Call::ClearAll);
        self.storage_guard()?;
        let mut inner = self.inner.lock();
        let count = inner.history.len() as u64;
        inner.history.clear();
        Ok(count)
    }

    async fn toggle_pin(&self, id: &str) -> Result<(), BackendError> {
        self.record(Call::TogglePin { id: id.to_string() });
        self.storage_guard()?;
        let mut inner = self.inner.lock();
        let entry = inner
            .history
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BackendError::not_found("Scenario not found"))?;
        let pinned = entry
            .extra
            .get("is_pinned")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        entry.extra.insert("is_pinned".to_string(), json!(!pinned));
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn evaluation(primary: f64, baseline: f64) -> EvaluationResult {
    EvaluationResult {
        primary_score: primary,
        baseline_score: baseline,
        reason: "primary used fewer tool calls".to_string(),
    }
}

/// Saved trajectory with `steps` completed tool turns
pub fn saved(id: &str, steps: usize) -> Trajectory {
    let mut trajectory = Trajectory::empty(id, LocalizedTitle::same(format!("Saved {id}")), "Live Execution");
    trajectory.user_query = format!("query for {id}");
    trajectory.payload = Some("1101".to_string());
    for _ in 0..steps {
        let track = TrackState {
            thought: "looking".to_string(),
            action: "Call: search".to_string(),
            tool_details: "3 results".to_string(),
            step_type: StepType::Tool,
            ..TrackState::default()
        };
        trajectory.push_step(Step {
            primary: track.clone(),
            baseline: Some(track),
            ..Step::default()
        });
    }
    trajectory
}

pub fn thought(agent: Agent, content: &str) -> StepChunk {
    StepChunk::thought(agent, content)
}

/// Result chunk for a non-terminal tool turn
pub fn tool_result(agent: Agent, action: &str) -> StepChunk {
    StepChunk::result(
        agent,
        StepResult {
            agent: Some(agent),
            thought: String::new(),
            action: action.to_string(),
            observation: "ok".to_string(),
            ..StepResult::default()
        },
    )
}

/// Result chunk that finishes the track
pub fn finish_result(agent: Agent, answer: &str) -> StepChunk {
    StepChunk::result(
        agent,
        StepResult {
            agent: Some(agent),
            thought: "I know the answer".to_string(),
            action: "Finish".to_string(),
            done: true,
            final_answer: Some(answer.to_string()),
            ..StepResult::default()
        },
    )
}
