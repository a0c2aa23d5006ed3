//! Persisted data model shared by the dashboard and the execution backend
//!
//! Every type here serializes to the exact JSON shape the dashboard stores:
//! camelCase keys, the primary track flattened into the step record and the
//! baseline track nested under `baseline`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Id prefix used by the backend for live sessions (`sess_<unixSeconds>_<suffix>`)
pub const SESSION_ID_PREFIX: &str = "sess_";

/// Id prefix for local drafts that have not been persisted yet
pub const DRAFT_ID_PREFIX: &str = "new_";

/// Titles that mean "nobody named this conversation yet"
pub const PLACEHOLDER_TITLES: &[&str] = &["Live Session", "New Session", "New Chat"];

/// Deserialize `null` as the type's default value.
///
/// Stored trajectories come from several producers and some of them write
/// `null` where the dashboard writes an empty string or array.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn is_false(value: &bool) -> bool {
    !*value
}

// =============================================================================
// Step
// =============================================================================

/// Kind of turn a track produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Tool,
    Finish,
    UserInput,
    Other,
}

/// One candidate token and its probability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionItem {
    pub name: String,
    pub prob: f64,
    #[serde(default)]
    pub is_selected: bool,
}

/// Side-channel metadata attached to a primary-track step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    #[serde(default, deserialize_with = "nullable")]
    pub bits: String,
    #[serde(default, deserialize_with = "nullable")]
    pub matrix_rows: Vec<Vec<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rank_contribution: f64,
}

/// Latency (seconds) and token usage of one turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub tokens: f64,
}

/// State of one execution track (primary or baseline) within a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackState {
    #[serde(default, deserialize_with = "nullable")]
    pub thought: String,
    #[serde(default, deserialize_with = "nullable")]
    pub action: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tool_details: String,
    #[serde(default, deserialize_with = "nullable")]
    pub distribution: Vec<DistributionItem>,
    #[serde(default)]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StepMetrics>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_false")]
    pub is_hidden: bool,
}

impl TrackState {
    /// Track that terminated: explicit `finish` or a non-empty final answer
    pub fn is_done(&self) -> bool {
        self.step_type == StepType::Finish
            || self.final_answer.as_deref().is_some_and(|a| !a.is_empty())
    }

    /// Track state for a user message
    pub fn user_input(message: &str) -> Self {
        Self {
            thought: message.to_string(),
            step_type: StepType::UserInput,
            ..Self::default()
        }
    }
}

/// One turn of execution, addressed by its position in the trajectory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub primary: TrackState,
    #[serde(default, deserialize_with = "nullable")]
    pub watermark: Watermark,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<TrackState>,
}

impl Step {
    /// A user message, mirrored into both tracks
    pub fn user_input(step_index: usize, message: &str, timestamp: Option<String>) -> Self {
        Self {
            step_index,
            timestamp,
            primary: TrackState::user_input(message),
            watermark: Watermark::default(),
            baseline: Some(TrackState::user_input(message)),
        }
    }

    pub fn is_user_input(&self) -> bool {
        self.primary.step_type == StepType::UserInput
    }

    /// Both tracks finished or hidden
    pub fn is_done(&self) -> bool {
        let primary = self.primary.is_hidden || self.primary.is_done();
        let baseline = self
            .baseline
            .as_ref()
            .is_some_and(|b| b.is_hidden || b.is_done());
        primary && baseline
    }
}

// =============================================================================
// Trajectory
// =============================================================================

/// Bilingual conversation title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TitleRepr")]
pub struct LocalizedTitle {
    pub en: String,
    pub zh: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TitleRepr {
    Text(String),
    Pair {
        #[serde(default)]
        en: String,
        #[serde(default)]
        zh: String,
    },
}

impl From<TitleRepr> for LocalizedTitle {
    fn from(repr: TitleRepr) -> Self {
        match repr {
            TitleRepr::Text(text) => Self::same(text),
            TitleRepr::Pair { en, zh } => Self { en, zh },
        }
    }
}

impl LocalizedTitle {
    pub fn new(en: impl Into<String>, zh: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            zh: zh.into(),
        }
    }

    /// Same text for every language
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            en: text.clone(),
            zh: text,
        }
    }

    /// Empty or one of the default titles
    pub fn is_placeholder(&self) -> bool {
        self.en.is_empty() || PLACEHOLDER_TITLES.contains(&self.en.as_str())
    }
}

/// Judge scores for the two tracks of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "model_a_score")]
    pub primary_score: f64,
    #[serde(rename = "model_b_score")]
    pub baseline_score: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub reason: String,
}

/// A persisted or in-progress conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    pub id: String,
    #[serde(default)]
    pub title: LocalizedTitle,
    #[serde(default, deserialize_with = "nullable")]
    pub task_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user_query: String,
    #[serde(default, deserialize_with = "nullable")]
    pub total_steps: usize,
    #[serde(default, deserialize_with = "nullable")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Server-side fields this client does not interpret (pin flag, scope, ...)
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Trajectory {
    /// Empty trajectory with the given id and title
    pub fn empty(id: impl Into<String>, title: LocalizedTitle, task_name: &str) -> Self {
        Self {
            id: id.into(),
            title,
            task_name: task_name.to_string(),
            ..Self::default()
        }
    }

    /// Append a step at the next index and keep `totalSteps` in sync
    pub fn push_step(&mut self, mut step: Step) -> usize {
        let index = self.steps.len();
        step.step_index = index;
        self.steps.push(step);
        self.total_steps = self.steps.len();
        index
    }

    /// Drop the step at `index` (only ever the last one) and resync `totalSteps`
    pub fn remove_step(&mut self, index: usize) -> Option<Step> {
        if index >= self.steps.len() {
            return None;
        }
        let step = self.steps.remove(index);
        self.total_steps = self.steps.len();
        Some(step)
    }

    /// Not yet persisted under a backend id
    pub fn is_draft(&self) -> bool {
        self.id.starts_with(DRAFT_ID_PREFIX) || self.id.starts_with("new-")
    }

    /// Creation time, from the explicit field or the id convention
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| created_at_from_id(&self.id))
    }
}

/// Parse the creation time embedded in a `sess_<unixSeconds>_<suffix>` id.
pub fn created_at_from_id(id: &str) -> Option<DateTime<Utc>> {
    let rest = id.strip_prefix(SESSION_ID_PREFIX)?;
    let secs = rest.split('_').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// One conversation turn sent to the title generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub message: String,
}

impl HistoryTurn {
    /// Summarize a step the way the title generator expects it
    pub fn from_step(step: &Step) -> Self {
        let role = match step.primary.step_type {
            StepType::UserInput => "user",
            StepType::Tool => "tool",
            StepType::Finish | StepType::Other => "assistant",
        };
        let track = &step.primary;
        let message = [&track.thought, &track.tool_details, &track.action]
            .into_iter()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default();
        Self {
            role: role.to_string(),
            message,
        }
    }
}
