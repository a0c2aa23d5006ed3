//! reqwest implementation of [`Backend`] against the dashboard server's JSON API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::backend::{Backend, RestoredSession, StartedSession};
use crate::chunk::{ChunkStream, ndjson_chunks};
use crate::error::BackendError;
use crate::types::{EvaluationResult, HistoryTurn, LocalizedTitle, Trajectory};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Backend reached over HTTP.
///
/// Non-streaming calls use the configured request timeout. The step stream
/// only has a connect timeout since a single turn may run for minutes.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| BackendError::Config(format!("invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "base URL '{}' cannot carry paths",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(format!("agentmark/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(base_url = %base_url, timeout_secs = timeout.as_secs(), "HTTP backend initialized");
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/api/<segments...>`, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::Config(format!("invalid base URL '{}'", self.base_url)))?;
            path.pop_if_empty().push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).timeout(self.timeout)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let resp = check_status(builder.send().await?).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), BackendError> {
        check_status(builder.send().await?).await?;
        Ok(())
    }
}

/// Map a non-2xx response onto [`BackendError`], preferring the server's
/// `detail` message over the raw body.
async fn check_status(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = error_detail(&body)
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    tracing::debug!(status = status.as_u16(), message = %message, "Backend request failed");
    if status == StatusCode::NOT_FOUND {
        Err(BackendError::NotFound(message))
    } else {
        Err(BackendError::status(status.as_u16(), message))
    }
}

fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    session_id: String,
    #[serde(default)]
    task: Option<TaskInfo>,
}

#[derive(Deserialize)]
struct TaskInfo {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoreResponse {
    session_id: String,
    #[serde(default)]
    restored_steps: usize,
}

#[derive(Deserialize)]
struct SaveResponse {
    id: String,
}

#[derive(Deserialize)]
struct DeleteCountResponse {
    #[serde(default)]
    deleted_count: u64,
}

#[derive(Deserialize)]
struct TitleResponse {
    title: String,
}

#[async_trait]
impl Backend for HttpBackend {
    async fn start_session(
        &self,
        api_key: Option<&str>,
        query: &str,
        payload: &str,
    ) -> Result<StartedSession, BackendError> {
        let url = self.url(&["init_custom"])?;
        let body = json!({ "apiKey": api_key, "query": query, "payload": payload });
        let resp: InitResponse = self.send_json(self.request(Method::POST, url).json(&body)).await?;

        tracing::debug!(session_id = %resp.session_id, "Session started");
        Ok(StartedSession {
            initial_query: resp
                .task
                .and_then(|t| t.query)
                .unwrap_or_else(|| query.to_string()),
            session_id: resp.session_id,
        })
    }

    async fn restore_session(
        &self,
        api_key: Option<&str>,
        trajectory_id: &str,
    ) -> Result<RestoredSession, BackendError> {
        let url = self.url(&["restore_session"])?;
        let body = json!({ "apiKey": api_key, "scenarioId": trajectory_id });
        let resp: RestoreResponse = self.send_json(self.request(Method::POST, url).json(&body)).await?;

        tracing::debug!(
            trajectory_id,
            session_id = %resp.session_id,
            restored_steps = resp.restored_steps,
            "Session restored"
        );
        Ok(RestoredSession {
            session_id: resp.session_id,
            restored_steps: resp.restored_steps,
        })
    }

    async fn advance_step(&self, session_id: &str) -> Result<ChunkStream, BackendError> {
        let url = self.url(&["step"])?;
        let resp = self
            .client
            .post(url)
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(ndjson_chunks(resp.bytes_stream()))
    }

    async fn continue_session(&self, session_id: &str, message: &str) -> Result<(), BackendError> {
        let url = self.url(&["continue"])?;
        let body = json!({ "sessionId": session_id, "prompt": message });
        self.send_empty(self.request(Method::POST, url).json(&body)).await
    }

    async fn evaluate_session(
        &self,
        session_id: &str,
        language: &str,
    ) -> Result<EvaluationResult, BackendError> {
        let url = self.url(&["evaluate"])?;
        let body = json!({ "sessionId": session_id, "language": language });
        self.send_json(self.request(Method::POST, url).json(&body)).await
    }

    async fn generate_title(&self, history: &[HistoryTurn]) -> Result<String, BackendError> {
        let url = self.url(&["generate_title"])?;
        let body = json!({ "history": history });
        let resp: TitleResponse = self.send_json(self.request(Method::POST, url).json(&body)).await?;
        Ok(resp.title)
    }

    async fn list_trajectories(&self, scope: &str) -> Result<Vec<Trajectory>, BackendError> {
        let mut url = self.url(&["scenarios"])?;
        url.query_pairs_mut().append_pair("type", scope);
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn save_trajectory(
        &self,
        title: &LocalizedTitle,
        trajectory: &Trajectory,
        id: Option<&str>,
    ) -> Result<String, BackendError> {
        let url = self.url(&["save_scenario"])?;
        let body = json!({ "title": title, "data": trajectory, "id": id });
        let resp: SaveResponse = self.send_json(self.request(Method::POST, url).json(&body)).await?;
        Ok(resp.id)
    }

    async fn delete_trajectory(&self, id: &str) -> Result<(), BackendError> {
        let url = self.url(&["scenarios", id])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    async fn batch_delete_trajectories(&self, ids: &[String]) -> Result<u64, BackendError> {
        let url = self.url(&["scenarios", "batch_delete"])?;
        let resp: DeleteCountResponse = self
            .send_json(self.request(Method::POST, url).json(&json!({ "ids": ids })))
            .await?;
        Ok(resp.deleted_count)
    }

    async fn clear_all(&self) -> Result<u64, BackendError> {
        let url = self.url(&["scenarios", "clear_all"])?;
        let resp: DeleteCountResponse = self.send_json(self.request(Method::DELETE, url)).await?;
        Ok(resp.deleted_count)
    }

    async fn toggle_pin(&self, id: &str) -> Result<(), BackendError> {
        let url = self.url(&["scenarios", id, "toggle_pin"])?;
        self.send_empty(self.request(Method::POST, url)).await
    }
}
