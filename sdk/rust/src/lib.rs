//! # AgentMark
//!
//! Client SDK for the AgentMark dashboard backend.
//!
//! The backend runs a primary (payload-carrying) agent and a baseline agent
//! side by side and streams every turn of both tracks back as
//! newline-delimited JSON. This crate provides:
//!
//! - [`types`]: the persisted trajectory model, in the exact JSON shape the
//!   dashboard stores
//! - [`chunk`]: the streamed step protocol and its incremental decoder
//! - [`Backend`]: the logical operations a client needs, as an async trait
//! - [`HttpBackend`]: the reqwest implementation of [`Backend`]
//!
//! ```no_run
//! use agentmark::{Backend, HttpBackend};
//! use futures::StreamExt;
//!
//! # async fn run() -> Result<(), agentmark::BackendError> {
//! let backend = HttpBackend::new("http://127.0.0.1:8000")?;
//! let session = backend.start_session(None, "weather in Paris", "1011").await?;
//! let mut chunks = backend.advance_step(&session.session_id).await?;
//! while let Some(chunk) = chunks.next().await {
//!     println!("{:?}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod chunk;
pub mod error;
pub mod http;
pub mod types;

pub use backend::{Backend, RestoredSession, StartedSession};
pub use chunk::{Agent, ChunkStream, NdjsonDecoder, StepChunk, StepResult};
pub use error::BackendError;
pub use http::HttpBackend;
pub use types::{
    DRAFT_ID_PREFIX, DistributionItem, EvaluationResult, HistoryTurn, LocalizedTitle,
    PLACEHOLDER_TITLES, SESSION_ID_PREFIX, Step, StepMetrics, StepType, TrackState, Trajectory,
    Watermark,
};
