//! Streamed step protocol
//!
//! An advance request answers with newline-delimited JSON. Each line is a
//! chunk addressed to one of the two tracks:
//!
//! ```text
//! {"type":"thought","agent":"primary","content":"Let me "}
//! {"type":"result","data":{"agent":"baseline","action":"Finish","done":true, ...}}
//! ```
//!
//! Thought chunks carry incremental text, result chunks carry the structured
//! outcome of the turn. The legacy agent name `watermarked` is an alias of
//! `primary`.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::{DistributionItem, StepMetrics, Watermark, nullable};

/// Lazy, finite, non-restartable sequence of chunks for one advance
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StepChunk, BackendError>> + Send>>;

/// Which execution track a chunk belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    #[default]
    #[serde(alias = "watermarked")]
    Primary,
    Baseline,
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Primary => "primary",
            Agent::Baseline => "baseline",
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of one track's turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(default, deserialize_with = "nullable")]
    pub thought: String,
    #[serde(default, deserialize_with = "nullable")]
    pub action: String,
    #[serde(default, deserialize_with = "nullable")]
    pub observation: String,
    #[serde(default, deserialize_with = "nullable")]
    pub distribution: Vec<DistributionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<Watermark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StepMetrics>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

/// One chunk of a streamed advance
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawChunk")]
pub enum StepChunk {
    /// Incremental thought text, appended in arrival order
    Thought { agent: Agent, content: String },
    /// Replaces the addressed track's structured fields
    Result { agent: Agent, data: StepResult },
}

impl StepChunk {
    pub fn thought(agent: Agent, content: impl Into<String>) -> Self {
        Self::Thought {
            agent,
            content: content.into(),
        }
    }

    pub fn result(agent: Agent, data: StepResult) -> Self {
        Self::Result { agent, data }
    }

    pub fn agent(&self) -> Agent {
        match self {
            Self::Thought { agent, .. } | Self::Result { agent, .. } => *agent,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawChunk {
    Thought {
        #[serde(default)]
        agent: Option<Agent>,
        #[serde(default, deserialize_with = "nullable")]
        content: String,
    },
    Result {
        #[serde(default)]
        agent: Option<Agent>,
        data: StepResult,
    },
}

impl From<RawChunk> for StepChunk {
    fn from(raw: RawChunk) -> Self {
        match raw {
            RawChunk::Thought { agent, content } => StepChunk::Thought {
                agent: agent.unwrap_or_default(),
                content,
            },
            RawChunk::Result { agent, data } => StepChunk::Result {
                agent: agent.or(data.agent).unwrap_or_default(),
                data,
            },
        }
    }
}

// =============================================================================
// NDJSON decoding
// =============================================================================

/// Incremental newline-delimited JSON decoder.
///
/// Bytes are buffered until a newline arrives so that a line split across
/// network reads (or a multi-byte character split across them) decodes
/// intact. Blank lines are skipped; undecodable lines are logged and dropped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    // Prefix of `buffer` already known to hold no newline
    scanned: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every chunk completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StepChunk> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            if let Some(chunk) = decode_line(&self.buffer[start..end]) {
                chunks.push(chunk);
            }
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        chunks
    }

    /// Decode whatever remains once the body has ended
    pub fn finish(&mut self) -> Option<StepChunk> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<StepChunk> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice::<StepChunk>(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            tracing::warn!(
                error = %e,
                line = %String::from_utf8_lossy(line).trim(),
                "Skipping undecodable stream line"
            );
            None
        }
    }
}

/// Turn a byte stream into a chunk stream.
///
/// The returned stream ends when the body ends, or right after yielding the
/// first transport error.
pub fn ndjson_chunks<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<BackendError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = NdjsonDecoder::new();

        while let Some(next) = body.next().await {
            match next {
                Ok(bytes) => {
                    for chunk in decoder.push(bytes.as_ref()) {
                        yield Ok(chunk);
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }

        if let Some(chunk) = decoder.finish() {
            yield Ok(chunk);
        }
    })
}
