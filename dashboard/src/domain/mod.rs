//! Session orchestration core
//!
//! - `erasure` - deterministic erasure mask over revealed steps
//! - `scenarios` - saved-history collection
//! - `evaluation` - judge scoring with a single cached result
//! - `session` - live session orchestrator (start, stream, continue, recover)
//! - `simulation` - facade choosing the active trajectory and keeping history in sync

pub mod erasure;
pub mod evaluation;
pub mod scenarios;
pub mod session;
pub mod simulation;

#[cfg(test)]
pub(crate) mod testing;

pub use erasure::{ErasureView, erased_indices};
pub use evaluation::{EvaluationCoordinator, EvaluationError};
pub use scenarios::{ScenarioStore, StoreError};
pub use session::{
    Advance, AdvanceOutcome, AdvanceReport, ContinuePath, LiveSession, PendingAdvance, Session,
    SessionError, SessionOptions, SessionState,
};
pub use simulation::Simulation;
