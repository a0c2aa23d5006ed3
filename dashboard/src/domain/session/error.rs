use agentmark::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A step is already in progress")]
    Busy,

    #[error("No session is bound")]
    NoSession,

    #[error("Failed to initialize session: {0}")]
    Initialization(#[source] BackendError),

    #[error("Failed to restore session for {trajectory_id}: {source}")]
    Restore {
        trajectory_id: String,
        #[source]
        source: BackendError,
    },

    /// Transport failure after the stream opened. Partial data is kept.
    #[error("Step stream interrupted: {0}")]
    Stream(#[source] BackendError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SessionError {
    /// The session stays usable after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::Stream(_))
    }
}
