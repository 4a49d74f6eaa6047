use thiserror::Error;

use crate::state::OrchestratorState;

/// Errors surfaced by the pipeline.
///
/// Contestant and observer failures are not here: they are captured as data
/// (`ContestantResult::error`) or logged and counted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Bad tempo / pipeline parameters. Fatal at construction.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// `start` called while a run is Running or Paused.
    #[error("dispatcher is already running")]
    AlreadyRunning,

    /// `start` called from a terminal state. `stop()` resets to Idle.
    #[error("dispatcher cannot start from state {0}")]
    NotIdle(OrchestratorState),

    /// Arbiter called with an empty candidate list.
    #[error("no candidates to evaluate")]
    NoCandidates,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn {what}: {reason}")]
    Spawn { what: String, reason: String },
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    pub fn spawn(what: impl Into<String>, err: std::io::Error) -> Self {
        Error::Spawn {
            what: what.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
