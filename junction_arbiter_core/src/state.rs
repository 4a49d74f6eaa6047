use std::fmt;

/// Lifecycle of a dispatch run.
///
/// `Idle` is the only legal start state. `Completed` and `Error` are terminal
/// until an explicit `stop()` forces the machine back to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl OrchestratorState {
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, OrchestratorState::Running | OrchestratorState::Paused)
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, OrchestratorState::Completed | OrchestratorState::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Running => "running",
            OrchestratorState::Paused => "paused",
            OrchestratorState::Completed => "completed",
            OrchestratorState::Error => "error",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
