//! Contestant adapter layer: the seam to the content-search collaborators.
//!
//! Evaluators only produce a `Recommendation` (or an error). This module turns
//! that, or a panic, into a stamped `ContestantResult` so a slot is never lost.
//!
//! - No IO of its own
//! - No policy (scoring lives in the core judge)

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use junction_arbiter_core::{ContestantKind, ContestantResult, Junction, Recommendation};

/// Failure reported by an evaluator. Carried into the result as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ContestantError(pub String);

impl ContestantError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for ContestantError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContestantError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trait: one content evaluator (video search, music search, history lookup...).
///
/// Network calls, caching and credentials are entirely the implementor's concern.
pub trait Contestant: Send + Sync {
    /// Display name recorded on results.
    fn name(&self) -> &str;

    fn evaluate(&self, junction: &Junction) -> Result<Recommendation, ContestantError>;
}

/// Closure-backed contestant.
pub struct FnContestant<F> {
    name: String,
    f: F,
}

impl<F> FnContestant<F>
where
    F: Fn(&Junction) -> Result<Recommendation, ContestantError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Convenience: wrap straight into the shared handle the processor wants.
    pub fn shared(name: impl Into<String>, f: F) -> Arc<dyn Contestant>
    where
        F: 'static,
    {
        Arc::new(Self::new(name, f))
    }
}

impl<F> Contestant for FnContestant<F>
where
    F: Fn(&Junction) -> Result<Recommendation, ContestantError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, junction: &Junction) -> Result<Recommendation, ContestantError> {
        (self.f)(junction)
    }
}

/// Run one contestant with timing. Errors and panics both become failure results.
pub fn run_contestant(kind: ContestantKind, contestant: &dyn Contestant, junction: &Junction) -> ContestantResult {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| contestant.evaluate(junction)));
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let result = match outcome {
        Ok(Ok(rec)) => ContestantResult::success(kind, contestant.name(), junction, rec),
        Ok(Err(err)) => ContestantResult::failure(kind, contestant.name(), junction, err.to_string()),
        Err(payload) => {
            ContestantResult::failure(kind, contestant.name(), junction, panic_message(payload.as_ref()))
        }
    };
    result.with_processing_time_ms(elapsed_ms)
}

/// Best-effort text for a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
