//! junction_arbiter_supervisor
//!
//! Outside-world facing orchestration layer for `junction_arbiter_core`.
//!
//! Responsibilities:
//! - release junctions on tempo (dispatcher)
//! - run the three contestants per junction under a shared budget (processor)
//! - collect every junction into one thread-safe route report (supervisor)
//! - fan events out to registered observers, isolating their failures
//!
//! Non-goals:
//! - no IO (contestants own their network calls)
//! - no scoring policy (lives in core)

pub mod adapter;
pub mod dispatcher;
pub mod observer;
pub mod processor;
pub mod supervisor;

pub use adapter::{run_contestant, Contestant, ContestantError, FnContestant};

pub use dispatcher::{DispatchEvent, DispatchProgress, DispatchStats, Dispatcher};

pub use observer::{Observer, ObserverId, ObserverRegistry};

pub use processor::{JunctionProcessor, NO_RESULTS_ERROR};

pub use supervisor::{RouteSupervisor, SupervisorProgress};
