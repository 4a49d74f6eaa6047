//! junction_arbiter_core
//!
//! Pure pieces of the junction pipeline:
//! - route and candidate data model
//! - tempo controller (release timing, pause-aware elapsed time)
//! - the judge that picks one winner per junction
//! - per-junction and per-route reports
//!
//! No threads are spawned here; the supervisor crate owns concurrency.

pub mod junction;
pub mod evidence;

pub mod cfg;
pub mod decide;
pub mod error;
pub mod report;
pub mod state;
pub mod tempo;

pub use junction::{Coordinates, Junction, Route, TurnDirection};
pub use evidence::{ContestantKind, ContestantResult, Recommendation};

pub use cfg::{ArbiterCfg, DispatchMode, PipelineCfg, TempoCfg, MAX_CFG_SECS};
pub use decide::{Arbiter, ArbiterDecision, ALL_FAILED_REASONING};
pub use error::{Error, Result};
pub use report::{FinalReport, JunctionResults};
pub use state::OrchestratorState;
pub use tempo::{ScheduledJunction, Scheduler, TempoProgress};
