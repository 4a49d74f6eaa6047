#![cfg(feature = "async")]

mod common;

use std::sync::Arc;

use common::*;
use junction_arbiter_core::{ContestantKind, OrchestratorState};
use junction_arbiter_supervisor::{Dispatcher, RouteSupervisor};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisor_runs_on_the_blocking_pool() {
    let sup = Arc::new(
        RouteSupervisor::new(
            fixed("video", "v", 40.0),
            fixed("music", "m", 95.0),
            fixed("history", "h", 70.0),
            cfg(10, 1_000),
        )
        .unwrap(),
    );

    let report = sup.start_async(route(3)).await.unwrap().unwrap();
    assert_eq!(report.junction_results.len(), 3);
    assert_eq!(report.wins_for(ContestantKind::Music), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_async_entry_completes() {
    let d = Dispatcher::new(tempo(5)).unwrap();
    d.start_async(route(2)).await.unwrap();
    assert_eq!(d.state(), OrchestratorState::Completed);
    assert_eq!(d.stats().dispatched_count, 2);
}
