//! Junction dispatcher: drives the tempo controller across a route and emits
//! one `DispatchEvent` per junction, strictly in index order.
//!
//! There is a single dispatch algorithm (`Inner::run`). The non-blocking entry
//! point runs it on a named thread; the async entry point runs it on tokio's
//! blocking pool.
//!
//! Stop is cooperative: `stop()` bumps a run generation and the loop, which
//! checks it every iteration and every wait slice, exits on mismatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use junction_arbiter_core::{
    Error, Junction, OrchestratorState, Result, Route, Scheduler, TempoCfg, TempoProgress,
};

use crate::observer::{Observer, ObserverId, ObserverRegistry};

/// A released junction, with timing and progress metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_id: Uuid,
    /// Run this event belongs to; bumped by every `start` and `stop`.
    pub run_id: u64,
    pub junction: Junction,

    pub scheduled_at: DateTime<Utc>,
    pub dispatched_at: DateTime<Utc>,
    /// Lateness: actual minus scheduled, zero if on time.
    pub delay: Duration,

    pub junction_index: usize,
    pub total_junctions: usize,
    pub is_first: bool,
    pub is_last: bool,
    pub progress_percent: f64,
    /// Schedule time elapsed at release, paused time excluded.
    pub elapsed: Duration,
    pub remaining_junctions: usize,

    pub previous_junction: Option<Junction>,
    pub next_junction: Option<Junction>,
}

/// Running statistics for the current (or last) run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub total_junctions: usize,
    pub dispatched_count: usize,
    /// Observer failures (errors and panics).
    pub error_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_duration: Duration,
    pub average_dispatch_interval: Duration,
    pub dispatch_times: Vec<DateTime<Utc>>,
}

impl DispatchStats {
    pub fn success_rate(&self) -> f64 {
        if self.dispatched_count == 0 {
            return 0.0;
        }
        self.dispatched_count.saturating_sub(self.error_count) as f64 / self.dispatched_count as f64 * 100.0
    }

    fn close(&mut self) {
        let now = Utc::now();
        self.ended_at = Some(now);
        if let Some(start) = self.started_at {
            self.total_duration = (now - start).to_std().unwrap_or(Duration::ZERO);
        }
        if self.dispatched_count >= 2 {
            let gaps = u32::try_from(self.dispatched_count - 1).unwrap_or(u32::MAX);
            self.average_dispatch_interval = self.total_duration / gaps;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchProgress {
    pub state: OrchestratorState,
    pub dispatched: usize,
    #[serde(flatten)]
    pub tempo: TempoProgress,
}

#[derive(Debug, Default)]
struct RunStats {
    generation: u64,
    stats: DispatchStats,
}

struct Inner {
    scheduler: Scheduler,
    state: Mutex<OrchestratorState>,
    generation: AtomicU64,
    stats: Mutex<RunStats>,
    observers: ObserverRegistry<DispatchEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tempo-controlled junction orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(tempo: TempoCfg) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler: Scheduler::new(tempo)?,
                state: Mutex::new(OrchestratorState::Idle),
                generation: AtomicU64::new(0),
                stats: Mutex::new(RunStats::default()),
                observers: ObserverRegistry::new("dispatch"),
                worker: Mutex::new(None),
            }),
        })
    }

    pub fn register_observer<O>(&self, observer: O) -> ObserverId
    where
        O: Observer<DispatchEvent> + 'static,
    {
        self.inner.observers.register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.unregister(id)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn state(&self) -> OrchestratorState {
        *lock(&self.inner.state)
    }

    pub fn interval(&self) -> Duration {
        self.inner.scheduler.interval()
    }

    /// Takes effect for schedules computed after the call.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        self.inner.scheduler.set_interval(interval)
    }

    /// Start dispatching `route`.
    ///
    /// With `blocking` the loop runs on the caller's thread and this returns
    /// when the run completes or is stopped. Otherwise it returns immediately.
    pub fn start(&self, route: impl Into<Arc<Route>>, blocking: bool) -> Result<()> {
        let route = route.into();
        let run_id = self.begin(&route)?;
        self.launch(route, run_id, blocking)
    }

    /// Idle -> Running: claim a new run id, reset stats and start the clock,
    /// all under the state lock. Nothing is released until [`Dispatcher::launch`].
    pub(crate) fn begin(&self, route: &Route) -> Result<u64> {
        let mut state = lock(&self.inner.state);
        match *state {
            OrchestratorState::Running | OrchestratorState::Paused => return Err(Error::AlreadyRunning),
            s @ (OrchestratorState::Completed | OrchestratorState::Error) => return Err(Error::NotIdle(s)),
            OrchestratorState::Idle => {}
        }
        *state = OrchestratorState::Running;
        let run_id = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        *lock(&self.inner.stats) = RunStats {
            generation: run_id,
            stats: DispatchStats {
                total_junctions: route.junction_count(),
                started_at: Some(Utc::now()),
                ..DispatchStats::default()
            },
        };
        self.inner.scheduler.start();
        Ok(run_id)
    }

    /// Run the loop for a run claimed by [`Dispatcher::begin`].
    pub(crate) fn launch(&self, route: Arc<Route>, run_id: u64, blocking: bool) -> Result<()> {
        if blocking {
            self.inner.run(&route, run_id);
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("junction-dispatch".to_string())
            .spawn(move || inner.run(&route, run_id));

        match spawned {
            Ok(handle) => {
                *lock(&self.inner.worker) = Some(handle);
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn dispatch loop");
                let mut state = lock(&self.inner.state);
                if self.inner.generation.load(Ordering::SeqCst) == run_id {
                    *state = OrchestratorState::Error;
                }
                Err(Error::spawn("dispatch loop", err))
            }
        }
    }

    /// Async entry point: the blocking loop on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn start_async(&self, route: impl Into<Arc<Route>>) -> Result<()> {
        let this = self.clone();
        let route = route.into();
        tokio::task::spawn_blocking(move || this.start(route, true))
            .await
            .map_err(|e| Error::Spawn {
                what: "dispatch task".to_string(),
                reason: e.to_string(),
            })?
    }

    /// Wait for a background run to exit.
    pub fn join(&self) {
        let handle = lock(&self.inner.worker).take();
        if let Some(h) = handle {
            if h.join().is_err() {
                tracing::error!("dispatch loop panicked");
            }
        }
    }

    /// Running -> Paused. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        let mut state = lock(&self.inner.state);
        if *state != OrchestratorState::Running {
            tracing::debug!(state = %*state, "pause ignored");
            return false;
        }
        *state = OrchestratorState::Paused;
        self.inner.scheduler.pause();
        tracing::info!("dispatch paused");
        true
    }

    /// Paused -> Running. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        let mut state = lock(&self.inner.state);
        if *state != OrchestratorState::Paused {
            tracing::debug!(state = %*state, "resume ignored");
            return false;
        }
        *state = OrchestratorState::Running;
        self.inner.scheduler.resume();
        tracing::info!("dispatch resumed");
        true
    }

    /// Force Idle from any state, interrupting a wait in progress. No-op on Idle.
    pub fn stop(&self) {
        let was = {
            let mut state = lock(&self.inner.state);
            let was = *state;
            if was == OrchestratorState::Idle {
                return;
            }
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            *state = OrchestratorState::Idle;
            was
        };
        self.inner.scheduler.resume();

        if was.is_active() {
            let mut run = lock(&self.inner.stats);
            run.stats.close();
        }
        tracing::info!(from = %was, "dispatch stopped");
    }

    pub fn stats(&self) -> DispatchStats {
        lock(&self.inner.stats).stats.clone()
    }

    pub fn progress(&self) -> DispatchProgress {
        let (dispatched, total) = {
            let run = lock(&self.inner.stats);
            (run.stats.dispatched_count, run.stats.total_junctions)
        };
        DispatchProgress {
            state: self.state(),
            dispatched,
            tempo: self.inner.scheduler.progress(dispatched.saturating_sub(1), total),
        }
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn run(&self, route: &Route, generation: u64) {
        let schedule = self.scheduler.plan(&route.junctions);
        let total = schedule.len();
        tracing::info!(
            total,
            source = %route.source_address,
            destination = %route.destination_address,
            "dispatch run started"
        );

        for slot in &schedule {
            if !self.is_current(generation) {
                tracing::info!(index = slot.index, "dispatch loop exiting after stop");
                return;
            }

            let waited = self
                .scheduler
                .wait_until_or_cancel(slot.at, || !self.is_current(generation));
            let Some(waited) = waited else {
                tracing::info!(index = slot.index, "dispatch wait interrupted by stop");
                return;
            };

            let dispatched = Instant::now();
            let index = slot.index;
            let event = DispatchEvent {
                event_id: Uuid::new_v4(),
                run_id: generation,
                junction: slot.junction.clone(),
                scheduled_at: slot.at_wall,
                dispatched_at: Utc::now(),
                delay: dispatched.saturating_duration_since(slot.at),
                junction_index: index,
                total_junctions: total,
                is_first: index == 0,
                is_last: index + 1 == total,
                progress_percent: index as f64 / total as f64 * 100.0,
                elapsed: self.scheduler.elapsed(),
                remaining_junctions: total - index - 1,
                previous_junction: index.checked_sub(1).map(|i| route.junctions[i].clone()),
                next_junction: route.junctions.get(index + 1).cloned(),
            };

            tracing::debug!(
                index,
                junction_id = event.junction.junction_id,
                waited_ms = waited.as_millis() as u64,
                delay_ms = event.delay.as_millis() as u64,
                "releasing junction"
            );

            let failures = self.observers.notify(&event);

            let mut run = lock(&self.stats);
            if run.generation == generation {
                run.stats.dispatched_count += 1;
                run.stats.error_count += failures;
                run.stats.dispatch_times.push(event.dispatched_at);
            }
        }

        let mut state = lock(&self.state);
        if self.is_current(generation) && state.is_active() {
            *state = OrchestratorState::Completed;
            drop(state);
            self.scheduler.resume();
            let mut run = lock(&self.stats);
            run.stats.close();
            tracing::info!(
                dispatched = run.stats.dispatched_count,
                observer_errors = run.stats.error_count,
                "dispatch run completed"
            );
        }
    }
}
