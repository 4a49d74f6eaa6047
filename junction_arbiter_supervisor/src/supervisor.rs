//! Route supervisor.
//!
//! Outside-world facing layer that binds the dispatcher to the junction
//! processor:
//! - one independent worker per dispatched junction (the dispatcher never waits on it)
//! - one report per run, its mutex held only for append + counter update
//! - units of a stopped run finish into that run's report, never the next one
//! - junction-complete and route-complete observers, invoked outside the lock
//!
//! `junction_results` in the report is in completion order. With a tempo faster
//! than evaluation, that differs from dispatch order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use junction_arbiter_core::{Error, FinalReport, JunctionResults, PipelineCfg, Result, Route};

use crate::adapter::Contestant;
use crate::dispatcher::{DispatchEvent, DispatchProgress, Dispatcher};
use crate::observer::{Observer, ObserverId, ObserverRegistry};
use crate::processor::JunctionProcessor;

/// Progress across dispatch and evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupervisorProgress {
    #[serde(flatten)]
    pub dispatch: DispatchProgress,
    pub junctions_processed: usize,
    pub active_units: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Count of junction workers still running.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    changed: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *lock(&self.count) += 1;
    }

    fn end(&self) {
        let mut c = lock(&self.count);
        *c = c.saturating_sub(1);
        self.changed.notify_all();
    }

    fn active(&self) -> usize {
        *lock(&self.count)
    }

    /// Wait until at most `allowed` workers remain. False on timeout.
    fn wait_at_most(&self, allowed: usize, timeout: Duration) -> bool {
        let guard = lock(&self.count);
        let (_guard, res) = self
            .changed
            .wait_timeout_while(guard, timeout, |c| *c > allowed)
            .unwrap_or_else(PoisonError::into_inner);
        !res.timed_out()
    }
}

struct UnitGuard<'a>(&'a InFlight);

impl Drop for UnitGuard<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Everything owned by one run. Units keep the `Arc` of the run that spawned
/// them, so a run stopped and replaced never writes into its successor.
struct RunSlot {
    run_id: u64,
    report: Mutex<FinalReport>,
    inflight: InFlight,
    finalized: AtomicBool,
}

impl RunSlot {
    fn new(run_id: u64, route: &Route) -> Self {
        Self {
            run_id,
            report: Mutex::new(FinalReport::new(route)),
            inflight: InFlight::default(),
            finalized: AtomicBool::new(false),
        }
    }

    fn record(&self, results: JunctionResults) -> bool {
        lock(&self.report).add_junction_result(results)
    }
}

struct Shared {
    current: Mutex<Option<Arc<RunSlot>>>,
    finalize_timeout: Duration,
    junction_observers: ObserverRegistry<JunctionResults>,
    route_observers: ObserverRegistry<FinalReport>,
}

impl Shared {
    fn current(&self) -> Option<Arc<RunSlot>> {
        lock(&self.current).clone()
    }

    fn is_current(&self, run: &RunSlot) -> bool {
        lock(&self.current).as_ref().is_some_and(|c| c.run_id == run.run_id)
    }

    /// Install `run` unless a newer run already took its place.
    fn install(&self, run: Arc<RunSlot>) {
        let mut current = lock(&self.current);
        if current.as_ref().map_or(true, |c| c.run_id < run.run_id) {
            *current = Some(run);
        }
    }

    /// Dispatch observer: launch one worker for the released junction.
    fn spawn_unit(self: &Arc<Self>, processor: &JunctionProcessor, event: &DispatchEvent) -> std::result::Result<(), String> {
        let jid = event.junction.junction_id;
        let run = match self.current() {
            Some(run) if run.run_id == event.run_id => run,
            _ => {
                tracing::debug!(junction_id = jid, run_id = event.run_id, "dropping event from a replaced run");
                return Ok(());
            }
        };
        tracing::info!(
            junction_id = jid,
            index = event.junction_index,
            total = event.total_junctions,
            run_id = run.run_id,
            "spawning junction worker"
        );

        run.inflight.begin();
        let shared = Arc::clone(self);
        let unit_run = Arc::clone(&run);
        let processor = processor.clone();
        let ev = event.clone();
        let spawned = thread::Builder::new()
            .name(format!("junction-unit-j{jid}"))
            .spawn(move || shared.run_unit(&unit_run, &processor, ev));

        match spawned {
            Ok(_) => {
                tracing::debug!(junction_id = jid, active = run.inflight.active(), "junction worker spawned");
                Ok(())
            }
            Err(err) => {
                run.inflight.end();
                tracing::error!(junction_id = jid, error = %err, "failed to spawn junction worker");
                let mut results = JunctionResults::new(event.junction.clone(), event.junction_index);
                results.errors.push(format!("failed to spawn junction worker: {err}"));
                run.record(results.clone());
                self.junction_observers.notify(&results);
                if event.is_last {
                    self.finalize(&run, 0);
                }
                Err(format!("junction {jid}: {}", Error::spawn("junction worker", err)))
            }
        }
    }

    fn run_unit(&self, run: &RunSlot, processor: &JunctionProcessor, event: DispatchEvent) {
        let _guard = UnitGuard(&run.inflight);
        let jid = event.junction.junction_id;

        let results = processor.process(&event.junction, event.junction_index);
        run.record(results.clone());

        match &results.decision {
            Some(d) => tracing::info!(junction_id = jid, winner = %d.winner_kind, score = d.winning_score, "junction winner"),
            None => tracing::warn!(junction_id = jid, errors = results.errors.len(), "no winner selected"),
        }

        if !self.is_current(run) {
            tracing::debug!(junction_id = jid, run_id = run.run_id, "run was replaced; skipping observers");
            return;
        }
        self.junction_observers.notify(&results);

        if event.is_last {
            tracing::info!(junction_id = jid, "last junction processed; finalizing report");
            // This worker is still counted.
            self.finalize(run, 1);
        }
    }

    /// Stamp completion and fire route-complete observers, once per run.
    fn finalize(&self, run: &RunSlot, allowed_in_flight: usize) {
        if !run.inflight.wait_at_most(allowed_in_flight, self.finalize_timeout) {
            tracing::warn!(
                active = run.inflight.active(),
                timeout_ms = self.finalize_timeout.as_millis() as u64,
                "finalizing with junction workers still running"
            );
        }
        if !self.is_current(run) || run.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        let snapshot = {
            let mut report = lock(&run.report);
            report.mark_completed();
            report.clone()
        };

        tracing::info!(
            run_id = run.run_id,
            processed = snapshot.junction_results.len(),
            total = snapshot.total_junctions,
            failed = snapshot.failed_junctions,
            errors = snapshot.total_errors,
            elapsed_ms = snapshot.total_processing_time.as_millis() as u64,
            "route complete"
        );
        self.route_observers.notify(&snapshot);
    }
}

/// Binds one dispatcher to one junction processor and accumulates the report.
pub struct RouteSupervisor {
    dispatcher: Dispatcher,
    processor: JunctionProcessor,
    shared: Arc<Shared>,
}

impl RouteSupervisor {
    pub fn new(
        video: Arc<dyn Contestant>,
        music: Arc<dyn Contestant>,
        history: Arc<dyn Contestant>,
        cfg: PipelineCfg,
    ) -> Result<Self> {
        let processor = JunctionProcessor::new(video, music, history, &cfg)?;
        Self::with_processor(processor, cfg)
    }

    pub fn with_processor(processor: JunctionProcessor, cfg: PipelineCfg) -> Result<Self> {
        cfg.validate()?;
        let dispatcher = Dispatcher::new(cfg.tempo.clone())?;
        let shared = Arc::new(Shared {
            current: Mutex::new(None),
            finalize_timeout: cfg.finalize_timeout(),
            junction_observers: ObserverRegistry::new("junction_complete"),
            route_observers: ObserverRegistry::new("route_complete"),
        });

        let handler_shared = Arc::clone(&shared);
        let handler_processor = processor.clone();
        dispatcher.register_observer(move |event: &DispatchEvent| {
            handler_shared.spawn_unit(&handler_processor, event)
        });

        Ok(Self {
            dispatcher,
            processor,
            shared,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn processor(&self) -> &JunctionProcessor {
        &self.processor
    }

    pub fn interval(&self) -> Duration {
        self.dispatcher.interval()
    }

    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        self.dispatcher.set_interval(interval)
    }

    pub fn on_dispatch<O>(&self, observer: O) -> ObserverId
    where
        O: Observer<DispatchEvent> + 'static,
    {
        self.dispatcher.register_observer(observer)
    }

    pub fn on_junction_complete<O>(&self, observer: O) -> ObserverId
    where
        O: Observer<JunctionResults> + 'static,
    {
        self.shared.junction_observers.register(observer)
    }

    pub fn on_route_complete<O>(&self, observer: O) -> ObserverId
    where
        O: Observer<FinalReport> + 'static,
    {
        self.shared.route_observers.register(observer)
    }

    /// Removes `id` from whichever registry holds it.
    pub fn unregister(&self, id: ObserverId) -> bool {
        self.dispatcher.unregister_observer(id)
            | self.shared.junction_observers.unregister(id)
            | self.shared.route_observers.unregister(id)
    }

    /// Process `route`.
    ///
    /// Blocking: returns the finished report once dispatch and every junction
    /// worker are done. Non-blocking: returns `None` immediately; use
    /// `on_route_complete`.
    pub fn start(&self, route: impl Into<Arc<Route>>, blocking: bool) -> Result<Option<FinalReport>> {
        let route = route.into();
        // The dispatcher's state lock decides who runs; the loser never touches a report.
        let run_id = self.dispatcher.begin(&route)?;
        let run = Arc::new(RunSlot::new(run_id, &route));
        self.shared.install(Arc::clone(&run));

        tracing::info!(
            run_id,
            source = %route.source_address,
            destination = %route.destination_address,
            junctions = route.junction_count(),
            interval_ms = self.interval().as_millis() as u64,
            blocking,
            "route processing started"
        );

        let empty = route.junctions.is_empty();
        self.dispatcher.launch(Arc::clone(&route), run_id, blocking)?;

        if empty {
            self.shared.finalize(&run, 0);
        }
        if !blocking {
            return Ok(None);
        }

        if !run.inflight.wait_at_most(0, self.shared.finalize_timeout) {
            tracing::warn!(active = run.inflight.active(), "returning before every junction finished");
        }
        self.shared.finalize(&run, 0);
        let report = lock(&run.report).clone();
        Ok(Some(report))
    }

    /// Async entry point: the blocking run on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn start_async(self: &Arc<Self>, route: impl Into<Arc<Route>>) -> Result<Option<FinalReport>> {
        let this = Arc::clone(self);
        let route = route.into();
        tokio::task::spawn_blocking(move || this.start(route, true))
            .await
            .map_err(|e| Error::Spawn {
                what: "route task".to_string(),
                reason: e.to_string(),
            })?
    }

    /// Stops future releases; in-flight junctions still finish.
    pub fn pause(&self) -> bool {
        self.dispatcher.pause()
    }

    pub fn resume(&self) -> bool {
        self.dispatcher.resume()
    }

    pub fn stop(&self) {
        self.dispatcher.stop();
    }

    /// Report of the most recently started run.
    pub fn get_report(&self) -> Option<FinalReport> {
        self.shared.current().map(|run| lock(&run.report).clone())
    }

    pub fn get_progress(&self) -> SupervisorProgress {
        let (junctions_processed, active_units) = self.shared.current().map_or((0, 0), |run| {
            (lock(&run.report).junction_results.len(), run.inflight.active())
        });
        SupervisorProgress {
            dispatch: self.dispatcher.progress(),
            junctions_processed,
            active_units,
        }
    }
}
