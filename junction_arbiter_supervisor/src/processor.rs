//! Junction processor: fan out to the three contestants, fan back in under a
//! shared time budget, and hand whatever arrived to the judge.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;

use junction_arbiter_core::{
    Arbiter, ContestantKind, ContestantResult, Error, Junction, JunctionResults, PipelineCfg, Result,
};

use crate::adapter::{panic_message, run_contestant, Contestant};

pub const NO_RESULTS_ERROR: &str = "No agent results to evaluate";

/// Processes single junctions. Cheap to clone; clones share contestants.
#[derive(Clone)]
pub struct JunctionProcessor {
    contestants: Arc<[(ContestantKind, Arc<dyn Contestant>)]>,
    arbiter: Arc<Arbiter>,
    timeout: Duration,
    max_concurrent: usize,
}

impl JunctionProcessor {
    pub fn new(
        video: Arc<dyn Contestant>,
        music: Arc<dyn Contestant>,
        history: Arc<dyn Contestant>,
        cfg: &PipelineCfg,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            contestants: Arc::from(vec![
                (ContestantKind::Video, video),
                (ContestantKind::Music, music),
                (ContestantKind::History, history),
            ]),
            arbiter: Arc::new(Arbiter::new(cfg.arbiter.clone())),
            timeout: cfg.contestant_timeout(),
            max_concurrent: cfg.max_concurrent_junctions,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// Run every contestant on `junction` and judge the results.
    ///
    /// Never fails: missing contestants and judge problems end up in
    /// `JunctionResults::errors`.
    pub fn process(&self, junction: &Junction, index: usize) -> JunctionResults {
        let started = Instant::now();
        let jid = junction.junction_id;
        tracing::info!(junction_id = jid, index, address = %junction.address, "processing junction");

        let mut results = JunctionResults::new(junction.clone(), index);
        results.started_at = Some(Utc::now());

        let expected = self.contestants.len();
        let (tx, rx) = mpsc::sync_channel::<ContestantResult>(expected);

        for (kind, contestant) in self.contestants.iter() {
            let kind = *kind;
            let agent_name = contestant.name().to_string();
            let worker_tx = tx.clone();
            let contestant = Arc::clone(contestant);
            let j = junction.clone();

            let spawned = thread::Builder::new()
                .name(format!("contestant-{kind}-j{jid}"))
                .spawn(move || {
                    let r = run_contestant(kind, contestant.as_ref(), &j);
                    tracing::debug!(
                        junction_id = j.junction_id,
                        %kind,
                        ok = r.is_success(),
                        elapsed_ms = r.processing_time_ms,
                        "contestant finished"
                    );
                    // Receiver is gone if the budget already expired.
                    let _ = worker_tx.send(r);
                });

            if let Err(err) = spawned {
                tracing::error!(junction_id = jid, %kind, error = %err, "failed to spawn contestant thread");
                let failed = ContestantResult::failure(
                    kind,
                    agent_name,
                    junction,
                    format!("failed to spawn contestant thread: {err}"),
                );
                let _ = tx.try_send(failed);
            }
        }
        drop(tx);

        // One budget for all three: a slow first arrival eats into the rest.
        let deadline = started + self.timeout;
        let mut received: Vec<ContestantResult> = Vec::with_capacity(expected);
        while received.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(r) => received.push(r),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        received.extend(rx.try_iter());

        // Judge in kind order so ties break the same way every run.
        received.sort_by_key(|r| r.kind);

        for r in &received {
            *results.slot_mut(r.kind) = Some(r.clone());
        }

        for (kind, _) in self.contestants.iter() {
            if results.slot(*kind).is_none() {
                let msg = format!("{kind} agent timed out");
                tracing::warn!(junction_id = jid, %kind, timeout_ms = self.timeout.as_millis() as u64, "{msg}");
                results.errors.push(msg);
            }
        }

        tracing::info!(junction_id = jid, received = received.len(), expected, "collected contestant results");

        if received.is_empty() {
            tracing::error!(junction_id = jid, "{NO_RESULTS_ERROR}");
            results.errors.push(NO_RESULTS_ERROR.to_string());
        } else {
            match self.arbiter.evaluate(junction, &received) {
                Ok(decision) => {
                    tracing::info!(
                        junction_id = jid,
                        winner = %decision.winner_kind,
                        score = decision.winning_score,
                        "judge selected winner"
                    );
                    results.decision = Some(decision);
                    results.is_complete = true;
                }
                Err(err) => {
                    tracing::error!(junction_id = jid, error = %err, "judge failed");
                    results.errors.push(format!("Judge error: {err}"));
                }
            }
        }

        results.completed_at = Some(Utc::now());
        results.total_processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            junction_id = jid,
            elapsed_ms = results.total_processing_time_ms,
            complete = results.is_complete,
            "junction processed"
        );
        results
    }

    /// Process on a background thread and hand the result to `callback`.
    pub fn process_async<F>(&self, junction: Junction, index: usize, callback: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(JunctionResults) + Send + 'static,
    {
        let this = self.clone();
        let jid = junction.junction_id;
        thread::Builder::new()
            .name(format!("junction-processor-j{jid}"))
            .spawn(move || {
                let results = this.process(&junction, index);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(results))) {
                    tracing::warn!(
                        junction_id = jid,
                        error = %panic_message(payload.as_ref()),
                        "junction callback panicked"
                    );
                }
            })
            .map_err(|e| Error::spawn("junction processor", e))
    }

    /// Process many junctions on a bounded pool. Output is in input order,
    /// whatever order the junctions finish in.
    pub fn process_batch<F>(&self, junctions: &[Junction], on_complete: F) -> Vec<JunctionResults>
    where
        F: Fn(&JunctionResults) + Sync,
    {
        let total = junctions.len();
        let mut slots: Vec<Option<JunctionResults>> = vec![None; total];
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, JunctionResults)>();

        thread::scope(|s| {
            for worker in 0..self.max_concurrent.min(total) {
                let tx = tx.clone();
                let next = &next;
                let on_complete = &on_complete;
                let spawned = thread::Builder::new()
                    .name(format!("junction-batch-{worker}"))
                    .spawn_scoped(s, move || loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(junction) = junctions.get(i) else {
                            break;
                        };
                        let r = self.process(junction, i);
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_complete(&r))) {
                            tracing::warn!(
                                junction_id = junction.junction_id,
                                error = %panic_message(payload.as_ref()),
                                "batch completion callback panicked"
                            );
                        }
                        if tx.send((i, r)).is_err() {
                            break;
                        }
                    });
                if let Err(err) = spawned {
                    tracing::error!(worker, error = %err, "failed to spawn batch worker");
                }
            }
        });
        drop(tx);

        for (i, r) in rx.try_iter() {
            slots[i] = Some(r);
        }

        // Anything a worker never picked up (all spawns failed) runs inline.
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.unwrap_or_else(|| self.process(&junctions[i], i)))
            .collect()
    }
}
