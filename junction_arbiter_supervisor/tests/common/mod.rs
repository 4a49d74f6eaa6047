#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use junction_arbiter_core::{Junction, PipelineCfg, Recommendation, Route, TempoCfg};
use junction_arbiter_supervisor::{Contestant, ContestantError, FnContestant};

pub fn fixed(name: &str, title: &str, score: f64) -> Arc<dyn Contestant> {
    let title = title.to_string();
    FnContestant::shared(name, move |_j: &Junction| -> Result<Recommendation, ContestantError> {
        Ok(Recommendation::new(title.clone(), "").with_scores(score, score, score))
    })
}

pub fn sleepy(name: &str, title: &str, score: f64, delay: Duration) -> Arc<dyn Contestant> {
    slow_on(name, title, score, move |_| delay)
}

/// Sleeps for `delay(junction_id)` before answering.
pub fn slow_on<D>(name: &str, title: &str, score: f64, delay: D) -> Arc<dyn Contestant>
where
    D: Fn(u32) -> Duration + Send + Sync + 'static,
{
    let title = title.to_string();
    FnContestant::shared(name, move |j: &Junction| -> Result<Recommendation, ContestantError> {
        thread::sleep(delay(j.junction_id));
        Ok(Recommendation::new(title.clone(), "").with_scores(score, score, score))
    })
}

pub fn failing(name: &str, msg: &str) -> Arc<dyn Contestant> {
    let msg = msg.to_string();
    FnContestant::shared(name, move |_j: &Junction| -> Result<Recommendation, ContestantError> {
        Err(ContestantError::new(msg.clone()))
    })
}

pub fn panicking(name: &str) -> Arc<dyn Contestant> {
    FnContestant::shared(name, |_j: &Junction| -> Result<Recommendation, ContestantError> {
        panic!("search backend exploded")
    })
}

pub fn route(n: u32) -> Route {
    let junctions = (0..n)
        .map(|i| {
            Junction::new(i, format!("Junction {i}"))
                .with_leg(150, 20)
                .with_cumulative(u64::from(i) * 150, u64::from(i) * 20)
        })
        .collect();
    Route::new("Start", "Finish", junctions)
}

pub fn tempo(interval_ms: u64) -> TempoCfg {
    TempoCfg {
        pause_poll_ms: 5,
        ..TempoCfg::with_interval(Duration::from_millis(interval_ms))
    }
}

pub fn cfg(interval_ms: u64, timeout_ms: u64) -> PipelineCfg {
    PipelineCfg {
        tempo: tempo(interval_ms),
        contestant_timeout_secs: timeout_ms as f64 / 1000.0,
        finalize_timeout_secs: 5.0,
        ..PipelineCfg::default()
    }
}
