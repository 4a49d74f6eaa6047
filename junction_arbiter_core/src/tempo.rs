//! Tempo controller: pure timing for junction release.
//!
//! The scheduler knows nothing about observers or threads. It turns a junction
//! index into a target instant, keeps pause-aware elapsed time, and blocks a
//! caller until a target is reached. It is shared between the dispatch loop and
//! whoever calls `pause`/`resume`, so all state sits behind mutexes.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::{validate_interval, DispatchMode, TempoCfg},
    error::Result,
    junction::Junction,
};

/// Upper bound on any release offset, roughly a century.
const MAX_OFFSET: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

fn offset_from(epoch: Instant, offset: Duration) -> Instant {
    epoch.checked_add(offset).unwrap_or_else(|| {
        tracing::warn!(offset_secs = offset.as_secs(), "release offset overflows the clock; releasing at epoch");
        epoch
    })
}

#[derive(Debug, Default)]
struct PauseClock {
    epoch: Option<Instant>,
    epoch_wall: Option<DateTime<Utc>>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PauseClock {
    fn paused_until(&self, now: Instant) -> Duration {
        self.paused_total + self.paused_at.map(|p| now.saturating_duration_since(p)).unwrap_or_default()
    }
}

/// One entry of a precomputed dispatch schedule.
#[derive(Clone, Debug)]
pub struct ScheduledJunction<'a> {
    pub index: usize,
    pub junction: &'a Junction,
    /// Offset from the schedule epoch.
    pub offset: Duration,
    pub at: Instant,
    pub at_wall: DateTime<Utc>,
}

/// Point-in-time progress for a run of `total` junctions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoProgress {
    pub current_index: usize,
    pub total: usize,
    pub percent: f64,
    pub remaining: usize,
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
    pub is_paused: bool,
}

#[derive(Debug)]
pub struct Scheduler {
    tempo: Mutex<TempoCfg>,
    clock: Mutex<PauseClock>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    pub fn new(tempo: TempoCfg) -> Result<Self> {
        tempo.validate()?;
        Ok(Self {
            tempo: Mutex::new(tempo),
            clock: Mutex::new(PauseClock::default()),
        })
    }

    /// Record the epoch and clear pause accounting.
    pub fn start(&self) {
        let mut c = lock(&self.clock);
        *c = PauseClock {
            epoch: Some(Instant::now()),
            epoch_wall: Some(Utc::now()),
            paused_at: None,
            paused_total: Duration::ZERO,
        };
    }

    pub fn is_started(&self) -> bool {
        lock(&self.clock).epoch.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.clock).epoch_wall
    }

    pub fn tempo(&self) -> TempoCfg {
        lock(&self.tempo).clone()
    }

    pub fn mode(&self) -> DispatchMode {
        lock(&self.tempo).mode
    }

    pub fn interval(&self) -> Duration {
        lock(&self.tempo).interval()
    }

    /// Change the tempo. Waits already in progress keep their target.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        let secs = interval.as_secs_f64();
        validate_interval(secs)?;
        lock(&self.tempo).junction_interval_secs = secs;
        tracing::debug!(interval_secs = secs, "tempo interval updated");
        Ok(())
    }

    fn pause_poll(&self) -> Duration {
        lock(&self.tempo).pause_poll()
    }

    /// Release offset of the junction at `index`, measured from the epoch.
    pub fn scheduled_offset(&self, index: usize, junction: &Junction) -> Duration {
        let t = lock(&self.tempo);
        let offset = match t.mode {
            DispatchMode::RealTime => {
                let scaled = junction.cumulative_duration_seconds as f64 / t.time_scale;
                Duration::try_from_secs_f64((scaled - t.pre_dispatch_secs).max(0.0)).unwrap_or(MAX_OFFSET)
            }
            DispatchMode::FixedInterval | DispatchMode::DistanceBased | DispatchMode::Manual => {
                t.interval().saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
            }
        };
        offset.min(MAX_OFFSET)
    }

    /// Target instant for the junction at `index`. Starts the clock if needed.
    pub fn scheduled_time(&self, index: usize, junction: &Junction) -> Instant {
        let offset = self.scheduled_offset(index, junction);
        offset_from(self.epoch_or_start(), offset)
    }

    fn epoch_or_start(&self) -> Instant {
        let mut c = lock(&self.clock);
        match c.epoch {
            Some(e) => e,
            None => {
                let now = Instant::now();
                c.epoch = Some(now);
                c.epoch_wall = Some(Utc::now());
                now
            }
        }
    }

    /// Wall-clock time corresponding to an epoch offset.
    pub fn wall_time(&self, offset: Duration) -> DateTime<Utc> {
        let base = lock(&self.clock).epoch_wall.unwrap_or_else(Utc::now);
        chrono::Duration::from_std(offset)
            .ok()
            .and_then(|d| base.checked_add_signed(d))
            .unwrap_or(base)
    }

    /// Start the clock and compute every release time up front.
    pub fn schedule<'a>(&self, junctions: &'a [Junction]) -> Vec<ScheduledJunction<'a>> {
        self.start();
        self.plan(junctions)
    }

    /// Release times against the current epoch. Unlike [`Scheduler::schedule`]
    /// this leaves the clock alone, so a pause taken since `start()` holds.
    pub fn plan<'a>(&self, junctions: &'a [Junction]) -> Vec<ScheduledJunction<'a>> {
        if !matches!(self.mode(), DispatchMode::FixedInterval | DispatchMode::RealTime) {
            tracing::debug!(mode = ?self.mode(), "dispatch mode times like fixed_interval");
        }
        let epoch = self.epoch_or_start();

        junctions
            .iter()
            .enumerate()
            .map(|(index, junction)| {
                let offset = self.scheduled_offset(index, junction);
                ScheduledJunction {
                    index,
                    junction,
                    offset,
                    at: offset_from(epoch, offset),
                    at_wall: self.wall_time(offset),
                }
            })
            .collect()
    }

    pub fn pause(&self) {
        let mut c = lock(&self.clock);
        if c.paused_at.is_none() {
            c.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&self) {
        let mut c = lock(&self.clock);
        if let Some(p) = c.paused_at.take() {
            c.paused_total += p.elapsed();
        }
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.clock).paused_at.is_some()
    }

    /// Time since `start()`, paused time excluded.
    pub fn elapsed(&self) -> Duration {
        let c = lock(&self.clock);
        let Some(epoch) = c.epoch else {
            return Duration::ZERO;
        };
        let now = Instant::now();
        now.saturating_duration_since(epoch).saturating_sub(c.paused_until(now))
    }

    /// Block until `target`, never returning while paused. Returns the time waited.
    pub fn wait_until(&self, target: Instant) -> Duration {
        self.wait_until_or_cancel(target, || false)
            .unwrap_or_default()
    }

    /// Like [`Scheduler::wait_until`], but gives up (returning `None`) as soon
    /// as `cancelled` reports true. Checked once per poll slice.
    pub fn wait_until_or_cancel<F>(&self, target: Instant, cancelled: F) -> Option<Duration>
    where
        F: Fn() -> bool,
    {
        let began = Instant::now();
        let poll = self.pause_poll();
        loop {
            if cancelled() {
                return None;
            }
            if self.is_paused() {
                thread::sleep(poll);
                continue;
            }
            let now = Instant::now();
            if now >= target {
                return Some(began.elapsed());
            }
            thread::sleep((target - now).min(poll));
        }
    }

    /// Cooperative variant of [`Scheduler::wait_until`].
    #[cfg(feature = "async")]
    pub async fn wait_until_async(&self, target: Instant) -> Duration {
        let began = Instant::now();
        let poll = self.pause_poll();
        loop {
            if self.is_paused() {
                tokio::time::sleep(poll).await;
                continue;
            }
            let now = Instant::now();
            if now >= target {
                return began.elapsed();
            }
            tokio::time::sleep((target - now).min(poll)).await;
        }
    }

    /// Span of a fixed-interval run; the first junction goes out immediately.
    pub fn total_duration(&self, junction_count: usize) -> Duration {
        if junction_count == 0 {
            return Duration::ZERO;
        }
        self.interval()
            .saturating_mul(u32::try_from(junction_count - 1).unwrap_or(u32::MAX))
    }

    pub fn progress(&self, current_index: usize, total: usize) -> TempoProgress {
        let remaining = total.saturating_sub(current_index + 1);
        TempoProgress {
            current_index,
            total,
            percent: if total > 0 {
                current_index as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            remaining,
            elapsed: self.elapsed(),
            estimated_remaining: self
                .interval()
                .saturating_mul(u32::try_from(remaining).unwrap_or(u32::MAX)),
            is_paused: self.is_paused(),
        }
    }
}
