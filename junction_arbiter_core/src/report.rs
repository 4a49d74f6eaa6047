//! Per-junction and per-route aggregates.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    decide::ArbiterDecision,
    evidence::{ContestantKind, ContestantResult},
    junction::{Junction, Route},
};

/// Everything produced for one junction.
///
/// `is_complete` is set only when the judge ran, even if it returned an
/// all-failed decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JunctionResults {
    pub junction: Junction,
    pub junction_index: usize,

    pub video: Option<ContestantResult>,
    pub music: Option<ContestantResult>,
    pub history: Option<ContestantResult>,

    pub decision: Option<ArbiterDecision>,

    pub total_processing_time_ms: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub is_complete: bool,
    pub errors: Vec<String>,
}

impl JunctionResults {
    pub fn new(junction: Junction, junction_index: usize) -> Self {
        Self {
            junction,
            junction_index,
            video: None,
            music: None,
            history: None,
            decision: None,
            total_processing_time_ms: 0.0,
            started_at: None,
            completed_at: None,
            is_complete: false,
            errors: Vec::new(),
        }
    }

    pub fn slot(&self, kind: ContestantKind) -> Option<&ContestantResult> {
        match kind {
            ContestantKind::Video => self.video.as_ref(),
            ContestantKind::Music => self.music.as_ref(),
            ContestantKind::History => self.history.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, kind: ContestantKind) -> &mut Option<ContestantResult> {
        match kind {
            ContestantKind::Video => &mut self.video,
            ContestantKind::Music => &mut self.music,
            ContestantKind::History => &mut self.history,
        }
    }

    /// Filled slots, in kind order.
    pub fn all_results(&self) -> Vec<&ContestantResult> {
        ContestantKind::ALL
            .iter()
            .filter_map(|k| self.slot(*k))
            .collect()
    }

    pub fn winner(&self) -> Option<&ContestantResult> {
        self.decision.as_ref().map(|d| &d.winner)
    }
}

/// Route-level report. Mutate only through [`FinalReport::add_junction_result`].
///
/// `junction_results` is in evaluation *completion* order, which can differ
/// from dispatch order when junctions are released faster than they are
/// evaluated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub source_address: String,
    pub destination_address: String,
    pub total_junctions: usize,

    pub junction_results: Vec<JunctionResults>,

    pub total_processing_time: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub wins: BTreeMap<ContestantKind, u32>,
    pub failed_junctions: usize,
    pub total_errors: usize,
}

impl FinalReport {
    pub fn new(route: &Route) -> Self {
        Self {
            source_address: route.source_address.clone(),
            destination_address: route.destination_address.clone(),
            total_junctions: route.junction_count(),
            junction_results: Vec::new(),
            total_processing_time: Duration::ZERO,
            started_at: Some(Utc::now()),
            completed_at: None,
            wins: BTreeMap::new(),
            failed_junctions: 0,
            total_errors: 0,
        }
    }

    /// Append one junction's results and update the counters.
    ///
    /// Returns false (and records nothing) once `total_junctions` entries exist.
    pub fn add_junction_result(&mut self, result: JunctionResults) -> bool {
        if self.junction_results.len() >= self.total_junctions {
            tracing::warn!(
                junction_id = result.junction.junction_id,
                total = self.total_junctions,
                "report already holds every junction; dropping extra result"
            );
            return false;
        }

        if let Some(d) = &result.decision {
            *self.wins.entry(d.winner_kind).or_insert(0) += 1;
        }
        self.total_errors += result.errors.len();
        if !result.is_complete {
            self.failed_junctions += 1;
        }
        self.junction_results.push(result);
        true
    }

    pub fn wins_for(&self, kind: ContestantKind) -> u32 {
        self.wins.get(&kind).copied().unwrap_or(0)
    }

    /// Win count per kind, zeros included.
    pub fn winners_summary(&self) -> BTreeMap<ContestantKind, u32> {
        ContestantKind::ALL
            .iter()
            .map(|k| (*k, self.wins_for(*k)))
            .collect()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_junctions == 0 {
            return 0.0;
        }
        (self.total_junctions.saturating_sub(self.failed_junctions)) as f64
            / self.total_junctions as f64
            * 100.0
    }

    /// Stamp completion and the wall-clock span since `started_at`.
    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.total_processing_time = (now - started).to_std().unwrap_or(Duration::ZERO);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Route: {} -> {}", self.source_address, self.destination_address)?;
        writeln!(f, "Total junctions: {}", self.total_junctions)?;
        writeln!(f, "Success rate: {:.1}%", self.success_rate())?;
        writeln!(f, "Processing time: {:.2}s", self.total_processing_time.as_secs_f64())?;
        writeln!(f, "Wins:")?;
        for (kind, n) in self.winners_summary() {
            writeln!(f, "  {:<8} {n}", kind.title())?;
        }
        writeln!(f, "Junction winners:")?;
        for jr in &self.junction_results {
            if let Some(d) = &jr.decision {
                writeln!(
                    f,
                    "  {}. {} -> [{}] {} ({:.0}/100)",
                    jr.junction_index + 1,
                    jr.junction.address,
                    d.winner_kind,
                    d.winner.title,
                    d.winning_score
                )?;
            } else {
                writeln!(f, "  {}. {} -> no winner", jr.junction_index + 1, jr.junction.address)?;
            }
        }
        Ok(())
    }
}
