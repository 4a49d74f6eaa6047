//junction_arbiter_core/decide.rs

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::ArbiterCfg,
    error::{Error, Result},
    evidence::{ContestantKind, ContestantResult},
    junction::Junction,
};

pub const ALL_FAILED_REASONING: &str = "All agents failed to produce valid results.";

/// The judge's verdict for one junction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArbiterDecision {
    pub junction_id: u32,
    pub junction_address: String,

    pub winner: ContestantResult,
    pub winner_kind: ContestantKind,
    pub winning_score: f64,

    /// Every candidate handed to the judge, failures included.
    pub contestants: Vec<ContestantResult>,
    pub reasoning: String,
    /// Judge-assigned scores for the valid candidates.
    pub scores: BTreeMap<ContestantKind, f64>,

    pub decision_latency: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Deterministic weighted-scoring judge.
#[derive(Clone, Debug, Default)]
pub struct Arbiter {
    cfg: ArbiterCfg,
}

impl Arbiter {
    pub fn new(cfg: ArbiterCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &ArbiterCfg {
        &self.cfg
    }

    /// Judge score for one candidate, freshness bonus included.
    pub fn score(&self, c: &ContestantResult) -> f64 {
        let cfg = &self.cfg;
        let freshness = ((cfg.freshness_window_ms - c.processing_time_ms) / cfg.freshness_window_ms
            * cfg.freshness_max_bonus)
            .max(0.0);

        c.relevance * cfg.relevance_weight
            + c.quality * cfg.quality_weight
            + c.confidence * cfg.confidence_weight
            + freshness * cfg.freshness_weight
    }

    /// Pick a winner among `candidates`.
    ///
    /// Ties go to the earliest candidate. If nothing is valid the first
    /// candidate is returned with a zero score; that is a decision, not an error.
    pub fn evaluate(&self, junction: &Junction, candidates: &[ContestantResult]) -> Result<ArbiterDecision> {
        let started = Instant::now();

        let Some(first) = candidates.first() else {
            return Err(Error::NoCandidates);
        };

        let scored: Vec<(&ContestantResult, f64)> = candidates
            .iter()
            .filter(|c| c.is_success())
            .map(|c| (c, self.score(c)))
            .collect();

        let Some(winner_idx) = arg_max(&scored) else {
            tracing::warn!(junction_id = junction.junction_id, "every contestant failed");
            return Ok(ArbiterDecision {
                junction_id: junction.junction_id,
                junction_address: junction.address.clone(),
                winner: first.clone(),
                winner_kind: first.kind,
                winning_score: 0.0,
                contestants: candidates.to_vec(),
                reasoning: ALL_FAILED_REASONING.to_string(),
                scores: BTreeMap::new(),
                decision_latency: started.elapsed(),
                timestamp: Utc::now(),
            });
        };

        let (winner, winning_score) = scored[winner_idx];

        let runner_up = scored
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != winner_idx)
            .map(|(_, (_, s))| *s)
            .fold(None, |best: Option<f64>, s| match best {
                Some(b) if b >= s => Some(b),
                _ => Some(s),
            });

        let reasoning = self.reasoning(winner, winning_score, runner_up);

        let mut scores = BTreeMap::new();
        for (c, s) in &scored {
            scores.entry(c.kind).or_insert(*s);
        }

        Ok(ArbiterDecision {
            junction_id: junction.junction_id,
            junction_address: junction.address.clone(),
            winner: winner.clone(),
            winner_kind: winner.kind,
            winning_score,
            contestants: candidates.to_vec(),
            reasoning,
            scores,
            decision_latency: started.elapsed(),
            timestamp: Utc::now(),
        })
    }

    fn reasoning(&self, winner: &ContestantResult, score: f64, runner_up: Option<f64>) -> String {
        let kind = winner.kind.title();
        match runner_up {
            None => format!("{kind} wins by default with {score:.1} points."),
            Some(second) => {
                let margin = score - second;
                if margin > self.cfg.decisive_margin {
                    format!(
                        "{kind} wins decisively with a score of {score:.1}, {margin:.1} points clear. \
                         '{}' offers the best combination of relevance and quality.",
                        winner.title
                    )
                } else {
                    format!(
                        "{kind} narrowly wins with {score:.1} points. \
                         '{}' edges out the competition by {margin:.1} points.",
                        winner.title
                    )
                }
            }
        }
    }
}

/// First index holding the maximum score.
fn arg_max(scored: &[(&ContestantResult, f64)]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (_, s)) in scored.iter().enumerate() {
        match best {
            Some((_, b)) if *s <= b => {}
            _ => best = Some((i, *s)),
        }
    }
    best.map(|(i, _)| i)
}
