use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::junction::Junction;

/// The contestant evaluators that compete for each junction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestantKind {
    Video,
    Music,
    History,
}

impl ContestantKind {
    /// Fixed kind order. Also the order candidates are handed to the judge.
    pub const ALL: [ContestantKind; 3] = [
        ContestantKind::Video,
        ContestantKind::Music,
        ContestantKind::History,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContestantKind::Video => "video",
            ContestantKind::Music => "music",
            ContestantKind::History => "history",
        }
    }

    /// "Video", "Music", "History".
    pub fn title(self) -> &'static str {
        match self {
            ContestantKind::Video => "Video",
            ContestantKind::Music => "Music",
            ContestantKind::History => "History",
        }
    }
}

impl fmt::Display for ContestantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an evaluator hands back on success. Scores are self-assessed, 0–100.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub relevance: f64,
    pub quality: f64,
    pub confidence: f64,
}

impl Recommendation {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_scores(mut self, relevance: f64, quality: f64, confidence: f64) -> Self {
        self.relevance = relevance;
        self.quality = quality;
        self.confidence = confidence;
        self
    }
}

/// One evaluator's output for one junction. Failures are kept (for audit) but
/// never win arbitration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContestantResult {
    pub kind: ContestantKind,
    pub agent_name: String,
    pub junction_id: u32,
    pub junction_address: String,

    pub title: String,
    pub description: String,
    pub url: Option<String>,

    pub relevance: f64,
    pub quality: f64,
    pub confidence: f64,

    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl ContestantResult {
    pub fn success(
        kind: ContestantKind,
        agent_name: impl Into<String>,
        junction: &Junction,
        rec: Recommendation,
    ) -> Self {
        Self {
            kind,
            agent_name: agent_name.into(),
            junction_id: junction.junction_id,
            junction_address: junction.address.clone(),
            title: rec.title,
            description: rec.description,
            url: rec.url,
            relevance: rec.relevance,
            quality: rec.quality,
            confidence: rec.confidence,
            processing_time_ms: 0.0,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failure(
        kind: ContestantKind,
        agent_name: impl Into<String>,
        junction: &Junction,
        error: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            agent_name: agent_name.into(),
            junction_id: junction.junction_id,
            junction_address: junction.address.clone(),
            title: String::new(),
            description: String::new(),
            url: None,
            relevance: 0.0,
            quality: 0.0,
            confidence: 0.0,
            processing_time_ms: 0.0,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn with_processing_time_ms(mut self, ms: f64) -> Self {
        self.processing_time_ms = ms;
        self
    }

    /// No error and a non-empty title.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty) && !self.title.is_empty()
    }

    /// The contestant's own blended score; the judge uses its own weights.
    pub fn overall_score(&self) -> f64 {
        self.relevance * 0.5 + self.quality * 0.3 + self.confidence * 0.2
    }
}
