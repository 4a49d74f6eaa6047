use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest delay any tempo or timeout setting may express.
pub const MAX_CFG_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// `secs` as a `Duration`, if it is finite, positive and at most [`MAX_CFG_SECS`].
pub(crate) fn bounded_secs(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 || secs > MAX_CFG_SECS {
        return Err(Error::invalid_config(format!(
            "{name} must be in (0, {MAX_CFG_SECS}] seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| Error::invalid_config(format!("{name}: {e}")))
}

fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_CFG_SECS)).unwrap_or(Duration::ZERO)
}

/// How the scheduler computes a junction's release time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// `index * interval` after start.
    #[default]
    FixedInterval,
    /// Scaled cumulative driving time, released `pre_dispatch_secs` early.
    RealTime,
    /// Representable; times like `FixedInterval`.
    DistanceBased,
    /// Representable; times like `FixedInterval`.
    Manual,
}

/// Tempo settings. `junction_interval_secs` is the main knob.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoCfg {
    pub junction_interval_secs: f64,
    pub mode: DispatchMode,
    /// 1.0 = real time, 0.5 = twice as fast.
    pub time_scale: f64,
    pub pre_dispatch_secs: f64,
    pub distance_threshold_meters: u32,
    pub lookahead_count: u32,
    /// Poll slice used while paused and between wait checks.
    pub pause_poll_ms: u64,
}

impl Default for TempoCfg {
    fn default() -> Self {
        Self {
            junction_interval_secs: 30.0,
            mode: DispatchMode::FixedInterval,
            time_scale: 1.0,
            pre_dispatch_secs: 5.0,
            distance_threshold_meters: 500,
            lookahead_count: 1,
            pause_poll_ms: 100,
        }
    }
}

impl TempoCfg {
    /// Fixed-interval tempo with the remaining fields defaulted.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            junction_interval_secs: interval.as_secs_f64(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_interval(self.junction_interval_secs)?;
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(Error::invalid_config("time_scale must be positive"));
        }
        if !self.pre_dispatch_secs.is_finite() || self.pre_dispatch_secs < 0.0 || self.pre_dispatch_secs > MAX_CFG_SECS {
            return Err(Error::invalid_config("pre_dispatch_secs must be in [0, MAX_CFG_SECS]"));
        }
        if self.lookahead_count < 1 {
            return Err(Error::invalid_config("lookahead_count must be at least 1"));
        }
        if self.pause_poll_ms == 0 {
            return Err(Error::invalid_config("pause_poll_ms must be positive"));
        }
        Ok(())
    }

    /// Clamped into range; `validate()` rejects what would be clamped.
    pub fn interval(&self) -> Duration {
        saturating_secs(self.junction_interval_secs)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

pub(crate) fn validate_interval(secs: f64) -> Result<()> {
    bounded_secs("junction_interval_secs", secs).map(|_| ())
}

/// Judge weights and thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterCfg {
    pub relevance_weight: f64,
    pub quality_weight: f64,
    pub confidence_weight: f64,
    pub freshness_weight: f64,
    /// Responses at or above this contribute no freshness bonus.
    pub freshness_window_ms: f64,
    /// Bonus points for an instantaneous response, before `freshness_weight`.
    pub freshness_max_bonus: f64,
    /// Winning margins above this are reported as decisive.
    pub decisive_margin: f64,
}

impl Default for ArbiterCfg {
    fn default() -> Self {
        Self {
            relevance_weight: 0.45,
            quality_weight: 0.30,
            confidence_weight: 0.15,
            freshness_weight: 0.10,
            freshness_window_ms: 500.0,
            freshness_max_bonus: 10.0,
            decisive_margin: 10.0,
        }
    }
}

impl ArbiterCfg {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.relevance_weight,
            self.quality_weight,
            self.confidence_weight,
            self.freshness_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::invalid_config("arbiter weights must be finite and >= 0"));
        }
        if !self.freshness_window_ms.is_finite() || self.freshness_window_ms <= 0.0 {
            return Err(Error::invalid_config("freshness_window_ms must be positive"));
        }
        Ok(())
    }
}

/// Everything the supervisor needs, in one deserializable document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineCfg {
    pub tempo: TempoCfg,
    pub arbiter: ArbiterCfg,
    /// Shared budget for the three contestants of one junction.
    pub contestant_timeout_secs: f64,
    /// Worker pool size for batch processing.
    pub max_concurrent_junctions: usize,
    /// Bound on how long the last junction waits for stragglers.
    pub finalize_timeout_secs: f64,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            tempo: TempoCfg::default(),
            arbiter: ArbiterCfg::default(),
            contestant_timeout_secs: 30.0,
            max_concurrent_junctions: 3,
            finalize_timeout_secs: 60.0,
        }
    }
}

impl PipelineCfg {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: PipelineCfg = serde_json::from_str(s)
            .map_err(|e| Error::invalid_config(format!("malformed pipeline config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.tempo.validate()?;
        self.arbiter.validate()?;
        bounded_secs("contestant_timeout_secs", self.contestant_timeout_secs)?;
        if self.max_concurrent_junctions == 0 {
            return Err(Error::invalid_config("max_concurrent_junctions must be at least 1"));
        }
        if self.finalize_timeout_secs != 0.0 {
            bounded_secs("finalize_timeout_secs", self.finalize_timeout_secs)?;
        }
        Ok(())
    }

    pub fn contestant_timeout(&self) -> Duration {
        saturating_secs(self.contestant_timeout_secs)
    }

    pub fn finalize_timeout(&self) -> Duration {
        saturating_secs(self.finalize_timeout_secs)
    }
}
