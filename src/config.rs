use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::data::Urgency;

pub const API_BASE_URL_ENV: &str = "PENTRA_API_BASE_URL";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_HISTORY_CAP: usize = 8;
pub const DEFAULT_PLAYBACK_STEP_MS: u64 = 850;

/// Inclusive band a metric is clamped into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min: i64,
    pub max: i64,
}

impl ScoreBand {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyBoosts {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl UrgencyBoosts {
    pub fn boost(&self, urgency: Urgency) -> f64 {
        match urgency {
            Urgency::Low => self.low,
            Urgency::Medium => self.medium,
            Urgency::High => self.high,
            Urgency::Critical => self.critical,
        }
    }
}

/// Constants of the local scoring heuristic.
///
/// Every metric is `base + boosts`, rounded, then clamped into its band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub market_base: f64,
    pub urgency: UrgencyBoosts,
    pub segment: f64,
    pub market_size_estimate: f64,
    pub competitor_patterns: f64,
    pub market_band: ScoreBand,

    pub investor_base: f64,
    pub elevator_pitch: f64,
    pub marketing_strategy: f64,
    pub runway_multiplier: f64,
    pub runway_cap: f64,
    pub runway_unknown: f64,
    pub investor_band: ScoreBand,

    pub demand_base: f64,
    pub target_audience: f64,
    pub pain_points: f64,
    pub cac_ceiling: f64,
    pub cac_divisor: f64,
    pub cac_unknown: f64,
    pub demand_band: ScoreBand,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            market_base: 48.0,
            urgency: UrgencyBoosts {
                low: 2.0,
                medium: 5.0,
                high: 10.0,
                critical: 13.0,
            },
            segment: 10.0,
            market_size_estimate: 8.0,
            competitor_patterns: 4.0,
            market_band: ScoreBand::new(35, 95),

            investor_base: 42.0,
            elevator_pitch: 8.0,
            marketing_strategy: 6.0,
            runway_multiplier: 6.0,
            runway_cap: 25.0,
            runway_unknown: 4.0,
            investor_band: ScoreBand::new(30, 94),

            demand_base: 46.0,
            target_audience: 10.0,
            pain_points: 10.0,
            cac_ceiling: 16.0,
            cac_divisor: 200.0,
            cac_unknown: 6.0,
            demand_band: ScoreBand::new(32, 96),
        }
    }
}

impl ScoreWeights {
    /// Load weights from a JSON file; missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read weights: {:?}", path))?;
        let weights: ScoreWeights = serde_json::from_str(&content)
            .with_context(|| format!("Invalid weights file: {:?}", path))?;
        weights
            .validate()
            .with_context(|| format!("Invalid weights file: {:?}", path))?;
        Ok(weights)
    }

    /// Every band must satisfy `0 <= min <= max`.
    pub fn validate(&self) -> Result<()> {
        for (name, band) in [
            ("market_band", self.market_band),
            ("investor_band", self.investor_band),
            ("demand_band", self.demand_band),
        ] {
            if band.min < 0 || band.min > band.max {
                bail!("{} must satisfy 0 <= min <= max, got [{}, {}]", name, band.min, band.max);
            }
        }
        Ok(())
    }
}

/// Runtime settings for the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub store_dir: PathBuf,
    pub history_cap: usize,
    pub playback_step_ms: u64,
}

impl ClientConfig {
    pub fn new(api_base_url: Option<String>, store_dir: PathBuf, history_cap: usize) -> Self {
        Self {
            api_base_url: resolve_base_url(api_base_url),
            store_dir,
            history_cap: history_cap.max(1),
            playback_step_ms: DEFAULT_PLAYBACK_STEP_MS,
        }
    }

    pub fn playback_step(&self) -> Duration {
        Duration::from_millis(self.playback_step_ms)
    }
}

/// Explicit value, then the environment, then the local default.
/// Blank values fall through.
fn resolve_base_url(explicit: Option<String>) -> String {
    let clean = |url: String| {
        let url = url.trim().trim_end_matches('/').to_string();
        (!url.is_empty()).then_some(url)
    };

    explicit
        .and_then(clean)
        .or_else(|| std::env::var(API_BASE_URL_ENV).ok().and_then(clean))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}
