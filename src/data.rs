use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const UNTITLED_SIMULATION: &str = "Untitled Simulation";

/// Serialized upper-case; parsed case-insensitively.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum Urgency {
    Low,
    Medium,
    #[default]
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "LOW",
            Urgency::Medium => "MEDIUM",
            Urgency::High => "HIGH",
            Urgency::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Urgency::Low),
            "MEDIUM" => Ok(Urgency::Medium),
            "HIGH" => Ok(Urgency::High),
            "CRITICAL" => Ok(Urgency::Critical),
            other => Err(anyhow!("Unknown urgency level: {}", other)),
        }
    }
}

impl TryFrom<String> for Urgency {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdditionalField {
    pub label: String,
    pub value: String,
}

/// A founder's description of a startup idea.
///
/// Field names on disk follow the form names (camelCase). Nothing here is
/// required; see `validation` for the launch rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StartupBrief {
    pub startup_name: String,
    pub elevator_pitch: String,
    pub problem_statement: String,
    pub target_audience: String,
    pub problem_urgency: Urgency,
    pub primary_target_segment: String,
    pub geography: String,
    pub market_size_estimate: String,
    pub customer_behavior_pain_points: String,
    pub competitor_patterns: String,
    pub monthly_burn: String,
    pub estimated_cac: String,
    pub current_cash_in_hand: String,
    pub marketing_strategy: String,

    // Quick-form fields
    pub name: String,
    pub problem: String,
    pub target_market: String,
    pub revenue_model: String,
    pub competitive_advantage: String,
    pub additional_info: Vec<AdditionalField>,
}

impl StartupBrief {
    /// Merge a JSON object of camelCase fields over this brief.
    ///
    /// Keys present in the patch replace the current values; unknown keys
    /// are ignored. Fails without touching `self` if the result is invalid.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<()> {
        let patch = patch
            .as_object()
            .ok_or_else(|| anyhow!("Brief patch must be a JSON object"))?;

        let mut merged = serde_json::to_value(&*self)?;
        if let Some(target) = merged.as_object_mut() {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }

        *self = serde_json::from_value(merged)?;
        Ok(())
    }

    pub fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        self.apply_patch(&serde_json::json!({ field: value }))
    }

    /// Copy the structured fields onto their quick-form counterparts.
    pub fn sync_legacy_fields(&mut self) {
        fn copy_if_set(target: &mut String, source: &str) {
            if !source.trim().is_empty() {
                *target = source.to_string();
            }
        }

        copy_if_set(&mut self.name, &self.startup_name);
        copy_if_set(&mut self.problem, &self.problem_statement);
        copy_if_set(&mut self.target_market, &self.primary_target_segment);
        copy_if_set(&mut self.revenue_model, &self.marketing_strategy);
        copy_if_set(&mut self.competitive_advantage, &self.elevator_pitch);
    }

    pub fn display_name(&self) -> &str {
        first_present(&[self.startup_name.as_str(), self.name.as_str()]).unwrap_or(UNTITLED_SIMULATION)
    }

    pub fn add_additional_field(&mut self) {
        self.additional_info.push(AdditionalField::default());
    }

    /// Returns false when `index` is out of range.
    pub fn update_additional_field(&mut self, index: usize, label: Option<&str>, value: Option<&str>) -> bool {
        let Some(entry) = self.additional_info.get_mut(index) else {
            return false;
        };
        if let Some(label) = label {
            entry.label = label.to_string();
        }
        if let Some(value) = value {
            entry.value = value.to_string();
        }
        true
    }

    pub fn remove_additional_field(&mut self, index: usize) -> bool {
        if index < self.additional_info.len() {
            self.additional_info.remove(index);
            true
        } else {
            false
        }
    }
}

/// First candidate that is non-empty after trimming
pub fn first_present<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreMetrics {
    pub market_viability: u32,
    pub investor_confidence: u32,
    pub customer_demand: u32,
}

impl ScoreMetrics {
    /// Rounded unweighted mean of the three metrics
    pub fn overall(&self) -> u32 {
        let sum = self.market_viability + self.investor_confidence + self.customer_demand;
        (sum as f64 / 3.0).round() as u32
    }
}

/// Where a displayed score came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOrigin {
    /// Local heuristic
    Estimated,
    /// Returned by the simulation backend
    Confirmed,
}

impl fmt::Display for ScoreOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreOrigin::Estimated => f.write_str("estimated"),
            ScoreOrigin::Confirmed => f.write_str("confirmed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub metrics: ScoreMetrics,
    pub overall_score: u32,
    pub origin: ScoreOrigin,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordStatus {
    #[default]
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub status: RecordStatus,
    pub score: u32,
    pub metrics: ScoreMetrics,
    pub origin: ScoreOrigin,
}

impl SimulationRecord {
    /// Build a record from a run result. Without a server id the creation
    /// time in milliseconds is used.
    pub fn from_response(response: &SimulationRunResponse, origin: ScoreOrigin) -> Self {
        let created_at = Utc::now();
        let id = response
            .simulation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| created_at.timestamp_millis().to_string());

        Self {
            id,
            name: response.startup_name.clone(),
            created_at,
            status: RecordStatus::Completed,
            score: response.overall_score,
            metrics: response.metrics,
            origin,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentFeedback {
    pub perspective: String,
    pub summary: String,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub confidence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationLog {
    pub role: String,
    pub message: String,
    #[serde(default = "default_log_status")]
    pub status: String,
}

fn default_log_status() -> String {
    "done".to_string()
}

/// Body of `POST /api/v1/simulations/run`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationRunResponse {
    #[serde(default)]
    pub simulation_id: Option<String>,
    #[serde(default)]
    pub startup_name: String,
    #[serde(default)]
    pub status: Option<String>,
    pub metrics: ScoreMetrics,
    pub overall_score: u32,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
    #[serde(default)]
    pub agents: Vec<AgentFeedback>,
    #[serde(default)]
    pub synthesis: Option<String>,
    #[serde(default)]
    pub logs: Vec<SimulationLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSummary {
    pub simulation_id: String,
    pub startup_name: String,
    #[serde(default)]
    pub status: String,
    pub overall_score: u32,
    #[serde(default)]
    pub metrics: ScoreMetrics,
    #[serde(with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationDetail {
    #[serde(flatten)]
    pub run: SimulationRunResponse,
    #[serde(with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub input_payload: Value,
}

impl SimulationDetail {
    pub fn top_opportunities(&self, limit: usize) -> Vec<&str> {
        self.run
            .agents
            .iter()
            .flat_map(|agent| agent.opportunities.iter().map(String::as_str))
            .take(limit)
            .collect()
    }

    pub fn top_risks(&self, limit: usize) -> Vec<&str> {
        self.run
            .agents
            .iter()
            .flat_map(|agent| agent.risks.iter().map(String::as_str))
            .take(limit)
            .collect()
    }
}

/// Timestamps from the backend may come with or without an offset; naive
/// values are read as UTC.
mod flexible_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
