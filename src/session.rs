use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{SimulationApi, SubmissionError};
use crate::config::ScoreWeights;
use crate::data::{
    ScoreOrigin, ScoreSnapshot, SimulationDetail, SimulationRecord, SimulationRunResponse,
    SimulationSummary, StartupBrief,
};
use crate::scoring::score_brief;
use crate::storage::{load_json, save_json, KeyValueStore, DRAFT_KEY, SESSION_KEY};

pub const DEFAULT_RECOMMENDATIONS: [&str; 3] = [
    "Validate your strongest assumption with 10 customer interviews.",
    "Tighten CAC forecasting before budget expansion.",
    "Prioritize one segment before scaling channels.",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationStatus {
    Idle,
    Running,
    Completed,
    Failed { message: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("A simulation is already running")]
    AlreadyRunning,

    #[error("No simulation is running")]
    NotRunning,

    #[error("Invalid brief: {0}")]
    InvalidBrief(String),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// Session state that survives a restart, stored under `simulation-storage`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PersistedSession {
    startup_idea: StartupBrief,
    overall_score: Option<u32>,
    recommendations: Vec<String>,
    #[serde(deserialize_with = "lenient_records")]
    recent_simulations: Vec<SimulationRecord>,
    dashboard_metrics: Option<ScoreSnapshot>,
}

/// Anything but a well-formed array loads as an empty history.
fn lenient_records<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SimulationRecord>, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    if !raw.is_array() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// The single editing and simulation session of the client.
///
/// Every state change is written through to the store so the next process
/// picks up where this one left off.
pub struct Session {
    store: Arc<dyn KeyValueStore>,
    weights: ScoreWeights,
    history_cap: usize,

    brief: StartupBrief,
    status: SimulationStatus,
    overall_score: Option<u32>,
    recommendations: Vec<String>,
    history: Vec<SimulationRecord>,
    displayed: Option<ScoreSnapshot>,
    // Shown again if the running submission fails
    stashed: Option<ScoreSnapshot>,
    active: Option<SimulationDetail>,
    last_error: Option<String>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>, weights: ScoreWeights, history_cap: usize) -> Self {
        Self {
            store,
            weights,
            history_cap: history_cap.max(1),
            brief: StartupBrief::default(),
            status: SimulationStatus::Idle,
            overall_score: None,
            recommendations: Vec::new(),
            history: Vec::new(),
            displayed: None,
            stashed: None,
            active: None,
            last_error: None,
        }
    }

    /// Load the persisted session, merged over defaults.
    pub fn restore(store: Arc<dyn KeyValueStore>, weights: ScoreWeights, history_cap: usize) -> Self {
        let persisted: PersistedSession = load_json(store.as_ref(), SESSION_KEY).unwrap_or_default();
        let mut session = Self::new(store, weights, history_cap);

        session.brief = persisted.startup_idea;
        session.overall_score = persisted.overall_score;
        session.recommendations = persisted.recommendations;
        session.history = persisted.recent_simulations;
        session.history.truncate(session.history_cap);
        session.displayed = persisted.dashboard_metrics;

        tracing::debug!(history = session.history.len(), "Session restored");
        session
    }

    pub fn brief(&self) -> &StartupBrief {
        &self.brief
    }

    pub fn status(&self) -> &SimulationStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SimulationStatus::Running
    }

    pub fn overall_score(&self) -> Option<u32> {
        self.overall_score
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    /// Most recent first
    pub fn history(&self) -> &[SimulationRecord] {
        &self.history
    }

    pub fn displayed(&self) -> Option<&ScoreSnapshot> {
        self.displayed.as_ref()
    }

    pub fn active_simulation(&self) -> Option<&SimulationDetail> {
        self.active.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    pub fn update_field(&mut self, field: &str, value: Value) -> Result<(), SessionError> {
        self.brief
            .set_field(field, value)
            .map_err(|e| SessionError::InvalidBrief(e.to_string()))?;
        self.persist();
        Ok(())
    }

    pub fn patch_fields(&mut self, patch: &Value) -> Result<(), SessionError> {
        self.brief
            .apply_patch(patch)
            .map_err(|e| SessionError::InvalidBrief(e.to_string()))?;
        self.persist();
        Ok(())
    }

    pub fn add_additional_field(&mut self) {
        self.brief.add_additional_field();
        self.persist();
    }

    pub fn update_additional_field(&mut self, index: usize, label: Option<&str>, value: Option<&str>) -> bool {
        let updated = self.brief.update_additional_field(index, label, value);
        if updated {
            self.persist();
        }
        updated
    }

    pub fn remove_additional_field(&mut self, index: usize) -> bool {
        let removed = self.brief.remove_additional_field(index);
        if removed {
            self.persist();
        }
        removed
    }

    /// Local heuristic score of the current brief
    pub fn estimate(&self) -> ScoreSnapshot {
        let metrics = score_brief(&self.brief, &self.weights);
        ScoreSnapshot {
            metrics,
            overall_score: metrics.overall(),
            origin: ScoreOrigin::Estimated,
        }
    }

    /// Idle, Completed or Failed to Running.
    ///
    /// Merges `patch` into the brief and shows the local estimate until the
    /// run resolves. Nothing changes if the patch is invalid.
    pub fn begin(&mut self, patch: Option<&Value>) -> Result<ScoreSnapshot, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        if let Some(patch) = patch {
            self.brief
                .apply_patch(patch)
                .map_err(|e| SessionError::InvalidBrief(e.to_string()))?;
        }
        self.brief.sync_legacy_fields();

        let estimate = self.estimate();
        self.stashed = self.displayed.take();
        self.displayed = Some(estimate);
        self.status = SimulationStatus::Running;
        self.last_error = None;
        self.persist();

        tracing::info!(
            startup = %self.brief.display_name(),
            estimate = estimate.overall_score,
            "Simulation started"
        );
        Ok(estimate)
    }

    /// Running to Completed.
    pub fn complete(
        &mut self,
        response: SimulationRunResponse,
        origin: ScoreOrigin,
    ) -> Result<SimulationRecord, SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }

        let record = SimulationRecord::from_response(&response, origin);

        self.history.insert(0, record.clone());
        self.history.truncate(self.history_cap);
        self.overall_score = Some(record.score);
        self.recommendations = response
            .recommendations
            .unwrap_or_else(|| DEFAULT_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect());
        self.displayed = Some(ScoreSnapshot {
            metrics: record.metrics,
            overall_score: record.score,
            origin,
        });
        self.stashed = None;
        self.status = SimulationStatus::Completed;
        self.last_error = None;

        if let Err(e) = self.clear_draft() {
            tracing::warn!(error = %e, "Failed to clear draft");
        }
        self.persist();

        tracing::info!(
            id = %record.id,
            score = record.score,
            origin = %origin,
            "Simulation completed"
        );
        Ok(record)
    }

    /// Running to Failed. Keeps the previously shown scores and the history.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }

        let message = message.into();
        self.displayed = self.stashed.take();
        self.last_error = Some(message.clone());
        self.status = SimulationStatus::Failed {
            message: message.clone(),
        };
        self.persist();

        tracing::warn!(error = %message, "Simulation failed");
        Ok(())
    }

    /// Run one simulation end to end against `api`.
    pub fn submit(
        &mut self,
        api: &dyn SimulationApi,
        patch: Option<&Value>,
    ) -> Result<SimulationRecord, SessionError> {
        self.begin(patch)?;

        match api.run_simulation(&self.brief) {
            Ok(response) => self.complete(response, api.score_origin()),
            Err(e) => {
                self.fail(e.message.clone())?;
                Err(SessionError::Submission(e))
            }
        }
    }

    /// Past runs from the backend; empty when the backend cannot be reached.
    pub fn fetch_remote_history(&mut self, api: &dyn SimulationApi) -> Vec<SimulationSummary> {
        match api.list_simulations() {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list simulations");
                self.last_error = Some(e.message);
                Vec::new()
            }
        }
    }

    /// Fetch a run's full detail and make it the active simulation.
    pub fn load_simulation(&mut self, api: &dyn SimulationApi, simulation_id: &str) -> Option<&SimulationDetail> {
        match api.get_simulation(simulation_id) {
            Ok(detail) => {
                self.active = Some(detail);
                self.active.as_ref()
            }
            Err(e) => {
                tracing::warn!(id = %simulation_id, error = %e, "Failed to load simulation");
                self.last_error = Some(e.message);
                self.active = None;
                None
            }
        }
    }

    pub fn save_draft(&self, draft: &StartupBrief) -> Result<()> {
        save_json(self.store.as_ref(), DRAFT_KEY, draft)?;
        tracing::debug!("Draft saved");
        Ok(())
    }

    /// A missing or unreadable draft is `None`.
    pub fn load_draft(&self) -> Option<StartupBrief> {
        load_json(self.store.as_ref(), DRAFT_KEY)
    }

    pub fn clear_draft(&self) -> Result<()> {
        self.store.remove(DRAFT_KEY)
    }

    /// Back to an empty brief. History and the last shown scores are kept.
    pub fn reset(&mut self) {
        self.brief = StartupBrief::default();
        self.status = SimulationStatus::Idle;
        self.overall_score = None;
        self.recommendations.clear();
        self.stashed = None;
        self.active = None;
        self.last_error = None;
        self.persist();
    }

    /// Drop everything, persisted state included.
    pub fn teardown(&mut self) -> Result<()> {
        self.store.remove(SESSION_KEY)?;
        let (store, weights, cap) = (self.store.clone(), self.weights.clone(), self.history_cap);
        *self = Self::new(store, weights, cap);
        Ok(())
    }

    fn persist(&self) {
        let snapshot = PersistedSession {
            startup_idea: self.brief.clone(),
            overall_score: self.overall_score,
            recommendations: self.recommendations.clone(),
            recent_simulations: self.history.clone(),
            dashboard_metrics: self.displayed,
        };

        if let Err(e) = save_json(self.store.as_ref(), SESSION_KEY, &snapshot) {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LocalSimulationApi;
    use crate::data::{ScoreMetrics, Urgency};
    use crate::storage::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back canned run results in order
    struct ScriptedApi {
        runs: Mutex<VecDeque<Result<SimulationRunResponse, SubmissionError>>>,
    }

    impl ScriptedApi {
        fn new(runs: Vec<Result<SimulationRunResponse, SubmissionError>>) -> Self {
            Self {
                runs: Mutex::new(runs.into()),
            }
        }
    }

    impl SimulationApi for ScriptedApi {
        fn run_simulation(&self, _brief: &StartupBrief) -> Result<SimulationRunResponse, SubmissionError> {
            self.runs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SubmissionError::new("no scripted run")))
        }

        fn list_simulations(&self) -> Result<Vec<SimulationSummary>, SubmissionError> {
            Err(SubmissionError::new("Unable to load simulations."))
        }

        fn get_simulation(&self, _simulation_id: &str) -> Result<SimulationDetail, SubmissionError> {
            Err(SubmissionError::new("Simulation not found."))
        }
    }

    fn response(id: &str, mv: u32, ic: u32, cd: u32) -> SimulationRunResponse {
        let metrics = ScoreMetrics {
            market_viability: mv,
            investor_confidence: ic,
            customer_demand: cd,
        };
        SimulationRunResponse {
            simulation_id: Some(id.to_string()),
            startup_name: "Acme".into(),
            overall_score: metrics.overall(),
            metrics,
            ..Default::default()
        }
    }

    fn acme_patch() -> Value {
        serde_json::json!({
            "startupName": "Acme",
            "problemStatement": "X",
            "targetAudience": "Y",
            "primaryTargetSegment": "Z",
            "geography": "US",
            "monthlyBurn": "$10,000",
            "currentCashInHand": "$100,000",
            "problemUrgency": "HIGH"
        })
    }

    fn new_session(store: Arc<MemoryStore>, cap: usize) -> Session {
        Session::new(store, ScoreWeights::default(), cap)
    }

    #[test]
    fn test_local_submission_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let api = LocalSimulationApi::new(ScoreWeights::default());

        let record = session.submit(&api, Some(&acme_patch())).unwrap();

        assert_eq!(record.metrics.market_viability, 68);
        assert_eq!(record.metrics.investor_confidence, 67);
        assert_eq!(record.metrics.customer_demand, 62);
        assert_eq!(record.score, 66);
        assert_eq!(record.origin, ScoreOrigin::Estimated);
        assert_eq!(session.status(), &SimulationStatus::Completed);
        assert_eq!(session.overall_score(), Some(66));
        assert_eq!(session.recommendations().len(), 3);
        assert_eq!(session.recommendations()[0], DEFAULT_RECOMMENDATIONS[0]);
        assert_eq!(session.brief().name, "Acme");
        assert_eq!(session.brief().target_market, "Z");
    }

    #[test]
    fn test_remote_result_replaces_estimate() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);

        let estimate = session.begin(Some(&acme_patch())).unwrap();
        assert_eq!(estimate.origin, ScoreOrigin::Estimated);
        assert_eq!(session.displayed(), Some(&estimate));
        assert!(session.is_running());

        let mut remote = response("sim-1", 80, 70, 60);
        remote.recommendations = Some(vec!["Hire a CFO".into()]);
        session.complete(remote, ScoreOrigin::Confirmed).unwrap();

        let shown = session.displayed().unwrap();
        assert_eq!(shown.origin, ScoreOrigin::Confirmed);
        assert_eq!(shown.overall_score, 70);
        assert_eq!(session.recommendations(), &["Hire a CFO".to_string()]);
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let runs = (0..9).map(|i| Ok(response(&format!("sim-{}", i), 60, 60, 60))).collect();
        let api = ScriptedApi::new(runs);

        for _ in 0..9 {
            session.submit(&api, None).unwrap();
        }

        let ids: Vec<_> = session.history().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(ids[0], "sim-8");
        assert_eq!(ids[7], "sim-1");
        assert!(!ids.contains(&"sim-0"));
    }

    #[test]
    fn test_failure_keeps_previous_scores_and_history() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let api = ScriptedApi::new(vec![
            Ok(response("sim-1", 80, 70, 60)),
            Err(SubmissionError::new("Simulation failed: boom")),
        ]);

        session.submit(&api, None).unwrap();
        let before = *session.displayed().unwrap();

        let error = session.submit(&api, Some(&acme_patch())).unwrap_err();

        assert_eq!(
            error,
            SessionError::Submission(SubmissionError::new("Simulation failed: boom"))
        );
        assert_eq!(
            session.status(),
            &SimulationStatus::Failed {
                message: "Simulation failed: boom".into()
            }
        );
        assert_eq!(session.displayed(), Some(&before));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.last_error(), Some("Simulation failed: boom"));
    }

    #[test]
    fn test_failure_on_first_run_shows_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let api = ScriptedApi::new(vec![Err(SubmissionError::new("down"))]);

        assert!(session.submit(&api, None).is_err());
        assert!(session.displayed().is_none());
        assert!(session.overall_score().is_none());
    }

    #[test]
    fn test_retry_after_failure() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let api = ScriptedApi::new(vec![
            Err(SubmissionError::new("down")),
            Ok(response("sim-2", 70, 70, 70)),
        ]);

        assert!(session.submit(&api, None).is_err());
        let record = session.submit(&api, None).unwrap();

        assert_eq!(record.id, "sim-2");
        assert_eq!(session.status(), &SimulationStatus::Completed);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_begin_while_running_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);

        session.begin(None).unwrap();
        assert_eq!(session.begin(None), Err(SessionError::AlreadyRunning));
    }

    #[test]
    fn test_complete_requires_running() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);

        let result = session.complete(response("x", 1, 1, 1), ScoreOrigin::Confirmed);
        assert_eq!(result, Err(SessionError::NotRunning));
        assert_eq!(session.fail("x"), Err(SessionError::NotRunning));
    }

    #[test]
    fn test_invalid_patch_leaves_session_idle() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);

        let result = session.begin(Some(&serde_json::json!({"problemUrgency": "EVENTUALLY"})));

        assert!(matches!(result, Err(SessionError::InvalidBrief(_))));
        assert_eq!(session.status(), &SimulationStatus::Idle);
    }

    #[test]
    fn test_draft_roundtrip_and_clear() {
        let store = Arc::new(MemoryStore::new());
        let session = new_session(store, 8);
        let mut draft = StartupBrief {
            startup_name: "Acme".into(),
            problem_urgency: Urgency::Critical,
            estimated_cac: "$300".into(),
            ..Default::default()
        };
        draft.add_additional_field();
        draft.update_additional_field(0, Some("Team"), Some("2"));

        session.save_draft(&draft).unwrap();
        assert_eq!(session.load_draft(), Some(draft));

        session.clear_draft().unwrap();
        session.clear_draft().unwrap();
        assert_eq!(session.load_draft(), None);
    }

    #[test]
    fn test_corrupt_draft_is_no_draft() {
        let store = Arc::new(MemoryStore::new());
        store.set(DRAFT_KEY, "{\"startupName\": ").unwrap();
        let session = new_session(store, 8);

        assert_eq!(session.load_draft(), None);
    }

    #[test]
    fn test_success_clears_draft_failure_keeps_it() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store.clone(), 8);
        let api = ScriptedApi::new(vec![Err(SubmissionError::new("down")), Ok(response("a", 60, 60, 60))]);

        session.save_draft(&StartupBrief::default()).unwrap();

        assert!(session.submit(&api, None).is_err());
        assert!(session.load_draft().is_some());

        session.submit(&api, None).unwrap();
        assert!(session.load_draft().is_none());
    }

    #[test]
    fn test_restore_picks_up_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut session = new_session(store.clone(), 8);
            let api = ScriptedApi::new(vec![Ok(response("sim-1", 80, 70, 60))]);
            session.update_field("geography", "EU".into()).unwrap();
            session.submit(&api, None).unwrap();
        }

        let restored = Session::restore(store, ScoreWeights::default(), 8);

        assert_eq!(restored.brief().geography, "EU");
        assert_eq!(restored.history().len(), 1);
        assert_eq!(restored.overall_score(), Some(70));
        assert_eq!(restored.status(), &SimulationStatus::Idle);
        assert_eq!(restored.displayed().unwrap().origin, ScoreOrigin::Confirmed);
    }

    #[test]
    fn test_restore_tolerates_bad_history_and_partial_brief() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                SESSION_KEY,
                r#"{"startupIdea": {"startupName": "Acme"}, "recentSimulations": {"oops": 1}}"#,
            )
            .unwrap();

        let restored = Session::restore(store, ScoreWeights::default(), 8);

        assert_eq!(restored.brief().startup_name, "Acme");
        assert_eq!(restored.brief().problem_urgency, Urgency::High);
        assert!(restored.history().is_empty());
    }

    #[test]
    fn test_restore_truncates_to_smaller_cap() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut session = new_session(store.clone(), 50);
            let runs = (0..12).map(|i| Ok(response(&i.to_string(), 60, 60, 60))).collect();
            let api = ScriptedApi::new(runs);
            for _ in 0..12 {
                session.submit(&api, None).unwrap();
            }
            assert_eq!(session.history().len(), 12);
        }

        let restored = Session::restore(store, ScoreWeights::default(), 8);
        assert_eq!(restored.history().len(), 8);
        assert_eq!(restored.history()[0].id, "11");
    }

    #[test]
    fn test_remote_lookups_degrade_to_empty() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let api = ScriptedApi::new(Vec::new());

        assert!(session.fetch_remote_history(&api).is_empty());
        assert_eq!(session.last_error(), Some("Unable to load simulations."));

        assert!(session.load_simulation(&api, "missing").is_none());
        assert!(session.active_simulation().is_none());
        assert_eq!(session.last_error(), Some("Simulation not found."));
    }

    #[test]
    fn test_reset_keeps_history() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);
        let api = ScriptedApi::new(vec![Ok(response("sim-1", 60, 60, 60))]);
        session.submit(&api, Some(&acme_patch())).unwrap();

        session.reset();

        assert_eq!(session.brief(), &StartupBrief::default());
        assert_eq!(session.status(), &SimulationStatus::Idle);
        assert!(session.overall_score().is_none());
        assert!(session.recommendations().is_empty());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_teardown_removes_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store.clone(), 8);
        session.update_field("startupName", "Acme".into()).unwrap();
        assert!(store.get(SESSION_KEY).unwrap().is_some());

        session.teardown().unwrap();

        assert!(store.get(SESSION_KEY).unwrap().is_none());
        assert_eq!(session.brief().startup_name, "");
    }

    #[test]
    fn test_additional_field_edits() {
        let store = Arc::new(MemoryStore::new());
        let mut session = new_session(store, 8);

        session.add_additional_field();
        assert!(session.update_additional_field(0, Some("Moat"), Some("Data network")));
        assert!(!session.update_additional_field(3, Some("x"), None));
        assert!(!session.remove_additional_field(3));
        assert_eq!(session.brief().additional_info[0].value, "Data network");
        assert!(session.remove_additional_field(0));
    }
}
