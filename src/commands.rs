use anyhow::{anyhow, bail, Context as _, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::api::{ApiClient, HttpSimulationApi, LocalSimulationApi, SimulationApi};
use crate::auth::AuthClient;
use crate::config::{ClientConfig, ScoreWeights};
use crate::data::{ScoreOrigin, ScoreSnapshot, SimulationDetail, StartupBrief};
use crate::playback::{run_with_playback, CancelToken, LogPlayback};
use crate::scoring::score_brief;
use crate::session::{Session, SimulationStatus};
use crate::storage::{FileStore, KeyValueStore};
use crate::validation::{first_failing_step, review_cards, validate_for_launch, validate_step, BriefStep};

/// Everything a command needs, built once in `main`
pub struct AppContext {
    pub config: ClientConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub weights: ScoreWeights,
}

impl AppContext {
    pub fn new(config: ClientConfig, weights: ScoreWeights) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.store_dir));
        Self {
            config,
            store,
            weights,
        }
    }

    pub fn session(&self) -> Session {
        Session::restore(self.store.clone(), self.weights.clone(), self.config.history_cap)
    }

    fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(self.config.api_base_url.clone(), self.store.clone())
    }

    fn simulation_api(&self, offline: bool) -> Result<Box<dyn SimulationApi>> {
        if offline {
            return Ok(Box::new(LocalSimulationApi::new(self.weights.clone())));
        }
        Ok(Box::new(HttpSimulationApi::new(self.api_client()?)))
    }

    fn auth(&self) -> Result<AuthClient> {
        Ok(AuthClient::new(self.api_client()?))
    }
}

/// Read a brief file as a JSON object of camelCase fields.
pub fn read_brief_patch<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read brief: {:?}", path))?;
    let patch: Value =
        serde_json::from_str(&content).with_context(|| format!("Brief is not valid JSON: {:?}", path))?;
    if !patch.is_object() {
        bail!("Brief must be a JSON object: {:?}", path);
    }
    Ok(patch)
}

/// Turn `field=value` pairs into a patch object.
pub fn parse_assignments(assignments: &[String]) -> Result<Value> {
    let mut patch = serde_json::Map::new();
    for assignment in assignments {
        let (field, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected field=value, got: {}", assignment))?;
        patch.insert(field.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(patch))
}

/// Fields of the saved draft that differ from an empty brief.
///
/// Laid over the session brief so unset draft fields never erase edits.
fn draft_overlay(session: &Session) -> Result<Value> {
    let Some(draft) = session.load_draft() else {
        return Ok(Value::Object(serde_json::Map::new()));
    };

    let blank = serde_json::to_value(StartupBrief::default())?;
    let Value::Object(fields) = serde_json::to_value(draft)? else {
        return Ok(Value::Object(serde_json::Map::new()));
    };
    let filled = fields
        .into_iter()
        .filter(|(key, value)| blank.get(key) != Some(value))
        .collect();
    Ok(Value::Object(filled))
}

/// Combined patch for a launch: saved draft, then brief file, then `--set`.
fn launch_patch(session: &Session, brief_file: Option<&str>, assignments: &[String]) -> Result<Value> {
    let mut merged = serde_json::Map::new();

    let mut layers = vec![draft_overlay(session)?];
    if let Some(file) = brief_file {
        layers.push(read_brief_patch(file)?);
    }
    layers.push(parse_assignments(assignments)?);

    for layer in layers {
        if let Value::Object(fields) = layer {
            merged.extend(fields);
        }
    }
    Ok(Value::Object(merged))
}

/// Session brief with the saved draft laid over it
fn working_brief(session: &Session) -> Result<StartupBrief> {
    let mut brief = session.brief().clone();
    brief.apply_patch(&draft_overlay(session)?)?;
    Ok(brief)
}

fn print_snapshot(label: &str, snapshot: &ScoreSnapshot) {
    println!("{} ({})", label, snapshot.origin);
    println!("  Market viability:    {}", snapshot.metrics.market_viability);
    println!("  Investor confidence: {}", snapshot.metrics.investor_confidence);
    println!("  Customer demand:     {}", snapshot.metrics.customer_demand);
    println!("  Overall:             {}", snapshot.overall_score);
}

pub struct RunOptions<'a> {
    pub brief_file: Option<&'a str>,
    pub assignments: &'a [String],
    pub offline: bool,
    pub playback: bool,
}

/// Validate, then launch a simulation with the agent log playing alongside.
pub fn run(ctx: &AppContext, options: RunOptions) -> Result<()> {
    let mut session = ctx.session();
    let patch = launch_patch(&session, options.brief_file, options.assignments)?;

    let mut preview = session.brief().clone();
    preview.apply_patch(&patch)?;
    let errors = validate_for_launch(&preview);
    if !errors.is_empty() {
        println!("Complete required fields before launch.");
        for error in &errors {
            println!("  {}: {}", error.field, error.message);
        }
        if let Some(step) = first_failing_step(&errors) {
            println!("First incomplete step: {}", step.title());
        }
        bail!("{} required field(s) missing", errors.len());
    }

    let api = ctx.simulation_api(options.offline)?;
    tracing::info!(offline = options.offline, base_url = %ctx.config.api_base_url, "Launching simulation");

    let step = if options.playback {
        ctx.config.playback_step()
    } else {
        std::time::Duration::ZERO
    };
    let playback = LogPlayback::new(step);
    let cancel = CancelToken::new();
    tracing::debug!(min_duration = ?playback.min_duration(), "Starting agent log playback");
    let show_logs = options.playback;

    let (outcome, _) = run_with_playback(
        &playback,
        &cancel,
        move |_, entry| {
            if show_logs {
                println!("[{}] {}", entry.role, entry.message);
            }
        },
        || session.submit(&*api, Some(&patch)),
    );

    match outcome {
        Ok(record) => {
            if let Some(snapshot) = session.displayed() {
                print_snapshot(&format!("Simulation {} for {}", record.id, record.name), snapshot);
            }
            println!("\nRecommendations:");
            for recommendation in session.recommendations() {
                println!("  - {}", recommendation);
            }
            Ok(())
        }
        Err(e) => {
            println!("Unable to launch simulation. Please try again.");
            Err(anyhow!(e))
        }
    }
}

/// Score a brief locally without touching the session.
pub fn estimate(ctx: &AppContext, brief_file: Option<&str>, assignments: &[String]) -> Result<()> {
    let mut brief = ctx.session().brief().clone();
    if let Some(file) = brief_file {
        brief.apply_patch(&read_brief_patch(file)?)?;
    }
    brief.apply_patch(&parse_assignments(assignments)?)?;

    let metrics = score_brief(&brief, &ctx.weights);
    let snapshot = ScoreSnapshot {
        metrics,
        overall_score: metrics.overall(),
        origin: ScoreOrigin::Estimated,
    };
    print_snapshot(&format!("Estimate for {}", brief.display_name()), &snapshot);
    Ok(())
}

/// Per-step validation report plus the review summary
pub fn validate(ctx: &AppContext, brief_file: Option<&str>) -> Result<()> {
    let session = ctx.session();
    let mut brief = working_brief(&session)?;
    if let Some(file) = brief_file {
        brief.apply_patch(&read_brief_patch(file)?)?;
    }

    let mut ok = true;
    for step in BriefStep::ALL {
        let errors = validate_step(&brief, step);
        if errors.is_empty() {
            println!("{:<28} OK", step.title());
        } else {
            ok = false;
            println!("{:<28} {} issue(s)", step.title(), errors.len());
            for error in errors {
                println!("  {}: {}", error.field, error.message);
            }
        }
    }

    println!();
    for card in review_cards(&brief) {
        println!("{:<16} {}", card.label, card.value);
    }

    if !ok {
        bail!("Brief is incomplete");
    }
    Ok(())
}

pub fn draft_save(ctx: &AppContext, brief_file: Option<&str>, assignments: &[String]) -> Result<()> {
    let session = ctx.session();
    let mut draft = working_brief(&session)?;
    if let Some(file) = brief_file {
        draft.apply_patch(&read_brief_patch(file)?)?;
    }
    draft.apply_patch(&parse_assignments(assignments)?)?;

    session.save_draft(&draft)?;

    println!("Draft saved.");
    Ok(())
}

pub fn draft_show(ctx: &AppContext) -> Result<()> {
    match ctx.session().load_draft() {
        Some(draft) => println!("{}", serde_json::to_string_pretty(&draft)?),
        None => println!("No saved draft."),
    }
    Ok(())
}

pub fn draft_clear(ctx: &AppContext) -> Result<()> {
    ctx.session().clear_draft()?;
    println!("Draft cleared.");
    Ok(())
}

pub fn brief_show(ctx: &AppContext) -> Result<()> {
    let session = ctx.session();
    println!("{}", serde_json::to_string_pretty(session.brief())?);
    Ok(())
}

pub fn brief_set(ctx: &AppContext, assignments: &[String]) -> Result<()> {
    let mut session = ctx.session();
    for assignment in assignments {
        let (field, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected field=value, got: {}", assignment))?;
        session.update_field(field.trim(), Value::String(value.to_string()))?;
    }
    println!("Updated {} field(s).", assignments.len());
    Ok(())
}

pub fn brief_add_info(ctx: &AppContext, label: &str, value: &str) -> Result<()> {
    let mut session = ctx.session();
    session.add_additional_field();
    let index = session.brief().additional_info.len() - 1;
    session.update_additional_field(index, Some(label), Some(value));
    println!("Added additional info #{}.", index);
    Ok(())
}

pub fn brief_remove_info(ctx: &AppContext, index: usize) -> Result<()> {
    let mut session = ctx.session();
    if !session.remove_additional_field(index) {
        bail!("No additional info at index {}", index);
    }
    println!("Removed additional info #{}.", index);
    Ok(())
}

/// Local run history, most recent first
pub fn history(ctx: &AppContext) -> Result<()> {
    let session = ctx.session();

    if let SimulationStatus::Failed { message } = session.status() {
        println!("Last run failed: {}", message);
    }

    if session.history().is_empty() {
        println!("No simulations yet.");
        return Ok(());
    }

    println!("Recent simulations ({}/{})\n", session.history().len(), session.history_cap());
    println!("{:<38} {:<24} {:<10} {:<6} ORIGIN", "ID", "NAME", "STATUS", "SCORE");
    println!("{}", "-".repeat(92));
    for record in session.history() {
        println!(
            "{:<38} {:<24} {:<10} {:<6} {}",
            record.id,
            truncate(&record.name, 24),
            format!("{:?}", record.status),
            record.score,
            record.origin
        );
    }

    if let Some(snapshot) = session.displayed() {
        println!();
        print_snapshot("Dashboard", snapshot);
    }
    Ok(())
}

/// Runs stored by the backend
pub fn list(ctx: &AppContext) -> Result<()> {
    let mut session = ctx.session();
    let api = ctx.simulation_api(false)?;
    let runs = session.fetch_remote_history(&*api);

    if let Some(error) = session.last_error() {
        bail!("{}", error);
    }
    if runs.is_empty() {
        println!("No simulations found.");
        return Ok(());
    }

    println!("{:<38} {:<24} {:<10} {:<6} CREATED", "ID", "NAME", "STATUS", "SCORE");
    println!("{}", "-".repeat(100));
    for run in runs {
        println!(
            "{:<38} {:<24} {:<10} {:<6} {}",
            run.simulation_id,
            truncate(&run.startup_name, 24),
            run.status,
            run.overall_score,
            run.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Full detail of one backend run
pub fn show(ctx: &AppContext, simulation_id: &str, format: &str) -> Result<()> {
    let mut session = ctx.session();
    let api = ctx.simulation_api(false)?;

    if session.load_simulation(&*api, simulation_id).is_none() {
        bail!(
            "{}",
            session.last_error().unwrap_or("Unable to load simulation details.")
        );
    }
    let detail = session
        .active_simulation()
        .ok_or_else(|| anyhow!("Unable to load simulation details."))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(detail)?),
        _ => print_detail(detail),
    }
    Ok(())
}

fn print_detail(detail: &SimulationDetail) {
    let run = &detail.run;
    println!("# {}\n", run.startup_name);
    println!("**Overall:** {}/100", run.overall_score);
    println!(
        "**Market viability:** {}  **Investor confidence:** {}  **Customer demand:** {}\n",
        run.metrics.market_viability, run.metrics.investor_confidence, run.metrics.customer_demand
    );

    if let Some(synthesis) = run.synthesis.as_deref().filter(|s| !s.is_empty()) {
        println!("{}\n", synthesis);
    }

    for agent in &run.agents {
        println!("## {} ({}% confidence)\n", agent.perspective, agent.confidence);
        println!("{}", agent.summary);
        for opportunity in agent.opportunities.iter().take(2) {
            println!("  + {}", opportunity);
        }
        println!();
    }

    let opportunities = detail.top_opportunities(4);
    if !opportunities.is_empty() {
        println!("## Top opportunities");
        for item in opportunities {
            println!("- {}", item);
        }
    }

    let risks = detail.top_risks(4);
    if !risks.is_empty() {
        println!("\n## Top risks");
        for item in risks {
            println!("- {}", item);
        }
    }

    if let Some(recommendations) = &run.recommendations {
        println!("\n## Recommendations");
        for item in recommendations {
            println!("- {}", item);
        }
    }
}

pub fn reset(ctx: &AppContext, all: bool) -> Result<()> {
    let mut session = ctx.session();
    if all {
        session.teardown()?;
        session.clear_draft()?;
        println!("Session and draft removed.");
    } else {
        session.reset();
        println!("Brief reset.");
    }
    Ok(())
}

pub fn login(ctx: &AppContext, email: &str, password: &str) -> Result<()> {
    let user = ctx.auth()?.sign_in(email, password)?;
    println!("Signed in as {} <{}>", user.full_name, user.email);
    Ok(())
}

pub fn signup(ctx: &AppContext, full_name: &str, email: &str, password: &str) -> Result<()> {
    let user = ctx.auth()?.sign_up(full_name, email, password)?;
    println!("Account created for {} <{}>", user.full_name, user.email);
    Ok(())
}

pub fn logout(ctx: &AppContext) -> Result<()> {
    ctx.auth()?.sign_out();
    println!("Signed out.");
    Ok(())
}

pub fn profile(ctx: &AppContext) -> Result<()> {
    let user = ctx.auth()?.check_profile()?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub fn forgot_password(ctx: &AppContext, email: &str) -> Result<()> {
    println!("{}", ctx.auth()?.forgot_password(email)?);
    Ok(())
}

pub fn reset_password(ctx: &AppContext, token: &str, new_password: &str) -> Result<()> {
    println!("{}", ctx.auth()?.reset_password(token, new_password)?);
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
