use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod commands;
mod config;
mod data;
mod playback;
mod scoring;
mod session;
mod storage;
mod validation;

use commands::{AppContext, RunOptions};
use config::{ClientConfig, ScoreWeights, DEFAULT_HISTORY_CAP};

#[derive(Parser)]
#[command(name = "pentra")]
#[command(about = "Pentra CLI - draft startup briefs and run market simulations", long_about = None)]
struct Cli {
    /// Directory holding drafts, session state and credentials
    #[arg(long, global = true, default_value = ".pentra")]
    store_dir: PathBuf,

    /// Backend base URL (falls back to PENTRA_API_BASE_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Number of recent simulations kept locally
    #[arg(long, global = true, default_value_t = DEFAULT_HISTORY_CAP)]
    history_cap: usize,

    /// JSON file overriding the heuristic score weights
    #[arg(long, global = true)]
    weights: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a simulation for the current brief
    Run {
        /// Brief JSON file merged over the saved draft
        #[arg(long)]
        brief: Option<String>,

        /// Field override, e.g. --set geography=US
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        assignments: Vec<String>,

        /// Score locally instead of calling the backend
        #[arg(long)]
        offline: bool,

        /// Skip the agent log playback
        #[arg(long)]
        no_playback: bool,

        /// Delay between agent log entries in milliseconds
        #[arg(long)]
        step_ms: Option<u64>,
    },

    /// Show the local score estimate for a brief
    Estimate {
        #[arg(long)]
        brief: Option<String>,

        #[arg(long = "set", value_name = "FIELD=VALUE")]
        assignments: Vec<String>,
    },

    /// Check the draft step by step
    Validate {
        #[arg(long)]
        brief: Option<String>,
    },

    /// Manage the saved draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Edit the session brief
    Brief {
        #[command(subcommand)]
        action: BriefAction,
    },

    /// Recent simulations kept locally
    History,

    /// Simulations stored by the backend
    List,

    /// Show one backend simulation
    Show {
        /// Simulation ID to show
        #[arg(long)]
        id: String,

        /// Output format (md or json)
        #[arg(long, default_value = "md")]
        format: String,
    },

    /// Clear the brief, or everything with --all
    Reset {
        #[arg(long)]
        all: bool,
    },

    /// Account management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Save fields into the draft
    Save {
        #[arg(long)]
        brief: Option<String>,

        #[arg(long = "set", value_name = "FIELD=VALUE")]
        assignments: Vec<String>,
    },

    /// Print the saved draft
    Show,

    /// Delete the saved draft
    Clear,
}

#[derive(Subcommand)]
enum BriefAction {
    /// Print the session brief
    Show,

    /// Set one or more fields
    Set {
        #[arg(value_name = "FIELD=VALUE", required = true)]
        assignments: Vec<String>,
    },

    /// Append a labelled additional info entry
    AddInfo { label: String, value: String },

    /// Remove an additional info entry by index
    RemoveInfo { index: usize },
}

#[derive(Subcommand)]
enum AuthAction {
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    Signup {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    Logout,

    /// Re-check the stored session with the backend
    Profile,

    ForgotPassword {
        #[arg(long)]
        email: String,
    },

    ResetPassword {
        #[arg(long)]
        token: String,

        #[arg(long)]
        password: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let weights = match &cli.weights {
        Some(path) => ScoreWeights::load(path)?,
        None => ScoreWeights::default(),
    };
    let mut config = ClientConfig::new(cli.api_url, cli.store_dir, cli.history_cap);
    if let Commands::Run {
        step_ms: Some(step_ms), ..
    } = &cli.command
    {
        config.playback_step_ms = *step_ms;
    }
    tracing::debug!(base_url = %config.api_base_url, store = ?config.store_dir, "Client configured");

    let ctx = AppContext::new(config, weights);

    match cli.command {
        Commands::Run {
            brief,
            assignments,
            offline,
            no_playback,
            ..
        } => {
            tracing::info!(offline = %offline, "Running simulation");
            commands::run(
                &ctx,
                RunOptions {
                    brief_file: brief.as_deref(),
                    assignments: &assignments,
                    offline,
                    playback: !no_playback,
                },
            )?;
        }
        Commands::Estimate { brief, assignments } => {
            commands::estimate(&ctx, brief.as_deref(), &assignments)?;
        }
        Commands::Validate { brief } => {
            commands::validate(&ctx, brief.as_deref())?;
        }
        Commands::Draft { action } => match action {
            DraftAction::Save { brief, assignments } => {
                commands::draft_save(&ctx, brief.as_deref(), &assignments)?;
            }
            DraftAction::Show => commands::draft_show(&ctx)?,
            DraftAction::Clear => commands::draft_clear(&ctx)?,
        },
        Commands::Brief { action } => match action {
            BriefAction::Show => commands::brief_show(&ctx)?,
            BriefAction::Set { assignments } => commands::brief_set(&ctx, &assignments)?,
            BriefAction::AddInfo { label, value } => commands::brief_add_info(&ctx, &label, &value)?,
            BriefAction::RemoveInfo { index } => commands::brief_remove_info(&ctx, index)?,
        },
        Commands::History => commands::history(&ctx)?,
        Commands::List => {
            tracing::info!("Listing simulations");
            commands::list(&ctx)?;
        }
        Commands::Show { id, format } => {
            tracing::info!(id = %id, format = %format, "Showing simulation");
            commands::show(&ctx, &id, &format)?;
        }
        Commands::Reset { all } => commands::reset(&ctx, all)?,
        Commands::Auth { action } => match action {
            AuthAction::Login { email, password } => commands::login(&ctx, &email, &password)?,
            AuthAction::Signup { name, email, password } => commands::signup(&ctx, &name, &email, &password)?,
            AuthAction::Logout => commands::logout(&ctx)?,
            AuthAction::Profile => commands::profile(&ctx)?,
            AuthAction::ForgotPassword { email } => commands::forgot_password(&ctx, &email)?,
            AuthAction::ResetPassword { token, password } => {
                commands::reset_password(&ctx, &token, &password)?;
            }
        },
    }

    Ok(())
}
