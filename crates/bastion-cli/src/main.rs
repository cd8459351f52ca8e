//! bastion - operator CLI for the training-platform control plane
//!
//! Boots a control plane from configuration and exposes:
//! - a seeded demo walkthrough (onboarding, invites, provisioning, redump)
//! - instance, challenge, agent, user, team and organization reports
//! - the activity ledger
//! - on-demand redump

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bastion_core::app::workflows::STANDARD_WORKFLOWS;
use bastion_core::app::{ActivityFilter, ControlPlane, ControlPlaneBuilder};
use bastion_core::domain::{ActivityKind, User};
use bastion_core::impls::ScriptedAgentFleet;
use bastion_core::store::{EntityStore, FileEntityStore, InMemoryEntityStore};
use bastion_core::ControlPlaneConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod demo;
mod output;

use output::Output;

#[derive(Parser)]
#[command(name = "bastion")]
#[command(about = "Training-platform control plane operator CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BASTION_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print JSON instead of text rows
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through onboarding, invites, provisioning and redump
    Demo,

    /// List live challenge instances
    Ps,

    /// List challenges with their flavors
    Challenges,

    /// List registered agents
    Agents,

    /// List users
    Users,

    /// List teams
    Teams,

    /// List organizations
    Organizations,

    /// Show the activity ledger
    Activities {
        /// Only activities of this kind, e.g. `team_invite_accept`
        #[arg(long)]
        kind: Option<String>,

        /// Only activities referencing or authored by this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Reconcile instance statuses with what agents report
    Redump {
        /// Instance, flavor, agent or user identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ControlPlaneConfig::load(cli.config.as_deref())?;

    let filter = if cli.verbose { "debug" } else { config.log.filter.as_str() };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let out = Output::new(cli.json);
    if let Commands::Config = cli.command {
        return out.single(&config, |c| format!("{c:#?}"));
    }

    let fleet = ScriptedAgentFleet::new();
    let plane = boot(&config, &fleet)?;
    if plane.snapshot().default_season().is_none() {
        demo::seed(&plane).await?;
    }

    match cli.command {
        Commands::Demo => demo::walkthrough(&plane, &fleet, &out).await,
        Commands::Ps => out.rows(&plane.ps(), |i| {
            format!(
                "{:<36} {:<20} {:<14} {:?}",
                i.slug.as_str(),
                i.label,
                i.agent.as_ref().map(|a| a.as_str()).unwrap_or("-"),
                i.status
            )
        }),
        Commands::Challenges => out.rows(&plane.challenges(), |c| {
            let flavors: Vec<String> = c
                .flavors
                .iter()
                .map(|f| format!("{} ({} up, {} down)", f.version, f.available, f.unavailable))
                .collect();
            format!("{:<20} {}", c.slug.as_str(), flavors.join(", "))
        }),
        Commands::Agents => out.rows(&plane.agents(), |a| {
            format!(
                "{:<24} default={:<5} reachable={:<5} seen={} registered={} instances={}",
                a.slug.as_str(), a.default_agent, a.reachable, a.times_seen, a.times_registered, a.instances
            )
        }),
        Commands::Users => out.rows(&plane.users(), |u| {
            format!(
                "{:<16} {:<28} team={} season={}",
                u.slug.as_str(),
                u.email,
                u.active_team.as_ref().map(|t| t.as_str()).unwrap_or("-"),
                u.active_season.as_ref().map(|s| s.as_str()).unwrap_or("-")
            )
        }),
        Commands::Teams => out.rows(&plane.teams(), |t| {
            format!(
                "{:<36} org={:<36} season={:<14} default={:<5} members={}",
                t.slug.as_str(),
                t.organization.as_ref().map(|o| o.as_str()).unwrap_or("-"),
                t.season.as_ref().map(|s| s.as_str()).unwrap_or("-"),
                t.is_default,
                t.members
            )
        }),
        Commands::Organizations => out.rows(&plane.organizations(), |o| {
            format!(
                "{:<36} {:<16} solo={:<5} teams={} members={}",
                o.slug.as_str(), o.name, o.solo, o.teams, o.members
            )
        }),
        Commands::Activities { kind, user } => {
            let filter = activity_filter(&plane, kind, user)?;
            out.rows(&plane.activities(&filter), output::activity_line)
        }
        Commands::Redump { ids } => {
            let outcomes = plane.fleet().redump(ids).await;
            out.redump(&outcomes)
        }
        Commands::Config => Ok(()),
    }
}

fn boot(config: &ControlPlaneConfig, fleet: &ScriptedAgentFleet) -> anyhow::Result<ControlPlane> {
    let store: Arc<dyn EntityStore> = match &config.store.path {
        Some(path) => Arc::new(
            FileEntityStore::open(path).with_context(|| format!("opening store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryEntityStore::new()),
    };
    let plane = ControlPlaneBuilder::new()
        .store(store)
        .agents(Arc::new(fleet.clone()))
        .config(config.clone())
        .with_standard_workflows()?
        .expect_workflows(STANDARD_WORKFLOWS)
        .build()?;
    Ok(plane)
}

fn activity_filter(
    plane: &ControlPlane,
    kind: Option<String>,
    user: Option<String>,
) -> anyhow::Result<ActivityFilter> {
    let kind = kind
        .map(|k| serde_json::from_value::<ActivityKind>(serde_json::Value::String(k)))
        .transpose()
        .context("unknown activity kind")?;
    let user = match user {
        Some(slug) => Some(
            plane
                .snapshot()
                .key_by_slug::<User>(&slug)
                .with_context(|| format!("unknown user {slug}"))?,
        ),
        None => None,
    };
    Ok(ActivityFilter {
        kind,
        user,
        ..ActivityFilter::default()
    })
}
