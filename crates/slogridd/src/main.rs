//! slogridd — the slogrid daemon.
//!
//! Single binary that loads a slogrid.toml, builds the objective registry
//! and coupling rules, and runs the governor loop against an in-process
//! backpressure controller until interrupted.
//!
//! # Usage
//!
//! ```text
//! slogridd init --path slogrid.toml
//! slogridd run --config slogrid.toml
//! slogridd alerts --config slogrid.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use slogrid_coupling::InMemoryController;
use slogrid_governor::{Governor, GovernorSettings};
use slogrid_metrics::{health_report, render_alert_rules};
use slogrid_slo::StaticBackend;

use config::SlogridConfig;

#[derive(Parser)]
#[command(name = "slogridd", about = "SLO-aware backpressure governor daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the governor loop until Ctrl-C.
    Run {
        /// Path to the configuration file.
        #[arg(long, default_value = "slogrid.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file without running.
    Check {
        #[arg(long, default_value = "slogrid.toml")]
        config: PathBuf,
    },
    /// Render Prometheus alerting rules for the configured objectives.
    Alerts {
        #[arg(long, default_value = "slogrid.toml")]
        config: PathBuf,
    },
    /// Write a worked example configuration.
    Init {
        /// Where to write the scaffold.
        #[arg(long, default_value = "slogrid.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,slogridd=debug,slogrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Check { config } => check(config),
        Command::Alerts { config } => alerts(config),
        Command::Init { path } => init(path),
    }
}

async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    info!(config = ?config_path, "slogrid daemon starting");

    let config = SlogridConfig::from_file(&config_path)?;
    let registry = Arc::new(config.build_registry()?);
    let settings: GovernorSettings = config.settings();

    // ── Initialize subsystems ──────────────────────────────────

    // Metric backend fed by the [demo] section.
    let mut backend = StaticBackend::new();
    for (objective, compliance) in &config.demo.compliance {
        backend.set(objective, *compliance);
    }
    info!(objectives = registry.len(), "objective registry built");

    // In-process backpressure controller and strategy manager.
    let controller = InMemoryController::default();

    let mut governor = Governor::new(
        registry.clone(),
        Arc::new(backend),
        Arc::new(controller.clone()),
        Arc::new(controller),
        settings,
    );

    // Event log loop.
    let mut events = governor.subscribe_events();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "governor event");
        }
    });

    for rule in config.rules {
        let id = rule.id.clone();
        governor.register_rule(rule)?;
        info!(rule = %id, "rule registered");
    }
    governor.start();

    // Graceful shutdown on Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    governor.stop().await;

    // Final health report.
    let status = governor.status().await;
    if let Some(outcome) = &status.last_outcome {
        let report = health_report(&registry, outcome, &status.coupling);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        warn!("no evaluation completed before shutdown");
    }
    event_log.abort();

    info!(ticks = status.ticks, "slogrid daemon stopped");
    Ok(())
}

fn check(config_path: PathBuf) -> anyhow::Result<()> {
    let config = SlogridConfig::from_file(&config_path)?;
    let registry = config.build_registry()?;
    for rule in &config.rules {
        rule.validate()?;
    }
    for rule in &config.rules {
        for objective in &rule.trigger.objectives {
            if objective != slogrid_types::WILDCARD_OBJECTIVE && registry.get(objective).is_none() {
                warn!(rule = %rule.id, %objective, "rule watches an undeclared objective");
            }
        }
    }
    println!(
        "ok: {} objective(s), {} rule(s)",
        registry.len(),
        config.rules.len()
    );
    Ok(())
}

fn alerts(config_path: PathBuf) -> anyhow::Result<()> {
    let config = SlogridConfig::from_file(&config_path)?;
    let registry = config.build_registry()?;
    println!("{}", render_alert_rules(&registry));
    Ok(())
}

fn init(path: PathBuf) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite {}", path.display());
    }
    let scaffold = SlogridConfig::scaffold().to_toml_string()?;
    std::fs::write(&path, scaffold)?;
    println!("wrote {}", path.display());
    Ok(())
}
