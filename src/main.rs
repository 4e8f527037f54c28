//! CLI entry point for the VIL dashboard.
//!
//! Connects to the gateway, streams telemetry to the console, and accepts
//! control commands on stdin:
//!
//! ```text
//! acquire | release | scenario <name> | scenarios | status | show | quit
//! ```
//!
//! # Usage
//!
//! ```bash
//! vil-dashboard --base-url http://192.168.1.20:8080
//! vil-dashboard --config config/dashboard.toml --log-level debug
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use vil_dashboard::config::{DashboardConfig, DEFAULT_CONFIG_PATH};
use vil_dashboard::render::ConsoleRenderer;
use vil_dashboard::{tracing_setup, DashboardSession, UiCommand};

#[derive(Parser)]
#[command(name = "vil-dashboard")]
#[command(about = "Vehicle-in-the-loop telemetry dashboard with fault-injection control", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Gateway base URL (overrides configuration and environment)
    #[arg(long)]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DashboardConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate()?;
    tracing_setup::init_from_config(&config)?;
    tracing::info!("{} starting", config.application.name);

    let renderer = Box::new(ConsoleRenderer::new(std::io::stdout()));
    let mut session = DashboardSession::from_config(&config, cli.base_url.as_deref(), renderer)?;

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(read_commands(tx.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(UiCommand::Quit).await;
        }
    });

    session.run(rx).await?;
    Ok(())
}

/// Forward parsed stdin lines to the session. EOF ends the session.
async fn read_commands(tx: mpsc::Sender<UiCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<UiCommand>() {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        return;
                    }
                }
                Err(e) => eprintln!("{e}"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(UiCommand::Quit).await;
}
