//! ktv-pd (Program Director)
//!
//! Generates the channel grid and serves the playhead over HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use ktv_common::config::{
    resolve_config_path, resolve_data_path, CATALOG_ENV_VAR, CONFIG_ENV_VAR, STATE_ENV_VAR,
};
use ktv_common::time::{format_clock, parse_clock};
use ktv_common::{Clock, EventBus, JsonFileStore, SystemClock};
use ktv_pd::api;
use ktv_pd::catalog::{log_census, ContentCatalog, FileCatalog};
use ktv_pd::tuner::Tuner;
use ktv_pd::{ChannelConfig, ChannelService, ScheduleGenerator};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ktv-pd")]
#[command(about = "Program Director for the kids' TV channel")]
#[command(version)]
struct Args {
    /// Channel configuration (TOML)
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Content catalog (TOML or JSON)
    #[arg(long, global = true, env = CATALOG_ENV_VAR)]
    catalog: Option<PathBuf>,

    /// Rotation and resume state file
    #[arg(long, global = true, env = STATE_ENV_VAR)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one day's grid
    Generate {
        /// Broadcast date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Print JSON instead of a text grid
        #[arg(long)]
        json: bool,
    },

    /// Print seven days of grids
    Week {
        /// First date of the week, today when omitted
        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Resolve the playhead
    Now {
        /// Wall-clock time (HH:MM[:SS]), now when omitted
        #[arg(long)]
        at: Option<String>,

        /// Date to resolve on, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run the HTTP API and the tuner
    Serve {
        #[arg(short, long, default_value = "5730", env = "KTV_PD_PORT")]
        port: u16,

        /// Seconds between playhead polls
        #[arg(long, default_value = "5")]
        poll_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = ChannelConfig::load(config_path.as_deref());

    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ktv_pd={level},ktv_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting KTV Program Director v{}", env!("CARGO_PKG_VERSION"));

    let config = config.context("Failed to load channel configuration")?;
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    let catalog_path = resolve_data_path(args.catalog.as_deref(), CATALOG_ENV_VAR, "catalog.toml");
    let state_path = resolve_data_path(args.state.as_deref(), STATE_ENV_VAR, "state.json");
    info!("Catalog: {}", catalog_path.display());
    info!("State: {}", state_path.display());

    let service = build_service(config, &catalog_path, &state_path)?;

    match args.command {
        Command::Generate { date, json } => {
            let date = date.unwrap_or_else(|| service.clock().today());
            let day = service.day_for(date).await.context("Failed to generate schedule")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&day)?);
            } else {
                print!("{}", day.render());
            }
        }

        Command::Week { start, json } => {
            let start = start.unwrap_or_else(|| service.clock().today());
            let items = service.catalog_items().context("Failed to read catalog")?;
            log_census(&items);

            let recorder = service.recorder();
            let week = ScheduleGenerator::new(service.config()).generate_week(
                &items,
                recorder.tracker(),
                recorder.planner(),
                start,
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&week)?);
            } else {
                for day in week.values() {
                    println!("{}", day.render());
                }
            }
        }

        Command::Now { at, date } => {
            let now = service.clock().now();
            let date = date.unwrap_or(now.date());
            let time = match at {
                Some(text) => {
                    let secs = parse_clock(&text).context("Invalid --at time")?;
                    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
                        .context("--at must be before 24:00")?
                }
                None => now.time(),
            };

            let (_, playhead) = service.playhead_at(date.and_time(time)).await?;
            match &playhead.current {
                Some(program) => println!(
                    "{} {} {} at {} of {}",
                    format_clock(ktv_common::time::seconds_since_midnight(time)),
                    program.category,
                    program.content_id,
                    playhead.video_position,
                    program.content_duration
                ),
                None => println!(
                    "{} off air ({:?}), next: {}",
                    format_clock(ktv_common::time::seconds_since_midnight(time)),
                    playhead.off_air_reason,
                    playhead
                        .next
                        .as_ref()
                        .map(|p| format!("{} at {}", p.content_id, format_clock(p.start_time)))
                        .unwrap_or_else(|| "nothing today".to_string())
                ),
            }
        }

        Command::Serve { port, poll_seconds } => {
            let today = service.clock().today();
            if let Err(e) = service.generate_week(today).await {
                warn!("Initial week generation failed: {}", e);
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let tuner = tokio::spawn(
                Tuner::new(Arc::clone(&service)).run(Duration::from_secs(poll_seconds.max(1)), shutdown_rx),
            );

            info!("Health check: http://127.0.0.1:{}/health", port);
            api::run(Arc::clone(&service), port, shutdown_signal())
                .await
                .context("HTTP server failed")?;

            let _ = shutdown_tx.send(true);
            if let Err(e) = tuner.await {
                warn!("Tuner task ended abnormally: {}", e);
            }
            info!("Shutdown complete");
        }
    }

    Ok(())
}

fn build_service(config: ChannelConfig, catalog_path: &Path, state_path: &Path) -> Result<Arc<ChannelService>> {
    let store = JsonFileStore::open(state_path)
        .with_context(|| format!("Failed to open state file {}", state_path.display()))?;
    let catalog: Arc<dyn ContentCatalog> = Arc::new(FileCatalog::new(catalog_path));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    Ok(ChannelService::new(
        config,
        catalog,
        Arc::new(store),
        clock,
        EventBus::new(100),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
