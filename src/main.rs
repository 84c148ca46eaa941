//! `menu-sync` binary
//!
//! ```text
//! menu-sync [once|schedule|status] [--config <file>]
//! ```
//! - `once`: run one sync and exit (exit code 2 when another run holds the lock)
//! - `schedule`: run daily at the configured time until Ctrl+C (default)
//! - `status`: print the current progress snapshot as JSON

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use menu_catalog_sync_lib::application::{DailySchedule, run_daily};
use menu_catalog_sync_lib::build_coordinator;
use menu_catalog_sync_lib::commands::{get_sync_status, is_sync_in_progress, run_sync};
use menu_catalog_sync_lib::infrastructure::logging::default_log_directory;
use menu_catalog_sync_lib::infrastructure::{AppConfig, init_logging_with_config, log_system_info};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Schedule,
    Status,
}

#[derive(Debug)]
struct CliArgs {
    mode: Mode,
    config_path: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut mode = Mode::Schedule;
    let mut config_path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "once" => mode = Mode::Once,
            "schedule" => mode = Mode::Schedule,
            "status" => mode = Mode::Status,
            "--config" | "-c" => {
                let path = args.next().ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {} (usage: menu-sync [once|schedule|status] [--config <file>])", other),
        }
    }

    Ok(CliArgs { mode, config_path })
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("menu-sync: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = AppConfig::load(args.config_path.as_deref())?;

    // status 모드는 stdout을 JSON 전용으로 사용
    let mut logging = config.logging.clone();
    if args.mode == Mode::Status {
        logging.console_output = false;
        logging.file_output = true;
    }
    init_logging_with_config(&logging, &default_log_directory(&config.storage.data_dir))?;
    log_system_info();

    let coordinator = Arc::new(build_coordinator(&config).await?);

    match args.mode {
        Mode::Once => {
            let response = run_sync(&coordinator).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(match response.status_code() {
                200 => ExitCode::SUCCESS,
                409 => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            })
        }
        Mode::Status => {
            let snapshot = get_sync_status(&coordinator).await;
            let in_progress = is_sync_in_progress(&coordinator).await;
            let body = serde_json::json!({ "progress": snapshot, "inProgress": in_progress.in_progress });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        Mode::Schedule => {
            if !config.schedule.enabled {
                bail!("Scheduling is disabled in configuration (schedule.enabled = false)");
            }
            let schedule = DailySchedule::from_config(&config.schedule)?;
            let shutdown = CancellationToken::new();

            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("🛑 Shutdown requested"),
                    Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
                }
                signal_token.cancel();
            });

            run_daily(coordinator, schedule, shutdown).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}
