pub mod models {
    pub mod fewsnet;
    pub mod maproom;
}

pub mod client;
pub mod config;
pub mod render;
pub mod utils;
pub mod services {
    pub mod fewsnet;
    pub mod flatten;
    pub mod forecast;
    pub mod regions;
    pub mod tables;
}

use crate::client::{Fetched, TriggerClient, UreqTransport};
use crate::config::{Config, load_env_file};
use crate::services::{fewsnet, tables};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

fn write_html(path: &Path, html: &str) -> Result<(), String> {
    std::fs::write(path, html).map_err(|e| format!("writing {} failed: {}", path.display(), e))?;
    info!("Wrote {} ({} bytes)", path.display(), html.len());
    Ok(())
}

pub fn run() -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (maproom={}, mode={}, months={:?}, frequencies={:?}, threshold_protocol={}, auth={}, ipc_enabled={})",
        cfg.maproom,
        cfg.mode,
        cfg.issue_months,
        cfg.frequencies,
        cfg.threshold_protocol,
        if cfg.credentials.is_anonymous() { "anonymous" } else { "basic" },
        cfg.ipc_enabled
    );
    if cfg.credentials.is_anonymous() {
        warn!("IRI_USERNAME/IRI_PASSWORD not set; maproom requests are sent without credentials");
    }

    let client = TriggerClient::new(
        UreqTransport::new(cfg.http_timeout),
        cfg.endpoints.clone(),
        cfg.credentials.clone(),
    );

    let collection = tables::build_trigger_tables(&client, &cfg.trigger_request()).map_err(|e| e.to_string())?;
    let rows = tables::collect_rows(&collection);
    let total: usize = collection.values().map(|t| t.len()).sum();
    info!("Collected {} of {} trigger row(s)", rows.len(), total);

    let title = format!("Trigger dashboard - {} admin{}", cfg.maproom, cfg.mode);
    write_html(&cfg.output_html, &render::render_dashboard(&title, &rows))?;

    if cfg.ipc_enabled {
        match fewsnet::run_ipc_job(&client, &cfg.ipc_filter()).map_err(|e| format!("IPC job failed: {}", e))? {
            Fetched::Data(summary) => write_html(&cfg.ipc_output_html, &render::render_ipc_summary(&summary))?,
            Fetched::NoData(n) => warn!("IPC summary skipped: {}", n),
        }
    } else {
        info!("IPC summary disabled via IPC_ENABLED={}", cfg.ipc_enabled);
    }

    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next();

    let mut env_file: Option<PathBuf> = None;
    let mut set_env_file = |value: &str| -> Result<(), String> {
        if env_file.is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
        if value.is_empty() {
            return Err("`--env-file` requires a path argument".to_string());
        }
        env_file = Some(PathBuf::from(value));
        Ok(())
    };

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                set_env_file(&value.to_string_lossy())?;
            }
            Some(s) if s.starts_with("--env-file=") => set_env_file(&s["--env-file=".len()..])?,
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    let (path, explicit) = match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    let applied = load_env_file(&path)?;
    Ok(Some(LoadedEnvFile { path, explicit, applied }))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // After the env file, so RUST_LOG from it is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "trigger-monitor {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
