//! Replica Backup Service
//!
//! Streams XtraBackup artifacts from a live MySQL replica into local
//! staging, uploads them to S3-compatible object storage and enforces
//! time-based retention in both tiers.

// backuprunner/src/main.rs
mod backup;
mod config;
mod errors;
mod retention;
mod utils;

use anyhow::{Context, Result};
use config::ServiceConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        // the service loop never returns Ok; exit zero has no graceful path
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = resolve_config_path();
    let service_config = ServiceConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load service configuration from {}",
            config_path.display()
        )
    })?;

    println!(
        "🚀 Replica backup service starting for database {}",
        service_config.database_name
    );
    backup::run_backup_service(&service_config).await
}

/// Config path resolution: first CLI argument, then the BACKUP_CONFIG
/// environment variable, then ./config.json.
fn resolve_config_path() -> PathBuf {
    if let Some(arg) = env::args().nth(1) {
        return PathBuf::from(arg);
    }
    if let Ok(path) = env::var("BACKUP_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from("config.json")
}
