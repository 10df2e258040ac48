// backuprunner/src/backup/xtrabackup.rs
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use super::runner::{BACKUP_TOOL, ToolRunner};
use crate::errors::BackupError;
use crate::retention::policy::{LOG_SUFFIX, STREAM_SUFFIX};
use crate::utils::setting::DatabaseTarget;

pub const SUCCESS_MARKER: &str = "completed OK!";
const LOG_TAIL_LINES: usize = 20;

/// One cycle's output: the streamed backup plus its transient tool log, both
/// named by the cycle's timestamp token.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub token: String,
    pub stream_path: PathBuf,
    pub log_path: PathBuf,
}

impl BackupArtifact {
    pub fn new(staging_dir: &Path, token: &str) -> Self {
        BackupArtifact {
            token: token.to_string(),
            stream_path: staging_dir.join(format!("{}{}", token, STREAM_SUFFIX)),
            log_path: staging_dir.join(format!("{}{}", token, LOG_SUFFIX)),
        }
    }

    pub fn file_name(&self) -> &str {
        // built from token + suffix, always valid UTF-8
        self.stream_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

/// Deterministic argument list for one streaming backup of a live replica.
fn backup_args(
    target: &DatabaseTarget,
    processors: u32,
    safe_slave_timeout_secs: u64,
    token: &str,
) -> Vec<String> {
    let descriptor = &target.descriptor;
    vec![
        "--backup".to_string(),
        format!("--host={}", descriptor.host),
        format!("--port={}", descriptor.port),
        format!("--user={}", descriptor.user),
        format!("--password={}", descriptor.password),
        "--stream=xbstream".to_string(),
        "--compress=zstd".to_string(),
        format!("--compress-threads={}", processors / 2),
        format!("--parallel={}", processors),
        "--safe-slave-backup".to_string(),
        format!("--safe-slave-backup-timeout={}", safe_slave_timeout_secs),
        format!("--history={}_{}", target.database, token),
    ]
}

/// Runs one backup against the target replica, streaming stdout into the
/// artifact file and stderr into its log, then validates the tool's own
/// success marker before trusting the artifact. The log is removed once the
/// marker is confirmed.
pub fn take_backup(
    runner: &ToolRunner,
    target: &DatabaseTarget,
    staging_root: &Path,
    processors: u32,
    safe_slave_timeout_secs: u64,
    token: &str,
) -> Result<BackupArtifact> {
    let staging_dir = staging_root.join(&target.database);
    fs::create_dir_all(&staging_dir).with_context(|| {
        format!("Failed to create staging directory {}", staging_dir.display())
    })?;
    println!("📂 Staging backups under {}", staging_dir.display());

    let artifact = BackupArtifact::new(&staging_dir, token);
    let stream_file = File::create(&artifact.stream_path).with_context(|| {
        format!("Failed to create backup stream file {}", artifact.stream_path.display())
    })?;
    let log_file = File::create(&artifact.log_path).with_context(|| {
        format!("Failed to create backup log file {}", artifact.log_path.display())
    })?;

    println!(
        "🚀 Running {} for database {} ({})",
        BACKUP_TOOL, target.database, token
    );
    let args = backup_args(target, processors, safe_slave_timeout_secs, token);
    let status = runner
        .command(BACKUP_TOOL, &args)
        .stdout(Stdio::from(stream_file))
        .stderr(Stdio::from(log_file))
        .status()
        .with_context(|| format!("Failed to execute {}", BACKUP_TOOL))?;
    println!("🔍 {} exited with {}; checking completion marker", BACKUP_TOOL, status);

    verify_success(&artifact.log_path)?;
    println!("✅ {} reported '{}'", BACKUP_TOOL, SUCCESS_MARKER);

    fs::remove_file(&artifact.log_path).with_context(|| {
        format!("Failed to remove backup log {}", artifact.log_path.display())
    })?;

    Ok(artifact)
}

/// The tool reports success as the final line of its log. Anything else,
/// including an empty or truncated log, fails the cycle with the log tail
/// attached.
pub fn verify_success(log_path: &Path) -> Result<()> {
    let file = File::open(log_path)
        .with_context(|| format!("Failed to open backup log {}", log_path.display()))?;

    let mut tail: Vec<String> = Vec::new();
    for line in BufReader::new(file).lines() {
        let line =
            line.with_context(|| format!("Failed to read backup log {}", log_path.display()))?;
        if tail.len() == LOG_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line);
    }

    let last_line = tail.last().cloned().unwrap_or_default();
    if last_line.contains(SUCCESS_MARKER) {
        return Ok(());
    }
    Err(BackupError::ToolFailed {
        last_line,
        log_tail: tail.join("\n"),
    }
    .into())
}
