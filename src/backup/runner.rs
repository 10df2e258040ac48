// backuprunner/src/backup/runner.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use which::which;

use crate::errors::BackupError;

pub const BACKUP_TOOL: &str = "xtrabackup";

/// How backup-tool commands reach the host that runs them: a binary on this
/// machine's PATH, or `docker exec` against a running container. Resolved
/// once at startup and immutable for the process lifetime.
#[derive(Debug, Clone)]
pub enum ToolRunner {
    Direct { tool_path: PathBuf },
    Docker { docker_path: PathBuf, container: String },
}

impl ToolRunner {
    pub fn resolve(backup_container: Option<&str>) -> Result<Self> {
        match backup_container {
            Some(container) => {
                let docker_path = which("docker").context(
                    "docker executable not found in PATH, but backup_container is configured",
                )?;
                let output = Command::new(&docker_path)
                    .args(["inspect", "-f", "{{.State.Running}}", container])
                    .output()
                    .with_context(|| format!("Failed to inspect container {}", container))?;
                let running = String::from_utf8_lossy(&output.stdout);
                if !output.status.success() || running.trim() != "true" {
                    return Err(BackupError::ContainerUnavailable(container.to_string()).into());
                }
                println!("✓ Backup container {} is running", container);
                Ok(ToolRunner::Docker {
                    docker_path,
                    container: container.to_string(),
                })
            }
            None => {
                let tool_path = which(BACKUP_TOOL).context(
                    "xtrabackup executable not found in PATH. Install Percona XtraBackup or configure backup_container.",
                )?;
                println!("✓ Found {} at {}", BACKUP_TOOL, tool_path.display());
                Ok(ToolRunner::Direct { tool_path })
            }
        }
    }

    /// Builds a command running `program` with `args` on the backup host.
    /// Arguments stay a structured list end to end; nothing passes through a
    /// shell.
    pub fn command(&self, program: &str, args: &[String]) -> Command {
        match self {
            ToolRunner::Direct { tool_path } => {
                let mut cmd = if program == BACKUP_TOOL {
                    Command::new(tool_path)
                } else {
                    Command::new(program)
                };
                cmd.args(args);
                cmd
            }
            ToolRunner::Docker {
                docker_path,
                container,
            } => {
                let mut cmd = Command::new(docker_path);
                cmd.arg("exec").arg(container).arg(program).args(args);
                cmd
            }
        }
    }

    /// Queries the backup host for its processor count, once per process.
    pub fn detect_processors(&self) -> Result<u32> {
        let output = self
            .command("nproc", &[])
            .output()
            .context("Failed to run nproc on the backup host")?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "nproc failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        parse_processor_count(&String::from_utf8_lossy(&output.stdout))
    }
}

/// nproc output must be a positive integer.
pub fn parse_processor_count(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let count = trimmed
        .parse::<u32>()
        .map_err(|_| BackupError::ProcessorCount(trimmed.to_string()))?;
    if count == 0 {
        return Err(BackupError::ProcessorCount(trimmed.to_string()).into());
    }
    Ok(count)
}
