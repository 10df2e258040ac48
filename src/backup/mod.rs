mod logic;
pub(crate) mod runner;
pub(crate) mod s3_upload;
pub(crate) mod xtrabackup;

use crate::config::ServiceConfig;
use anyhow::Result;

/// Public entry point for the backup service loop.
pub async fn run_backup_service(config: &ServiceConfig) -> Result<()> {
    logic::run_service(config).await
}
