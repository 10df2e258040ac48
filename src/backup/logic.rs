use anyhow::Result;
use chrono::Local;
use tokio::time::sleep;

use super::runner::ToolRunner;
use super::s3_upload::{self, RemoteStore, SpacesStore};
use super::xtrabackup;
use crate::config::ServiceConfig;
use crate::retention::{cleanup, policy};
use crate::utils::setting::{self, DatabaseTarget};

/// Everything resolved once at startup and immutable for the process
/// lifetime: the replica target, the runner identity and the processor
/// budget of the backup host.
pub struct ServiceContext {
    pub target: DatabaseTarget,
    pub runner: ToolRunner,
    pub processors: u32,
}

impl ServiceContext {
    /// Startup resolution. Connection acquisition is the only step that
    /// retries; everything else fails the process immediately.
    pub async fn resolve(config: &ServiceConfig) -> Result<Self> {
        let runner = ToolRunner::resolve(config.backup_container.as_deref())?;
        let processors = runner.detect_processors()?;
        println!("✓ Backup host reports {} processors", processors);

        let target = setting::resolve_target(&config.database_name, &config.replica_sources)?;
        setting::acquire_connection(&target).await?;

        Ok(ServiceContext {
            target,
            runner,
            processors,
        })
    }
}

/// Runs backup cycles forever, one at a time with a fixed sleep in between.
/// Only a fatal error returns.
pub async fn run_service(config: &ServiceConfig) -> Result<()> {
    let context = ServiceContext::resolve(config).await?;
    let store = SpacesStore::connect(&config.spaces_config).await;

    loop {
        run_cycle(config, &context, &store).await?;
        println!(
            "💤 Sleeping {}s until the next cycle",
            config.cycle_interval.as_secs()
        );
        sleep(config.cycle_interval).await;
    }
}

/// One full backup→upload→cleanup pass for the configured database. The
/// cycle's timestamp token is assigned here and names the stream file, its
/// log and the remote object key.
pub async fn run_cycle(
    config: &ServiceConfig,
    context: &ServiceContext,
    store: &dyn RemoteStore,
) -> Result<()> {
    let token = Local::now().format(policy::TIMESTAMP_FORMAT).to_string();
    println!("🚀 Starting backup cycle {} for {}", token, context.target.database);

    let artifact = xtrabackup::take_backup(
        &context.runner,
        &context.target,
        &config.staging_dir,
        context.processors,
        config.safe_slave_timeout.as_secs(),
        &token,
    )?;

    let prefix = config.spaces_config.folder_prefix.as_deref();
    let root = s3_upload::remote_root(prefix, &context.target.database);
    let key = s3_upload::remote_key(prefix, &context.target.database, artifact.file_name());
    s3_upload::upload_artifact(store, &artifact.stream_path, &root, &key).await?;

    cleanup::cleanup_local(config, store).await?;
    cleanup::cleanup_remote(config, store).await?;

    println!(
        "🎉 Cycle {} completed for {}",
        artifact.token, context.target.database
    );
    Ok(())
}
