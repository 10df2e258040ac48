//! Retention sweeps over the local staging tier and the remote tier.
//!
//! The remote tier is authoritative for "durably stored": a local stream is
//! only removed once its remote copy is confirmed, or once it is so old that
//! even the remote window has passed and it is treated as abandoned.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::Path;

use super::policy;
use crate::backup::s3_upload::{remote_key, remote_root, RemoteStore};
use crate::config::ServiceConfig;

/// Removes staging entries past the local retention window. Log artifacts go
/// unconditionally; stream artifacts require a verified remote copy, with the
/// abandoned-artifact fallback once the remote window has also passed.
/// Individual deletion failures do not abort the sweep.
pub async fn cleanup_local(config: &ServiceConfig, store: &dyn RemoteStore) -> Result<()> {
    let staging_dir = config.staging_dir.join(&config.database_name);
    if !staging_dir.is_dir() {
        return Ok(());
    }

    println!("🧹 Sweeping local staging dir {}", staging_dir.display());
    let now = Local::now().naive_local();
    let entries = fs::read_dir(&staging_dir).with_context(|| {
        format!("Failed to enumerate staging directory {}", staging_dir.display())
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("❌ Failed to read staging entry: {}", err);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let file_name = file_name.to_string();

        if !policy::is_eligible_for_deletion(&file_name, now, config.local_retention.as_secs()) {
            continue;
        }

        if policy::is_log_artifact(&file_name) {
            remove_local_file(&path);
            continue;
        }

        // A stream artifact only leaves staging once the remote tier holds it.
        let key = remote_key(
            config.spaces_config.folder_prefix.as_deref(),
            &config.database_name,
            &file_name,
        );
        match store.exists(&key).await {
            Ok(true) => remove_local_file(&path),
            Ok(false) => {
                if policy::is_eligible_for_deletion(
                    &file_name,
                    now,
                    config.remote_retention.as_secs(),
                ) {
                    println!(
                        "🗑 Dropping abandoned local artifact {} (past the remote window, no remote copy)",
                        path.display()
                    );
                    remove_local_file(&path);
                } else {
                    eprintln!(
                        "⚠️ Keeping {}: not present in remote storage yet",
                        path.display()
                    );
                }
            }
            Err(err) => {
                eprintln!(
                    "❌ Could not check remote copy for {}: {:#}",
                    path.display(),
                    err
                );
            }
        }
    }

    Ok(())
}

fn remove_local_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => println!("🗑 Removed stale local artifact {}", path.display()),
        Err(err) => eprintln!("❌ Failed to remove {}: {}", path.display(), err),
    }
}

/// Deletes remote objects past the remote retention window. A truncated
/// listing skips the whole sweep for this cycle rather than acting on a
/// partial view. Individual deletion failures do not abort the sweep.
pub async fn cleanup_remote(config: &ServiceConfig, store: &dyn RemoteStore) -> Result<()> {
    let root = remote_root(
        config.spaces_config.folder_prefix.as_deref(),
        &config.database_name,
    );
    let listing = store
        .list(&root)
        .await
        .with_context(|| format!("Failed to list remote backups under {}", root))?;

    if listing.truncated {
        eprintln!(
            "⚠️ Remote listing under {} is truncated; skipping remote cleanup this cycle",
            root
        );
        return Ok(());
    }

    println!("🧹 Sweeping {} remote objects under {}", listing.keys.len(), root);
    let now = Local::now().naive_local();
    for key in &listing.keys {
        let file_name = key.rsplit_once('/').map(|(_, name)| name).unwrap_or(key);
        if !policy::is_eligible_for_deletion(file_name, now, config.remote_retention.as_secs()) {
            continue;
        }
        match store.delete(key).await {
            Ok(()) => println!("🗑 Removed expired remote backup {}", key),
            Err(err) => eprintln!("❌ Failed to remove remote backup {}: {:#}", key, err),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::s3_upload::testing::MemoryStore;
    use crate::config::SpacesConfig;
    use crate::retention::policy::TIMESTAMP_FORMAT;
    use std::collections::{BTreeSet, HashMap};
    use std::time::Duration;
    use tempfile::TempDir;

    const DAY: u64 = 86400;

    fn test_config(staging: &Path, local_secs: u64, remote_secs: u64) -> ServiceConfig {
        ServiceConfig {
            database_name: "orders".to_string(),
            replica_sources: HashMap::from([(
                "orders".to_string(),
                "mysql://u:p@localhost:3306".to_string(),
            )]),
            staging_dir: staging.to_path_buf(),
            local_retention: Duration::from_secs(local_secs),
            remote_retention: Duration::from_secs(remote_secs),
            cycle_interval: Duration::from_secs(3600),
            safe_slave_timeout: Duration::from_secs(300),
            backup_container: None,
            spaces_config: SpacesConfig {
                endpoint_url: "https://example.invalid".to_string(),
                region: "test".to_string(),
                access_key_id: "key".to_string(),
                secret_access_key: "secret".to_string(),
                bucket_name: "bucket".to_string(),
                folder_prefix: None,
            },
        }
    }

    /// Artifact name whose embedded timestamp lies `age_secs` in the past.
    fn name_aged(age_secs: i64, suffix: &str) -> String {
        let created = Local::now() - chrono::Duration::seconds(age_secs);
        format!("{}{}", created.format(TIMESTAMP_FORMAT), suffix)
    }

    fn stage(staging: &TempDir, name: &str) -> std::path::PathBuf {
        let dir = staging.path().join("orders");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"data").unwrap();
        path
    }

    #[tokio::test]
    async fn test_young_stream_is_kept() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let store = MemoryStore::default();
        let path = stage(&staging, &name_aged(300, ".xbstream"));

        cleanup_local(&config, &store).await?;

        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_old_log_deleted_young_stream_kept() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let store = MemoryStore::default();
        let stream = stage(&staging, &name_aged(300, ".xbstream"));
        let log = stage(&staging, &name_aged(2 * DAY as i64, ".xbstream.log"));

        cleanup_local(&config, &store).await?;

        assert!(stream.exists());
        assert!(!log.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_old_stream_with_remote_copy_is_deleted() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let name = name_aged(2 * DAY as i64, ".xbstream");
        let store = MemoryStore::with_objects([format!("orders/{}", name)]);
        let path = stage(&staging, &name);

        cleanup_local(&config, &store).await?;

        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_old_unverified_stream_is_skipped_inside_remote_window() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let store = MemoryStore::default();
        let path = stage(&staging, &name_aged(2 * DAY as i64, ".xbstream"));

        cleanup_local(&config, &store).await?;

        assert!(path.exists(), "unverified stream must survive inside the remote window");
        Ok(())
    }

    #[tokio::test]
    async fn test_abandoned_stream_past_remote_window_is_deleted() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let store = MemoryStore::default();
        let path = stage(&staging, &name_aged(8 * DAY as i64, ".xbstream"));

        cleanup_local(&config, &store).await?;

        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unrecognized_names_are_untouched() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let store = MemoryStore::default();
        let readme = stage(&staging, "README.txt");
        let partial = stage(&staging, "1999_01_01_00_00_00.partial");

        cleanup_local(&config, &store).await?;

        assert!(readme.exists());
        assert!(partial.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_staging_dir_is_a_noop() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let store = MemoryStore::default();

        cleanup_local(&config, &store).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_listing_skips_remote_sweep() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let old_key = format!("orders/{}", name_aged(30 * DAY as i64, ".xbstream"));
        let store = MemoryStore {
            truncated: true,
            ..MemoryStore::with_objects([old_key.clone()])
        };

        cleanup_remote(&config, &store).await?;

        assert!(store.keys().contains(&old_key), "no deletions on a truncated listing");
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_sweep_deletes_only_expired_objects() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let old_key = format!("orders/{}", name_aged(8 * DAY as i64, ".xbstream"));
        let young_key = format!("orders/{}", name_aged(DAY as i64, ".xbstream"));
        let store = MemoryStore::with_objects([old_key.clone(), young_key.clone()]);

        cleanup_remote(&config, &store).await?;

        let keys = store.keys();
        assert!(!keys.contains(&old_key));
        assert!(keys.contains(&young_key));
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_delete_failure_does_not_abort_sweep() -> anyhow::Result<()> {
        let staging = TempDir::new()?;
        let config = test_config(staging.path(), DAY, 7 * DAY);
        let failing_key = format!("orders/{}", name_aged(9 * DAY as i64, ".xbstream"));
        let other_key = format!("orders/{}", name_aged(8 * DAY as i64, ".xbstream"));
        let store = MemoryStore {
            fail_deletes: BTreeSet::from([failing_key.clone()]),
            ..MemoryStore::with_objects([failing_key.clone(), other_key.clone()])
        };

        cleanup_remote(&config, &store).await?;

        let keys = store.keys();
        assert!(keys.contains(&failing_key), "failed delete leaves the object");
        assert!(!keys.contains(&other_key), "sweep continues past the failure");
        Ok(())
    }
}
