// backuprunner/src/backup/s3_upload.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;

use crate::config::SpacesConfig;
use crate::errors::BackupError;

/// One listing of remote object keys. `truncated` mirrors the provider's
/// pagination flag: when set, the listing is known-incomplete.
#[derive(Debug)]
pub struct RemoteListing {
    pub keys: Vec<String>,
    pub truncated: bool,
}

/// Durable-tier operations used by the uploader and the retention sweep.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Confirms the remote root is readable. Called before any transfer.
    async fn ensure_root(&self, root: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn list(&self, prefix: &str) -> Result<RemoteListing>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn transfer(&self, local_path: &Path, key: &str) -> Result<()>;
}

/// Object key for an artifact: `[prefix/]<database>/<file_name>`.
pub fn remote_key(folder_prefix: Option<&str>, database: &str, file_name: &str) -> String {
    match folder_prefix {
        Some(prefix) => format!("{}/{}/{}", prefix.trim_end_matches('/'), database, file_name),
        None => format!("{}/{}", database, file_name),
    }
}

/// Root prefix under which one database's artifacts live.
pub fn remote_root(folder_prefix: Option<&str>, database: &str) -> String {
    match folder_prefix {
        Some(prefix) => format!("{}/{}/", prefix.trim_end_matches('/'), database),
        None => format!("{}/", database),
    }
}

/// S3-compatible object storage client (DigitalOcean Spaces, AWS S3, MinIO).
pub struct SpacesStore {
    client: s3::Client,
    bucket: String,
}

impl SpacesStore {
    pub async fn connect(config: &SpacesConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        SpacesStore {
            client: s3::Client::new(&sdk_config),
            bucket: config.bucket_name.clone(),
        }
    }
}

#[async_trait]
impl RemoteStore for SpacesStore {
    async fn ensure_root(&self, root: &str) -> Result<()> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(root)
            .max_keys(1)
            .send()
            .await
            .with_context(|| {
                format!("Remote root {} is not readable in bucket {}", root, self.bucket)
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|service_err| service_err.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(err).with_context(|| {
                        format!("Failed to check object {} in bucket {}", key, self.bucket)
                    })
                }
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<RemoteListing> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .with_context(|| format!("Failed to list remote backups under {}", prefix))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        Ok(RemoteListing {
            keys,
            truncated: response.is_truncated().unwrap_or(false),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| {
                format!("Failed to delete object {} from bucket {}", key, self.bucket)
            })?;
        Ok(())
    }

    async fn transfer(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path).await.with_context(|| {
            format!("Failed to create ByteStream from file: {}", local_path.display())
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload file {} to bucket {} with key {}",
                    local_path.display(),
                    self.bucket,
                    key
                )
            })?;
        Ok(())
    }
}

/// Copies a finished artifact into the remote tier and verifies it landed.
/// A transfer call that reports success is not trusted until the object is
/// observable at the destination key.
pub async fn upload_artifact(
    store: &dyn RemoteStore,
    local_path: &Path,
    root: &str,
    key: &str,
) -> Result<()> {
    store.ensure_root(root).await?;

    println!("📦 Uploading {} to remote key {}", local_path.display(), key);
    store.transfer(local_path, key).await?;

    let verified = store
        .exists(key)
        .await
        .with_context(|| format!("Failed to verify upload of {}", key))?;
    if !verified {
        return Err(BackupError::UploadNotVerified(key.to_string()).into());
    }

    println!("✅ Upload of {} verified", key);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use crate::errors::BackupError;
    use std::io::Write;

    #[test]
    fn test_remote_key_shapes() {
        assert_eq!(
            remote_key(Some("mysql"), "orders", "a.xbstream"),
            "mysql/orders/a.xbstream"
        );
        assert_eq!(
            remote_key(Some("mysql/"), "orders", "a.xbstream"),
            "mysql/orders/a.xbstream"
        );
        assert_eq!(remote_key(None, "orders", "a.xbstream"), "orders/a.xbstream");
        assert_eq!(remote_root(Some("mysql"), "orders"), "mysql/orders/");
        assert_eq!(remote_root(None, "orders"), "orders/");
    }

    #[tokio::test]
    async fn test_upload_is_verified() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let mut artifact = tempfile::NamedTempFile::new()?;
        artifact.write_all(b"xbstream bytes")?;

        upload_artifact(
            &store,
            artifact.path(),
            "orders/",
            "orders/2024_01_01_00_00_00.xbstream",
        )
        .await?;

        assert!(store.keys().contains("orders/2024_01_01_00_00_00.xbstream"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unverified_upload_is_fatal() -> anyhow::Result<()> {
        let store = MemoryStore {
            lose_uploads: true,
            ..Default::default()
        };
        let artifact = tempfile::NamedTempFile::new()?;

        let err = upload_artifact(
            &store,
            artifact.path(),
            "orders/",
            "orders/2024_01_01_00_00_00.xbstream",
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::UploadNotVerified(_))
        ));
        Ok(())
    }
}
