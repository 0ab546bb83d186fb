//! Output stores
//!
//! Staged files become output by being persisted under a partition key.
//! [`LocalStore`] renames into the output directory; [`S3Store`] uploads by
//! shelling out to the `aws` CLI, which keeps credential handling entirely
//! outside the process. When both destinations are configured the local copy
//! is written first and then mirrored.

use crate::config::OutputConfig;
use crate::domain::{PrismError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Destination for staged output files
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Moves the staged file to `key` (a relative, `/`-separated path).
    /// The staged file is consumed on success.
    async fn persist(&self, staged: &Path, key: &str) -> Result<()>;

    /// Human-readable destination for logs
    fn describe(&self) -> String;
}

/// Local-filesystem store
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl OutputStore for LocalStore {
    async fn persist(&self, staged: &Path, key: &str) -> Result<()> {
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PrismError::Write(format!("creating {}: {e}", parent.display())))?;
        }
        // Staging lives under the output root, so this is a same-filesystem
        // atomic rename.
        tokio::fs::rename(staged, &dest)
            .await
            .map_err(|e| PrismError::Write(format!("renaming into {}: {e}", dest.display())))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// S3 store that uploads via the `aws` CLI
pub struct S3Store {
    bucket: String,
    prefix: String,
    region: String,
}

impl S3Store {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            region: region.into(),
        }
    }

    fn s3_url(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}/{key}", self.bucket)
        } else {
            format!("s3://{}/{}/{key}", self.bucket, self.prefix.trim_matches('/'))
        }
    }

    /// Uploads a file to `key` via `aws s3 cp`, leaving the source in place
    async fn upload(&self, source: &Path, key: &str) -> Result<()> {
        let url = self.s3_url(key);
        let output = tokio::process::Command::new("aws")
            .arg("s3")
            .arg("cp")
            .arg("--only-show-errors")
            .arg("--region")
            .arg(&self.region)
            .arg(source)
            .arg(&url)
            .output()
            .await
            .map_err(|e| PrismError::Write(format!("spawning aws cli: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrismError::Write(format!(
                "aws s3 cp to {url} failed: {}",
                stderr.trim()
            )));
        }
        tracing::debug!(url = %url, "Uploaded to S3");
        Ok(())
    }
}

#[async_trait]
impl OutputStore for S3Store {
    async fn persist(&self, staged: &Path, key: &str) -> Result<()> {
        self.upload(staged, key).await?;
        tokio::fs::remove_file(staged)
            .await
            .map_err(|e| PrismError::Write(format!("removing staged file: {e}")))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.s3_url("")
    }
}

/// Writes locally, then mirrors the local file to S3
pub struct MirroredStore {
    local: LocalStore,
    s3: S3Store,
    root: PathBuf,
}

#[async_trait]
impl OutputStore for MirroredStore {
    async fn persist(&self, staged: &Path, key: &str) -> Result<()> {
        self.local.persist(staged, key).await?;
        self.s3.upload(&self.root.join(key), key).await
    }

    fn describe(&self) -> String {
        format!("{} + {}", self.local.describe(), self.s3.describe())
    }
}

/// Builds the store matching the output configuration
pub fn create_store(output: &OutputConfig) -> Result<Arc<dyn OutputStore>> {
    match (&output.local_directory, &output.s3) {
        (Some(dir), None) => Ok(Arc::new(LocalStore::new(dir))),
        (None, Some(s3)) => Ok(Arc::new(S3Store::new(
            s3.bucket.clone(),
            s3.prefix.clone(),
            s3.region.clone(),
        ))),
        (Some(dir), Some(s3)) => Ok(Arc::new(MirroredStore {
            local: LocalStore::new(dir),
            s3: S3Store::new(s3.bucket.clone(), s3.prefix.clone(), s3.region.clone()),
            root: PathBuf::from(dir),
        })),
        (None, None) => Err(PrismError::Configuration(
            "output requires local_directory and/or s3".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_persists_under_key() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        let staged = dir.path().join(".staging-part.parquet");
        tokio::fs::write(&staged, b"data").await.unwrap();

        store
            .persist(&staged, "rates/payer=centene/date=2025-06-01/part-0000.parquet")
            .await
            .unwrap();

        let dest = dir
            .path()
            .join("rates/payer=centene/date=2025-06-01/part-0000.parquet");
        assert!(dest.exists());
        assert!(!staged.exists());
    }

    #[test]
    fn test_s3_url_building() {
        let store = S3Store::new("bucket", "tic/rates", "us-east-1");
        assert_eq!(
            store.s3_url("rates/payer=a/date=d/part-0000.parquet"),
            "s3://bucket/tic/rates/rates/payer=a/date=d/part-0000.parquet"
        );
        let no_prefix = S3Store::new("bucket", "", "us-east-1");
        assert_eq!(no_prefix.s3_url("x.json"), "s3://bucket/x.json");
    }

    #[test]
    fn test_create_store_requires_destination() {
        assert!(create_store(&OutputConfig::default()).is_err());
        let config = OutputConfig {
            local_directory: Some("out".to_string()),
            s3: None,
        };
        assert!(create_store(&config).is_ok());
    }
}
