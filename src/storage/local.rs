use super::ObjectBucket;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Directory-backed bucket for `file://` URLs and tests.
///
/// Keys are plain file names inside the root directory; listing filters by
/// file-name prefix and returns keys in sorted order so runs are
/// deterministic.
#[derive(Debug)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectBucket for LocalBucket {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        // A root that was never written to is a bucket with no objects.
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("listing `{}`", self.root.display()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing `{}`", self.root.display()))?
        {
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix) {
                keys.push(name);
            }
        }
        keys.sort();
        debug!(root = %self.root.display(), prefix = %prefix, count = keys.len(), "listed files");
        Ok(keys)
    }

    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(key);
        fs::read(&path)
            .await
            .with_context(|| format!("reading `{}`", path.display()))
    }

    async fn write_bytes(&self, key: &str, data: Vec<u8>) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating `{}`", self.root.display()))?;
        let path = self.root.join(key);
        fs::write(&path, data)
            .await
            .with_context(|| format!("writing `{}`", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_matching_prefix_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = LocalBucket::new(dir.path());
        bucket.write_bytes("survey_b.csv", vec![1]).await.unwrap();
        bucket.write_bytes("survey_a.csv", vec![2]).await.unwrap();
        bucket.write_bytes("other.csv", vec![3]).await.unwrap();

        let keys = bucket.list_keys("survey_").await.unwrap();
        assert_eq!(keys, vec!["survey_a.csv", "survey_b.csv"]);
    }

    #[tokio::test]
    async fn missing_root_lists_empty() {
        let bucket = LocalBucket::new("/nonexistent/bucket/root");
        assert!(bucket.list_keys("x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = LocalBucket::new(dir.path());
        bucket.write_bytes("key.bin", b"payload".to_vec()).await.unwrap();
        assert_eq!(bucket.read_bytes("key.bin").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn read_of_missing_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = LocalBucket::new(dir.path());
        assert!(bucket.read_bytes("absent.csv").await.is_err());
    }
}
