//! Object-storage abstraction used by the ETL stages.
//!
//! The pipeline only ever talks to [`ObjectBucket`]; concrete backends are
//! selected from the configured storage URL so alternative stores can be
//! substituted without touching pipeline logic.

mod gcs;
mod local;

pub use gcs::GcsBucket;
pub use local::LocalBucket;

use crate::table::{self, FileFormat};
use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::sync::Arc;

/// List/read/write capability over a single bucket of objects.
///
/// Listing an empty prefix yields an empty vector, never an error. Read and
/// write failures carry the backend error; callers propagate them without
/// retrying.
#[async_trait]
pub trait ObjectBucket: Send + Sync + std::fmt::Debug {
    /// All object keys under `prefix`, in listing order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Full contents of the object at `key`.
    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// Replace the object at `key` with `data` in a single put.
    async fn write_bytes(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Read and parse the object at `key` as a tabular record set.
    async fn read_table(&self, key: &str, format: FileFormat) -> Result<RecordBatch> {
        let data = self.read_bytes(key).await?;
        table::decode(&data, format).with_context(|| format!("parsing object `{key}`"))
    }

    /// Serialize `batch` in `format` and write it to `key`.
    async fn write_table(&self, batch: &RecordBatch, key: &str, format: FileFormat) -> Result<()> {
        let data =
            table::encode(batch, format).with_context(|| format!("encoding object `{key}`"))?;
        self.write_bytes(key, data).await
    }
}

/// Open the bucket a storage URL points at.
///
/// `gs://bucket` connects to Google Cloud Storage with application-default
/// credentials; `file:///dir` serves a local directory.
pub async fn open_bucket(url: &str) -> Result<Arc<dyn ObjectBucket>> {
    if let Some(bucket) = url.strip_prefix("gs://") {
        let bucket = bucket.trim_end_matches('/');
        let gcs = GcsBucket::connect(bucket)
            .await
            .with_context(|| format!("connecting to `{url}`"))?;
        Ok(Arc::new(gcs))
    } else if let Some(path) = url.strip_prefix("file://") {
        Ok(Arc::new(LocalBucket::new(path)))
    } else {
        bail!("unsupported storage url `{url}` (expected gs://bucket or file:///dir)");
    }
}
