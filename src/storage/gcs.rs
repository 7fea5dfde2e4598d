use super::ObjectBucket;
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use std::fmt;
use tracing::{debug, info};

/// Google Cloud Storage bucket, authenticated via application-default
/// credentials.
pub struct GcsBucket {
    client: Client,
    bucket: String,
}

impl fmt::Debug for GcsBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsBucket")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl GcsBucket {
    pub async fn connect(bucket: impl Into<String>) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .context("authenticating to GCS")?;
        Ok(Self {
            client: Client::new(config),
            bucket: bucket.into(),
        })
    }
}

#[async_trait]
impl ObjectBucket for GcsBucket {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let response = self
                .client
                .list_objects(&ListObjectsRequest {
                    bucket: self.bucket.clone(),
                    prefix: Some(prefix.to_string()),
                    page_token: page_token.clone(),
                    ..Default::default()
                })
                .await
                .with_context(|| format!("listing gs://{}/{prefix}*", self.bucket))?;

            if let Some(items) = response.items {
                keys.extend(items.into_iter().map(|object| object.name));
            }
            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(bucket = %self.bucket, prefix = %prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.client
            .download_object(
                &GetObjectRequest {
                    bucket: self.bucket.clone(),
                    object: key.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .with_context(|| format!("reading gs://{}/{key}", self.bucket))
    }

    async fn write_bytes(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let upload_type = UploadType::Simple(Media::new(key.to_string()));
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        self.client
            .upload_object(&request, data, &upload_type)
            .await
            .with_context(|| format!("uploading gs://{}/{key}", self.bucket))?;
        info!(bucket = %self.bucket, key = %key, "uploaded object");
        Ok(())
    }
}
