//! Source object access
//!
//! The engine only ever needs bounded byte-range reads. [`BlobStore`] is the
//! seam; [`Storage`] implements it on top of S3 (or any S3-compatible store).

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{error::ProvideErrorMetadata, Client};
use tracing::{debug, info, instrument};

pub mod config;

/// Byte-range reads against large append-only objects
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read `[start, end_inclusive]` from `object`
    ///
    /// A range starting at or beyond the end of the object yields an empty
    /// buffer; a range running past the end is truncated.
    async fn get_range(&self, object: &str, start: u64, end_inclusive: u64) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!(endpoint = ?config.connection.endpoint, bucket = %config.bucket, "Initializing storage");

        let sdk_config = config.connection.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style)
            .build();
        let client = Client::from_conf(s3_config);

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Current size of `object` in bytes
    #[instrument(skip(self))]
    pub async fn object_size(&self, object: &str) -> Result<u64> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object)
            .send()
            .await
            .with_context(|| format!("Failed to get metadata for s3://{}/{}", self.bucket, object))?;

        Ok(response.content_length().unwrap_or(0).max(0) as u64)
    }
}

#[async_trait]
impl BlobStore for Storage {
    #[instrument(skip(self))]
    async fn get_range(&self, object: &str, start: u64, end_inclusive: u64) -> Result<Vec<u8>> {
        anyhow::ensure!(
            end_inclusive >= start,
            "Invalid byte range {}-{} for {}",
            start,
            end_inclusive,
            object
        );

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object)
            .range(range_header(start, end_inclusive))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                if err.as_service_error().and_then(|e| e.code()) == Some("InvalidRange") {
                    debug!(start, "Range starts past end of s3://{}/{}", self.bucket, object);
                    return Ok(Vec::new());
                }
                return Err(err).with_context(|| {
                    format!("Failed to read s3://{}/{} from byte {}", self.bucket, object, start)
                });
            },
        };

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!(
            "Read {} bytes from s3://{}/{} at {}",
            data.len(),
            self.bucket,
            object,
            start
        );

        Ok(data)
    }
}

fn range_header(start: u64, end_inclusive: u64) -> String {
    format!("bytes={}-{}", start, end_inclusive)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_is_inclusive() {
        assert_eq!(range_header(0, 4095), "bytes=0-4095");
        assert_eq!(range_header(8192, 8192), "bytes=8192-8192");
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected_before_any_request() {
        let storage = Storage {
            client: Client::from_conf(aws_sdk_s3::Config::builder().build()),
            bucket: "test-bucket".to_string(),
        };

        let err = storage.get_range("loans.csv", 10, 5).await.unwrap_err();
        assert!(err.to_string().contains("Invalid byte range 10-5"));
    }
}
