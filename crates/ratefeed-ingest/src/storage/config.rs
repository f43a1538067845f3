use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use serde::{Deserialize, Serialize};
use std::env;

/// Connection settings shared by the S3 and SQS clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwsConnection {
    /// Custom endpoint (MinIO, LocalStack); `None` talks to AWS
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl AwsConnection {
    /// Build an SDK config, falling back to the default credential chain
    pub async fn load(&self) -> SdkConfig {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&self.access_key, &self.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "ratefeed-static",
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        loader.load().await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub connection: AwsConnection,
    pub bucket: String,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            connection: AwsConnection {
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key: env::var("S3_ACCESS_KEY")
                    .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                    .ok(),
                secret_key: env::var("S3_SECRET_KEY")
                    .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                    .ok(),
            },
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "ratefeed-source".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            connection: AwsConnection {
                endpoint: Some(endpoint.into()),
                region: "us-east-1".to_string(),
                access_key: Some("minioadmin".to_string()),
                secret_key: Some("minioadmin".to_string()),
            },
            bucket: bucket.into(),
            path_style: true,
        }
    }
}
