use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::{types::SendMessageBatchRequestEntry, Client};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info, instrument, warn};

use super::{BatchOutcome, QueueClient, QueueEntry};
use crate::storage::config::AwsConnection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub connection: AwsConnection,
}

impl QueueConfig {
    /// SQS connection; credentials are shared with the S3 variables
    pub fn from_env() -> Self {
        Self {
            connection: AwsConnection {
                endpoint: env::var("SQS_ENDPOINT").ok(),
                region: env::var("SQS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key: env::var("S3_ACCESS_KEY")
                    .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                    .ok(),
                secret_key: env::var("S3_SECRET_KEY")
                    .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                    .ok(),
            },
        }
    }
}

#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    pub async fn new(config: QueueConfig) -> Result<Self> {
        let sdk_config = config.connection.load().await;
        let client = Client::new(&sdk_config);

        info!(endpoint = ?config.connection.endpoint, "Queue client initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn send_batch(&self, destination: &str, entries: Vec<QueueEntry>) -> Result<BatchOutcome> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                SendMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .message_body(entry.body)
                    .build()
                    .context("Failed to build batch entry")
            })
            .collect::<Result<Vec<_>>>()?;

        let response = self
            .client
            .send_message_batch()
            .queue_url(destination)
            .set_entries(Some(entries))
            .send()
            .await
            .with_context(|| format!("Failed to send batch to {}", destination))?;

        for failure in response.failed() {
            warn!(
                id = failure.id(),
                code = failure.code(),
                sender_fault = failure.sender_fault(),
                "Queue rejected entry"
            );
        }

        let failed_ids: Vec<String> = response.failed().iter().map(|f| f.id().to_string()).collect();
        debug!(
            successful = response.successful().len(),
            failed = failed_ids.len(),
            "Batch sent"
        );

        Ok(BatchOutcome { failed_ids })
    }
}
