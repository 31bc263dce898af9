//! Batch.com Profiles API writer

use super::DestinationWriter;
use crate::config::DestinationConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig};
use crate::model::{TransformedRecord, WriteResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Sends profile updates to `POST /2.4/profiles/update`
///
/// Each request carries up to `max_records_per_request` profiles keyed by
/// `custom_id`. The API answers 202 once the update is accepted.
#[derive(Debug)]
pub struct BatchProfilesWriter {
    client: HttpClient,
    url: String,
    chunk_size: usize,
}

impl BatchProfilesWriter {
    /// Create a writer authenticated with a REST API key
    pub fn new(config: &DestinationConfig, api_key: &str) -> Result<Self> {
        let url = url::Url::parse(&config.api_url)?;
        if api_key.trim().is_empty() {
            return Err(Error::missing_field("destination.api_key"));
        }

        let http = HttpClientConfig::builder()
            .timeout(config.timeout())
            .rate_limit(RateLimiterConfig::per_second(config.requests_per_second))
            .bearer_token(api_key.trim())
            .header("X-Batch-Project", config.project_key.as_str())
            .build();

        Ok(Self {
            client: HttpClient::with_config(http)?,
            url: url.to_string(),
            chunk_size: config.max_records_per_request.max(1),
        })
    }

    /// Endpoint requests are sent to
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_chunk(&self, chunk: &[TransformedRecord]) -> Result<()> {
        let response = self.client.post_json(&self.url, &payload(chunk)).await?;
        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::http_status(status.as_u16(), body))
    }
}

#[async_trait]
impl DestinationWriter for BatchProfilesWriter {
    async fn apply(&self, records: &[TransformedRecord]) -> Result<WriteResult> {
        let mut result = WriteResult::default();

        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            debug!(chunk = index, records = chunk.len(), "Sending profile updates");

            match self.send_chunk(chunk).await {
                Ok(()) => result.written.extend(chunk.iter().map(|r| r.id.clone())),
                // Replaying the whole batch is safe, earlier chunks are upserts
                Err(e) if e.is_retryable() || result.written.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        chunk = index,
                        first_id = ?chunk.first().map(|r| r.id.as_str()),
                        error = %e,
                        "Profile update refused after earlier chunks were accepted"
                    );
                    let reason = e.to_string();
                    let sent = index * self.chunk_size;
                    for record in &records[sent..] {
                        result.reject(record.id.clone(), reason.clone());
                    }
                    break;
                }
            }
        }

        info!(
            written = result.written.len(),
            rejected = result.rejected.len(),
            "Applied profile updates"
        );
        Ok(result)
    }
}

/// Request body for a chunk of profiles
fn payload(chunk: &[TransformedRecord]) -> Value {
    Value::Array(
        chunk
            .iter()
            .map(|r| {
                json!({
                    "identifiers": { "custom_id": r.id },
                    "attributes": r.attributes,
                })
            })
            .collect(),
    )
}
