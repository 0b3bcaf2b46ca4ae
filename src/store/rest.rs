//! PostgREST-style upsert endpoint

use super::{Store, Table};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::RetryPolicy;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const PREFER: &str = "resolution=merge-duplicates,return=minimal";

/// REST store handle
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl RestStore {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.store.rest_url.trim().is_empty() {
            return Err(Error::Config("store.rest_url is not set".to_string()));
        }
        let api_key = config.rest_api_key();
        if api_key.is_none() {
            warn!(
                env = %config.store.api_key_env,
                "No REST service key in environment, sending unauthenticated requests"
            );
        }
        let retry = RetryPolicy::from_config(&config.fetch).with_attempts(config.store.max_batch_attempts);
        Self::new(
            &config.store.rest_url,
            api_key.as_deref(),
            config.store.batch_size,
            retry,
            config.fetch.timeout(),
        )
    }

    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        batch_size: usize,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static(PREFER));
        if let Some(key) = api_key {
            let invalid = |_| Error::Config("REST service key is not a valid header value".to_string());
            headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
            retry,
        })
    }

    fn endpoint(&self, table: Table) -> String {
        format!(
            "{}/rest/v1/{}?on_conflict={}",
            self.base_url,
            table.name(),
            table.conflict_target().join(",")
        )
    }

    async fn send_batch(&self, table: Table, batch: &[Value]) -> Result<()> {
        let url = self.endpoint(table);
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            match self.client.post(&url).json(batch).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status == StatusCode::CONFLICT {
                        debug!(table = %table, rows = batch.len(), status = status.as_u16(), "Batch accepted");
                        return Ok(());
                    }
                    let body = response.text().await.unwrap_or_default();
                    last_error = format!("HTTP {}: {}", status.as_u16(), body.trim());
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt - 1);
                warn!(
                    table = %table,
                    attempt,
                    "Batch upsert failed ({}), retrying in {:?}",
                    last_error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(Error::Persistence {
            table: table.name().to_string(),
            reason: format!("{} after {} attempt(s)", last_error, self.retry.max_attempts),
        })
    }
}

#[async_trait]
impl Store for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn upsert(&self, table: Table, rows: &[Value]) -> Result<usize> {
        for batch in rows.chunks(self.batch_size) {
            self.send_batch(table, batch).await?;
        }
        Ok(rows.len())
    }
}
