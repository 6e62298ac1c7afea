use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// reqwest client wrapper that retries transient failures.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// Override the pause between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Stream `url` into the writer returned by `create_writer`.
    ///
    /// The writer is created anew for every attempt, after the response
    /// status has been checked, so a 404 never leaves an empty file behind.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading {}...", url);
        self.with_retry("download", || self.download_file_once(url, &create_writer))
            .await
    }

    async fn download_file_once<W, F>(&self, url: &str, create_writer: &F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB from {}",
            downloaded_bytes as f64 / (1024.0 * 1024.0),
            url
        );

        Ok(downloaded_bytes)
    }

    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({:#}), retrying in {:?}...",
                            operation_name, attempt, MAX_RETRIES, e, self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

fn is_retryable_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<NonRetryableError>().is_none()
}
