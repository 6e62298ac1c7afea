//! Construction of the network services a run needs.

use anyhow::{Context, Result};
use reqwest::Client;

use crate::http::HttpClient;

use super::config::Config;

pub const USER_AGENT: &str = concat!("alpm-db/", env!("ALPMDB_VERSION"));

/// Build an HTTP client honoring the configured timeout.
pub fn build_http_client(config: &Config) -> Result<HttpClient> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout)
        .build()
        .context("Failed to build HTTP client")?;

    Ok(HttpClient::new(client))
}
