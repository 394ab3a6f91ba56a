// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw photo retrieval. The only network I/O in the engine.

use std::time::Duration;

use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::PhotoSource;
use tracing::{debug, instrument};

/// Reads source photos from disk, HTTP(S) or inline bytes.
#[derive(Debug, Clone)]
pub struct PhotoFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl PhotoFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardwerkError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Fetch the encoded photo bytes. Any failure is `SourceUnavailable`.
    #[instrument(skip_all, fields(kind = source_kind(source)))]
    pub async fn fetch(&self, source: &PhotoSource) -> Result<Vec<u8>> {
        let bytes = match source {
            PhotoSource::Inline { bytes } => bytes.clone(),
            PhotoSource::Path { path } => tokio::fs::read(path)
                .await
                .map_err(|e| CardwerkError::SourceUnavailable(format!("{}: {e}", path.display())))?,
            PhotoSource::Url { url } => self.fetch_url(url).await?,
        };
        if bytes.is_empty() {
            return Err(CardwerkError::SourceUnavailable("photo source is empty".into()));
        }
        debug!(len = bytes.len(), "photo fetched");
        Ok(bytes)
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CardwerkError::SourceUnavailable(format!(
                    "{url}: timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else if e.is_connect() {
                CardwerkError::SourceUnavailable(format!("{url}: connect failed: {e}"))
            } else {
                CardwerkError::SourceUnavailable(format!("{url}: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CardwerkError::SourceUnavailable(format!(
                "{url}: status {}",
                status.as_u16()
            )));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| CardwerkError::SourceUnavailable(format!("{url}: reading body: {e}")))?;
        Ok(body.to_vec())
    }
}

fn source_kind(source: &PhotoSource) -> &'static str {
    match source {
        PhotoSource::Path { .. } => "path",
        PhotoSource::Url { .. } => "url",
        PhotoSource::Inline { .. } => "inline",
    }
}
