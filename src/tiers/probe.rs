//! HTTP recovery probe
//!
//! Issues a GET against each tier's configured health endpoint. Any 2xx
//! response counts as a successful probe.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::recovery::TierProbe;
use super::types::{Tier, TierSpec};

pub struct HttpTierProbe {
    client: Client,
    urls: HashMap<Tier, String>,
}

impl HttpTierProbe {
    /// Build a probe for every spec that has a `probe_url`
    pub fn new(specs: &[TierSpec], timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build probe HTTP client")?;

        let urls = specs
            .iter()
            .filter_map(|spec| spec.probe_url.clone().map(|url| (spec.tier, url)))
            .collect();

        Ok(Self { client, urls })
    }

    pub fn url(&self, tier: Tier) -> Option<&str> {
        self.urls.get(&tier).map(String::as_str)
    }
}

#[async_trait]
impl TierProbe for HttpTierProbe {
    async fn probe(&self, tier: Tier) -> anyhow::Result<()> {
        let url = self
            .url(tier)
            .ok_or_else(|| anyhow!("no probe configured for tier {}", tier))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("probe request to {} failed", url))?;

        let status = response.status();
        debug!(tier = %tier, status = %status, "Probe response");
        if !status.is_success() {
            bail!("probe returned {}", status);
        }
        Ok(())
    }
}
