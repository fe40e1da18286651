//! Optional win-probability enrichment by an external analysis service.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use odp_core::Opportunity;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinAnalysis {
    pub win_probability: f64,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

#[async_trait]
pub trait OpportunityAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze(&self, opportunity: &Opportunity) -> Result<WinAnalysis>;
}

pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpAnalyzer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building analyzer http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// `None` unless both `ODP_ANALYZER_URL` and `ODP_ANALYZER_API_KEY` are set.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("ODP_ANALYZER_URL").ok().filter(|v| !v.trim().is_empty())?;
        let api_key = std::env::var("ODP_ANALYZER_API_KEY").ok().filter(|v| !v.trim().is_empty())?;
        match Self::new(endpoint, api_key, Duration::from_secs(30)) {
            Ok(analyzer) => Some(analyzer),
            Err(err) => {
                warn!(error = %err, "analyzer configured but unusable; skipping analysis");
                None
            }
        }
    }
}

#[async_trait]
impl OpportunityAnalyzer for HttpAnalyzer {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, opportunity: &Opportunity) -> Result<WinAnalysis> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "opportunity": opportunity }))
            .send()
            .await
            .context("sending analysis request")?
            .error_for_status()
            .context("analysis service rejected request")?;
        resp.json::<WinAnalysis>().await.context("decoding analysis response")
    }
}

/// Analyze the first `top_n` records; failures are logged and skipped.
pub async fn analyze_top(
    analyzer: &dyn OpportunityAnalyzer,
    records: &[Opportunity],
    top_n: usize,
) -> BTreeMap<String, WinAnalysis> {
    let mut out = BTreeMap::new();
    for record in records.iter().take(top_n) {
        match analyzer.analyze(record).await {
            Ok(analysis) => {
                debug!(analyzer = analyzer.name(), title = %record.title, p = analysis.win_probability, "analyzed");
                out.insert(record.dedup_key(), analysis);
            }
            Err(err) => {
                warn!(analyzer = analyzer.name(), title = %record.title, error = %err, "analysis failed; record left as is");
            }
        }
    }
    out
}
