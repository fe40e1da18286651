//! Scan orchestration across configured sources.
//!
//! No error from an individual source or document crosses [`Scanner::scan`]:
//! an unreachable or unparseable source shows up as a [`SourceReport`] with
//! zero records and the run carries on.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use odp_core::{DocumentFormat, Opportunity, PriorityTier, SourceDescriptor};
use odp_extractors::{
    classify_document, classify_url, discover_document_links, extract_best_effort, extractor_for,
    HtmlTableExtractor, SourceDocument,
};
use odp_storage::{ArtifactStore, FetchedResponse, HttpFetcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analysis::{analyze_top, OpportunityAnalyzer, WinAnalysis};
use crate::config::ScanConfig;
use crate::dedup::{dedup, sort_by_priority};
use crate::scoring::ScoringPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Fetched and produced at least one record.
    Ok,
    /// Fetched, but nothing recognisable was in it.
    Empty,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    pub agency: String,
    pub url: String,
    pub tier: PriorityTier,
    pub format: DocumentFormat,
    pub status: SourceStatus,
    /// Documents fetched for this source, landing page included.
    pub documents: usize,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub opportunities: Vec<Opportunity>,
    pub source_reports: Vec<SourceReport>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub analyses: BTreeMap<String, WinAnalysis>,
}

impl ScanOutcome {
    pub fn high_priority(&self) -> Vec<&Opportunity> {
        self.opportunities.iter().filter(|o| o.high_priority).collect()
    }

    pub fn dedup_keys(&self) -> BTreeSet<String> {
        self.opportunities.iter().map(Opportunity::dedup_key).collect()
    }
}

/// Score, collapse duplicates and order: the tail shared by every scan entry point.
pub fn rank_opportunities(mut records: Vec<Opportunity>, policy: &ScoringPolicy, today: NaiveDate) -> Vec<Opportunity> {
    policy.apply_scores(&mut records, today);
    let mut records = dedup(records);
    sort_by_priority(&mut records);
    records
}

struct SourceScan {
    report: SourceReport,
    records: Vec<Opportunity>,
}

pub struct Scanner {
    config: ScanConfig,
    fetcher: HttpFetcher,
    policy: ScoringPolicy,
    analyzer: Option<Arc<dyn OpportunityAnalyzer>>,
    artifacts: Option<ArtifactStore>,
    today: Option<NaiveDate>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.http_client_config())?;
        let policy = ScoringPolicy::default().with_home_regions(&config.home_regions);
        Ok(Self {
            config,
            fetcher,
            policy,
            analyzer: None,
            artifacts: None,
            today: None,
        })
    }

    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy.with_home_regions(&self.config.home_regions);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn OpportunityAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_artifact_store(mut self, store: ArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Pin "today" for deadline scoring.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub async fn scan(&self, sources: &[SourceDescriptor]) -> ScanOutcome {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let mut tiers: BTreeMap<PriorityTier, Vec<&SourceDescriptor>> = BTreeMap::new();
        for source in sources.iter().filter(|s| s.active) {
            tiers.entry(source.priority_tier).or_default().push(source);
        }
        info!(%run_id, sources = tiers.values().map(Vec::len).sum::<usize>(), "scan started");

        let mut reports = Vec::new();
        let mut records = Vec::new();
        for (tier, batch) in tiers {
            debug!(%run_id, ?tier, sources = batch.len(), "scanning tier");
            let pending = batch
                .into_iter()
                .map(|source| self.scan_source(run_id, source))
                .collect::<Vec<_>>();
            let scans = stream::iter(pending)
                .buffered(self.config.max_parallel_sources.max(1))
                .collect::<Vec<_>>()
                .await;
            for scan in scans {
                reports.push(scan.report);
                records.extend(scan.records);
            }
        }

        let opportunities = rank_opportunities(records, &self.policy, self.today());
        let analyses = self.analyze(&opportunities).await;
        let outcome = ScanOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            opportunities,
            source_reports: reports,
            analyses,
        };
        info!(
            %run_id,
            opportunities = outcome.opportunities.len(),
            high_priority = outcome.high_priority().len(),
            "scan finished"
        );
        outcome
    }

    /// Scan a document supplied directly (an uploaded forecast) instead of fetched.
    pub async fn scan_document(
        &self,
        source: &SourceDescriptor,
        bytes: &[u8],
        format: Option<DocumentFormat>,
    ) -> ScanOutcome {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let format = format
            .or(source.format_hint)
            .unwrap_or_else(|| classify_url(&source.url));
        let doc = SourceDocument::new(&source.agency, &source.url, bytes, started_at);
        let records = extract_best_effort(extractor_for(format).as_ref(), &doc);
        let report = SourceReport {
            source_id: source.source_id(),
            agency: source.agency.clone(),
            url: source.url.clone(),
            tier: source.priority_tier,
            format,
            status: if records.is_empty() { SourceStatus::Empty } else { SourceStatus::Ok },
            documents: 1,
            records: records.len(),
        };
        let opportunities = rank_opportunities(records, &self.policy, self.today());
        let analyses = self.analyze(&opportunities).await;
        ScanOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            opportunities,
            source_reports: vec![report],
            analyses,
        }
    }

    async fn analyze(&self, opportunities: &[Opportunity]) -> BTreeMap<String, WinAnalysis> {
        match &self.analyzer {
            Some(analyzer) if self.config.analyze_top_n > 0 => {
                analyze_top(analyzer.as_ref(), opportunities, self.config.analyze_top_n).await
            }
            _ => BTreeMap::new(),
        }
    }

    async fn scan_source(&self, run_id: Uuid, source: &SourceDescriptor) -> SourceScan {
        let source_id = source.source_id();
        let span = info_span!("scan_source", %run_id, source_id = %source_id, agency = %source.agency);
        async {
            let format = source.format_hint.unwrap_or_else(|| classify_url(&source.url));
            let (documents, records) = match self.fetch(run_id, &source_id, &source.url).await {
                None => (0, None),
                Some(resp) => {
                    let (extra, records) = match format {
                        DocumentFormat::Html => self.scan_landing_page(run_id, source, &source_id, &resp).await,
                        _ => (0, self.extract(source, &resp, Some(format))),
                    };
                    (1 + extra, Some(records))
                }
            };
            let status = match &records {
                None => SourceStatus::Unreachable,
                Some(r) if r.is_empty() => SourceStatus::Empty,
                Some(_) => SourceStatus::Ok,
            };
            let records = records.unwrap_or_default();
            info!(?status, documents, records = records.len(), "source scanned");
            SourceScan {
                report: SourceReport {
                    source_id: source_id.clone(),
                    agency: source.agency.clone(),
                    url: source.url.clone(),
                    tier: source.priority_tier,
                    format,
                    status,
                    documents,
                    records: records.len(),
                },
                records,
            }
        }
        .instrument(span)
        .await
    }

    /// Linked forecast documents first; the page's own tables only if they yield nothing.
    async fn scan_landing_page(
        &self,
        run_id: Uuid,
        source: &SourceDescriptor,
        source_id: &str,
        landing: &FetchedResponse,
    ) -> (usize, Vec<Opportunity>) {
        let html = String::from_utf8_lossy(&landing.body);
        let links = discover_document_links(&html, &landing.final_url, self.config.max_discovered_docs);
        debug!(links = links.len(), "discovered document links");

        let mut fetched = 0;
        let mut records = Vec::new();
        for link in &links {
            if let Some(resp) = self.fetch(run_id, source_id, link).await {
                fetched += 1;
                records.extend(self.extract(source, &resp, None));
            }
        }
        if records.is_empty() {
            let doc = SourceDocument::new(&source.agency, &landing.final_url, &landing.body, landing.fetched_at)
                .with_content_type(landing.content_type.as_deref());
            records = extract_best_effort(&HtmlTableExtractor, &doc);
        }
        (fetched, records)
    }

    fn extract(&self, source: &SourceDescriptor, resp: &FetchedResponse, format: Option<DocumentFormat>) -> Vec<Opportunity> {
        let doc = SourceDocument::new(&source.agency, &resp.final_url, &resp.body, resp.fetched_at)
            .with_content_type(resp.content_type.as_deref());
        let format = format.unwrap_or_else(|| classify_document(doc.url, doc.content_type));
        extract_best_effort(extractor_for(format).as_ref(), &doc)
    }

    async fn fetch(&self, run_id: Uuid, source_id: &str, url: &str) -> Option<FetchedResponse> {
        let resp = self.fetcher.fetch_document(run_id, source_id, url).await?;
        if let Some(store) = &self.artifacts {
            let ext = classify_document(&resp.final_url, resp.content_type.as_deref()).extension();
            if let Err(err) = store.store_bytes(resp.fetched_at, source_id, ext, &resp.body).await {
                warn!(source_id, url, error = %err, "archiving fetched document failed");
            }
        }
        Some(resp)
    }
}
