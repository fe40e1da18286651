//! Scan pipeline: sources in, scored and deduplicated opportunities out,
//! plus the reports, new-record diff and notifications around each run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use odp_core::{DocumentFormat, SourceDescriptor};
use odp_storage::ArtifactStore;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub mod analysis;
pub mod analytics;
pub mod config;
pub mod dedup;
pub mod notify;
pub mod reports;
pub mod scanner;
pub mod scheduler;
pub mod scoring;
pub mod seen;

pub use analysis::{HttpAnalyzer, OpportunityAnalyzer, WinAnalysis};
pub use analytics::Analytics;
pub use config::{ScanConfig, SourceRegistry};
pub use notify::{DispatchReport, LogEmailTransport, Notifier, NotifyConfig};
pub use scanner::{rank_opportunities, ScanOutcome, Scanner, SourceReport, SourceStatus};
pub use scheduler::maybe_build_scheduler;
pub use scoring::ScoringPolicy;
pub use seen::SeenCache;

pub const CRATE_NAME: &str = "odp-scan";

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: usize,
    pub opportunities: usize,
    pub high_priority: usize,
    pub new_opportunities: usize,
    pub reports_dir: String,
    pub parquet_manifest: String,
    pub dispatch: DispatchReport,
}

/// Scanner wired from config: scoring rules file, analyzer credentials, artifact archive.
pub fn build_scanner(config: ScanConfig) -> Result<Scanner> {
    let policy = ScoringPolicy::load_or_default(&config.scoring_rules_path())?;
    let archive = config.archive_artifacts.then(|| ArtifactStore::new(config.artifacts_dir.clone()));
    let mut scanner = Scanner::new(config)?.with_policy(policy);
    if let Some(analyzer) = HttpAnalyzer::from_env() {
        scanner = scanner.with_analyzer(Arc::new(analyzer));
    }
    if let Some(store) = archive {
        scanner = scanner.with_artifact_store(store);
    }
    Ok(scanner)
}

/// Persist reports, diff against the previous run, notify about what is new.
pub async fn complete_cycle(config: &ScanConfig, outcome: &ScanOutcome, notifier: &Notifier) -> Result<CycleSummary> {
    let written = reports::write_reports(&config.reports_root(), outcome).await?;
    reports::prune_runs(&config.reports_root(), config.keep_runs).await?;

    let mut seen = SeenCache::load(config.seen_cache_path()).await;
    let new = seen.diff_new(outcome);
    let dispatch = notifier.dispatch(&new).await;
    seen.replace_with(outcome)
        .await
        .with_context(|| format!("updating {}", seen.path().display()))?;

    let summary = CycleSummary {
        run_id: outcome.run_id,
        started_at: outcome.started_at,
        finished_at: outcome.finished_at,
        sources: outcome.source_reports.len(),
        opportunities: outcome.opportunities.len(),
        high_priority: outcome.high_priority().len(),
        new_opportunities: new.len(),
        reports_dir: written.reports_dir.display().to_string(),
        parquet_manifest: written.manifest_path.display().to_string(),
        dispatch,
    };
    info!(
        run_id = %summary.run_id,
        opportunities = summary.opportunities,
        new = summary.new_opportunities,
        "scan cycle complete"
    );
    Ok(summary)
}

/// One full cycle: registry → scan → reports → seen-cache diff → notify.
pub async fn run_scan_cycle(config: &ScanConfig) -> Result<CycleSummary> {
    let registry = SourceRegistry::load(&config.sources_path()).await?;
    let scanner = build_scanner(config.clone())?;
    let outcome = scanner.scan(&registry.sources).await;
    let notifier = Notifier::from_config(NotifyConfig::from_env(), Arc::new(LogEmailTransport))?;
    complete_cycle(config, &outcome, &notifier).await
}

/// Scan a local document as if `agency` had published it at `path`.
pub async fn scan_file(
    config: ScanConfig,
    path: &Path,
    agency: &str,
    format: Option<DocumentFormat>,
) -> Result<ScanOutcome> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let source = SourceDescriptor::new(agency, file_url(path));
    let scanner = build_scanner(config)?;
    Ok(scanner.scan_document(&source, &bytes, format).await)
}

fn file_url(path: &Path) -> String {
    let absolute = path.canonicalize().unwrap_or_else(|_| PathBuf::from(path));
    format!("file://{}", absolute.display())
}
