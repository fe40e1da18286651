//! Per-run report directory: outcome JSON, markdown brief and parquet snapshots.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array, UInt8Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics::Analytics;
use crate::scanner::ScanOutcome;

pub const OUTCOME_FILE: &str = "opportunities.json";
pub const BRIEF_FILE: &str = "daily_brief.md";
/// Pointer to the newest run, kept at the reports root.
pub const LATEST_FILE: &str = "latest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LatestPointer {
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub reports_dir: PathBuf,
    pub manifest_path: PathBuf,
}

pub fn run_dir(reports_root: &Path, outcome: &ScanOutcome) -> PathBuf {
    reports_root.join(outcome.run_id.to_string())
}

pub async fn write_reports(reports_root: &Path, outcome: &ScanOutcome) -> Result<WrittenReports> {
    let reports_dir = run_dir(reports_root, outcome);
    fs::create_dir_all(&reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let json = serde_json::to_vec_pretty(outcome).context("serializing scan outcome")?;
    fs::write(reports_dir.join(OUTCOME_FILE), json)
        .await
        .with_context(|| format!("writing {OUTCOME_FILE}"))?;
    fs::write(reports_dir.join(BRIEF_FILE), daily_brief(outcome))
        .await
        .with_context(|| format!("writing {BRIEF_FILE}"))?;

    let manifest_path = export_parquet_snapshots(&reports_dir, outcome).await?;
    update_latest_pointer(reports_root, outcome).await?;
    debug!(dir = %reports_dir.display(), "reports written");
    Ok(WrittenReports {
        reports_dir,
        manifest_path,
    })
}

fn read_latest_pointer(reports_root: &Path) -> Option<LatestPointer> {
    let bytes = std::fs::read(reports_root.join(LATEST_FILE)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Point `latest.json` at `outcome` unless a newer run already holds it.
async fn update_latest_pointer(reports_root: &Path, outcome: &ScanOutcome) -> Result<()> {
    if read_latest_pointer(reports_root).is_some_and(|p| p.started_at > outcome.started_at) {
        return Ok(());
    }
    let pointer = LatestPointer {
        run_id: outcome.run_id,
        started_at: outcome.started_at,
    };
    let bytes = serde_json::to_vec_pretty(&pointer).context("serializing latest run pointer")?;
    let path = reports_root.join(LATEST_FILE);
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, bytes)
        .await
        .with_context(|| format!("writing {}", temp.display()))?;
    fs::rename(&temp, &path)
        .await
        .with_context(|| format!("renaming {} -> {}", temp.display(), path.display()))?;
    Ok(())
}

pub fn daily_brief(outcome: &ScanOutcome) -> String {
    let analytics = Analytics::from_opportunities(&outcome.opportunities);
    let mut lines = vec![
        "# Opportunity Daily Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", outcome.run_id),
        format!("- Started: {}", outcome.started_at),
        format!("- Finished: {}", outcome.finished_at),
        format!("- Sources scanned: {}", outcome.source_reports.len()),
        format!("- Opportunities: {}", analytics.total),
        format!("- High priority: {}", analytics.high_priority),
        String::new(),
        "## Source Counts".to_string(),
    ];
    for report in &outcome.source_reports {
        lines.push(format!(
            "- {} ({:?}, {} document(s)): {}",
            report.agency, report.status, report.documents, report.records
        ));
    }
    lines.push(String::new());
    lines.push("## High Priority".to_string());
    let high = outcome.high_priority();
    if high.is_empty() {
        lines.push("- none".to_string());
    }
    for o in high {
        let value = o
            .estimated_value
            .map(|v| format!(", {}", crate::notify::format_usd(v)))
            .unwrap_or_default();
        lines.push(format!("- [{}] {} ({}{value})", o.priority_score, o.title, o.source));
    }
    lines.push(String::new());
    lines.join("\n")
}

async fn export_parquet_snapshots(reports_dir: &Path, outcome: &ScanOutcome) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let opportunities_path = snapshot_dir.join("opportunities.parquet");
    let sources_path = snapshot_dir.join("sources.parquet");
    write_opportunities_parquet(&opportunities_path, outcome)?;
    write_sources_parquet(&sources_path, outcome)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        run_id: outcome.run_id.to_string(),
        files: vec![
            manifest_entry("opportunities", reports_dir, &opportunities_path)?,
            manifest_entry("sources", reports_dir, &sources_path)?,
        ],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn write_opportunities_parquet(path: &Path, outcome: &ScanOutcome) -> Result<()> {
    let records = &outcome.opportunities;
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("dedup_key", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("source_url", DataType::Utf8, false),
        ArrowField::new("naics_code", DataType::Utf8, true),
        ArrowField::new("estimated_value", DataType::Float64, true),
        ArrowField::new("set_aside", DataType::Utf8, true),
        ArrowField::new("response_deadline", DataType::Utf8, true),
        ArrowField::new("extractor", DataType::Utf8, false),
        ArrowField::new("priority_score", DataType::UInt8, false),
        ArrowField::new("high_priority", DataType::Boolean, false),
    ]));

    let keys = StringArray::from(records.iter().map(|o| Some(o.dedup_key())).collect::<Vec<_>>());
    let titles = StringArray::from(records.iter().map(|o| Some(o.title.as_str())).collect::<Vec<_>>());
    let sources = StringArray::from(records.iter().map(|o| Some(o.source.as_str())).collect::<Vec<_>>());
    let urls = StringArray::from(records.iter().map(|o| Some(o.source_url.as_str())).collect::<Vec<_>>());
    let naics = StringArray::from(records.iter().map(|o| o.naics_code.as_deref()).collect::<Vec<_>>());
    let values = Float64Array::from(records.iter().map(|o| o.estimated_value).collect::<Vec<_>>());
    let set_asides = StringArray::from(records.iter().map(|o| o.set_aside.as_deref()).collect::<Vec<_>>());
    let deadlines = StringArray::from(
        records
            .iter()
            .map(|o| o.response_deadline.map(|d| d.to_string()))
            .collect::<Vec<_>>(),
    );
    let extractors = StringArray::from(records.iter().map(|o| Some(o.extractor.as_str())).collect::<Vec<_>>());
    let scores = UInt8Array::from(records.iter().map(|o| o.priority_score).collect::<Vec<_>>());
    let high = BooleanArray::from(records.iter().map(|o| o.high_priority).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(keys),
            Arc::new(titles),
            Arc::new(sources),
            Arc::new(urls),
            Arc::new(naics),
            Arc::new(values),
            Arc::new(set_asides),
            Arc::new(deadlines),
            Arc::new(extractors),
            Arc::new(scores),
            Arc::new(high),
        ],
    )
    .context("building opportunities record batch")?;
    write_parquet(path, batch)
}

fn write_sources_parquet(path: &Path, outcome: &ScanOutcome) -> Result<()> {
    let reports = &outcome.source_reports;
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source_id", DataType::Utf8, false),
        ArrowField::new("agency", DataType::Utf8, false),
        ArrowField::new("url", DataType::Utf8, false),
        ArrowField::new("format", DataType::Utf8, false),
        ArrowField::new("status", DataType::Utf8, false),
        ArrowField::new("documents", DataType::UInt32, false),
        ArrowField::new("records", DataType::UInt32, false),
    ]));

    let ids = StringArray::from(reports.iter().map(|r| Some(r.source_id.as_str())).collect::<Vec<_>>());
    let agencies = StringArray::from(reports.iter().map(|r| Some(r.agency.as_str())).collect::<Vec<_>>());
    let urls = StringArray::from(reports.iter().map(|r| Some(r.url.as_str())).collect::<Vec<_>>());
    let formats = StringArray::from(reports.iter().map(|r| Some(r.format.to_string())).collect::<Vec<_>>());
    let statuses = StringArray::from(
        reports
            .iter()
            .map(|r| Some(format!("{:?}", r.status).to_ascii_lowercase()))
            .collect::<Vec<_>>(),
    );
    let documents = UInt32Array::from(reports.iter().map(|r| r.documents as u32).collect::<Vec<_>>());
    let records = UInt32Array::from(reports.iter().map(|r| r.records as u32).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(agencies),
            Arc::new(urls),
            Arc::new(formats),
            Arc::new(statuses),
            Arc::new(documents),
            Arc::new(records),
        ],
    )
    .context("building sources record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path.strip_prefix(reports_dir).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}

/// Every readable run under `reports_root`, newest first.
pub fn load_outcomes(reports_root: &Path) -> Result<Vec<ScanOutcome>> {
    if !reports_root.exists() {
        return Ok(Vec::new());
    }
    let mut outcomes = Vec::new();
    let entries = std::fs::read_dir(reports_root).with_context(|| format!("reading {}", reports_root.display()))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path().join(OUTCOME_FILE);
        if !path.is_file() {
            continue;
        }
        let parsed = std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice::<ScanOutcome>(&bytes).map_err(anyhow::Error::from));
        match parsed {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable run report"),
        }
    }
    outcomes.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(outcomes)
}

/// Most recent run, if any report has been written yet.
///
/// Reads the run named by `latest.json`; only a missing or stale pointer
/// falls back to parsing every run.
pub fn latest_outcome(reports_root: &Path) -> Result<Option<ScanOutcome>> {
    if let Some(pointer) = read_latest_pointer(reports_root) {
        let path = reports_root.join(pointer.run_id.to_string()).join(OUTCOME_FILE);
        match std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice::<ScanOutcome>(&bytes).map_err(anyhow::Error::from))
        {
            Ok(outcome) => return Ok(Some(outcome)),
            Err(err) => warn!(path = %path.display(), error = %err, "latest run pointer is stale; scanning reports"),
        }
    }
    Ok(load_outcomes(reports_root)?.into_iter().next())
}

/// Delete all but the `keep` newest run directories; `0` keeps everything.
pub async fn prune_runs(reports_root: &Path, keep: usize) -> Result<usize> {
    if keep == 0 {
        return Ok(0);
    }
    let mut removed = 0;
    for outcome in load_outcomes(reports_root)?.iter().skip(keep) {
        let dir = run_dir(reports_root, outcome);
        fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("removing {}", dir.display()))?;
        removed += 1;
    }
    if removed > 0 {
        info!(removed, keep, "pruned old scan reports");
    }
    Ok(removed)
}

/// Markdown overview of the `runs` most recent scan runs.
pub fn report_markdown(runs: usize, reports_root: &Path) -> Result<String> {
    let outcomes = load_outcomes(reports_root)?;
    let mut lines = vec!["# Opportunity Scan Report".to_string(), String::new()];
    if outcomes.is_empty() {
        lines.push(format!("No scan runs under `{}` yet.", reports_root.display()));
    }
    for outcome in outcomes.iter().take(runs.max(1)) {
        let dir = run_dir(reports_root, outcome);
        let analytics = Analytics::from_opportunities(&outcome.opportunities);
        lines.push(format!("## Run `{}`", outcome.run_id));
        lines.push(format!("- started: {}", outcome.started_at));
        lines.push(format!("- sources: {}", outcome.source_reports.len()));
        lines.push(format!("- opportunities: {}", analytics.total));
        lines.push(format!("- high priority: {}", analytics.high_priority));
        if let Some(avg) = analytics.average_estimated_value {
            lines.push(format!("- average estimated value: {}", crate::notify::format_usd(avg)));
        }
        if let Some(top) = outcome.opportunities.first() {
            lines.push(format!("- top: {} ({}, score {})", top.title, top.source, top.priority_score));
        }
        let manifest = dir.join("snapshots").join("manifest.json");
        if manifest.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest.display()));
        }
        lines.push(format!("- daily brief: `{}`", dir.join(BRIEF_FILE).display()));
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::scanner::{SourceReport, SourceStatus};
    use chrono::{Duration, TimeZone, Utc};
    use odp_core::{DocumentFormat, Opportunity, PriorityTier};
    use uuid::Uuid;

    fn outcome(hours: i64, titles: &[(&str, u8)]) -> ScanOutcome {
        let at = Utc.with_ymd_and_hms(2025, 2, 24, 6, 0, 0).unwrap() + Duration::hours(hours);
        ScanOutcome {
            run_id: Uuid::new_v4(),
            started_at: at,
            finished_at: at + Duration::seconds(30),
            opportunities: titles
                .iter()
                .map(|(t, score)| {
                    let mut o = Opportunity::new(*t, "GSA", "https://gsa.gov/forecast", at, "html-table/1");
                    o.priority_score = *score;
                    o.high_priority = *score >= 70;
                    o.estimated_value = Some(75_000.0);
                    o
                })
                .collect(),
            source_reports: vec![SourceReport {
                source_id: "gsa".into(),
                agency: "GSA".into(),
                url: "https://gsa.gov/forecast".into(),
                tier: PriorityTier::High,
                format: DocumentFormat::Html,
                status: SourceStatus::Ok,
                documents: 1,
                records: titles.len(),
            }],
            analyses: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn writes_json_brief_and_parquet_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let run = outcome(0, &[("Fleet maintenance contract", 85), ("Janitorial services for depots", 50)]);
        let written = write_reports(dir.path(), &run).await.unwrap();

        assert!(written.reports_dir.join(OUTCOME_FILE).is_file());
        let brief = std::fs::read_to_string(written.reports_dir.join(BRIEF_FILE)).unwrap();
        assert!(brief.contains("- High priority: 1"));
        assert!(brief.contains("[85] Fleet maintenance contract (GSA, $75,000)"));

        let manifest: ParquetManifest =
            serde_json::from_slice(&std::fs::read(&written.manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.files.len(), 2);
        for file in &manifest.files {
            let bytes = std::fs::read(written.reports_dir.join(&file.path)).unwrap();
            assert_eq!(bytes.len() as u64, file.bytes);
            assert_eq!(&bytes[..4], b"PAR1");
        }
    }

    #[tokio::test]
    async fn latest_outcome_picks_newest_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_outcome(dir.path()).unwrap().is_none());
        let older = outcome(0, &[("Fleet maintenance contract", 85)]);
        let newer = outcome(12, &[("Courier services for specimens", 60)]);
        write_reports(dir.path(), &newer).await.unwrap();
        write_reports(dir.path(), &older).await.unwrap();

        let latest = latest_outcome(dir.path()).unwrap().unwrap();
        assert_eq!(latest.run_id, newer.run_id);
        assert_eq!(latest, newer);
    }

    #[tokio::test]
    async fn latest_outcome_follows_pointer_instead_of_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let pointed = outcome(0, &[("Fleet maintenance contract", 85)]);
        write_reports(dir.path(), &pointed).await.unwrap();

        // a later run copied in by hand never moves the pointer
        let stray = outcome(24, &[("Courier services for specimens", 60)]);
        let stray_dir = run_dir(dir.path(), &stray);
        std::fs::create_dir_all(&stray_dir).unwrap();
        std::fs::write(stray_dir.join(OUTCOME_FILE), serde_json::to_vec(&stray).unwrap()).unwrap();

        let latest = latest_outcome(dir.path()).unwrap().unwrap();
        assert_eq!(latest.run_id, pointed.run_id);

        std::fs::remove_file(dir.path().join(LATEST_FILE)).unwrap();
        let latest = latest_outcome(dir.path()).unwrap().unwrap();
        assert_eq!(latest.run_id, stray.run_id);
    }

    #[tokio::test]
    async fn prune_keeps_newest_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runs = (0..4)
            .map(|h| outcome(h, &[("Fleet maintenance contract", 85)]))
            .collect::<Vec<_>>();
        for run in &runs {
            write_reports(dir.path(), run).await.unwrap();
        }
        assert_eq!(prune_runs(dir.path(), 0).await.unwrap(), 0);
        assert_eq!(prune_runs(dir.path(), 2).await.unwrap(), 2);

        let left = load_outcomes(dir.path()).unwrap();
        let ids = left.iter().map(|o| o.run_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![runs[3].run_id, runs[2].run_id]);
        assert_eq!(latest_outcome(dir.path()).unwrap().unwrap().run_id, runs[3].run_id);
    }

    #[tokio::test]
    async fn markdown_report_lists_recent_runs() {
        let dir = tempfile::tempdir().unwrap();
        for h in 0..3 {
            write_reports(dir.path(), &outcome(h, &[("Fleet maintenance contract", 85)]))
                .await
                .unwrap();
        }
        let md = report_markdown(2, dir.path()).unwrap();
        assert_eq!(md.matches("## Run").count(), 2);
        assert!(md.contains("- top: Fleet maintenance contract (GSA, score 85)"));
    }

    #[test]
    fn missing_reports_root_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_outcomes(&dir.path().join("nope")).unwrap().is_empty());
        assert!(report_markdown(1, &dir.path().join("nope")).unwrap().contains("No scan runs"));
    }
}
