use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use odp_core::{normalize_key_fragment, Opportunity};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::scanner::{ScanOutcome, SourceStatus};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    keys: BTreeSet<String>,
}

/// Dedup keys reported by the previous run, for "what is new" diffs.
///
/// The key set is only ever swapped by [`SeenCache::replace_with`]; keys of
/// agencies that were unreachable in that run are kept until they answer again.
#[derive(Debug, Clone)]
pub struct SeenCache {
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl SeenCache {
    /// Missing or unreadable files load as an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let keys = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<SeenFile>(&bytes) {
                Ok(file) => file.keys,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "seen cache unreadable; treating every record as new");
                    BTreeSet::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "seen cache unreadable; treating every record as new");
                BTreeSet::new()
            }
        };
        Self { path, keys }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, opportunity: &Opportunity) -> bool {
        self.keys.contains(&opportunity.dedup_key())
    }

    fn next_keys(&self, outcome: &ScanOutcome) -> BTreeSet<String> {
        let unreachable = outcome
            .source_reports
            .iter()
            .filter(|r| r.status == SourceStatus::Unreachable)
            .map(|r| normalize_key_fragment(&r.agency))
            .collect::<BTreeSet<_>>();
        let mut keys = outcome.dedup_keys();
        if !unreachable.is_empty() {
            keys.extend(
                self.keys
                    .iter()
                    .filter(|k| k.rsplit_once('|').is_some_and(|(_, agency)| unreachable.contains(agency)))
                    .cloned(),
            );
        }
        keys
    }

    pub fn diff_new(&self, outcome: &ScanOutcome) -> Vec<Opportunity> {
        outcome
            .opportunities
            .iter()
            .filter(|o| !self.contains(o))
            .cloned()
            .collect()
    }

    /// Swap in this run's keys and persist them via temp file + rename.
    pub async fn replace_with(&mut self, outcome: &ScanOutcome) -> Result<()> {
        let keys = self.next_keys(outcome);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(&SeenFile { keys: keys.clone() }).context("serializing seen cache")?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, bytes)
            .await
            .with_context(|| format!("writing {}", temp.display()))?;
        fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("renaming {} -> {}", temp.display(), self.path.display()))?;
        self.keys = keys;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SourceReport;
    use chrono::{TimeZone, Utc};
    use odp_core::{DocumentFormat, PriorityTier};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn report(agency: &str, status: SourceStatus) -> SourceReport {
        SourceReport {
            source_id: odp_core::slugify(agency),
            agency: agency.to_string(),
            url: "https://gsa.gov".to_string(),
            tier: PriorityTier::High,
            format: DocumentFormat::Html,
            status,
            documents: usize::from(status != SourceStatus::Unreachable),
            records: 0,
        }
    }

    fn outcome(titles: &[&str]) -> ScanOutcome {
        let at = Utc.with_ymd_and_hms(2025, 2, 24, 6, 0, 0).unwrap();
        ScanOutcome {
            run_id: Uuid::new_v4(),
            started_at: at,
            finished_at: at,
            opportunities: titles
                .iter()
                .map(|t| Opportunity::new(*t, "GSA", "https://gsa.gov", at, "t/1"))
                .collect(),
            source_reports: Vec::new(),
            analyses: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn second_run_only_reports_unseen_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.json");

        let mut cache = SeenCache::load(&path).await;
        assert!(cache.is_empty());
        let first = outcome(&["Fleet maintenance contract", "Courier services for specimens"]);
        assert_eq!(cache.diff_new(&first).len(), 2);
        cache.replace_with(&first).await.unwrap();

        let reloaded = SeenCache::load(&path).await;
        assert_eq!(reloaded.len(), 2);
        let second = outcome(&["Fleet maintenance contract", "Warehousing and distribution services"]);
        let new = reloaded.diff_new(&second);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].title, "Warehousing and distribution services");
    }

    #[tokio::test]
    async fn replace_drops_keys_missing_from_latest_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SeenCache::load(dir.path().join("seen.json")).await;
        cache.replace_with(&outcome(&["Fleet maintenance contract"])).await.unwrap();
        cache.replace_with(&outcome(&["Courier services for specimens"])).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.diff_new(&outcome(&["Fleet maintenance contract"])).len(), 1);
    }

    #[tokio::test]
    async fn outage_keeps_keys_of_unreachable_agency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let mut up = outcome(&["Fleet maintenance contract"]);
        up.source_reports.push(report("GSA", SourceStatus::Ok));
        let mut down = outcome(&[]);
        down.source_reports.push(report("GSA", SourceStatus::Unreachable));

        let mut new_per_cycle = Vec::new();
        for run in [&up, &down, &up] {
            let mut cache = SeenCache::load(&path).await;
            new_per_cycle.push(cache.diff_new(run).len());
            cache.replace_with(run).await.unwrap();
        }
        assert_eq!(new_per_cycle, vec![1, 0, 0]);
        assert_eq!(SeenCache::load(&path).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_but_reachable_agency_still_drops_its_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SeenCache::load(dir.path().join("seen.json")).await;
        cache.replace_with(&outcome(&["Fleet maintenance contract"])).await.unwrap();
        let mut empty = outcome(&[]);
        empty.source_reports.push(report("GSA", SourceStatus::Empty));
        cache.replace_with(&empty).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn corrupt_cache_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(SeenCache::load(&path).await.is_empty());
    }
}
