use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use odp_core::SourceDescriptor;
use odp_storage::{HttpClientConfig, BROWSER_USER_AGENT};
use serde::Deserialize;

pub const DEFAULT_SCAN_CRON: &str = "0 0 6,18 * * *";

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub workspace_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub state_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub max_parallel_sources: usize,
    pub max_discovered_docs: usize,
    pub home_regions: Vec<String>,
    pub analyze_top_n: usize,
    pub archive_artifacts: bool,
    pub scheduler_enabled: bool,
    pub scan_crons: Vec<String>,
    /// Run report directories kept after each cycle; `0` keeps all of them.
    pub keep_runs: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            artifacts_dir: PathBuf::from("./artifacts"),
            state_dir: PathBuf::from("./state"),
            user_agent: BROWSER_USER_AGENT.to_string(),
            http_timeout_secs: 20,
            max_parallel_sources: 4,
            max_discovered_docs: odp_extractors::links::DEFAULT_LINK_LIMIT,
            home_regions: Vec::new(),
            analyze_top_n: 5,
            archive_artifacts: false,
            scheduler_enabled: false,
            scan_crons: vec![DEFAULT_SCAN_CRON.to_string()],
            keep_runs: 30,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Split a delimited env value, dropping blanks.
pub(crate) fn split_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl ScanConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let workspace_root = std::env::var("ODP_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_root);
        Self {
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("artifacts")),
            state_dir: std::env::var("ODP_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("state")),
            user_agent: std::env::var("ODP_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("ODP_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout_secs),
            max_parallel_sources: env_parse("ODP_MAX_PARALLEL_SOURCES")
                .unwrap_or(defaults.max_parallel_sources)
                .max(1),
            max_discovered_docs: env_parse("ODP_MAX_DISCOVERED_DOCS").unwrap_or(defaults.max_discovered_docs),
            home_regions: std::env::var("ODP_HOME_REGIONS")
                .map(|v| split_list(&v, ','))
                .unwrap_or_default(),
            analyze_top_n: env_parse("ODP_ANALYZE_TOP_N").unwrap_or(defaults.analyze_top_n),
            archive_artifacts: env_flag("ODP_ARCHIVE_ARTIFACTS").unwrap_or(defaults.archive_artifacts),
            scheduler_enabled: env_flag("ODP_SCHEDULER_ENABLED").unwrap_or(defaults.scheduler_enabled),
            // cron expressions contain commas, so multiple schedules are `;`-separated
            scan_crons: std::env::var("ODP_SCAN_CRON")
                .map(|v| split_list(&v, ';'))
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.scan_crons),
            keep_runs: env_parse("ODP_KEEP_RUNS").unwrap_or(defaults.keep_runs),
            workspace_root,
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            user_agent: self.user_agent.clone(),
            ..Default::default()
        }
    }

    pub fn sources_path(&self) -> PathBuf {
        self.workspace_root.join("sources.yaml")
    }

    pub fn scoring_rules_path(&self) -> PathBuf {
        self.workspace_root.join("rules").join("scoring.yaml")
    }

    pub fn reports_root(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }

    pub fn seen_cache_path(&self) -> PathBuf {
        self.state_dir.join("seen.json")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry yaml")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn active(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter().filter(|s| s.active)
    }
}
