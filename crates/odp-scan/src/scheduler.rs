use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::ScanConfig;
use crate::run_scan_cycle;

/// One cron job per configured schedule, or `None` when scheduling is off.
pub async fn maybe_build_scheduler(config: &ScanConfig) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for cron in &config.scan_crons {
        let job_config = config.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let config = job_config.clone();
            Box::pin(async move {
                match run_scan_cycle(&config).await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        opportunities = summary.opportunities,
                        new = summary.new_opportunities,
                        "scheduled scan complete"
                    ),
                    Err(err) => error!(error = %format!("{err:#}"), "scheduled scan failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
    }
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_scheduler_is_none() {
        let config = ScanConfig::default();
        assert!(maybe_build_scheduler(&config).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_is_reported() {
        let config = ScanConfig {
            scheduler_enabled: true,
            scan_crons: vec!["every morning".into()],
            ..ScanConfig::default()
        };
        let Err(err) = maybe_build_scheduler(&config).await else {
            panic!("invalid cron expression was accepted");
        };
        assert!(format!("{err:#}").contains("every morning"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn default_schedule_builds() {
        let config = ScanConfig {
            scheduler_enabled: true,
            ..ScanConfig::default()
        };
        assert!(maybe_build_scheduler(&config).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scan_cycle_runs_on_a_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sources.yaml"), "sources: []\n").unwrap();
        let config = ScanConfig {
            workspace_root: dir.path().to_path_buf(),
            state_dir: dir.path().join("state"),
            ..ScanConfig::default()
        };
        let summary = tokio::spawn(async move { crate::run_scan_cycle(&config).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.sources, 0);
        assert_eq!(summary.opportunities, 0);
    }
}
