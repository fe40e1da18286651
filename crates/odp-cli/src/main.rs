use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use odp_core::DocumentFormat;
use odp_scan::ScanConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "odp-cli")]
#[command(about = "FleetFlow opportunity discovery pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan every active source in sources.yaml, write reports and notify.
    Scan {
        /// Print the cycle summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Extract and score one local document.
    ScanFile {
        path: PathBuf,
        #[arg(long, default_value = "Local Document")]
        agency: String,
        /// Overrides detection from the file name and contents.
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Serve the dashboard and JSON API.
    Serve {
        #[arg(long, default_value_t = 8000, env = "ODP_WEB_PORT")]
        port: u16,
    },
    /// Run scans on the configured cron schedule until interrupted.
    Schedule,
    /// Markdown overview of recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Pdf,
    Excel,
    Html,
}

impl From<FormatArg> for DocumentFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pdf => DocumentFormat::Pdf,
            FormatArg::Excel => DocumentFormat::Excel,
            FormatArg::Html => DocumentFormat::Html,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,odp_scan=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ScanConfig::from_env();

    match cli.command.unwrap_or(Commands::Scan { json: false }) {
        Commands::Scan { json } => {
            let summary = odp_scan::run_scan_cycle(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "scan complete: run_id={} sources={} opportunities={} high_priority={} new={} notified={}/{} reports={}",
                    summary.run_id,
                    summary.sources,
                    summary.opportunities,
                    summary.high_priority,
                    summary.new_opportunities,
                    summary.dispatch.delivered,
                    summary.dispatch.attempted,
                    summary.reports_dir
                );
            }
        }
        Commands::ScanFile { path, agency, format } => {
            let outcome = odp_scan::scan_file(config, &path, &agency, format.map(Into::into)).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.opportunities)?);
        }
        Commands::Serve { port } => {
            let state = odp_web::AppState::new(config);
            odp_web::serve(SocketAddr::from(([0, 0, 0, 0], port)), state).await?;
        }
        Commands::Schedule => {
            let config = ScanConfig {
                scheduler_enabled: true,
                ..config
            };
            let Some(sched) = odp_scan::maybe_build_scheduler(&config).await? else {
                anyhow::bail!("scheduler disabled");
            };
            sched.start().await.context("starting scheduler")?;
            tracing::info!(crons = ?config.scan_crons, "scheduler running; ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        }
        Commands::Report { runs } => {
            println!("{}", odp_scan::reports::report_markdown(runs, &config.reports_root())?);
        }
    }

    Ok(())
}
