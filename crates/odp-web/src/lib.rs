//! Axum + Askama surface over the scan reports: dashboard page and JSON API.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use odp_core::{slugify, Opportunity, SourceDescriptor};
use odp_scan::notify::format_usd;
use odp_scan::reports::latest_outcome;
use odp_scan::{Analytics, ScanConfig, ScanOutcome, SourceRegistry, SourceStatus};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "odp-web";

const DASHBOARD_TOP_N: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub config: ScanConfig,
}

impl AppState {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug, Deserialize, Default)]
struct OpportunitiesQuery {
    high_priority: Option<bool>,
    source: Option<String>,
}

/// Registry entry joined with what the latest run saw for it.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRow {
    pub source_id: String,
    pub agency: String,
    pub url: String,
    pub active: bool,
    pub last_status: Option<SourceStatus>,
    pub last_records: Option<usize>,
}

#[derive(Debug, Clone)]
struct DashboardRow {
    title: String,
    agency: String,
    score: u8,
    high_priority: bool,
    value: String,
    deadline: String,
    url: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    latest_run_id: String,
    scanned_at: String,
    total_sources: usize,
    total_opportunities: usize,
    high_priority: usize,
    total_value: String,
    top: Vec<DashboardRow>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/opportunities", get(opportunities_handler))
        .route("/api/sources", get(sources_handler))
        .route("/api/analytics", get(analytics_handler))
        .route("/api/scan", post(scan_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving dashboard");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let outcome = match load_latest(&state.config.reports_root()) {
        Ok(outcome) => outcome,
        Err(err) => return server_error(err),
    };
    let analytics = Analytics::from_opportunities(&outcome.opportunities);
    let tpl = IndexTemplate {
        latest_run_id: if outcome.run_id.is_nil() {
            "none".to_string()
        } else {
            outcome.run_id.to_string()
        },
        scanned_at: outcome.finished_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        total_sources: outcome.source_reports.len(),
        total_opportunities: analytics.total,
        high_priority: analytics.high_priority,
        total_value: format_usd(analytics.total_estimated_value),
        top: outcome
            .opportunities
            .iter()
            .take(DASHBOARD_TOP_N)
            .map(dashboard_row)
            .collect(),
    };
    render_html(tpl)
}

fn dashboard_row(o: &Opportunity) -> DashboardRow {
    DashboardRow {
        title: o.title.clone(),
        agency: o.source.clone(),
        score: o.priority_score,
        high_priority: o.high_priority,
        value: o.estimated_value.map(format_usd).unwrap_or_else(|| "-".into()),
        deadline: o
            .response_deadline
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
        url: o.source_url.clone(),
    }
}

async fn opportunities_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OpportunitiesQuery>,
) -> Response {
    match load_latest(&state.config.reports_root()) {
        Ok(outcome) => Json(filter_opportunities(outcome.opportunities, &query)).into_response(),
        Err(err) => server_error(err),
    }
}

fn filter_opportunities(records: Vec<Opportunity>, query: &OpportunitiesQuery) -> Vec<Opportunity> {
    let source = query.source.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(slugify);
    records
        .into_iter()
        .filter(|o| !query.high_priority.unwrap_or(false) || o.high_priority)
        .filter(|o| source.as_ref().map_or(true, |s| slugify(&o.source) == *s))
        .collect()
}

async fn sources_handler(State(state): State<Arc<AppState>>) -> Response {
    let sources = match load_sources(&state.config.sources_path()).await {
        Ok(sources) => sources,
        Err(err) => return server_error(err),
    };
    let outcome = match load_latest(&state.config.reports_root()) {
        Ok(outcome) => outcome,
        Err(err) => return server_error(err),
    };
    let rows = sources
        .iter()
        .map(|s| {
            let source_id = s.source_id();
            let last = outcome.source_reports.iter().find(|r| r.source_id == source_id);
            SourceRow {
                agency: s.agency.clone(),
                url: s.url.clone(),
                active: s.active,
                last_status: last.map(|r| r.status),
                last_records: last.map(|r| r.records),
                source_id,
            }
        })
        .collect::<Vec<_>>();
    Json(rows).into_response()
}

async fn analytics_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_latest(&state.config.reports_root()) {
        Ok(outcome) => Json(Analytics::from_opportunities(&outcome.opportunities)).into_response(),
        Err(err) => server_error(err),
    }
}

async fn scan_handler(State(state): State<Arc<AppState>>) -> Response {
    let summary = match odp_scan::run_scan_cycle(&state.config).await {
        Ok(summary) => summary,
        Err(err) => return server_error(err),
    };
    match latest_outcome(&state.config.reports_root()) {
        Ok(Some(outcome)) if outcome.run_id == summary.run_id => Json(outcome).into_response(),
        Ok(_) => server_error(anyhow::anyhow!("scan {} finished but its report is missing", summary.run_id)),
        Err(err) => server_error(err),
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Latest run, or an empty outcome before the first scan.
fn load_latest(reports_root: &Path) -> anyhow::Result<ScanOutcome> {
    Ok(latest_outcome(reports_root)?.unwrap_or_else(empty_outcome))
}

fn empty_outcome() -> ScanOutcome {
    let now = Utc::now();
    ScanOutcome {
        run_id: Uuid::nil(),
        started_at: now,
        finished_at: now,
        opportunities: Vec::new(),
        source_reports: Vec::new(),
        analyses: Default::default(),
    }
}

async fn load_sources(path: &Path) -> anyhow::Result<Vec<SourceDescriptor>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(SourceRegistry::load(path).await?.sources)
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %format!("{err:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Server error: {err:#}")).into_response()
}
