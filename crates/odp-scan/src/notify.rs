//! Summaries of newly discovered opportunities and their fan-out to sinks.
//!
//! Every (sink, target) pair is attempted on its own; one failing webhook or
//! mailbox never stops delivery to the rest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::future::join_all;
use odp_core::Opportunity;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::split_list;

pub const TEXT_INLINE: usize = 2;
pub const EMAIL_INLINE: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryLine {
    pub title: String,
    pub agency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    pub url: String,
    pub priority_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub headline: String,
    pub total: usize,
    pub inline: Vec<SummaryLine>,
    pub remaining: usize,
}

pub fn format_usd(value: f64) -> String {
    let whole = value.round() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("${out}")
}

impl Summary {
    pub fn build(records: &[Opportunity], inline_limit: usize) -> Self {
        let total = records.len();
        let noun = if total == 1 { "opportunity" } else { "opportunities" };
        let inline = records
            .iter()
            .take(inline_limit)
            .map(|r| SummaryLine {
                title: r.title.clone(),
                agency: r.source.clone(),
                deadline: r.response_deadline,
                estimated_value: r.estimated_value,
                url: r.source_url.clone(),
                priority_score: r.priority_score,
            })
            .collect::<Vec<_>>();
        Self {
            headline: format!("{total} new government contract {noun}"),
            total,
            remaining: total - inline.len(),
            inline,
        }
    }

    fn remainder_line(&self) -> Option<String> {
        (self.remaining > 0).then(|| {
            let noun = if self.remaining == 1 { "opportunity" } else { "opportunities" };
            format!("+{} more {noun}", self.remaining)
        })
    }

    /// Compact, SMS-sized rendering.
    pub fn render_text(&self) -> String {
        let mut lines = vec![format!("{}:", self.headline)];
        for line in &self.inline {
            let mut entry = format!("- {} ({})", line.title, line.agency);
            if let Some(deadline) = line.deadline {
                entry.push_str(&format!(" due {deadline}"));
            }
            lines.push(entry);
        }
        lines.extend(self.remainder_line());
        lines.join("\n")
    }

    pub fn render_email(&self) -> (String, String) {
        let subject = format!("[ODP] {}", self.headline);
        let mut body = vec![self.headline.clone(), String::new()];
        for (i, line) in self.inline.iter().enumerate() {
            body.push(format!("{}. {}", i + 1, line.title));
            body.push(format!("   Agency: {}", line.agency));
            if let Some(deadline) = line.deadline {
                body.push(format!("   Deadline: {deadline}"));
            }
            if let Some(value) = line.estimated_value {
                body.push(format!("   Estimated value: {}", format_usd(value)));
            }
            body.push(format!("   Priority: {}", line.priority_score));
            body.push(format!("   {}", line.url));
            body.push(String::new());
        }
        body.extend(self.remainder_line());
        (subject, body.join("\n").trim_end().to_string())
    }
}

/// Everything a sink may need, rendered once per dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub text: String,
    pub body: String,
    pub summary: Summary,
}

impl Notification {
    pub fn from_records(records: &[Opportunity], email_inline: usize) -> Self {
        let summary = Summary::build(records, email_inline);
        let (subject, body) = summary.render_email();
        Self {
            subject,
            text: Summary::build(records, TEXT_INLINE).render_text(),
            body,
            summary,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    /// Independent delivery targets (URLs, mailboxes).
    fn targets(&self) -> Vec<String>;
    async fn send_to(&self, target: &str, notification: &Notification) -> Result<()>;
}

pub struct WebhookSink {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl WebhookSink {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook http client")?;
        Ok(Self { client, urls })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn targets(&self) -> Vec<String> {
        self.urls.clone()
    }

    async fn send_to(&self, target: &str, notification: &Notification) -> Result<()> {
        self.client
            .post(target)
            .json(&serde_json::json!({
                "subject": notification.subject,
                "text": notification.text,
                "summary": notification.summary,
            }))
            .send()
            .await
            .with_context(|| format!("posting to {target}"))?
            .error_for_status()
            .with_context(|| format!("webhook {target} rejected notification"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Caller-supplied mail delivery.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Logs messages instead of sending them.
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(to = %message.to, subject = %message.subject, "email notification (log transport)");
        Ok(())
    }
}

pub struct EmailSink {
    transport: Arc<dyn EmailTransport>,
    recipients: Vec<String>,
}

impl EmailSink {
    pub fn new(transport: Arc<dyn EmailTransport>, recipients: Vec<String>) -> Self {
        Self { transport, recipients }
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    fn targets(&self) -> Vec<String> {
        self.recipients.clone()
    }

    async fn send_to(&self, target: &str, notification: &Notification) -> Result<()> {
        self.transport
            .send(&EmailMessage {
                to: target.to_string(),
                subject: notification.subject.clone(),
                body: notification.body.clone(),
            })
            .await
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_urls: Vec<String>,
    pub email_recipients: Vec<String>,
    pub inline_limit: usize,
    pub only_high_priority: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_urls: Vec::new(),
            email_recipients: Vec::new(),
            inline_limit: EMAIL_INLINE,
            only_high_priority: true,
        }
    }
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            webhook_urls: std::env::var("ODP_WEBHOOK_URLS")
                .map(|v| split_list(&v, ','))
                .unwrap_or_default(),
            email_recipients: std::env::var("ODP_EMAIL_RECIPIENTS")
                .map(|v| split_list(&v, ','))
                .unwrap_or_default(),
            inline_limit: std::env::var("ODP_NOTIFY_INLINE")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.inline_limit),
            only_high_priority: std::env::var("ODP_NOTIFY_ONLY_HIGH_PRIORITY")
                .map(|v| !matches!(v.trim(), "0" | "false" | "FALSE" | "False" | "no"))
                .unwrap_or(defaults.only_high_priority),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub sink: String,
    pub target: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<DispatchFailure>,
}

pub struct Notifier {
    sinks: Vec<Box<dyn NotificationSink>>,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            sinks: Vec::new(),
            config,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Webhook and email sinks for whatever `config` names; email goes to `transport`.
    pub fn from_config(config: NotifyConfig, transport: Arc<dyn EmailTransport>) -> Result<Self> {
        let mut notifier = Self::new(config.clone());
        if !config.webhook_urls.is_empty() {
            notifier = notifier.with_sink(Box::new(WebhookSink::new(config.webhook_urls, Duration::from_secs(15))?));
        }
        if !config.email_recipients.is_empty() {
            notifier = notifier.with_sink(Box::new(EmailSink::new(transport, config.email_recipients)));
        }
        Ok(notifier)
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Records worth announcing under this notifier's filter.
    pub fn select<'a>(&self, records: &'a [Opportunity]) -> Vec<&'a Opportunity> {
        records
            .iter()
            .filter(|r| !self.config.only_high_priority || r.high_priority)
            .collect()
    }

    pub async fn dispatch(&self, records: &[Opportunity]) -> DispatchReport {
        let selected = self.select(records).into_iter().cloned().collect::<Vec<_>>();
        if selected.is_empty() || self.sinks.is_empty() {
            return DispatchReport::default();
        }
        let notification = Notification::from_records(&selected, self.config.inline_limit);

        let attempts = self.sinks.iter().flat_map(|sink| {
            let notification = &notification;
            sink.targets().into_iter().map(move |target| async move {
                let result = sink.send_to(&target, notification).await;
                (sink.name().to_string(), target, result)
            })
        });

        let mut report = DispatchReport::default();
        for (sink, target, result) in join_all(attempts).await {
            report.attempted += 1;
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(sink = %sink, target = %target, error = %err, "notification delivery failed");
                    report.failures.push(DispatchFailure {
                        sink,
                        target,
                        error: format!("{err:#}"),
                    });
                }
            }
        }
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failures.len(),
            "notifications dispatched"
        );
        report
    }
}
