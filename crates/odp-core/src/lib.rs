//! Core domain model and provenance types for the opportunity discovery pipeline.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "odp-core";

/// Shortest title an extractor may emit.
pub const MIN_TITLE_LEN: usize = 10;
/// Longest title an extractor may emit.
pub const MAX_TITLE_LEN: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Excel,
    Html,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Excel => "xlsx",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pdf => "pdf",
            Self::Excel => "excel",
            Self::Html => "html",
        })
    }
}

/// Batch ordering for scans; `High` sources are scanned first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeType {
    Solicitation,
    SourcesSought,
    SpecialNotice,
    IntentToBundle,
    Forecast,
    Other,
}

impl NoticeType {
    /// Classify free text (a notice type column, a title, a row) into a notice type.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("sources sought") || lower.contains("market research") {
            Self::SourcesSought
        } else if lower.contains("special notice") {
            Self::SpecialNotice
        } else if lower.contains("intent to bundle") {
            Self::IntentToBundle
        } else if lower.contains("solicitation") || lower.contains("rfp") || lower.contains("rfq") {
            Self::Solicitation
        } else if lower.contains("forecast") {
            Self::Forecast
        } else {
            Self::Other
        }
    }

    pub fn is_pre_solicitation(&self) -> bool {
        matches!(self, Self::SourcesSought | Self::SpecialNotice)
    }
}

impl fmt::Display for NoticeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Solicitation => "Solicitation",
            Self::SourcesSought => "Sources Sought",
            Self::SpecialNotice => "Special Notice",
            Self::IntentToBundle => "Intent to Bundle",
            Self::Forecast => "Forecast",
            Self::Other => "Other",
        })
    }
}

/// A configured place to look for opportunities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    pub agency: String,
    pub url: String,
    #[serde(default)]
    pub format_hint: Option<DocumentFormat>,
    #[serde(default)]
    pub priority_tier: PriorityTier,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_active() -> bool {
    true
}

impl SourceDescriptor {
    pub fn new(agency: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            agency: agency.into(),
            url: url.into(),
            format_hint: None,
            priority_tier: PriorityTier::default(),
            active: true,
            notes: None,
        }
    }

    /// Stable slug for logs and artifact paths.
    pub fn source_id(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => slugify(id),
            _ => slugify(&self.agency),
        }
    }
}

/// Best-effort opportunity record extracted from an unstructured document.
///
/// `title`, `source`, `source_url` and `discovered_at` are always present;
/// everything else is optional and consumers must treat it as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naics_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_quarter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_aside: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_type: Option<NoticeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub source: String,
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
    pub extractor: String,
    pub priority_score: u8,
    pub high_priority: bool,
}

impl Opportunity {
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        source_url: impl Into<String>,
        discovered_at: DateTime<Utc>,
        extractor: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            naics_code: None,
            estimated_value: None,
            fiscal_year: None,
            fiscal_quarter: None,
            contact_email: None,
            contact_name: None,
            contact_phone: None,
            set_aside: None,
            notice_type: None,
            location: None,
            response_deadline: None,
            keywords: Vec::new(),
            source: source.into(),
            source_url: source_url.into(),
            discovered_at,
            extractor: extractor.into(),
            priority_score: 0,
            high_priority: false,
        }
    }

    /// Within-run identity: normalized title plus normalized agency label.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            normalize_key_fragment(&self.title),
            normalize_key_fragment(&self.source)
        )
    }

    /// Title and description joined, used by keyword heuristics.
    pub fn searchable_text(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} {}", self.title, desc),
            None => self.title.clone(),
        }
    }

    /// Copy optional fields that `self` lacks from `other`.
    pub fn absorb_missing(&mut self, other: &Opportunity) {
        fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if dst.is_none() {
                dst.clone_from(src);
            }
        }
        fill(&mut self.description, &other.description);
        fill(&mut self.naics_code, &other.naics_code);
        fill(&mut self.estimated_value, &other.estimated_value);
        fill(&mut self.fiscal_year, &other.fiscal_year);
        fill(&mut self.fiscal_quarter, &other.fiscal_quarter);
        fill(&mut self.contact_email, &other.contact_email);
        fill(&mut self.contact_name, &other.contact_name);
        fill(&mut self.contact_phone, &other.contact_phone);
        fill(&mut self.set_aside, &other.set_aside);
        fill(&mut self.notice_type, &other.notice_type);
        fill(&mut self.location, &other.location);
        fill(&mut self.response_deadline, &other.response_deadline);
        for keyword in &other.keywords {
            if !self.keywords.contains(keyword) {
                self.keywords.push(keyword.clone());
            }
        }
    }
}

pub fn normalize_key_fragment(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn slugify(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
