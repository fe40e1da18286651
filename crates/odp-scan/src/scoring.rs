//! Additive priority scoring.
//!
//! Defaults reproduce the operator-facing policy exactly; every weight can be
//! overridden from `rules/scoring.yaml` because they encode one tenant's
//! certifications rather than anything universal.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use odp_core::{NoticeType, Opportunity};
use odp_extractors::fields::{contains_any, is_transport_related};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBand {
    pub min: f64,
    pub max: f64,
    /// Whether `min` itself is inside the band.
    #[serde(default = "yes")]
    pub min_inclusive: bool,
    pub bonus: i32,
}

fn yes() -> bool {
    true
}

impl ValueBand {
    pub fn contains(&self, value: f64) -> bool {
        let above = if self.min_inclusive { value >= self.min } else { value > self.min };
        above && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub base: i32,
    pub wosb_bonus: i32,
    pub sources_sought_bonus: i32,
    pub small_business_bonus: i32,
    pub value_bands: Vec<ValueBand>,
    pub transport_bonus: i32,
    pub home_regions: Vec<String>,
    pub home_region_bonus: i32,
    pub deadline_bonus: i32,
    pub deadline_window_days: i64,
    pub high_priority_threshold: u8,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base: 50,
            wosb_bonus: 30,
            sources_sought_bonus: 20,
            small_business_bonus: 15,
            value_bands: vec![
                ValueBand {
                    min: 25_000.0,
                    max: 250_000.0,
                    min_inclusive: true,
                    bonus: 15,
                },
                ValueBand {
                    min: 250_000.0,
                    max: 1_000_000.0,
                    min_inclusive: false,
                    bonus: 10,
                },
            ],
            transport_bonus: 10,
            home_regions: Vec::new(),
            home_region_bonus: 5,
            deadline_bonus: 5,
            deadline_window_days: 7,
            high_priority_threshold: 70,
        }
    }
}

const WOSB_MARKERS: &[&str] = &["wosb", "women"];
const SMALL_BUSINESS_MARKERS: &[&str] = &["small business", "sba"];

impl ScoringPolicy {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing scoring policy yaml")
    }

    /// Policy from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no scoring rules file; using default weights");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Replace the configured home regions when `regions` is non-empty.
    pub fn with_home_regions(mut self, regions: &[String]) -> Self {
        if !regions.is_empty() {
            self.home_regions = regions.to_vec();
        }
        self
    }

    fn in_home_region(&self, opp: &Opportunity) -> bool {
        if self.home_regions.is_empty() {
            return false;
        }
        let regions = self
            .home_regions
            .iter()
            .map(|r| r.to_lowercase())
            .collect::<Vec<_>>();
        let regions = regions.iter().map(String::as_str).collect::<Vec<_>>();
        opp.location.as_deref().is_some_and(|l| contains_any(l, &regions)) || contains_any(&opp.source, &regions)
    }

    fn deadline_is_near(&self, opp: &Opportunity, today: NaiveDate) -> bool {
        opp.response_deadline.is_some_and(|deadline| {
            let days = (deadline - today).num_days();
            (0..=self.deadline_window_days).contains(&days)
        })
    }

    pub fn score(&self, opp: &Opportunity, today: NaiveDate) -> u8 {
        let mut score = self.base;
        let set_aside = opp.set_aside.as_deref().unwrap_or_default();
        if contains_any(set_aside, WOSB_MARKERS) {
            score = score.saturating_add(self.wosb_bonus);
        }
        if opp.notice_type == Some(NoticeType::SourcesSought) {
            score = score.saturating_add(self.sources_sought_bonus);
        }
        if contains_any(set_aside, SMALL_BUSINESS_MARKERS) {
            score = score.saturating_add(self.small_business_bonus);
        }
        if let Some(value) = opp.estimated_value {
            if let Some(band) = self.value_bands.iter().find(|b| b.contains(value)) {
                score = score.saturating_add(band.bonus);
            }
        }
        if is_transport_related(&opp.searchable_text()) {
            score = score.saturating_add(self.transport_bonus);
        }
        if self.in_home_region(opp) {
            score = score.saturating_add(self.home_region_bonus);
        }
        if self.deadline_is_near(opp, today) {
            score = score.saturating_add(self.deadline_bonus);
        }
        score.clamp(0, 100) as u8
    }

    pub fn is_high_priority(&self, score: u8) -> bool {
        score >= self.high_priority_threshold
    }

    pub fn apply_scores(&self, records: &mut [Opportunity], today: NaiveDate) {
        for record in records {
            record.priority_score = self.score(record, today);
            record.high_priority = self.is_high_priority(record.priority_score);
        }
    }
}
