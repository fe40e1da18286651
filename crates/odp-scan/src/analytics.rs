use std::collections::BTreeMap;

use odp_core::Opportunity;
use serde::{Deserialize, Serialize};

const UNSPECIFIED: &str = "unspecified";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total: usize,
    pub high_priority: usize,
    pub with_value: usize,
    pub total_estimated_value: f64,
    pub average_estimated_value: Option<f64>,
    pub average_score: Option<f64>,
    pub by_agency: BTreeMap<String, usize>,
    pub by_naics: BTreeMap<String, usize>,
    pub by_set_aside: BTreeMap<String, usize>,
    pub by_notice_type: BTreeMap<String, usize>,
}

impl Analytics {
    pub fn from_opportunities(records: &[Opportunity]) -> Self {
        let mut out = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut score_sum = 0u64;
        for r in records {
            if r.high_priority {
                out.high_priority += 1;
            }
            score_sum += u64::from(r.priority_score);
            if let Some(value) = r.estimated_value {
                out.with_value += 1;
                out.total_estimated_value += value;
            }
            *out.by_agency.entry(r.source.clone()).or_default() += 1;
            *out
                .by_naics
                .entry(r.naics_code.clone().unwrap_or_else(|| UNSPECIFIED.to_string()))
                .or_default() += 1;
            *out
                .by_set_aside
                .entry(r.set_aside.clone().unwrap_or_else(|| UNSPECIFIED.to_string()))
                .or_default() += 1;
            *out
                .by_notice_type
                .entry(r.notice_type.map(|t| t.to_string()).unwrap_or_else(|| UNSPECIFIED.to_string()))
                .or_default() += 1;
        }
        if out.with_value > 0 {
            out.average_estimated_value = Some(out.total_estimated_value / out.with_value as f64);
        }
        if out.total > 0 {
            out.average_score = Some(score_sum as f64 / out.total as f64);
        }
        out
    }
}
