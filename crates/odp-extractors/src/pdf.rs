//! Text-layer PDF extraction as a streaming line scan.
//!
//! A line that looks like a logistics requirement opens a candidate; the next
//! [`PDF_CONTEXT_WINDOW`] non-blank lines are mined for its fields. Opening a
//! new candidate emits the previous one. Scanned (image only) PDFs have no
//! text layer and produce nothing.

use std::panic::{catch_unwind, AssertUnwindSafe};

use odp_core::{DocumentFormat, Opportunity};

use crate::fields::{contains_any, enrich_from_text};
use crate::{DocumentExtractor, ExtractError, SourceDocument};

pub const EXTRACTOR_NAME: &str = "pdf-lines/1";

/// Non-blank lines after a candidate title that may contribute fields.
pub const PDF_CONTEXT_WINDOW: usize = 10;

pub const TITLE_KEYWORDS: &[&str] = &[
    "transport",
    "freight",
    "logistics",
    "delivery",
    "supply",
    "distribution",
];

const MIN_TITLE_LINE: usize = 20;
const MAX_TITLE_LINE: usize = 200;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

/// Concatenated page text, pages in document order.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, ExtractError> {
    match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(ExtractError::Pdf(err.to_string())),
        Err(_) => Err(ExtractError::Pdf("decoder panicked".to_string())),
    }
}

pub fn is_candidate_title(line: &str) -> bool {
    let len = line.chars().count();
    (MIN_TITLE_LINE..=MAX_TITLE_LINE).contains(&len) && contains_any(line, TITLE_KEYWORDS)
}

struct Candidate {
    record: Opportunity,
    context: Vec<String>,
}

pub struct PdfLineScanner<'d, 'a> {
    doc: &'d SourceDocument<'a>,
    current: Option<Candidate>,
    emitted: Vec<Opportunity>,
}

impl<'d, 'a> PdfLineScanner<'d, 'a> {
    pub fn new(doc: &'d SourceDocument<'a>) -> Self {
        Self {
            doc,
            current: None,
            emitted: Vec::new(),
        }
    }

    pub fn feed_line(&mut self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        if is_candidate_title(line) {
            self.flush();
            self.current = Some(Candidate {
                record: self.doc.opportunity(line, EXTRACTOR_NAME),
                context: Vec::new(),
            });
            return;
        }
        if let Some(candidate) = self.current.as_mut() {
            if candidate.context.len() < PDF_CONTEXT_WINDOW {
                enrich_from_text(&mut candidate.record, line);
                candidate.context.push(line.to_string());
            }
        }
    }

    fn flush(&mut self) {
        if let Some(Candidate { mut record, context }) = self.current.take() {
            if !record.title.is_empty() {
                if !context.is_empty() {
                    record.description = Some(context.join(" "));
                }
                self.emitted.push(record);
            }
        }
    }

    pub fn finish(mut self) -> Vec<Opportunity> {
        self.flush();
        self.emitted
    }
}

pub fn scan_pdf_text(text: &str, doc: &SourceDocument<'_>) -> Vec<Opportunity> {
    let mut scanner = PdfLineScanner::new(doc);
    for line in text.lines() {
        scanner.feed_line(line);
    }
    scanner.finish()
}

impl DocumentExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        EXTRACTOR_NAME
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn extract(&self, doc: &SourceDocument<'_>) -> Result<Vec<Opportunity>, ExtractError> {
        let text = pdf_to_text(doc.body)?;
        Ok(scan_pdf_text(&text, doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fetched_at, fixture};
    use chrono::NaiveDate;
    use odp_core::NoticeType;

    fn doc() -> SourceDocument<'static> {
        SourceDocument::new(
            "Department of Veterans Affairs",
            "https://www.va.gov/osdbu/lraf-2026.pdf",
            b"",
            fetched_at(),
        )
    }

    #[test]
    fn freight_title_collects_email_and_amount_from_window() {
        let text = "Freight brokerage support services\ncontact: ops@agency.gov\n$450,000\n";
        let records = scan_pdf_text(text, &doc());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Freight brokerage support services");
        assert_eq!(records[0].contact_email.as_deref(), Some("ops@agency.gov"));
        assert_eq!(records[0].estimated_value, Some(450_000.0));
        assert_eq!(records[0].extractor, EXTRACTOR_NAME);
    }

    #[test]
    fn forecast_fixture_yields_one_record_per_candidate() {
        let records = scan_pdf_text(&fixture("text/pdf_forecast.txt"), &doc());
        let titles = records.iter().map(|r| r.title.as_str()).collect::<Vec<_>>();
        assert_eq!(
            titles,
            vec![
                "Freight brokerage support services",
                "Regional Distribution Center Operations",
                "Medical supply delivery courier network",
            ]
        );

        let regional = &records[1];
        assert_eq!(regional.naics_code.as_deref(), Some("493110"));
        assert_eq!(regional.set_aside.as_deref(), Some("Total Small Business"));
        assert_eq!(regional.location.as_deref(), Some("Detroit, MI"));
        assert_eq!(regional.estimated_value, Some(1_200_000.0));
        assert_eq!(regional.fiscal_year.as_deref(), Some("2026"));
        assert_eq!(regional.fiscal_quarter.as_deref(), Some("Q2"));
        assert_eq!(regional.contact_name.as_deref(), Some("Dana Reyes"));

        let medical = &records[2];
        assert_eq!(medical.notice_type, Some(NoticeType::SourcesSought));
        assert_eq!(medical.response_deadline, NaiveDate::from_ymd_opt(2025, 4, 15));
    }

    #[test]
    fn lines_past_the_window_are_ignored() {
        let mut text = String::from("Logistics support for field hospitals\n");
        for i in 0..PDF_CONTEXT_WINDOW {
            text.push_str(&format!("note line {i}\n"));
        }
        text.push_str("contact: late@agency.gov\n");
        let records = scan_pdf_text(&text, &doc());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].contact_email, None);
    }

    #[test]
    fn short_and_long_keyword_lines_are_not_titles() {
        assert!(!is_candidate_title("Freight only"));
        assert!(!is_candidate_title(&format!("freight {}", "x".repeat(200))));
        assert!(is_candidate_title("Medical supply delivery courier network"));
    }

    #[test]
    fn text_without_candidates_is_empty() {
        assert!(scan_pdf_text("Page 1 of 2\nTable of contents\n", &doc()).is_empty());
    }

    #[test]
    fn corrupt_bytes_are_an_error_not_a_panic() {
        assert!(matches!(pdf_to_text(b"%PDF-1.7 truncated"), Err(ExtractError::Pdf(_))));
    }

    #[test]
    fn scanning_twice_is_identical() {
        let text = fixture("text/pdf_forecast.txt");
        assert_eq!(scan_pdf_text(&text, &doc()), scan_pdf_text(&text, &doc()));
    }
}
