//! Keyword-qualified table scanning over HTML pages.
//!
//! Only tables whose text mentions procurement vocabulary are read. Layout
//! and navigation tables are skipped entirely, so an oddly labelled forecast
//! table is missed rather than guessed at.

use odp_core::{DocumentFormat, Opportunity};
use scraper::{ElementRef, Html, Selector};

use crate::fields::{enrich_from_text, is_header_boilerplate, is_plausible_title, text_or_none, truncate_chars};
use crate::{DocumentExtractor, ExtractError, SourceDocument};

pub const EXTRACTOR_NAME: &str = "html-table/1";

pub const TABLE_KEYWORDS: &[&str] = &[
    "acquisition",
    "procurement",
    "forecast",
    "opportunity",
    "contract",
    "rfp",
    "solicitation",
];

/// Rows with this much joined text or less are never candidates.
pub const MIN_ROW_CHARS: usize = 20;
const FALLBACK_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTableExtractor;

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn element_text(el: &ElementRef<'_>) -> String {
    text_or_none(&el.text().collect::<Vec<_>>().join(" ")).unwrap_or_default()
}

pub fn is_opportunity_table(table_text: &str) -> bool {
    let lower = table_text.to_lowercase();
    TABLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn row_title(cells: &[String], joined: &str) -> Option<String> {
    cells
        .iter()
        .find(|c| is_plausible_title(c))
        .cloned()
        .or_else(|| {
            let fallback = truncate_chars(joined, FALLBACK_TITLE_CHARS);
            is_plausible_title(&fallback).then_some(fallback)
        })
}

pub fn extract_tables(doc: &SourceDocument<'_>) -> Result<Vec<Opportunity>, ExtractError> {
    let html = String::from_utf8_lossy(doc.body);
    let document = Html::parse_document(&html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td, th")?;

    let mut out = Vec::new();
    for table in document.select(&table_sel) {
        if !is_opportunity_table(&element_text(&table)) {
            continue;
        }
        for row in table.select(&row_sel).skip(1) {
            let cells = row
                .select(&cell_sel)
                .map(|c| element_text(&c))
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>();
            let joined = cells.join(" | ");
            if joined.chars().count() <= MIN_ROW_CHARS || is_header_boilerplate(&joined) {
                continue;
            }
            let Some(title) = row_title(&cells, &joined) else {
                continue;
            };
            let mut opp = doc.opportunity(&title, EXTRACTOR_NAME);
            opp.description = Some(joined.clone());
            enrich_from_text(&mut opp, &joined);
            out.push(opp);
        }
    }
    Ok(out)
}

impl DocumentExtractor for HtmlTableExtractor {
    fn name(&self) -> &'static str {
        EXTRACTOR_NAME
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Html
    }

    fn extract(&self, doc: &SourceDocument<'_>) -> Result<Vec<Opportunity>, ExtractError> {
        extract_tables(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fetched_at, fixture};
    use chrono::NaiveDate;

    fn run(html: &str) -> Vec<Opportunity> {
        let doc = SourceDocument::new(
            "Department of Health and Human Services",
            "https://www.hhs.gov/forecast",
            html.as_bytes(),
            fetched_at(),
        );
        HtmlTableExtractor.extract(&doc).unwrap()
    }

    #[test]
    fn keyword_table_row_becomes_record() {
        let records = run(&fixture("html/hhs_contract_table.html"));
        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert!(first.title.starts_with("Transportation Services"));
        assert_eq!(first.estimated_value, Some(2_500_000.0));
        assert_eq!(first.response_deadline, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(first.source, "Department of Health and Human Services");
        assert_eq!(first.source_url, "https://www.hhs.gov/forecast");
        assert_eq!(first.extractor, EXTRACTOR_NAME);

        let second = &records[1];
        assert_eq!(second.title, "Courier Services for Laboratory Specimens");
        assert_eq!(second.naics_code.as_deref(), Some("492110"));
        assert_eq!(second.set_aside.as_deref(), Some("WOSB"));
        assert_eq!(second.fiscal_year.as_deref(), Some("2025"));
        assert_eq!(second.fiscal_quarter.as_deref(), Some("Q3"));
    }

    #[test]
    fn caption_keyword_qualifies_table() {
        let body = r#"<table>
            <caption>Contract Opportunities</caption>
            <tr><th>Requirement</th><th>Estimated Value</th></tr>
            <tr><td>Regional freight distribution support</td><td>$90,000</td></tr>
        </table>"#;
        assert_eq!(run(body).len(), 1);
        assert!(run(&body.replace("Contract Opportunities", "Schedule")).is_empty());
    }

    #[test]
    fn layout_tables_without_keywords_are_ignored() {
        let records = run(&fixture("html/navigation_only.html"));
        assert!(records.is_empty());
    }

    #[test]
    fn short_and_header_rows_are_skipped() {
        let html = r#"<table>
            <tr><th>Procurement forecast</th></tr>
            <tr><td>Title</td><td>Description</td><td>NAICS</td><td>Value</td></tr>
            <tr><td>TBD</td><td>n/a</td></tr>
            <tr><td>Regional freight distribution support</td><td>$90,000</td></tr>
        </table>"#;
        let records = run(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Regional freight distribution support");
        assert_eq!(records[0].estimated_value, Some(90_000.0));
    }

    #[test]
    fn malformed_markup_yields_no_records_rather_than_error() {
        let records = run("<html><body><table><tr><td>unclosed <b>tags <<<>>");
        assert!(records.is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = fixture("html/hhs_contract_table.html");
        assert_eq!(run(&html), run(&html));
    }
}
