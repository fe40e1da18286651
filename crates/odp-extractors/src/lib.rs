//! Format extractors: raw document bytes in, loosely-typed opportunity records out.

use chrono::{DateTime, Utc};
use odp_core::{DocumentFormat, Opportunity};
use thiserror::Error;
use tracing::{debug, warn};

pub mod classify;
pub mod excel;
pub mod fields;
pub mod html;
pub mod links;
pub mod pdf;

pub use classify::{classify_document, classify_url};
pub use excel::ExcelExtractor;
pub use html::HtmlTableExtractor;
pub use links::discover_document_links;
pub use pdf::PdfExtractor;

pub const CRATE_NAME: &str = "odp-extractors";

/// A fetched (or uploaded) document plus the provenance every record inherits.
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    pub agency: &'a str,
    pub url: &'a str,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
    pub fetched_at: DateTime<Utc>,
}

impl<'a> SourceDocument<'a> {
    pub fn new(agency: &'a str, url: &'a str, body: &'a [u8], fetched_at: DateTime<Utc>) -> Self {
        Self {
            agency,
            url,
            content_type: None,
            body,
            fetched_at,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<&'a str>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn format(&self) -> DocumentFormat {
        classify_document(self.url, self.content_type)
    }

    pub(crate) fn opportunity(&self, title: &str, extractor: &str) -> Opportunity {
        Opportunity::new(title.trim(), self.agency, self.url, self.fetched_at, extractor)
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("pdf text layer unreadable: {0}")]
    Pdf(String),
    #[error("workbook unreadable: {0}")]
    Excel(#[from] calamine::Error),
    #[error("invalid selector {selector}: {message}")]
    Selector { selector: String, message: String },
    #[error("{0}")]
    Message(String),
}

pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn format(&self) -> DocumentFormat;
    fn extract(&self, doc: &SourceDocument<'_>) -> Result<Vec<Opportunity>, ExtractError>;
}

pub fn extractor_for(format: DocumentFormat) -> Box<dyn DocumentExtractor> {
    match format {
        DocumentFormat::Pdf => Box::new(PdfExtractor),
        DocumentFormat::Excel => Box::new(ExcelExtractor),
        DocumentFormat::Html => Box::new(HtmlTableExtractor),
    }
}

/// Run an extractor, turning any failure into "this document had nothing".
pub fn extract_best_effort(
    extractor: &dyn DocumentExtractor,
    doc: &SourceDocument<'_>,
) -> Vec<Opportunity> {
    match extractor.extract(doc) {
        Ok(records) => {
            let records = retain_titled(records);
            debug!(
                extractor = extractor.name(),
                url = doc.url,
                records = records.len(),
                "extracted records"
            );
            records
        }
        Err(err) => {
            warn!(
                extractor = extractor.name(),
                agency = doc.agency,
                url = doc.url,
                error = %err,
                "document unparseable; source contributes nothing"
            );
            Vec::new()
        }
    }
}

/// Final gate: no record leaves an extractor without a plausible title.
pub fn retain_titled(mut records: Vec<Opportunity>) -> Vec<Opportunity> {
    records.retain(|r| fields::is_plausible_title(&r.title));
    records
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    use chrono::TimeZone;

    use super::*;

    pub fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    pub fn fixture(rel: &str) -> String {
        let path = workspace_root().join("fixtures").join(rel);
        std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }

    pub fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 20, 9, 30, 0).single().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::fetched_at;
    use super::*;

    #[test]
    fn extractor_for_matches_format() {
        for format in [DocumentFormat::Pdf, DocumentFormat::Excel, DocumentFormat::Html] {
            assert_eq!(extractor_for(format).format(), format);
        }
    }

    #[test]
    fn best_effort_swallows_corrupt_documents() {
        let doc = SourceDocument::new("DOE", "https://x.gov/lraf.pdf", b"not a pdf", fetched_at());
        assert!(extract_best_effort(&PdfExtractor, &doc).is_empty());
        let doc = SourceDocument::new("DOE", "https://x.gov/lraf.xlsx", b"PK\x03\x04garbage", fetched_at());
        assert!(extract_best_effort(&ExcelExtractor, &doc).is_empty());
    }

    #[test]
    fn untitled_records_never_leave_the_gate() {
        let doc = SourceDocument::new("DOE", "https://x.gov", b"", fetched_at());
        let records = vec![
            doc.opportunity("   ", "t/1"),
            doc.opportunity("Freight brokerage support services", "t/1"),
        ];
        let kept = retain_titled(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Freight brokerage support services");
    }
}
