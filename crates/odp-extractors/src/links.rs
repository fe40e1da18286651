use scraper::Html;
use url::Url;

use crate::fields::contains_any;
use crate::html::selector;

pub const DEFAULT_LINK_LIMIT: usize = 5;

pub const LINK_KEYWORDS: &[&str] = &[
    "forecast",
    "acquisition",
    "procurement",
    "lraf",
    "opportunit",
    "planned",
];

const DOCUMENT_SUFFIXES: &[&str] = &[".pdf", ".xlsx", ".xls"];
const DOWNLOAD_HINTS: &[&str] = &["download", "attachment"];

fn looks_like_document(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    DOCUMENT_SUFFIXES.iter().any(|s| path.ends_with(s)) || contains_any(url.as_str(), DOWNLOAD_HINTS)
}

/// Forecast-looking document links on a landing page, absolute, in page order.
///
/// Hrefs that cannot be resolved against `base_url` (or a base that is not a
/// URL at all) are skipped.
pub fn discover_document_links(html: &str, base_url: &str, limit: usize) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(anchor_sel) = selector("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut found: Vec<String> = Vec::new();
    for anchor in document.select(&anchor_sel) {
        if found.len() >= limit {
            break;
        }
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        if !looks_like_document(&resolved) {
            continue;
        }
        let text = anchor.text().collect::<String>();
        if !contains_any(&text, LINK_KEYWORDS) && !contains_any(resolved.as_str(), LINK_KEYWORDS) {
            continue;
        }
        let resolved = resolved.to_string();
        if !found.contains(&resolved) {
            found.push(resolved);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;

    #[test]
    fn finds_forecast_documents_and_resolves_relative_hrefs() {
        let html = fixture("html/landing_page.html");
        let links = discover_document_links(&html, "https://www.agency.gov/sbo/index.html", DEFAULT_LINK_LIMIT);
        assert_eq!(
            links,
            vec![
                "https://www.agency.gov/media/FY26_Procurement_Forecast.xlsx".to_string(),
                "https://www.agency.gov/sbo/docs/lraf-2026.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn download_endpoints_count_as_documents() {
        let html = r#"<a href="/download?id=7">Acquisition forecast workbook</a>
                      <a href="/download?id=8">Press kit</a>"#;
        let links = discover_document_links(html, "https://x.gov/", 5);
        assert_eq!(links, vec!["https://x.gov/download?id=7".to_string()]);
    }

    #[test]
    fn limit_caps_results() {
        let html = (0..8)
            .map(|i| format!(r#"<a href="/f{i}.pdf">Forecast part {i}</a>"#))
            .collect::<String>();
        let links = discover_document_links(&html, "https://x.gov/", 3);
        assert_eq!(links.len(), 3);
        assert!(links[0].ends_with("/f0.pdf"));
    }

    #[test]
    fn unusable_base_yields_nothing() {
        assert!(discover_document_links(r#"<a href="a.pdf">forecast</a>"#, "not a url", 5).is_empty());
    }
}
