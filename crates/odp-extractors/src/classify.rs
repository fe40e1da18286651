use odp_core::DocumentFormat;

fn path_of(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_ascii_lowercase()
}

/// Format from the URL suffix alone; anything unrecognised is HTML.
pub fn classify_url(url: &str) -> DocumentFormat {
    let path = path_of(url);
    if path.ends_with(".pdf") {
        DocumentFormat::Pdf
    } else if path.ends_with(".xlsx") || path.ends_with(".xls") {
        DocumentFormat::Excel
    } else {
        DocumentFormat::Html
    }
}

/// URL suffix first, then the response content type when the URL says HTML.
pub fn classify_document(url: &str, content_type: Option<&str>) -> DocumentFormat {
    match classify_url(url) {
        DocumentFormat::Html => match content_type.map(str::to_ascii_lowercase) {
            Some(ct) if ct.contains("application/pdf") => DocumentFormat::Pdf,
            Some(ct) if ct.contains("spreadsheetml") || ct.contains("ms-excel") => DocumentFormat::Excel,
            _ => DocumentFormat::Html,
        },
        other => other,
    }
}
