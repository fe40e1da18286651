//! Field-level heuristics shared by every format extractor.
//!
//! Each heuristic is a small pure function so it can be tuned and tested on
//! its own. None of them validate against official registries: a NAICS code
//! here is "a six digit number in the right place", nothing more.

use std::sync::LazyLock;

use chrono::NaiveDate;
use odp_core::{NoticeType, Opportunity, MAX_TITLE_LEN, MIN_TITLE_LEN};
use regex::Regex;

/// Words that mark text as transportation/logistics related.
pub const TRANSPORT_KEYWORDS: &[&str] = &[
    "transport",
    "freight",
    "logistics",
    "delivery",
    "supply",
    "distribution",
    "shipping",
    "trucking",
    "warehousing",
    "cargo",
    "hauling",
    "fleet",
];

/// Tags recorded on `Opportunity::keywords` when present in title or description.
pub const KEYWORD_TAGS: &[&str] = &[
    "transportation",
    "freight",
    "logistics",
    "shipping",
    "distribution",
    "trucking",
    "delivery",
    "warehousing",
    "supply chain",
    "cargo",
    "equipment",
    "medical",
    "emergency",
    "heavy haul",
    "oversized",
];

const HEADER_LABELS: &[&str] = &[
    "title", "description", "naics", "code", "value", "amount", "estimated", "fy", "fiscal",
    "year", "quarter", "contact", "email", "office", "agency", "set", "aside", "setaside",
    "status", "type", "date", "award", "requirement", "place", "performance", "competition",
    "contract", "number", "vehicle", "anticipated", "solicitation", "poc", "phone", "name",
    "of", "and", "est", "dollar", "range", "notes",
];

static RE_NAICS_LABELLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bNAICS(?:\s+code)?\s*[:#-]?\s*(\d{6})\b").unwrap());
static RE_SIX_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{6}\b").unwrap());
static RE_DOLLAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?\s*(million|billion|thousand|mil|bn|m|b|k)?\b")
        .unwrap()
});
static RE_WORD_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(million|billion)\b").unwrap());
static RE_FISCAL_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FY|Fiscal\s+Year)\s?-?\s?(\d{4}|\d{2})\b").unwrap());
static RE_PLAIN_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
static RE_QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:Q|Quarter\s*)([1-4])(?:\b|FY)").unwrap());
static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static RE_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]\d{4}\b").unwrap()
});
static RE_CONTACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:point of contact|contact|poc)(?i:\s+name)?\s*[:\-]\s*([A-Z][a-z]+(?:\s+[A-Z]\.)?(?:\s+[A-Z][A-Za-z'\-]+){1,2})",
    )
    .unwrap()
});
static RE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:place of performance|location|office)\s*[:\-]\s*([^|\n;]{2,80})").unwrap()
});
static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());
static RE_US_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static RE_DEADLINE_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:due|deadline|responses?|closing|closes)\b").unwrap());

struct SetAsidePattern {
    regex: Regex,
    label: &'static str,
}

static SET_ASIDES: LazyLock<Vec<SetAsidePattern>> = LazyLock::new(|| {
    [
        (r"(?i)\bEDWOSB\b", "EDWOSB"),
        (r"(?i)\bWOSB\b", "WOSB"),
        (r"(?i)\bwomen[\s-]owned\b", "Women-Owned Small Business"),
        (r"(?i)\b8\s?\(a\)", "8(a)"),
        (r"(?i)\bhub\s?zone\b", "HUBZone"),
        (r"(?i)\bSDVOSB\b|service[\s-]disabled", "SDVOSB"),
        (r"(?i)\btotal small business\b", "Total Small Business"),
        (r"(?i)\bsmall business\b|\bSBA\b", "Small Business"),
        (r"(?i)\bunrestricted\b|\bfull and open\b", "Unrestricted"),
    ]
    .into_iter()
    .map(|(pattern, label)| SetAsidePattern {
        regex: Regex::new(pattern).unwrap(),
        label,
    })
    .collect()
});

pub fn text_or_none(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn extract_naics(text: &str) -> Option<String> {
    if let Some(caps) = RE_NAICS_LABELLED.captures(text) {
        return Some(caps[1].to_string());
    }
    RE_SIX_DIGITS
        .find_iter(text)
        .find(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            !matches!(before, Some('$' | ',' | '.' | '-' | '/'))
                && !matches!(after, Some(',' | '.' | '-' | '/'))
        })
        .map(|m| m.as_str().to_string())
}

fn scale_for(suffix: Option<&str>) -> f64 {
    match suffix.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("billion" | "bn" | "b") => 1_000_000_000.0,
        Some("million" | "mil" | "m") => 1_000_000.0,
        Some("thousand" | "k") => 1_000.0,
        _ => 1.0,
    }
}

/// Parse the largest currency amount mentioned in `text`.
///
/// Handles `$1,234,567`, `$2.5M`, `$450K` and `3 million`; ranges resolve to
/// their upper bound. Locale-specific separators are not understood.
pub fn parse_dollar_amount(text: &str) -> Option<f64> {
    let mut values = Vec::new();
    for caps in RE_DOLLAR.captures_iter(text) {
        let whole = caps[1].replace(',', "");
        let number = match caps.get(2) {
            Some(frac) => format!("{whole}.{}", frac.as_str()),
            None => whole,
        };
        if let Ok(v) = number.parse::<f64>() {
            values.push(v * scale_for(caps.get(3).map(|m| m.as_str())));
        }
    }
    for caps in RE_WORD_AMOUNT.captures_iter(text) {
        if let Ok(v) = caps[1].parse::<f64>() {
            values.push(v * scale_for(Some(&caps[2])));
        }
    }
    values.into_iter().filter(|v| *v > 0.0).reduce(f64::max)
}

/// Like [`parse_dollar_amount`] but also accepts a bare number (spreadsheet cells).
pub fn parse_amount_cell(cell: &str) -> Option<f64> {
    parse_dollar_amount(cell).or_else(|| {
        let cleaned = cell.trim().replace(',', "");
        cleaned.parse::<f64>().ok().filter(|v| *v > 0.0)
    })
}

pub fn extract_fiscal_year(text: &str) -> Option<String> {
    let caps = RE_FISCAL_YEAR.captures(text)?;
    let year = &caps[1];
    if year.len() == 2 {
        Some(format!("20{year}"))
    } else {
        Some(year.to_string())
    }
}

/// Fiscal year from a dedicated column, where a bare year is enough.
pub fn parse_year_cell(cell: &str) -> Option<String> {
    extract_fiscal_year(cell).or_else(|| RE_PLAIN_YEAR.captures(cell).map(|c| c[1].to_string()))
}

pub fn extract_fiscal_quarter(text: &str) -> Option<String> {
    RE_QUARTER.captures(text).map(|caps| format!("Q{}", &caps[1]))
}

/// Quarter from a dedicated column, where a bare `1`..`4` is enough.
pub fn parse_quarter_cell(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    match trimmed {
        "1" | "2" | "3" | "4" => Some(format!("Q{trimmed}")),
        _ => extract_fiscal_quarter(trimmed),
    }
}

pub fn extract_email(text: &str) -> Option<String> {
    RE_EMAIL
        .find(text)
        .map(|m| m.as_str().trim_end_matches('.').to_ascii_lowercase())
}

pub fn extract_phone(text: &str) -> Option<String> {
    RE_PHONE.find(text).map(|m| m.as_str().trim().to_string())
}

pub fn extract_contact_name(text: &str) -> Option<String> {
    RE_CONTACT_NAME.captures(text).map(|caps| caps[1].trim().to_string())
}

pub fn extract_location(text: &str) -> Option<String> {
    RE_LOCATION
        .captures(text)
        .and_then(|caps| text_or_none(&caps[1]))
}

pub fn extract_set_aside(text: &str) -> Option<String> {
    SET_ASIDES
        .iter()
        .find(|p| p.regex.is_match(text))
        .map(|p| p.label.to_string())
}

fn parse_date_at(text: &str) -> Option<NaiveDate> {
    let iso = RE_ISO_DATE.captures(text).and_then(|c| {
        let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)?;
        Some((c.get(0)?.start(), date))
    });
    let us = RE_US_DATE.captures(text).and_then(|c| {
        let date = NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)?;
        Some((c.get(0)?.start(), date))
    });
    match (iso, us) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (Some(a), None) => Some(a.1),
        (None, Some(b)) => Some(b.1),
        (None, None) => None,
    }
}

/// Response deadline: the first date after a "due"/"deadline" cue, else the first date.
pub fn extract_deadline(text: &str) -> Option<NaiveDate> {
    if let Some(cue) = RE_DEADLINE_CUE.find(text) {
        if let Some(date) = parse_date_at(&text[cue.end()..]) {
            return Some(date);
        }
    }
    parse_date_at(text)
}

pub fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

pub fn is_transport_related(text: &str) -> bool {
    contains_any(text, TRANSPORT_KEYWORDS)
}

pub fn matching_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    KEYWORD_TAGS
        .iter()
        .filter(|tag| lower.contains(*tag))
        .map(|tag| tag.to_string())
        .collect()
}

/// Column-label rows ("Title | NAICS | Value | FY") rather than data.
pub fn is_header_boilerplate(text: &str) -> bool {
    if text.chars().any(|c| c.is_ascii_digit() || c == '$') {
        return false;
    }
    let words = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>();
    if words.len() < 2 {
        return false;
    }
    let labels = words.iter().filter(|w| HEADER_LABELS.contains(&w.as_str())).count();
    labels * 10 >= words.len() * 6
}

pub fn is_plausible_title(text: &str) -> bool {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    (MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&len)
        && trimmed.chars().filter(|c| c.is_alphabetic()).count() >= 5
        && !is_header_boilerplate(trimmed)
}

/// Fill every still-empty optional field from `text`.
pub fn enrich_from_text(opp: &mut Opportunity, text: &str) {
    fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> Option<T>) {
        if slot.is_none() {
            *slot = value();
        }
    }
    fill(&mut opp.naics_code, || extract_naics(text));
    fill(&mut opp.estimated_value, || parse_dollar_amount(text));
    fill(&mut opp.fiscal_year, || extract_fiscal_year(text));
    fill(&mut opp.fiscal_quarter, || extract_fiscal_quarter(text));
    fill(&mut opp.contact_email, || extract_email(text));
    fill(&mut opp.contact_name, || extract_contact_name(text));
    fill(&mut opp.contact_phone, || extract_phone(text));
    fill(&mut opp.set_aside, || extract_set_aside(text));
    fill(&mut opp.location, || extract_location(text));
    fill(&mut opp.response_deadline, || extract_deadline(text));
    fill(&mut opp.notice_type, || {
        Some(NoticeType::classify(text)).filter(|t| *t != NoticeType::Other)
    });
    for keyword in matching_keywords(text) {
        if !opp.keywords.contains(&keyword) {
            opp.keywords.push(keyword);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naics_prefers_labelled_code_and_skips_amount_fragments() {
        assert_eq!(extract_naics("NAICS: 484121 - General Freight").as_deref(), Some("484121"));
        assert_eq!(extract_naics("Budget $450000, code 488510").as_deref(), Some("488510"));
        assert_eq!(extract_naics("$2,500,000"), None);
        assert_eq!(extract_naics("call 555-123-4567"), None);
    }

    #[test]
    fn dollar_amounts_in_common_shapes() {
        assert_eq!(parse_dollar_amount("$2,500,000"), Some(2_500_000.0));
        assert_eq!(parse_dollar_amount("approx $450,000 total"), Some(450_000.0));
        assert_eq!(parse_dollar_amount("$2.5M ceiling"), Some(2_500_000.0));
        assert_eq!(parse_dollar_amount("$450K"), Some(450_000.0));
        assert_eq!(parse_dollar_amount("3 million over five years"), Some(3_000_000.0));
        assert_eq!(parse_dollar_amount("$1.2 billion"), Some(1_200_000_000.0));
        assert_eq!(parse_dollar_amount("$5 more items"), Some(5.0));
        assert_eq!(parse_dollar_amount("no value listed"), None);
    }

    #[test]
    fn dollar_range_resolves_to_upper_bound() {
        assert_eq!(
            parse_dollar_amount("Estimated $5,000,000 - $8,000,000"),
            Some(8_000_000.0)
        );
    }

    #[test]
    fn amount_cell_accepts_bare_numbers() {
        assert_eq!(parse_amount_cell("$75,000"), Some(75_000.0));
        assert_eq!(parse_amount_cell("75000"), Some(75_000.0));
        assert_eq!(parse_amount_cell("TBD"), None);
    }

    #[test]
    fn fiscal_year_and_quarter() {
        assert_eq!(extract_fiscal_year("Planned FY 2026 award").as_deref(), Some("2026"));
        assert_eq!(extract_fiscal_year("FY25 Q3").as_deref(), Some("2025"));
        assert_eq!(extract_fiscal_year("Fiscal Year 2027").as_deref(), Some("2027"));
        assert_eq!(extract_fiscal_year("in 2025"), None);
        assert_eq!(parse_year_cell("2025").as_deref(), Some("2025"));
        assert_eq!(extract_fiscal_quarter("FY25 Q3").as_deref(), Some("Q3"));
        assert_eq!(extract_fiscal_quarter("Quarter 2").as_deref(), Some("Q2"));
        assert_eq!(extract_fiscal_quarter("Q5"), None);
        assert_eq!(parse_quarter_cell(" 4 ").as_deref(), Some("Q4"));
    }

    #[test]
    fn contacts() {
        assert_eq!(extract_email("contact: OPS@agency.gov.").as_deref(), Some("ops@agency.gov"));
        assert_eq!(extract_phone("Phone (202) 555-0142 ext").as_deref(), Some("(202) 555-0142"));
        assert_eq!(extract_phone("202-555-0142").as_deref(), Some("202-555-0142"));
        assert_eq!(extract_phone("due 2025-03-01"), None);
        assert_eq!(
            extract_contact_name("Point of Contact: Jane Q. Doe, Contracting").as_deref(),
            Some("Jane Q. Doe")
        );
        assert_eq!(extract_contact_name("contact: ops@agency.gov"), None);
    }

    #[test]
    fn set_aside_precedence() {
        assert_eq!(extract_set_aside("EDWOSB set-aside").as_deref(), Some("EDWOSB"));
        assert_eq!(extract_set_aside("WOSB Set-Aside").as_deref(), Some("WOSB"));
        assert_eq!(extract_set_aside("8(a) sole source").as_deref(), Some("8(a)"));
        assert_eq!(extract_set_aside("HUBZone").as_deref(), Some("HUBZone"));
        assert_eq!(extract_set_aside("Total Small Business").as_deref(), Some("Total Small Business"));
        assert_eq!(extract_set_aside("SBA program").as_deref(), Some("Small Business"));
        assert_eq!(extract_set_aside("Full and Open").as_deref(), Some("Unrestricted"));
        assert_eq!(extract_set_aside("Freight brokerage"), None);
    }

    #[test]
    fn deadline_prefers_date_after_cue() {
        let text = "Posted 01/02/2025, responses due 2025-03-01";
        assert_eq!(extract_deadline(text), NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(extract_deadline("closes 3/7/2025"), NaiveDate::from_ymd_opt(2025, 3, 7));
        assert_eq!(extract_deadline("posted 2025-01-05"), NaiveDate::from_ymd_opt(2025, 1, 5));
        assert_eq!(extract_deadline("due 2025-13-40"), None);
    }

    #[test]
    fn header_rows_are_boilerplate() {
        assert!(is_header_boilerplate("Title | Description | NAICS | Estimated Value | FY"));
        assert!(!is_header_boilerplate("Transportation Services for Medical Equipment | HHS | $2,500,000"));
        assert!(!is_header_boilerplate("Freight brokerage support services"));
    }

    #[test]
    fn title_plausibility() {
        assert!(is_plausible_title("Fleet maintenance contract"));
        assert!(!is_plausible_title("TBD"));
        assert!(!is_plausible_title("1234567890123"));
        assert!(!is_plausible_title(&"x".repeat(MAX_TITLE_LEN + 1)));
    }

    #[test]
    fn enrich_fills_only_missing_fields() {
        let mut opp = Opportunity::new(
            "Freight brokerage support services",
            "DOT",
            "https://example.gov",
            chrono::Utc::now(),
            "test/1",
        );
        opp.estimated_value = Some(1.0);
        enrich_from_text(
            &mut opp,
            "Sources Sought | NAICS 488510 | $450,000 | WOSB | FY26 Q2 | ops@agency.gov | Office: Detroit, MI",
        );
        assert_eq!(opp.estimated_value, Some(1.0));
        assert_eq!(opp.naics_code.as_deref(), Some("488510"));
        assert_eq!(opp.set_aside.as_deref(), Some("WOSB"));
        assert_eq!(opp.fiscal_year.as_deref(), Some("2026"));
        assert_eq!(opp.fiscal_quarter.as_deref(), Some("Q2"));
        assert_eq!(opp.contact_email.as_deref(), Some("ops@agency.gov"));
        assert_eq!(opp.location.as_deref(), Some("Detroit, MI"));
        assert_eq!(opp.notice_type, Some(NoticeType::SourcesSought));
    }

    #[test]
    fn keyword_tags() {
        assert_eq!(
            matching_keywords("Heavy Haul freight for medical equipment"),
            vec!["freight", "equipment", "medical", "heavy haul"]
        );
        assert!(is_transport_related("Fleet maintenance contract"));
        assert!(!is_transport_related("Janitorial services"));
    }
}
