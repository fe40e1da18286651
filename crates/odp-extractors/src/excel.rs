use std::io::Cursor;
use std::sync::LazyLock;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use odp_core::{DocumentFormat, Opportunity};
use regex::Regex;
use tracing::debug;

use crate::fields::{
    enrich_from_text, extract_deadline, extract_email, extract_location, extract_naics, extract_set_aside, is_plausible_title,
    parse_amount_cell, parse_quarter_cell, parse_year_cell, text_or_none,
};
use crate::{DocumentExtractor, ExtractError, SourceDocument};

pub const EXTRACTOR_NAME: &str = "excel-sheet/1";

fn header_regex(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).unwrap()
}

static RE_HEADER_ROW: LazyLock<Regex> = LazyLock::new(|| header_regex(r"title|description|requirement|opportunity"));
static RE_COL_TITLE: LazyLock<Regex> = LazyLock::new(|| header_regex(r"title|requirement|opportunity|project"));
static RE_COL_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| header_regex(r"description|summary|scope"));
static RE_COL_NAICS: LazyLock<Regex> = LazyLock::new(|| header_regex(r"naics"));
static RE_COL_VALUE: LazyLock<Regex> = LazyLock::new(|| header_regex(r"value|amount|cost|dollar|\$"));
static RE_COL_QUARTER: LazyLock<Regex> = LazyLock::new(|| header_regex(r"quarter|qtr"));
static RE_COL_YEAR: LazyLock<Regex> = LazyLock::new(|| header_regex(r"fiscal|\bfy\b|year"));
static RE_COL_CONTACT: LazyLock<Regex> = LazyLock::new(|| header_regex(r"e-?mail|contact|\bpoc\b"));
static RE_COL_SET_ASIDE: LazyLock<Regex> = LazyLock::new(|| header_regex(r"set[\s-]?aside|socio|competition"));
static RE_COL_LOCATION: LazyLock<Regex> = LazyLock::new(|| header_regex(r"office|location|place"));
static RE_COL_DEADLINE: LazyLock<Regex> = LazyLock::new(|| header_regex(r"deadline|\bdue\b|\bresponses?\b|closing"));
static RE_COL_DATE: LazyLock<Regex> = LazyLock::new(|| header_regex(r"\bdate\b"));
static RE_COL_NOT_DEADLINE: LazyLock<Regex> = LazyLock::new(|| header_regex(r"award|posted|publish|start|updated"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelExtractor;

/// Column positions resolved from a header row; `None` means "not in this sheet".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub title: Option<usize>,
    pub description: Option<usize>,
    pub naics: Option<usize>,
    pub value: Option<usize>,
    pub fiscal_year: Option<usize>,
    pub fiscal_quarter: Option<usize>,
    pub contact: Option<usize>,
    pub set_aside: Option<usize>,
    pub location: Option<usize>,
    pub deadline: Option<usize>,
}

fn locate(headers: &[String], include: &Regex, exclude: Option<&Regex>) -> Option<usize> {
    headers
        .iter()
        .position(|h| include.is_match(h) && !exclude.is_some_and(|ex| ex.is_match(h)))
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Self {
        let title = locate(headers, &RE_COL_TITLE, None);
        let description = locate(headers, &RE_COL_DESCRIPTION, None).filter(|i| Some(*i) != title);
        Self {
            title: title.or(description),
            description,
            naics: locate(headers, &RE_COL_NAICS, None),
            value: locate(headers, &RE_COL_VALUE, None),
            fiscal_year: locate(headers, &RE_COL_YEAR, Some(&RE_COL_QUARTER)),
            fiscal_quarter: locate(headers, &RE_COL_QUARTER, None),
            contact: locate(headers, &RE_COL_CONTACT, None),
            set_aside: locate(headers, &RE_COL_SET_ASIDE, None),
            location: locate(headers, &RE_COL_LOCATION, None),
            deadline: locate(headers, &RE_COL_DEADLINE, Some(&RE_COL_NOT_DEADLINE))
                .or_else(|| locate(headers, &RE_COL_DATE, Some(&RE_COL_NOT_DEADLINE))),
        }
    }
}

/// Render a cell the way a person reads it; whole floats lose their `.0`
/// and date cells become `YYYY-MM-DD`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            Some(at) => at.date().format("%Y-%m-%d").to_string(),
            None => dt.to_string(),
        },
        Data::DateTimeIso(iso) => iso.split('T').next().unwrap_or(iso).trim().to_string(),
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter().position(|row| row.iter().any(|cell| RE_HEADER_ROW.is_match(cell)))
}

fn cell<'r>(row: &'r [String], idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| row.get(i)).map(String::as_str).filter(|s| !s.trim().is_empty())
}

fn row_to_opportunity(row: &[String], columns: &ColumnMap, doc: &SourceDocument<'_>) -> Option<Opportunity> {
    let title = cell(row, columns.title).and_then(text_or_none)?;
    if !is_plausible_title(&title) {
        return None;
    }
    let mut opp = doc.opportunity(&title, EXTRACTOR_NAME);
    opp.description = cell(row, columns.description).and_then(text_or_none);
    opp.naics_code = cell(row, columns.naics).and_then(extract_naics);
    opp.estimated_value = cell(row, columns.value).and_then(parse_amount_cell);
    opp.fiscal_year = cell(row, columns.fiscal_year).and_then(parse_year_cell);
    opp.fiscal_quarter = cell(row, columns.fiscal_quarter).and_then(parse_quarter_cell);
    opp.contact_email = cell(row, columns.contact).and_then(extract_email);
    opp.set_aside = cell(row, columns.set_aside).and_then(|c| extract_set_aside(c).or_else(|| text_or_none(c)));
    opp.location = cell(row, columns.location).and_then(|c| extract_location(c).or_else(|| text_or_none(c)));
    opp.response_deadline = cell(row, columns.deadline).and_then(extract_deadline);

    let joined = row
        .iter()
        .filter(|c| !c.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" | ");
    enrich_from_text(&mut opp, &joined);
    Some(opp)
}

/// Records from one sheet already rendered to strings.
pub fn extract_from_grid(rows: &[Vec<String>], doc: &SourceDocument<'_>) -> Vec<Opportunity> {
    let Some(header_idx) = find_header_row(rows) else {
        return Vec::new();
    };
    let columns = ColumnMap::from_headers(&rows[header_idx]);
    rows[header_idx + 1..]
        .iter()
        .filter_map(|row| row_to_opportunity(row, &columns, doc))
        .collect()
}

impl DocumentExtractor for ExcelExtractor {
    fn name(&self) -> &'static str {
        EXTRACTOR_NAME
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Excel
    }

    fn extract(&self, doc: &SourceDocument<'_>) -> Result<Vec<Opportunity>, ExtractError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(doc.body))?;
        let mut out = Vec::new();
        for sheet in workbook.sheet_names() {
            let range = workbook.worksheet_range(&sheet)?;
            let grid = range
                .rows()
                .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
                .collect::<Vec<_>>();
            let records = extract_from_grid(&grid, doc);
            debug!(sheet = %sheet, rows = grid.len(), records = records.len(), "scanned worksheet");
            out.extend(records);
        }
        Ok(out)
    }
}
