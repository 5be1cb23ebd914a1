//! Permissive date parsing for metadata cells.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Output format for parsed dates (`2015/01/31`).
pub const DATE_FORMAT: &str = "%Y/%m/%d";

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Formats with no day; the first of the month is assumed.
const MONTH_FORMATS: &[&str] = &["%Y-%m", "%Y/%m", "%B %Y", "%b %Y"];

/// Result of normalizing one date cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateCell {
    /// Blank or `none`: stored as an empty value so updates remove it.
    Blank,
    /// A bare four digit year, kept verbatim.
    Year(String),
    Date(NaiveDate),
    /// Nothing recognizable; the field is dropped.
    Unparseable,
}

impl DateCell {
    /// Stored text form, `None` for unparseable input.
    pub fn stored(&self) -> Option<String> {
        match self {
            DateCell::Blank => Some(String::new()),
            DateCell::Year(y) => Some(y.clone()),
            DateCell::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            DateCell::Unparseable => None,
        }
    }
}

fn is_bare_year(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}

pub fn parse_date_cell(raw: &str) -> DateCell {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
        return DateCell::Blank;
    }
    if is_bare_year(s) {
        return DateCell::Year(s.to_string());
    }
    parse_date(s).map_or(DateCell::Unparseable, DateCell::Date)
}

/// Parse a date in any supported layout.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(d) = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    {
        return Some(d);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Some(dt.date());
    }
    MONTH_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(&format!("{s} 01"), &format!("{f} %d")).ok())
}

/// Read back a stored date (year-only values mean January 1st).
pub fn stored_to_date(stored: &str) -> Option<NaiveDate> {
    let s = stored.trim();
    if is_bare_year(s) {
        return s.parse().ok().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1));
    }
    parse_date(s)
}
