//! Domain models for the consolidation pipeline.
//!
//! - [`CellValue`] - Scalar content of a spreadsheet cell
//! - [`RawRow`] - One sheet row keyed by header text
//! - [`CanonicalRecord`] - Extracted row keyed by descriptor field name
//! - [`AttendanceRecord`] - Transformed record in the output field set
//! - [`AggregatedRow`] - One consolidated row per aggregation group

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Number of weekly attendance columns carried per record.
pub const WEEKS: usize = 4;

// =============================================================================
// Cell Values
// =============================================================================

/// Non-empty scalar content of a cell.
///
/// Empty cells (absent or zero-length text) are `None` wherever a
/// `CellValue` is optional. Numeric zero is a value, not an empty cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Interpret the raw text the reader returns for a cell.
    pub fn from_raw(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if let Ok(number) = raw.parse::<f64>() {
            if number.is_finite() {
                return Some(Self::Number(number));
            }
        }
        match raw {
            "TRUE" | "true" => Some(Self::Bool(true)),
            "FALSE" | "false" => Some(Self::Bool(false)),
            _ => Some(Self::Text(raw.to_string())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True only for text that equals `expected` exactly.
    pub fn is_text(&self, expected: &str) -> bool {
        self.as_text() == Some(expected)
    }

    /// Day serial (days since 1899-12-30) when the value reads as a date.
    ///
    /// Numbers are taken as serials already; text is tried against the
    /// ISO and day-first formats branches use.
    pub fn date_serial(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_date(s.trim()).map(serial_from_date),
            Self::Bool(_) => None,
        }
    }

    /// Ordering used for "latest value wins".
    ///
    /// A total order: bool < date < text. Numbers and text that parses as a
    /// date share the date rank and compare by serial; other text compares
    /// as strings.
    pub fn cmp_chronological(&self, other: &Self) -> Ordering {
        match (self.chrono_key(), other.chrono_key()) {
            (ChronoKey::Bool(a), ChronoKey::Bool(b)) => a.cmp(&b),
            (ChronoKey::Date(a), ChronoKey::Date(b)) => a.total_cmp(&b),
            (ChronoKey::Text(a), ChronoKey::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn chrono_key(&self) -> ChronoKey<'_> {
        match (self, self.date_serial()) {
            (Self::Bool(b), _) => ChronoKey::Bool(*b),
            (_, Some(serial)) => ChronoKey::Date(serial),
            (Self::Text(s), None) => ChronoKey::Text(s),
            (Self::Number(n), None) => ChronoKey::Date(*n),
        }
    }
}

enum ChronoKey<'a> {
    Bool(bool),
    Date(f64),
    Text(&'a str),
}

impl ChronoKey<'_> {
    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Date(_) => 1,
            Self::Text(_) => 2,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn serial_from_date(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    (date - epoch).num_days() as f64
}

/// Hashable identity of a cell value, used in grouping keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Bool(bool),
    Number(u64),
    Text(String),
}

impl From<&CellValue> for CellKey {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Bool(b) => Self::Bool(*b),
            // -0.0 and 0.0 are the same group
            CellValue::Number(n) => Self::Number((n + 0.0).to_bits()),
            CellValue::Text(s) => Self::Text(s.clone()),
        }
    }
}

// =============================================================================
// Rows and Records
// =============================================================================

/// One data row keyed by the header text of its column.
pub type RawRow = HashMap<String, Option<CellValue>>;

/// A row lifted out of a branch workbook, keyed by descriptor field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    /// Branch name exactly as written in the anchor cell.
    pub branch: String,
    /// 1-based sheet row the record came from.
    pub row: u32,
    /// Field name → cell value, in descriptor order.
    pub fields: IndexMap<String, Option<CellValue>>,
}

impl CanonicalRecord {
    /// `None` when the field is not on the record; `Some(None)` when empty.
    pub fn field(&self, name: &str) -> Option<Option<&CellValue>> {
        self.fields.get(name).map(Option::as_ref)
    }
}

/// A confirmed enrollment in the output field set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub branch: String,
    pub month: CellValue,
    pub class_day: CellValue,
    pub group_id: CellValue,
    pub start_date: Option<CellValue>,
    pub enrollment_type: Option<CellValue>,
    /// Raw weekly markers; shorter than [`WEEKS`] when fewer weeks are mapped.
    pub weekly_markers: Vec<Option<CellValue>>,
}

impl AttendanceRecord {
    /// Marker for week `index` (0-based), `None` when absent or empty.
    pub fn marker(&self, index: usize) -> Option<&CellValue> {
        self.weekly_markers.get(index).and_then(Option::as_ref)
    }
}

// =============================================================================
// Aggregated Output
// =============================================================================

/// One consolidated row per (branch, month, class day, group).
///
/// Field order matches the column order of the output workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRow {
    pub branch: String,
    pub month: CellValue,
    pub class_day: CellValue,
    /// Latest start date seen in the group.
    pub start_date: Option<CellValue>,
    pub group_id: CellValue,
    /// First enrollment type seen in the group.
    pub enrollment_type: Option<CellValue>,
    pub week1_count: u32,
    pub week2_count: u32,
    pub week3_count: u32,
    pub week4_count: u32,
}

impl AggregatedRow {
    pub fn week_counts(&self) -> [u32; WEEKS] {
        [
            self.week1_count,
            self.week2_count,
            self.week3_count,
            self.week4_count,
        ]
    }
}

// =============================================================================
// Tests
// =============================================================================
