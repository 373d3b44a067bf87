//! The fixed shape of a bulk upload:
//!
//! ```xml
//! <SensorDataCollection>
//!   <SensorData>                      <!-- zero or more -->
//!     <SensorId>3</SensorId>          <!-- int, exactly once -->
//!     <Value>42.17</Value>            <!-- decimal, exactly once -->
//!     <Timestamp>2025-01-02T03:04:05Z</Timestamp> <!-- dateTime, exactly once -->
//!   </SensorData>
//! </SensorDataCollection>
//! ```
//!
//! Field order inside a record is not enforced.

use chrono::{DateTime, NaiveDateTime};

pub const COLLECTION: &str = "SensorDataCollection";
pub const RECORD: &str = "SensorData";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Decimal,
    DateTime,
}

impl FieldKind {
    /// XML Schema name of the datatype, used in error messages.
    pub fn type_name(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Decimal => "decimal",
            FieldKind::DateTime => "dateTime",
        }
    }

    /// Whether `raw` is a lexically valid value of this type. Surrounding
    /// whitespace is collapsed first.
    pub fn accepts(self, raw: &str) -> bool {
        let s = raw.trim_matches(is_xml_whitespace);
        match self {
            FieldKind::Int => s.parse::<i32>().is_ok(),
            FieldKind::Decimal => is_decimal(s),
            FieldKind::DateTime => is_date_time(s),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Required children of every record, each exactly once.
pub const RECORD_FIELDS: [FieldRule; 3] = [
    FieldRule { name: "SensorId", kind: FieldKind::Int },
    FieldRule { name: "Value", kind: FieldKind::Decimal },
    FieldRule { name: "Timestamp", kind: FieldKind::DateTime },
];

pub fn field_index(name: &str) -> Option<usize> {
    RECORD_FIELDS.iter().position(|f| f.name == name)
}

pub fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// `[+-]? digits ('.' digits?)? | [+-]? '.' digits`
fn is_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    !(int_part.is_empty() && frac_part.is_empty()) && all_digits(int_part) && all_digits(frac_part)
}

/// `YYYY-MM-DDThh:mm:ss[.fff][Z|(+|-)hh:mm]`
fn is_date_time(s: &str) -> bool {
    if s.as_bytes().get(10) != Some(&b'T') {
        return false;
    }
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}
