//! Structural validation of bulk XML uploads.
//!
//! [`validate_structure`] checks element names, cardinalities and datatypes
//! against the fixed layout in [`schema`]. It never fails: malformed input
//! becomes a single parsing entry in the report. Reading values are not
//! range-checked here.

mod document;
pub mod position;
pub mod schema;

use std::fmt;

use self::{document::Walker, position::LineIndex};
pub use self::position::Position;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        })
    }
}

/// Whether an entry comes from the markup parser or from the schema rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Schema,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralError {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
}

impl StructuralError {
    fn parse(message: String, at: Position) -> Self {
        Self { severity: Severity::Error, kind: ErrorKind::Parse, message, position: Some(at) }
    }

    fn schema(severity: Severity, message: String, at: Position) -> Self {
        Self { severity, kind: ErrorKind::Schema, message, position: Some(at) }
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Parse => write!(f, "XML parsing error: {}", self.message)?,
            ErrorKind::Schema => write!(f, "{}: {}", self.severity, self.message)?,
        }
        if let Some(at) = self.position {
            write!(f, " ({at})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureReport {
    /// `true` when no entry has [`Severity::Error`].
    pub is_valid: bool,
    pub errors: Vec<StructuralError>,
}

/// Validate the structure of an uploaded document.
///
/// Errors accumulate across the whole document; only a well-formedness
/// failure stops the scan, and it is reported as the last entry.
pub fn validate_structure(document: &[u8]) -> StructureReport {
    let document = document.strip_prefix(UTF8_BOM).unwrap_or(document);

    let errors = match std::str::from_utf8(document) {
        Ok(text) => Walker::new(text).run(),
        Err(e) => {
            let prefix = String::from_utf8_lossy(&document[..e.valid_up_to()]);
            let at = LineIndex::new(&prefix).locate(prefix.len());
            vec![StructuralError::parse(
                "Invalid byte sequence for UTF-8 encoding".to_owned(),
                at,
            )]
        }
    };

    let is_valid = !errors.iter().any(|e| e.severity == Severity::Error);
    StructureReport { is_valid, errors }
}
