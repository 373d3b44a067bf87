use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Months, Utc};
use thiserror::Error;

use crate::db::models::NewReading;

pub const SENSOR_ID_RANGE: (i32, i32) = (1, 10);
pub const VALUE_RANGE: (f64, f64) = (0.0, 100.0);
/// Readings older than this many months before ingestion are rejected.
pub const MAX_READING_AGE_MONTHS: u32 = 12;

/// Fields of an incoming reading, named as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    SensorId,
    Value,
    Timestamp,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::SensorId => "sensorId",
            Field::Value => "value",
            Field::Timestamp => "timestamp",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Field::SensorId => "Sensor ID",
            Field::Value => "Value",
            Field::Timestamp => "Timestamp",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{} must be between {min} and {max}", .field.label())]
    OutOfRange { field: Field, min: f64, max: f64 },
    #[error("Timestamp cannot be in the future")]
    FutureTimestamp,
    #[error("Timestamp cannot be older than 1 year")]
    StaleTimestamp,
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::OutOfRange { field, .. } => *field,
            ValidationError::FutureTimestamp | ValidationError::StaleTimestamp => Field::Timestamp,
        }
    }
}

/// Every violation found on one reading, grouped by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    by_field: BTreeMap<Field, Vec<ValidationError>>,
}

impl ValidationErrors {
    fn add(&mut self, error: ValidationError) {
        self.by_field.entry(error.field()).or_default().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_field.values().map(Vec::len).sum()
    }

    pub fn get(&self, field: Field) -> &[ValidationError] {
        self.by_field.get(&field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Violations in field order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.by_field.values().flatten()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {e}", e.field())?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check a reading against the ingestion rules as of `now`.
///
/// All rules are evaluated; the error carries every violation found.
pub fn validate(reading: &NewReading, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let (min_id, max_id) = SENSOR_ID_RANGE;
    if !(min_id..=max_id).contains(&reading.sensor_id) {
        errors.add(ValidationError::OutOfRange {
            field: Field::SensorId,
            min: min_id.into(),
            max: max_id.into(),
        });
    }

    let (min_value, max_value) = VALUE_RANGE;
    // NaN fails the range check as well
    if !(min_value..=max_value).contains(&reading.value) {
        errors.add(ValidationError::OutOfRange {
            field: Field::Value,
            min: min_value,
            max: max_value,
        });
    }

    if reading.timestamp > now {
        errors.add(ValidationError::FutureTimestamp);
    }

    let oldest = now
        .checked_sub_months(Months::new(MAX_READING_AGE_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    if reading.timestamp < oldest {
        errors.add(ValidationError::StaleTimestamp);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
