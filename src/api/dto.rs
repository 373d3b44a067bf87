use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::{NewReading, StoredReading},
    sensors::{
        service::{HealthReport, HealthStatus},
        validator::ValidationErrors,
    },
    upload::StructureReport,
};

/// Reported as `service` by the health endpoint.
pub const SERVICE_NAME: &str = "Sensor Processor API";

/// Request body for `POST /api/sensor/data`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewReadingRequest {
    /// Sensor identifier, 1 to 10.
    pub sensor_id: i32,
    /// Reading value, 0 to 100.
    pub value: f64,
    /// When the reading was taken (RFC3339). Not in the future, at most one year old.
    pub timestamp: DateTime<Utc>,
}

impl From<NewReadingRequest> for NewReading {
    fn from(r: NewReadingRequest) -> Self {
        Self {
            sensor_id: r.sensor_id,
            value: r.value,
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadingDto {
    pub id: i64,
    pub sensor_id: i32,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredReading> for SensorReadingDto {
    fn from(r: StoredReading) -> Self {
        Self {
            id: r.id,
            sensor_id: r.sensor_id,
            value: r.value,
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ViolationDto {
    /// Offending field, as named in the request body.
    pub field: String,
    pub message: String,
}

/// Body of a `400` returned for a rejected reading.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationFailureDto {
    pub error: String,
    pub violations: Vec<ViolationDto>,
}

impl From<&ValidationErrors> for ValidationFailureDto {
    fn from(errors: &ValidationErrors) -> Self {
        Self {
            error: "Validation failed".to_owned(),
            violations: errors
                .iter()
                .map(|e| ViolationDto {
                    field: e.field().as_str().to_owned(),
                    message: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Outcome of `POST /api/sensor/upload-xml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct XmlUploadResponseDto {
    pub is_valid: bool,
    pub message: String,
    /// `"<Severity>: <message> (Line: l, Position: p)"` per entry.
    pub errors: Vec<String>,
}

impl From<StructureReport> for XmlUploadResponseDto {
    fn from(report: StructureReport) -> Self {
        let message = if report.is_valid {
            "XML uploaded and validated successfully"
        } else {
            "XML validation failed"
        };
        Self {
            is_valid: report.is_valid,
            message: message.to_owned(),
            errors: report.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: HealthStatus,
    pub can_connect: bool,
    pub record_count: i64,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
}

impl From<HealthReport> for HealthDto {
    fn from(r: HealthReport) -> Self {
        Self {
            status: r.status,
            can_connect: r.can_connect,
            record_count: r.record_count,
            timestamp: r.checked_at,
            service: SERVICE_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Body of every other `4xx`/`5xx` response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDto {
    pub error: String,
    /// Correlates the response with server logs. Only set on server faults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
