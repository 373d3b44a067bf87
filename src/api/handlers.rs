use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use utoipa::{IntoParams, OpenApi};

use super::{
    dto::{
        ErrorDto, HealthDto, NewReadingRequest, SensorReadingDto, ValidationFailureDto,
        ViolationDto, XmlUploadResponseDto,
    },
    errors::AppError,
    AppState,
};
use crate::{db::models::SensorSummary, sensors::service::HealthStatus};

/// Multipart field that carries the uploaded document.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimeRangeParams {
    /// Start of the window (RFC3339, inclusive)
    pub start: DateTime<Utc>,
    /// End of the window (RFC3339, inclusive)
    pub end: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Validate and store one reading. Every violated rule is reported.
#[utoipa::path(
    post,
    path = "/api/sensor/data",
    request_body = NewReadingRequest,
    responses(
        (status = 200, description = "Reading stored", body = SensorReadingDto),
        (status = 400, description = "Reading rejected", body = ValidationFailureDto),
        (status = 503, description = "Storage unavailable", body = ErrorDto),
    ),
    tag = "sensors"
)]
pub async fn add_reading(
    State(state): State<AppState>,
    body: Result<Json<NewReadingRequest>, JsonRejection>,
) -> Result<Json<SensorReadingDto>, AppError> {
    let Json(request) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let created = state.service.add_reading(request.into()).await?;
    Ok(Json(created.into()))
}

/// Readings in `[start, end]` ordered by timestamp. The window may not
/// exceed 30 days.
#[utoipa::path(
    get,
    path = "/api/sensor/data",
    params(TimeRangeParams),
    responses(
        (status = 200, description = "Readings in the window", body = Vec<SensorReadingDto>),
        (status = 400, description = "Invalid window", body = ErrorDto),
        (status = 503, description = "Storage unavailable", body = ErrorDto),
    ),
    tag = "sensors"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    query: Result<Query<TimeRangeParams>, QueryRejection>,
) -> Result<Json<Vec<SensorReadingDto>>, AppError> {
    let Query(range) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
    let rows = state.service.readings(range.start, range.end).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Average, max and min per sensor over `[start, end]`, rounded to two
/// decimals. Sensors without readings in the window are omitted.
#[utoipa::path(
    get,
    path = "/api/sensor/sensors/summary",
    params(TimeRangeParams),
    responses(
        (status = 200, description = "Per-sensor statistics", body = Vec<SensorSummary>),
        (status = 400, description = "Invalid window", body = ErrorDto),
        (status = 503, description = "Storage unavailable", body = ErrorDto),
    ),
    tag = "sensors"
)]
pub async fn get_summary(
    State(state): State<AppState>,
    query: Result<Query<TimeRangeParams>, QueryRejection>,
) -> Result<Json<Vec<SensorSummary>>, AppError> {
    let Query(range) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
    let summary = state.service.summary(range.start, range.end).await?;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Bulk upload
// ---------------------------------------------------------------------------

/// Check an XML document against the sensor data schema. Records are
/// validated structurally only and are not stored.
#[utoipa::path(
    post,
    path = "/api/sensor/upload-xml",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Form with a single `file` part holding the XML document"
    ),
    responses(
        (status = 200, description = "Document is structurally valid", body = XmlUploadResponseDto),
        (status = 400, description = "Upload rejected or document invalid", body = XmlUploadResponseDto),
    ),
    tag = "sensors"
)]
pub async fn upload_xml(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<XmlUploadResponseDto>), AppError> {
    let Ok(multipart) = multipart else {
        return Err(AppError::bad_request("No file uploaded"));
    };
    let upload = read_upload(multipart, state.max_upload_bytes).await?;

    let Some(upload) = upload.filter(|u| !u.bytes.is_empty()) else {
        return Err(AppError::bad_request("No file uploaded"));
    };
    if !upload.looks_like_xml() {
        return Err(AppError::bad_request("File must be XML format"));
    }
    if upload.truncated {
        return Err(AppError::bad_request(format!(
            "File size cannot exceed {}",
            describe_size(state.max_upload_bytes)
        )));
    }

    debug!(file_name = ?upload.file_name, bytes = upload.bytes.len(), "XML upload received");
    let report = XmlUploadResponseDto::from(state.service.process_upload(&upload.bytes));
    let status = if report.is_valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(report)))
}

struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
    /// More than the allowed number of bytes were sent; `bytes` holds a prefix.
    truncated: bool,
}

impl Upload {
    fn looks_like_xml(&self) -> bool {
        let by_type = self.content_type.as_deref().is_some_and(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
            essence == "application/xml" || essence == "text/xml" || essence.ends_with("+xml")
        });
        let by_name = self
            .file_name
            .as_deref()
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(".xml"));
        by_type || by_name
    }
}

/// Pull the `file` part out of the form, buffering at most `limit` bytes.
async fn read_upload(mut multipart: Multipart, limit: usize) -> Result<Option<Upload>, AppError> {
    let malformed = |e: axum::extract::multipart::MultipartError| AppError::bad_request(e.body_text());

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let mut upload = Upload {
            file_name: field.file_name().map(str::to_owned),
            content_type: field.content_type().map(str::to_owned),
            bytes: Vec::new(),
            truncated: false,
        };
        while let Some(chunk) = field.chunk().await.map_err(malformed)? {
            let room = limit.saturating_sub(upload.bytes.len());
            if chunk.len() > room {
                upload.bytes.extend_from_slice(&chunk[..room]);
                upload.truncated = true;
                break;
            }
            upload.bytes.extend_from_slice(&chunk);
        }
        return Ok(Some(upload));
    }
    Ok(None)
}

fn describe_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Store reachability and record count. Always `200`; check `status`.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health report", body = HealthDto),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthDto> {
    Json(state.service.health().await.into())
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(add_reading, get_readings, get_summary, upload_xml, health),
    components(schemas(
        NewReadingRequest,
        SensorReadingDto,
        SensorSummary,
        ViolationDto,
        ValidationFailureDto,
        XmlUploadResponseDto,
        HealthDto,
        HealthStatus,
        ErrorDto,
    )),
    tags(
        (name = "sensors", description = "Sensor reading endpoints"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Sensor Processor API",
        version = "0.1.0",
        description = "Ingestion, querying and bulk validation of sensor readings"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::{
        multipart::{MultipartForm, Part},
        TestServer,
    };
    use chrono::{Duration, SecondsFormat, SubsecRound, Utc};
    use serde_json::{json, Value};

    use crate::{
        api::{router, AppState},
        sensors::{service::tests::UnavailableStore, SensorService},
        store::{MemoryStore, ReadingStore},
    };

    const VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SensorDataCollection>
  <SensorData>
    <SensorId>1</SensorId>
    <Value>42.5</Value>
    <Timestamp>2025-01-01T12:00:00Z</Timestamp>
  </SensorData>
</SensorDataCollection>"#;

    fn test_server_with(store: Arc<dyn ReadingStore>, max_upload_bytes: usize) -> TestServer {
        let state = AppState {
            service: SensorService::new(store),
            max_upload_bytes,
        };
        TestServer::new(router(state)).unwrap()
    }

    fn test_server() -> (TestServer, MemoryStore) {
        let store = MemoryStore::new();
        (test_server_with(Arc::new(store.clone()), 5 * 1024 * 1024), store)
    }

    fn rfc3339(t: chrono::DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn xml_part(body: &str) -> Part {
        Part::bytes(body.as_bytes().to_vec())
            .file_name("readings.xml")
            .mime_type("application/xml")
    }

    // -----------------------------------------------------------------------
    // POST /api/sensor/data
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn add_reading_returns_stored_reading() {
        let (server, store) = test_server();
        let ts = rfc3339(Utc::now() - Duration::minutes(1));

        let resp = server
            .post("/api/sensor/data")
            .json(&json!({ "sensorId": 3, "value": 21.5, "timestamp": ts }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["id"], 1);
        assert_eq!(body["sensorId"], 3);
        assert_eq!(body["value"], 21.5);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn add_reading_reports_every_violation() {
        let (server, store) = test_server();
        let ts = rfc3339(Utc::now() + Duration::hours(1));

        let resp = server
            .post("/api/sensor/data")
            .json(&json!({ "sensorId": 11, "value": -1, "timestamp": ts }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = resp.json();
        assert_eq!(body["error"], "Validation failed");
        let fields: Vec<&str> = body["violations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["sensorId", "value", "timestamp"]);
        assert_eq!(body["violations"][2]["message"], "Timestamp cannot be in the future");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_reading_keeps_microsecond_precision() {
        let (server, _) = test_server();
        let whole = (Utc::now() - Duration::minutes(1)).trunc_subsecs(0);
        let sent = whole + Duration::nanoseconds(123_456_789);

        let resp = server
            .post("/api/sensor/data")
            .json(&json!({
                "sensorId": 1,
                "value": 5.0,
                "timestamp": sent.to_rfc3339_opts(SecondsFormat::Nanos, true),
            }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        let returned: chrono::DateTime<Utc> = body["timestamp"].as_str().unwrap().parse().unwrap();
        assert_eq!(returned, whole + Duration::microseconds(123_456));
    }

    #[tokio::test]
    async fn add_reading_rejects_malformed_body() {
        let (server, _) = test_server();
        let resp = server
            .post("/api/sensor/data")
            .json(&json!({ "sensorId": "one" }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn add_reading_maps_storage_failure_to_503() {
        let server = test_server_with(Arc::new(UnavailableStore), 1024);
        let resp = server
            .post("/api/sensor/data")
            .json(&json!({ "sensorId": 1, "value": 1.0, "timestamp": rfc3339(Utc::now()) }))
            .await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let body: Value = resp.json();
        assert_eq!(body["error"], "Storage is temporarily unavailable");
        assert_eq!(body["requestId"].as_str().unwrap().len(), 36);
    }

    // -----------------------------------------------------------------------
    // GET /api/sensor/data
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn readings_are_returned_in_timestamp_order() {
        let (server, _) = test_server();
        let now = Utc::now();
        for (minutes, value) in [(5, 1.0), (15, 2.0), (10, 3.0)] {
            server
                .post("/api/sensor/data")
                .json(&json!({
                    "sensorId": 1,
                    "value": value,
                    "timestamp": rfc3339(now - Duration::minutes(minutes)),
                }))
                .await
                .assert_status_ok();
        }

        let resp = server
            .get("/api/sensor/data")
            .add_query_param("start", rfc3339(now - Duration::hours(1)))
            .add_query_param("end", rfc3339(now))
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        let values: Vec<f64> = body.iter().map(|r| r["value"].as_f64().unwrap()).collect();
        assert_eq!(values, [2.0, 3.0, 1.0]);
    }

    #[tokio::test]
    async fn readings_reject_bad_windows() {
        let (server, _) = test_server();
        let now = Utc::now();

        let resp = server
            .get("/api/sensor/data")
            .add_query_param("start", rfc3339(now))
            .add_query_param("end", rfc3339(now - Duration::days(1)))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "Start date must be before end date");

        let resp = server
            .get("/api/sensor/data")
            .add_query_param("start", rfc3339(now - Duration::days(31)))
            .add_query_param("end", rfc3339(now))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "Time range cannot exceed 30 days");

        let resp = server.get("/api/sensor/data").add_query_param("start", "yesterday").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // GET /api/sensor/sensors/summary
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn summary_groups_and_rounds() {
        let (server, _) = test_server();
        let now = Utc::now();
        for (sensor_id, value) in [(2, 10.0), (2, 10.006), (1, 50.0)] {
            server
                .post("/api/sensor/data")
                .json(&json!({
                    "sensorId": sensor_id,
                    "value": value,
                    "timestamp": rfc3339(now - Duration::minutes(1)),
                }))
                .await
                .assert_status_ok();
        }

        let resp = server
            .get("/api/sensor/sensors/summary")
            .add_query_param("start", rfc3339(now - Duration::days(90)))
            .add_query_param("end", rfc3339(now))
            .await;
        resp.assert_status_ok();

        let mut body: Vec<Value> = resp.json();
        body.sort_by_key(|s| s["sensorId"].as_i64());
        assert_eq!(
            body,
            [
                json!({ "sensorId": 1, "average": 50.0, "max": 50.0, "min": 50.0 }),
                json!({ "sensorId": 2, "average": 10.0, "max": 10.01, "min": 10.0 }),
            ]
        );
    }

    #[tokio::test]
    async fn summary_rejects_inverted_window() {
        let (server, _) = test_server();
        let now = rfc3339(Utc::now());
        let resp = server
            .get("/api/sensor/sensors/summary")
            .add_query_param("start", &now)
            .add_query_param("end", &now)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // POST /api/sensor/upload-xml
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upload_accepts_valid_document() {
        let (server, store) = test_server();
        let form = MultipartForm::new().add_part("file", xml_part(VALID_XML));

        let resp = server.post("/api/sensor/upload-xml").multipart(form).await;
        resp.assert_status_ok();
        resp.assert_json(&json!({
            "isValid": true,
            "message": "XML uploaded and validated successfully",
            "errors": [],
        }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upload_reports_structural_errors() {
        let (server, _) = test_server();
        let doc = VALID_XML.replace("<Value>42.5</Value>", "<Value>high</Value>");
        let form = MultipartForm::new().add_part("file", xml_part(&doc));

        let resp = server.post("/api/sensor/upload-xml").multipart(form).await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = resp.json();
        assert_eq!(body["isValid"], false);
        assert_eq!(body["message"], "XML validation failed");
        assert_eq!(
            body["errors"][0],
            "Error: The 'Value' element is invalid - The value 'high' is invalid according \
             to its datatype 'decimal' (Line: 5, Position: 5)"
        );
    }

    #[tokio::test]
    async fn upload_requires_file_part() {
        let (server, _) = test_server();
        let form = MultipartForm::new().add_text("comment", "no file here");

        let resp = server.post("/api/sensor/upload-xml").multipart(form).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "No file uploaded");

        let form = MultipartForm::new().add_part("file", xml_part(""));
        let resp = server.post("/api/sensor/upload-xml").multipart(form).await;
        assert_eq!(resp.json::<Value>()["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn upload_requires_xml_type_or_extension() {
        let (server, _) = test_server();

        let part = Part::bytes(VALID_XML.as_bytes().to_vec())
            .file_name("readings.csv")
            .mime_type("text/csv");
        let resp = server
            .post("/api/sensor/upload-xml")
            .multipart(MultipartForm::new().add_part("file", part))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "File must be XML format");

        let part = Part::bytes(VALID_XML.as_bytes().to_vec())
            .file_name("upload.bin")
            .mime_type("text/xml; charset=utf-8");
        let resp = server
            .post("/api/sensor/upload-xml")
            .multipart(MultipartForm::new().add_part("file", part))
            .await;
        resp.assert_status_ok();
    }

    #[tokio::test]
    async fn upload_enforces_size_limit() {
        let server = test_server_with(Arc::new(MemoryStore::new()), 64);
        let form = MultipartForm::new().add_part("file", xml_part(VALID_XML));

        let resp = server.post("/api/sensor/upload-xml").multipart(form).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "File size cannot exceed 64 bytes");
    }

    #[test]
    fn size_descriptions() {
        assert_eq!(super::describe_size(5 * 1024 * 1024), "5MB");
        assert_eq!(super::describe_size(2048), "2KB");
        assert_eq!(super::describe_size(100), "100 bytes");
    }

    // -----------------------------------------------------------------------
    // GET /health
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_reports_record_count() {
        let (server, _) = test_server();
        server
            .post("/api/sensor/data")
            .json(&json!({ "sensorId": 1, "value": 1.0, "timestamp": rfc3339(Utc::now()) }))
            .await
            .assert_status_ok();

        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "Healthy");
        assert_eq!(body["canConnect"], true);
        assert_eq!(body["recordCount"], 1);
        assert_eq!(body["service"], "Sensor Processor API");
    }

    #[tokio::test]
    async fn health_is_200_even_when_store_is_down() {
        let server = test_server_with(Arc::new(UnavailableStore), 1024);
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "Unhealthy");
        assert_eq!(body["canConnect"], false);
    }

    // -----------------------------------------------------------------------
    // GET /api-docs/openapi.json
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let (server, _) = test_server();
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Sensor Processor API");
        assert!(body["paths"]["/api/sensor/upload-xml"]["post"].is_object());
    }
}
