use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;
use uuid::Uuid;

use super::dto::{ErrorDto, ValidationFailureDto};
use crate::{
    sensors::{validator::ValidationErrors, ServiceError},
    store::StoreError,
};

/// Every way a handler can fail, mapped onto a status code and JSON body.
#[derive(Debug)]
pub enum AppError {
    /// 400 with the full violation list.
    Validation(ValidationErrors),
    /// 400 with a single message.
    BadRequest(String),
    /// 503. The cause is logged under a fresh request id, never returned.
    Unavailable(StoreError),
    /// 500, logged the same way. Raised for handler panics.
    Internal(anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(errors) => Self::Validation(errors),
            ServiceError::Range(e) => Self::BadRequest(e.to_string()),
            ServiceError::Store(e) => Self::Unavailable(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(ValidationFailureDto::from(&errors))).into_response()
            }
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorDto { error: message, request_id: None }),
            )
                .into_response(),
            Self::Unavailable(e) => {
                let request_id = Uuid::new_v4().to_string();
                error!(request_id = %request_id, error = %e, "Storage unavailable");
                server_fault(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage is temporarily unavailable",
                    request_id,
                )
            }
            Self::Internal(e) => {
                let request_id = Uuid::new_v4().to_string();
                error!(request_id = %request_id, error = ?e, "Unhandled error");
                server_fault(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred",
                    request_id,
                )
            }
        }
    }
}

/// Response for a panicking handler, installed through `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "non-string panic payload".to_owned()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

fn server_fault(status: StatusCode, message: &str, request_id: String) -> Response {
    let body = ErrorDto {
        error: message.to_owned(),
        request_id: Some(request_id),
    };
    (status, Json(body)).into_response()
}
