use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::availability::PeriodOverlap;
use crate::lookup::AppointmentStatusCode;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.as_str()),
            AppError::Internal(_) | AppError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::ExternalService(_) => (StatusCode::BAD_GATEWAY, "Upstream service unavailable"),
        };

        tracing::error!("Error: {}: {}", status, self);

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Failures raised by a persistence backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unique constraint violated on {table}: {key}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("Row {id} missing from {table}")]
    MissingRow { table: &'static str, id: String },
}

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Validation failed for [{}]: {message}", fields.join(", "))]
    Validation { fields: Vec<String>, message: String },

    #[error("Overlapping periods at indices {overlaps:?}")]
    OverlappingPeriods { overlaps: Vec<PeriodOverlap> },

    #[error("Unknown appointment type: {0}")]
    UnknownAppointmentType(i64),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Unknown cancel/reschedule reason: {0}")]
    UnknownReason(i64),

    #[error("Invalid status transition from {from} to {to}")]
    IllegalTransition {
        from: AppointmentStatusCode,
        to: AppointmentStatusCode,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Dependency failure: {0}")]
    Dependency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulingError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        SchedulingError::Validation {
            fields: vec![field.to_string()],
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SchedulingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        SchedulingError::Conflict {
            message: message.into(),
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Validation { .. }
            | SchedulingError::OverlappingPeriods { .. }
            | SchedulingError::UnknownAppointmentType(_) => AppError::ValidationError(err.to_string()),
            SchedulingError::NotFound { .. } | SchedulingError::UnknownReason(_) => {
                AppError::NotFound(err.to_string())
            }
            SchedulingError::IllegalTransition { .. } | SchedulingError::Conflict { .. } => {
                AppError::Conflict(err.to_string())
            }
            SchedulingError::Dependency(msg) => AppError::ExternalService(msg),
            SchedulingError::Store(store) => AppError::Database(store.to_string()),
        }
    }
}
