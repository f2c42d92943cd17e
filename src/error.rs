use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::result::DatabaseErrorKind;
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::storage::StorageError;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("{detail}")]
    Storage {
        detail: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Database error")]
    Database(#[source] DbError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub fn storage(detail: &'static str, source: StorageError) -> Self {
        ApiError::Storage { detail, source }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Query(diesel::result::Error::NotFound) => {
                ApiError::NotFound("Not found.".to_string())
            }
            DbError::Query(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                info,
            )) => ApiError::Conflict(info.message().to_string()),
            DbError::Query(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                info,
            )) => ApiError::BadRequest(info.message().to_string()),
            DbError::Query(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::CheckViolation,
                info,
            )) => ApiError::BadRequest(info.message().to_string()),
            other => ApiError::Database(other),
        }
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        DbError::Query(err).into()
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("Multipart form parse error: {err}"))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage { .. } | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation { field, message } => json!({ field.as_str(): [message] }),
            ApiError::Storage { detail, source } => {
                log::error!("{detail}: {source}");
                json!({ "detail": detail, "error": source.to_string() })
            }
            ApiError::Database(err) => {
                log::error!("Database error: {err}");
                json!({ "detail": self.to_string() })
            }
            ApiError::Internal(msg) => {
                log::error!("Internal error: {msg}");
                json!({ "detail": "Internal server error" })
            }
            _ => json!({ "detail": self.to_string() }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
