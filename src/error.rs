use crate::models::candidate::DocumentKey;
use crate::store::{BlobError, StoreError};
use crate::utils::validation::{FieldErrors, FileRejection};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid submission: {0:?}")]
    InvalidForm(FieldErrors),

    #[error("{key} rejected: {reason}")]
    InvalidDocument {
        key: DocumentKey,
        reason: FileRejection,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Upload failed: {0}")]
    Upload(#[from] BlobError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Upload,
    Persistence,
    Auth,
    Conflict,
    NotFound,
    RateLimited,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_)
            | Error::InvalidForm(_)
            | Error::InvalidDocument { .. }
            | Error::Validation(_)
            | Error::Json(_)
            | Error::Multipart(_) => ErrorKind::Validation,
            Error::Unauthorized(_) | Error::InvalidCredentials => ErrorKind::Auth,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::RateLimited => ErrorKind::RateLimited,
            Error::Upload(BlobError::Unauthorized(_)) => ErrorKind::Auth,
            Error::Upload(_) => ErrorKind::Upload,
            Error::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            Error::Store(StoreError::Conflict { .. }) | Error::Store(StoreError::AlreadyExists { .. }) => {
                ErrorKind::Conflict
            }
            Error::Store(StoreError::PermissionDenied(_)) => ErrorKind::Auth,
            Error::Store(_) | Error::Database(_) => ErrorKind::Persistence,
            Error::Config(_) | Error::Internal(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Stable error code; storage and database codes feed the message table.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Upload(e) => e.code(),
            Error::Store(e) => e.code(),
            Error::Database(_) => "db/internal",
            Error::Unauthorized(_) => "auth/unauthorized",
            Error::InvalidCredentials => "auth/invalid-credentials",
            Error::InvalidForm(_) | Error::InvalidDocument { .. } | Error::Validation(_) => {
                "validation/invalid"
            }
            Error::BadRequest(_) | Error::Json(_) | Error::Multipart(_) => "request/invalid",
            Error::NotFound(_) => "request/not-found",
            Error::Conflict(_) => "db/conflict",
            Error::RateLimited => "request/rate-limited",
            Error::Config(_) | Error::Internal(_) | Error::Io(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Upload(e) => e.is_retryable(),
            Error::Store(e) => e.is_retryable(),
            Error::RateLimited => true,
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// Human-readable text for notifications.
    pub fn user_message(&self) -> String {
        if let Some(message) = message_for_code(self.code()) {
            return message.to_string();
        }
        match self {
            Error::InvalidForm(fields) => fields
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| "Please review the highlighted fields".to_string()),
            Error::InvalidDocument { key, reason } => format!("{}: {}", key.label(), reason),
            Error::BadRequest(msg) | Error::NotFound(msg) | Error::Conflict(msg) => msg.clone(),
            Error::Validation(err) => err.to_string(),
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

fn message_for_code(code: &str) -> Option<&'static str> {
    let message = match code {
        "auth/unauthorized" => "Your session has expired. Please sign in again.",
        "auth/invalid-credentials" => "Incorrect password.",
        "storage/unauthorized" => "You do not have permission to store this file.",
        "storage/quota-exceeded" => "Storage quota exceeded. Please contact support.",
        "storage/canceled" => "The upload was cancelled.",
        "storage/object-not-found" => "The requested file no longer exists.",
        "storage/retry-limit-exceeded" => "File storage is unreachable. Check your connection and try again.",
        "storage/invalid-argument" => "The file name is not valid.",
        "storage/unknown" => "The file could not be stored.",
        "db/permission-denied" => "You do not have permission to perform this action.",
        "db/unavailable" => "The service is temporarily unavailable. Please try again.",
        "db/not-found" => "The candidate no longer exists.",
        "db/already-exists" => "This candidate has already been submitted.",
        "db/conflict" => "This candidate was changed by someone else. Reload and try again.",
        "db/data-loss" | "db/internal" => "The record could not be saved.",
        "request/rate-limited" => "Too many requests. Please wait a moment.",
        _ => return None,
    };
    Some(message)
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => match &self {
                Error::Unauthorized(_) | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
                _ => StatusCode::FORBIDDEN,
            },
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upload => StatusCode::BAD_GATEWAY,
            ErrorKind::Persistence => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let mut body = json!({
            "error": self.user_message(),
            "code": self.code(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        });
        match &self {
            Error::InvalidForm(fields) => body["fields"] = json!(fields),
            Error::InvalidDocument { key, reason } => {
                let mut fields = serde_json::Map::new();
                fields.insert(key.as_str().to_string(), json!(reason.to_string()));
                body["fields"] = serde_json::Value::Object(fields);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Error::Conflict(err.to_string()),
            other => Error::Store(other),
        }
    }
}
