use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use careflow_core::error::CoreError;
use careflow_db::DbError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `careflow_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A repository error that may carry either a domain rule or a store
    /// failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// Status, machine-readable code, message and optional violation list.
type ErrorParts = (StatusCode, &'static str, String, Option<Vec<String>>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Db(err) => match err.into_core() {
                Ok(core) => classify_core_error(core),
                Err(sqlx_err) => classify_sqlx_error(&sqlx_err),
            },
            AppError::Database(err) => classify_sqlx_error(&err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> ErrorParts {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
        None,
    )
}

fn classify_core_error(core: CoreError) -> ErrorParts {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
            None,
        ),
        CoreError::Validation(violations) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Validation failed".to_string(),
            Some(violations),
        ),
        CoreError::InvalidState(msg) => (StatusCode::CONFLICT, "INVALID_STATE", msg, None),
        CoreError::InvalidTrigger(msg) => {
            (StatusCode::BAD_REQUEST, "INVALID_TRIGGER", msg, None)
        }
        err @ CoreError::ConcurrencyConflict { .. } => (
            StatusCode::CONFLICT,
            "CONCURRENCY_CONFLICT",
            err.to_string(),
            None,
        ),
        CoreError::StoreUnavailable(msg) => {
            tracing::warn!(error = %msg, "Store unavailable");
            store_unavailable()
        }
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn store_unavailable() -> ErrorParts {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "STORE_UNAVAILABLE",
        "The data store is temporarily unavailable; retry later".to_string(),
        None,
    )
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Pool timeouts, closed pools, I/O failures and statement timeouts map to 503.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorParts {
    if careflow_db::error::is_unavailable(err) {
        tracing::warn!(error = %err, "Store unavailable");
        return store_unavailable();
    }

    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
            None,
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                        None,
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
