use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::password::HashError;
use crate::db::DbError;

/// Infrastructure failures surfaced to registration callers.
///
/// Business outcomes (`fail`, `Repeat`) never travel through this type.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to connect to database: {0}")]
    Connect(DbError),

    #[error("failed to select from user: {0}")]
    Lookup(DbError),

    #[error("failed to insert into user: {0}")]
    Insert(DbError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    fn db_error(&self) -> Option<&DbError> {
        match self {
            AuthError::Connect(e) | AuthError::Lookup(e) | AuthError::Insert(e) => Some(e),
            AuthError::Hash(_) | AuthError::Task(_) => None,
        }
    }

    /// Machine-checkable code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self.db_error() {
            Some(DbError::DeadlineExceeded) => "deadline_exceeded",
            Some(DbError::Cancelled) => "cancelled",
            _ => "unknown",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.db_error() {
            Some(DbError::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
            Some(DbError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        let e = AuthError::Lookup(DbError::DeadlineExceeded);
        assert_eq!(e.code(), "deadline_exceeded");
        assert_eq!(e.status(), StatusCode::GATEWAY_TIMEOUT);

        let e = AuthError::Connect(DbError::Cancelled);
        assert_eq!(e.code(), "cancelled");
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);

        let e = AuthError::Insert(DbError::Sqlx(sqlx::Error::PoolClosed));
        assert_eq!(e.code(), "unknown");
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().starts_with("failed to insert into user: "));
    }
}
