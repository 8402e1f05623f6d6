use thiserror::Error;

/// Errors surfaced by the data access layer.
///
/// Driver errors pass through untouched; the only errors this layer creates
/// itself are the two cancellation outcomes.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl DbError {
    /// True when the store rejected a write because of a UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, DbError::Cancelled | DbError::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_kinds() {
        assert!(DbError::Cancelled.is_cancellation());
        assert!(DbError::DeadlineExceeded.is_cancellation());
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_cancellation());
    }

    #[test]
    fn driver_errors_pass_through() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_unique_violation());
        assert_eq!(err.to_string(), sqlx::Error::RowNotFound.to_string());
    }
}
