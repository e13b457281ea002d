use careflow_core::error::CoreError;

/// Error returned by repository operations that apply domain rules inside
/// a transaction.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store failed.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Whether a sqlx error is a transient store failure (pool exhausted or
/// closed, broken connection, statement timeout).
pub fn is_unavailable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        // 57014: query_canceled, raised when statement_timeout fires.
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("57014"),
        _ => false,
    }
}

impl DbError {
    /// Collapse into the domain taxonomy, mapping transient store failures
    /// to [`CoreError::StoreUnavailable`].
    pub fn into_core(self) -> Result<CoreError, sqlx::Error> {
        match self {
            DbError::Core(core) => Ok(core),
            DbError::Sqlx(err) if is_unavailable(&err) => {
                Ok(CoreError::StoreUnavailable(err.to_string()))
            }
            DbError::Sqlx(err) => Err(err),
        }
    }
}
