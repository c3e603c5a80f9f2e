use crate::{Error, error::StorageError};

/// Extension trait for Result types to simplify database error mapping
///
/// The driver error is logged in full and the caller only sees the context
/// message, so storage internals never leak into operator output.
///
/// # Example
///
/// ```rust,ignore
/// use lockdown_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err_with_context("Failed to release lockdown")?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a storage error carrying only `context`
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{context}");
            Error::Storage(StorageError::Database(context.to_string()))
        })
    }
}

/// Macro to convert any error to a storage database error
///
/// # Example
///
/// ```rust,ignore
/// use lockdown_core::map_storage_err;
///
/// map_storage_err!(query.execute(&pool).await)?;
/// ```
#[macro_export]
macro_rules! map_storage_err {
    ($result:expr) => {
        $result.map_err(|e| {
            $crate::Error::Storage($crate::error::StorageError::Database(e.to_string()))
        })
    };
}
