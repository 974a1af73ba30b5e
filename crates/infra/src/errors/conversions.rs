//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use serde_json::Error as JsonError;
use tablesync_domain::SyncError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SyncError);

impl From<InfraError> for SyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SyncError> for InfraError {
    fn from(value: SyncError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSyncError {
    fn into_sync_error(self) -> SyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for SqlError {
    fn into_sync_error(self) -> SyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => SyncError::Storage("database is busy".into()),
                    ErrorCode::DatabaseLocked => SyncError::Storage("database is locked".into()),
                    ErrorCode::ReadOnly => SyncError::Storage("database is read-only".into()),
                    ErrorCode::DiskFull => SyncError::Storage("disk is full".into()),
                    _ => SyncError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => SyncError::Storage("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                SyncError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                SyncError::Storage(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => {
                SyncError::Storage(format!("invalid database path: {}", path.to_string_lossy()))
            }
            other => SyncError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_sync_error())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for JsonError {
    fn into_sync_error(self) -> SyncError {
        SyncError::Deserialization(format!(
            "{} at line {} column {}",
            self,
            self.line(),
            self.column()
        ))
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        Self(value.into_sync_error())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SyncError */
/* -------------------------------------------------------------------------- */

/// Transport failures outside any platform call (client construction, URL
/// building). Calls made on behalf of a platform are classified by
/// [`crate::http::HttpClient::send`], which knows the platform and timeout.
impl IntoSyncError for HttpError {
    fn into_sync_error(self) -> SyncError {
        if self.is_builder() {
            return SyncError::InvalidInput(format!("invalid http request: {self}"));
        }
        if self.is_decode() {
            return SyncError::Deserialization(format!("invalid http response body: {self}"));
        }
        SyncError::Network { platform: "http".into(), message: self.to_string() }
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_sync_error())
    }
}
