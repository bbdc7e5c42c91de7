//! Error type for `followup-store-sqlite`.

use followup_core::error::Transient;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] followup_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn is_contention(error: &rusqlite::Error) -> bool {
  matches!(
    error.sqlite_error_code(),
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

/// Lock contention is worth retrying; everything else is not.
impl Transient for Error {
  fn is_transient(&self) -> bool {
    match self {
      Self::Sqlite(e) => is_contention(e),
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => is_contention(e),
      _ => false,
    }
  }
}
