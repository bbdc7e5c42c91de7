//! SQLite backend for the follow-up status aggregate.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The same database also holds
//! the event log the workers consume from.

mod encode;
mod event_log;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use event_log::SqliteEventLog;
pub use store::SqliteStore;
