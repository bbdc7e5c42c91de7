//! The follow-up status worker.
//!
//! Runs one [`driver::PollingDriver`] per event category against a
//! [`followup_core::store::AggregateStore`], the enrichment
//! [`cronjob`]s that fill in names and org units from external services, and
//! the internal health and metrics endpoints.

pub mod clients;
pub mod config;
pub mod cronjob;
pub mod driver;
pub mod error;
pub mod health;
pub mod metrics;

pub use config::WorkerConfig;
pub use driver::PollingDriver;
pub use error::{Error, Result};
