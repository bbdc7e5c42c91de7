//! The inbound event-stream abstraction.
//!
//! A source yields keyed records in offset order. Consumption is pull-based
//! with manual commit: the position advances on every poll, but only a
//! [`commit`](EventSource::commit) makes it durable. A consumer that fails a
//! batch [`rewind`](EventSource::rewind)s to the committed offset so the batch
//! is delivered again.

use std::future::Future;

use chrono::{DateTime, Utc};

/// One delivered record. An absent `value` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
  pub offset:       i64,
  pub key:          String,
  pub value:        Option<String>,
  pub published_at: DateTime<Utc>,
}

impl RawRecord {
  pub fn is_tombstone(&self) -> bool { self.value.is_none() }
}

pub trait EventSource: Send {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The topic this source reads, for logging and metrics.
  fn topic(&self) -> &str;

  /// Fetch up to `max` records after the current position and advance the
  /// position past them.
  fn poll(
    &mut self,
    max: usize,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + '_;

  /// Make the current position durable.
  fn commit(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Move the position back to the last committed offset.
  fn rewind(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
