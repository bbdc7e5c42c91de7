//! Error type for `followup-worker`.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// The event source itself failed; not attributable to any batch.
  #[error("event source {topic} failed: {source}")]
  Source {
    topic:  String,
    #[source]
    source: BoxError,
  },
}

impl Error {
  pub fn store(error: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(error))
  }

  pub fn event_source(topic: &str, error: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Source { topic: topic.to_owned(), source: Box::new(error) }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
