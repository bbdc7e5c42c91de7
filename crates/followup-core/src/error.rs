//! Error types for `followup-core`.

use thiserror::Error;

use crate::ident::PersonIdent;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid person identity number: {0:?}")]
  InvalidPersonIdent(String),

  #[error("invalid organization number: {0:?}")]
  InvalidOrganizationNumber(String),

  #[error("aggregate already exists for {0}")]
  AlreadyExists(PersonIdent),

  #[error("aggregate not found for {0}")]
  NotFound(PersonIdent),

  /// An identity-change event named an identity as active that the identity
  /// registry still reports as retired.
  #[error("identity {0} is not active in the identity registry")]
  InactiveIdentity(PersonIdent),

  #[error("no organizational unit resolvable for {0}")]
  UnresolvableOrgUnit(PersonIdent),

  #[error("identity registry lookup failed: {0}")]
  IdentityRegistry(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("malformed {category} record at offset {offset}: {source}")]
  Decode {
    category: &'static str,
    offset:   i64,
    #[source]
    source:   serde_json::Error,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classifies storage errors that are worth exactly one immediate retry.
pub trait Transient {
  fn is_transient(&self) -> bool;
}

impl Transient for Error {
  fn is_transient(&self) -> bool { false }
}

/// The bounds every storage backend error satisfies. Backends wrap
/// [`Error`] so that ingestion rules can raise domain errors through the
/// repository's error type.
pub trait StoreError:
  std::error::Error + Transient + From<Error> + Send + Sync + 'static
{
}

impl<E> StoreError for E where
  E: std::error::Error + Transient + From<Error> + Send + Sync + 'static
{
}
