//! Outbound lookups used by enrichment and identity verification.
//!
//! The cronjobs depend on the lookup traits; [`http`] holds the `reqwest`
//! implementations wired up by the binary.

pub mod http;

use std::future::Future;

use chrono::NaiveDate;
use followup_core::ident::{OrganizationNumber, PersonIdent};
use serde::Deserialize;
use thiserror::Error;

pub use http::{
  IdentityRegistryClient, OrganizationRegistryClient, PersonDirectoryClient, UnitDirectoryClient,
};

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{service} responded {status}")]
  Status {
    service: &'static str,
    status:  reqwest::StatusCode,
  },
}

/// Display name and birth date as known to the person directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfo {
  #[serde(default)]
  pub name:       Option<String>,
  #[serde(default)]
  pub birth_date: Option<NaiveDate>,
}

/// `Ok(None)` from any lookup means the service does not know the key.
pub trait PersonDirectory: Send + Sync {
  fn person_info<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<Option<PersonInfo>, ClientError>> + Send + 'a;
}

pub trait OrganizationRegistry: Send + Sync {
  fn organization_name<'a>(
    &'a self,
    number: &'a OrganizationNumber,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send + 'a;
}

pub trait UnitDirectory: Send + Sync {
  /// The organizational unit currently responsible for the person.
  fn org_unit<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send + 'a;
}
