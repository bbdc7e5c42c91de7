//! `reqwest` implementations of the lookup traits.
//!
//! Person identities travel in a request header, never in the URL, so they
//! stay out of access logs.

use std::{future::Future, time::Duration};

use followup_core::{
  ident::{OrganizationNumber, PersonIdent},
  identity::IdentityRegistry,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use super::{
  ClientError, OrganizationRegistry, PersonDirectory, PersonInfo, UnitDirectory,
};

const PERSON_IDENT_HEADER: &str = "person-ident";

/// A JSON lookup service at one base URL.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
struct Lookup {
  service:  &'static str,
  client:   Client,
  base_url: String,
}

impl Lookup {
  fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      service,
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
    })
  }

  fn get(&self, path: &str) -> RequestBuilder {
    self.client.get(format!("{}{path}", self.base_url))
  }

  /// Send `req` and decode the body. A 404 is `Ok(None)`.
  async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>, ClientError> {
    let resp = req.send().await?;
    match resp.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => Ok(Some(resp.json().await?)),
      status => Err(ClientError::Status { service: self.service, status }),
    }
  }
}

// ─── Person directory ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PersonDirectoryClient(Lookup);

impl PersonDirectoryClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
    Lookup::new("person directory", base_url, timeout).map(Self)
  }
}

impl PersonDirectory for PersonDirectoryClient {
  fn person_info<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<Option<PersonInfo>, ClientError>> + Send + 'a {
    let req = self.0.get("/api/v1/person").header(PERSON_IDENT_HEADER, ident.as_str());
    self.0.fetch(req)
  }
}

// ─── Organization registry ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct OrganizationBody {
  name: String,
}

#[derive(Clone)]
pub struct OrganizationRegistryClient(Lookup);

impl OrganizationRegistryClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
    Lookup::new("organization registry", base_url, timeout).map(Self)
  }
}

impl OrganizationRegistry for OrganizationRegistryClient {
  fn organization_name<'a>(
    &'a self,
    number: &'a OrganizationNumber,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send + 'a {
    async move {
      let req = self.0.get(&format!("/api/v1/organizations/{number}"));
      let body: Option<OrganizationBody> = self.0.fetch(req).await?;
      Ok(body.map(|body| body.name))
    }
  }
}

// ─── Unit directory ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgUnitBody {
  org_unit: String,
}

#[derive(Clone)]
pub struct UnitDirectoryClient(Lookup);

impl UnitDirectoryClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
    Lookup::new("unit directory", base_url, timeout).map(Self)
  }
}

impl UnitDirectory for UnitDirectoryClient {
  fn org_unit<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send + 'a {
    async move {
      let req = self.0.get("/api/v1/person/org-unit").header(PERSON_IDENT_HEADER, ident.as_str());
      let body: Option<OrgUnitBody> = self.0.fetch(req).await?;
      Ok(body.map(|body| body.org_unit))
    }
  }
}

// ─── Identity registry ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IdentityBody {
  active: bool,
}

#[derive(Clone)]
pub struct IdentityRegistryClient(Lookup);

impl IdentityRegistryClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
    Lookup::new("identity registry", base_url, timeout).map(Self)
  }
}

impl IdentityRegistry for IdentityRegistryClient {
  type Error = ClientError;

  /// An identity the registry does not know is not active.
  fn is_active<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<bool, ClientError>> + Send + 'a {
    async move {
      let req = self.0.get("/api/v1/identity").header(PERSON_IDENT_HEADER, ident.as_str());
      let body: Option<IdentityBody> = self.0.fetch(req).await?;
      Ok(body.is_some_and(|body| body.active))
    }
  }
}
