use std::future::Future;

use chrono::{Duration, Utc};
use followup_core::store::AggregateStore;
use tracing::warn;

use super::{Cronjob, CronjobResult};
use crate::{Error, Result, clients::OrganizationRegistry};

/// Fills in display names for organizations attached to timelines.
pub struct OrganizationNameCronjob<S, R> {
  store:       S,
  registry:    R,
  batch_size:  usize,
  retry_after: Duration,
}

impl<S, R> OrganizationNameCronjob<S, R> {
  pub fn new(store: S, registry: R, batch_size: usize, retry_after: Duration) -> Self {
    Self { store, registry, batch_size, retry_after }
  }
}

impl<S, R> Cronjob for OrganizationNameCronjob<S, R>
where
  S: AggregateStore + 'static,
  R: OrganizationRegistry + 'static,
{
  const NAME: &'static str = "organization-name";

  fn run(&self) -> impl Future<Output = Result<CronjobResult>> + Send + '_ {
    async move {
      let limit = self.batch_size;
      let started = Utc::now();
      let attempted_before = started - self.retry_after;
      let numbers = self
        .store
        .transact(move |repo| {
          let numbers = repo.list_organizations_missing_name(attempted_before, limit)?;
          for number in &numbers {
            repo.mark_organization_name_attempted(number, started)?;
          }
          Ok(numbers)
        })
        .await
        .map_err(Error::store)?;

      let mut result = CronjobResult::default();
      for number in numbers {
        let name = match self.registry.organization_name(&number).await {
          Ok(Some(name)) => name,
          Ok(None) => {
            warn!(organization = %number, "organization registry has no entry");
            result.failed += 1;
            continue;
          }
          Err(e) => {
            warn!(organization = %number, error = %e, "organization lookup failed");
            result.failed += 1;
            continue;
          }
        };

        match self
          .store
          .transact(move |repo| repo.update_organization_name(&number, &name))
          .await
        {
          Ok(_) => result.updated += 1,
          Err(e) => {
            warn!(error = %e, "failed to store organization name");
            result.failed += 1;
          }
        }
      }
      Ok(result)
    }
  }
}
