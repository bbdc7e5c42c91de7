use std::future::Future;

use chrono::{Duration, Utc};
use followup_core::store::AggregateStore;
use tracing::{info, warn};

use super::{Cronjob, CronjobResult};
use crate::{Error, Result, clients::UnitDirectory};

/// Keeps each person's organizational unit current.
///
/// When the unit changes, the assigned caseworker belonged to the old unit
/// and is removed.
pub struct OrgUnitCronjob<S, U> {
  store:       S,
  directory:   U,
  batch_size:  usize,
  refresh:     Duration,
  retry_after: Duration,
}

impl<S, U> OrgUnitCronjob<S, U> {
  pub fn new(
    store: S,
    directory: U,
    batch_size: usize,
    refresh: Duration,
    retry_after: Duration,
  ) -> Self {
    Self { store, directory, batch_size, refresh, retry_after }
  }
}

impl<S, U> Cronjob for OrgUnitCronjob<S, U>
where
  S: AggregateStore + 'static,
  U: UnitDirectory + 'static,
{
  const NAME: &'static str = "org-unit";

  fn run(&self) -> impl Future<Output = Result<CronjobResult>> + Send + '_ {
    async move {
      let limit = self.batch_size;
      let started = Utc::now();
      let resolved_before = started - self.refresh;
      let attempted_before = started - self.retry_after;
      let idents = self
        .store
        .transact(move |repo| {
          let idents =
            repo.list_due_for_org_unit_refresh(resolved_before, attempted_before, limit)?;
          for ident in &idents {
            repo.mark_org_unit_attempted(ident, started)?;
          }
          Ok(idents)
        })
        .await
        .map_err(Error::store)?;

      let mut result = CronjobResult::default();
      for ident in idents {
        let unit = match self.directory.org_unit(&ident).await {
          Ok(Some(unit)) => unit,
          Ok(None) => {
            warn!(person = %ident, "no organizational unit resolves for person");
            result.failed += 1;
            continue;
          }
          Err(e) => {
            warn!(person = %ident, error = %e, "unit lookup failed");
            result.failed += 1;
            continue;
          }
        };

        let now = Utc::now();
        let written = self
          .store
          .transact(move |repo| {
            let Some(stored) = repo.get(&ident)? else {
              return Ok(());
            };
            let moved = stored
              .assigned_org_unit
              .as_deref()
              .is_some_and(|current| current != unit);
            if moved && stored.assigned_caseworker.is_some() {
              repo.remove_assigned_caseworker(&ident, now)?;
              info!(id = stored.id, "org unit changed, removed assigned caseworker");
            }
            repo.update_assigned_org_unit(&ident, &unit, now)
          })
          .await;

        match written {
          Ok(()) => result.updated += 1,
          Err(e) => {
            warn!(error = %e, "failed to store org unit");
            result.failed += 1;
          }
        }
      }
      Ok(result)
    }
  }
}
