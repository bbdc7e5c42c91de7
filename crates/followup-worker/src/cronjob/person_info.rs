use std::future::Future;

use chrono::{Duration, Utc};
use followup_core::store::AggregateStore;
use tracing::warn;

use super::{Cronjob, CronjobResult};
use crate::{Error, Result, clients::PersonDirectory};

/// Backfills display name and birth date from the person directory.
///
/// Every listed row is stamped as attempted, so rows the directory cannot
/// complete wait `retry_after` instead of filling every batch.
pub struct PersonInfoCronjob<S, D> {
  store:       S,
  directory:   D,
  batch_size:  usize,
  retry_after: Duration,
}

impl<S, D> PersonInfoCronjob<S, D> {
  pub fn new(store: S, directory: D, batch_size: usize, retry_after: Duration) -> Self {
    Self { store, directory, batch_size, retry_after }
  }
}

impl<S, D> Cronjob for PersonInfoCronjob<S, D>
where
  S: AggregateStore + 'static,
  D: PersonDirectory + 'static,
{
  const NAME: &'static str = "person-info";

  fn run(&self) -> impl Future<Output = Result<CronjobResult>> + Send + '_ {
    async move {
      let limit = self.batch_size;
      let started = Utc::now();
      let attempted_before = started - self.retry_after;
      let idents = self
        .store
        .transact(move |repo| {
          let idents = repo.list_missing_person_info(attempted_before, limit)?;
          for ident in &idents {
            repo.mark_person_info_attempted(ident, started)?;
          }
          Ok(idents)
        })
        .await
        .map_err(Error::store)?;

      let mut result = CronjobResult::default();
      for ident in idents {
        let info = match self.directory.person_info(&ident).await {
          Ok(Some(info)) => info,
          Ok(None) => {
            warn!(person = %ident, "person directory has no entry");
            result.failed += 1;
            continue;
          }
          Err(e) => {
            warn!(person = %ident, error = %e, "person directory lookup failed");
            result.failed += 1;
            continue;
          }
        };

        let now = Utc::now();
        let written = self
          .store
          .transact(move |repo| {
            // Keep whatever the row already has if the directory is silent.
            let Some(stored) = repo.get(&ident)? else {
              return Ok(false);
            };
            let name = info.name.or(stored.display_name);
            let birth_date = info.birth_date.or(stored.birth_date);
            repo.update_person_info(&ident, name.as_deref(), birth_date, now)?;
            Ok(true)
          })
          .await;

        match written {
          Ok(true) => result.updated += 1,
          Ok(false) => {}
          Err(e) => {
            warn!(error = %e, "failed to store person info");
            result.failed += 1;
          }
        }
      }
      Ok(result)
    }
  }
}
