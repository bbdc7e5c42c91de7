//! The repository and store traits, and supporting query types.
//!
//! [`AggregateRepository`] is the synchronous, column-level view of storage
//! used inside one transaction. [`AggregateStore`] owns the connection and
//! hands out a repository for the duration of a transaction.
//!
//! The traits are implemented by storage backends (e.g.
//! `followup-store-sqlite`). Ingestion and cronjobs depend on this
//! abstraction, not on a concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
  error::StoreError,
  ident::{OrganizationNumber, PersonIdent},
  status::{FlagUpdate, NewPersonStatus, PersonStatus, Timeline},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`AggregateRepository::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
  /// Case-insensitive substring of the display name plus exact birth date.
  NameAndBirthDate {
    name:       String,
    birth_date: NaiveDate,
  },
  /// Exact birth date only.
  BirthDate(NaiveDate),
  /// Rows assigned to a caseworker.
  Caseworker(String),
  /// Rows in an organizational unit with at least one active task.
  OrgUnit(String),
}

// ─── Repository ──────────────────────────────────────────────────────────────

/// Column-level access to the person status table.
///
/// Every update is an independent statement. Callers decide *whether* to call
/// them; the reconciliation rules own that decision, not the repository.
pub trait AggregateRepository {
  type Error: StoreError;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get(&self, ident: &PersonIdent) -> Result<Option<PersonStatus>, Self::Error>;

  fn search(&self, criteria: &SearchCriteria) -> Result<Vec<PersonStatus>, Self::Error>;

  /// Identities of rows missing a display name or birth date, skipping rows
  /// attempted at or after `attempted_before`. Never-attempted rows come
  /// first.
  fn list_missing_person_info(
    &self,
    attempted_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<PersonIdent>, Self::Error>;

  /// Distinct organization numbers with at least one association lacking a
  /// display name, skipping numbers attempted at or after
  /// `attempted_before`.
  fn list_organizations_missing_name(
    &self,
    attempted_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<OrganizationNumber>, Self::Error>;

  /// Identities whose org unit was never resolved or last resolved before
  /// `resolved_before`, skipping rows attempted at or after
  /// `attempted_before`.
  fn list_due_for_org_unit_refresh(
    &self,
    resolved_before: DateTime<Utc>,
    attempted_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<PersonIdent>, Self::Error>;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new aggregate, including its timeline's organizations.
  ///
  /// Returns [`crate::Error::AlreadyExists`] if a row exists for the
  /// identity; callers must check first.
  fn create(&self, input: &NewPersonStatus, now: DateTime<Utc>)
  -> Result<PersonStatus, Self::Error>;

  fn update_flags(
    &self,
    ident: &PersonIdent,
    update: &FlagUpdate,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  /// Replace the timeline columns and diff the organization child rows by
  /// organization number.
  fn update_timeline(
    &self,
    ident: &PersonIdent,
    timeline: &Timeline,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  fn update_person_info(
    &self,
    ident: &PersonIdent,
    display_name: Option<&str>,
    birth_date: Option<NaiveDate>,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  fn update_assigned_org_unit(
    &self,
    ident: &PersonIdent,
    org_unit: &str,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  fn update_assigned_caseworker(
    &self,
    ident: &PersonIdent,
    caseworker: &str,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  fn remove_assigned_caseworker(
    &self,
    ident: &PersonIdent,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  /// Re-key a row to a new identity, keeping its surrogate key and flags.
  fn update_person_ident(
    &self,
    old: &PersonIdent,
    new: &PersonIdent,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  /// Delete a row and its organization associations.
  fn delete(&self, ident: &PersonIdent) -> Result<(), Self::Error>;

  /// Set the display name on every association with this number. Returns
  /// the number of rows touched.
  fn update_organization_name(
    &self,
    number: &OrganizationNumber,
    name: &str,
  ) -> Result<usize, Self::Error>;

  // ── Enrichment attempts ───────────────────────────────────────────────
  //
  // No-ops when the row is gone.

  fn mark_person_info_attempted(
    &self,
    ident: &PersonIdent,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  fn mark_org_unit_attempted(&self, ident: &PersonIdent, now: DateTime<Utc>)
  -> Result<(), Self::Error>;

  fn mark_organization_name_attempted(
    &self,
    number: &OrganizationNumber,
    now: DateTime<Utc>,
  ) -> Result<(), Self::Error>;

  // ── Savepoints ────────────────────────────────────────────────────────

  /// Open a nested savepoint inside the current transaction.
  fn savepoint(&self) -> Result<(), Self::Error>;

  /// Keep the writes made since [`AggregateRepository::savepoint`].
  fn release_savepoint(&self) -> Result<(), Self::Error>;

  /// Undo the writes made since [`AggregateRepository::savepoint`] and close
  /// it.
  fn rollback_to_savepoint(&self) -> Result<(), Self::Error>;
}

/// Run `op` inside a savepoint, undoing its writes if it fails.
pub fn in_savepoint<T, E: StoreError>(
  repo: &dyn AggregateRepository<Error = E>,
  op: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
  repo.savepoint()?;
  match op() {
    Ok(value) => {
      repo.release_savepoint()?;
      Ok(value)
    }
    Err(error) => {
      repo.rollback_to_savepoint()?;
      Err(error)
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A transactional owner of an [`AggregateRepository`].
///
/// All methods return `Send` futures so the trait can be used from drivers
/// spawned on a multi-threaded tokio runtime.
pub trait AggregateStore: Send + Sync {
  type Error: StoreError;

  /// Run `f` inside one transaction. The transaction commits if `f` returns
  /// `Ok` and rolls back otherwise.
  fn transact<T, F>(&self, f: F) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&dyn AggregateRepository<Error = Self::Error>) -> Result<T, Self::Error>
      + Send
      + 'static;

  /// Fetch one aggregate.
  fn get(
    &self,
    ident: PersonIdent,
  ) -> impl Future<Output = Result<Option<PersonStatus>, Self::Error>> + Send + '_ {
    self.transact(move |repo| repo.get(&ident))
  }

  /// Run a search outside of any ingestion batch.
  fn search(
    &self,
    criteria: SearchCriteria,
  ) -> impl Future<Output = Result<Vec<PersonStatus>, Self::Error>> + Send + '_ {
    self.transact(move |repo| repo.search(&criteria))
  }
}
