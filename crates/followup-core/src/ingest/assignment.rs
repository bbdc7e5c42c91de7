//! Caseworker assignments.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{EventCategory, Outcome};
use crate::{
  Error,
  error::StoreError,
  ident::PersonIdent,
  status::NewPersonStatus,
  store::AggregateRepository,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
  pub person_ident:     PersonIdent,
  pub caseworker_ident: String,
  /// The unit the assigning caseworker acted on behalf of, if known.
  #[serde(default)]
  pub org_unit:         Option<String>,
  pub assigned_at:      DateTime<Utc>,
}

pub struct CaseworkerAssignmentCategory;

impl EventCategory for CaseworkerAssignmentCategory {
  type Event = AssignmentEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "caseworker-assignment";

  fn key(event: &AssignmentEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &AssignmentEvent) -> DateTime<Utc> { event.assigned_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &AssignmentEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let ident = &event.person_ident;

    let Some(stored) = repo.get(ident)? else {
      let org_unit = event
        .org_unit
        .clone()
        .ok_or_else(|| Error::UnresolvableOrgUnit(ident.clone()))?;
      let seed = NewPersonStatus {
        assigned_caseworker: Some(event.caseworker_ident.clone()),
        assigned_org_unit: Some(org_unit),
        ..NewPersonStatus::new(ident.clone())
      };
      repo.create(&seed, now)?;
      return Ok(Outcome::Created);
    };

    let org_unit = event
      .org_unit
      .as_deref()
      .or(stored.assigned_org_unit.as_deref())
      .ok_or_else(|| Error::UnresolvableOrgUnit(ident.clone()))?;

    // Not enforced: the unit of record may lag behind a reassignment.
    if let Some(current) = stored.assigned_org_unit.as_deref()
      && current != org_unit
    {
      warn!(
        person = %ident,
        caseworker = %event.caseworker_ident,
        current_unit = current,
        assigning_unit = org_unit,
        "caseworker assigned outside the person's organizational unit"
      );
    }

    if stored.assigned_caseworker.as_deref() == Some(event.caseworker_ident.as_str()) {
      return Ok(Outcome::Unchanged);
    }
    repo.update_assigned_caseworker(ident, &event.caseworker_ident, now)?;
    Ok(Outcome::Updated)
  }
}
