//! Display name and birth date updates. These patch known persons only; a
//! name alone is not a follow-up task and never creates an aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::{EventCategory, Outcome};
use crate::{error::StoreError, ident::PersonIdent, store::AggregateRepository};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfoEvent {
  pub person_ident: PersonIdent,
  #[serde(default)]
  pub name:         Option<String>,
  #[serde(default)]
  pub birth_date:   Option<NaiveDate>,
}

pub struct PersonInfoCategory;

impl EventCategory for PersonInfoCategory {
  type Event = PersonInfoEvent;
  type Key = PersonIdent;
  type Recency = ();

  const NAME: &'static str = "person-info";

  fn key(event: &PersonInfoEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(_event: &PersonInfoEvent) -> Self::Recency {}

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &PersonInfoEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let Some(stored) = repo.get(&event.person_ident)? else {
      return Ok(Outcome::Skipped);
    };

    let name = event.name.as_deref().or(stored.display_name.as_deref());
    let birth_date = event.birth_date.or(stored.birth_date);
    if name == stored.display_name.as_deref() && birth_date == stored.birth_date {
      return Ok(Outcome::Unchanged);
    }

    repo.update_person_info(&event.person_ident, name, birth_date, now)?;
    Ok(Outcome::Updated)
  }
}
