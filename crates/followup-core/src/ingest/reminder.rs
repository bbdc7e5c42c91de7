//! Caseworker reminders (follow-up tasks with an optional deadline).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{EventCategory, Outcome, apply_flag_update};
use crate::{
  error::StoreError,
  ident::PersonIdent,
  status::FlagUpdate,
  store::AggregateRepository,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEvent {
  pub uuid:         Uuid,
  pub person_ident: PersonIdent,
  pub is_active:    bool,
  #[serde(default)]
  pub deadline:     Option<NaiveDate>,
  pub created_at:   DateTime<Utc>,
}

pub struct ReminderCategory;

impl EventCategory for ReminderCategory {
  type Event = ReminderEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "reminder";

  fn key(event: &ReminderEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &ReminderEvent) -> DateTime<Utc> { event.created_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &ReminderEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    // A closed reminder has no deadline left to show.
    let update = FlagUpdate::Reminder {
      active:   event.is_active,
      deadline: event.deadline.filter(|_| event.is_active),
    };
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}
