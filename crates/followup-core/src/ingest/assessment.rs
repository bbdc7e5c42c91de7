//! Assessment streams whose flag is driven by the upstream final-state
//! indicator: the task is active exactly while the assessment is not final.

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

// ─── Activity requirement ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequirementEvent {
  pub uuid:         Uuid,
  pub person_ident: PersonIdent,
  pub status:       String,
  pub is_final:     bool,
  #[serde(default)]
  pub deadline:     Option<NaiveDate>,
  pub created_at:   DateTime<Utc>,
}

pub struct ActivityRequirementCategory;

impl EventCategory for ActivityRequirementCategory {
  type Event = ActivityRequirementEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "activity-requirement";

  fn key(event: &ActivityRequirementEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &ActivityRequirementEvent) -> DateTime<Utc> { event.created_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &ActivityRequirementEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let update = FlagUpdate::ActivityRequirement {
      active:   !event.is_final,
      status:   event.status.clone(),
      deadline: event.deadline,
    };
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}

// ─── Plain assessments ───────────────────────────────────────────────────────

/// Payload shared by the lack-of-cooperation and late-follow-up streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentEvent {
  pub uuid:         Uuid,
  pub person_ident: PersonIdent,
  pub is_final:     bool,
  pub created_at:   DateTime<Utc>,
}

pub struct LackOfCooperationCategory;

impl EventCategory for LackOfCooperationCategory {
  type Event = AssessmentEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "lack-of-cooperation";

  fn key(event: &AssessmentEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &AssessmentEvent) -> DateTime<Utc> { event.created_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &AssessmentEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let update = FlagUpdate::LackOfCooperation { active: !event.is_final };
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}

pub struct LateFollowUpCategory;

impl EventCategory for LateFollowUpCategory {
  type Event = AssessmentEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "late-follow-up";

  fn key(event: &AssessmentEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &AssessmentEvent) -> DateTime<Utc> { event.created_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &AssessmentEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let update = FlagUpdate::LateFollowUp { active: !event.is_final };
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}
