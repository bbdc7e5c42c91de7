//! Dialog-meeting candidacy and dialog-meeting status streams. Both carry a
//! generation time and only a strictly newer generation replaces the stored
//! value.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{EventCategory, Outcome, apply_flag_update};
use crate::{
  error::StoreError,
  ident::PersonIdent,
  status::{FlagUpdate, Generated, MeetingStatus},
  store::AggregateRepository,
};

// ─── Candidacy ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogMeetingCandidateEvent {
  pub uuid:         Uuid,
  pub created_at:   DateTime<Utc>,
  pub person_ident: PersonIdent,
  pub candidate:    bool,
}

pub struct DialogMeetingCandidateCategory;

impl EventCategory for DialogMeetingCandidateCategory {
  type Event = DialogMeetingCandidateEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "dialog-meeting-candidate";

  fn key(event: &DialogMeetingCandidateEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &DialogMeetingCandidateEvent) -> DateTime<Utc> { event.created_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &DialogMeetingCandidateEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let update = FlagUpdate::DialogMeetingCandidate(Generated {
      value:        event.candidate,
      generated_at: event.created_at,
    });
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogMeetingStatusEvent {
  pub uuid:              Uuid,
  pub person_ident:      PersonIdent,
  pub status:            MeetingStatus,
  pub status_changed_at: DateTime<Utc>,
}

pub struct DialogMeetingStatusCategory;

impl EventCategory for DialogMeetingStatusCategory {
  type Event = DialogMeetingStatusEvent;
  type Key = PersonIdent;
  type Recency = DateTime<Utc>;

  const NAME: &'static str = "dialog-meeting-status";

  fn key(event: &DialogMeetingStatusEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &DialogMeetingStatusEvent) -> DateTime<Utc> { event.status_changed_at }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &DialogMeetingStatusEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let update = FlagUpdate::DialogMeetingStatus(Generated {
      value:        event.status,
      generated_at: event.status_changed_at,
    });
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}
