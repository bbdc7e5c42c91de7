//! Person-task events: "received" raises a latched task marker, "handled"
//! clears it. The stream multiplexes several task kinds; each kind owns its
//! own marker and is deduplicated independently.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{EventCategory, Outcome, apply_flag_update};
use crate::{
  error::StoreError,
  ident::PersonIdent,
  status::{FlagUpdate, TaskKind},
  store::AggregateRepository,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTransition {
  Received,
  Handled,
}

/// The closed set of event kinds on the person-task stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventKind {
  MeetingNeedReceived,
  MeetingNeedHandled,
  DialogMeetingAnswerReceived,
  DialogMeetingAnswerHandled,
  EmployerAssistanceReceived,
  EmployerAssistanceHandled,
  PractitionerReplyReceived,
  PractitionerReplyHandled,
}

impl TaskEventKind {
  pub fn split(self) -> (TaskKind, TaskTransition) {
    use TaskTransition::{Handled, Received};
    match self {
      Self::MeetingNeedReceived => (TaskKind::MeetingNeed, Received),
      Self::MeetingNeedHandled => (TaskKind::MeetingNeed, Handled),
      Self::DialogMeetingAnswerReceived => (TaskKind::DialogMeetingAnswer, Received),
      Self::DialogMeetingAnswerHandled => (TaskKind::DialogMeetingAnswer, Handled),
      Self::EmployerAssistanceReceived => (TaskKind::EmployerAssistance, Received),
      Self::EmployerAssistanceHandled => (TaskKind::EmployerAssistance, Handled),
      Self::PractitionerReplyReceived => (TaskKind::PractitionerReply, Received),
      Self::PractitionerReplyHandled => (TaskKind::PractitionerReply, Handled),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonTaskEvent {
  pub person_ident: PersonIdent,
  pub kind:         TaskEventKind,
  pub created_at:   DateTime<Utc>,
}

pub struct PersonTaskCategory;

impl EventCategory for PersonTaskCategory {
  type Event = PersonTaskEvent;
  type Key = (PersonIdent, TaskKind);
  // Delivery order decides; the latest delivered event wins.
  type Recency = ();

  const NAME: &'static str = "person-task";

  fn key(event: &PersonTaskEvent) -> Self::Key {
    (event.person_ident.clone(), event.kind.split().0)
  }

  fn recency(_event: &PersonTaskEvent) -> Self::Recency {}

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &PersonTaskEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let (kind, transition) = event.kind.split();
    let update = FlagUpdate::Task { kind, pending: transition == TaskTransition::Received };
    apply_flag_update(repo, &event.person_ident, &update, now)
  }
}
