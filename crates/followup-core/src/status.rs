//! The person status aggregate, one row per tracked person.
//!
//! Every field group is owned by exactly one ingestion category. Rules never
//! write another category's fields, so concurrent drivers can update the same
//! row without cross-category locking.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ident::{OrganizationNumber, PersonIdent};

// ─── Generated values ────────────────────────────────────────────────────────

/// A value stamped with the upstream time it was generated at. Only a
/// strictly newer generation may replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated<T> {
  pub value:        T,
  pub generated_at: DateTime<Utc>,
}

// ─── Dialog meeting status ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingStatus {
  Invited,
  NewTimeOrPlace,
  Cancelled,
  Completed,
  Closed,
}

impl MeetingStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Invited => "INVITED",
      Self::NewTimeOrPlace => "NEW_TIME_OR_PLACE",
      Self::Cancelled => "CANCELLED",
      Self::Completed => "COMPLETED",
      Self::Closed => "CLOSED",
    }
  }

  /// A meeting is scheduled and not yet held.
  pub fn is_upcoming(self) -> bool {
    matches!(self, Self::Invited | Self::NewTimeOrPlace)
  }
}

impl FromStr for MeetingStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "INVITED" => Ok(Self::Invited),
      "NEW_TIME_OR_PLACE" => Ok(Self::NewTimeOrPlace),
      "CANCELLED" => Ok(Self::Cancelled),
      "COMPLETED" => Ok(Self::Completed),
      "CLOSED" => Ok(Self::Closed),
      other => Err(format!("unknown meeting status: {other:?}")),
    }
  }
}

impl fmt::Display for MeetingStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Latched task kinds ──────────────────────────────────────────────────────

/// Tasks raised by a "received" event and cleared by a "handled" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
  /// The person or employer has asked for a dialog meeting.
  MeetingNeed,
  /// A reply to a dialog-meeting invitation awaits reading.
  DialogMeetingAnswer,
  /// The employer has requested assistance with the follow-up plan.
  EmployerAssistance,
  /// A practitioner has replied to a message.
  PractitionerReply,
}

// ─── Task flags ──────────────────────────────────────────────────────────────

/// The outstanding-task markers. `None` means the category has never produced
/// an event for this person.
///
/// Each marker group carries the time it last changed. The dialog-meeting
/// values carry their upstream generation time instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFlags {
  pub meeting_need_pending:             Option<bool>,
  pub meeting_need_updated_at:          Option<DateTime<Utc>>,
  pub dialog_meeting_answer_pending:    Option<bool>,
  pub dialog_meeting_answer_updated_at: Option<DateTime<Utc>>,
  pub employer_assistance_pending:      Option<bool>,
  pub employer_assistance_updated_at:   Option<DateTime<Utc>>,
  pub practitioner_reply_pending:       Option<bool>,
  pub practitioner_reply_updated_at:    Option<DateTime<Utc>>,
  pub activity_requirement_active:      Option<bool>,
  pub activity_requirement_status:      Option<String>,
  pub activity_requirement_deadline:    Option<NaiveDate>,
  pub activity_requirement_updated_at:  Option<DateTime<Utc>>,
  pub lack_of_cooperation_active:       Option<bool>,
  pub lack_of_cooperation_updated_at:   Option<DateTime<Utc>>,
  pub late_follow_up_active:            Option<bool>,
  pub late_follow_up_updated_at:        Option<DateTime<Utc>>,
  pub reminder_active:                  Option<bool>,
  pub reminder_deadline:                Option<NaiveDate>,
  pub reminder_updated_at:              Option<DateTime<Utc>>,
  pub dialog_meeting_candidate:         Option<Generated<bool>>,
  pub dialog_meeting_status:            Option<Generated<MeetingStatus>>,
}

impl TaskFlags {
  pub fn task_pending(&self, kind: TaskKind) -> Option<bool> {
    match kind {
      TaskKind::MeetingNeed => self.meeting_need_pending,
      TaskKind::DialogMeetingAnswer => self.dialog_meeting_answer_pending,
      TaskKind::EmployerAssistance => self.employer_assistance_pending,
      TaskKind::PractitionerReply => self.practitioner_reply_pending,
    }
  }

  pub fn task_updated_at(&self, kind: TaskKind) -> Option<DateTime<Utc>> {
    match kind {
      TaskKind::MeetingNeed => self.meeting_need_updated_at,
      TaskKind::DialogMeetingAnswer => self.dialog_meeting_answer_updated_at,
      TaskKind::EmployerAssistance => self.employer_assistance_updated_at,
      TaskKind::PractitionerReply => self.practitioner_reply_updated_at,
    }
  }

  fn task_updated_at_mut(&mut self, kind: TaskKind) -> &mut Option<DateTime<Utc>> {
    match kind {
      TaskKind::MeetingNeed => &mut self.meeting_need_updated_at,
      TaskKind::DialogMeetingAnswer => &mut self.dialog_meeting_answer_updated_at,
      TaskKind::EmployerAssistance => &mut self.employer_assistance_updated_at,
      TaskKind::PractitionerReply => &mut self.practitioner_reply_updated_at,
    }
  }

  fn task_pending_mut(&mut self, kind: TaskKind) -> &mut Option<bool> {
    match kind {
      TaskKind::MeetingNeed => &mut self.meeting_need_pending,
      TaskKind::DialogMeetingAnswer => &mut self.dialog_meeting_answer_pending,
      TaskKind::EmployerAssistance => &mut self.employer_assistance_pending,
      TaskKind::PractitionerReply => &mut self.practitioner_reply_pending,
    }
  }

  /// Whether a caseworker currently has anything to act on for this person.
  pub fn has_active_task(&self) -> bool {
    let latched = [
      self.meeting_need_pending,
      self.dialog_meeting_answer_pending,
      self.employer_assistance_pending,
      self.practitioner_reply_pending,
      self.activity_requirement_active,
      self.lack_of_cooperation_active,
      self.late_follow_up_active,
      self.reminder_active,
    ];
    if latched.into_iter().any(|f| f == Some(true)) {
      return true;
    }

    let candidate = self
      .dialog_meeting_candidate
      .as_ref()
      .is_some_and(|c| c.value);
    let meeting_upcoming = self
      .dialog_meeting_status
      .as_ref()
      .is_some_and(|s| s.value.is_upcoming());
    candidate && !meeting_upcoming
  }
}

// ─── Flag updates ────────────────────────────────────────────────────────────

/// A column-level change to [`TaskFlags`], one variant per owning category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagUpdate {
  Task {
    kind:    TaskKind,
    pending: bool,
  },
  ActivityRequirement {
    active:   bool,
    status:   String,
    deadline: Option<NaiveDate>,
  },
  LackOfCooperation {
    active: bool,
  },
  LateFollowUp {
    active: bool,
  },
  Reminder {
    active:   bool,
    deadline: Option<NaiveDate>,
  },
  DialogMeetingCandidate(Generated<bool>),
  DialogMeetingStatus(Generated<MeetingStatus>),
}

impl FlagUpdate {
  /// Write this update's values into `flags`. Change timestamps are left
  /// alone; see [`FlagUpdate::stamp`].
  pub fn apply_to(&self, flags: &mut TaskFlags) {
    match self {
      Self::Task { kind, pending } => *flags.task_pending_mut(*kind) = Some(*pending),
      Self::ActivityRequirement { active, status, deadline } => {
        flags.activity_requirement_active = Some(*active);
        flags.activity_requirement_status = Some(status.clone());
        flags.activity_requirement_deadline = *deadline;
      }
      Self::LackOfCooperation { active } => flags.lack_of_cooperation_active = Some(*active),
      Self::LateFollowUp { active } => flags.late_follow_up_active = Some(*active),
      Self::Reminder { active, deadline } => {
        flags.reminder_active = Some(*active);
        flags.reminder_deadline = *deadline;
      }
      Self::DialogMeetingCandidate(candidate) => {
        flags.dialog_meeting_candidate = Some(candidate.clone());
      }
      Self::DialogMeetingStatus(status) => {
        flags.dialog_meeting_status = Some(status.clone());
      }
    }
  }

  /// Record `at` as the change time of the marker group this update owns.
  /// Dialog-meeting updates carry their own generation time.
  pub fn stamp(&self, flags: &mut TaskFlags, at: DateTime<Utc>) {
    let slot = match self {
      Self::Task { kind, .. } => flags.task_updated_at_mut(*kind),
      Self::ActivityRequirement { .. } => &mut flags.activity_requirement_updated_at,
      Self::LackOfCooperation { .. } => &mut flags.lack_of_cooperation_updated_at,
      Self::LateFollowUp { .. } => &mut flags.late_follow_up_updated_at,
      Self::Reminder { .. } => &mut flags.reminder_updated_at,
      Self::DialogMeetingCandidate(_) | Self::DialogMeetingStatus(_) => return,
    };
    *slot = Some(at);
  }

  /// True if applying this update to `flags` would change nothing.
  pub fn is_noop_for(&self, flags: &TaskFlags) -> bool {
    let mut patched = flags.clone();
    self.apply_to(&mut patched);
    &patched == flags
  }
}

// ─── Timeline ────────────────────────────────────────────────────────────────

/// An organization associated with a timeline. The display name is filled in
/// lazily by the organization-name cronjob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAssociation {
  pub number:     OrganizationNumber,
  pub name:       Option<String>,
  pub uuid:       Uuid,
  pub created_at: DateTime<Utc>,
}

impl OrgAssociation {
  pub fn new(number: OrganizationNumber, now: DateTime<Utc>) -> Self {
    Self { number, name: None, uuid: Uuid::new_v4(), created_at: now }
  }
}

/// The person's latest follow-up case period (the "tilfelle").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
  pub start:                     NaiveDate,
  pub end:                       NaiveDate,
  /// Absent on rows written before generation times were tracked.
  pub generated_at:              Option<DateTime<Utc>>,
  pub reference_bit_uuid:        Uuid,
  pub reference_bit_occurred_at: DateTime<Utc>,
  pub sick_days:                 Option<u32>,
  pub organizations:             Vec<OrgAssociation>,
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// The consolidated status of one person, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonStatus {
  /// Surrogate key; survives identity merges.
  pub id:                           i64,
  pub uuid:                         Uuid,
  pub person_ident:                 PersonIdent,
  pub display_name:                 Option<String>,
  pub birth_date:                   Option<NaiveDate>,
  pub assigned_caseworker:          Option<String>,
  pub assigned_org_unit:            Option<String>,
  pub assigned_org_unit_updated_at: Option<DateTime<Utc>>,
  pub flags:                        TaskFlags,
  pub timeline:                     Option<Timeline>,
  pub created_at:                   DateTime<Utc>,
  pub updated_at:                   DateTime<Utc>,
}

/// Input to [`AggregateRepository::create`](crate::store::AggregateRepository::create).
///
/// Surrogate key, UUID and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPersonStatus {
  pub person_ident:        PersonIdent,
  pub display_name:        Option<String>,
  pub birth_date:          Option<NaiveDate>,
  pub assigned_caseworker: Option<String>,
  pub assigned_org_unit:   Option<String>,
  pub flags:               TaskFlags,
  pub timeline:            Option<Timeline>,
}

impl NewPersonStatus {
  /// An aggregate with every field at its default.
  pub fn new(person_ident: PersonIdent) -> Self {
    Self {
      person_ident,
      display_name: None,
      birth_date: None,
      assigned_caseworker: None,
      assigned_org_unit: None,
      flags: TaskFlags::default(),
      timeline: None,
    }
  }

  pub fn with_flags(person_ident: PersonIdent, update: &FlagUpdate, now: DateTime<Utc>) -> Self {
    let mut seed = Self::new(person_ident);
    update.apply_to(&mut seed.flags);
    update.stamp(&mut seed.flags, now);
    seed
  }

  pub fn with_timeline(person_ident: PersonIdent, timeline: Timeline) -> Self {
    Self { timeline: Some(timeline), ..Self::new(person_ident) }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  #[test]
  fn task_update_only_touches_its_own_marker() {
    let mut flags = TaskFlags::default();
    FlagUpdate::Task { kind: TaskKind::EmployerAssistance, pending: true }
      .apply_to(&mut flags);

    assert_eq!(flags.employer_assistance_pending, Some(true));
    assert_eq!(flags.meeting_need_pending, None);
    assert_eq!(flags.dialog_meeting_answer_pending, None);
  }

  #[test]
  fn replaying_update_is_noop() {
    let update = FlagUpdate::Reminder {
      active:   true,
      deadline: NaiveDate::from_ymd_opt(2024, 3, 1),
    };
    let mut flags = TaskFlags::default();
    assert!(!update.is_noop_for(&flags));
    update.apply_to(&mut flags);
    assert!(update.is_noop_for(&flags));
  }

  #[test]
  fn seeded_flags_carry_their_change_time() {
    let ident = PersonIdent::new("01017012345").unwrap();
    let update = FlagUpdate::Task { kind: TaskKind::PractitionerReply, pending: true };
    let seed = NewPersonStatus::with_flags(ident, &update, at(30));

    assert_eq!(seed.flags.practitioner_reply_pending, Some(true));
    assert_eq!(seed.flags.task_updated_at(TaskKind::PractitionerReply), Some(at(30)));
    assert_eq!(seed.flags.meeting_need_updated_at, None);
    assert_eq!(seed.flags.reminder_updated_at, None);
  }

  #[test]
  fn replay_check_ignores_change_time() {
    let update = FlagUpdate::LateFollowUp { active: true };
    let mut flags = TaskFlags::default();
    update.apply_to(&mut flags);
    update.stamp(&mut flags, at(40));
    assert!(update.is_noop_for(&flags));
    assert_eq!(flags.late_follow_up_updated_at, Some(at(40)));
  }

  #[test]
  fn candidate_without_upcoming_meeting_is_active() {
    let mut flags = TaskFlags {
      dialog_meeting_candidate: Some(Generated { value: true, generated_at: at(10) }),
      ..Default::default()
    };
    assert!(flags.has_active_task());

    flags.dialog_meeting_status =
      Some(Generated { value: MeetingStatus::Invited, generated_at: at(20) });
    assert!(!flags.has_active_task());
  }

  #[test]
  fn handled_tasks_are_not_active() {
    let flags = TaskFlags {
      meeting_need_pending: Some(false),
      reminder_active: Some(false),
      ..Default::default()
    };
    assert!(!flags.has_active_task());
  }
}
