//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (nanosecond
//! precision, `Z` suffix) so that they sort lexically. Dates are stored as
//! `YYYY-MM-DD`. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use followup_core::{
  ident::{OrganizationNumber, PersonIdent},
  status::{Generated, MeetingStatus, OrgAssociation, PersonStatus, TaskFlags, Timeline},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(date: NaiveDate) -> String { date.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

fn decode_opt_date(s: Option<String>) -> Result<Option<NaiveDate>> {
  s.as_deref().map(decode_date).transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The column list matching [`RawPersonStatus::from_row`].
pub const PERSON_STATUS_COLUMNS: &str = "
  id, uuid, person_ident, display_name, birth_date,
  assigned_caseworker, assigned_org_unit, assigned_org_unit_updated_at,
  meeting_need_pending, meeting_need_updated_at,
  dialog_meeting_answer_pending, dialog_meeting_answer_updated_at,
  employer_assistance_pending, employer_assistance_updated_at,
  practitioner_reply_pending, practitioner_reply_updated_at,
  activity_requirement_active, activity_requirement_status,
  activity_requirement_deadline, activity_requirement_updated_at,
  lack_of_cooperation_active, lack_of_cooperation_updated_at,
  late_follow_up_active, late_follow_up_updated_at,
  reminder_active, reminder_deadline, reminder_updated_at,
  dialog_meeting_candidate, dialog_meeting_candidate_generated_at,
  dialog_meeting_status, dialog_meeting_status_generated_at,
  timeline_start, timeline_end, timeline_generated_at,
  reference_bit_uuid, reference_bit_occurred_at, sick_days,
  created_at, updated_at";

/// Raw values read directly from a `person_status` row.
pub struct RawPersonStatus {
  pub id:                                    i64,
  pub uuid:                                  String,
  pub person_ident:                          String,
  pub display_name:                          Option<String>,
  pub birth_date:                            Option<String>,
  pub assigned_caseworker:                   Option<String>,
  pub assigned_org_unit:                     Option<String>,
  pub assigned_org_unit_updated_at:          Option<String>,
  pub meeting_need_pending:                  Option<bool>,
  pub meeting_need_updated_at:               Option<String>,
  pub dialog_meeting_answer_pending:         Option<bool>,
  pub dialog_meeting_answer_updated_at:      Option<String>,
  pub employer_assistance_pending:           Option<bool>,
  pub employer_assistance_updated_at:        Option<String>,
  pub practitioner_reply_pending:            Option<bool>,
  pub practitioner_reply_updated_at:         Option<String>,
  pub activity_requirement_active:           Option<bool>,
  pub activity_requirement_status:           Option<String>,
  pub activity_requirement_deadline:         Option<String>,
  pub activity_requirement_updated_at:       Option<String>,
  pub lack_of_cooperation_active:            Option<bool>,
  pub lack_of_cooperation_updated_at:        Option<String>,
  pub late_follow_up_active:                 Option<bool>,
  pub late_follow_up_updated_at:             Option<String>,
  pub reminder_active:                       Option<bool>,
  pub reminder_deadline:                     Option<String>,
  pub reminder_updated_at:                   Option<String>,
  pub dialog_meeting_candidate:              Option<bool>,
  pub dialog_meeting_candidate_generated_at: Option<String>,
  pub dialog_meeting_status:                 Option<String>,
  pub dialog_meeting_status_generated_at:    Option<String>,
  pub timeline_start:                        Option<String>,
  pub timeline_end:                          Option<String>,
  pub timeline_generated_at:                 Option<String>,
  pub reference_bit_uuid:                    Option<String>,
  pub reference_bit_occurred_at:             Option<String>,
  pub sick_days:                             Option<u32>,
  pub created_at:                            String,
  pub updated_at:                            String,
}

impl RawPersonStatus {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                                    row.get("id")?,
      uuid:                                  row.get("uuid")?,
      person_ident:                          row.get("person_ident")?,
      display_name:                          row.get("display_name")?,
      birth_date:                            row.get("birth_date")?,
      assigned_caseworker:                   row.get("assigned_caseworker")?,
      assigned_org_unit:                     row.get("assigned_org_unit")?,
      assigned_org_unit_updated_at:          row.get("assigned_org_unit_updated_at")?,
      meeting_need_pending:                  row.get("meeting_need_pending")?,
      meeting_need_updated_at:               row.get("meeting_need_updated_at")?,
      dialog_meeting_answer_pending:         row.get("dialog_meeting_answer_pending")?,
      dialog_meeting_answer_updated_at:      row.get("dialog_meeting_answer_updated_at")?,
      employer_assistance_pending:           row.get("employer_assistance_pending")?,
      employer_assistance_updated_at:        row.get("employer_assistance_updated_at")?,
      practitioner_reply_pending:            row.get("practitioner_reply_pending")?,
      practitioner_reply_updated_at:         row.get("practitioner_reply_updated_at")?,
      activity_requirement_active:           row.get("activity_requirement_active")?,
      activity_requirement_status:           row.get("activity_requirement_status")?,
      activity_requirement_deadline:         row.get("activity_requirement_deadline")?,
      activity_requirement_updated_at:       row.get("activity_requirement_updated_at")?,
      lack_of_cooperation_active:            row.get("lack_of_cooperation_active")?,
      lack_of_cooperation_updated_at:        row.get("lack_of_cooperation_updated_at")?,
      late_follow_up_active:                 row.get("late_follow_up_active")?,
      late_follow_up_updated_at:             row.get("late_follow_up_updated_at")?,
      reminder_active:                       row.get("reminder_active")?,
      reminder_deadline:                     row.get("reminder_deadline")?,
      reminder_updated_at:                   row.get("reminder_updated_at")?,
      dialog_meeting_candidate:              row.get("dialog_meeting_candidate")?,
      dialog_meeting_candidate_generated_at: row.get("dialog_meeting_candidate_generated_at")?,
      dialog_meeting_status:                 row.get("dialog_meeting_status")?,
      dialog_meeting_status_generated_at:    row.get("dialog_meeting_status_generated_at")?,
      timeline_start:                        row.get("timeline_start")?,
      timeline_end:                          row.get("timeline_end")?,
      timeline_generated_at:                 row.get("timeline_generated_at")?,
      reference_bit_uuid:                    row.get("reference_bit_uuid")?,
      reference_bit_occurred_at:             row.get("reference_bit_occurred_at")?,
      sick_days:                             row.get("sick_days")?,
      created_at:                            row.get("created_at")?,
      updated_at:                            row.get("updated_at")?,
    })
  }

  /// Decode into a [`PersonStatus`], attaching the already-decoded
  /// organization associations to the timeline.
  pub fn into_status(self, organizations: Vec<OrgAssociation>) -> Result<PersonStatus> {
    let dialog_meeting_candidate = match (
      self.dialog_meeting_candidate,
      self.dialog_meeting_candidate_generated_at,
    ) {
      (Some(value), Some(at)) => Some(Generated { value, generated_at: decode_dt(&at)? }),
      _ => None,
    };

    let dialog_meeting_status = match (
      self.dialog_meeting_status,
      self.dialog_meeting_status_generated_at,
    ) {
      (Some(value), Some(at)) => Some(Generated {
        value:        value.parse::<MeetingStatus>().map_err(Error::DateParse)?,
        generated_at: decode_dt(&at)?,
      }),
      _ => None,
    };

    let flags = TaskFlags {
      meeting_need_pending: self.meeting_need_pending,
      meeting_need_updated_at: decode_opt_dt(self.meeting_need_updated_at)?,
      dialog_meeting_answer_pending: self.dialog_meeting_answer_pending,
      dialog_meeting_answer_updated_at: decode_opt_dt(self.dialog_meeting_answer_updated_at)?,
      employer_assistance_pending: self.employer_assistance_pending,
      employer_assistance_updated_at: decode_opt_dt(self.employer_assistance_updated_at)?,
      practitioner_reply_pending: self.practitioner_reply_pending,
      practitioner_reply_updated_at: decode_opt_dt(self.practitioner_reply_updated_at)?,
      activity_requirement_active: self.activity_requirement_active,
      activity_requirement_status: self.activity_requirement_status,
      activity_requirement_deadline: decode_opt_date(self.activity_requirement_deadline)?,
      activity_requirement_updated_at: decode_opt_dt(self.activity_requirement_updated_at)?,
      lack_of_cooperation_active: self.lack_of_cooperation_active,
      lack_of_cooperation_updated_at: decode_opt_dt(self.lack_of_cooperation_updated_at)?,
      late_follow_up_active: self.late_follow_up_active,
      late_follow_up_updated_at: decode_opt_dt(self.late_follow_up_updated_at)?,
      reminder_active: self.reminder_active,
      reminder_deadline: decode_opt_date(self.reminder_deadline)?,
      reminder_updated_at: decode_opt_dt(self.reminder_updated_at)?,
      dialog_meeting_candidate,
      dialog_meeting_status,
    };

    let timeline = match (
      self.timeline_start,
      self.timeline_end,
      self.reference_bit_uuid,
      self.reference_bit_occurred_at,
    ) {
      (Some(start), Some(end), Some(bit_uuid), Some(bit_at)) => Some(Timeline {
        start: decode_date(&start)?,
        end: decode_date(&end)?,
        generated_at: decode_opt_dt(self.timeline_generated_at)?,
        reference_bit_uuid: decode_uuid(&bit_uuid)?,
        reference_bit_occurred_at: decode_dt(&bit_at)?,
        sick_days: self.sick_days,
        organizations,
      }),
      _ => None,
    };

    Ok(PersonStatus {
      id: self.id,
      uuid: decode_uuid(&self.uuid)?,
      person_ident: PersonIdent::new(self.person_ident)?,
      display_name: self.display_name,
      birth_date: decode_opt_date(self.birth_date)?,
      assigned_caseworker: self.assigned_caseworker,
      assigned_org_unit: self.assigned_org_unit,
      assigned_org_unit_updated_at: decode_opt_dt(self.assigned_org_unit_updated_at)?,
      flags,
      timeline,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `person_organization` row.
pub struct RawOrgAssociation {
  pub organization_number: String,
  pub name:                Option<String>,
  pub uuid:                String,
  pub created_at:          String,
}

impl RawOrgAssociation {
  pub fn into_association(self) -> Result<OrgAssociation> {
    Ok(OrgAssociation {
      number:     OrganizationNumber::new(self.organization_number)?,
      name:       self.name,
      uuid:       decode_uuid(&self.uuid)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
