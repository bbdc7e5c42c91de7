//! [`SqliteStore`], the SQLite implementation of [`AggregateStore`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use followup_core::{
  ident::{OrganizationNumber, PersonIdent},
  rules::diff_organizations,
  status::{FlagUpdate, NewPersonStatus, OrgAssociation, PersonStatus, TaskKind, Timeline},
  store::{AggregateRepository, AggregateStore, SearchCriteria},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    PERSON_STATUS_COLUMNS, RawOrgAssociation, RawPersonStatus, encode_date, encode_dt,
    encode_uuid,
  },
  event_log::SqliteEventLog,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The follow-up aggregate store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Publish one record to `topic`. A `None` value is a tombstone. Returns
  /// the record's offset.
  pub async fn append(
    &self,
    topic: &str,
    key: &str,
    value: Option<String>,
  ) -> Result<i64> {
    let topic = topic.to_owned();
    let key = key.to_owned();
    let at_str = encode_dt(Utc::now());

    let offset = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let offset: i64 = tx.query_row(
          "SELECT COALESCE(MAX(record_offset) + 1, 0) FROM event_log WHERE topic = ?1",
          rusqlite::params![topic],
          |row| row.get(0),
        )?;
        tx.execute(
          "INSERT INTO event_log (topic, record_offset, record_key, value, published_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![topic, offset, key, value, at_str],
        )?;
        tx.commit()?;
        Ok(offset)
      })
      .await?;
    Ok(offset)
  }

  /// A consumer of `topic` for `group`, positioned at the group's last
  /// committed offset.
  pub async fn event_log(&self, topic: &str, group: &str) -> Result<SqliteEventLog> {
    SqliteEventLog::open(self.conn.clone(), topic, group).await
  }
}

// ─── AggregateStore impl ─────────────────────────────────────────────────────

impl AggregateStore for SqliteStore {
  type Error = Error;

  async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&dyn AggregateRepository<Error = Error>) -> Result<T> + Send + 'static,
  {
    // The inner result is the closure's own; only a failed commit or a
    // closed connection surfaces through the outer one. Dropping an
    // uncommitted transaction rolls it back.
    self
      .conn
      .call(move |conn| {
        // Take the write lock up front rather than on the first write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&SqliteRepository { conn: &tx });
        if result.is_ok() {
          tx.commit()?;
        }
        Ok(result)
      })
      .await?
  }
}

// ─── Repository ──────────────────────────────────────────────────────────────

/// An [`AggregateRepository`] bound to one open transaction.
pub struct SqliteRepository<'a> {
  conn: &'a Connection,
}

/// The marker column of a task kind and the column recording when it last
/// changed.
fn task_columns(kind: TaskKind) -> (&'static str, &'static str) {
  match kind {
    TaskKind::MeetingNeed => ("meeting_need_pending", "meeting_need_updated_at"),
    TaskKind::DialogMeetingAnswer => {
      ("dialog_meeting_answer_pending", "dialog_meeting_answer_updated_at")
    }
    TaskKind::EmployerAssistance => {
      ("employer_assistance_pending", "employer_assistance_updated_at")
    }
    TaskKind::PractitionerReply => {
      ("practitioner_reply_pending", "practitioner_reply_updated_at")
    }
  }
}

/// Display names are matched on a Unicode lowercase copy; SQLite's own
/// `lower()` only folds ASCII.
fn search_key(display_name: Option<&str>) -> Option<String> {
  display_name.map(str::to_lowercase)
}

const SAVEPOINT: &str = "SAVEPOINT apply_event";
const RELEASE: &str = "RELEASE apply_event";
const ROLLBACK_TO: &str = "ROLLBACK TO apply_event; RELEASE apply_event";

fn sql_limit(limit: usize) -> i64 { i64::try_from(limit).unwrap_or(i64::MAX) }

/// Every update targets exactly one row; zero rows means the caller raced a
/// delete or merge.
fn touched(changed: usize, ident: &PersonIdent) -> Result<()> {
  if changed == 0 {
    return Err(followup_core::Error::NotFound(ident.clone()).into());
  }
  Ok(())
}

impl SqliteRepository<'_> {
  fn person_status_id(&self, ident: &PersonIdent) -> Result<i64> {
    self
      .conn
      .query_row(
        "SELECT id FROM person_status WHERE person_ident = ?1",
        rusqlite::params![ident.as_str()],
        |row| row.get(0),
      )
      .optional()?
      .ok_or_else(|| followup_core::Error::NotFound(ident.clone()).into())
  }

  fn organizations(&self, person_status_id: i64) -> Result<Vec<OrgAssociation>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT organization_number, name, uuid, created_at
       FROM person_organization
       WHERE person_status_id = ?1
       ORDER BY id",
    )?;
    let raws = stmt
      .query_map(rusqlite::params![person_status_id], |row| {
        Ok(RawOrgAssociation {
          organization_number: row.get(0)?,
          name:                row.get(1)?,
          uuid:                row.get(2)?,
          created_at:          row.get(3)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(RawOrgAssociation::into_association).collect()
  }

  fn insert_organization(&self, person_status_id: i64, org: &OrgAssociation) -> Result<()> {
    self.conn.execute(
      "INSERT INTO person_organization
         (person_status_id, organization_number, name, uuid, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        person_status_id,
        org.number.as_str(),
        org.name,
        encode_uuid(org.uuid),
        encode_dt(org.created_at),
      ],
    )?;
    Ok(())
  }

  fn hydrate(&self, raw: RawPersonStatus) -> Result<PersonStatus> {
    let organizations = self.organizations(raw.id)?;
    raw.into_status(organizations)
  }

  /// Full aggregates matching `condition`, in surrogate-key order.
  fn select_where(
    &self,
    condition: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<PersonStatus>> {
    let sql = format!(
      "SELECT {PERSON_STATUS_COLUMNS} FROM person_status WHERE {condition} ORDER BY id"
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let raws = stmt
      .query_map(params, RawPersonStatus::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(|raw| self.hydrate(raw)).collect()
  }

  fn select_idents(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<PersonIdent>> {
    let mut stmt = self.conn.prepare(sql)?;
    let idents = stmt
      .query_map(params, |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(
      idents
        .into_iter()
        .map(PersonIdent::new)
        .collect::<Result<Vec<_>, _>>()?,
    )
  }
}

impl AggregateRepository for SqliteRepository<'_> {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get(&self, ident: &PersonIdent) -> Result<Option<PersonStatus>> {
    let sql = format!(
      "SELECT {PERSON_STATUS_COLUMNS} FROM person_status WHERE person_ident = ?1"
    );
    let raw = self
      .conn
      .query_row(&sql, rusqlite::params![ident.as_str()], RawPersonStatus::from_row)
      .optional()?;

    raw.map(|raw| self.hydrate(raw)).transpose()
  }

  fn search(&self, criteria: &SearchCriteria) -> Result<Vec<PersonStatus>> {
    match criteria {
      SearchCriteria::NameAndBirthDate { name, birth_date } => self.select_where(
        "birth_date = ?1 AND instr(display_name_search, ?2) > 0",
        rusqlite::params![encode_date(*birth_date), name.to_lowercase()],
      ),
      SearchCriteria::BirthDate(birth_date) => {
        self.select_where("birth_date = ?1", rusqlite::params![encode_date(*birth_date)])
      }
      SearchCriteria::Caseworker(caseworker) => {
        self.select_where("assigned_caseworker = ?1", rusqlite::params![caseworker])
      }
      SearchCriteria::OrgUnit(org_unit) => {
        let mut found =
          self.select_where("assigned_org_unit = ?1", rusqlite::params![org_unit])?;
        found.retain(|status| status.flags.has_active_task());
        Ok(found)
      }
    }
  }

  fn list_missing_person_info(
    &self,
    attempted_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<PersonIdent>> {
    self.select_idents(
      "SELECT person_ident FROM person_status
       WHERE (display_name IS NULL OR birth_date IS NULL)
         AND (person_info_attempted_at IS NULL OR person_info_attempted_at < ?1)
       ORDER BY person_info_attempted_at IS NOT NULL, person_info_attempted_at, id
       LIMIT ?2",
      rusqlite::params![encode_dt(attempted_before), sql_limit(limit)],
    )
  }

  fn list_organizations_missing_name(
    &self,
    attempted_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<OrganizationNumber>> {
    let mut stmt = self.conn.prepare(
      "SELECT organization_number FROM person_organization
       WHERE name IS NULL
         AND (name_attempted_at IS NULL OR name_attempted_at < ?1)
       GROUP BY organization_number
       ORDER BY MIN(name_attempted_at IS NOT NULL), MAX(name_attempted_at),
                organization_number
       LIMIT ?2",
    )?;
    let numbers = stmt
      .query_map(
        rusqlite::params![encode_dt(attempted_before), sql_limit(limit)],
        |row| row.get::<_, String>(0),
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(
      numbers
        .into_iter()
        .map(OrganizationNumber::new)
        .collect::<Result<Vec<_>, _>>()?,
    )
  }

  fn list_due_for_org_unit_refresh(
    &self,
    resolved_before: DateTime<Utc>,
    attempted_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<PersonIdent>> {
    self.select_idents(
      "SELECT person_ident FROM person_status
       WHERE (assigned_org_unit_updated_at IS NULL OR assigned_org_unit_updated_at < ?1)
         AND (org_unit_attempted_at IS NULL OR org_unit_attempted_at < ?2)
       ORDER BY org_unit_attempted_at IS NOT NULL, org_unit_attempted_at, id
       LIMIT ?3",
      rusqlite::params![
        encode_dt(resolved_before),
        encode_dt(attempted_before),
        sql_limit(limit)
      ],
    )
  }

  // ── Writes ────────────────────────────────────────────────────────────

  fn create(&self, input: &NewPersonStatus, now: DateTime<Utc>) -> Result<PersonStatus> {
    let ident = &input.person_ident;
    let exists = self
      .conn
      .query_row(
        "SELECT 1 FROM person_status WHERE person_ident = ?1",
        rusqlite::params![ident.as_str()],
        |_| Ok(()),
      )
      .optional()?
      .is_some();
    if exists {
      return Err(followup_core::Error::AlreadyExists(ident.clone()).into());
    }

    let flags = &input.flags;
    let timeline = input.timeline.as_ref();
    let now_str = encode_dt(now);

    self.conn.execute(
      "INSERT INTO person_status (
         uuid, person_ident, display_name, display_name_search, birth_date,
         assigned_caseworker, assigned_org_unit,
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
         created_at, updated_at
       ) VALUES (
         :uuid, :person_ident, :display_name, :display_name_search, :birth_date,
         :assigned_caseworker, :assigned_org_unit,
         :meeting_need_pending, :meeting_need_updated_at,
         :dialog_meeting_answer_pending, :dialog_meeting_answer_updated_at,
         :employer_assistance_pending, :employer_assistance_updated_at,
         :practitioner_reply_pending, :practitioner_reply_updated_at,
         :activity_requirement_active, :activity_requirement_status,
         :activity_requirement_deadline, :activity_requirement_updated_at,
         :lack_of_cooperation_active, :lack_of_cooperation_updated_at,
         :late_follow_up_active, :late_follow_up_updated_at,
         :reminder_active, :reminder_deadline, :reminder_updated_at,
         :dialog_meeting_candidate, :dialog_meeting_candidate_generated_at,
         :dialog_meeting_status, :dialog_meeting_status_generated_at,
         :timeline_start, :timeline_end, :timeline_generated_at,
         :reference_bit_uuid, :reference_bit_occurred_at, :sick_days,
         :now, :now
       )",
      rusqlite::named_params! {
        ":uuid": encode_uuid(Uuid::new_v4()),
        ":person_ident": ident.as_str(),
        ":display_name": input.display_name,
        ":display_name_search": search_key(input.display_name.as_deref()),
        ":birth_date": input.birth_date.map(encode_date),
        ":assigned_caseworker": input.assigned_caseworker,
        ":assigned_org_unit": input.assigned_org_unit,
        ":meeting_need_pending": flags.meeting_need_pending,
        ":meeting_need_updated_at": flags.meeting_need_updated_at.map(encode_dt),
        ":dialog_meeting_answer_pending": flags.dialog_meeting_answer_pending,
        ":dialog_meeting_answer_updated_at":
          flags.dialog_meeting_answer_updated_at.map(encode_dt),
        ":employer_assistance_pending": flags.employer_assistance_pending,
        ":employer_assistance_updated_at": flags.employer_assistance_updated_at.map(encode_dt),
        ":practitioner_reply_pending": flags.practitioner_reply_pending,
        ":practitioner_reply_updated_at": flags.practitioner_reply_updated_at.map(encode_dt),
        ":activity_requirement_active": flags.activity_requirement_active,
        ":activity_requirement_status": flags.activity_requirement_status,
        ":activity_requirement_deadline": flags.activity_requirement_deadline.map(encode_date),
        ":activity_requirement_updated_at":
          flags.activity_requirement_updated_at.map(encode_dt),
        ":lack_of_cooperation_active": flags.lack_of_cooperation_active,
        ":lack_of_cooperation_updated_at": flags.lack_of_cooperation_updated_at.map(encode_dt),
        ":late_follow_up_active": flags.late_follow_up_active,
        ":late_follow_up_updated_at": flags.late_follow_up_updated_at.map(encode_dt),
        ":reminder_active": flags.reminder_active,
        ":reminder_deadline": flags.reminder_deadline.map(encode_date),
        ":reminder_updated_at": flags.reminder_updated_at.map(encode_dt),
        ":dialog_meeting_candidate": flags.dialog_meeting_candidate.as_ref().map(|c| c.value),
        ":dialog_meeting_candidate_generated_at":
          flags.dialog_meeting_candidate.as_ref().map(|c| encode_dt(c.generated_at)),
        ":dialog_meeting_status": flags.dialog_meeting_status.as_ref().map(|s| s.value.as_str()),
        ":dialog_meeting_status_generated_at":
          flags.dialog_meeting_status.as_ref().map(|s| encode_dt(s.generated_at)),
        ":timeline_start": timeline.map(|t| encode_date(t.start)),
        ":timeline_end": timeline.map(|t| encode_date(t.end)),
        ":timeline_generated_at": timeline.and_then(|t| t.generated_at).map(encode_dt),
        ":reference_bit_uuid": timeline.map(|t| encode_uuid(t.reference_bit_uuid)),
        ":reference_bit_occurred_at": timeline.map(|t| encode_dt(t.reference_bit_occurred_at)),
        ":sick_days": timeline.and_then(|t| t.sick_days),
        ":now": now_str,
      },
    )?;

    let id = self.conn.last_insert_rowid();
    if let Some(timeline) = timeline {
      for org in &timeline.organizations {
        self.insert_organization(id, org)?;
      }
    }

    self
      .get(ident)?
      .ok_or_else(|| followup_core::Error::NotFound(ident.clone()).into())
  }

  fn update_flags(
    &self,
    ident: &PersonIdent,
    update: &FlagUpdate,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let key = ident.as_str();
    let now_str = encode_dt(now);

    let changed = match update {
      FlagUpdate::Task { kind, pending } => {
        let (column, changed_column) = task_columns(*kind);
        self.conn.execute(
          &format!(
            "UPDATE person_status SET {column} = ?2, {changed_column} = ?3, updated_at = ?3
             WHERE person_ident = ?1"
          ),
          rusqlite::params![key, pending, now_str],
        )?
      }
      FlagUpdate::ActivityRequirement { active, status, deadline } => self.conn.execute(
        "UPDATE person_status
         SET activity_requirement_active = ?2,
             activity_requirement_status = ?3,
             activity_requirement_deadline = ?4,
             activity_requirement_updated_at = ?5,
             updated_at = ?5
         WHERE person_ident = ?1",
        rusqlite::params![key, active, status, deadline.map(encode_date), now_str],
      )?,
      FlagUpdate::LackOfCooperation { active } => self.conn.execute(
        "UPDATE person_status
         SET lack_of_cooperation_active = ?2, lack_of_cooperation_updated_at = ?3, updated_at = ?3
         WHERE person_ident = ?1",
        rusqlite::params![key, active, now_str],
      )?,
      FlagUpdate::LateFollowUp { active } => self.conn.execute(
        "UPDATE person_status
         SET late_follow_up_active = ?2, late_follow_up_updated_at = ?3, updated_at = ?3
         WHERE person_ident = ?1",
        rusqlite::params![key, active, now_str],
      )?,
      FlagUpdate::Reminder { active, deadline } => self.conn.execute(
        "UPDATE person_status
         SET reminder_active = ?2,
             reminder_deadline = ?3,
             reminder_updated_at = ?4,
             updated_at = ?4
         WHERE person_ident = ?1",
        rusqlite::params![key, active, deadline.map(encode_date), now_str],
      )?,
      FlagUpdate::DialogMeetingCandidate(candidate) => self.conn.execute(
        "UPDATE person_status
         SET dialog_meeting_candidate = ?2,
             dialog_meeting_candidate_generated_at = ?3,
             updated_at = ?4
         WHERE person_ident = ?1",
        rusqlite::params![key, candidate.value, encode_dt(candidate.generated_at), now_str],
      )?,
      FlagUpdate::DialogMeetingStatus(status) => self.conn.execute(
        "UPDATE person_status
         SET dialog_meeting_status = ?2,
             dialog_meeting_status_generated_at = ?3,
             updated_at = ?4
         WHERE person_ident = ?1",
        rusqlite::params![key, status.value.as_str(), encode_dt(status.generated_at), now_str],
      )?,
    };
    touched(changed, ident)
  }

  fn update_timeline(
    &self,
    ident: &PersonIdent,
    timeline: &Timeline,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let id = self.person_status_id(ident)?;

    self.conn.execute(
      "UPDATE person_status
       SET timeline_start = ?2,
           timeline_end = ?3,
           timeline_generated_at = ?4,
           reference_bit_uuid = ?5,
           reference_bit_occurred_at = ?6,
           sick_days = ?7,
           updated_at = ?8
       WHERE id = ?1",
      rusqlite::params![
        id,
        encode_date(timeline.start),
        encode_date(timeline.end),
        timeline.generated_at.map(encode_dt),
        encode_uuid(timeline.reference_bit_uuid),
        encode_dt(timeline.reference_bit_occurred_at),
        timeline.sick_days,
        encode_dt(now),
      ],
    )?;

    let stored = self.organizations(id)?;
    let candidate: Vec<OrganizationNumber> =
      timeline.organizations.iter().map(|org| org.number.clone()).collect();
    let diff = diff_organizations(&stored, &candidate);

    for number in &diff.deleted {
      self.conn.execute(
        "DELETE FROM person_organization
         WHERE person_status_id = ?1 AND organization_number = ?2",
        rusqlite::params![id, number.as_str()],
      )?;
    }
    for number in &diff.inserted {
      let org = timeline
        .organizations
        .iter()
        .find(|org| &org.number == number)
        .cloned()
        .unwrap_or_else(|| OrgAssociation::new(number.clone(), now));
      self.insert_organization(id, &org)?;
    }
    Ok(())
  }

  fn update_person_info(
    &self,
    ident: &PersonIdent,
    display_name: Option<&str>,
    birth_date: Option<NaiveDate>,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE person_status
       SET display_name = ?2, display_name_search = ?3, birth_date = ?4, updated_at = ?5
       WHERE person_ident = ?1",
      rusqlite::params![
        ident.as_str(),
        display_name,
        search_key(display_name),
        birth_date.map(encode_date),
        encode_dt(now)
      ],
    )?;
    touched(changed, ident)
  }

  fn update_assigned_org_unit(
    &self,
    ident: &PersonIdent,
    org_unit: &str,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE person_status
       SET assigned_org_unit = ?2, assigned_org_unit_updated_at = ?3, updated_at = ?3
       WHERE person_ident = ?1",
      rusqlite::params![ident.as_str(), org_unit, encode_dt(now)],
    )?;
    touched(changed, ident)
  }

  fn update_assigned_caseworker(
    &self,
    ident: &PersonIdent,
    caseworker: &str,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE person_status SET assigned_caseworker = ?2, updated_at = ?3
       WHERE person_ident = ?1",
      rusqlite::params![ident.as_str(), caseworker, encode_dt(now)],
    )?;
    touched(changed, ident)
  }

  fn remove_assigned_caseworker(&self, ident: &PersonIdent, now: DateTime<Utc>) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE person_status SET assigned_caseworker = NULL, updated_at = ?2
       WHERE person_ident = ?1",
      rusqlite::params![ident.as_str(), encode_dt(now)],
    )?;
    touched(changed, ident)
  }

  fn update_person_ident(
    &self,
    old: &PersonIdent,
    new: &PersonIdent,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE person_status SET person_ident = ?2, updated_at = ?3 WHERE person_ident = ?1",
      rusqlite::params![old.as_str(), new.as_str(), encode_dt(now)],
    )?;
    touched(changed, old)
  }

  fn delete(&self, ident: &PersonIdent) -> Result<()> {
    // Organization rows go with it (ON DELETE CASCADE).
    let changed = self.conn.execute(
      "DELETE FROM person_status WHERE person_ident = ?1",
      rusqlite::params![ident.as_str()],
    )?;
    touched(changed, ident)
  }

  fn update_organization_name(&self, number: &OrganizationNumber, name: &str) -> Result<usize> {
    Ok(self.conn.execute(
      "UPDATE person_organization SET name = ?2 WHERE organization_number = ?1",
      rusqlite::params![number.as_str(), name],
    )?)
  }

  // ── Enrichment attempts ───────────────────────────────────────────────

  fn mark_person_info_attempted(&self, ident: &PersonIdent, now: DateTime<Utc>) -> Result<()> {
    self.conn.execute(
      "UPDATE person_status SET person_info_attempted_at = ?2 WHERE person_ident = ?1",
      rusqlite::params![ident.as_str(), encode_dt(now)],
    )?;
    Ok(())
  }

  fn mark_org_unit_attempted(&self, ident: &PersonIdent, now: DateTime<Utc>) -> Result<()> {
    self.conn.execute(
      "UPDATE person_status SET org_unit_attempted_at = ?2 WHERE person_ident = ?1",
      rusqlite::params![ident.as_str(), encode_dt(now)],
    )?;
    Ok(())
  }

  fn mark_organization_name_attempted(
    &self,
    number: &OrganizationNumber,
    now: DateTime<Utc>,
  ) -> Result<()> {
    self.conn.execute(
      "UPDATE person_organization SET name_attempted_at = ?2
       WHERE organization_number = ?1 AND name IS NULL",
      rusqlite::params![number.as_str(), encode_dt(now)],
    )?;
    Ok(())
  }

  // ── Savepoints ────────────────────────────────────────────────────────

  fn savepoint(&self) -> Result<()> {
    self.conn.execute_batch(SAVEPOINT)?;
    Ok(())
  }

  fn release_savepoint(&self) -> Result<()> {
    self.conn.execute_batch(RELEASE)?;
    Ok(())
  }

  fn rollback_to_savepoint(&self) -> Result<()> {
    self.conn.execute_batch(ROLLBACK_TO)?;
    Ok(())
  }
}
