//! The shared ingestion pipeline and the per-stream event categories.
//!
//! Every upstream stream is an [`EventCategory`]: it names its payload type,
//! its business key and recency ordering for in-batch deduplication, and the
//! rule that applies one event to the repository. The pipeline around it is
//! the same for all categories:
//!
//! 1. [`decode_batch`] drops and counts tombstones, decodes payloads, and
//!    keeps only the most recent event per business key.
//! 2. [`EventCategory::prepare`] runs any asynchronous checks that must
//!    happen before writing (identity-change verification).
//! 3. [`apply_batch`] applies every retained event inside one transaction,
//!    retrying a transiently failing record once.

mod assessment;
mod assignment;
mod dialog_meeting;
mod identity_change;
mod person_info;
mod person_task;
mod reminder;
mod timeline;

use std::{collections::HashMap, future::Future, hash::Hash, sync::Arc};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use assessment::{
  ActivityRequirementCategory, ActivityRequirementEvent, AssessmentEvent,
  LackOfCooperationCategory, LateFollowUpCategory,
};
pub use assignment::{AssignmentEvent, CaseworkerAssignmentCategory};
pub use dialog_meeting::{
  DialogMeetingCandidateCategory, DialogMeetingCandidateEvent, DialogMeetingStatusCategory,
  DialogMeetingStatusEvent,
};
pub use identity_change::{
  IdentifierKind, IdentityChangeCategory, IdentityChangeEvent, IdentityKey, MergePlan,
  RegisteredIdentifier,
};
pub use person_info::{PersonInfoCategory, PersonInfoEvent};
pub use person_task::{PersonTaskCategory, PersonTaskEvent, TaskEventKind, TaskTransition};
pub use reminder::{ReminderCategory, ReminderEvent};
pub use timeline::{TimelineCategory, TimelineEvent, TimelinePeriod};

use crate::{
  Error,
  error::StoreError,
  ident::PersonIdent,
  rules::{Decision, Discard, decide_flags},
  source::RawRecord,
  status::{FlagUpdate, NewPersonStatus},
  store::{AggregateRepository, AggregateStore, in_savepoint},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What happened to one retained event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Created,
  Updated,
  Stale,
  Unchanged,
  /// The event carries nothing this system tracks (e.g. an empty timeline).
  Skipped,
}

impl From<Discard> for Outcome {
  fn from(discard: Discard) -> Self {
    match discard {
      Discard::Stale => Self::Stale,
      Discard::Unchanged => Self::Unchanged,
    }
  }
}

/// Per-batch counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
  pub received:   usize,
  pub tombstones: usize,
  pub duplicates: usize,
  pub created:    usize,
  pub updated:    usize,
  pub stale:      usize,
  pub unchanged:  usize,
  pub skipped:    usize,
}

impl BatchReport {
  fn record(&mut self, outcome: Outcome) {
    match outcome {
      Outcome::Created => self.created += 1,
      Outcome::Updated => self.updated += 1,
      Outcome::Stale => self.stale += 1,
      Outcome::Unchanged => self.unchanged += 1,
      Outcome::Skipped => self.skipped += 1,
    }
  }
}

// ─── Category trait ──────────────────────────────────────────────────────────

/// One upstream event stream and its reconciliation rule.
pub trait EventCategory: Send + Sync + 'static {
  type Event: DeserializeOwned + Send + Sync + 'static;
  /// Business key; at most one event per key survives a batch.
  type Key: Eq + Hash;
  /// Orders events sharing a key. Ties go to the later offset.
  type Recency: Ord;

  /// Stream name, used for topics, logs and metrics.
  const NAME: &'static str;

  fn key(event: &Self::Event) -> Self::Key;

  fn recency(event: &Self::Event) -> Self::Recency;

  /// Asynchronous checks run before the batch transaction opens.
  fn prepare<'a, S: AggregateStore>(
    &'a self,
    _store: &'a S,
    _events: &'a [Self::Event],
  ) -> impl Future<Output = Result<(), S::Error>> + Send + 'a {
    std::future::ready(Ok(()))
  }

  /// Apply one event. Must be safe to run twice for the same event.
  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &Self::Event,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E>;
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// The valid, deduplicated part of a polled batch.
#[derive(Debug)]
pub struct DecodedBatch<T> {
  pub events:     Vec<T>,
  pub received:   usize,
  pub tombstones: usize,
  pub duplicates: usize,
}

/// Split tombstones, decode payloads, and keep the most recent event per
/// business key. Retained events keep their offset order.
pub fn decode_batch<C: EventCategory>(
  records: &[RawRecord],
) -> Result<DecodedBatch<C::Event>, Error> {
  let mut slots: Vec<Option<C::Event>> = Vec::with_capacity(records.len());
  let mut latest: HashMap<C::Key, usize> = HashMap::new();
  let mut tombstones = 0;
  let mut duplicates = 0;

  for record in records {
    let Some(value) = record.value.as_deref() else {
      tombstones += 1;
      continue;
    };

    let event: C::Event = serde_json::from_str(value).map_err(|source| Error::Decode {
      category: C::NAME,
      offset: record.offset,
      source,
    })?;

    let slot = slots.len();
    match latest.get(&C::key(&event)).copied() {
      Some(previous) => {
        duplicates += 1;
        let keep_new = slots[previous]
          .as_ref()
          .is_none_or(|kept| C::recency(&event) >= C::recency(kept));
        if keep_new {
          slots[previous] = None;
          latest.insert(C::key(&event), slot);
          slots.push(Some(event));
        }
      }
      None => {
        latest.insert(C::key(&event), slot);
        slots.push(Some(event));
      }
    }
  }

  if tombstones > 0 {
    debug!(category = C::NAME, tombstones, "skipped tombstones");
  }

  Ok(DecodedBatch {
    events: slots.into_iter().flatten().collect(),
    received: records.len(),
    tombstones,
    duplicates,
  })
}

// ─── Applying ────────────────────────────────────────────────────────────────

/// Run `op`, and run it once more if the first failure is transient.
pub fn retry_once<T, E: StoreError>(
  category: &'static str,
  mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
  match op() {
    Err(error) if error.is_transient() => {
      warn!(category, %error, "transient storage failure, retrying once");
      op()
    }
    result => result,
  }
}

/// Apply every event of a decoded batch through `repo`. Each attempt runs in
/// its own savepoint, so a retried event never sees its own partial writes.
pub fn apply_batch<C: EventCategory, E: StoreError>(
  category: &C,
  repo: &dyn AggregateRepository<Error = E>,
  events: &[C::Event],
  now: DateTime<Utc>,
) -> Result<BatchReport, E> {
  let mut report = BatchReport::default();
  for event in events {
    let outcome = retry_once(C::NAME, || {
      in_savepoint(repo, || category.apply(repo, event, now))
    })?;
    if outcome == Outcome::Stale {
      debug!(category = C::NAME, "discarded stale event");
    }
    report.record(outcome);
  }
  Ok(report)
}

/// Decode, prepare and apply one polled batch. All writes of the batch
/// commit together or not at all.
pub async fn process_batch<C: EventCategory, S: AggregateStore>(
  category: &Arc<C>,
  store: &S,
  records: &[RawRecord],
) -> Result<BatchReport, S::Error> {
  let batch = decode_batch::<C>(records)?;
  let mut report = BatchReport::default();

  if !batch.events.is_empty() {
    category.prepare(store, &batch.events).await?;

    let category = Arc::clone(category);
    let events = batch.events;
    let now = Utc::now();
    report = store
      .transact(move |repo| apply_batch(&*category, repo, &events, now))
      .await?;
  }

  report.received = batch.received;
  report.tombstones = batch.tombstones;
  report.duplicates = batch.duplicates;
  Ok(report)
}

// ─── Shared rule application ─────────────────────────────────────────────────

/// Apply a flag update under [`decide_flags`], creating the aggregate if the
/// person is unseen.
pub(crate) fn apply_flag_update<E: StoreError>(
  repo: &dyn AggregateRepository<Error = E>,
  ident: &PersonIdent,
  update: &FlagUpdate,
  now: DateTime<Utc>,
) -> Result<Outcome, E> {
  let stored = repo.get(ident)?;
  match decide_flags(stored.as_ref(), update) {
    Decision::Create => {
      repo.create(&NewPersonStatus::with_flags(ident.clone(), update, now), now)?;
      Ok(Outcome::Created)
    }
    Decision::Update => {
      repo.update_flags(ident, update, now)?;
      Ok(Outcome::Updated)
    }
    Decision::Discard(discard) => Ok(discard.into()),
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn record(offset: i64, value: Option<&str>) -> RawRecord {
    RawRecord {
      offset,
      key: format!("key-{offset}"),
      value: value.map(str::to_owned),
      published_at: Utc.timestamp_opt(0, 0).unwrap(),
    }
  }

  fn candidate_json(ident: &str, candidate: bool, created_at: &str) -> String {
    format!(
      r#"{{"uuid":"6f1c1a2e-34f5-4b8e-9a55-3c1f0b0d1e2a","createdAt":"{created_at}","personIdent":"{ident}","candidate":{candidate}}}"#
    )
  }

  #[test]
  fn tombstones_are_counted_not_decoded() {
    let records = vec![record(0, None), record(1, None)];
    let batch = decode_batch::<DialogMeetingCandidateCategory>(&records).unwrap();
    assert!(batch.events.is_empty());
    assert_eq!(batch.tombstones, 2);
    assert_eq!(batch.received, 2);
  }

  #[test]
  fn duplicates_keep_most_recent_by_recency() {
    let newest = candidate_json("01017012345", false, "2024-05-02T10:00:00Z");
    let older = candidate_json("01017012345", true, "2024-05-01T10:00:00Z");
    let other = candidate_json("02027012345", true, "2024-05-01T10:00:00Z");
    let records = vec![
      record(0, Some(&newest)),
      record(1, Some(&older)),
      record(2, Some(&other)),
    ];

    let batch = decode_batch::<DialogMeetingCandidateCategory>(&records).unwrap();
    assert_eq!(batch.duplicates, 1);
    assert_eq!(batch.events.len(), 2);
    assert!(!batch.events[0].candidate);
    assert_eq!(batch.events[1].person_ident.as_str(), "02027012345");
  }

  #[test]
  fn duplicate_tie_goes_to_later_offset() {
    let handled = r#"{"personIdent":"01017012345","kind":"MEETING_NEED_HANDLED","createdAt":"2024-05-02T10:00:00Z"}"#;
    let received = r#"{"personIdent":"01017012345","kind":"MEETING_NEED_RECEIVED","createdAt":"2024-05-02T11:00:00Z"}"#;
    let records = vec![record(0, Some(received)), record(1, Some(handled))];

    let batch = decode_batch::<PersonTaskCategory>(&records).unwrap();
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.events[0].kind, TaskEventKind::MeetingNeedHandled);
  }

  #[test]
  fn malformed_payload_fails_the_batch() {
    let records = vec![record(7, Some("{not json"))];
    let err = decode_batch::<PersonTaskCategory>(&records).unwrap_err();
    assert!(matches!(err, Error::Decode { offset: 7, .. }));
  }
}
