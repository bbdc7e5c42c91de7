//! Reconciliation rules: pure decisions about whether an incoming event may
//! change the stored aggregate.
//!
//! Nothing here performs I/O. Ingestion categories call these functions and
//! then issue the repository writes the decision calls for.

use std::collections::HashSet;

use chrono::{DateTime, SubsecRound, Utc};

use crate::{
  ident::OrganizationNumber,
  status::{FlagUpdate, OrgAssociation, PersonStatus, Timeline},
};

/// The outcome of applying a rule to a (possibly absent) stored aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  /// No aggregate exists; create one seeded with the event's fields.
  Create,
  /// The event supersedes the stored state.
  Update,
  Discard(Discard),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
  /// The ordering rule judges the event older than the stored state.
  Stale,
  /// Applying the event would leave the stored state as it is.
  Unchanged,
}

// ─── Timeline ────────────────────────────────────────────────────────────────

/// Drop sub-millisecond precision. Source systems disagree below the
/// millisecond, which must not read as a different occurrence.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> { at.trunc_subsecs(3) }

fn generated_after(
  candidate: Option<DateTime<Utc>>,
  stored: Option<DateTime<Utc>>,
) -> bool {
  match (candidate, stored) {
    (_, None) => true,
    (Some(candidate), Some(stored)) => candidate > stored,
    (None, Some(_)) => false,
  }
}

/// Whether `candidate` supersedes the `stored` timeline.
///
/// Reference-bit identity alone never orders two snapshots: a different bit
/// wins only if it occurred later, and ties on occurrence are broken by
/// generation time.
pub fn should_replace_timeline(stored: Option<&Timeline>, candidate: &Timeline) -> bool {
  let Some(stored) = stored else {
    return true;
  };

  if candidate.reference_bit_uuid == stored.reference_bit_uuid {
    return generated_after(candidate.generated_at, stored.generated_at);
  }

  let candidate_occurred = truncate_millis(candidate.reference_bit_occurred_at);
  let stored_occurred = truncate_millis(stored.reference_bit_occurred_at);

  if candidate_occurred == stored_occurred {
    generated_after(candidate.generated_at, stored.generated_at)
  } else {
    candidate_occurred > stored_occurred
  }
}

pub fn decide_timeline(stored: Option<&PersonStatus>, candidate: &Timeline) -> Decision {
  match stored {
    None => Decision::Create,
    Some(status) if should_replace_timeline(status.timeline.as_ref(), candidate) => {
      Decision::Update
    }
    Some(_) => Decision::Discard(Discard::Stale),
  }
}

/// How a replaced timeline's organization list maps onto the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationDiff {
  /// Present before and after; left untouched so backfilled names survive.
  pub retained: Vec<OrganizationNumber>,
  pub inserted: Vec<OrganizationNumber>,
  pub deleted:  Vec<OrganizationNumber>,
}

/// Diff the stored associations against the candidate's organization
/// numbers, keyed by number. Candidate order is preserved; duplicates are
/// collapsed.
pub fn diff_organizations(
  stored: &[OrgAssociation],
  candidate: &[OrganizationNumber],
) -> OrganizationDiff {
  let stored_numbers: HashSet<&OrganizationNumber> =
    stored.iter().map(|org| &org.number).collect();
  let mut seen: HashSet<&OrganizationNumber> = HashSet::new();

  let mut diff = OrganizationDiff::default();
  for number in candidate {
    if !seen.insert(number) {
      continue;
    }
    if stored_numbers.contains(number) {
      diff.retained.push(number.clone());
    } else {
      diff.inserted.push(number.clone());
    }
  }
  diff.deleted = stored
    .iter()
    .filter(|org| !seen.contains(&org.number))
    .map(|org| org.number.clone())
    .collect();
  diff
}

// ─── Flags ───────────────────────────────────────────────────────────────────

/// Decide a flag update. Generated values additionally require a strictly
/// newer generation time than the stored one.
pub fn decide_flags(stored: Option<&PersonStatus>, update: &FlagUpdate) -> Decision {
  let Some(status) = stored else {
    return Decision::Create;
  };

  let stale = match update {
    FlagUpdate::DialogMeetingCandidate(candidate) => status
      .flags
      .dialog_meeting_candidate
      .as_ref()
      .is_some_and(|current| candidate.generated_at <= current.generated_at),
    FlagUpdate::DialogMeetingStatus(candidate) => status
      .flags
      .dialog_meeting_status
      .as_ref()
      .is_some_and(|current| candidate.generated_at <= current.generated_at),
    _ => false,
  };

  if stale {
    Decision::Discard(Discard::Stale)
  } else if update.is_noop_for(&status.flags) {
    Decision::Discard(Discard::Unchanged)
  } else {
    Decision::Update
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, NaiveDate, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::{
    ident::PersonIdent,
    status::{Generated, MeetingStatus, TaskFlags, TaskKind},
  };

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap() }

  fn timeline(bit: Uuid, occurred: DateTime<Utc>, generated: DateTime<Utc>) -> Timeline {
    Timeline {
      start:                     NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
      end:                       NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
      generated_at:              Some(generated),
      reference_bit_uuid:        bit,
      reference_bit_occurred_at: occurred,
      sick_days:                 None,
      organizations:             vec![],
    }
  }

  fn status_with(flags: TaskFlags) -> PersonStatus {
    PersonStatus {
      id: 1,
      uuid: Uuid::new_v4(),
      person_ident: PersonIdent::new("01017012345").unwrap(),
      display_name: None,
      birth_date: None,
      assigned_caseworker: None,
      assigned_org_unit: None,
      assigned_org_unit_updated_at: None,
      flags,
      timeline: None,
      created_at: t0(),
      updated_at: t0(),
    }
  }

  fn org(number: &str, name: Option<&str>) -> OrgAssociation {
    OrgAssociation {
      number:     OrganizationNumber::new(number).unwrap(),
      name:       name.map(str::to_owned),
      uuid:       Uuid::new_v4(),
      created_at: t0(),
    }
  }

  #[test]
  fn missing_timeline_is_replaced() {
    let candidate = timeline(Uuid::new_v4(), t0(), t0());
    assert!(should_replace_timeline(None, &candidate));
  }

  #[test]
  fn same_bit_orders_by_generation_time() {
    let bit = Uuid::new_v4();
    let stored = timeline(bit, t0(), t0());

    let older = timeline(bit, t0(), t0() - Duration::seconds(1));
    let newer = timeline(bit, t0(), t0() + Duration::seconds(1));
    let replay = timeline(bit, t0(), t0());

    assert!(!should_replace_timeline(Some(&stored), &older));
    assert!(should_replace_timeline(Some(&stored), &newer));
    assert!(!should_replace_timeline(Some(&stored), &replay));
  }

  #[test]
  fn same_bit_replaces_legacy_row_without_generation_time() {
    let bit = Uuid::new_v4();
    let mut stored = timeline(bit, t0(), t0());
    stored.generated_at = None;

    let candidate = timeline(bit, t0(), t0() - Duration::days(1));
    assert!(should_replace_timeline(Some(&stored), &candidate));
  }

  #[test]
  fn different_bit_tie_after_truncation_orders_by_generation_time() {
    let occurred = t0() + Duration::microseconds(123_400);
    let noisy = t0() + Duration::microseconds(123_999);
    let stored = timeline(Uuid::new_v4(), occurred, t0());

    let older_generation =
      timeline(Uuid::new_v4(), noisy, t0() - Duration::seconds(5));
    let newer_generation =
      timeline(Uuid::new_v4(), noisy, t0() + Duration::seconds(5));

    assert!(!should_replace_timeline(Some(&stored), &older_generation));
    assert!(should_replace_timeline(Some(&stored), &newer_generation));
  }

  #[test]
  fn different_bit_orders_by_occurrence() {
    let stored = timeline(Uuid::new_v4(), t0(), t0());

    // Later occurrence wins even with an older generation time.
    let later = timeline(
      Uuid::new_v4(),
      t0() + Duration::milliseconds(1),
      t0() - Duration::hours(1),
    );
    let earlier = timeline(
      Uuid::new_v4(),
      t0() - Duration::milliseconds(1),
      t0() + Duration::hours(1),
    );

    assert!(should_replace_timeline(Some(&stored), &later));
    assert!(!should_replace_timeline(Some(&stored), &earlier));
  }

  #[test]
  fn decide_timeline_creates_for_unseen_person() {
    let candidate = timeline(Uuid::new_v4(), t0(), t0());
    assert_eq!(decide_timeline(None, &candidate), Decision::Create);

    let mut status = status_with(TaskFlags::default());
    assert_eq!(decide_timeline(Some(&status), &candidate), Decision::Update);

    status.timeline = Some(candidate.clone());
    assert_eq!(
      decide_timeline(Some(&status), &candidate),
      Decision::Discard(Discard::Stale)
    );
  }

  #[test]
  fn organization_diff_keeps_shared_numbers() {
    let stored = vec![org("111111111", None), org("222222222", Some("X"))];
    let candidate = vec![
      OrganizationNumber::new("222222222").unwrap(),
      OrganizationNumber::new("333333333").unwrap(),
      OrganizationNumber::new("333333333").unwrap(),
    ];

    let diff = diff_organizations(&stored, &candidate);
    assert_eq!(diff.retained, vec![OrganizationNumber::new("222222222").unwrap()]);
    assert_eq!(diff.inserted, vec![OrganizationNumber::new("333333333").unwrap()]);
    assert_eq!(diff.deleted, vec![OrganizationNumber::new("111111111").unwrap()]);
  }

  #[test]
  fn latched_flag_replay_is_unchanged() {
    let update = FlagUpdate::Task { kind: TaskKind::MeetingNeed, pending: true };
    let mut flags = TaskFlags::default();
    update.apply_to(&mut flags);

    assert_eq!(
      decide_flags(Some(&status_with(flags)), &update),
      Decision::Discard(Discard::Unchanged)
    );
  }

  #[test]
  fn latched_flag_latest_delivery_wins() {
    let flags = TaskFlags { meeting_need_pending: Some(true), ..Default::default() };
    let handled = FlagUpdate::Task { kind: TaskKind::MeetingNeed, pending: false };
    assert_eq!(decide_flags(Some(&status_with(flags)), &handled), Decision::Update);
  }

  #[test]
  fn generated_flag_requires_strictly_newer_generation() {
    let flags = TaskFlags {
      dialog_meeting_status: Some(Generated {
        value:        MeetingStatus::Invited,
        generated_at: t0(),
      }),
      ..Default::default()
    };
    let status = status_with(flags);

    let same_time = FlagUpdate::DialogMeetingStatus(Generated {
      value:        MeetingStatus::Cancelled,
      generated_at: t0(),
    });
    let newer = FlagUpdate::DialogMeetingStatus(Generated {
      value:        MeetingStatus::Cancelled,
      generated_at: t0() + Duration::seconds(1),
    });

    assert_eq!(decide_flags(Some(&status), &same_time), Decision::Discard(Discard::Stale));
    assert_eq!(decide_flags(Some(&status), &newer), Decision::Update);
  }

  #[test]
  fn generated_flag_applies_when_absent() {
    let update = FlagUpdate::DialogMeetingCandidate(Generated {
      value:        true,
      generated_at: t0(),
    });
    let status = status_with(TaskFlags::default());
    assert_eq!(decide_flags(Some(&status), &update), Decision::Update);
  }
}
