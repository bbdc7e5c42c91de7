//! Follow-up case timeline snapshots.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{EventCategory, Outcome};
use crate::{
  error::StoreError,
  ident::{OrganizationNumber, PersonIdent},
  rules::{Decision, decide_timeline, truncate_millis},
  status::{NewPersonStatus, OrgAssociation, Timeline},
  store::AggregateRepository,
};

/// One period of a timeline snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePeriod {
  pub start:         NaiveDate,
  pub end:           NaiveDate,
  #[serde(default)]
  pub sick_days:     Option<u32>,
  #[serde(default)]
  pub organizations: Vec<OrganizationNumber>,
}

/// A full snapshot of a person's follow-up case periods, stamped with the
/// reference bit that triggered it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
  pub uuid:                      Uuid,
  pub created_at:                DateTime<Utc>,
  pub person_ident:              PersonIdent,
  #[serde(default)]
  pub periods:                   Vec<TimelinePeriod>,
  pub reference_bit_uuid:        Uuid,
  pub reference_bit_occurred_at: DateTime<Utc>,
}

impl TimelineEvent {
  /// The snapshot's current period as a candidate [`Timeline`]: the period
  /// with the latest start, ties broken by the latest end. Repeated
  /// organization numbers keep their first position.
  pub fn candidate(&self, now: DateTime<Utc>) -> Option<Timeline> {
    let latest = self.periods.iter().max_by_key(|p| (p.start, p.end))?;
    let mut seen = HashSet::new();

    Some(Timeline {
      start:                     latest.start,
      end:                       latest.end,
      generated_at:              Some(self.created_at),
      reference_bit_uuid:        self.reference_bit_uuid,
      reference_bit_occurred_at: self.reference_bit_occurred_at,
      sick_days:                 latest.sick_days,
      organizations:             latest
        .organizations
        .iter()
        .filter(|number| seen.insert(*number))
        .map(|number| OrgAssociation::new(number.clone(), now))
        .collect(),
    })
  }
}

pub struct TimelineCategory;

impl EventCategory for TimelineCategory {
  type Event = TimelineEvent;
  type Key = PersonIdent;
  type Recency = (DateTime<Utc>, DateTime<Utc>);

  const NAME: &'static str = "timeline";

  fn key(event: &TimelineEvent) -> PersonIdent { event.person_ident.clone() }

  fn recency(event: &TimelineEvent) -> Self::Recency {
    (truncate_millis(event.reference_bit_occurred_at), event.created_at)
  }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &TimelineEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let Some(candidate) = event.candidate(now) else {
      return Ok(Outcome::Skipped);
    };

    let stored = repo.get(&event.person_ident)?;
    match decide_timeline(stored.as_ref(), &candidate) {
      Decision::Create => {
        let seed = NewPersonStatus::with_timeline(event.person_ident.clone(), candidate);
        repo.create(&seed, now)?;
        Ok(Outcome::Created)
      }
      Decision::Update => {
        repo.update_timeline(&event.person_ident, &candidate, now)?;
        Ok(Outcome::Updated)
      }
      Decision::Discard(discard) => Ok(discard.into()),
    }
  }
}
