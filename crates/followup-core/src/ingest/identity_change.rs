//! Identity changes: folding retired national identities into the active one.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::{EventCategory, Outcome};
use crate::{
  Error,
  error::StoreError,
  ident::PersonIdent,
  identity::IdentityRegistry,
  store::{AggregateRepository, AggregateStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierKind {
  NationalId,
  ActorId,
  Npid,
}

/// One identifier as listed by the identity registry. Only national
/// identities are validated; other kinds have their own formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredIdentifier {
  pub ident:  String,
  pub kind:   IdentifierKind,
  pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityChangeEvent {
  pub identifiers: Vec<RegisteredIdentifier>,
}

/// Batch deduplication key. Events naming an active national identity
/// collapse per identity; the rest only collapse with an identical
/// identifier set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
  Active(String),
  Unplanned(Vec<RegisteredIdentifier>),
}

/// The identities an event asks to merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
  pub active:  PersonIdent,
  pub retired: Vec<PersonIdent>,
}

impl IdentityChangeEvent {
  fn national_ids(&self, active: bool) -> impl Iterator<Item = &str> {
    self
      .identifiers
      .iter()
      .filter(move |id| id.kind == IdentifierKind::NationalId && id.active == active)
      .map(|id| id.ident.as_str())
  }

  /// The merge this event describes, or `None` if it names no active
  /// national identity or nothing to retire.
  pub fn merge_plan(&self) -> Result<Option<MergePlan>, Error> {
    let Some(active) = self.national_ids(true).next() else {
      return Ok(None);
    };
    let active = PersonIdent::new(active)?;
    let retired = self
      .national_ids(false)
      .map(PersonIdent::new)
      .filter(|ident| ident.as_ref().map_or(true, |ident| ident != &active))
      .collect::<Result<Vec<_>, _>>()?;

    if retired.is_empty() {
      Ok(None)
    } else {
      Ok(Some(MergePlan { active, retired }))
    }
  }
}

/// Merges retired identities after confirming the surviving identity with
/// the registry.
pub struct IdentityChangeCategory<R> {
  registry: R,
}

impl<R: IdentityRegistry + 'static> IdentityChangeCategory<R> {
  pub fn new(registry: R) -> Self { Self { registry } }

  async fn verify<S: AggregateStore>(
    &self,
    store: &S,
    plan: &MergePlan,
  ) -> Result<(), S::Error> {
    let mut has_retired_row = false;
    for retired in &plan.retired {
      if store.get(retired.clone()).await?.is_some() {
        has_retired_row = true;
        break;
      }
    }
    // Nothing to merge; no need to bother the registry.
    if !has_retired_row {
      return Ok(());
    }

    let active = self
      .registry
      .is_active(&plan.active)
      .await
      .map_err(|e| Error::IdentityRegistry(Box::new(e)))?;
    if !active {
      return Err(Error::InactiveIdentity(plan.active.clone()).into());
    }
    Ok(())
  }
}

impl<R: IdentityRegistry + 'static> EventCategory for IdentityChangeCategory<R> {
  type Event = IdentityChangeEvent;
  type Key = IdentityKey;
  type Recency = ();

  const NAME: &'static str = "identity-change";

  fn key(event: &IdentityChangeEvent) -> IdentityKey {
    match event.national_ids(true).next() {
      Some(active) => IdentityKey::Active(active.to_owned()),
      None => {
        let mut identifiers = event.identifiers.clone();
        identifiers.sort();
        IdentityKey::Unplanned(identifiers)
      }
    }
  }

  fn recency(_event: &IdentityChangeEvent) -> Self::Recency {}

  fn prepare<'a, S: AggregateStore>(
    &'a self,
    store: &'a S,
    events: &'a [IdentityChangeEvent],
  ) -> impl Future<Output = Result<(), S::Error>> + Send + 'a {
    async move {
      for event in events {
        if let Some(plan) = event.merge_plan()? {
          self.verify(store, &plan).await?;
        }
      }
      Ok(())
    }
  }

  fn apply<E: StoreError>(
    &self,
    repo: &dyn AggregateRepository<Error = E>,
    event: &IdentityChangeEvent,
    now: DateTime<Utc>,
  ) -> Result<Outcome, E> {
    let Some(plan) = event.merge_plan()? else {
      return Ok(Outcome::Skipped);
    };

    let mut outcome = Outcome::Unchanged;
    for retired in &plan.retired {
      let Some(retired_row) = repo.get(retired)? else {
        continue;
      };

      match repo.get(&plan.active)? {
        None => {
          repo.update_person_ident(retired, &plan.active, now)?;
          info!(id = retired_row.id, "moved aggregate to active identity");
        }
        Some(active_row) => {
          if active_row.assigned_caseworker.is_none()
            && let Some(caseworker) = retired_row.assigned_caseworker.as_deref()
          {
            repo.update_assigned_caseworker(&plan.active, caseworker, now)?;
          }
          repo.delete(retired)?;
          info!(
            id = active_row.id,
            retired_id = retired_row.id,
            "merged retired aggregate into active identity"
          );
        }
      }
      outcome = Outcome::Updated;
    }
    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use chrono::TimeZone;

  use super::*;
  use crate::{ingest::decode_batch, source::RawRecord};

  struct NoRegistry;

  impl IdentityRegistry for NoRegistry {
    type Error = Infallible;

    fn is_active<'a>(
      &'a self,
      _ident: &'a PersonIdent,
    ) -> impl Future<Output = Result<bool, Infallible>> + Send + 'a {
      std::future::ready(Ok(true))
    }
  }

  fn records(values: &[&str]) -> Vec<RawRecord> {
    values
      .iter()
      .enumerate()
      .map(|(offset, value)| RawRecord {
        offset:       offset as i64,
        key:          format!("key-{offset}"),
        value:        Some((*value).to_owned()),
        published_at: Utc.timestamp_opt(0, 0).unwrap(),
      })
      .collect()
  }

  fn event(json: &str) -> IdentityChangeEvent { serde_json::from_str(json).unwrap() }

  #[test]
  fn plan_separates_active_and_retired_national_ids() {
    let event = event(
      r#"{"identifiers":[
        {"ident":"02027012345","kind":"NATIONAL_ID","active":true},
        {"ident":"01017012345","kind":"NATIONAL_ID","active":false},
        {"ident":"1234567890123","kind":"ACTOR_ID","active":true}
      ]}"#,
    );

    let plan = event.merge_plan().unwrap().unwrap();
    assert_eq!(plan.active.as_str(), "02027012345");
    assert_eq!(plan.retired.len(), 1);
    assert_eq!(plan.retired[0].as_str(), "01017012345");
  }

  #[test]
  fn nothing_to_retire_has_no_plan() {
    let event = event(
      r#"{"identifiers":[
        {"ident":"02027012345","kind":"NATIONAL_ID","active":true},
        {"ident":"1234567890123","kind":"ACTOR_ID","active":false}
      ]}"#,
    );
    assert!(event.merge_plan().unwrap().is_none());
  }

  #[test]
  fn malformed_national_id_is_an_error() {
    let event = event(
      r#"{"identifiers":[
        {"ident":"02027012345","kind":"NATIONAL_ID","active":true},
        {"ident":"0101","kind":"NATIONAL_ID","active":false}
      ]}"#,
    );
    assert!(matches!(event.merge_plan(), Err(Error::InvalidPersonIdent(_))));
  }

  #[test]
  fn events_without_active_identity_are_not_duplicates_of_each_other() {
    let actor = r#"{"identifiers":[{"ident":"1234567890123","kind":"ACTOR_ID","active":true}]}"#;
    let npid = r#"{"identifiers":[{"ident":"01017012345","kind":"NPID","active":true}]}"#;
    let batch =
      decode_batch::<IdentityChangeCategory<NoRegistry>>(&records(&[actor, npid])).unwrap();
    assert_eq!(batch.duplicates, 0);
    assert_eq!(batch.events.len(), 2);
  }

  #[test]
  fn identical_identifier_sets_collapse_regardless_of_order() {
    let first = r#"{"identifiers":[
      {"ident":"1234567890123","kind":"ACTOR_ID","active":true},
      {"ident":"01017012345","kind":"NATIONAL_ID","active":false}
    ]}"#;
    let reordered = r#"{"identifiers":[
      {"ident":"01017012345","kind":"NATIONAL_ID","active":false},
      {"ident":"1234567890123","kind":"ACTOR_ID","active":true}
    ]}"#;
    let batch =
      decode_batch::<IdentityChangeCategory<NoRegistry>>(&records(&[first, reordered])).unwrap();
    assert_eq!(batch.duplicates, 1);
    assert_eq!(batch.events.len(), 1);
  }
}
