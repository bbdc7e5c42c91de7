use std::{
  collections::{HashMap, HashSet},
  future::Future,
};

use chrono::{Duration, NaiveDate, Utc};
use followup_core::{
  ident::{OrganizationNumber, PersonIdent},
  status::{NewPersonStatus, OrgAssociation, Timeline},
  store::AggregateStore,
};
use followup_store_sqlite::SqliteStore;
use reqwest::StatusCode;
use uuid::Uuid;

use super::*;
use crate::clients::{
  ClientError, OrganizationRegistry, PersonDirectory, PersonInfo, UnitDirectory,
};

const KNOWN: &str = "01017012345";
const FAILING: &str = "02027012345";
const UNKNOWN: &str = "03037012345";

fn ident(s: &str) -> PersonIdent { PersonIdent::new(s).unwrap() }

fn retry_after() -> Duration { Duration::minutes(60) }

fn unavailable() -> ClientError {
  ClientError::Status { service: "fake", status: StatusCode::BAD_GATEWAY }
}

/// Answers from a fixed table; keys in `failing` error out.
struct Fake<T> {
  answers: HashMap<String, T>,
  failing: HashSet<String>,
}

impl<T: Clone> Fake<T> {
  fn new(answers: &[(&str, T)], failing: &[&str]) -> Self {
    Self {
      answers: answers.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
      failing: failing.iter().map(|k| k.to_string()).collect(),
    }
  }

  fn answer(&self, key: &str) -> Result<Option<T>, ClientError> {
    if self.failing.contains(key) {
      return Err(unavailable());
    }
    Ok(self.answers.get(key).cloned())
  }
}

impl PersonDirectory for Fake<PersonInfo> {
  fn person_info<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<Option<PersonInfo>, ClientError>> + Send + 'a {
    std::future::ready(self.answer(ident.as_str()))
  }
}

impl OrganizationRegistry for Fake<String> {
  fn organization_name<'a>(
    &'a self,
    number: &'a OrganizationNumber,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send + 'a {
    std::future::ready(self.answer(number.as_str()))
  }
}

struct FakeUnits(Fake<String>);

impl UnitDirectory for FakeUnits {
  fn org_unit<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send + 'a {
    std::future::ready(self.0.answer(ident.as_str()))
  }
}

async fn seed(store: &SqliteStore, rows: Vec<NewPersonStatus>) {
  store
    .transact(move |repo| {
      for row in &rows {
        repo.create(row, Utc::now())?;
      }
      Ok(())
    })
    .await
    .unwrap();
}

// ─── Person info ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn person_info_failures_do_not_stop_the_batch() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  seed(&store, vec![
    NewPersonStatus::new(ident(KNOWN)),
    NewPersonStatus::new(ident(FAILING)),
    NewPersonStatus::new(ident(UNKNOWN)),
  ])
  .await;

  let directory = Fake::new(
    &[(KNOWN, PersonInfo {
      name:       Some("Kari Nordmann".into()),
      birth_date: NaiveDate::from_ymd_opt(1970, 1, 1),
    })],
    &[FAILING],
  );
  let job = PersonInfoCronjob::new(store.clone(), directory, 10, retry_after());

  let result = job.run().await.unwrap();
  assert_eq!(result, CronjobResult { updated: 1, failed: 2 });

  let known = store.get(ident(KNOWN)).await.unwrap().unwrap();
  assert_eq!(known.display_name.as_deref(), Some("Kari Nordmann"));

  // The enriched row is done and the others wait out the retry window.
  let again = job.run().await.unwrap();
  assert_eq!(again, CronjobResult::default());
}

#[tokio::test]
async fn partial_person_info_waits_for_the_retry_window() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  seed(&store, vec![NewPersonStatus::new(ident(KNOWN))]).await;

  let directory = Fake::new(
    &[(KNOWN, PersonInfo { name: Some("Kari Nordmann".into()), birth_date: None })],
    &[],
  );
  let job = PersonInfoCronjob::new(store.clone(), directory, 10, retry_after());

  assert_eq!(job.run().await.unwrap(), CronjobResult { updated: 1, failed: 0 });
  let stored = store.get(ident(KNOWN)).await.unwrap().unwrap();
  assert_eq!(stored.display_name.as_deref(), Some("Kari Nordmann"));
  assert_eq!(stored.birth_date, None);

  // Still missing a birth date, but not looked up again straight away.
  assert_eq!(job.run().await.unwrap(), CronjobResult::default());
}

// ─── Organization names ──────────────────────────────────────────────────────

#[tokio::test]
async fn organization_names_are_filled_in() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let now = Utc::now();
  let timeline = Timeline {
    start:                     NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
    end:                       NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    generated_at:              Some(now),
    reference_bit_uuid:        Uuid::new_v4(),
    reference_bit_occurred_at: now,
    sick_days:                 None,
    organizations:             vec![
      OrgAssociation::new(OrganizationNumber::new("111111111").unwrap(), now),
      OrgAssociation::new(OrganizationNumber::new("222222222").unwrap(), now),
    ],
  };
  seed(&store, vec![NewPersonStatus::with_timeline(ident(KNOWN), timeline)]).await;

  let registry = Fake::new(&[("111111111", "Acme AS".to_string())], &[]);
  let job = OrganizationNameCronjob::new(store.clone(), registry, 10, retry_after());

  let result = job.run().await.unwrap();
  assert_eq!(result, CronjobResult { updated: 1, failed: 1 });

  let orgs = store
    .get(ident(KNOWN))
    .await
    .unwrap()
    .unwrap()
    .timeline
    .unwrap()
    .organizations;
  assert_eq!(orgs[0].name.as_deref(), Some("Acme AS"));
  assert_eq!(orgs[1].name, None);
}

#[tokio::test]
async fn unresolvable_organizations_do_not_starve_the_rest() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let now = Utc::now();
  let timeline = Timeline {
    start:                     NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
    end:                       NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    generated_at:              Some(now),
    reference_bit_uuid:        Uuid::new_v4(),
    reference_bit_occurred_at: now,
    sick_days:                 None,
    organizations:             ["111111111", "222222222", "333333333"]
      .into_iter()
      .map(|number| OrgAssociation::new(OrganizationNumber::new(number).unwrap(), now))
      .collect(),
  };
  seed(&store, vec![NewPersonStatus::with_timeline(ident(KNOWN), timeline)]).await;

  // 111111111 is unknown to the registry and 222222222 always errors.
  let registry = Fake::new(&[("333333333", "Acme AS".to_string())], &["222222222"]);
  let job = OrganizationNameCronjob::new(store.clone(), registry, 2, retry_after());

  assert_eq!(job.run().await.unwrap(), CronjobResult { updated: 0, failed: 2 });
  assert_eq!(job.run().await.unwrap(), CronjobResult { updated: 1, failed: 0 });

  let orgs = store
    .get(ident(KNOWN))
    .await
    .unwrap()
    .unwrap()
    .timeline
    .unwrap()
    .organizations;
  assert_eq!(orgs[2].name.as_deref(), Some("Acme AS"));
}

// ─── Org units ───────────────────────────────────────────────────────────────

fn assigned(s: &str, org_unit: Option<&str>, caseworker: Option<&str>) -> NewPersonStatus {
  NewPersonStatus {
    assigned_org_unit: org_unit.map(str::to_owned),
    assigned_caseworker: caseworker.map(str::to_owned),
    ..NewPersonStatus::new(ident(s))
  }
}

#[tokio::test]
async fn unit_change_removes_the_caseworker() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  seed(&store, vec![
    assigned(KNOWN, Some("0101"), Some("Z1")),
    assigned(FAILING, None, None),
    assigned(UNKNOWN, Some("0303"), Some("Z3")),
  ])
  .await;

  let directory = FakeUnits(Fake::new(
    &[(KNOWN, "0202".to_string()), (UNKNOWN, "0303".to_string())],
    &[],
  ));
  let job =
    OrgUnitCronjob::new(store.clone(), directory, 10, Duration::hours(24), retry_after());

  let result = job.run().await.unwrap();
  assert_eq!(result, CronjobResult { updated: 2, failed: 1 });

  let moved = store.get(ident(KNOWN)).await.unwrap().unwrap();
  assert_eq!(moved.assigned_org_unit.as_deref(), Some("0202"));
  assert_eq!(moved.assigned_caseworker, None);
  assert!(moved.assigned_org_unit_updated_at.is_some());

  let stayed = store.get(ident(UNKNOWN)).await.unwrap().unwrap();
  assert_eq!(stayed.assigned_caseworker.as_deref(), Some("Z3"));

  // Resolved rows wait for the refresh, the unresolvable one for the retry.
  let again = job.run().await.unwrap();
  assert_eq!(again, CronjobResult::default());
}
