//! Polling drivers: one loop per event category that pulls a batch, hands it
//! to the ingestion pipeline and commits the offset once the batch is stored.

use std::{sync::Arc, time::Duration};

use followup_core::{
  ingest::{BatchReport, EventCategory, process_batch},
  source::EventSource,
  store::AggregateStore,
};
use tokio::sync::watch;
use tracing::{Instrument as _, debug, error, info, info_span};

use crate::{Error, Result, metrics};

/// What one [`PollingDriver::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
  /// Nothing was waiting.
  Idle,
  /// A batch was stored and its offset committed.
  Processed(BatchReport),
  /// The batch failed and the source was rewound for redelivery.
  Failed,
}

pub struct PollingDriver<C, S, Src> {
  category:      Arc<C>,
  store:         S,
  source:        Src,
  batch_size:    usize,
  poll_interval: Duration,
}

impl<C, S, Src> PollingDriver<C, S, Src>
where
  C: EventCategory,
  S: AggregateStore,
  Src: EventSource,
{
  pub fn new(
    category: C,
    store: S,
    source: Src,
    batch_size: usize,
    poll_interval: Duration,
  ) -> Self {
    Self { category: Arc::new(category), store, source, batch_size, poll_interval }
  }

  /// Poll once and process whatever arrived.
  ///
  /// A failing batch is not an error here; it is rewound and reported as
  /// [`Step::Failed`]. Only failures of the source itself are returned.
  pub async fn step(&mut self) -> Result<Step> {
    let records = self
      .source
      .poll(self.batch_size)
      .await
      .map_err(|e| Error::event_source(C::NAME, e))?;
    if records.is_empty() {
      return Ok(Step::Idle);
    }

    match process_batch(&self.category, &self.store, &records).await {
      Ok(report) => {
        self
          .source
          .commit()
          .await
          .map_err(|e| Error::event_source(C::NAME, e))?;
        metrics::record_batch(C::NAME, &report);
        debug!(
          received = report.received,
          created = report.created,
          updated = report.updated,
          stale = report.stale,
          "batch committed"
        );
        Ok(Step::Processed(report))
      }
      Err(e) => {
        error!(error = %e, records = records.len(), "batch failed, rewinding");
        metrics::record_batch_failure(C::NAME);
        self
          .source
          .rewind()
          .await
          .map_err(|e| Error::event_source(C::NAME, e))?;
        Ok(Step::Failed)
      }
    }
  }

  /// Loop until `shutdown` flips to `true`. The in-flight batch always
  /// finishes before the loop checks the signal.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let span = info_span!("driver", category = C::NAME);
    async move {
      info!("driver started");
      loop {
        if *shutdown.borrow() {
          break;
        }
        match self.step().await? {
          Step::Processed(_) => continue,
          Step::Idle | Step::Failed => {
            tokio::select! {
              _ = tokio::time::sleep(self.poll_interval) => {}
              _ = shutdown.wait_for(|stop| *stop) => break,
            }
          }
        }
      }
      info!("driver stopped");
      Ok(())
    }
    .instrument(span)
    .await
  }
}

#[cfg(test)]
mod tests {
  use followup_core::{
    ident::PersonIdent,
    ingest::{PersonTaskCategory, TimelineCategory},
  };
  use followup_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;

  const PERSON: &str = "01017012345";

  async fn driver<C: EventCategory>(
    store: &SqliteStore,
    category: C,
  ) -> PollingDriver<C, SqliteStore, followup_store_sqlite::SqliteEventLog> {
    let source = store.event_log(C::NAME, "test").await.unwrap();
    PollingDriver::new(category, store.clone(), source, 10, Duration::from_millis(10))
  }

  fn task(kind: &str) -> String {
    json!({ "personIdent": PERSON, "kind": kind, "createdAt": "2024-05-01T10:00:00Z" })
      .to_string()
  }

  #[tokio::test]
  async fn processed_batch_is_committed() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let topic = PersonTaskCategory::NAME;
    store.append(topic, PERSON, Some(task("MEETING_NEED_RECEIVED"))).await.unwrap();

    let mut driver = driver(&store, PersonTaskCategory).await;
    let Step::Processed(report) = driver.step().await.unwrap() else {
      panic!("expected a processed batch");
    };
    assert_eq!(report.created, 1);
    assert_eq!(driver.step().await.unwrap(), Step::Idle);

    // A fresh consumer in the same group starts after the committed offset.
    let log = store.event_log(topic, "test").await.unwrap();
    assert_eq!(log.committed(), Some(0));

    let stored = store.get(PersonIdent::new(PERSON).unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.flags.meeting_need_pending, Some(true));
  }

  #[tokio::test]
  async fn failed_batch_is_redelivered() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let topic = TimelineCategory::NAME;
    store.append(topic, PERSON, Some("{not json".to_owned())).await.unwrap();

    let mut driver = driver(&store, TimelineCategory).await;
    assert_eq!(driver.step().await.unwrap(), Step::Failed);
    assert_eq!(driver.source.committed(), None);

    // Rewound, so the same record comes back.
    assert_eq!(driver.step().await.unwrap(), Step::Failed);
    assert_eq!(driver.source.committed(), None);
  }

  #[tokio::test]
  async fn run_stops_on_shutdown() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let driver = driver(&store, PersonTaskCategory).await;
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(driver.run(rx));
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
  }
}
