//! Periodic enrichment jobs.
//!
//! Each job pulls a bounded batch of rows that need enrichment, looks every
//! item up in an external service, and writes the result back. A failing item
//! is logged and counted; it never stops the rest of the batch.

mod org_unit;
mod organization_name;
mod person_info;

use std::{future::Future, time::Duration};

use tokio::{sync::watch, time::Instant};
use tracing::{error, info};

pub use org_unit::OrgUnitCronjob;
pub use organization_name::OrganizationNameCronjob;
pub use person_info::PersonInfoCronjob;

use crate::{Result, metrics};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronjobResult {
  pub updated: usize,
  pub failed:  usize,
}

pub trait Cronjob: Send + Sync + 'static {
  const NAME: &'static str;

  /// Process one batch.
  fn run(&self) -> impl Future<Output = Result<CronjobResult>> + Send + '_;
}

/// Run `job` every `interval` until `shutdown` flips to `true`. A failed run
/// is logged and retried on the next tick.
pub async fn run_periodically<J: Cronjob>(
  job: J,
  interval: Duration,
  mut shutdown: watch::Receiver<bool>,
) {
  let mut timer = tokio::time::interval(interval);
  timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = timer.tick() => {}
      _ = shutdown.wait_for(|stop| *stop) => break,
    }

    let started = Instant::now();
    match job.run().await {
      Ok(result) => {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::record_cronjob(J::NAME, &result, elapsed_ms);
        if result.updated + result.failed > 0 {
          info!(job = J::NAME, updated = result.updated, failed = result.failed, "cronjob run complete");
        }
      }
      Err(e) => error!(job = J::NAME, error = %e, "cronjob run failed"),
    }
  }
}

#[cfg(test)]
mod tests;
