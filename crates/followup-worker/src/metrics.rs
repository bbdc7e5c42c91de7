//! Prometheus metrics for ingestion and cronjobs.

use followup_core::ingest::BatchReport;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::cronjob::CronjobResult;

const BATCHES_TOTAL: &str = "followup_ingest_batches_total";
const EVENTS_TOTAL: &str = "followup_ingest_events_total";
const CRONJOB_ITEMS_TOTAL: &str = "followup_cronjob_items_total";
const CRONJOB_DURATION_MS: &str = "followup_cronjob_duration_ms";

/// Install the process-wide recorder. Call once, from the binary.
pub fn install() -> Result<PrometheusHandle, BuildError> {
  PrometheusBuilder::new().install_recorder()
}

pub fn record_batch(category: &'static str, report: &BatchReport) {
  counter!(BATCHES_TOTAL, "category" => category, "result" => "ok").increment(1);

  let outcomes = [
    ("tombstone", report.tombstones),
    ("duplicate", report.duplicates),
    ("created", report.created),
    ("updated", report.updated),
    ("stale", report.stale),
    ("unchanged", report.unchanged),
    ("skipped", report.skipped),
  ];
  for (outcome, count) in outcomes {
    if count > 0 {
      counter!(EVENTS_TOTAL, "category" => category, "outcome" => outcome)
        .increment(count as u64);
    }
  }
}

pub fn record_batch_failure(category: &'static str) {
  counter!(BATCHES_TOTAL, "category" => category, "result" => "failed").increment(1);
}

pub fn record_cronjob(job: &'static str, result: &CronjobResult, duration_ms: f64) {
  counter!(CRONJOB_ITEMS_TOTAL, "job" => job, "result" => "updated")
    .increment(result.updated as u64);
  counter!(CRONJOB_ITEMS_TOTAL, "job" => job, "result" => "failed")
    .increment(result.failed as u64);
  histogram!(CRONJOB_DURATION_MS, "job" => job).record(duration_ms);
}
