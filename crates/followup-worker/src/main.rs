//! followup-worker binary.
//!
//! Reads `followup.toml` (or the path given with `--config`) layered under
//! `FOLLOWUP_*` environment variables, opens the SQLite store, and runs every
//! ingestion driver and enrichment cronjob until interrupted.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use followup_core::{
  ingest::{
    ActivityRequirementCategory, CaseworkerAssignmentCategory, DialogMeetingCandidateCategory,
    DialogMeetingStatusCategory, EventCategory, IdentityChangeCategory, LackOfCooperationCategory,
    LateFollowUpCategory, PersonInfoCategory, PersonTaskCategory, ReminderCategory,
    TimelineCategory,
  },
  source::EventSource,
};
use followup_store_sqlite::SqliteStore;
use followup_worker::{
  PollingDriver, WorkerConfig,
  clients::{
    IdentityRegistryClient, OrganizationRegistryClient, PersonDirectoryClient, UnitDirectoryClient,
  },
  config::LogFormat,
  cronjob::{self, OrgUnitCronjob, OrganizationNameCronjob, PersonInfoCronjob},
  health::{self, ApplicationState},
  metrics,
};
use tokio::{net::TcpListener, sync::watch, task::JoinSet};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Follow-up status worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "FOLLOWUP_CONFIG", default_value = "followup.toml")]
  config: PathBuf,
}

fn init_tracing(config: &WorkerConfig) {
  let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
  let fmt = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
  match config.log_format {
    LogFormat::Json => fmt.json().init(),
    LogFormat::Compact => fmt.compact().init(),
  }
}

/// Open a source for `category` and spawn its driver.
async fn spawn_driver<C: EventCategory>(
  drivers: &mut JoinSet<followup_worker::Result<()>>,
  category: C,
  store: &SqliteStore,
  config: &WorkerConfig,
  shutdown: &watch::Receiver<bool>,
) -> anyhow::Result<()> {
  let source = store
    .event_log(C::NAME, &config.consumer_group)
    .await
    .with_context(|| format!("failed to open event log for {}", C::NAME))?;
  info!(topic = source.topic(), group = %config.consumer_group, "opened event source");

  let driver = PollingDriver::new(
    category,
    store.clone(),
    source,
    config.ingest.batch_size,
    config.ingest.poll_interval(),
  );
  drivers.spawn(driver.run(shutdown.clone()));
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let config = WorkerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  init_tracing(&config);

  let prometheus = metrics::install().context("failed to install metrics recorder")?;

  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?;

  let clients = &config.clients;
  let timeout = clients.timeout();
  let person_directory = PersonDirectoryClient::new(&clients.person_directory_url, timeout)
    .context("failed to build person directory client")?;
  let organization_registry =
    OrganizationRegistryClient::new(&clients.organization_registry_url, timeout)
      .context("failed to build organization registry client")?;
  let unit_directory = UnitDirectoryClient::new(&clients.unit_directory_url, timeout)
    .context("failed to build unit directory client")?;
  let identity_registry = IdentityRegistryClient::new(&clients.identity_registry_url, timeout)
    .context("failed to build identity registry client")?;

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let app_state = Arc::new(ApplicationState::default());

  // Health endpoints.
  let address = format!("{}:{}", config.http.host, config.http.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("serving health endpoints on http://{address}");
  let server = tokio::spawn(health::serve(
    listener,
    health::router(app_state.clone(), prometheus),
    shutdown_rx.clone(),
  ));

  // Ingestion drivers.
  let mut drivers = JoinSet::new();
  spawn_driver(&mut drivers, TimelineCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, DialogMeetingCandidateCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, DialogMeetingStatusCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, ActivityRequirementCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, LackOfCooperationCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, LateFollowUpCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, ReminderCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, PersonTaskCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(&mut drivers, CaseworkerAssignmentCategory, &store, &config, &shutdown_rx).await?;
  spawn_driver(
    &mut drivers,
    IdentityChangeCategory::new(identity_registry),
    &store,
    &config,
    &shutdown_rx,
  )
  .await?;
  spawn_driver(&mut drivers, PersonInfoCategory, &store, &config, &shutdown_rx).await?;

  // Enrichment cronjobs.
  let mut cronjobs = JoinSet::new();
  if config.cronjobs.enabled {
    let jobs = &config.cronjobs;
    let retry_after = jobs.retry_after();
    cronjobs.spawn(cronjob::run_periodically(
      PersonInfoCronjob::new(store.clone(), person_directory, jobs.batch_size, retry_after),
      jobs.interval(),
      shutdown_rx.clone(),
    ));
    cronjobs.spawn(cronjob::run_periodically(
      OrganizationNameCronjob::new(
        store.clone(),
        organization_registry,
        jobs.batch_size,
        retry_after,
      ),
      jobs.interval(),
      shutdown_rx.clone(),
    ));
    cronjobs.spawn(cronjob::run_periodically(
      OrgUnitCronjob::new(
        store.clone(),
        unit_directory,
        jobs.batch_size,
        jobs.org_unit_refresh(),
        retry_after,
      ),
      jobs.interval(),
      shutdown_rx.clone(),
    ));
  }

  app_state.mark_ready();
  info!(drivers = drivers.len(), cronjobs = cronjobs.len(), "followup-worker ready");

  let mut outcome = Ok(());
  tokio::select! {
    signal = tokio::signal::ctrl_c() => {
      signal.context("failed to listen for shutdown signal")?;
      info!("shutdown requested");
    }
    Some(joined) = drivers.join_next() => {
      let failure = match joined {
        Ok(Ok(())) => anyhow::anyhow!("driver stopped unexpectedly"),
        Ok(Err(e)) => anyhow::Error::new(e).context("driver failed"),
        Err(e) => anyhow::Error::new(e).context("driver task panicked"),
      };
      error!(error = %failure, "fatal driver failure, shutting down");
      app_state.mark_failed();
      outcome = Err(failure);
    }
  }

  // Let the remaining drivers finish their in-flight batch.
  let _ = shutdown_tx.send(true);
  while let Some(joined) = drivers.join_next().await {
    match joined {
      Ok(Ok(())) => {}
      Ok(Err(e)) => error!(error = %e, "driver failed during shutdown"),
      Err(e) => error!(error = %e, "driver task panicked during shutdown"),
    }
  }
  while cronjobs.join_next().await.is_some() {}
  server
    .await
    .context("health server task panicked")?
    .context("health server failed")?;

  info!("followup-worker stopped");
  outcome
}
