//! Liveness, readiness and metrics endpoints.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use axum::{Router, extract::State, http::StatusCode, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;

/// Process health as reported to the platform.
///
/// Starts alive but not ready. A fatal driver error flips both off.
#[derive(Debug)]
pub struct ApplicationState {
  alive: AtomicBool,
  ready: AtomicBool,
}

impl Default for ApplicationState {
  fn default() -> Self {
    Self { alive: AtomicBool::new(true), ready: AtomicBool::new(false) }
  }
}

impl ApplicationState {
  pub fn mark_ready(&self) { self.ready.store(true, Ordering::Release); }

  pub fn mark_failed(&self) {
    self.ready.store(false, Ordering::Release);
    self.alive.store(false, Ordering::Release);
  }

  pub fn is_alive(&self) -> bool { self.alive.load(Ordering::Acquire) }

  pub fn is_ready(&self) -> bool { self.ready.load(Ordering::Acquire) }
}

#[derive(Clone)]
struct HealthState {
  app:     Arc<ApplicationState>,
  metrics: PrometheusHandle,
}

pub fn router(app: Arc<ApplicationState>, metrics: PrometheusHandle) -> Router {
  Router::new()
    .route("/internal/is_alive", get(is_alive))
    .route("/internal/is_ready", get(is_ready))
    .route("/internal/metrics", get(render_metrics))
    .layer(TraceLayer::new_for_http())
    .with_state(HealthState { app, metrics })
}

/// Serve `router` until `shutdown` flips to `true`.
pub async fn serve(
  listener: TcpListener,
  router: Router,
  mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
  axum::serve(listener, router)
    .with_graceful_shutdown(async move {
      let _ = shutdown.wait_for(|stop| *stop).await;
    })
    .await
}

async fn is_alive(State(state): State<HealthState>) -> (StatusCode, &'static str) {
  if state.app.is_alive() {
    (StatusCode::OK, "alive")
  } else {
    (StatusCode::SERVICE_UNAVAILABLE, "not alive")
  }
}

async fn is_ready(State(state): State<HealthState>) -> (StatusCode, &'static str) {
  if state.app.is_ready() {
    (StatusCode::OK, "ready")
  } else {
    (StatusCode::SERVICE_UNAVAILABLE, "not ready")
  }
}

async fn render_metrics(State(state): State<HealthState>) -> String { state.metrics.render() }

#[cfg(test)]
mod tests {
  use axum::{body::Body, http::Request};
  use metrics_exporter_prometheus::PrometheusBuilder;
  use tower::ServiceExt as _;

  use super::*;

  fn app(state: Arc<ApplicationState>) -> Router {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    router(state, handle)
  }

  async fn status(router: Router, uri: &str) -> StatusCode {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(req).await.unwrap().status()
  }

  #[tokio::test]
  async fn ready_only_after_startup() {
    let state = Arc::new(ApplicationState::default());
    assert_eq!(status(app(state.clone()), "/internal/is_ready").await, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status(app(state.clone()), "/internal/is_alive").await, StatusCode::OK);

    state.mark_ready();
    assert_eq!(status(app(state), "/internal/is_ready").await, StatusCode::OK);
  }

  #[tokio::test]
  async fn failure_takes_down_liveness_and_readiness() {
    let state = Arc::new(ApplicationState::default());
    state.mark_ready();
    state.mark_failed();

    assert_eq!(status(app(state.clone()), "/internal/is_alive").await, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status(app(state), "/internal/is_ready").await, StatusCode::SERVICE_UNAVAILABLE);
  }

  #[tokio::test]
  async fn metrics_are_exposed() {
    let state = Arc::new(ApplicationState::default());
    assert_eq!(status(app(state), "/internal/metrics").await, StatusCode::OK);
  }
}
