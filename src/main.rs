//! IPO GMP tracker: Shuttle entrypoint.
//! Boots the Axum HTTP server with the IPO pipeline and Prometheus metrics.

use ipo_gmp_tracker::{app, init_tracing, metrics::Metrics, TrackerConfig};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = TrackerConfig::load_default()?;
    let metrics = Metrics::init()?;
    let router = app(&cfg)?.merge(metrics.router());

    Ok(router.into())
}
