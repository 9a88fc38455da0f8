// src/lib.rs
// Public library surface for integration tests, the Shuttle binary and the probe.

pub mod api;
pub mod config;
pub mod handler;
pub mod ipo;
pub mod metrics;

// Scrape -> prompt -> candidate loop -> sanitize
pub mod generate;
pub mod ingest;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::TrackerConfig;
pub use crate::handler::{PipelineError, PipelineOutput, RequestHandler};
pub use crate::ipo::{IpoRecord, ResponsePayload, VerdictColor};

use axum::Router;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "ipo_gmp_tracker=info,warn";

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter; `LOG_FORMAT=json` switches to JSON lines. Safe to call twice (the
/// second call, or a subscriber installed by the runtime, is left alone).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Production router (without `/metrics`, which needs the global recorder).
pub fn app(cfg: &TrackerConfig) -> anyhow::Result<Router> {
    let handler = RequestHandler::from_config(cfg)?;
    Ok(create_router(AppState::new(handler)))
}
