// src/generate/mod.rs
//! Generation pipeline: prompt rendering, back-end calls with candidate fallback,
//! and sanitization of the raw model text.

pub mod backend;
pub mod invoker;
pub mod prompt;
pub mod sanitize;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

// Re-export convenient types.
pub use crate::generate::backend::{BackendError, GeminiBackend, ModelBackend};
pub use crate::generate::invoker::{
    AggregateFailure, AttemptFailure, AttemptResult, Generation, InvokerTimeouts, ModelInvoker,
};
pub use crate::generate::prompt::{build_prompt, gmp_field, PromptContext, PromptSettings, SchemaVariant};
pub use crate::generate::sanitize::{sanitize, ParseError};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "gmp_model_attempts_total",
            "Generation attempts by model and outcome (ok, failed, skipped)."
        );
        describe_counter!("gmp_requests_total", "Requests handled by the IPO pipeline.");
        describe_counter!(
            "gmp_pipeline_failures_total",
            "Requests that ended in a failure response, by kind."
        );
        describe_histogram!(
            "gmp_pipeline_duration_ms",
            "End-to-end pipeline time in milliseconds."
        );
    });
}
