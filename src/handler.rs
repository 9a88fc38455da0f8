// src/handler.rs
//! Request orchestration: credential check -> scrape -> prompt -> candidate loop.
//! No business logic beyond sequencing and status mapping.

use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::{counter, histogram};
use serde_json::json;
use tracing::{error, info};

use crate::config::TrackerConfig;
use crate::generate::{build_prompt, AggregateFailure, GeminiBackend, ModelBackend, ModelInvoker, PromptSettings};
use crate::ingest::{ContentFetcher, SnippetSource};
use crate::ipo::ResponsePayload;

pub const HEADER_MODEL: &str = "x-gmp-model";
pub const HEADER_SOURCE: &str = "x-gmp-source";

pub const MISSING_KEY_MESSAGE: &str = "API Key is missing.";
pub const ALL_MODELS_FAILED_MESSAGE: &str = "All AI models failed.";

/// Successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub payload: ResponsePayload,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No credential configured; nothing was fetched or generated.
    #[error("API Key is missing.")]
    Configuration,
    #[error("All AI models failed. {0}")]
    AllModelsFailed(#[from] AggregateFailure),
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Configuration => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::AllModelsFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration => "configuration",
            PipelineError::AllModelsFailed(_) => "all_models_failed",
        }
    }

    /// `{ error, details? }`; never a partial payload.
    pub fn body(&self) -> serde_json::Value {
        match self {
            PipelineError::Configuration => json!({ "error": MISSING_KEY_MESSAGE }),
            PipelineError::AllModelsFailed(agg) => {
                let last = agg.last();
                json!({
                    "error": ALL_MODELS_FAILED_MESSAGE,
                    "details": {
                        "last_model": last.map(|f| f.candidate.as_str()),
                        "last_error": last.map(|f| f.message.as_str()).unwrap_or("no model candidates configured"),
                        "attempts": agg.failures,
                    }
                })
            }
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl IntoResponse for PipelineOutput {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            (HEADER_MODEL, self.model.as_str()),
            (HEADER_SOURCE, self.payload.meta.source.as_str()),
        ] {
            // non-visible-ASCII labels are skipped rather than mangled
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(HeaderName::from_static(name), v);
            }
        }
        (StatusCode::OK, headers, Json(self.payload)).into_response()
    }
}

pub struct RequestHandler {
    api_key: Option<String>,
    source: Arc<dyn SnippetSource>,
    prompt: PromptSettings,
    invoker: ModelInvoker,
}

impl RequestHandler {
    pub fn new(
        api_key: Option<String>,
        source: Arc<dyn SnippetSource>,
        prompt: PromptSettings,
        invoker: ModelInvoker,
    ) -> Self {
        Self {
            api_key,
            source,
            prompt,
            invoker,
        }
    }

    /// Production wiring: live scrape + Gemini back-end.
    pub fn from_config(cfg: &TrackerConfig) -> anyhow::Result<Self> {
        let api_key = cfg.resolve_api_key();
        // Safe diagnostics: only key presence + length
        info!(
            target: "handler",
            key_present = api_key.is_some(),
            key_len = api_key.as_deref().map(str::len).unwrap_or(0),
            candidates = ?cfg.candidates,
            schema = ?cfg.schema,
            "tracker config loaded"
        );

        let fetcher = ContentFetcher::new(cfg.fetch_settings())?;
        let backend: Arc<dyn ModelBackend> = Arc::new(GeminiBackend::new(
            cfg.api_base.clone(),
            api_key.clone().unwrap_or_default(),
        )?);
        let invoker = ModelInvoker::new(backend, cfg.candidates.clone(), cfg.invoker_timeouts());
        Ok(Self::new(api_key, Arc::new(fetcher), cfg.prompt_settings(), invoker))
    }

    pub async fn handle(&self) -> Result<PipelineOutput, PipelineError> {
        crate::generate::ensure_metrics_described();
        counter!("gmp_requests_total").increment(1);
        let t0 = Instant::now();

        let res = self.run().await;

        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("gmp_pipeline_duration_ms").record(elapsed_ms);
        match &res {
            Ok(out) => info!(
                target: "handler",
                model = %out.model,
                source = %out.payload.meta.source,
                ipos = out.payload.ipos.len(),
                elapsed_ms,
                "ipo request served"
            ),
            Err(e) => {
                counter!("gmp_pipeline_failures_total", "kind" => e.kind()).increment(1);
                error!(target: "handler", error = %e, elapsed_ms, "ipo request failed");
            }
        }
        res
    }

    async fn run(&self) -> Result<PipelineOutput, PipelineError> {
        if self.api_key.is_none() {
            return Err(PipelineError::Configuration);
        }

        let outcome = self.source.acquire().await;
        info!(
            target: "handler",
            source = self.source.name(),
            live = outcome.is_live(),
            label = %outcome.source_label(),
            "snippet acquired"
        );
        let ctx = build_prompt(&outcome, &self.prompt);
        let generation = self.invoker.invoke(&ctx).await?;

        Ok(PipelineOutput {
            payload: generation.payload,
            model: generation.model,
        })
    }
}
