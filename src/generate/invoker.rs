// src/generate/invoker.rs
//! Sequential candidate fallback: first parsed payload wins, no retry, no concurrency.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use super::backend::ModelBackend;
use super::prompt::PromptContext;
use super::sanitize::sanitize;
use crate::ipo::ResponsePayload;

/// Message recorded for candidates never called because the loop deadline passed.
pub const DEADLINE_SKIP_MESSAGE: &str = "skipped: generation deadline exceeded";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    #[serde(rename = "model")]
    pub candidate: String,
    pub message: String,
}

/// Outcome of trying one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Ok(ResponsePayload),
    Failed(AttemptFailure),
}

/// Successful run of the candidate loop.
#[derive(Debug, Clone)]
pub struct Generation {
    pub payload: ResponsePayload,
    pub model: String,
    /// Candidates that failed before `model` succeeded, in order.
    pub failures: Vec<AttemptFailure>,
}

/// Every candidate failed (or none were configured).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.summary())]
pub struct AggregateFailure {
    pub failures: Vec<AttemptFailure>,
}

impl AggregateFailure {
    pub fn last(&self) -> Option<&AttemptFailure> {
        self.failures.last()
    }

    fn summary(&self) -> String {
        match self.last() {
            Some(last) => format!(
                "all {} model candidates failed; last {}: {}",
                self.failures.len(),
                last.candidate,
                last.message
            ),
            None => "no model candidates configured".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InvokerTimeouts {
    pub per_attempt: Duration,
    pub whole_loop: Duration,
}

impl Default for InvokerTimeouts {
    fn default() -> Self {
        Self {
            per_attempt: Duration::from_secs(25),
            whole_loop: Duration::from_secs(60),
        }
    }
}

pub struct ModelInvoker {
    backend: Arc<dyn ModelBackend>,
    candidates: Vec<String>,
    timeouts: InvokerTimeouts,
}

impl ModelInvoker {
    pub fn new(backend: Arc<dyn ModelBackend>, candidates: Vec<String>, timeouts: InvokerTimeouts) -> Self {
        Self {
            backend,
            candidates,
            timeouts,
        }
    }

    /// One generation request plus sanitization, bounded by `budget`.
    pub async fn attempt(&self, candidate: &str, ctx: &PromptContext, budget: Duration) -> AttemptResult {
        let call = self.backend.generate(candidate, &ctx.prompt);
        let message = match tokio::time::timeout(budget, call).await {
            Err(_) => format!("timed out after {}ms", budget.as_millis()),
            Ok(Err(e)) => e.to_string(),
            Ok(Ok(raw)) => match sanitize(&raw) {
                Ok(payload) => return AttemptResult::Ok(payload),
                Err(e) => format!("parse error: {e}"),
            },
        };
        AttemptResult::Failed(AttemptFailure {
            candidate: candidate.to_string(),
            message,
        })
    }

    /// Try candidates strictly in order; stop at the first parsed payload.
    /// The payload's `meta.source` is always the prompt's source label.
    pub async fn invoke(&self, ctx: &PromptContext) -> Result<Generation, AggregateFailure> {
        let deadline = Instant::now() + self.timeouts.whole_loop;
        let mut failures = Vec::new();

        for candidate in &self.candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(target: "generate", model = %candidate, "skipping candidate, loop deadline exceeded");
                counter!("gmp_model_attempts_total", "model" => candidate.clone(), "outcome" => "skipped").increment(1);
                failures.push(AttemptFailure {
                    candidate: candidate.clone(),
                    message: DEADLINE_SKIP_MESSAGE.to_string(),
                });
                continue;
            }

            let budget = remaining.min(self.timeouts.per_attempt);
            match self.attempt(candidate, ctx, budget).await {
                AttemptResult::Ok(payload) => {
                    info!(
                        target: "generate",
                        model = %candidate,
                        backend = self.backend.name(),
                        ipos = payload.ipos.len(),
                        failed_before = failures.len(),
                        "model candidate succeeded"
                    );
                    counter!("gmp_model_attempts_total", "model" => candidate.clone(), "outcome" => "ok").increment(1);
                    return Ok(Generation {
                        payload: payload.with_source(ctx.source_label.clone()),
                        model: candidate.clone(),
                        failures,
                    });
                }
                AttemptResult::Failed(failure) => {
                    warn!(target: "generate", model = %candidate, error = %failure.message, "model candidate failed");
                    counter!("gmp_model_attempts_total", "model" => candidate.clone(), "outcome" => "failed").increment(1);
                    failures.push(failure);
                }
            }
        }

        Err(AggregateFailure { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::backend::BackendError;
    use crate::generate::prompt::SchemaVariant;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const GOOD: &str = r#"{"meta":{"source":"whatever the model says"},"ipos":[{"name":"Acme","dates":"d",
        "gmp":"₹10","anil_singhvi":"a","risk":"r","verdict":"v","verdict_color":"wait"}]}"#;

    enum Reply {
        Text(&'static str),
        Error(BackendError),
        Hang,
    }

    struct ScriptedBackend {
        replies: HashMap<&'static str, Reply>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<(&'static str, Reply)>) -> Arc<Self> {
            Arc::new(Self {
                replies: replies.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            })
        }
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn generate(&self, model: &str, _prompt: &str) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(model.to_string());
            match self.replies.get(model) {
                Some(Reply::Text(t)) => Ok(t.to_string()),
                Some(Reply::Error(e)) => Err(e.clone()),
                Some(Reply::Hang) => std::future::pending::<Result<String, BackendError>>().await,
                None => Err(BackendError::Api(format!("models/{model} is not found"))),
            }
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            prompt: "prompt".into(),
            schema: "{}".into(),
            source_label: "Live Data (Chittorgarh)".into(),
            variant: SchemaVariant::Single,
        }
    }

    fn invoker(backend: Arc<ScriptedBackend>, names: &[&str], timeouts: InvokerTimeouts) -> ModelInvoker {
        ModelInvoker::new(backend, names.iter().map(|s| s.to_string()).collect(), timeouts)
    }

    #[tokio::test]
    async fn third_candidate_wins_after_two_errors() {
        let backend = ScriptedBackend::new(vec![
            ("a", Reply::Error(BackendError::Api("quota exhausted".into()))),
            ("b", Reply::Error(BackendError::Status { status: 503, body: "busy".into() })),
            ("c", Reply::Text(GOOD)),
            ("d", Reply::Text(GOOD)),
        ]);
        let inv = invoker(backend.clone(), &["a", "b", "c", "d"], InvokerTimeouts::default());

        let out = inv.invoke(&ctx()).await.unwrap();
        assert_eq!(out.model, "c");
        assert_eq!(backend.calls(), vec!["a", "b", "c"]);
        assert_eq!(out.failures.len(), 2);
        assert_eq!(out.failures[0].message, "quota exhausted");
        assert_eq!(out.payload.ipos[0].name, "Acme");
        assert_eq!(out.payload.meta.source, "Live Data (Chittorgarh)");
    }

    #[tokio::test]
    async fn parse_error_fails_only_that_candidate() {
        let backend = ScriptedBackend::new(vec![
            ("a", Reply::Text("```json\n{\"ipos\": []}\n```")),
            ("b", Reply::Text(GOOD)),
        ]);
        let inv = invoker(backend.clone(), &["a", "b"], InvokerTimeouts::default());
        let out = inv.invoke(&ctx()).await.unwrap();
        assert_eq!(out.model, "b");
        assert!(out.failures[0].message.starts_with("parse error"));
    }

    #[tokio::test]
    async fn all_failing_reports_last_failure() {
        let backend = ScriptedBackend::new(vec![
            ("a", Reply::Error(BackendError::Transport("connection reset".into()))),
            ("b", Reply::Text("I cannot help with that.")),
        ]);
        let inv = invoker(backend.clone(), &["a", "b"], InvokerTimeouts::default());
        let err = inv.invoke(&ctx()).await.unwrap_err();
        assert_eq!(backend.calls(), vec!["a", "b"]);
        let last = err.last().unwrap();
        assert_eq!(last.candidate, "b");
        assert!(last.message.contains("malformed JSON"), "{}", last.message);
        assert!(err.to_string().contains("last b"));
    }

    #[tokio::test]
    async fn empty_candidate_list_is_aggregate_failure() {
        let backend = ScriptedBackend::new(vec![]);
        let inv = invoker(backend.clone(), &[], InvokerTimeouts::default());
        let err = inv.invoke(&ctx()).await.unwrap_err();
        assert!(err.failures.is_empty());
        assert_eq!(err.to_string(), "no model candidates configured");
    }

    #[tokio::test]
    async fn hanging_candidate_times_out_and_loop_moves_on() {
        let backend = ScriptedBackend::new(vec![("slow", Reply::Hang), ("fast", Reply::Text(GOOD))]);
        let timeouts = InvokerTimeouts {
            per_attempt: Duration::from_millis(50),
            whole_loop: Duration::from_secs(5),
        };
        let inv = invoker(backend.clone(), &["slow", "fast"], timeouts);
        let out = inv.invoke(&ctx()).await.unwrap();
        assert_eq!(out.model, "fast");
        assert!(out.failures[0].message.starts_with("timed out"));
    }

    #[tokio::test]
    async fn loop_deadline_skips_remaining_candidates() {
        let backend = ScriptedBackend::new(vec![("slow", Reply::Hang), ("never", Reply::Text(GOOD))]);
        let timeouts = InvokerTimeouts {
            per_attempt: Duration::from_secs(5),
            whole_loop: Duration::from_millis(50),
        };
        let inv = invoker(backend.clone(), &["slow", "never"], timeouts);
        let err = inv.invoke(&ctx()).await.unwrap_err();
        assert_eq!(backend.calls(), vec!["slow"]);
        assert_eq!(err.last().unwrap().message, DEADLINE_SKIP_MESSAGE);
    }
}
