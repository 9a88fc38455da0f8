// tests/support/mod.rs
// Counting fakes for the two outbound seams (scrape + generation back-end).
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ipo_gmp_tracker::generate::{BackendError, InvokerTimeouts, ModelBackend, ModelInvoker, PromptSettings, SchemaVariant};
use ipo_gmp_tracker::ingest::{ScrapeOutcome, SnippetSource};
use ipo_gmp_tracker::RequestHandler;

pub const LIVE_LABEL: &str = "Live Data (Chittorgarh)";
pub const SIMULATED_LABEL: &str = "AI Simulation (Scraping Failed)";

pub fn ipo_json(name: &str) -> String {
    format!(
        r#"{{"meta":{{"source":"{LIVE_LABEL}"}},"ipos":[{{"name":"{name}","dates":"12 Oct - 15 Oct",
        "gmp_chittorgarh":"₹50","gmp_ipowatch":"₹52","gmp_investorgain":"₹55","gmp_ipoji":"₹48",
        "gmp_avg":"₹51.25","anil_singhvi":"Apply for Listing Gain","risk":"Medium - Reason",
        "verdict":"MUST APPLY","verdict_color":"apply"}}]}}"#
    )
}

pub struct FakeSource {
    outcome: ScrapeOutcome,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn live(text: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: ScrapeOutcome::Success {
                text: text.to_string(),
                source_label: LIVE_LABEL.to_string(),
            },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: ScrapeOutcome::Unavailable {
                source_label: SIMULATED_LABEL.to_string(),
                reason: reason.to_string(),
            },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnippetSource for FakeSource {
    async fn acquire(&self) -> ScrapeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Replies per model; unknown models answer with an explicit API error.
pub struct FakeBackend {
    replies: HashMap<String, Result<String, BackendError>>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(replies: Vec<(&str, Result<String, BackendError>)>) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for FakeBackend {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(model.to_string());
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .get(model)
            .cloned()
            .unwrap_or_else(|| Err(BackendError::Api(format!("models/{model} is not found"))))
    }
    fn name(&self) -> &'static str {
        "fake"
    }
}

pub fn prompt_settings() -> PromptSettings {
    PromptSettings {
        schema: SchemaVariant::Breakdown,
        gmp_sources: vec![
            "Chittorgarh".into(),
            "IPOWatch".into(),
            "InvestorGain".into(),
            "IPO Ji".into(),
        ],
        ipo_count: 3,
    }
}

pub fn handler(
    api_key: Option<&str>,
    source: Arc<dyn SnippetSource>,
    backend: Arc<dyn ModelBackend>,
    candidates: &[&str],
) -> RequestHandler {
    let invoker = ModelInvoker::new(
        backend,
        candidates.iter().map(|c| c.to_string()).collect(),
        InvokerTimeouts {
            per_attempt: Duration::from_secs(2),
            whole_loop: Duration::from_secs(5),
        },
    );
    RequestHandler::new(api_key.map(String::from), source, prompt_settings(), invoker)
}
