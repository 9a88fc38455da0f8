// src/ingest/types.rs

/// Result of the single scrape attempt made per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// Normalized, truncated text of the content region.
    Success { text: String, source_label: String },
    /// Scrape failed for any reason; the pipeline switches to simulation.
    Unavailable { source_label: String, reason: String },
}

impl ScrapeOutcome {
    pub fn source_label(&self) -> &str {
        match self {
            ScrapeOutcome::Success { source_label, .. }
            | ScrapeOutcome::Unavailable { source_label, .. } => source_label,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ScrapeOutcome::Success { .. })
    }
}

/// Anything that can produce a snippet for the prompt. Never fails: errors are
/// folded into `ScrapeOutcome::Unavailable`.
#[async_trait::async_trait]
pub trait SnippetSource: Send + Sync {
    async fn acquire(&self) -> ScrapeOutcome;
    fn name(&self) -> &'static str;
}
