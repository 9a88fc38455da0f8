//! Scrape of the IPO dashboard: one bounded GET, one content region, no retry.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::normalize_text;
use super::types::{ScrapeOutcome, SnippetSource};

/// Why a scrape was abandoned. Never leaves this module as an error; it only
/// becomes the `reason` of `ScrapeOutcome::Unavailable`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("http error: {0}")]
    Http(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("invalid content selector `{0}`")]
    Selector(String),
    #[error("content region `{0}` not found")]
    RegionMissing(String),
    #[error("content too short ({len} < {min} chars)")]
    TooShort { len: usize, min: usize },
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub url: String,
    pub selector: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_chars: usize,
    pub min_chars: usize,
    pub live_label: String,
    pub simulated_label: String,
}

pub struct ContentFetcher {
    client: Client,
    settings: FetchSettings,
}

impl ContentFetcher {
    pub fn new(settings: FetchSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("building scrape http client")?;
        Ok(Self { client, settings })
    }

    /// One GET + extraction. Errors are returned here and folded by `acquire`.
    pub async fn fetch_snippet(&self) -> Result<String, FetchError> {
        let url = &self.settings.url;
        debug!(target: "ingest", %url, "fetching source page");

        let resp = self.client.get(url).send().await.map_err(|e| self.map_reqwest(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let html = resp.text().await.map_err(|e| self.map_reqwest(e))?;

        extract_region(
            &html,
            &self.settings.selector,
            self.settings.max_chars,
            self.settings.min_chars,
        )
    }

    fn map_reqwest(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.settings.timeout)
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl SnippetSource for ContentFetcher {
    async fn acquire(&self) -> ScrapeOutcome {
        super::ensure_metrics_described();
        let t0 = Instant::now();
        let res = self.fetch_snippet().await;
        histogram!("gmp_scrape_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match res {
            Ok(text) => {
                info!(target: "ingest", chars = text.chars().count(), "scraped live snippet");
                ScrapeOutcome::Success {
                    text,
                    source_label: self.settings.live_label.clone(),
                }
            }
            Err(e) => {
                warn!(target: "ingest", error = %e, url = %self.settings.url, "scraping failed, switching to simulation");
                counter!("gmp_scrape_degraded_total").increment(1);
                ScrapeOutcome::Unavailable {
                    source_label: self.settings.simulated_label.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "chittorgarh"
    }
}

/// Text of the first element matching `selector`, normalized and capped at
/// `max_chars`. Anything shorter than `min_chars` is treated as unusable.
pub fn extract_region(
    html: &str,
    selector: &str,
    max_chars: usize,
    min_chars: usize,
) -> Result<String, FetchError> {
    let sel = Selector::parse(selector).map_err(|_| FetchError::Selector(selector.to_string()))?;
    let document = Html::parse_document(html);
    let element = document
        .select(&sel)
        .next()
        .ok_or_else(|| FetchError::RegionMissing(selector.to_string()))?;

    let raw = element.text().collect::<Vec<_>>().join(" ");
    let text = normalize_text(&raw, max_chars);
    let len = text.chars().count();
    if len < min_chars {
        return Err(FetchError::TooShort { len, min: min_chars });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"<html><body>
        <div class="nav">Home | IPO</div>
        <div class="table-responsive"><table>
          <tr><th>Issuer</th><th>Open</th><th>Close</th></tr>
          <tr><td>Acme Infra Ltd</td><td>Oct 12</td><td>Oct 15</td></tr>
          <tr><td>Bharat Foods Ltd</td><td>Oct 14</td><td>Oct 17</td></tr>
        </table></div>
        <div class="table-responsive">second table</div>
    </body></html>"#;

    #[test]
    fn extracts_first_matching_region_only() {
        let text = extract_region(TABLE, ".table-responsive", 2500, 10).unwrap();
        assert!(text.starts_with("Issuer Open Close"), "{text}");
        assert!(text.contains("Bharat Foods Ltd"));
        assert!(!text.contains("second table"));
        assert!(!text.contains("Home"));
    }

    #[test]
    fn truncates_to_max_chars() {
        let text = extract_region(TABLE, ".table-responsive", 20, 10).unwrap();
        assert!(text.chars().count() <= 20);
    }

    #[test]
    fn short_region_is_unusable() {
        let html = r#"<div class="table-responsive"> n/a </div>"#;
        let err = extract_region(html, ".table-responsive", 2500, 50).unwrap_err();
        assert!(matches!(err, FetchError::TooShort { len: 3, min: 50 }));
    }

    #[test]
    fn missing_region_and_bad_selector() {
        assert!(matches!(
            extract_region("<p>hi</p>", ".table-responsive", 2500, 1),
            Err(FetchError::RegionMissing(_))
        ));
        assert!(matches!(
            extract_region("<p>hi</p>", "[[", 2500, 1),
            Err(FetchError::Selector(_))
        ));
    }
}
