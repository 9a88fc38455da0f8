// src/ingest/mod.rs
pub mod fetcher;
pub mod types;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

pub use fetcher::{extract_region, ContentFetcher, FetchError, FetchSettings};
pub use types::{ScrapeOutcome, SnippetSource};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "gmp_scrape_degraded_total",
            "Scrapes that fell back to the simulation path."
        );
        describe_histogram!("gmp_scrape_ms", "Scrape round-trip time in milliseconds.");
    });
}

/// Normalize scraped text: decode entities, collapse whitespace, cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let decoded = html_escape::decode_html_entities(s);

    // 2) Collapse whitespace (table cells come out as runs of newlines/tabs)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    let collapsed = re_ws.replace_all(&decoded, " ");
    let out = collapsed.trim();

    // 3) Length cap in chars, never splitting a code point
    match out.char_indices().nth(max_chars) {
        Some((cut, _)) => out[..cut].trim_end().to_string(),
        None => out.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_decodes() {
        let s = "  Acme&nbsp;IPO \n\n\t  ₹120&ndash;₹126  ";
        let out = normalize_text(s, 100);
        assert_eq!(out, "Acme IPO ₹120–₹126");
    }

    #[test]
    fn normalize_text_caps_on_char_boundary() {
        let s = "₹₹₹₹₹";
        assert_eq!(normalize_text(s, 3), "₹₹₹");
        assert_eq!(normalize_text(s, 10), "₹₹₹₹₹");
    }
}
