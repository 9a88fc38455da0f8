// src/config/tracker.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, env, fs, path::Path, time::Duration};

use crate::generate::{gmp_field, InvokerTimeouts, PromptSettings, SchemaVariant};
use crate::ingest::FetchSettings;
use crate::ipo::GMP_FIELD_PREFIX;

pub const DEFAULT_TRACKER_CONFIG_PATH: &str = "config/tracker.toml";
pub const ENV_TRACKER_CONFIG_PATH: &str = "TRACKER_CONFIG_PATH";
pub const ENV_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_CANDIDATES: &str = "TRACKER_CANDIDATES";
pub const ENV_SCHEMA: &str = "TRACKER_SCHEMA";

const SCRAPE_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 4..=6;

fn default_source_url() -> String {
    "https://www.chittorgarh.com/ipo/ipo_dashboard.asp".to_string()
}
fn default_selector() -> String {
    ".table-responsive".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}
fn default_scrape_timeout_secs() -> u64 {
    5
}
fn default_max_snippet_chars() -> usize {
    2500
}
fn default_min_snippet_chars() -> usize {
    50
}
fn default_live_label() -> String {
    "Live Data (Chittorgarh)".to_string()
}
fn default_simulated_label() -> String {
    "AI Simulation (Scraping Failed)".to_string()
}
fn default_candidates() -> Vec<String> {
    ["gemini-flash-latest", "gemini-pro", "gemini-1.5-flash"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_gmp_sources() -> Vec<String> {
    ["Chittorgarh", "IPOWatch", "InvestorGain", "IPO Ji"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_ipo_count() -> usize {
    3
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_attempt_timeout_secs() -> u64 {
    25
}
fn default_loop_timeout_secs() -> u64 {
    60
}
fn default_api_key() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_selector")]
    pub content_selector: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Clamped to 4..=6 seconds.
    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
    #[serde(default = "default_min_snippet_chars")]
    pub min_snippet_chars: usize,
    #[serde(default = "default_live_label")]
    pub live_label: String,
    #[serde(default = "default_simulated_label")]
    pub simulated_label: String,
    /// Highest priority first.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub schema: SchemaVariant,
    #[serde(default = "default_gmp_sources")]
    pub gmp_sources: Vec<String>,
    #[serde(default = "default_ipo_count")]
    pub ipo_count: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_loop_timeout_secs")]
    pub loop_timeout_secs: u64,
    /// "ENV" means: read from GOOGLE_API_KEY. Never serialized back out.
    #[serde(default = "default_api_key", skip_serializing)]
    pub api_key: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            content_selector: default_selector(),
            user_agent: default_user_agent(),
            scrape_timeout_secs: default_scrape_timeout_secs(),
            max_snippet_chars: default_max_snippet_chars(),
            min_snippet_chars: default_min_snippet_chars(),
            live_label: default_live_label(),
            simulated_label: default_simulated_label(),
            candidates: default_candidates(),
            schema: SchemaVariant::default(),
            gmp_sources: default_gmp_sources(),
            ipo_count: default_ipo_count(),
            api_base: default_api_base(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            loop_timeout_secs: default_loop_timeout_secs(),
            api_key: default_api_key(),
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: TrackerConfig = toml::from_str(s).context("parsing tracker config")?;
        cfg.normalize()?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading tracker config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Load using env var + fallbacks:
    /// 1) $TRACKER_CONFIG_PATH (must exist)
    /// 2) config/tracker.toml
    /// 3) built-in defaults
    ///
    /// Env overrides (`TRACKER_CANDIDATES`, `TRACKER_SCHEMA`) are applied last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = match env::var(ENV_TRACKER_CONFIG_PATH) {
            Ok(p) => Self::load_from_file(&p)
                .with_context(|| format!("{ENV_TRACKER_CONFIG_PATH} points to an unusable file"))?,
            Err(_) if Path::new(DEFAULT_TRACKER_CONFIG_PATH).exists() => {
                Self::load_from_file(DEFAULT_TRACKER_CONFIG_PATH)?
            }
            Err(_) => {
                let mut cfg = Self::default();
                cfg.normalize()?;
                cfg
            }
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(list) = env::var(ENV_CANDIDATES) {
            self.candidates = split_list(&list);
        }
        if let Ok(s) = env::var(ENV_SCHEMA) {
            self.schema = s.parse()?;
        }
        self.validate()
    }

    fn normalize(&mut self) -> Result<()> {
        self.scrape_timeout_secs = self
            .scrape_timeout_secs
            .clamp(*SCRAPE_TIMEOUT_RANGE.start(), *SCRAPE_TIMEOUT_RANGE.end());
        self.candidates = self
            .candidates
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            anyhow::bail!("at least one model candidate is required");
        }
        if self.schema == SchemaVariant::Breakdown && self.gmp_sources.is_empty() {
            anyhow::bail!("breakdown schema needs at least one gmp source");
        }
        let mut fields = HashSet::new();
        for source in &self.gmp_sources {
            let field = gmp_field(source);
            if field.len() == GMP_FIELD_PREFIX.len() + 1 {
                anyhow::bail!("gmp source {source:?} has no alphanumeric characters");
            }
            if !fields.insert(field.clone()) {
                anyhow::bail!("gmp source {source:?} collides with another source on `{field}`");
            }
        }
        if self.attempt_timeout_secs == 0 || self.loop_timeout_secs == 0 {
            anyhow::bail!("attempt_timeout_secs and loop_timeout_secs must be positive");
        }
        if self.min_snippet_chars > self.max_snippet_chars {
            anyhow::bail!(
                "min_snippet_chars ({}) exceeds max_snippet_chars ({})",
                self.min_snippet_chars,
                self.max_snippet_chars
            );
        }
        Ok(())
    }

    /// The credential, resolved. `None` when "ENV" and the variable is unset or blank.
    pub fn resolve_api_key(&self) -> Option<String> {
        let raw = if self.api_key.trim().eq_ignore_ascii_case("env") {
            env::var(ENV_API_KEY).ok()?
        } else {
            self.api_key.clone()
        };
        let key = raw.trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            url: self.source_url.clone(),
            selector: self.content_selector.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.scrape_timeout_secs),
            max_chars: self.max_snippet_chars,
            min_chars: self.min_snippet_chars,
            live_label: self.live_label.clone(),
            simulated_label: self.simulated_label.clone(),
        }
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            schema: self.schema,
            gmp_sources: self.gmp_sources.clone(),
            ipo_count: self.ipo_count,
        }
    }

    pub fn invoker_timeouts(&self) -> InvokerTimeouts {
        InvokerTimeouts {
            per_attempt: Duration::from_secs(self.attempt_timeout_secs),
            whole_loop: Duration::from_secs(self.loop_timeout_secs),
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}
