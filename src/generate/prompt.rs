// src/generate/prompt.rs
//! Deterministic prompt rendering. Same outcome + settings => same prompt, byte for byte.

use serde::{Deserialize, Serialize};

use crate::ingest::ScrapeOutcome;
use crate::ipo::{VerdictColor, GMP_AVG_FIELD, GMP_FIELD_PREFIX};

/// Embedded in place of the snippet when the scrape was unavailable.
pub const SIMULATION_DIRECTIVE: &str =
    "Scraping failed. Please generate realistic simulated data for current active IPOs in India.";

/// Which GMP layout the model is asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    /// One `gmp_<source>` per comparison site plus `gmp_avg`.
    #[default]
    Breakdown,
    /// A single scalar `gmp`.
    Single,
}

impl std::str::FromStr for SchemaVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakdown" => Ok(SchemaVariant::Breakdown),
            "single" => Ok(SchemaVariant::Single),
            other => anyhow::bail!("unknown schema variant: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub schema: SchemaVariant,
    /// Comparison sites, in the order they appear in the schema.
    pub gmp_sources: Vec<String>,
    pub ipo_count: usize,
}

/// Everything the invoker needs; built once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub prompt: String,
    pub schema: String,
    pub source_label: String,
    pub variant: SchemaVariant,
}

/// `IPO Ji` -> `gmp_ipoji`.
pub fn gmp_field(source: &str) -> String {
    let slug: String = source
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("{GMP_FIELD_PREFIX}_{slug}")
}

pub fn build_prompt(outcome: &ScrapeOutcome, settings: &PromptSettings) -> PromptContext {
    let source_label = outcome.source_label().to_string();
    let source_data = match outcome {
        ScrapeOutcome::Success { text, .. } => text.as_str(),
        ScrapeOutcome::Unavailable { .. } => SIMULATION_DIRECTIVE,
    };
    let schema = render_schema(settings, &source_label);
    let task = render_task(settings);

    let prompt = format!(
        "Context: We are tracking Indian Mainboard IPOs.\n\
         Source Data: \"\"\"{source_data}\"\"\"\n\
         \n\
         Task:\n\
         {task}\n\
         Output STRICTLY in this JSON format:\n\
         {schema}\n"
    );

    PromptContext {
        prompt,
        schema,
        source_label,
        variant: settings.schema,
    }
}

fn render_task(settings: &PromptSettings) -> String {
    let mut steps = vec![format!(
        "Identify top {} CURRENT or UPCOMING Mainboard IPOs.",
        settings.ipo_count
    )];
    match settings.schema {
        SchemaVariant::Breakdown => {
            steps.push(format!(
                "ESTIMATE the GMP for {} websites ({}).",
                settings.gmp_sources.len(),
                settings.gmp_sources.join(", ")
            ));
            steps.push("Calculate Average GMP.".to_string());
        }
        SchemaVariant::Single => {
            steps.push("ESTIMATE the current GMP of each IPO.".to_string());
        }
    }
    steps.push("Act as Anil Singhvi: Give a verdict.".to_string());

    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}\n", i + 1))
        .collect()
}

fn render_schema(settings: &PromptSettings, source_label: &str) -> String {
    let mut gmp_lines = Vec::new();
    match settings.schema {
        SchemaVariant::Breakdown => {
            let values: Vec<usize> = (0..settings.gmp_sources.len()).map(|i| 50 + i * 2).collect();
            for (source, value) in settings.gmp_sources.iter().zip(&values) {
                gmp_lines.push(format!("\"{}\": \"₹{value}\"", gmp_field(source)));
            }
            gmp_lines.push(format!("\"{GMP_AVG_FIELD}\": \"₹{}\"", example_average(&values)));
        }
        SchemaVariant::Single => gmp_lines.push(format!("\"{GMP_FIELD_PREFIX}\": \"₹50\"")),
    }

    let colors = VerdictColor::ALL
        .iter()
        .map(|c| format!("'{}'", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut record = vec![
        "\"name\": \"IPO Name\"".to_string(),
        "\"dates\": \"Start - End\"".to_string(),
    ];
    record.extend(gmp_lines);
    record.extend([
        "\"anil_singhvi\": \"Apply for Listing Gain\"".to_string(),
        "\"risk\": \"Medium - Reason\"".to_string(),
        "\"verdict\": \"MUST APPLY\"".to_string(),
        "\"verdict_color\": \"apply\"".to_string(),
    ]);

    format!(
        "{{\n  \"meta\": {{ \"source\": {} }},\n  \"ipos\": [\n    {{\n      {}\n    }}\n  ]\n}}\n(verdict_color: {colors})",
        serde_json::Value::String(source_label.to_string()),
        record.join(",\n      ")
    )
}

/// Mean of the example figures, without trailing zeros (`53`, `51.5`).
fn example_average(values: &[usize]) -> String {
    if values.is_empty() {
        return "0".to_string();
    }
    let mean = values.iter().sum::<usize>() as f64 / values.len() as f64;
    let text = format!("{mean:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
