// src/ipo.rs
//! IPO records and the response payload returned by `/api/analyze`.
//!
//! Records come exclusively from a generation back-end; this module only
//! checks their shape. GMP figures are kept as the strings the model produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix shared by every GMP field (`gmp`, `gmp_chittorgarh`, `gmp_avg`, ...).
pub const GMP_FIELD_PREFIX: &str = "gmp";

/// Key of the optional model-computed average.
pub const GMP_AVG_FIELD: &str = "gmp_avg";

/// Colour hint for the UI badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictColor {
    Apply,
    Avoid,
    Wait,
}

impl VerdictColor {
    pub const ALL: [VerdictColor; 3] = [VerdictColor::Apply, VerdictColor::Avoid, VerdictColor::Wait];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictColor::Apply => "apply",
            VerdictColor::Avoid => "avoid",
            VerdictColor::Wait => "wait",
        }
    }
}

/// One IPO as estimated by the model.
///
/// `gmp` holds every `gmp` / `gmp_<source>` field, including `gmp_avg` when the
/// breakdown schema asked for it. It is flattened back into the record on output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIpoRecord")]
pub struct IpoRecord {
    pub name: String,
    pub dates: String,
    #[serde(flatten)]
    pub gmp: BTreeMap<String, String>,
    pub anil_singhvi: String,
    pub risk: String,
    pub verdict: String,
    pub verdict_color: VerdictColor,
}

impl IpoRecord {
    /// Model-computed average, if present.
    pub fn gmp_avg(&self) -> Option<&str> {
        self.gmp.get(GMP_AVG_FIELD).map(String::as_str)
    }
}

pub(crate) fn is_gmp_key(key: &str) -> bool {
    key == GMP_FIELD_PREFIX
        || key
            .strip_prefix(GMP_FIELD_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|slug| !slug.is_empty())
}

/// Wire shape before GMP fields are separated from unrelated extras.
#[derive(Deserialize)]
struct RawIpoRecord {
    name: String,
    dates: String,
    anil_singhvi: String,
    risk: String,
    verdict: String,
    verdict_color: VerdictColor,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl TryFrom<RawIpoRecord> for IpoRecord {
    type Error = String;

    fn try_from(raw: RawIpoRecord) -> Result<Self, Self::Error> {
        let mut gmp = BTreeMap::new();
        for (key, value) in raw.extra {
            if !is_gmp_key(&key) {
                // unrelated extras are dropped, never reinterpreted
                continue;
            }
            match value {
                Value::String(s) => {
                    gmp.insert(key, s);
                }
                other => {
                    return Err(format!(
                        "field `{key}` must be a string, got {}",
                        json_kind(&other)
                    ))
                }
            }
        }
        if gmp.keys().all(|k| k == GMP_AVG_FIELD) {
            return Err("record has no `gmp` or `gmp_<source>` field".to_string());
        }
        Ok(IpoRecord {
            name: raw.name,
            dates: raw.dates,
            gmp,
            anil_singhvi: raw.anil_singhvi,
            risk: raw.risk,
            verdict: raw.verdict,
            verdict_color: raw.verdict_color,
        })
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub source: String,
}

/// The only externally observable artifact of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub meta: Meta,
    pub ipos: Vec<IpoRecord>,
}

impl ResponsePayload {
    /// Replace whatever label the model echoed with the one actually used.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = source.into();
        self
    }
}
