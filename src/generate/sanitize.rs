// src/generate/sanitize.rs
//! Turn raw model text into a `ResponsePayload`.
//!
//! Accepted input forms, after trimming surrounding whitespace:
//! - a bare JSON object;
//! - the same object inside one code fence, with or without an info string
//!   (```` ```json ````, ```` ``` ````).
//!
//! Anything else fails with a `ParseError`. Nothing is coerced: a record that
//! does not match the advertised schema fails the whole payload.

use serde_json::Value;

use crate::ipo::{IpoRecord, Meta, ResponsePayload};

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty model output")]
    Empty,
    #[error("opening code fence is never closed")]
    UnterminatedFence,
    #[error("code fence markers left after stripping")]
    ResidualFence,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("top-level value is not an object")]
    NotAnObject,
    #[error("missing required field `ipos`")]
    MissingIpos,
    #[error("`ipos` must be an array")]
    IposNotArray,
    #[error("`ipos` is empty")]
    EmptyIpos,
    #[error("invalid `meta`: {0}")]
    InvalidMeta(String),
    #[error("ipos[{index}]: {message}")]
    InvalidRecord { index: usize, message: String },
}

/// Strip one surrounding code fence, if any. Returns the inner text.
pub fn strip_wrappers(raw: &str) -> Result<&str, ParseError> {
    let trimmed = raw.trim();
    let inner = match trimmed.strip_prefix(FENCE) {
        Some(rest) => {
            // drop the info string (`json`, `JSON`, ...) on the opening line
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            rest.strip_suffix(FENCE)
                .ok_or(ParseError::UnterminatedFence)?
                .trim()
        }
        None => trimmed,
    };
    if inner.contains(FENCE) {
        return Err(ParseError::ResidualFence);
    }
    if inner.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(inner)
}

pub fn sanitize(raw: &str) -> Result<ResponsePayload, ParseError> {
    let text = strip_wrappers(raw)?;
    let value: Value = serde_json::from_str(text).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let Value::Object(mut obj) = value else {
        return Err(ParseError::NotAnObject);
    };
    let ipos = match obj.remove("ipos") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ParseError::IposNotArray),
        None => return Err(ParseError::MissingIpos),
    };
    if ipos.is_empty() {
        return Err(ParseError::EmptyIpos);
    }

    let meta: Meta = match obj.remove("meta") {
        Some(m) => serde_json::from_value(m).map_err(|e| ParseError::InvalidMeta(e.to_string()))?,
        None => Meta::default(),
    };

    let ipos = ipos
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<IpoRecord>(item).map_err(|e| ParseError::InvalidRecord {
                index,
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResponsePayload { meta, ipos })
}
