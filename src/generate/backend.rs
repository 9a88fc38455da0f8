// src/generate/backend.rs
//! Generation back-ends. One request per call, no retry, no caching.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Why one generation request failed. Always scoped to a single candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The back-end answered with an explicit error object.
    #[error("{0}")]
    Api(String),
    #[error("undecodable response: {0}")]
    Decode(String),
    #[error("response carried no text")]
    NoText,
}

/// Low-level provider: sends the full prompt to `model` and returns its raw text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError>;
    fn name(&self) -> &'static str;
}

/// Google Generative Language `generateContent`.
pub struct GeminiBackend {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ipo-gmp-tracker/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building gemini http client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}
#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}
#[derive(Serialize)]
struct GenerateReq<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateResp {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    candidates: Vec<Candidate>,
}
#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}
#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}
#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}
#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Decode a `generateContent` body into the text of the first candidate.
/// An explicit `error` object wins over the HTTP status.
pub(crate) fn decode_generate_body(status: u16, body: &str) -> Result<String, BackendError> {
    let parsed: GenerateResp = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) if (200..300).contains(&status) => return Err(BackendError::Decode(e.to_string())),
        Err(_) => {
            return Err(BackendError::Status {
                status,
                body: body.chars().take(300).collect(),
            })
        }
    };

    if let Some(err) = parsed.error {
        let msg = match err.status {
            Some(s) if !err.message.is_empty() => format!("{s}: {}", err.message),
            Some(s) => s,
            None => err.message,
        };
        return Err(BackendError::Api(msg));
    }
    if !(200..300).contains(&status) {
        return Err(BackendError::Status {
            status,
            body: body.chars().take(300).collect(),
        });
    }

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(BackendError::NoText);
    }
    Ok(text)
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        let req = GenerateReq {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let resp = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;
        decode_generate_body(status, &body)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"```json\n{"},{"text":"}\n```"}]}},
            {"content":{"parts":[{"text":"ignored"}]}}]}"#;
        assert_eq!(decode_generate_body(200, body).unwrap(), "```json\n{}\n```");
    }

    #[test]
    fn explicit_error_object_is_api_error() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            decode_generate_body(429, body),
            Err(BackendError::Api("RESOURCE_EXHAUSTED: Quota exceeded".into()))
        );
    }

    #[test]
    fn non_json_error_page_keeps_status() {
        match decode_generate_body(502, "<html>Bad Gateway</html>") {
            Err(BackendError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert!(body.contains("Bad Gateway"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_success_body_is_decode_error() {
        assert!(matches!(decode_generate_body(200, "not json"), Err(BackendError::Decode(_))));
    }

    #[test]
    fn blocked_candidate_without_text() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert_eq!(decode_generate_body(200, body), Err(BackendError::NoText));
    }

    #[test]
    fn endpoint_is_keyed_by_model() {
        let b = GeminiBackend::new("https://example.test/v1beta/", "k").unwrap();
        assert_eq!(
            b.endpoint("gemini-pro"),
            "https://example.test/v1beta/models/gemini-pro:generateContent"
        );
    }
}
