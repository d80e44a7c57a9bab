//! Hosted Embedding Adapters
//!
//! Blocking HTTP adapters for OpenAI, Gemini, and Ollama embedding APIs.
//! Transport failures are retried inside the call with exponential backoff;
//! what surfaces afterwards is a `Transport` error the engine maps to
//! `BackendUnavailable`.
//!
//! Callers in async contexts must wrap `embed` in `spawn_blocking`.

use std::time::Duration;

use serde_json::json;

use super::{l2_normalize, EmbedError, Embedder};
use crate::config::{EmbeddingProvider, EmbeddingTier};

/// Transport attempts before surfacing `BackendUnavailable`.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; doubles each retry.
const BACKOFF_BASE: Duration = Duration::from_millis(200);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A hosted embedding provider adapter.
pub struct RemoteEmbedder {
    provider: EmbeddingProvider,
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
}

impl RemoteEmbedder {
    /// Build an adapter from the environment. Keys:
    /// `OPENAI_API_KEY` / `GEMINI_API_KEY` (Ollama needs none), optional
    /// `OPENAI_BASE_URL` / `GEMINI_BASE_URL` / `OLLAMA_BASE_URL`, optional
    /// `EMBEDDINGS_MODEL` override.
    pub fn from_env(
        provider: EmbeddingProvider,
        tier: EmbeddingTier,
        dim: usize,
    ) -> Result<Self, crate::error::EngineError> {
        let (base_url, api_key, default_model) = match provider {
            EmbeddingProvider::Openai => (
                env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                Some(require_key("OPENAI_API_KEY")?),
                match tier {
                    EmbeddingTier::Deep => "text-embedding-3-large",
                    _ => "text-embedding-3-small",
                },
            ),
            EmbeddingProvider::Gemini => (
                env_or(
                    "GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
                Some(require_key("GEMINI_API_KEY")?),
                "text-embedding-004",
            ),
            EmbeddingProvider::Ollama => (
                env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
                None,
                "nomic-embed-text",
            ),
            EmbeddingProvider::Synthetic => {
                return Err(crate::error::EngineError::Config(
                    "synthetic provider has no remote adapter".to_string(),
                ));
            }
        };

        let model = std::env::var("EMBEDDINGS_MODEL").unwrap_or_else(|_| default_model.to_string());

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| crate::error::EngineError::Config(format!("http client: {e}")))?;

        Ok(Self {
            provider,
            client,
            base_url,
            api_key,
            model,
            dim,
        })
    }

    fn request_once(&self, text: &str) -> Result<Vec<f32>, String> {
        let raw = match self.provider {
            EmbeddingProvider::Openai => {
                let resp = self
                    .client
                    .post(format!("{}/embeddings", self.base_url))
                    .bearer_auth(self.api_key.as_deref().unwrap_or_default())
                    .json(&json!({
                        "model": self.model,
                        "input": text,
                        "dimensions": self.dim,
                    }))
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| e.to_string())?;
                let body: serde_json::Value = resp.json().map_err(|e| e.to_string())?;
                parse_floats(&body["data"][0]["embedding"])?
            }
            EmbeddingProvider::Gemini => {
                let resp = self
                    .client
                    .post(format!(
                        "{}/models/{}:embedContent?key={}",
                        self.base_url,
                        self.model,
                        self.api_key.as_deref().unwrap_or_default()
                    ))
                    .json(&json!({
                        "content": { "parts": [{ "text": text }] },
                        "outputDimensionality": self.dim,
                    }))
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| e.to_string())?;
                let body: serde_json::Value = resp.json().map_err(|e| e.to_string())?;
                parse_floats(&body["embedding"]["values"])?
            }
            EmbeddingProvider::Ollama => {
                let resp = self
                    .client
                    .post(format!("{}/api/embeddings", self.base_url))
                    .json(&json!({ "model": self.model, "prompt": text }))
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| e.to_string())?;
                let body: serde_json::Value = resp.json().map_err(|e| e.to_string())?;
                parse_floats(&body["embedding"])?
            }
            EmbeddingProvider::Synthetic => unreachable!("rejected in from_env"),
        };
        Ok(raw)
    }

    /// Providers that ignore the requested dimensionality get truncated or
    /// zero-padded to the system dimension before normalization.
    fn fit_dimension(&self, mut v: Vec<f32>) -> Vec<f32> {
        if v.len() != self.dim {
            tracing::warn!(
                provider = ?self.provider,
                got = v.len(),
                want = self.dim,
                "provider returned off-dimension embedding; refitting"
            );
            v.resize(self.dim, 0.0);
        }
        v
    }
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1));
            }
            match self.request_once(text) {
                Ok(raw) => {
                    if raw.iter().any(|x| !x.is_finite()) {
                        return Err(EmbedError::InvalidInput(
                            "provider returned non-finite embedding".to_string(),
                        ));
                    }
                    let mut v = self.fit_dimension(raw);
                    l2_normalize(&mut v);
                    return Ok(v);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "embedding request failed");
                    last_error = e;
                }
            }
        }
        Err(EmbedError::Transport {
            attempts: MAX_ATTEMPTS,
            message: last_error,
        })
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        match self.provider {
            EmbeddingProvider::Openai => "openai",
            EmbeddingProvider::Gemini => "gemini",
            EmbeddingProvider::Ollama => "ollama",
            EmbeddingProvider::Synthetic => "synthetic",
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_key(key: &str) -> Result<String, crate::error::EngineError> {
    std::env::var(key)
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| crate::error::EngineError::Config(format!("{key} is required")))
}

fn parse_floats(value: &serde_json::Value) -> Result<Vec<f32>, String> {
    value
        .as_array()
        .ok_or_else(|| "embedding field missing or not an array".to_string())?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| "non-numeric embedding component".to_string())
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_floats() {
        let value = serde_json::json!([0.1, 0.2, 0.3]);
        assert_eq!(parse_floats(&value).unwrap().len(), 3);

        let bad = serde_json::json!({"not": "array"});
        assert!(parse_floats(&bad).is_err());

        let mixed = serde_json::json!([0.1, "x"]);
        assert!(parse_floats(&mixed).is_err());
    }
}
