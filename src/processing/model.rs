//! Model backend capability — the only source of vectors, summaries and
//! generated text in the system.
//!
//! Callers treat a failure as "proceed without": a percept that cannot be
//! embedded is still stored, it just skips semantic routing and
//! clustering for the cycle.

use std::time::Duration;

use crate::constants::MODEL_TIMEOUT_SECS;
use crate::{CortexError, CortexResult};

pub trait ModelClient: Send + Sync {
    /// Dense embedding of a text.
    fn embed(&self, text: &str) -> CortexResult<Vec<f32>>;

    /// Short summary of `"<speaker>: <content>"` fragments.
    fn summarize(&self, fragments: &[String]) -> CortexResult<String>;

    /// Free-form generation (goal strings, reflex phrasing).
    fn generate(&self, prompt: &str) -> CortexResult<String>;
}

/// Cosine similarity between two vectors. Mismatched or empty vectors
/// score 0.0 so unembedded records never win a similarity contest.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Map cosine similarity from [-1, 1] to [0, 1] for weighted scoring.
pub fn normalized_similarity(cos: f64) -> f64 {
    (cos / 2.0 + 0.5).clamp(0.0, 1.0)
}

/// HTTP client for an OpenAI-compatible backend (`/embeddings`,
/// `/chat/completions`). Works against hosted APIs and local servers.
pub struct HttpModelClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    embed_model: String,
    timeout: Duration,
}

impl HttpModelClient {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str, embed_model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            embed_model: embed_model.to_string(),
            timeout: Duration::from_secs(MODEL_TIMEOUT_SECS),
        }
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> CortexResult<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = ureq::post(&url).header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", &format!("Bearer {}", key));
        }
        let payload =
            serde_json::to_vec(body).map_err(|e| CortexError::Model(e.to_string()))?;
        let mut response = req
            .config()
            .timeout_global(Some(self.timeout))
            .build()
            .send(payload.as_slice())
            .map_err(|e| CortexError::Model(format!("POST {}: {}", path, e)))?;
        response
            .body_mut()
            .read_json::<serde_json::Value>()
            .map_err(|e| CortexError::Model(format!("decode {}: {}", path, e)))
    }

    fn chat(&self, system: &str, user: &str) -> CortexResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
        });
        let json = self.post("/chat/completions", &body)?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CortexError::Model("no completion content".to_string()))
    }
}

impl ModelClient for HttpModelClient {
    fn embed(&self, text: &str) -> CortexResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": text,
        });
        let json = self.post("/embeddings", &body)?;
        let values = json["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| CortexError::Model("no embedding in response".to_string()))?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();
        if vector.is_empty() {
            return Err(CortexError::Model("empty embedding".to_string()));
        }
        Ok(vector)
    }

    fn summarize(&self, fragments: &[String]) -> CortexResult<String> {
        self.chat(
            "Summarize the following conversation fragments into one or two \
             factual sentences. Keep names, times and corrections.",
            &fragments.join("\n"),
        )
    }

    fn generate(&self, prompt: &str) -> CortexResult<String> {
        self.chat("You are a concise assistant.", prompt)
    }
}
