//! Daemon configuration.
//!
//! Resolution order: built-in defaults, then `{state_path}/config.toml`
//! if present, then environment variables. The state path itself comes
//! from `CORTEX_STATE_PATH` (or legacy `STATE_PATH`), defaulting to the
//! platform data directory.

use std::path::PathBuf;

use serde::Deserialize;

use crate::constants::DEFAULT_DAILY_BUDGET_MIN;
use crate::{CortexError, CortexResult};

#[derive(Debug, Clone)]
pub struct Config {
    /// State directory root: journals, snapshots, seed file, log.
    pub state_path: PathBuf,
    /// Daily executive thinking budget, in minutes.
    pub daily_budget_min: u64,
    /// Whether the autonomous wake timer emits impulses at all.
    pub autonomous_wake: bool,
    /// Interval between autonomous wake impulses, in minutes.
    pub wake_interval_min: u64,
    pub chat_token: Option<String>,
    /// Platform user id of the owner; drives the `from:owner` tag.
    pub chat_owner: Option<String>,
    pub calendar_url: Option<String>,
    pub calendar_token: Option<String>,
    /// Generation/summarization model identifier.
    pub model: String,
    pub embed_model: String,
    pub model_base_url: String,
    pub model_api_key: Option<String>,
    /// Synthetic mode: deterministic embeddings, no network ports.
    pub synthetic: bool,
}

/// Optional TOML overlay; every field optional so a partial file works.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    daily_budget_min: Option<u64>,
    autonomous_wake: Option<bool>,
    wake_interval_min: Option<u64>,
    chat_token: Option<String>,
    chat_owner: Option<String>,
    calendar_url: Option<String>,
    calendar_token: Option<String>,
    model: Option<String>,
    embed_model: Option<String>,
    model_base_url: Option<String>,
    model_api_key: Option<String>,
    synthetic: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            daily_budget_min: DEFAULT_DAILY_BUDGET_MIN,
            autonomous_wake: true,
            wake_interval_min: 30,
            chat_token: None,
            chat_owner: None,
            calendar_url: None,
            calendar_token: None,
            model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            model_base_url: "https://api.openai.com/v1".to_string(),
            model_api_key: None,
            synthetic: false,
        }
    }
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cortexd")
}

impl Config {
    /// Resolve the full configuration (defaults <- file <- env).
    pub fn load() -> CortexResult<Self> {
        let mut cfg = Self::default();

        if let Some(p) = env_str("CORTEX_STATE_PATH").or_else(|| env_str("STATE_PATH")) {
            cfg.state_path = PathBuf::from(p);
        }

        let file_path = cfg.state_path.join("config.toml");
        if file_path.exists() {
            let raw = std::fs::read_to_string(&file_path)?;
            let file: FileConfig = toml::from_str(&raw)
                .map_err(|e| CortexError::Config(format!("{}: {}", file_path.display(), e)))?;
            cfg.apply_file(file);
        }

        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_file(&mut self, f: FileConfig) {
        if let Some(v) = f.daily_budget_min {
            self.daily_budget_min = v;
        }
        if let Some(v) = f.autonomous_wake {
            self.autonomous_wake = v;
        }
        if let Some(v) = f.wake_interval_min {
            self.wake_interval_min = v;
        }
        self.chat_token = f.chat_token.or(self.chat_token.take());
        self.chat_owner = f.chat_owner.or(self.chat_owner.take());
        self.calendar_url = f.calendar_url.or(self.calendar_url.take());
        self.calendar_token = f.calendar_token.or(self.calendar_token.take());
        if let Some(v) = f.model {
            self.model = v;
        }
        if let Some(v) = f.embed_model {
            self.embed_model = v;
        }
        if let Some(v) = f.model_base_url {
            self.model_base_url = v;
        }
        self.model_api_key = f.model_api_key.or(self.model_api_key.take());
        if let Some(v) = f.synthetic {
            self.synthetic = v;
        }
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_u64("CORTEX_DAILY_BUDGET_MIN") {
            self.daily_budget_min = v;
        }
        if let Some(v) = env_bool("CORTEX_AUTONOMOUS_WAKE") {
            self.autonomous_wake = v;
        }
        if let Some(v) = env_u64("CORTEX_WAKE_INTERVAL_MIN") {
            self.wake_interval_min = v.max(1);
        }
        self.chat_token = env_str("CORTEX_CHAT_TOKEN").or(self.chat_token.take());
        self.chat_owner = env_str("CORTEX_CHAT_OWNER").or(self.chat_owner.take());
        self.calendar_url = env_str("CORTEX_CALENDAR_URL").or(self.calendar_url.take());
        self.calendar_token = env_str("CORTEX_CALENDAR_TOKEN").or(self.calendar_token.take());
        if let Some(v) = env_str("CORTEX_MODEL") {
            self.model = v;
        }
        if let Some(v) = env_str("CORTEX_EMBED_MODEL") {
            self.embed_model = v;
        }
        if let Some(v) = env_str("CORTEX_MODEL_BASE_URL") {
            self.model_base_url = v;
        }
        self.model_api_key = env_str("CORTEX_MODEL_API_KEY").or(self.model_api_key.take());
        if let Some(v) = env_bool("CORTEX_SYNTHETIC") {
            self.synthetic = v;
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|v| v.parse().ok())
}
