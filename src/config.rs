//! TOML configuration.
//!
//! Every section is optional; a missing config file yields [`Config::default`].
//!
//! ```toml
//! [engine]
//! default_connection = "sqlite:///example.db"
//! cache_capacity = 100
//!
//! [store]
//! path = "storage/ingestion.db"
//!
//! [pool]
//! size = 5
//! max_overflow = 10
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [intent]
//! examples_path = "data/intent_examples.jsonl"
//! threshold = 0.55
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Used when a request carries no connection string.
    #[serde(default = "default_connection")]
    pub default_connection: String,
    #[serde(default = "default_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_doc_limit")]
    pub default_doc_limit: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_connection: default_connection(),
            cache_capacity: default_capacity(),
            history_capacity: default_capacity(),
            latency_window: default_latency_window(),
            default_limit: default_limit(),
            default_doc_limit: default_doc_limit(),
        }
    }
}

fn default_connection() -> String {
    "sqlite:///example.db".to_string()
}
fn default_capacity() -> usize {
    100
}
fn default_latency_window() -> usize {
    500
}
fn default_limit() -> i64 {
    50
}
fn default_doc_limit() -> i64 {
    8
}

/// The ingestion store written by the document pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("storage/ingestion.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: u32,
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            max_overflow: default_max_overflow(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_pool_size() -> u32 {
    5
}
fn default_max_overflow() -> u32 {
    10
}
fn default_acquire_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Semantic intent classifier backed by labelled examples.
#[derive(Debug, Deserialize, Clone)]
pub struct IntentConfig {
    #[serde(default = "default_examples_path")]
    pub examples_path: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            examples_path: default_examples_path(),
            index_path: default_index_path(),
            threshold: default_threshold(),
        }
    }
}

fn default_examples_path() -> PathBuf {
    PathBuf::from("data/intent_examples.jsonl")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("storage/intent_index.json")
}
fn default_threshold() -> f32 {
    0.55
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.engine.cache_capacity == 0 {
        bail!("engine.cache_capacity must be > 0");
    }
    if config.engine.history_capacity == 0 {
        bail!("engine.history_capacity must be > 0");
    }
    if config.engine.latency_window == 0 {
        bail!("engine.latency_window must be > 0");
    }
    if config.engine.default_limit < 1 || config.engine.default_doc_limit < 1 {
        bail!("engine.default_limit and engine.default_doc_limit must be >= 1");
    }
    if config.pool.size == 0 {
        bail!("pool.size must be > 0");
    }
    if !(0.0..=1.0).contains(&config.intent.threshold) {
        bail!("intent.threshold must be in [0.0, 1.0]");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
