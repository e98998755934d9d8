//! TOML configuration parsing and validation.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a working local setup: Ollama for embeddings and chat, a SQLite
//! vector index and a JSON catalog under `./data`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
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

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    /// `"sqlite"` (persistent) or `"memory"` (lost on restart).
    #[serde(default = "default_index_backend")]
    pub index_backend: String,
    /// Where uploads are spooled during extraction. Defaults to the OS temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            index_path: default_index_path(),
            index_backend: default_index_backend(),
            temp_dir: None,
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./data/document_info.json")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}
fn default_index_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same page.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL override (Ollama host or OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    /// Expected dimensionality; checked against every returned vector when set.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            url: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Tool-calling rounds before the agent is forced to answer.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            temperature: default_temperature(),
            max_turns: default_max_turns(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_turns() -> usize {
    6
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about the user's uploaded PDF documents. \
     When a question may be answered by those documents, call the pdf_retriever tool and base \
     your answer on the excerpts it returns. Answer general questions directly."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info,tower_http=info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when set");
        }
        match self.embedding.provider.as_str() {
            "ollama" | "openai" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be ollama, openai, or local.",
                other
            ),
        }

        if self.llm.max_turns < 1 {
            anyhow::bail!("llm.max_turns must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }
        match self.llm.provider.as_str() {
            "ollama" | "openai" => {}
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be ollama or openai.",
                other
            ),
        }

        match self.storage.index_backend.as_str() {
            "sqlite" | "memory" => {}
            other => anyhow::bail!(
                "Unknown storage.index_backend: '{}'. Must be sqlite or memory.",
                other
            ),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => anyhow::bail!("Unknown logging.format: '{}'. Must be pretty or json.", other),
        }

        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Loads `path` if it exists; otherwise returns validated defaults when
/// `allow_missing` is set (the CLI passes `true` for its default path only).
pub fn load_or_default(path: &Path, allow_missing: bool) -> Result<Config> {
    if !path.exists() && allow_missing {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    load_config(path)
}
