use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ltm_types::Descriptor;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Home directory not found")]
    NoDirFound,
}

/// Name of the folder under `$HOME` that holds default backend storage.
pub const MEMORY_FOLDER: &str = "memory";

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    /// Provider name ("openai" or "hashing").
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name, provider-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Output dimensionality.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// API key. Falls back to the provider's environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "hashing".to_string()
}

fn default_dimensions() -> usize {
    384
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dimensions: default_dimensions(),
            api_key: None,
        }
    }
}

/// Top-level LTM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtmConfig {
    #[serde(default)]
    pub embedder: EmbedderSettings,
    /// Descriptor of the vector store to build.
    #[serde(default = "default_vector_store")]
    pub vector_store: Descriptor,
    /// Descriptor of the datasource to build.
    #[serde(default = "default_datasource")]
    pub datasource: Descriptor,
    /// Result count used when a retrieval asks for zero documents.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_vector_store() -> Descriptor {
    Descriptor {
        kind: "local".to_string(),
        config: serde_json::json!({
            "dimensions": default_dimensions(),
            "metric": "cosine",
        }),
    }
}

fn default_datasource() -> Descriptor {
    Descriptor {
        kind: "sqlite".to_string(),
        config: serde_json::json!({}),
    }
}

fn default_top_k() -> usize {
    10
}

impl Default for LtmConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderSettings::default(),
            vector_store: default_vector_store(),
            datasource: default_datasource(),
            default_top_k: default_top_k(),
        }
    }
}

/// Resolve the ltm config directory (~/.ltm/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".ltm"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.ltm/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<LtmConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(LtmConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: LtmConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a specific path, creating parent directories.
pub fn save_config_to(config: &LtmConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

// ──────────────────── Memory Folders ────────────────────

/// Resolve the default storage folder ($HOME/memory).
pub fn memory_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(MEMORY_FOLDER))
        .ok_or(ConfigError::NoDirFound)
}

/// Ensure $HOME/memory exists and return it.
pub fn create_memory_folder_in_home_dir() -> Result<PathBuf, ConfigError> {
    let dir = memory_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        tracing::info!("Created memory folder: {}", dir.display());
    }
    Ok(dir)
}

/// Ensure $HOME/memory/<name> exists and return it.
pub fn create_folder_inside_memory_folder(name: &str) -> Result<PathBuf, ConfigError> {
    let dir = create_memory_folder_in_home_dir()?.join(name);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Generate a random lowercase alphanumeric name of `len` characters.
pub fn generate(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        out.push_str(&uuid::Uuid::new_v4().simple().to_string());
    }
    out.truncate(len);
    out
}
