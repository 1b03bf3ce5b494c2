
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunking::ChunkingConfig;
use crate::retrieval::RetrievalConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Optional tokenizer.json path; the built-in word-level tokenizer is
    /// used when unset.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid chunk size: {0} (must be between 1 and 100000)")]
    InvalidChunkSize(usize),
    #[error("Invalid boundary lookahead: {0} (must be at most 1000)")]
    InvalidBoundaryLookahead(usize),
    #[error("Invalid large document threshold: {0} (must be at least 1000)")]
    InvalidLargeDocumentThreshold(usize),
    #[error("Invalid max iterations: {0} (must be at least 1)")]
    InvalidMaxIterations(usize),
    #[error("Invalid snippet length: {0} (must be between 16 and 10000)")]
    InvalidSnippetLen(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from `config.toml` under `config_dir`, falling
    /// back to defaults when the file does not exist yet.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).map_err(|_| ConfigError::DirectoryError)?;

        let content = toml::to_string_pretty(self).map_err(ConfigError::TomlSerialize)?;
        let config_path = self.config_file_path();
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Range checks across every section. An overlap at or above the chunk
    /// size is accepted here: the splitter warns and forces progress
    /// instead of rejecting the configuration.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 || self.chunking.chunk_size > 100_000 {
            return Err(ConfigError::InvalidChunkSize(self.chunking.chunk_size).into());
        }
        if self.chunking.boundary_lookahead > 1000 {
            return Err(
                ConfigError::InvalidBoundaryLookahead(self.chunking.boundary_lookahead).into(),
            );
        }
        if self.chunking.large_document_threshold < 1000 {
            return Err(ConfigError::InvalidLargeDocumentThreshold(
                self.chunking.large_document_threshold,
            )
            .into());
        }
        if self.chunking.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(self.chunking.max_iterations).into());
        }
        if self.retrieval.snippet_len < 16 || self.retrieval.snippet_len > 10_000 {
            return Err(ConfigError::InvalidSnippetLen(self.retrieval.snippet_len).into());
        }

        self.retrieval.validate()?;
        Ok(())
    }

    /// Default configuration directory for this system.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or(ConfigError::DirectoryError)?;
        Ok(base.join("docrag"))
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Absolute path of the configured tokenizer file, resolved against
    /// the config directory when given as a relative path.
    #[inline]
    pub fn tokenizer_file_path(&self) -> Option<PathBuf> {
        self.tokenizer.file.as_ref().map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                self.base_dir.join(file)
            }
        })
    }
}
