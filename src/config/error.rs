use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the configuration engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("load configuration: {0}")]
    Load(#[source] ProviderError),

    #[error("watch configuration change: {0}")]
    Watch(#[source] ProviderError),

    #[error("configuration path not found: {0}")]
    NotFound(String),

    #[error("failed to unmarshal config at '{path}': {source}")]
    Unmarshal {
        path: String,
        source: toml::de::Error,
    },
}

/// Errors reported by a [`Provider`](super::Provider) while loading or watching.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("required config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Creates an error carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
