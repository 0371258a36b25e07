use std::path::PathBuf;

use ssm::ParseError;
use thiserror::Error;

/// A compile that produced no output at all.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse input: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Cache failures never fail a compile; they become diagnostics.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot read cache '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache '{}': {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write cache '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode cache: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extractor '{extractor}' failed: {message}")]
pub struct ExtractError {
    pub extractor: String,
    pub message: String,
}

impl ExtractError {
    pub fn new(extractor: &str, message: impl Into<String>) -> Self {
        ExtractError {
            extractor: extractor.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pass '{pass}' failed: {message}")]
pub struct PassError {
    pub pass: String,
    pub message: String,
}

impl PassError {
    pub fn new(pass: &str, message: impl Into<String>) -> Self {
        PassError {
            pass: pass.to_string(),
            message: message.into(),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}
