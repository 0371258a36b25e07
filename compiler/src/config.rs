use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up next to the source when no config path is given.
pub const CONFIG_FILE_NAME: &str = "ssm.toml";

/// Compile settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Symbol namespace; falls back to the source file stem.
    pub namespace: Option<String>,
    pub parallel_extractors: bool,
    pub cache: CacheOptions,
    pub extractors: Toggles,
    pub passes: Toggles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheOptions {
    pub enabled: bool,
    /// Directory for cache sidecars; next to the source when unset.
    pub dir: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Toggles {
    pub disabled: Vec<String>,
}

impl Toggles {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }

    pub fn disable(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.is_disabled(&name) {
            self.disabled.push(name);
        }
    }
}

impl CompileOptions {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load `ssm.toml` from the source's directory, if there is one.
    pub fn discover(source: &Path) -> Result<Option<Self>, ConfigError> {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "loading config");
            Self::load(&candidate).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn namespace_for(&self, source: Option<&Path>) -> String {
        if let Some(ns) = self.namespace.as_deref().map(str::trim).filter(|ns| !ns.is_empty()) {
            return ns.to_string();
        }
        source
            .and_then(|p| p.file_stem())
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.to_string())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Disable an extractor or pass by name; the name decides which.
    pub fn disable(&mut self, name: &str) {
        if crate::extract::is_known(name) {
            self.extractors.disable(name);
        } else {
            self.passes.disable(name);
        }
    }
}
