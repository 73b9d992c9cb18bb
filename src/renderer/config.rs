//! Renderer configuration, loadable from TOML

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::error::TemplateError;
use crate::source::{FileSource, DEFAULT_EXTENSION};
use crate::template::MissingReferences;

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration options for a renderer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Directory templates are looked up in
    pub root_directory: PathBuf,

    /// Directory `..` lookups may reach; defaults to the root directory
    pub sandbox_directory: Option<PathBuf>,

    /// Extension appended to template names that carry none
    pub default_extension: String,

    /// Whether resolved documents are kept between renders
    pub cache_enabled: bool,

    /// Behavior when a referenced template cannot be found
    pub missing_references: MissingReferences,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            root_directory: PathBuf::from("."),
            sandbox_directory: None,
            default_extension: DEFAULT_EXTENSION.to_string(),
            cache_enabled: true,
            missing_references: MissingReferences::Fail,
        }
    }
}

impl RendererConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_root_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_directory = root.into();
        self
    }

    pub fn with_sandbox_directory(mut self, sandbox: impl Into<PathBuf>) -> Self {
        self.sandbox_directory = Some(sandbox.into());
        self
    }

    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = extension.into();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_missing_references(mut self, missing: MissingReferences) -> Self {
        self.missing_references = missing;
        self
    }

    /// File source reading from the configured directories
    pub fn file_source(&self) -> Result<FileSource, TemplateError> {
        let sandbox = self
            .sandbox_directory
            .as_deref()
            .unwrap_or(&self.root_directory);
        Ok(FileSource::sandboxed(sandbox, &self.root_directory)?
            .with_extension(self.default_extension.clone()))
    }
}
