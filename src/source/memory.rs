//! In-memory template source

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{Source, DEFAULT_EXTENSION};
use crate::error::TemplateError;

/// Thread-safe map of template name to raw text.
///
/// Names are stored as `/path/name.ext`; the default extension is added when
/// the last path component has none.
#[derive(Debug)]
pub struct MemorySource {
    extension: String,
    files: RwLock<HashMap<String, String>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_extension(DEFAULT_EXTENSION)
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Builder form of [`MemorySource::insert`]
    pub fn with(self, name: &str, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn insert(&self, name: &str, content: impl Into<String>) {
        let key = self.key(name);
        self.files.write().insert(key, content.into());
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn key(&self, name: &str) -> String {
        let mut key = format!("/{}", name.trim_start_matches('/'));
        let last = key.rsplit('/').next().unwrap_or_default();
        if !last.contains('.') {
            key.push('.');
            key.push_str(&self.extension);
        }
        key
    }
}

impl Source for MemorySource {
    fn file(&self, template: &str, _escape: bool) -> Result<String, TemplateError> {
        self.files
            .read()
            .get(&self.key(template))
            .cloned()
            .ok_or_else(|| TemplateError::no_template(template))
    }
}
