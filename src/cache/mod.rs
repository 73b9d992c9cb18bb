//! Name-keyed store of resolved documents shared across render calls
//!
//! Two access modes share one logical store: [`Cache`] answers on the calling
//! thread, [`AsyncCache`] answers through futures. Both hold the map lock for a
//! single lookup or mutation only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::TemplateError;
use crate::template::Document;

/// Outcome of removing a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// No entry was stored under the name
    NotFound,
    /// Kept because other entries depend on it; not produced yet
    Blocked,
}

/// Synchronous cache access
pub trait Cache: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn count(&self) -> usize;

    /// Store `document`. Fails with `KeyExists` when an entry exists and `replace` is false.
    /// A disabled cache stores nothing and hands the document back.
    fn insert(&self, document: Document, replace: bool) -> Result<Document, TemplateError>;

    /// Fails with `CachingDisabled` while disabled
    fn retrieve(&self, name: &str) -> Result<Option<Document>, TemplateError>;

    fn remove(&self, name: &str) -> Result<Removal, TemplateError>;
}

/// Asynchronous cache access
#[async_trait]
pub trait AsyncCache: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn count(&self) -> usize;

    async fn insert(&self, document: Document, replace: bool) -> Result<Document, TemplateError>;

    /// Resolves to `None` while disabled
    async fn retrieve(&self, name: &str) -> Result<Option<Document>, TemplateError>;

    async fn remove(&self, name: &str) -> Result<Removal, TemplateError>;

    /// Direct access for callers that can skip the asynchronous path on a hit
    fn as_blocking(&self) -> Option<&dyn Cache> {
        None
    }
}

/// In-memory cache backed by a mutex-guarded map
#[derive(Debug)]
pub struct DefaultCache {
    enabled: AtomicBool,
    documents: Mutex<HashMap<String, Document>>,
}

impl Default for DefaultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCache {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that starts switched off
    pub fn disabled() -> Self {
        let cache = Self::new();
        cache.set_enabled(false);
        cache
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn count(&self) -> usize {
        self.documents.lock().len()
    }

    fn store(&self, document: Document, replace: bool) -> Result<Document, TemplateError> {
        if !self.is_enabled() {
            return Ok(document);
        }
        let mut documents = self.documents.lock();
        if !replace && documents.contains_key(document.name()) {
            return Err(TemplateError::KeyExists {
                name: document.name().to_string(),
            });
        }
        trace!(name = document.name(), flat = document.is_flat(), "cache store");
        documents.insert(document.name().to_string(), document.clone());
        Ok(document)
    }

    fn lookup(&self, name: &str) -> Option<Document> {
        let hit = self.documents.lock().get(name).cloned();
        trace!(name, hit = hit.is_some(), "cache lookup");
        hit
    }

    fn evict(&self, name: &str) -> Result<Removal, TemplateError> {
        if !self.is_enabled() {
            return Err(TemplateError::CachingDisabled);
        }
        match self.documents.lock().remove(name) {
            Some(_) => Ok(Removal::Removed),
            None => Ok(Removal::NotFound),
        }
    }
}

impl Cache for DefaultCache {
    fn is_enabled(&self) -> bool {
        DefaultCache::is_enabled(self)
    }

    fn set_enabled(&self, enabled: bool) {
        DefaultCache::set_enabled(self, enabled)
    }

    fn count(&self) -> usize {
        DefaultCache::count(self)
    }

    fn insert(&self, document: Document, replace: bool) -> Result<Document, TemplateError> {
        self.store(document, replace)
    }

    fn retrieve(&self, name: &str) -> Result<Option<Document>, TemplateError> {
        if !self.is_enabled() {
            return Err(TemplateError::CachingDisabled);
        }
        Ok(self.lookup(name))
    }

    fn remove(&self, name: &str) -> Result<Removal, TemplateError> {
        self.evict(name)
    }
}

#[async_trait]
impl AsyncCache for DefaultCache {
    fn is_enabled(&self) -> bool {
        DefaultCache::is_enabled(self)
    }

    fn count(&self) -> usize {
        DefaultCache::count(self)
    }

    async fn insert(&self, document: Document, replace: bool) -> Result<Document, TemplateError> {
        self.store(document, replace)
    }

    async fn retrieve(&self, name: &str) -> Result<Option<Document>, TemplateError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        Ok(self.lookup(name))
    }

    async fn remove(&self, name: &str) -> Result<Removal, TemplateError> {
        self.evict(name)
    }

    fn as_blocking(&self) -> Option<&dyn Cache> {
        Some(self)
    }
}
