//! Template sources and the registry that searches them
//!
//! A [`Source`] produces raw template text for a logical name. [`Sources`]
//! holds named sources plus the order used for unqualified lookups.

mod files;
mod memory;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::TemplateError;

pub use files::{FileSource, Limits};
pub use memory::MemorySource;

/// Extension appended to template names that carry none
pub const DEFAULT_EXTENSION: &str = "tess";

/// Producer of raw template text
#[async_trait]
pub trait Source: Send + Sync {
    /// Read `template`; `escape` allows leaving the view scope for the wider sandbox.
    ///
    /// Fails with `NoTemplateExists` for a routine miss and `IllegalAccess` for a
    /// policy violation.
    fn file(&self, template: &str, escape: bool) -> Result<String, TemplateError>;

    async fn file_async(&self, template: &str, escape: bool) -> Result<String, TemplateError> {
        self.file(template, escape)
    }
}

#[async_trait]
impl<S: Source + ?Sized> Source for Arc<S> {
    fn file(&self, template: &str, escape: bool) -> Result<String, TemplateError> {
        (**self).file(template, escape)
    }

    async fn file_async(&self, template: &str, escape: bool) -> Result<String, TemplateError> {
        (**self).file_async(template, escape).await
    }
}

#[derive(Default)]
struct Registry {
    sources: HashMap<String, Arc<dyn Source>>,
    order: Vec<String>,
}

/// Named template sources with an ordered default search list
#[derive(Default)]
pub struct Sources {
    inner: RwLock<Registry>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one searchable source under the key `default`
    pub fn single(source: impl Source + 'static) -> Self {
        let mut registry = Registry::default();
        registry
            .sources
            .insert("default".to_string(), Arc::new(source));
        registry.order.push("default".to_string());
        Self {
            inner: RwLock::new(registry),
        }
    }

    /// Add a source; searchable sources join the default search order in registration order
    pub fn register(
        &self,
        key: impl Into<String>,
        source: impl Source + 'static,
        searchable: bool,
    ) -> Result<(), TemplateError> {
        let key = key.into();
        let mut registry = self.inner.write();
        if registry.sources.contains_key(&key) {
            return Err(TemplateError::DuplicateSource { key });
        }
        registry.sources.insert(key.clone(), Arc::new(source));
        if searchable {
            registry.order.push(key);
        }
        Ok(())
    }

    /// Every registered key
    pub fn all(&self) -> BTreeSet<String> {
        self.inner.read().sources.keys().cloned().collect()
    }

    /// Keys eligible for unqualified lookup, in registration order
    pub fn search_order(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    fn candidates(
        &self,
        explicit: Option<&str>,
    ) -> Result<Vec<(String, Arc<dyn Source>)>, TemplateError> {
        let registry = self.inner.read();
        let keys = match explicit {
            Some(key) if !registry.sources.contains_key(key) => {
                return Err(TemplateError::illegal_access(format!(
                    "no source registered under key {}",
                    key
                )))
            }
            Some(key) => vec![key.to_string()],
            None => registry.order.clone(),
        };
        if keys.is_empty() {
            return Err(TemplateError::illegal_access("no searchable sources"));
        }
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let source = registry.sources.get(&key)?.clone();
                Some((key, source))
            })
            .collect())
    }

    /// Locate `template`, returning the key of the source that produced it and its raw text.
    ///
    /// Sources are tried in order. `IllegalAccess` stops the search at once;
    /// any other failure moves on to the next source.
    pub fn find(
        &self,
        template: &str,
        explicit: Option<&str>,
    ) -> Result<(String, String), TemplateError> {
        for (key, source) in self.candidates(explicit)? {
            match source.file(template, true) {
                Ok(text) => return Ok((key, text)),
                Err(err) => skip_or_stop(&key, template, err)?,
            }
        }
        Err(TemplateError::no_template(template))
    }

    /// Asynchronous [`Sources::find`]; sources are still tried one after another
    pub async fn find_async(
        &self,
        template: &str,
        explicit: Option<&str>,
    ) -> Result<(String, String), TemplateError> {
        for (key, source) in self.candidates(explicit)? {
            match source.file_async(template, true).await {
                Ok(text) => return Ok((key, text)),
                Err(err) => skip_or_stop(&key, template, err)?,
            }
        }
        Err(TemplateError::no_template(template))
    }
}

fn skip_or_stop(key: &str, template: &str, err: TemplateError) -> Result<(), TemplateError> {
    match err {
        TemplateError::IllegalAccess { .. } => Err(err),
        other => {
            trace!(source = key, template, error = %other, "source miss, trying next");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Forbidden;

    impl Source for Forbidden {
        fn file(&self, template: &str, _escape: bool) -> Result<String, TemplateError> {
            Err(TemplateError::illegal_access(format!("{} is off limits", template)))
        }
    }

    fn memory(name: &str, content: &str) -> MemorySource {
        MemorySource::new().with(name, content)
    }

    #[test]
    fn test_register_rejects_duplicate_keys() {
        let sources = Sources::new();
        sources
            .register("x", MemorySource::new(), true)
            .expect("Should register");
        let err = sources
            .register("x", MemorySource::new(), false)
            .unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateSource { key } if key == "x"));
    }

    #[test]
    fn test_search_order_keeps_registration_order() {
        let sources = Sources::new();
        sources.register("b", MemorySource::new(), true).expect("Should register");
        sources.register("hidden", MemorySource::new(), false).expect("Should register");
        sources.register("a", MemorySource::new(), true).expect("Should register");

        assert_eq!(sources.search_order(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(
            sources.all().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string(), "hidden".to_string()]
        );
    }

    #[test]
    fn test_find_falls_back_on_miss() {
        let sources = Sources::new();
        sources.register("x", MemorySource::new(), true).expect("Should register");
        sources.register("y", memory("n", "from y"), true).expect("Should register");

        let (key, text) = sources.find("n", None).expect("Should find");
        assert_eq!(key, "y");
        assert_eq!(text, "from y");
    }

    #[test]
    fn test_find_stops_on_illegal_access() {
        let sources = Sources::new();
        sources.register("x", Forbidden, true).expect("Should register");
        sources.register("y", memory("n", "from y"), true).expect("Should register");

        let err = sources.find("n", None).unwrap_err();
        assert!(matches!(err, TemplateError::IllegalAccess { .. }));
    }

    #[test]
    fn test_find_reports_missing_template() {
        let sources = Sources::single(MemorySource::new());
        let err = sources.find("nowhere", None).unwrap_err();
        assert!(matches!(err, TemplateError::NoTemplateExists { name } if name == "nowhere"));
    }

    #[test]
    fn test_explicit_source_must_be_registered() {
        let sources = Sources::single(memory("n", "text"));
        let err = sources.find("n", Some("other")).unwrap_err();
        assert!(matches!(err, TemplateError::IllegalAccess { .. }));
    }

    #[test]
    fn test_explicit_source_ignores_search_order() {
        let sources = Sources::new();
        sources.register("x", memory("n", "from x"), true).expect("Should register");
        sources.register("private", memory("n", "private"), false).expect("Should register");

        let (key, text) = sources.find("n", Some("private")).expect("Should find");
        assert_eq!((key.as_str(), text.as_str()), ("private", "private"));
    }

    #[test]
    fn test_empty_search_order_is_illegal() {
        let sources = Sources::new();
        sources.register("hidden", memory("n", "text"), false).expect("Should register");
        let err = sources.find("n", None).unwrap_err();
        assert!(matches!(err, TemplateError::IllegalAccess { .. }));
    }

    #[test]
    fn test_find_async_matches_find() {
        let sources = Sources::new();
        sources.register("x", MemorySource::new(), true).expect("Should register");
        sources.register("y", memory("n", "from y"), true).expect("Should register");

        let found = futures::executor::block_on(sources.find_async("n", None)).expect("Should find");
        assert_eq!(found, ("y".to_string(), "from y".to_string()));
    }
}
