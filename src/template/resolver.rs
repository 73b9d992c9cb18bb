//! Template resolution - fetches referenced templates and flattens documents
//!
//! The algorithm is written once against [`Effects`]. The blocking renderer
//! drives it with effects that never suspend; the asynchronous renderer uses
//! effects backed by an async cache and async source reads, and fetches
//! sibling references concurrently.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::TemplateError;
use crate::parser::parse;

use super::document::Document;

/// What to do when a referenced template cannot be found anywhere
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingReferences {
    /// Abort the render with `NoTemplateExists`
    #[default]
    Fail,
    /// Leave the reference unresolved; rendering later fails with `UnresolvedAst`
    Defer,
}

/// Cache and source operations the resolver depends on
#[async_trait]
pub(crate) trait Effects: Send + Sync {
    /// Whether sibling references are fetched concurrently
    const CONCURRENT: bool;

    /// Cached document under `key`; a disabled cache is a miss
    async fn cached(&self, key: &str) -> Result<Option<Document>, TemplateError>;

    /// Store `document`, replacing any previous entry
    async fn store(&self, document: Document) -> Result<Document, TemplateError>;

    /// Raw text of `template` and the key of the source that produced it
    async fn read(
        &self,
        template: &str,
        source: Option<&str>,
    ) -> Result<(String, String), TemplateError>;
}

/// Cache key of a template; explicitly sourced templates get their own namespace
pub fn cache_key(template: &str, source: Option<&str>) -> String {
    match source {
        Some(source) => format!("{}:{}", source, template),
        None => template.to_string(),
    }
}

pub(crate) struct Resolver<'e, E> {
    effects: &'e E,
    missing: MissingReferences,
}

impl<'e, E: Effects> Resolver<'e, E> {
    pub fn new(effects: &'e E, missing: MissingReferences) -> Self {
        Self { effects, missing }
    }

    /// Document for `template`, from the cache or freshly parsed, resolved as far as possible.
    ///
    /// `chain` holds the templates currently being resolved above this one.
    pub fn fetch<'a>(
        &'a self,
        template: &'a str,
        source: Option<&'a str>,
        chain: Vec<String>,
    ) -> BoxFuture<'a, Result<Document, TemplateError>> {
        async move {
            let key = cache_key(template, source);
            if let Some(document) = self.effects.cached(&key).await? {
                if document.is_flat() {
                    trace!(template = %key, "flat cache hit");
                    return Ok(document);
                }
                debug!(template = %key, "cached document is not flat, resolving again");
                return self.resolve(document, chain).await;
            }

            let (source_key, text) = self.effects.read(template, source).await?;
            debug!(template, source = %source_key, "parsing template");
            let nodes = parse(&text).map_err(|errors| TemplateError::Parse {
                name: template.to_string(),
                source_text: text,
                errors,
            })?;
            self.resolve(Document::new(key, nodes), chain).await
        }
        .boxed()
    }

    async fn fetch_reference(
        &self,
        template: &str,
        chain: Vec<String>,
    ) -> Result<Option<Document>, TemplateError> {
        match self.fetch(template, None, chain).await {
            Ok(document) => Ok(Some(document)),
            Err(TemplateError::NoTemplateExists { name }) if self.missing == MissingReferences::Defer => {
                warn!(reference = %name, "template not found, leaving reference unresolved");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve(
        &self,
        mut document: Document,
        mut chain: Vec<String>,
    ) -> Result<Document, TemplateError> {
        if document.is_flat() {
            return self.effects.store(document).await;
        }
        chain.push(document.name().to_string());

        loop {
            if let Some(name) = document
                .unresolved_refs()
                .iter()
                .find(|name| chain.contains(name))
            {
                let mut cycle = chain.clone();
                cycle.push(name.clone());
                return Err(TemplateError::CyclicalReference {
                    name: name.clone(),
                    chain: cycle,
                });
            }

            let wanted: Vec<String> = document.unresolved_refs().iter().cloned().collect();
            let fetched = if E::CONCURRENT {
                try_join_all(
                    wanted
                        .iter()
                        .map(|name| self.fetch_reference(name, chain.clone())),
                )
                .await?
            } else {
                let mut fetched = Vec::with_capacity(wanted.len());
                for name in &wanted {
                    fetched.push(self.fetch_reference(name, chain.clone()).await?);
                }
                fetched
            };

            let externals: HashMap<String, Document> = wanted
                .into_iter()
                .zip(fetched)
                .filter_map(|(name, document)| document.map(|d| (name, d)))
                .collect();

            let previous = document.unresolved_refs().clone();
            document = document.rebuild(&externals);
            debug!(
                template = document.name(),
                supplied = externals.len(),
                unresolved = document.unresolved_refs().len(),
                "inlined references"
            );

            // Repeat only while inlining reveals names not seen in the previous pass
            if document.unresolved_refs().is_subset(&previous) {
                break;
            }
        }

        self.effects.store(document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, DefaultCache};
    use parking_lot::Mutex;

    struct MapEffects {
        templates: Mutex<HashMap<String, String>>,
        cache: DefaultCache,
        reads: Mutex<Vec<String>>,
    }

    impl MapEffects {
        fn new(templates: &[(&str, &str)]) -> Self {
            Self {
                templates: Mutex::new(
                    templates
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                cache: DefaultCache::new(),
                reads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Effects for MapEffects {
        const CONCURRENT: bool = false;

        async fn cached(&self, key: &str) -> Result<Option<Document>, TemplateError> {
            Cache::retrieve(&self.cache, key)
        }

        async fn store(&self, document: Document) -> Result<Document, TemplateError> {
            Cache::insert(&self.cache, document, true)
        }

        async fn read(
            &self,
            template: &str,
            _source: Option<&str>,
        ) -> Result<(String, String), TemplateError> {
            self.reads.lock().push(template.to_string());
            self.templates
                .lock()
                .get(template)
                .map(|text| ("map".to_string(), text.clone()))
                .ok_or_else(|| TemplateError::no_template(template))
        }
    }

    fn fetch(
        effects: &MapEffects,
        missing: MissingReferences,
        template: &str,
    ) -> Result<Document, TemplateError> {
        let resolver = Resolver::new(effects, missing);
        futures::executor::block_on(resolver.fetch(template, None, Vec::new()))
    }

    #[test]
    fn test_resolves_chain_of_extends() {
        let effects = MapEffects::new(&[
            ("a", r#"A[#extend("b")]"#),
            ("b", r#"B[#extend("c")]"#),
            ("c", "C"),
        ]);
        let document = fetch(&effects, MissingReferences::Fail, "a").expect("Should resolve");
        assert!(document.is_flat());
        assert_eq!(document.tree(), "raw(\"A[B[C]]\")\n");
        assert_eq!(effects.cache.count(), 3);
    }

    #[test]
    fn test_detects_cycles() {
        let effects = MapEffects::new(&[
            ("a", r#"#extend("b")"#),
            ("b", r#"#extend("c")"#),
            ("c", r#"#extend("a")"#),
        ]);
        let err = fetch(&effects, MissingReferences::Fail, "a").unwrap_err();
        match err {
            TemplateError::CyclicalReference { name, chain } => {
                assert_eq!(name, "a");
                assert_eq!(chain, vec!["a", "b", "c", "a"]);
            }
            other => panic!("Expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_detects_self_reference() {
        let effects = MapEffects::new(&[("a", r#"#extend("a")"#)]);
        let err = fetch(&effects, MissingReferences::Fail, "a").unwrap_err();
        assert!(matches!(err, TemplateError::CyclicalReference { chain, .. } if chain == vec!["a", "a"]));
    }

    #[test]
    fn test_missing_reference_fails_by_default() {
        let effects = MapEffects::new(&[("a", r#"#extend("b")"#), ("b", r#"#extend("c")"#)]);
        let err = fetch(&effects, MissingReferences::Fail, "a").unwrap_err();
        assert!(matches!(err, TemplateError::NoTemplateExists { name } if name == "c"));
    }

    #[test]
    fn test_missing_reference_deferred_stays_unresolved() {
        let effects = MapEffects::new(&[("a", r#"#extend("b")"#), ("b", r#"#extend("c")"#)]);
        let document = fetch(&effects, MissingReferences::Defer, "a").expect("Should resolve");
        assert!(!document.is_flat());
        assert_eq!(
            document.unresolved_refs().iter().collect::<Vec<_>>(),
            vec!["c"]
        );

        // Stuck documents are cached and resolved further once the reference appears
        let cached = Cache::retrieve(&effects.cache, "a")
            .expect("Should retrieve")
            .expect("Should be cached");
        assert!(!cached.is_flat());
        effects.templates.lock().insert("c".to_string(), "C".to_string());
        let document = fetch(&effects, MissingReferences::Defer, "a").expect("Should resolve");
        assert!(document.is_flat());
    }

    #[test]
    fn test_flat_cache_hits_skip_reads() {
        let effects = MapEffects::new(&[("a", r#"#extend("b")"#), ("b", "B")]);
        fetch(&effects, MissingReferences::Fail, "a").expect("Should resolve");
        fetch(&effects, MissingReferences::Fail, "a").expect("Should resolve");
        assert_eq!(effects.reads.lock().clone(), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_errors_carry_source() {
        let effects = MapEffects::new(&[("a", "#if(x):unclosed")]);
        let err = fetch(&effects, MissingReferences::Fail, "a").unwrap_err();
        match err {
            TemplateError::Parse { name, source_text, errors } => {
                assert_eq!(name, "a");
                assert_eq!(source_text, "#if(x):unclosed");
                assert!(!errors.is_empty());
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_source_uses_own_cache_key() {
        let effects = MapEffects::new(&[("a", "A")]);
        let resolver = Resolver::new(&effects, MissingReferences::Fail);
        let document = futures::executor::block_on(resolver.fetch("a", Some("map"), Vec::new()))
            .expect("Should resolve");
        assert_eq!(document.name(), "map:a");
        assert!(Cache::retrieve(&effects.cache, "a").expect("Should retrieve").is_none());
    }
}
