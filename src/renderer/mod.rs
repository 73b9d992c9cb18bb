//! Renderers tie the pipeline together
//!
//! A render call resolves the named template through the cache and the
//! source registry, then serializes the flat document against a context.
//! [`Renderer`] completes on the calling thread; [`AsyncRenderer`] runs the
//! same resolution through futures and fetches sibling references
//! concurrently.

mod config;
mod effects;

use std::sync::Arc;

use futures::executor::block_on;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::cache::{AsyncCache, Cache, DefaultCache};
use crate::error::TemplateError;
use crate::parser::parse;
use crate::serializer::{Serializer, Tags, UserInfo};
use crate::source::Sources;
use crate::template::resolver::Resolver;
use crate::template::{cache_key, Document};

pub use config::{ConfigError, RendererConfig};

use effects::{BlockingEffects, TaskEffects};

const NO_KEY: &str = "(no key provided)";

/// Synchronous renderer
#[derive(Clone)]
pub struct Renderer {
    config: Arc<RendererConfig>,
    cache: Arc<dyn Cache>,
    sources: Arc<Sources>,
    tags: Arc<Tags>,
    user_info: Arc<UserInfo>,
}

impl Renderer {
    /// Renderer over `sources` with a fresh in-memory cache and the built-in tags
    pub fn new(config: RendererConfig, sources: Sources) -> Self {
        let cache = DefaultCache::new();
        cache.set_enabled(config.cache_enabled);
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            sources: Arc::new(sources),
            tags: Arc::new(Tags::default()),
            user_info: Arc::new(UserInfo::new()),
        }
    }

    /// Renderer reading from the directories named in `config`
    pub fn from_config(config: RendererConfig) -> Result<Self, TemplateError> {
        let sources = Sources::single(config.file_source()?);
        Ok(Self::new(config, sources))
    }

    /// Use `cache` in place of the default one.
    ///
    /// The supplied cache keeps its own enabled state; `cache_enabled` only
    /// configures the default cache.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    pub fn with_user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = Arc::new(user_info);
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Render `template` found through the default search order
    pub fn render<C: Serialize + ?Sized>(
        &self,
        template: &str,
        context: &C,
    ) -> Result<String, TemplateError> {
        self.render_inner(template, None, context)
    }

    /// Render `template` read from the source registered under `source`
    pub fn render_from<C: Serialize + ?Sized>(
        &self,
        source: &str,
        template: &str,
        context: &C,
    ) -> Result<String, TemplateError> {
        self.render_inner(template, Some(source), context)
    }

    /// Resolve `template` without serializing it; the result may be non-flat
    pub fn document(&self, template: &str) -> Result<Document, TemplateError> {
        self.resolve(template, None)
    }

    fn render_inner<C: Serialize + ?Sized>(
        &self,
        template: &str,
        source: Option<&str>,
        context: &C,
    ) -> Result<String, TemplateError> {
        let context = context_value(context)?;
        let document = self.resolve(template, source)?;
        serialize_document(&document, &context, &self.tags, &self.user_info)
    }

    fn resolve(&self, template: &str, source: Option<&str>) -> Result<Document, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::no_template(NO_KEY));
        }
        debug!(template, source, "render");

        let key = cache_key(template, source);
        match self.cache.retrieve(&key) {
            Ok(Some(document)) if document.is_flat() => {
                trace!(template = %key, "serving flat document from cache");
                return Ok(document);
            }
            Ok(_) | Err(TemplateError::CachingDisabled) => {}
            Err(err) => return Err(err),
        }

        let effects = BlockingEffects {
            cache: self.cache.as_ref(),
            sources: &self.sources,
        };
        let resolver = Resolver::new(&effects, self.config.missing_references);
        block_on(resolver.fetch(template, source, Vec::new()))
    }
}

/// Asynchronous renderer
#[derive(Clone)]
pub struct AsyncRenderer {
    config: Arc<RendererConfig>,
    cache: Arc<dyn AsyncCache>,
    sources: Arc<Sources>,
    tags: Arc<Tags>,
    user_info: Arc<UserInfo>,
}

impl AsyncRenderer {
    /// Renderer over `sources` with a fresh in-memory cache and the built-in tags
    pub fn new(config: RendererConfig, sources: Sources) -> Self {
        let cache = DefaultCache::new();
        cache.set_enabled(config.cache_enabled);
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            sources: Arc::new(sources),
            tags: Arc::new(Tags::default()),
            user_info: Arc::new(UserInfo::new()),
        }
    }

    /// Renderer reading from the directories named in `config`
    pub fn from_config(config: RendererConfig) -> Result<Self, TemplateError> {
        let sources = Sources::single(config.file_source()?);
        Ok(Self::new(config, sources))
    }

    /// Use `cache` in place of the default one; see [`Renderer::with_cache`].
    pub fn with_cache(mut self, cache: Arc<dyn AsyncCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    pub fn with_user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = Arc::new(user_info);
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn cache(&self) -> &dyn AsyncCache {
        self.cache.as_ref()
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub async fn render<C: Serialize + ?Sized>(
        &self,
        template: &str,
        context: &C,
    ) -> Result<String, TemplateError> {
        let context = context_value(context)?;
        let document = self.resolve(template, None).await?;
        serialize_document(&document, &context, &self.tags, &self.user_info)
    }

    pub async fn render_from<C: Serialize + ?Sized>(
        &self,
        source: &str,
        template: &str,
        context: &C,
    ) -> Result<String, TemplateError> {
        let context = context_value(context)?;
        let document = self.resolve(template, Some(source)).await?;
        serialize_document(&document, &context, &self.tags, &self.user_info)
    }

    pub async fn document(&self, template: &str) -> Result<Document, TemplateError> {
        self.resolve(template, None).await
    }

    async fn resolve(
        &self,
        template: &str,
        source: Option<&str>,
    ) -> Result<Document, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::no_template(NO_KEY));
        }
        debug!(template, source, "render");

        let key = cache_key(template, source);
        if let Some(blocking) = self.cache.as_blocking() {
            match blocking.retrieve(&key) {
                Ok(Some(document)) if document.is_flat() => {
                    trace!(template = %key, "serving flat document from cache");
                    return Ok(document);
                }
                Ok(_) | Err(TemplateError::CachingDisabled) => {}
                Err(err) => return Err(err),
            }
        }

        let effects = TaskEffects {
            cache: self.cache.as_ref(),
            sources: &self.sources,
        };
        let resolver = Resolver::new(&effects, self.config.missing_references);
        resolver.fetch(template, source, Vec::new()).await
    }
}

/// Render a standalone template string with the built-in tags.
///
/// The template may not reference other templates.
pub fn render_template<C: Serialize + ?Sized>(
    text: &str,
    context: &C,
) -> Result<String, TemplateError> {
    let name = "(inline)";
    let nodes = parse(text).map_err(|errors| TemplateError::Parse {
        name: name.to_string(),
        source_text: text.to_string(),
        errors,
    })?;
    let context = context_value(context)?;
    serialize_document(
        &Document::new(name, nodes),
        &context,
        &Tags::default(),
        &UserInfo::new(),
    )
}

/// Serialize a flat document; anything still referencing other templates is rejected
fn serialize_document(
    document: &Document,
    context: &Map<String, Value>,
    tags: &Tags,
    user_info: &UserInfo,
) -> Result<String, TemplateError> {
    if !document.is_flat() {
        return Err(TemplateError::UnresolvedAst {
            name: document.name().to_string(),
            references: document.unresolved_refs().iter().cloned().collect(),
        });
    }
    Ok(Serializer::new(tags, user_info).serialize(document.nodes(), context)?)
}

fn context_value<C: Serialize + ?Sized>(context: &C) -> Result<Map<String, Value>, TemplateError> {
    let value = serde_json::to_value(context).map_err(|e| TemplateError::InvalidContext {
        message: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(TemplateError::InvalidContext {
            message: format!("expected a keyed object, found {}", other),
        }),
    }
}
