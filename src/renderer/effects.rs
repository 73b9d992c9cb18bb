//! Cache and source access for the two renderer flavors

use async_trait::async_trait;

use crate::cache::{AsyncCache, Cache};
use crate::error::TemplateError;
use crate::source::Sources;
use crate::template::resolver::Effects;
use crate::template::Document;

/// Effects that complete on the calling thread
pub(crate) struct BlockingEffects<'a> {
    pub cache: &'a dyn Cache,
    pub sources: &'a Sources,
}

#[async_trait]
impl Effects for BlockingEffects<'_> {
    const CONCURRENT: bool = false;

    async fn cached(&self, key: &str) -> Result<Option<Document>, TemplateError> {
        match self.cache.retrieve(key) {
            Err(TemplateError::CachingDisabled) => Ok(None),
            other => other,
        }
    }

    async fn store(&self, document: Document) -> Result<Document, TemplateError> {
        self.cache.insert(document, true)
    }

    async fn read(
        &self,
        template: &str,
        source: Option<&str>,
    ) -> Result<(String, String), TemplateError> {
        self.sources.find(template, source)
    }
}

/// Effects that suspend on cache and source access
pub(crate) struct TaskEffects<'a> {
    pub cache: &'a dyn AsyncCache,
    pub sources: &'a Sources,
}

#[async_trait]
impl Effects for TaskEffects<'_> {
    const CONCURRENT: bool = true;

    async fn cached(&self, key: &str) -> Result<Option<Document>, TemplateError> {
        self.cache.retrieve(key).await
    }

    async fn store(&self, document: Document) -> Result<Document, TemplateError> {
        self.cache.insert(document, true).await
    }

    async fn read(
        &self,
        template: &str,
        source: Option<&str>,
    ) -> Result<(String, String), TemplateError> {
        self.sources.find_async(template, source).await
    }
}
