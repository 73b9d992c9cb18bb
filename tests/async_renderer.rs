//! The asynchronous renderer must agree with the blocking one

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::Barrier;

use tessera::{
    AsyncCache, AsyncRenderer, DefaultCache, MemorySource, MissingReferences, Renderer,
    RendererConfig, Source, Sources, TemplateError,
};

const TEMPLATES: &[(&str, &str)] = &[
    ("base", r#"<body>#import("body")</body>"#),
    ("page", r#"#extend("base"):#export("body"):hi #(name)#endexport#endextend"#),
    ("wide", r#"#extend("x")|#extend("y")|#extend("z")"#),
    ("x", r#"X#extend("leaf")"#),
    ("y", r#"Y#extend("leaf")"#),
    ("z", r#"Z#extend("leaf")"#),
    ("leaf", "."),
    ("cycle-a", r#"#extend("cycle-b")"#),
    ("cycle-b", r#"#extend("cycle-a")"#),
    ("broken", r#"#extend("missing")"#),
];

fn sources() -> Sources {
    Sources::single(
        TEMPLATES
            .iter()
            .fold(MemorySource::new(), |source, (name, text)| source.with(name, *text)),
    )
}

fn pair(config: RendererConfig) -> (Renderer, AsyncRenderer) {
    (
        Renderer::new(config.clone(), sources()),
        AsyncRenderer::new(config, sources()),
    )
}

/// Holds every sibling read until all of them have started
struct Gated {
    barrier: Arc<Barrier>,
}

#[async_trait]
impl Source for Gated {
    fn file(&self, template: &str, _escape: bool) -> Result<String, TemplateError> {
        match template {
            "row" => Ok(r#"#extend("x")#extend("y")#extend("z")"#.to_string()),
            _ => Err(TemplateError::no_template(template)),
        }
    }

    async fn file_async(&self, template: &str, escape: bool) -> Result<String, TemplateError> {
        if let "x" | "y" | "z" = template {
            self.barrier.wait().await;
            return Ok(template.to_uppercase());
        }
        self.file(template, escape)
    }
}

/// Has `page`, refuses `secret` and knows nothing else
struct Guarded;

impl Source for Guarded {
    fn file(&self, template: &str, _escape: bool) -> Result<String, TemplateError> {
        match template {
            "page" => Ok(r#"#extend("gone")#extend("secret")"#.to_string()),
            "secret" => Err(TemplateError::illegal_access("secret is off limits")),
            _ => Err(TemplateError::no_template(template)),
        }
    }
}

fn kind(err: &TemplateError) -> String {
    match err {
        TemplateError::NoTemplateExists { name } => format!("missing {}", name),
        TemplateError::CyclicalReference { chain, .. } => format!("cycle {}", chain.join(">")),
        TemplateError::UnresolvedAst { references, .. } => {
            format!("unresolved {}", references.join(","))
        }
        other => other.to_string(),
    }
}

#[tokio::test]
async fn test_async_renders_like_sync() {
    let (sync, async_renderer) = pair(RendererConfig::default());
    let context = json!({"name": "Ada"});
    for name in ["page", "wide", "leaf"] {
        let expected = sync.render(name, &context).expect("Should render");
        let actual = async_renderer.render(name, &context).await.expect("Should render");
        assert_eq!(actual, expected);
    }
    assert_eq!(async_renderer.render("wide", &Value::Null).await.unwrap(), "X.|Y.|Z.");
}

#[tokio::test]
async fn test_async_errors_match_sync() {
    for missing in [MissingReferences::Fail, MissingReferences::Defer] {
        let (sync, async_renderer) =
            pair(RendererConfig::default().with_missing_references(missing));
        for name in ["cycle-a", "broken", "absent", ""] {
            let expected = sync.render(name, &()).unwrap_err();
            let actual = async_renderer.render(name, &()).await.unwrap_err();
            assert_eq!(kind(&actual), kind(&expected), "template {:?}", name);
        }
    }
}

#[tokio::test]
async fn test_async_caches_every_document() {
    let cache = Arc::new(DefaultCache::new());
    let renderer = AsyncRenderer::new(RendererConfig::default(), sources()).with_cache(cache.clone());
    renderer.render("wide", &()).await.expect("Should render");
    assert_eq!(cache.count(), 5);

    let document = AsyncCache::retrieve(cache.as_ref(), "wide")
        .await
        .expect("Should retrieve")
        .expect("Should be cached");
    assert!(document.is_flat());
    assert_eq!(document.external_refs().len(), 3);
}

#[tokio::test]
async fn test_async_disabled_cache_is_a_miss() {
    let renderer = AsyncRenderer::new(
        RendererConfig::default().with_cache_enabled(false),
        sources(),
    );
    assert_eq!(renderer.render("page", &json!({"name": "Bob"})).await.unwrap(), "<body>hi Bob</body>");
    assert_eq!(renderer.cache().count(), 0);
    assert!(renderer.cache().retrieve("page").await.unwrap().is_none());
    assert!(matches!(
        renderer.cache().remove("page").await,
        Err(TemplateError::CachingDisabled)
    ));
}

#[tokio::test]
async fn test_async_explicit_source() {
    let registry = Sources::new();
    registry
        .register("docs", MemorySource::new().with("intro", "welcome"), false)
        .expect("Should register");
    let renderer = AsyncRenderer::new(RendererConfig::default(), registry);
    assert_eq!(renderer.render_from("docs", "intro", &()).await.unwrap(), "welcome");
    assert!(matches!(
        renderer.render("intro", &()).await,
        Err(TemplateError::IllegalAccess { .. })
    ));
}

#[tokio::test]
async fn test_async_renderers_share_work_across_tasks() {
    let renderer = AsyncRenderer::new(RendererConfig::default(), sources());
    let renders = (0..4).map(|_| {
        let renderer = renderer.clone();
        async move { renderer.render("page", &json!({"name": "Eve"})).await }
    });
    for output in futures::future::join_all(renders).await {
        assert_eq!(output.unwrap(), "<body>hi Eve</body>");
    }
    assert_eq!(renderer.cache().count(), 2);
}

#[tokio::test]
async fn test_async_sibling_reads_run_concurrently() {
    let renderer = AsyncRenderer::new(
        RendererConfig::default(),
        Sources::single(Gated {
            barrier: Arc::new(Barrier::new(3)),
        }),
    );
    let output = tokio::time::timeout(Duration::from_secs(5), renderer.render("row", &()))
        .await
        .expect("Sibling reads should not wait on each other");
    assert_eq!(output.unwrap(), "XYZ");
}

#[tokio::test]
async fn test_async_deferred_miss_does_not_hide_illegal_access() {
    let config = RendererConfig::default().with_missing_references(MissingReferences::Defer);
    let async_renderer = AsyncRenderer::new(config.clone(), Sources::single(Guarded));
    assert!(matches!(
        async_renderer.render("page", &()).await,
        Err(TemplateError::IllegalAccess { .. })
    ));

    let sync = Renderer::new(config, Sources::single(Guarded));
    assert!(matches!(
        sync.render("page", &()),
        Err(TemplateError::IllegalAccess { .. })
    ));
}
