//! Tessera - a composable text template engine
//!
//! Templates pull in other templates with `#extend`, hand blocks to them with
//! `#export`, and place received blocks with `#import`. The engine resolves
//! every reference ahead of rendering, caches the flattened result, and then
//! serializes it against a JSON-like context.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tessera::{MemorySource, Renderer, RendererConfig, Sources};
//!
//! let templates = MemorySource::new()
//!     .with("base", "<h1>#import(\"title\")</h1>")
//!     .with("page", "#extend(\"base\"):#export(\"title\"):Hi #(name)#endexport#endextend");
//!
//! let renderer = Renderer::new(RendererConfig::default(), Sources::single(templates));
//! let html = renderer.render("page", &json!({"name": "Ada"})).unwrap();
//! assert_eq!(html, "<h1>Hi Ada</h1>");
//! ```

pub mod cache;
pub mod error;
pub mod parser;
pub mod renderer;
pub mod serializer;
pub mod source;
pub mod template;

pub use cache::{AsyncCache, Cache, DefaultCache, Removal};
pub use error::{ParseError, TemplateError};
pub use parser::{parse, print_tree, Syntax};
pub use renderer::{render_template, AsyncRenderer, ConfigError, Renderer, RendererConfig};
pub use serializer::{SerializeError, Tag, TagContext, Tags, UserInfo};
pub use source::{FileSource, Limits, MemorySource, Source, Sources};
pub use template::{Document, MissingReferences};
