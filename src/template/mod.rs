//! Template documents and reference resolution
//!
//! A [`Document`] is one named template's syntax tree together with the names
//! of the templates it still depends on. Resolution fetches those templates,
//! inlines them, and repeats until the document is flat or nothing more can
//! be supplied.
//!
//! ```text
//! base:  <body>#import("body")</body>
//! page:  #extend("base"):#export("body"):Hello#endexport#endextend
//!
//! page, resolved:  <body>Hello</body>
//! ```

mod document;
mod inline;
pub(crate) mod resolver;

pub use document::Document;
pub use resolver::{cache_key, MissingReferences};
