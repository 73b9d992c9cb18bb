//! Custom tag table consulted by the serializer

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::eval::display;
use super::SerializeError;

/// Renderer-scoped data handed to every tag invocation
pub type UserInfo = Map<String, Value>;

/// Everything a tag sees when invoked
#[derive(Debug)]
pub struct TagContext<'a> {
    pub name: &'a str,
    /// Evaluated parameters in call order
    pub parameters: Vec<Value>,
    /// Rendered body for `#tag(..): body #endtag` invocations
    pub body: Option<String>,
    pub user_info: &'a UserInfo,
}

impl TagContext<'_> {
    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index)
    }

    /// Error attributed to this tag
    pub fn error(&self, message: impl Into<String>) -> SerializeError {
        SerializeError::Tag {
            name: self.name.to_string(),
            message: message.into(),
        }
    }

    /// The rendered body, or else the first parameter, as text
    pub fn text(&self) -> Result<String, SerializeError> {
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }
        match self.parameter(0) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(self.error("expected a string parameter")),
            Some(other) => Ok(display(other)),
        }
    }
}

/// A function callable from templates as `#name(..)` or `#(name(..))`
pub trait Tag: Send + Sync {
    fn render(&self, ctx: &TagContext<'_>) -> Result<Value, SerializeError>;
}

impl<F> Tag for F
where
    F: Fn(&TagContext<'_>) -> Result<Value, SerializeError> + Send + Sync,
{
    fn render(&self, ctx: &TagContext<'_>) -> Result<Value, SerializeError> {
        self(ctx)
    }
}

/// Name to tag table, fixed when a renderer is built
#[derive(Clone)]
pub struct Tags {
    entries: HashMap<String, Arc<dyn Tag>>,
}

impl fmt::Debug for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Tags").field("names", &names).finish()
    }
}

impl Default for Tags {
    fn default() -> Self {
        Self::empty()
            .with("lowercased", lowercased)
            .with("uppercased", uppercased)
            .with("capitalized", capitalized)
            .with("count", count)
            .with("contains", contains)
    }
}

impl Tags {
    /// Table without the built-in tags
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `tag`, replacing any previous entry of the same name
    pub fn register(&mut self, name: impl Into<String>, tag: impl Tag + 'static) {
        self.entries.insert(name.into(), Arc::new(tag));
    }

    pub fn with(mut self, name: impl Into<String>, tag: impl Tag + 'static) -> Self {
        self.register(name, tag);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tag>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

fn lowercased(ctx: &TagContext<'_>) -> Result<Value, SerializeError> {
    Ok(Value::String(ctx.text()?.to_lowercase()))
}

fn uppercased(ctx: &TagContext<'_>) -> Result<Value, SerializeError> {
    Ok(Value::String(ctx.text()?.to_uppercase()))
}

fn capitalized(ctx: &TagContext<'_>) -> Result<Value, SerializeError> {
    let text = ctx.text()?;
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

fn count(ctx: &TagContext<'_>) -> Result<Value, SerializeError> {
    match ctx.parameter(0) {
        Some(Value::Array(items)) => Ok(Value::from(items.len())),
        Some(Value::Object(map)) => Ok(Value::from(map.len())),
        Some(Value::String(s)) => Ok(Value::from(s.chars().count())),
        _ => Err(ctx.error("expected an array, dictionary or string")),
    }
}

fn contains(ctx: &TagContext<'_>) -> Result<Value, SerializeError> {
    match (ctx.parameter(0), ctx.parameter(1)) {
        (Some(Value::Array(items)), Some(needle)) => Ok(Value::Bool(items.contains(needle))),
        (Some(Value::String(haystack)), Some(Value::String(needle))) => {
            Ok(Value::Bool(haystack.contains(needle.as_str())))
        }
        (Some(Value::Object(map)), Some(Value::String(key))) => {
            Ok(Value::Bool(map.contains_key(key)))
        }
        _ => Err(ctx.error("expected a collection and an item")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(tags: &Tags, name: &str, parameters: Vec<Value>) -> Result<Value, SerializeError> {
        let user_info = UserInfo::new();
        let ctx = TagContext {
            name,
            parameters,
            body: None,
            user_info: &user_info,
        };
        tags.get(name).expect("Tag should exist").render(&ctx)
    }

    #[test]
    fn test_builtin_text_tags() {
        let tags = Tags::default();
        assert_eq!(call(&tags, "lowercased", vec![json!("HeLLo")]).unwrap(), json!("hello"));
        assert_eq!(call(&tags, "uppercased", vec![json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(call(&tags, "capitalized", vec![json!("élan")]).unwrap(), json!("Élan"));
    }

    #[test]
    fn test_builtin_collection_tags() {
        let tags = Tags::default();
        assert_eq!(call(&tags, "count", vec![json!([1, 2, 3])]).unwrap(), json!(3));
        assert_eq!(
            call(&tags, "contains", vec![json!(["a", "b"]), json!("b")]).unwrap(),
            json!(true)
        );
        assert!(matches!(
            call(&tags, "count", vec![json!(5)]),
            Err(SerializeError::Tag { name, .. }) if name == "count"
        ));
    }

    #[test]
    fn test_register_replaces_existing() {
        let tags = Tags::default().with(
            "uppercased",
            |_: &TagContext<'_>| -> Result<Value, SerializeError> { Ok(json!("custom")) },
        );
        assert_eq!(call(&tags, "uppercased", vec![json!("x")]).unwrap(), json!("custom"));
    }

    #[test]
    fn test_empty_table() {
        let tags = Tags::empty();
        assert!(!tags.contains("lowercased"));
    }
}
