//! Produces output text from flat documents and a runtime context

mod eval;
mod tags;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::parser::ast::{Expr, Syntax};

use eval::{Evaluator, Scope};

pub use eval::{display, truthy};
pub use tags::{Tag, TagContext, Tags, UserInfo};

/// Errors raised while serializing a document
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SerializeError {
    #[error("#extend(\"{0}\") was never resolved")]
    Unresolved(String),

    #[error("no tag registered under the name {0}")]
    UnknownTag(String),

    #[error("expected dictionary at key: {0}")]
    ExpectedDictionary(String),

    #[error("{0} is not iterable")]
    NotIterable(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("tag {name} failed: {message}")]
    Tag { name: String, message: String },
}

/// Serializes node sequences using a tag table and renderer-scoped user data
pub struct Serializer<'a> {
    evaluator: Evaluator<'a>,
}

impl<'a> Serializer<'a> {
    pub fn new(tags: &'a Tags, user_info: &'a UserInfo) -> Self {
        Self {
            evaluator: Evaluator { tags, user_info },
        }
    }

    pub fn serialize(
        &self,
        nodes: &[Syntax],
        context: &Map<String, Value>,
    ) -> Result<String, SerializeError> {
        let mut scope = Scope::new(context);
        let mut out = String::new();
        self.write_nodes(nodes, &mut scope, &mut out)?;
        Ok(out)
    }

    fn write_nodes(
        &self,
        nodes: &[Syntax],
        scope: &mut Scope<'_>,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        for node in nodes {
            self.write_node(node, scope, out)?;
        }
        Ok(())
    }

    fn write_node(
        &self,
        node: &Syntax,
        scope: &mut Scope<'_>,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        match node {
            Syntax::Raw(text) => out.push_str(text),
            Syntax::Expression(expr) => {
                out.push_str(&display(&self.evaluator.evaluate(expr, scope)?));
            }
            Syntax::Loop(l) => {
                let items = match self.evaluator.evaluate(&l.collection, scope)? {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    _ => return Err(SerializeError::NotIterable(l.collection.to_string())),
                };
                let last = items.len().saturating_sub(1);
                for (index, item) in items.into_iter().enumerate() {
                    let mut frame = Map::new();
                    frame.insert(l.variable.clone(), item);
                    frame.insert("index".to_string(), Value::from(index));
                    frame.insert("isFirst".to_string(), Value::Bool(index == 0));
                    frame.insert("isLast".to_string(), Value::Bool(index == last));
                    scope.push(frame);
                    let written = self.write_nodes(&l.body, scope, out);
                    scope.pop();
                    written?;
                }
            }
            Syntax::Conditional(c) => {
                for branch in &c.branches {
                    let taken = match &branch.condition {
                        Some(condition) => truthy(&self.evaluator.evaluate(condition, scope)?),
                        None => true,
                    };
                    if taken {
                        self.write_nodes(&branch.body, scope, out)?;
                        break;
                    }
                }
            }
            Syntax::Custom(tag) => {
                let parameters = self.arguments(&tag.params, scope)?;
                let body = match &tag.body {
                    Some(body) => {
                        let mut rendered = String::new();
                        self.write_nodes(body, scope, &mut rendered)?;
                        Some(rendered)
                    }
                    None => None,
                };
                let value = self.evaluator.call(&tag.name, parameters, body)?;
                out.push_str(&display(&value));
            }
            Syntax::Extend(extend) => {
                return Err(SerializeError::Unresolved(extend.template.clone()))
            }
            // Leftover blocks with nothing to fill or nowhere to go
            Syntax::Import(_) | Syntax::Export(_) => {}
        }
        Ok(())
    }

    fn arguments(&self, params: &[Expr], scope: &Scope<'_>) -> Result<Vec<Value>, SerializeError> {
        params
            .iter()
            .map(|param| self.evaluator.evaluate(param, scope))
            .collect()
    }
}
