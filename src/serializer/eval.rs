//! Expression evaluation over JSON values

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::tags::{TagContext, Tags, UserInfo};
use super::SerializeError;
use crate::parser::ast::{BinaryOp, Expr, Literal, UnaryOp};

/// Variable lookup: loop frames innermost first, then the render context
pub(crate) struct Scope<'c> {
    context: &'c Map<String, Value>,
    frames: Vec<Map<String, Value>>,
}

impl<'c> Scope<'c> {
    pub fn new(context: &'c Map<String, Value>) -> Self {
        Self {
            context,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: Map<String, Value>) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    fn find(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.context.get(name))
    }

    /// Resolve a dotted path; a missing final key is null
    pub fn lookup(&self, path: &[String]) -> Result<Value, SerializeError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(Value::Null);
        };
        let mut current = self.find(first);
        for (depth, key) in rest.iter().enumerate() {
            current = match current {
                Some(Value::Object(map)) => map.get(key),
                _ => {
                    return Err(SerializeError::ExpectedDictionary(
                        path[..=depth].join("."),
                    ))
                }
            };
        }
        Ok(current.cloned().unwrap_or(Value::Null))
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text written to the output for a value
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "dictionary",
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> SerializeError {
    SerializeError::TypeMismatch(format!(
        "cannot apply '{}' to {} and {}",
        op,
        type_name(lhs),
        type_name(rhs)
    ))
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, SerializeError> {
    if op == BinaryOp::Add {
        match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => return Ok(Value::String(format!("{}{}", a, b))),
            (Value::String(_), _) | (_, Value::String(_)) => {
                return Ok(Value::String(format!("{}{}", display(lhs), display(rhs))))
            }
            _ => {}
        }
    }

    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(mismatch(op, lhs, rhs));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let checked = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Subtract => x.checked_sub(y),
            BinaryOp::Multiply => x.checked_mul(y),
            BinaryOp::Divide | BinaryOp::Modulo if y == 0 => {
                return Err(SerializeError::DivisionByZero)
            }
            BinaryOp::Divide => x.checked_div(y),
            BinaryOp::Modulo => x.checked_rem(y),
            _ => None,
        };
        if let Some(n) = checked {
            return Ok(Value::from(n));
        }
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(mismatch(op, lhs, rhs)),
    };
    match op {
        BinaryOp::Add => Ok(float(x + y)),
        BinaryOp::Subtract => Ok(float(x - y)),
        BinaryOp::Multiply => Ok(float(x * y)),
        BinaryOp::Divide | BinaryOp::Modulo if y == 0.0 => Err(SerializeError::DivisionByZero),
        BinaryOp::Divide => Ok(float(x / y)),
        BinaryOp::Modulo => Ok(float(x % y)),
        _ => Err(mismatch(op, lhs, rhs)),
    }
}

fn equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, SerializeError> {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| mismatch(op, lhs, rhs))?;

    let result = match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessOrEqual => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

/// Evaluates expressions against a scope, dispatching calls to the tag table
pub(crate) struct Evaluator<'a> {
    pub tags: &'a Tags,
    pub user_info: &'a UserInfo,
}

impl Evaluator<'_> {
    pub fn evaluate(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Value, SerializeError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::from(*n),
                Literal::Float(f) => float(*f),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Variable(path) => scope.lookup(path),
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Negate => match &value {
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => Ok(i
                                .checked_neg()
                                .map(Value::from)
                                .unwrap_or_else(|| float(-(i as f64)))),
                            None => Ok(float(-n.as_f64().unwrap_or_default())),
                        },
                        other => Err(SerializeError::TypeMismatch(format!(
                            "cannot negate {}",
                            type_name(other)
                        ))),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.evaluate(lhs, scope)?;
                match op {
                    BinaryOp::And if !truthy(&left) => Ok(Value::Bool(false)),
                    BinaryOp::Or if truthy(&left) => Ok(Value::Bool(true)),
                    BinaryOp::And | BinaryOp::Or => {
                        Ok(Value::Bool(truthy(&self.evaluate(rhs, scope)?)))
                    }
                    _ => {
                        let right = self.evaluate(rhs, scope)?;
                        match op {
                            BinaryOp::Equal => Ok(Value::Bool(equal(&left, &right))),
                            BinaryOp::NotEqual => Ok(Value::Bool(!equal(&left, &right))),
                            BinaryOp::Less
                            | BinaryOp::LessOrEqual
                            | BinaryOp::Greater
                            | BinaryOp::GreaterOrEqual => compare(*op, &left, &right),
                            _ => arithmetic(*op, &left, &right),
                        }
                    }
                }
            }
            Expr::Call { name, args } => {
                let parameters = args
                    .iter()
                    .map(|arg| self.evaluate(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, parameters, None)
            }
        }
    }

    pub fn call(
        &self,
        name: &str,
        parameters: Vec<Value>,
        body: Option<String>,
    ) -> Result<Value, SerializeError> {
        let tag = self
            .tags
            .get(name)
            .ok_or_else(|| SerializeError::UnknownTag(name.to_string()))?;
        tag.render(&TagContext {
            name,
            parameters,
            body,
            user_info: self.user_info,
        })
    }
}
