//! Abstract Syntax Tree types for templates

use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// Literal values appearing in tag parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

/// Expression evaluated against the render context
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Dotted path such as `user.name`
    Variable(Vec<String>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Call of a registered tag, `name(args)`
    Call { name: String, args: Vec<Expr> },
}

/// `#for(variable in collection): body #endfor`
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub variable: String,
    pub collection: Expr,
    pub body: Vec<Syntax>,
}

/// One `#if`/`#elseif`/`#else` arm; `condition` is `None` for `#else`
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Option<Expr>,
    pub body: Vec<Syntax>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub branches: Vec<Branch>,
}

/// `#extend("template")`, optionally carrying exports for the extended template
#[derive(Debug, Clone, PartialEq)]
pub struct Extend {
    pub template: String,
    pub exports: BTreeMap<String, Export>,
}

/// `#import("key")`, filled by a matching export when inlined
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub key: String,
}

/// `#export("key"): body #endexport` or `#export("key", value)`
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub key: String,
    pub body: Vec<Syntax>,
}

/// Invocation of a registered tag, `#name(params)` with an optional body
#[derive(Debug, Clone, PartialEq)]
pub struct CustomTag {
    pub name: String,
    pub params: Vec<Expr>,
    pub body: Option<Vec<Syntax>>,
}

/// One syntax node of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Raw(String),
    Expression(Expr),
    Loop(Loop),
    Conditional(Conditional),
    Extend(Extend),
    Import(Import),
    Export(Export),
    Custom(CustomTag),
}

impl Syntax {
    pub fn is_raw(&self) -> bool {
        matches!(self, Syntax::Raw(_))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Variable(path) => write!(f, "{}", path.join(".")),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{}", operand),
                UnaryOp::Negate => write!(f, "-{}", operand),
            },
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Call { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
        }
    }
}

/// Render an indented, human readable description of a node sequence
pub fn print_tree(nodes: &[Syntax]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_body(&mut out, nodes, 0);
    out
}

fn write_body(out: &mut String, body: &[Syntax], depth: usize) -> fmt::Result {
    for node in body {
        write_node(out, node, depth)?;
    }
    Ok(())
}

fn write_node(out: &mut String, node: &Syntax, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match node {
        Syntax::Raw(text) => writeln!(out, "{}raw({:?})", indent, text),
        Syntax::Expression(expr) => writeln!(out, "{}expression[{}]", indent, expr),
        Syntax::Import(import) => writeln!(out, "{}import({:?})", indent, import.key),
        Syntax::Loop(l) => {
            writeln!(out, "{}for({} in {}):", indent, l.variable, l.collection)?;
            write_body(out, &l.body, depth + 1)
        }
        Syntax::Conditional(c) => {
            writeln!(out, "{}conditional:", indent)?;
            for branch in &c.branches {
                match &branch.condition {
                    Some(cond) => writeln!(out, "{}  if({}):", indent, cond)?,
                    None => writeln!(out, "{}  else:", indent)?,
                }
                write_body(out, &branch.body, depth + 2)?;
            }
            Ok(())
        }
        Syntax::Extend(e) if e.exports.is_empty() => {
            writeln!(out, "{}extend({:?})", indent, e.template)
        }
        Syntax::Extend(e) => {
            writeln!(out, "{}extend({:?}):", indent, e.template)?;
            for export in e.exports.values() {
                write_export(out, export, depth + 1)?;
            }
            Ok(())
        }
        Syntax::Export(export) => write_export(out, export, depth),
        Syntax::Custom(tag) => {
            let params: Vec<String> = tag.params.iter().map(|p| p.to_string()).collect();
            match &tag.body {
                Some(body) => {
                    writeln!(out, "{}{}({}):", indent, tag.name, params.join(", "))?;
                    write_body(out, body, depth + 1)
                }
                None => writeln!(out, "{}{}({})", indent, tag.name, params.join(", ")),
            }
        }
    }
}

fn write_export(out: &mut String, export: &Export, depth: usize) -> fmt::Result {
    writeln!(out, "{}export({:?}):", "  ".repeat(depth), export.key)?;
    write_body(out, &export.body, depth + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::Variable(vec!["user".into(), "age".into()])),
            rhs: Box::new(Expr::Literal(Literal::Int(1))),
        };
        assert_eq!(expr.to_string(), "(user.age + 1)");
    }

    #[test]
    fn test_print_tree_nested() {
        let nodes = vec![
            Syntax::Raw("<ul>".into()),
            Syntax::Loop(Loop {
                variable: "x".into(),
                collection: Expr::Variable(vec!["xs".into()]),
                body: vec![Syntax::Expression(Expr::Variable(vec!["x".into()]))],
            }),
            Syntax::Import(Import { key: "body".into() }),
        ];
        insta::assert_snapshot!(print_tree(&nodes), @r###"
        raw("<ul>")
        for(x in xs):
          expression[x]
        import("body")
        "###);
    }
}
