//! Error types for lexing, parsing and template resolution

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::serializer::SerializeError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Lex error at {span:?}: {message}")]
    Lex { span: Span, message: String },

    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Lex { span, .. } | ParseError::Syntax { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        let (span, message, detail) = match self {
            ParseError::Lex { span, message } => (span, message, message.clone()),
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };
                (span, message, format!("{}{}", message, expected_str))
            }
        };

        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(message)
            .with_label(
                Label::new((filename, span.clone()))
                    .with_message(detail)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::parser::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::parser::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &crate::parser::lexer::Token) -> String {
    use crate::parser::lexer::Token;
    match tok {
        Token::Raw(_) => "raw text".to_string(),
        Token::Tag(name) => format!("tag '#{}'", name),
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Int(n) => format!("number {}", n),
        Token::Float(n) => format!("number {}", n),
        Token::ParamsOpen | Token::ParenOpen => "'('".to_string(),
        Token::ParamsClose | Token::ParenClose => "')'".to_string(),
        Token::BodyStart => "':'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::True => "keyword 'true'".to_string(),
        Token::False => "keyword 'false'".to_string(),
        Token::In => "keyword 'in'".to_string(),
        other => format!("operator '{}'", other),
    }
}

/// Errors surfaced by the template resolution pipeline
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No registered source produced the named template
    #[error("no template found for {name}")]
    NoTemplateExists { name: String },

    /// A source refused access (sandbox escape, hidden file, unknown source key)
    #[error("illegal access: {detail}")]
    IllegalAccess { detail: String },

    /// A template transitively requires itself
    #[error("{name} cyclically referenced in [{}]", .chain.join(" -> "))]
    CyclicalReference { name: String, chain: Vec<String> },

    /// A document still had references left when serialization was attempted
    #[error("flattening {name} failed, unresolved references: [{}]", .references.join(", "))]
    UnresolvedAst {
        name: String,
        references: Vec<String>,
    },

    /// Cache insert collided with an existing entry
    #[error("{name} already exists in the cache")]
    KeyExists { name: String },

    /// Cache operation attempted while the cache is switched off
    #[error("caching is disabled")]
    CachingDisabled,

    /// Source registered twice under the same key
    #[error("source already registered under key {key}")]
    DuplicateSource { key: String },

    /// I/O failure other than a missing file
    #[error("error reading template file {path}: {message}")]
    ReadFailed { path: String, message: String },

    /// Lex or parse failure of a template's raw text
    #[error("failed to parse {name}: {}", format_parse_errors(.errors))]
    Parse {
        name: String,
        source_text: String,
        errors: Vec<ParseError>,
    },

    /// Failure while producing output from a flat document
    #[error("serialize error: {0}")]
    Serialize(#[from] SerializeError),

    /// Runtime context could not be used as a keyed object
    #[error("invalid render context: {message}")]
    InvalidContext { message: String },
}

impl TemplateError {
    pub fn no_template(name: impl Into<String>) -> Self {
        TemplateError::NoTemplateExists { name: name.into() }
    }

    pub fn illegal_access(detail: impl Into<String>) -> Self {
        TemplateError::IllegalAccess {
            detail: detail.into(),
        }
    }

    /// Human readable report; parse failures are rendered against their source text
    pub fn report(&self) -> String {
        match self {
            TemplateError::Parse {
                name,
                source_text,
                errors,
            } => errors
                .iter()
                .map(|e| e.format(source_text, name))
                .collect::<Vec<_>>()
                .join("\n"),
            other => format!("Error: {}", other),
        }
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = TemplateError::CyclicalReference {
            name: "a".to_string(),
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "a cyclically referenced in [a -> b -> a]");
    }

    #[test]
    fn test_unresolved_message() {
        let err = TemplateError::UnresolvedAst {
            name: "page".to_string(),
            references: vec!["footer".into(), "header".into()],
        };
        assert_eq!(
            err.to_string(),
            "flattening page failed, unresolved references: [footer, header]"
        );
    }

    #[test]
    fn test_parse_report_contains_message() {
        let err = TemplateError::Parse {
            name: "page".to_string(),
            source_text: "#if(x): oops".to_string(),
            errors: vec![ParseError::Syntax {
                span: 12..12,
                message: "Unexpected end of input".to_string(),
                expected: vec!["tag '#endif'".to_string()],
            }],
        };
        let report = err.report();
        assert!(report.contains("Unexpected end of input"));
        assert!(report.contains("#endif"));
    }

    #[test]
    fn test_plain_report() {
        let err = TemplateError::no_template("missing");
        assert_eq!(err.report(), "Error: no template found for missing");
    }
}
