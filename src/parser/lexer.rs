//! Lexer for template sources using logos
//!
//! Template text is lexed in two modes. Outside of tags everything is raw
//! text; after a tag name and its opening `(` the lexer morphs into
//! parameter mode until the matching `)`.

use std::fmt;

use logos::{Lexer, Logos};

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Tokens recognised outside of tag parameters
#[derive(Logos, Debug, Clone, PartialEq)]
enum TextToken {
    #[token("#(")]
    AnonymousTag,

    #[regex(r"#[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Tag(String),

    #[token("\\#")]
    EscapedIndicator,

    #[token("#")]
    Indicator,

    #[token("\\")]
    Backslash,

    #[regex(r"[^#\\]+")]
    Text,
}

/// Tokens recognised inside a tag's parameter list
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum ParamToken {
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    // Operators (longer first)
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Not,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("in")]
    In,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
}

/// Token stream consumed by the grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal template text, adjacent fragments already merged
    Raw(String),
    /// `#name`; the name excludes the indicator
    Tag(String),
    /// Opening parenthesis of a tag's parameter list
    ParamsOpen,
    /// Closing parenthesis of a tag's parameter list
    ParamsClose,
    /// `:` directly after a tag, opening its body
    BodyStart,

    ParenOpen,
    ParenClose,
    Comma,
    Dot,

    Equal,
    NotEqual,
    LessOrEqual,
    GreaterOrEqual,
    Less,
    Greater,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    True,
    False,
    In,

    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Raw(s) => write!(f, "{}", s),
            Token::Tag(name) => write!(f, "#{}", name),
            Token::ParamsOpen | Token::ParenOpen => write!(f, "("),
            Token::ParamsClose | Token::ParenClose => write!(f, ")"),
            Token::BodyStart => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LessOrEqual => write!(f, "<="),
            Token::GreaterOrEqual => write!(f, ">="),
            Token::Less => write!(f, "<"),
            Token::Greater => write!(f, ">"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::In => write!(f, "in"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<ParamToken> for Token {
    fn from(tok: ParamToken) -> Self {
        match tok {
            ParamToken::ParenOpen => Token::ParenOpen,
            ParamToken::ParenClose => Token::ParenClose,
            ParamToken::Comma => Token::Comma,
            ParamToken::Dot => Token::Dot,
            ParamToken::Equal => Token::Equal,
            ParamToken::NotEqual => Token::NotEqual,
            ParamToken::LessOrEqual => Token::LessOrEqual,
            ParamToken::GreaterOrEqual => Token::GreaterOrEqual,
            ParamToken::Less => Token::Less,
            ParamToken::Greater => Token::Greater,
            ParamToken::And => Token::And,
            ParamToken::Or => Token::Or,
            ParamToken::Not => Token::Not,
            ParamToken::Plus => Token::Plus,
            ParamToken::Minus => Token::Minus,
            ParamToken::Star => Token::Star,
            ParamToken::Slash => Token::Slash,
            ParamToken::Percent => Token::Percent,
            ParamToken::True => Token::True,
            ParamToken::False => Token::False,
            ParamToken::In => Token::In,
            ParamToken::Ident(s) => Token::Ident(s),
            ParamToken::Int(n) => Token::Int(n),
            ParamToken::Float(n) => Token::Float(n),
            ParamToken::Str(s) => Token::Str(s),
        }
    }
}

/// Tags that are meaningful without a parameter list
pub fn is_keyword_tag(name: &str) -> bool {
    name == "else" || (name.len() > 3 && name.starts_with("end"))
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn push_raw(out: &mut Vec<(Token, Span)>, text: &str, span: Span) {
    if let Some((Token::Raw(prev), prev_span)) = out.last_mut() {
        prev.push_str(text);
        prev_span.end = span.end;
        return;
    }
    out.push((Token::Raw(text.to_string()), span));
}

/// Lex a tag's parameter list up to and including its closing parenthesis.
fn lex_params<'s>(
    mut params: Lexer<'s, ParamToken>,
    out: &mut Vec<(Token, Span)>,
) -> Result<Lexer<'s, ParamToken>, ParseError> {
    let mut depth = 1usize;
    while let Some(result) = params.next() {
        let span = params.span();
        let token = match result {
            Ok(ParamToken::ParenOpen) => {
                depth += 1;
                Token::ParenOpen
            }
            Ok(ParamToken::ParenClose) => {
                depth -= 1;
                if depth == 0 {
                    out.push((Token::ParamsClose, span));
                    return Ok(params);
                }
                Token::ParenClose
            }
            Ok(tok) => tok.into(),
            Err(()) => {
                return Err(ParseError::Lex {
                    message: format!("unexpected '{}' in tag parameters", params.slice()),
                    span,
                })
            }
        };
        out.push((token, span));
    }

    let end = params.source().len();
    Err(ParseError::Lex {
        span: end..end,
        message: "unterminated tag parameters, expected ')'".to_string(),
    })
}

/// Lex template source into a token stream with byte spans
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut out = Vec::new();
    let mut text = TextToken::lexer(source);

    while let Some(result) = text.next() {
        let span = text.span();
        match result {
            Ok(TextToken::Text) => push_raw(&mut out, text.slice(), span),
            Ok(TextToken::EscapedIndicator) | Ok(TextToken::Indicator) => {
                push_raw(&mut out, "#", span)
            }
            Ok(TextToken::Backslash) => push_raw(&mut out, "\\", span),
            Ok(TextToken::AnonymousTag) => {
                out.push((Token::ParamsOpen, span.end - 1..span.end));
                let params = lex_params(text.morph::<ParamToken>(), &mut out)?;
                text = params.morph();
            }
            Ok(TextToken::Tag(name)) => {
                if text.remainder().starts_with('(') {
                    out.push((Token::Tag(name), span.clone()));
                    out.push((Token::ParamsOpen, span.end..span.end + 1));
                    text.bump(1);
                    let params = lex_params(text.morph::<ParamToken>(), &mut out)?;
                    text = params.morph();
                    open_body(&mut text, &mut out);
                } else if is_keyword_tag(&name) {
                    let is_else = name == "else";
                    out.push((Token::Tag(name), span));
                    if is_else {
                        open_body(&mut text, &mut out);
                    }
                } else {
                    push_raw(&mut out, text.slice(), span);
                }
            }
            Err(()) => {
                return Err(ParseError::Lex {
                    message: format!("unexpected '{}'", text.slice()),
                    span,
                })
            }
        }
    }

    Ok(out)
}

fn open_body(text: &mut Lexer<'_, TextToken>, out: &mut Vec<(Token, Span)>) {
    if text.remainder().starts_with(':') {
        let at = text.source().len() - text.remainder().len();
        text.bump(1);
        out.push((Token::BodyStart, at..at + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        lex(source)
            .expect("Should lex")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_plain_text_is_single_raw() {
        assert_eq!(
            tokens("<p>hello</p>\n"),
            vec![Token::Raw("<p>hello</p>\n".to_string())]
        );
    }

    #[test]
    fn test_expression_tag() {
        assert_eq!(
            tokens("Hi #(name)!"),
            vec![
                Token::Raw("Hi ".to_string()),
                Token::ParamsOpen,
                Token::Ident("name".to_string()),
                Token::ParamsClose,
                Token::Raw("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_named_tag_with_body() {
        assert_eq!(
            tokens(r#"#export("body"):hi#endexport"#),
            vec![
                Token::Tag("export".to_string()),
                Token::ParamsOpen,
                Token::Str("body".to_string()),
                Token::ParamsClose,
                Token::BodyStart,
                Token::Raw("hi".to_string()),
                Token::Tag("endexport".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested_parens_and_operators() {
        assert_eq!(
            tokens("#if((a + 1) >= 2 && !b):"),
            vec![
                Token::Tag("if".to_string()),
                Token::ParamsOpen,
                Token::ParenOpen,
                Token::Ident("a".to_string()),
                Token::Plus,
                Token::Int(1),
                Token::ParenClose,
                Token::GreaterOrEqual,
                Token::Int(2),
                Token::And,
                Token::Not,
                Token::Ident("b".to_string()),
                Token::ParamsClose,
                Token::BodyStart,
            ]
        );
    }

    #[test]
    fn test_for_loop_header() {
        assert_eq!(
            tokens("#for(item in items.all):"),
            vec![
                Token::Tag("for".to_string()),
                Token::ParamsOpen,
                Token::Ident("item".to_string()),
                Token::In,
                Token::Ident("items".to_string()),
                Token::Dot,
                Token::Ident("all".to_string()),
                Token::ParamsClose,
                Token::BodyStart,
            ]
        );
    }

    #[test]
    fn test_escaped_and_lone_indicators_are_raw() {
        assert_eq!(
            tokens(r"\#(x) costs #1 in #ff0000"),
            vec![Token::Raw("#(x) costs #1 in #ff0000".to_string())]
        );
    }

    #[test]
    fn test_keyword_tags_without_params() {
        assert_eq!(
            tokens("#else:x#endif"),
            vec![
                Token::Tag("else".to_string()),
                Token::BodyStart,
                Token::Raw("x".to_string()),
                Token::Tag("endif".to_string()),
            ]
        );
    }

    #[test]
    fn test_colon_after_end_tag_is_raw() {
        assert_eq!(
            tokens("#endif: done"),
            vec![
                Token::Tag("endif".to_string()),
                Token::Raw(": done".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_numbers() {
        assert_eq!(
            tokens(r#"#(f("a\"b", 1.5, 7))"#),
            vec![
                Token::ParamsOpen,
                Token::Ident("f".to_string()),
                Token::ParenOpen,
                Token::Str("a\"b".to_string()),
                Token::Comma,
                Token::Float(1.5),
                Token::Comma,
                Token::Int(7),
                Token::ParenClose,
                Token::ParamsClose,
            ]
        );
    }

    #[test]
    fn test_spans_cover_source() {
        let lexed = lex("ab#(x)cd").expect("Should lex");
        let spans: Vec<_> = lexed.into_iter().map(|(_, s)| s).collect();
        assert_eq!(spans, vec![0..2, 3..4, 4..5, 5..6, 6..8]);
    }

    #[test]
    fn test_unterminated_params() {
        let err = lex("#if(a == b").unwrap_err();
        assert!(matches!(err, ParseError::Lex { span, .. } if span == (10..10)));
    }

    #[test]
    fn test_unknown_character_in_params() {
        let err = lex("#(a @ b)").unwrap_err();
        match err {
            ParseError::Lex { span, message } => {
                assert_eq!(span, 4..5);
                assert!(message.contains('@'));
            }
            other => panic!("Expected lex error, got {:?}", other),
        }
    }
}
