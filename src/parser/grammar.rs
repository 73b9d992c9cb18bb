//! Parser implementation using chumsky

use std::collections::BTreeMap;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::lexer::{is_keyword_tag, lex, Token};

/// Tag names with built-in meaning; everything else dispatches to the tag table
const BUILTIN_TAGS: &[&str] = &["for", "if", "elseif", "else", "extend", "export", "import"];

fn is_reserved(name: &str) -> bool {
    BUILTIN_TAGS.contains(&name) || is_keyword_tag(name)
}

/// Parse template source into its syntax nodes
pub fn parse(input: &str) -> Result<Vec<Syntax>, Vec<ParseError>> {
    let len = input.len();
    let tokens = lex(input).map_err(|e| vec![e])?;

    let token_stream = Stream::from_iter(tokens.into_iter().map(|(tok, span)| (tok, span.into())))
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    template_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

fn tag<'a, I>(name: &str) -> impl Parser<'a, I, Token, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    just(Token::Tag(name.to_string()))
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Int(n) => Literal::Int(n),
            Token::Float(n) => Literal::Float(n),
            Token::Str(s) => Literal::String(s),
        }
        .map(Expr::Literal)
        .labelled("literal");

        let ident = select! { Token::Ident(s) => s }.labelled("identifier");

        let call = ident
            .clone()
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map(|(name, args)| Expr::Call { name, args });

        let path = ident
            .separated_by(just(Token::Dot))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(Expr::Variable);

        let atom = choice((
            literal,
            call,
            path,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ))
        .boxed();

        let unary = choice((
            just(Token::Not).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Negate),
        ))
        .repeated()
        .foldr(atom, |op, operand| Expr::Unary {
            op,
            operand: Box::new(operand),
        })
        .boxed();

        let product = unary
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Multiply),
                    just(Token::Slash).to(BinaryOp::Divide),
                    just(Token::Percent).to(BinaryOp::Modulo),
                ))
                .then(unary)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Subtract),
                ))
                .then(product)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let comparison = sum
            .clone()
            .foldl(
                choice((
                    just(Token::LessOrEqual).to(BinaryOp::LessOrEqual),
                    just(Token::GreaterOrEqual).to(BinaryOp::GreaterOrEqual),
                    just(Token::Less).to(BinaryOp::Less),
                    just(Token::Greater).to(BinaryOp::Greater),
                ))
                .then(sum)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let equality = comparison
            .clone()
            .foldl(
                choice((
                    just(Token::Equal).to(BinaryOp::Equal),
                    just(Token::NotEqual).to(BinaryOp::NotEqual),
                ))
                .then(comparison)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let and = equality
            .clone()
            .foldl(
                just(Token::And).to(BinaryOp::And).then(equality).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        and.clone()
            .foldl(
                just(Token::Or).to(BinaryOp::Or).then(and).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed()
    })
}

fn template_parser<'a, I>() -> impl Parser<'a, I, Vec<Syntax>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = expression_parser();

    let string_literal = select! { Token::Str(s) => s }.labelled("string");
    let ident = select! { Token::Ident(s) => s }.labelled("identifier");

    let params_open = just(Token::ParamsOpen);
    let params_close = just(Token::ParamsClose);
    let body_start = just(Token::BodyStart);

    let node = recursive(|node| {
        let body = node.clone().repeated().collect::<Vec<_>>();

        let raw = select! { Token::Raw(s) => Syntax::Raw(s) };

        // Anonymous expression tag: #(expr)
        let expression = expr
            .clone()
            .delimited_by(params_open.clone(), params_close.clone())
            .map(Syntax::Expression);

        let condition = expr
            .clone()
            .delimited_by(params_open.clone(), params_close.clone());

        let for_loop = tag("for")
            .ignore_then(
                ident
                    .clone()
                    .then_ignore(just(Token::In))
                    .then(expr.clone())
                    .delimited_by(params_open.clone(), params_close.clone()),
            )
            .then_ignore(body_start.clone())
            .then(body.clone())
            .then_ignore(tag("endfor"))
            .map(|((variable, collection), body)| {
                Syntax::Loop(Loop {
                    variable,
                    collection,
                    body,
                })
            });

        let conditional = tag("if")
            .ignore_then(condition.clone())
            .then_ignore(body_start.clone())
            .then(body.clone())
            .then(
                tag("elseif")
                    .ignore_then(condition.clone())
                    .then_ignore(body_start.clone())
                    .then(body.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then(
                tag("else")
                    .ignore_then(body_start.clone().or_not())
                    .ignore_then(body.clone())
                    .or_not(),
            )
            .then_ignore(tag("endif"))
            .map(|(((condition, first), others), otherwise)| {
                let mut branches = vec![Branch {
                    condition: Some(condition),
                    body: first,
                }];
                branches.extend(others.into_iter().map(|(condition, body)| Branch {
                    condition: Some(condition),
                    body,
                }));
                if let Some(body) = otherwise {
                    branches.push(Branch {
                        condition: None,
                        body,
                    });
                }
                Syntax::Conditional(Conditional { branches })
            });

        // #export("key"): body #endexport, or #export("key", value)
        let export = tag("export")
            .ignore_then(
                string_literal
                    .clone()
                    .then(just(Token::Comma).ignore_then(expr.clone()).or_not())
                    .delimited_by(params_open.clone(), params_close.clone()),
            )
            .then(
                body_start
                    .clone()
                    .ignore_then(body.clone())
                    .then_ignore(tag("endexport"))
                    .or_not(),
            )
            .try_map(|((key, value), body), span| match (value, body) {
                (Some(_), Some(_)) => Err(Rich::custom(
                    span,
                    format!("#export(\"{}\") cannot take both a value and a body", key),
                )),
                (Some(value), None) => Ok(Export {
                    key,
                    body: vec![Syntax::Expression(value)],
                }),
                (None, body) => Ok(Export {
                    key,
                    body: body.unwrap_or_default(),
                }),
            })
            .boxed();

        // Only exports and whitespace may appear inside an extend body
        let extend_item = choice((
            export.clone().map(Some),
            select! { Token::Raw(s) => s }.try_map(|s, span| {
                if s.trim().is_empty() {
                    Ok(None)
                } else {
                    Err(Rich::custom(span, "only #export may appear inside #extend"))
                }
            }),
        ));

        let extend = tag("extend")
            .ignore_then(
                string_literal
                    .clone()
                    .delimited_by(params_open.clone(), params_close.clone()),
            )
            .then(
                body_start
                    .clone()
                    .ignore_then(extend_item.repeated().collect::<Vec<_>>())
                    .then_ignore(tag("endextend"))
                    .or_not(),
            )
            .map(|(template, items)| {
                let exports: BTreeMap<String, Export> = items
                    .unwrap_or_default()
                    .into_iter()
                    .flatten()
                    .map(|export| (export.key.clone(), export))
                    .collect();
                Syntax::Extend(Extend { template, exports })
            });

        let import = tag("import")
            .ignore_then(string_literal.delimited_by(params_open.clone(), params_close.clone()))
            .map(|key| Syntax::Import(Import { key }));

        let custom_name = select! { Token::Tag(name) if !is_reserved(&name) => name };
        let custom = custom_name
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(params_open.clone(), params_close.clone()),
            )
            .then(
                body_start
                    .clone()
                    .ignore_then(body.clone())
                    .then(select! { Token::Tag(closing) => closing })
                    .or_not(),
            )
            .try_map(|((name, params), body), span| match body {
                Some((_, closing)) if closing != format!("end{}", name) => Err(Rich::custom(
                    span,
                    format!("expected #end{} to close #{}, found #{}", name, name, closing),
                )),
                Some((body, _)) => Ok(Syntax::Custom(CustomTag {
                    name,
                    params,
                    body: Some(body),
                })),
                None => Ok(Syntax::Custom(CustomTag {
                    name,
                    params,
                    body: None,
                })),
            });

        choice((
            raw,
            expression,
            for_loop,
            conditional,
            extend,
            export.map(Syntax::Export),
            import,
            custom,
        ))
        .boxed()
    });

    node.repeated().collect().then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(path: &str) -> Expr {
        Expr::Variable(path.split('.').map(String::from).collect())
    }

    #[test]
    fn test_parse_raw_only() {
        let nodes = parse("<html></html>").expect("Should parse");
        assert_eq!(nodes, vec![Syntax::Raw("<html></html>".to_string())]);
    }

    #[test]
    fn test_parse_expression_precedence() {
        let nodes = parse("#(a + b * 2 == c || !d)").expect("Should parse");
        let expected = binary(
            BinaryOp::Or,
            binary(
                BinaryOp::Equal,
                binary(
                    BinaryOp::Add,
                    var("a"),
                    binary(BinaryOp::Multiply, var("b"), Expr::Literal(Literal::Int(2))),
                ),
                var("c"),
            ),
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(var("d")),
            },
        );
        assert_eq!(nodes, vec![Syntax::Expression(expected)]);
    }

    #[test]
    fn test_parse_call_and_path() {
        let nodes = parse(r#"#(uppercased(user.name, "x"))"#).expect("Should parse");
        assert_eq!(
            nodes,
            vec![Syntax::Expression(Expr::Call {
                name: "uppercased".to_string(),
                args: vec![var("user.name"), Expr::Literal(Literal::String("x".into()))],
            })]
        );
    }

    #[test]
    fn test_parse_loop() {
        let nodes = parse("#for(x in xs):<li>#(x)</li>#endfor").expect("Should parse");
        assert_eq!(
            nodes,
            vec![Syntax::Loop(Loop {
                variable: "x".to_string(),
                collection: var("xs"),
                body: vec![
                    Syntax::Raw("<li>".to_string()),
                    Syntax::Expression(var("x")),
                    Syntax::Raw("</li>".to_string()),
                ],
            })]
        );
    }

    #[test]
    fn test_parse_conditional_chain() {
        let nodes = parse("#if(a):A#elseif(b):B#else:C#endif").expect("Should parse");
        match &nodes[..] {
            [Syntax::Conditional(c)] => {
                assert_eq!(c.branches.len(), 3);
                assert_eq!(c.branches[0].condition, Some(var("a")));
                assert_eq!(c.branches[1].condition, Some(var("b")));
                assert_eq!(c.branches[2].condition, None);
                assert_eq!(c.branches[2].body, vec![Syntax::Raw("C".to_string())]);
            }
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_extend_with_exports() {
        let nodes = parse(
            "#extend(\"base\"):\n  #export(\"title\", \"Home\")\n  #export(\"body\"):hi#endexport\n#endextend",
        )
        .expect("Should parse");
        match &nodes[..] {
            [Syntax::Extend(e)] => {
                assert_eq!(e.template, "base");
                assert_eq!(
                    e.exports.keys().cloned().collect::<Vec<_>>(),
                    vec!["body".to_string(), "title".to_string()]
                );
                assert_eq!(e.exports["body"].body, vec![Syntax::Raw("hi".to_string())]);
                assert_eq!(
                    e.exports["title"].body,
                    vec![Syntax::Expression(Expr::Literal(Literal::String(
                        "Home".into()
                    )))]
                );
            }
            other => panic!("Expected extend, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_extend_and_import() {
        let nodes = parse(r#"#extend("header")<main>#import("body")</main>"#).expect("Should parse");
        assert_eq!(
            nodes,
            vec![
                Syntax::Extend(Extend {
                    template: "header".to_string(),
                    exports: BTreeMap::new(),
                }),
                Syntax::Raw("<main>".to_string()),
                Syntax::Import(Import {
                    key: "body".to_string()
                }),
                Syntax::Raw("</main>".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_custom_tag_with_body() {
        let nodes = parse("#uppercased(1):abc#enduppercased").expect("Should parse");
        assert_eq!(
            nodes,
            vec![Syntax::Custom(CustomTag {
                name: "uppercased".to_string(),
                params: vec![Expr::Literal(Literal::Int(1))],
                body: Some(vec![Syntax::Raw("abc".to_string())]),
            })]
        );
    }

    #[test]
    fn test_extend_rejects_text_body() {
        let errs = parse(r#"#extend("base"):oops#endextend"#).unwrap_err();
        assert!(!errs.is_empty());
    }

    #[test]
    fn test_export_rejects_value_and_body() {
        let errs = parse(r#"#export("a", 1):x#endexport"#).unwrap_err();
        match &errs[0] {
            ParseError::Syntax { message, .. } => {
                assert!(message.contains("both a value and a body"))
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_tag_mismatched_end() {
        let errs = parse("#box(1):x#endother").unwrap_err();
        assert!(!errs.is_empty());
    }

    #[test]
    fn test_unclosed_if() {
        let errs = parse("#if(a):never closed").unwrap_err();
        assert!(matches!(errs[0], ParseError::Syntax { .. }));
    }

    #[test]
    fn test_lex_error_is_reported() {
        let errs = parse("#(a ~ b)").unwrap_err();
        assert!(matches!(errs[0], ParseError::Lex { .. }));
    }
}
