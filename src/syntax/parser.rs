//! Cell language parser.
//!
//! Converts cell source into statement/expression AST nodes with source
//! location tracking. Purely syntactic; no name resolution happens here.

use miette::SourceSpan;
use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{BinOp, Expr, Span, Stmt};
use crate::errors::{report_with_source, ErrorKind, NbError, SourceContext};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct CellParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse one block of cell source into statements.
pub fn parse(source_text: &str, context: &SourceContext) -> Result<Vec<Stmt>, NbError> {
    if source_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let pairs = CellParser::parse(Rule::program, source_text)
        .map_err(|e| convert_parse_error(e, context))?;

    let program = pairs.peek().unwrap(); // pest guarantees the program rule exists

    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| build_stmt(p, context))
        .collect()
}

// ============================================================================
// STATEMENT BUILDERS
// ============================================================================

fn build_stmt(pair: Pair<Rule>, context: &SourceContext) -> Result<Stmt, NbError> {
    let span = span_of(&pair);
    let inner = pair.into_inner().next().unwrap(); // grammar guarantees inner exists

    match inner.as_rule() {
        Rule::assign_stmt => {
            let mut parts = inner.into_inner();
            let target_list = parts.next().unwrap(); // grammar guarantees targets
            let targets = target_list
                .into_inner()
                .map(|p| p.as_str().to_string())
                .collect();
            let value_pair = parts.next().unwrap(); // grammar guarantees a value
            let value = build_expr(value_pair, context)?;
            Ok(Stmt::Assign {
                targets,
                value,
                span,
            })
        }
        Rule::expr_stmt => {
            let value_pair = inner.into_inner().next().unwrap();
            let value = build_expr(value_pair, context)?;
            Ok(Stmt::Expr { value, span })
        }
        Rule::import_stmt => {
            let mut module = String::new();
            let mut alias = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::dotted_name => module = part.as_str().to_string(),
                    Rule::ident => alias = Some(part.as_str().to_string()),
                    _ => {}
                }
            }
            Ok(Stmt::Import {
                module,
                alias,
                span,
            })
        }
        Rule::func_def => {
            let mut name = String::new();
            let mut params = Vec::new();
            let mut body = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::ident => name = part.as_str().to_string(),
                    Rule::param_list => {
                        params = part.into_inner().map(|p| p.as_str().to_string()).collect();
                    }
                    Rule::expr => body = Some(build_expr(part, context)?),
                    _ => {}
                }
            }
            let body = body.ok_or_else(|| {
                malformed(context, "function definition", span)
            })?;
            Ok(Stmt::FuncDef {
                name,
                params,
                body,
                span,
            })
        }
        other => Err(report_with_source(
            context,
            ErrorKind::MalformedConstruct {
                construct: format!("{:?}", other),
            },
            to_miette(span),
        )),
    }
}

// ============================================================================
// EXPRESSION BUILDERS
// ============================================================================

fn build_expr(pair: Pair<Rule>, context: &SourceContext) -> Result<Expr, NbError> {
    let span = span_of(&pair);

    match pair.as_rule() {
        Rule::expr | Rule::primary | Rule::literal => {
            let inner = pair.into_inner().next().unwrap(); // grammar guarantees inner exists
            build_expr(inner, context)
        }

        Rule::sum | Rule::product => build_binary_chain(pair, context),

        Rule::unary => {
            let mut inner = pair.into_inner();
            let first = inner.next().unwrap();
            if first.as_rule() == Rule::minus {
                let operand = build_expr(inner.next().unwrap(), context)?;
                Ok(Expr::Neg(Box::new(operand), span))
            } else {
                build_expr(first, context)
            }
        }

        Rule::postfix => build_postfix_chain(pair, context),

        Rule::number => {
            let text = pair.as_str();
            let value = text.parse::<f64>().map_err(|_| {
                report_with_source(
                    context,
                    ErrorKind::InvalidLiteral {
                        literal_type: "number".into(),
                        value: text.into(),
                    },
                    to_miette(span),
                )
            })?;
            Ok(Expr::Number(value, span))
        }

        Rule::string => Ok(Expr::Str(unescape_string(pair.as_str()), span)),

        Rule::boolean => {
            let value = matches!(pair.as_str(), "true" | "True");
            Ok(Expr::Bool(value, span))
        }

        Rule::none => Ok(Expr::None(span)),

        Rule::ident => Ok(Expr::Name(pair.as_str().to_string(), span)),

        Rule::paren => {
            let items: Result<Vec<Expr>, NbError> = pair
                .into_inner()
                .map(|p| build_expr(p, context))
                .collect();
            let mut items = items?;
            if items.len() == 1 {
                Ok(items.remove(0))
            } else {
                Ok(Expr::Tuple(items, span))
            }
        }

        Rule::list_lit => {
            let items: Result<Vec<Expr>, NbError> = pair
                .into_inner()
                .map(|p| build_expr(p, context))
                .collect();
            Ok(Expr::List(items?, span))
        }

        other => Err(report_with_source(
            context,
            ErrorKind::MalformedConstruct {
                construct: format!("{:?}", other),
            },
            to_miette(span),
        )),
    }
}

fn build_binary_chain(pair: Pair<Rule>, context: &SourceContext) -> Result<Expr, NbError> {
    let pair_span = span_of(&pair);
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap(); // grammar guarantees at least one operand
    let mut node = build_expr(first, context)?;

    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            other => {
                return Err(report_with_source(
                    context,
                    ErrorKind::MalformedConstruct {
                        construct: format!("operator '{}'", other),
                    },
                    to_miette(pair_span),
                ))
            }
        };
        let rhs_pair = inner.next().ok_or_else(|| {
            malformed(context, "binary expression", pair_span)
        })?;
        let rhs = build_expr(rhs_pair, context)?;
        let span = node.span().merge(rhs.span());
        node = Expr::Binary {
            op,
            lhs: Box::new(node),
            rhs: Box::new(rhs),
            span,
        };
    }
    Ok(node)
}

fn build_postfix_chain(pair: Pair<Rule>, context: &SourceContext) -> Result<Expr, NbError> {
    let mut inner = pair.into_inner();
    let mut node = build_expr(inner.next().unwrap(), context)?; // grammar guarantees a primary

    for op_wrapper in inner {
        let op_span = span_of(&op_wrapper);
        let span = node.span().merge(op_span);
        let op = op_wrapper.into_inner().next().unwrap(); // postfix_op wraps one op

        match op.as_rule() {
            Rule::attr_op => {
                let name = op.into_inner().next().unwrap().as_str().to_string();
                node = Expr::Attr {
                    object: Box::new(node),
                    name,
                    span,
                };
            }
            Rule::index_op => {
                let index = build_expr(op.into_inner().next().unwrap(), context)?;
                node = Expr::Index {
                    object: Box::new(node),
                    index: Box::new(index),
                    span,
                };
            }
            Rule::call_op => {
                let (args, kwargs) = build_call_args(op, context)?;
                node = Expr::Call {
                    callee: Box::new(node),
                    args,
                    kwargs,
                    span,
                };
            }
            other => {
                return Err(report_with_source(
                    context,
                    ErrorKind::MalformedConstruct {
                        construct: format!("{:?}", other),
                    },
                    to_miette(op_span),
                ))
            }
        }
    }
    Ok(node)
}

type CallArgs = (Vec<Expr>, Vec<(String, Expr)>);

fn build_call_args(call_op: Pair<Rule>, context: &SourceContext) -> Result<CallArgs, NbError> {
    let mut args = Vec::new();
    let mut kwargs: Vec<(String, Expr)> = Vec::new();

    let Some(arg_list) = call_op.into_inner().next() else {
        return Ok((args, kwargs));
    };
    for arg in arg_list.into_inner() {
        let arg_span = span_of(&arg);
        let inner = arg.into_inner().next().unwrap(); // arg wraps kwarg or expr
        match inner.as_rule() {
            Rule::kwarg => {
                let mut parts = inner.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                let value = build_expr(parts.next().unwrap(), context)?;
                kwargs.push((name, value));
            }
            _ => {
                if !kwargs.is_empty() {
                    return Err(malformed(
                        context,
                        "positional argument after keyword argument",
                        arg_span,
                    ));
                }
                args.push(build_expr(inner, context)?);
            }
        }
    }
    Ok((args, kwargs))
}

// ============================================================================
// HELPERS
// ============================================================================

fn span_of(pair: &Pair<Rule>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn to_miette(span: Span) -> SourceSpan {
    crate::errors::to_source_span(span)
}

fn malformed(context: &SourceContext, construct: &str, span: Span) -> NbError {
    report_with_source(
        context,
        ErrorKind::MalformedConstruct {
            construct: construct.into(),
        },
        to_miette(span),
    )
}

/// Strip the surrounding quotes and process the conventional escapes; an
/// unknown escape keeps the escaped character as-is.
fn unescape_string(raw: &str) -> String {
    let body = &raw[1..raw.len() - 1];
    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

fn convert_parse_error(err: pest::error::Error<Rule>, context: &SourceContext) -> NbError {
    let (start, end) = match err.location {
        InputLocation::Pos(p) => (p, p),
        InputLocation::Span((s, e)) => (s, e),
    };
    let found = if start >= context.content.len() {
        "end of input".to_string()
    } else {
        let token: String = context.content[start..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(12)
            .collect();
        if token.is_empty() {
            "end of line".to_string()
        } else {
            format!("'{}'", token)
        }
    };
    let expected = match &err.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let mut names: Vec<&str> = positives.iter().map(|r| rule_name(*r)).collect();
            names.sort_unstable();
            names.dedup();
            names.join(" or ")
        }
        ErrorVariant::CustomError { message } => message.clone(),
        _ => "a statement".to_string(),
    };
    report_with_source(
        context,
        ErrorKind::UnexpectedToken { expected, found },
        SourceSpan::new(start.into(), end.saturating_sub(start)),
    )
}

fn rule_name(rule: Rule) -> &'static str {
    match rule {
        Rule::program | Rule::stmt | Rule::expr_stmt => "a statement",
        Rule::func_def => "a function definition",
        Rule::import_stmt => "an import",
        Rule::assign_stmt | Rule::target_list => "an assignment",
        Rule::expr | Rule::sum | Rule::product | Rule::unary | Rule::postfix | Rule::primary => {
            "an expression"
        }
        Rule::add_op | Rule::mul_op | Rule::minus => "an operator",
        Rule::postfix_op | Rule::call_op | Rule::arg_list | Rule::arg | Rule::kwarg => {
            "a call argument"
        }
        Rule::index_op => "an index",
        Rule::attr_op => "an attribute",
        Rule::literal | Rule::number | Rule::string | Rule::boolean | Rule::none => "a literal",
        Rule::list_lit => "a list",
        Rule::paren => "a parenthesized expression",
        Rule::ident | Rule::dotted_name | Rule::param_list => "a name",
        Rule::kw_def | Rule::kw_import | Rule::kw_as | Rule::keyword => "a keyword",
        Rule::EOI => "end of input",
        _ => "valid cell source",
    }
}
