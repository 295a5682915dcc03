//! Expectation matching for recorded plotting calls.
//!
//! Expectation text is one call per line, `qualifier.method(args)`, parsed
//! with the crate's own expression parser. Matching merges extra recorded
//! positional arguments into keywords (zipped against the expected keyword
//! names in order) and discards recorded keywords the expectation did not
//! ask about. The matcher never raises: load faults propagate from the
//! loading path, everything else is reported through the sink and the
//! returned outcome.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;

use crate::ast::{Expr, Stmt};
use crate::errors::{report_with_source, to_source_span, ErrorKind, NbError, SourceContext};
use crate::loader::Loader;
use crate::output::{OutputSink, StderrSink, StdoutSink};
use crate::runtime::{GlobalNamespace, Value, VariableScope};
use crate::syntax::parser;

use super::{CallLog, RecordedCall};

// ============================================================================
// OUTCOME AND RE-ENTRANCY GUARD
// ============================================================================

/// Result of one matching run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Every expectation line found a matching recorded call.
    Satisfied,
    /// An expectation went unmatched, failed to parse, or no expectation
    /// text was given (discovery mode).
    NotSatisfied,
    /// A matching run was already in progress; nothing was done.
    NotPerformed,
}

impl MatchOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, MatchOutcome::Satisfied)
    }
}

static IN_MATPLOTLIB_TEST: AtomicBool = AtomicBool::new(false);

/// Scoped hold on the process-wide re-entrancy flag. Released on every exit
/// path, faulting ones included.
struct TestGuard;

impl TestGuard {
    fn acquire() -> Option<TestGuard> {
        if IN_MATPLOTLIB_TEST.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(TestGuard)
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        IN_MATPLOTLIB_TEST.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// PUBLIC ENTRY POINTS
// ============================================================================

/// Run `target` (a `.ipynb` path, or an inline source snippet) with plotting
/// calls intercepted, then match the recorded calls against `expected`.
///
/// With no expectation text, prints every distinct observed call once to
/// stdout (discovery mode) and reports [`MatchOutcome::NotSatisfied`].
/// Mismatch and parse-error diagnostics go to stderr. `conv` pairs rewrite
/// the reported expectation text, token for token.
pub fn matplotlib_test(
    target: &str,
    expected: Option<&str>,
    conv: Option<&[(String, String)]>,
) -> Result<MatchOutcome, NbError> {
    match expected {
        Some(text) => {
            let mut sink = StderrSink;
            matplotlib_test_with(target, Some(text), conv, &mut sink)
        }
        None => {
            let mut sink = StdoutSink;
            matplotlib_test_with(target, None, conv, &mut sink)
        }
    }
}

/// [`matplotlib_test`] with an explicit diagnostic sink.
pub fn matplotlib_test_with(
    target: &str,
    expected: Option<&str>,
    conv: Option<&[(String, String)]>,
    sink: &mut dyn OutputSink,
) -> Result<MatchOutcome, NbError> {
    let _guard = match TestGuard::acquire() {
        Some(guard) => guard,
        None => return Ok(MatchOutcome::NotPerformed),
    };

    let log = CallLog::new();
    let plt = log.mock("plt");
    let mut variables = VariableScope::new();
    let mut globals = GlobalNamespace::new();
    globals.set("plt", Value::Mock(plt.clone()));
    globals.register_module("matplotlib.pyplot", Value::Mock(plt));

    let mut loader = Loader::new();
    if target.ends_with(".ipynb") {
        loader.load_seeded(&mut variables, &mut globals, Path::new(target))?;
    } else {
        loader.run_source_seeded(target, &mut variables, &mut globals, Path::new("."))?;
    }

    let calls = log.calls();
    let Some(expected) = expected else {
        let mut seen: Vec<String> = Vec::new();
        for call in &calls {
            let rendered = call.render();
            if !seen.contains(&rendered) {
                sink.emit(&rendered);
                seen.push(rendered);
            }
        }
        return Ok(MatchOutcome::NotSatisfied);
    };

    for line in expected.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let display = apply_conversions(line, conv);
        let expectation = match parse_expectation(line) {
            Ok(expectation) => expectation,
            Err(_) => {
                sink.emit(&format!("Error: no function call ({})", display));
                return Ok(MatchOutcome::NotSatisfied);
            }
        };
        if !calls.iter().any(|call| call_matches(call, &expectation)) {
            sink.emit(&format!("Expected call not found: {}", display));
            return Ok(MatchOutcome::NotSatisfied);
        }
    }
    Ok(MatchOutcome::Satisfied)
}

// ============================================================================
// EXPECTATION PARSING
// ============================================================================

/// One parsed expectation line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedCall {
    pub qualified: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

pub(crate) fn parse_expectation(line: &str) -> Result<ExpectedCall, NbError> {
    let context = SourceContext::new("<expectation>", line);
    let not_a_call = || {
        report_with_source(
            &context,
            ErrorKind::ExpectationNotACall { line: line.into() },
            to_source_span(crate::ast::Span::new(0, line.len())),
        )
    };

    let mut statements = parser::parse(line, &context)?;
    if statements.len() != 1 {
        return Err(not_a_call());
    }
    let Stmt::Expr {
        value:
            Expr::Call {
                callee,
                args,
                kwargs,
                ..
            },
        ..
    } = statements.remove(0)
    else {
        return Err(not_a_call());
    };

    let qualified = match callee.as_ref() {
        Expr::Attr { object, name, .. } => {
            let owner = render_qualifier(object).ok_or_else(not_a_call)?;
            format!("{}.{}", owner, name)
        }
        Expr::Name(name, _) => name.clone(),
        _ => return Err(not_a_call()),
    };

    let mut literal_args = Vec::with_capacity(args.len());
    for arg in &args {
        literal_args.push(literal_value(arg).ok_or_else(not_a_call)?);
    }
    let mut literal_kwargs = Vec::with_capacity(kwargs.len());
    for (name, value) in &kwargs {
        literal_kwargs.push((name.clone(), literal_value(value).ok_or_else(not_a_call)?));
    }
    Ok(ExpectedCall {
        qualified,
        args: literal_args,
        kwargs: literal_kwargs,
    })
}

/// Render the owner part of an expectation (`plt`, `axes[0]`, `axes[0, 1]`).
/// Successive indexes collapse into one bracket group so an expectation like
/// `axes[0][1]` matches the stand-in named `axes[0, 1]`.
fn render_qualifier(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(name, _) => Some(name.clone()),
        Expr::Attr { object, name, .. } => {
            Some(format!("{}.{}", render_qualifier(object)?, name))
        }
        Expr::Index { object, index, .. } => {
            let rendered_index = literal_value(index)?.repr();
            let base = render_qualifier(object)?;
            if matches!(object.as_ref(), Expr::Index { .. }) {
                let trimmed = &base[..base.len() - 1];
                Some(format!("{}, {}]", trimmed, rendered_index))
            } else {
                Some(format!("{}[{}]", base, rendered_index))
            }
        }
        _ => None,
    }
}

/// Evaluate an expectation argument; only literals are allowed.
fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Number(n, _) => Some(Value::Number(*n)),
        Expr::Str(s, _) => Some(Value::Str(s.clone())),
        Expr::Bool(b, _) => Some(Value::Bool(*b)),
        Expr::None(_) => Some(Value::Nil),
        Expr::Neg(inner, _) => match literal_value(inner)? {
            Value::Number(n) => Some(Value::Number(-n)),
            _ => None,
        },
        Expr::List(items, _) => items
            .iter()
            .map(literal_value)
            .collect::<Option<Vec<Value>>>()
            .map(Value::List),
        Expr::Tuple(items, _) => items
            .iter()
            .map(literal_value)
            .collect::<Option<Vec<Value>>>()
            .map(Value::Tuple),
        _ => None,
    }
}

// ============================================================================
// CALL MATCHING
// ============================================================================

/// Decide whether one recorded call satisfies one expectation.
pub(crate) fn call_matches(recorded: &RecordedCall, expected: &ExpectedCall) -> bool {
    if recorded.qualified() != expected.qualified {
        return false;
    }
    if recorded.args.len() < expected.args.len() {
        return false;
    }

    let mut args = recorded.args.clone();
    let mut kwargs = recorded.kwargs.clone();

    // Extra recorded positionals pair up with the expected keyword names, in
    // order, and override any recorded keyword of the same name.
    let extras = args.split_off(expected.args.len());
    for ((name, _), value) in expected.kwargs.iter().zip(extras) {
        match kwargs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => kwargs.push((name.clone(), value)),
        }
    }

    // Keywords the expectation did not ask about are discarded.
    kwargs.retain(|(name, _)| expected.kwargs.iter().any(|(k, _)| k == name));

    if args != expected.args {
        return false;
    }
    if kwargs.len() != expected.kwargs.len() {
        return false;
    }
    expected
        .kwargs
        .iter()
        .all(|(name, value)| kwargs.iter().any(|(k, v)| k == name && v == value))
}

// ============================================================================
// CONVERSION TOKENS
// ============================================================================

/// Apply caller-supplied search/replace token pairs to the reported
/// expectation text.
fn apply_conversions(line: &str, conv: Option<&[(String, String)]>) -> String {
    let Some(pairs) = conv.filter(|p| !p.is_empty()) else {
        return line.to_string();
    };
    let pattern = pairs
        .iter()
        .map(|(from, _)| regex::escape(from))
        .collect::<Vec<String>>()
        .join("|");
    let Ok(re) = Regex::new(&format!("({})", pattern)) else {
        return line.to_string();
    };
    re.replace_all(line, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        pairs
            .iter()
            .find(|(from, _)| from == token)
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| token.to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(line: &str) -> ExpectedCall {
        parse_expectation(line).unwrap()
    }

    fn recorded(
        owner: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Vec<(&str, Value)>,
    ) -> RecordedCall {
        RecordedCall {
            owner: owner.into(),
            method: method.into(),
            args,
            kwargs: kwargs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn exact_positional_match() {
        let call = recorded(
            "plt",
            "plot",
            vec![Value::Number(1.0), Value::Number(2.0)],
            vec![],
        );
        assert!(call_matches(&call, &expected("plt.plot(1, 2)")));
        assert!(!call_matches(&call, &expected("plt.plot(1, 3)")));
        assert!(!call_matches(&call, &expected("plt.plot(1, 2, 3)")));
    }

    #[test]
    fn extra_positionals_merge_into_expected_keywords() {
        // recorded plot(1, 2, 'r') against expectation plot(1, 2, fmt='r')
        let call = recorded(
            "plt",
            "plot",
            vec![Value::Number(1.0), Value::Number(2.0), Value::Str("r".into())],
            vec![],
        );
        assert!(call_matches(&call, &expected("plt.plot(1, 2, fmt='r')")));
    }

    #[test]
    fn unrequested_keywords_are_discarded() {
        let call = recorded(
            "ax",
            "set_title",
            vec![Value::Str("hello".into())],
            vec![("fontsize", Value::Number(12.0))],
        );
        assert!(call_matches(&call, &expected("ax.set_title('hello')")));
        assert!(call_matches(
            &call,
            &expected("ax.set_title('hello', fontsize=12)")
        ));
        assert!(!call_matches(
            &call,
            &expected("ax.set_title('hello', fontsize=14)")
        ));
    }

    #[test]
    fn expected_keyword_missing_from_recording_fails() {
        let call = recorded("ax", "plot", vec![Value::Number(1.0)], vec![]);
        assert!(!call_matches(&call, &expected("ax.plot(1, color='red')")));
    }

    #[test]
    fn indexed_qualifiers_render_like_stand_in_names() {
        assert_eq!(expected("axes[0].plot(1)").qualified, "axes[0].plot");
        assert_eq!(
            expected("axes[0][1].plot(1)").qualified,
            "axes[0, 1].plot"
        );
    }

    #[test]
    fn non_call_lines_are_rejected() {
        assert!(parse_expectation("just words").is_err());
        assert!(parse_expectation("a = plt.plot(1)").is_err());
        assert!(parse_expectation("plt.plot(undefined_name)").is_err());
    }

    #[test]
    fn nested_runs_are_not_performed() {
        let _held = TestGuard::acquire().unwrap();
        let mut sink = crate::output::OutputBuffer::new();
        let outcome = matplotlib_test_with("x = 1", None, None, &mut sink).unwrap();
        assert_eq!(outcome, MatchOutcome::NotPerformed);
        assert_eq!(sink.as_str(), "");
    }

    #[test]
    fn conversion_tokens_rewrite_reported_text() {
        let conv = vec![("<DF>".to_string(), "df".to_string())];
        assert_eq!(
            apply_conversions("plt.plot(<DF>)", Some(&conv)),
            "plt.plot(df)"
        );
        assert_eq!(apply_conversions("plt.plot(1)", None), "plt.plot(1)");
    }
}
