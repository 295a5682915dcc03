//! Runtime module for the embedded cell language.
//!
//! Provides the value model cells compute with, the variable scopes they bind
//! into, and the [`CellEngine`] seam the loader drives. The built-in
//! [`Interpreter`] is the canonical engine; callers may supply their own.

use std::fmt;
use std::rc::Rc;

use crate::ast::Expr;
use crate::errors::{NbError, SourceContext};
use crate::plotmock::MockHandle;
use crate::syntax::parser;

pub mod eval;
pub mod scope;

pub use eval::{execute_statements, ExecContext};
pub use scope::{GlobalNamespace, VariableScope};

// ============================================================================
// VALUES
// ============================================================================

/// Canonical runtime value for cell evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value.
    Nil,
    /// Numeric value (floating point).
    Number(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// User-defined function. Free names resolve at call time against the
    /// live scope, so a function defined in an early cell observes later
    /// mutations of the names it references.
    Function(Rc<FunctionDef>),
    /// Recording stand-in installed by the plotting mock.
    Mock(MockHandle),
}

/// A one-line function definition: parameter names plus a single body
/// expression, along with the source it was defined in (for diagnostics when
/// the body faults in a later cell).
#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    pub source: SourceContext,
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Mock(a), Value::Mock(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "none",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Function(_) => "function",
            Value::Mock(_) => "mock",
        }
    }

    /// Literal-style rendering, used when printing recorded calls and when
    /// echoing bindings. Whole numbers print without a fractional part.
    pub fn repr(&self) -> String {
        match self {
            Value::Nil => "none".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("({})", inner.join(", "))
            }
            Value::Function(def) => format!("<function {}>", def.name),
            Value::Mock(handle) => handle.qualified_name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ============================================================================
// EXECUTION ENGINE SEAM
// ============================================================================

/// Abstract capability to execute one block of cell source against a scope.
///
/// The loader drives whichever engine it was built with; the built-in
/// [`Interpreter`] is the default. Supplying a different engine is how the
/// delegate-execution option is expressed.
pub trait CellEngine {
    fn execute(&mut self, source: &str, ctx: &mut ExecContext<'_>) -> Result<(), NbError>;
}

/// The built-in engine: parse the block, then run its statements in order,
/// writing bindings into the context's variable scope.
#[derive(Debug, Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

impl CellEngine for Interpreter {
    fn execute(&mut self, source: &str, ctx: &mut ExecContext<'_>) -> Result<(), NbError> {
        let statements = parser::parse(source, &ctx.source)?;
        execute_statements(&statements, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_repr_drops_integral_fraction() {
        assert_eq!(Value::Number(2.0).repr(), "2");
        assert_eq!(Value::Number(2.5).repr(), "2.5");
    }

    #[test]
    fn string_repr_quotes_and_escapes() {
        assert_eq!(Value::Str("it's".into()).repr(), r"'it\'s'");
    }

    #[test]
    fn tuple_and_list_repr() {
        let v = Value::Tuple(vec![Value::Number(1.0), Value::Str("x".into())]);
        assert_eq!(v.repr(), "(1, 'x')");
        let v = Value::List(vec![Value::Bool(true), Value::Nil]);
        assert_eq!(v.repr(), "[true, none]");
    }
}
