//! The cell executor: runs parsed statements against a variable scope.
//!
//! Name resolution order is call-frame locals, then the caller's variable
//! scope, then the shared global namespace. Assignments always land in the
//! variable scope; function definitions and imports are additionally mirrored
//! into the global namespace so later cells (and nested loads) can reach them.

use std::collections::HashMap;
use std::rc::Rc;

use miette::SourceSpan;

use crate::ast::{BinOp, Expr, Span, Stmt};
use crate::errors::{
    report_with_source, to_source_span, ErrorKind, ErrorReporting, NbError, SourceContext,
};

use super::scope::{GlobalNamespace, VariableScope};
use super::{FunctionDef, Value};

/// Recursion limit for user-function calls.
pub const DEFAULT_MAX_DEPTH: usize = 64;

// ============================================================================
// EXECUTION CONTEXT
// ============================================================================

/// State for one block execution, passed to every evaluation function.
pub struct ExecContext<'a> {
    pub variables: &'a mut VariableScope,
    pub globals: &'a mut GlobalNamespace,
    /// Name and text of the block currently executing; errors attach to it.
    pub source: SourceContext,
    pub depth: usize,
    pub max_depth: usize,
    frames: Vec<HashMap<String, Value>>,
}

impl<'a> ExecContext<'a> {
    pub fn new(
        variables: &'a mut VariableScope,
        globals: &'a mut GlobalNamespace,
        source: SourceContext,
    ) -> Self {
        Self {
            variables,
            globals,
            source,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            frames: Vec::new(),
        }
    }

    /// Resolve a name: innermost call frame first, then the variable scope,
    /// then the global namespace.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.get(name) {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        self.globals.get(name).cloned()
    }
}

impl ErrorReporting for ExecContext<'_> {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> NbError {
        report_with_source(&self.source, kind, span)
    }
}

// ============================================================================
// STATEMENT EXECUTION
// ============================================================================

/// Run a block of statements in order. Mutates the context's scopes in place;
/// never produces a value.
pub fn execute_statements(statements: &[Stmt], ctx: &mut ExecContext<'_>) -> Result<(), NbError> {
    for statement in statements {
        exec_stmt(statement, ctx)?;
    }
    Ok(())
}

fn exec_stmt(statement: &Stmt, ctx: &mut ExecContext<'_>) -> Result<(), NbError> {
    match statement {
        Stmt::Assign {
            targets,
            value,
            span,
        } => {
            let value = eval_expr(value, ctx)?;
            assign_targets(targets, value, *span, ctx)
        }
        Stmt::Expr { value, .. } => {
            eval_expr(value, ctx)?;
            Ok(())
        }
        Stmt::Import {
            module,
            alias,
            span,
        } => {
            let value = match ctx.globals.module(module) {
                Some(value) => value.clone(),
                None => {
                    return Err(ctx.report(
                        ErrorKind::UndefinedModule {
                            module: module.clone(),
                        },
                        to_source_span(*span),
                    ))
                }
            };
            let name = alias
                .clone()
                .unwrap_or_else(|| module.rsplit('.').next().unwrap_or(module).to_string());
            ctx.variables.set(name.clone(), value.clone());
            ctx.globals.set(name, value);
            Ok(())
        }
        Stmt::FuncDef {
            name,
            params,
            body,
            ..
        } => {
            let def = Value::Function(Rc::new(FunctionDef {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                source: ctx.source.clone(),
            }));
            ctx.variables.set(name.clone(), def.clone());
            ctx.globals.set(name.clone(), def);
            Ok(())
        }
    }
}

fn assign_targets(
    targets: &[String],
    value: Value,
    span: Span,
    ctx: &mut ExecContext<'_>,
) -> Result<(), NbError> {
    if targets.len() == 1 {
        ctx.variables.set(targets[0].clone(), value);
        return Ok(());
    }
    let items = match value {
        Value::Tuple(items) | Value::List(items) => items,
        other => {
            return Err(ctx.type_mismatch(
                "tuple or list",
                other.type_name(),
                to_source_span(span),
            ))
        }
    };
    if items.len() != targets.len() {
        return Err(ctx.report(
            ErrorKind::DestructureMismatch {
                targets: targets.len(),
                values: items.len(),
            },
            to_source_span(span),
        ));
    }
    for (target, item) in targets.iter().zip(items) {
        ctx.variables.set(target.clone(), item);
    }
    Ok(())
}

// ============================================================================
// EXPRESSION EVALUATION
// ============================================================================

pub fn eval_expr(expr: &Expr, ctx: &mut ExecContext<'_>) -> Result<Value, NbError> {
    match expr {
        Expr::Number(n, _) => Ok(Value::Number(*n)),
        Expr::Str(s, _) => Ok(Value::Str(s.clone())),
        Expr::Bool(b, _) => Ok(Value::Bool(*b)),
        Expr::None(_) => Ok(Value::Nil),
        Expr::List(items, _) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, ctx)?);
            }
            Ok(Value::List(values))
        }
        Expr::Tuple(items, _) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, ctx)?);
            }
            Ok(Value::Tuple(values))
        }
        Expr::Name(name, span) => ctx
            .lookup(name)
            .ok_or_else(|| ctx.undefined_symbol(name, to_source_span(*span))),
        Expr::Attr { object, name, span } => {
            let object = eval_expr(object, ctx)?;
            match object {
                Value::Mock(handle) => Ok(Value::Mock(handle.attr(name))),
                other => Err(ctx.invalid_operation(
                    "attribute access",
                    other.type_name(),
                    to_source_span(*span),
                )),
            }
        }
        Expr::Index {
            object,
            index,
            span,
        } => {
            let object = eval_expr(object, ctx)?;
            let index = eval_expr(index, ctx)?;
            eval_index(object, index, *span, ctx)
        }
        Expr::Call {
            callee,
            args,
            kwargs,
            span,
        } => {
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                arg_values.push(eval_expr(arg, ctx)?);
            }
            let mut kwarg_values = Vec::with_capacity(kwargs.len());
            for (name, value) in kwargs {
                kwarg_values.push((name.clone(), eval_expr(value, ctx)?));
            }
            eval_call(callee, arg_values, kwarg_values, *span, ctx)
        }
        Expr::Binary { op, lhs, rhs, span } => {
            let lhs = eval_expr(lhs, ctx)?;
            let rhs = eval_expr(rhs, ctx)?;
            eval_binary(*op, lhs, rhs, *span, ctx)
        }
        Expr::Neg(inner, span) => match eval_expr(inner, ctx)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(ctx.invalid_operation(
                "unary minus",
                other.type_name(),
                to_source_span(*span),
            )),
        },
    }
}

fn eval_index(
    object: Value,
    index: Value,
    span: Span,
    ctx: &mut ExecContext<'_>,
) -> Result<Value, NbError> {
    let items = match &object {
        Value::List(items) | Value::Tuple(items) => items,
        other => {
            return Err(ctx.invalid_operation("index", other.type_name(), to_source_span(span)))
        }
    };
    let position = match index {
        Value::Number(n) if n.fract() == 0.0 && n >= 0.0 => n as usize,
        other => {
            return Err(ctx.type_mismatch("integer index", other.type_name(), to_source_span(span)))
        }
    };
    match items.get(position) {
        Some(value) => Ok(value.clone()),
        None => Err(ctx.invalid_operation(
            "index out of range",
            object.type_name(),
            to_source_span(span),
        )),
    }
}

fn eval_call(
    callee: &Expr,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    span: Span,
    ctx: &mut ExecContext<'_>,
) -> Result<Value, NbError> {
    // Method-style calls on mocks record against the owning stand-in without
    // materializing a bound-method value first.
    if let Expr::Attr { object, name, .. } = callee {
        let object = eval_expr(object, ctx)?;
        return match object {
            Value::Mock(handle) => call_mock(handle.attr(name), args, kwargs, span, ctx),
            other => Err(ctx.invalid_operation(
                "method call",
                other.type_name(),
                to_source_span(span),
            )),
        };
    }
    let callee_value = eval_expr(callee, ctx)?;
    match callee_value {
        Value::Function(def) => call_function(def, args, kwargs, span, ctx),
        Value::Mock(handle) => call_mock(handle, args, kwargs, span, ctx),
        other => Err(ctx.invalid_operation("call", other.type_name(), to_source_span(span))),
    }
}

fn call_mock(
    handle: crate::plotmock::MockHandle,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    span: Span,
    ctx: &mut ExecContext<'_>,
) -> Result<Value, NbError> {
    handle
        .call(args, kwargs)
        .map_err(|e| ctx.type_mismatch("integer subplot count", &e.value, to_source_span(span)))
}

fn call_function(
    def: Rc<FunctionDef>,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    span: Span,
    ctx: &mut ExecContext<'_>,
) -> Result<Value, NbError> {
    if ctx.depth >= ctx.max_depth {
        return Err(ctx.report(ErrorKind::RecursionLimit, to_source_span(span)));
    }
    let supplied = args.len() + kwargs.len();
    if args.len() > def.params.len() {
        return Err(ctx.arity_mismatch(
            &def.name,
            &format!("exactly {}", def.params.len()),
            supplied,
            to_source_span(span),
        ));
    }
    let mut frame: HashMap<String, Value> = def
        .params
        .iter()
        .cloned()
        .zip(args)
        .collect();
    for (name, value) in kwargs {
        if !def.params.contains(&name) || frame.contains_key(&name) {
            return Err(ctx.arity_mismatch(
                &def.name,
                &format!("exactly {}", def.params.len()),
                supplied,
                to_source_span(span),
            ));
        }
        frame.insert(name, value);
    }
    if frame.len() != def.params.len() {
        return Err(ctx.arity_mismatch(
            &def.name,
            &format!("exactly {}", def.params.len()),
            supplied,
            to_source_span(span),
        ));
    }
    // The body's spans point into the defining cell, so swap the reported
    // source for the duration of the call.
    let caller_source = std::mem::replace(&mut ctx.source, def.source.clone());
    ctx.frames.push(frame);
    ctx.depth += 1;
    let result = eval_expr(&def.body, ctx);
    ctx.depth -= 1;
    ctx.frames.pop();
    ctx.source = caller_source;
    result
}

fn eval_binary(
    op: BinOp,
    lhs: Value,
    rhs: Value,
    span: Span,
    ctx: &mut ExecContext<'_>,
) -> Result<Value, NbError> {
    match (op, lhs, rhs) {
        (_, Value::Number(a), Value::Number(b)) => match op {
            BinOp::Add => Ok(Value::Number(a + b)),
            BinOp::Sub => Ok(Value::Number(a - b)),
            BinOp::Mul => Ok(Value::Number(a * b)),
            BinOp::Div => {
                if b == 0.0 {
                    Err(ctx.invalid_operation("division by zero", "number", to_source_span(span)))
                } else {
                    Ok(Value::Number(a / b))
                }
            }
        },
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (BinOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (op, lhs, rhs) => Err(ctx.type_mismatch(
            "matching operand types",
            &format!("{} {} {}", lhs.type_name(), op.symbol(), rhs.type_name()),
            to_source_span(span),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CellEngine, Interpreter};

    fn run(source: &str, variables: &mut VariableScope) -> Result<(), NbError> {
        let mut globals = GlobalNamespace::new();
        run_with(source, variables, &mut globals)
    }

    fn run_with(
        source: &str,
        variables: &mut VariableScope,
        globals: &mut GlobalNamespace,
    ) -> Result<(), NbError> {
        let mut ctx = ExecContext::new(variables, globals, SourceContext::new("<test>", source));
        Interpreter::new().execute(source, &mut ctx)
    }

    #[test]
    fn assigns_and_concatenates() {
        let mut vars = VariableScope::new();
        run("a = \"test\"\nb = a + \"2\"", &mut vars).unwrap();
        assert_eq!(vars.get("a"), Some(&Value::Str("test".into())));
        assert_eq!(vars.get("b"), Some(&Value::Str("test2".into())));
    }

    #[test]
    fn arithmetic_precedence() {
        let mut vars = VariableScope::new();
        run("x = 2 + 3 * 4\ny = (2 + 3) * 4", &mut vars).unwrap();
        assert_eq!(vars.get("x"), Some(&Value::Number(14.0)));
        assert_eq!(vars.get("y"), Some(&Value::Number(20.0)));
    }

    #[test]
    fn tuple_destructuring() {
        let mut vars = VariableScope::new();
        run("a, b = (1, 2)", &mut vars).unwrap();
        assert_eq!(vars.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(vars.get("b"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn destructure_arity_is_checked() {
        let mut vars = VariableScope::new();
        let err = run("a, b, c = (1, 2)", &mut vars).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::DestructureMismatch {
                targets: 3,
                values: 2
            }
        ));
    }

    #[test]
    fn function_observes_later_mutation() {
        let mut vars = VariableScope::new();
        let mut globals = GlobalNamespace::new();
        run_with("x = 1", &mut vars, &mut globals).unwrap();
        run_with("def probe(): x", &mut vars, &mut globals).unwrap();
        run_with("x = 2", &mut vars, &mut globals).unwrap();
        run_with("y = probe()", &mut vars, &mut globals).unwrap();
        assert_eq!(vars.get("y"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn function_params_shadow_scope() {
        let mut vars = VariableScope::new();
        run(
            "x = 10\ndef double(x): x * 2\ny = double(3)",
            &mut vars,
        )
        .unwrap();
        assert_eq!(vars.get("y"), Some(&Value::Number(6.0)));
        assert_eq!(vars.get("x"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn undefined_symbol_reports() {
        let mut vars = VariableScope::new();
        let err = run("a = missing + 1", &mut vars).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UndefinedSymbol { .. }));
        assert!(vars.is_empty());
    }

    #[test]
    fn recursion_is_bounded() {
        let mut vars = VariableScope::new();
        let err = run("def loop(): loop()\nloop()", &mut vars).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RecursionLimit));
    }

    #[test]
    fn unknown_import_faults() {
        let mut vars = VariableScope::new();
        let err = run("import numpy as np", &mut vars).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UndefinedModule { .. }));
    }

    #[test]
    fn list_indexing() {
        let mut vars = VariableScope::new();
        run("xs = [10, 20, 30]\nmid = xs[1]", &mut vars).unwrap();
        assert_eq!(vars.get("mid"), Some(&Value::Number(20.0)));
    }
}
