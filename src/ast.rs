//! AST for the embedded cell language.
//!
//! Cells are parsed into a small statement/expression tree with source location
//! tracking. Spans are byte offsets into the cell source and feed directly into
//! diagnostic rendering.

use serde::{Deserialize, Serialize};

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// Represents a span in the cell source.
///
/// All AST nodes carry a span for source tracking; enables better errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both operands.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One statement of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `a = expr` or `a, b = expr` (tuple destructuring).
    Assign {
        targets: Vec<String>,
        value: Expr,
        span: Span,
    },
    /// A bare expression evaluated for its side effects (typically a call).
    Expr { value: Expr, span: Span },
    /// `import dotted.path` / `import dotted.path as name`.
    Import {
        module: String,
        alias: Option<String>,
        span: Span,
    },
    /// One-line function definition: `def name(a, b): expr`.
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::Import { span, .. }
            | Stmt::FuncDef { span, .. } => *span,
        }
    }
}

/// The core expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    Str(String, Span),
    Bool(bool, Span),
    None(Span),
    List(Vec<Expr>, Span),
    Tuple(Vec<Expr>, Span),
    Name(String, Span),
    /// `object.name`
    Attr {
        object: Box<Expr>,
        name: String,
        span: Span,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// `callee(arg, .., key=value, ..)`; keywords always trail positionals.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Neg(Box<Expr>, Span),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

// ============================================================================
// PUBLIC API IMPLEMENTATION
// ============================================================================

impl Expr {
    /// Returns the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, span)
            | Expr::Str(_, span)
            | Expr::Bool(_, span)
            | Expr::None(span)
            | Expr::List(_, span)
            | Expr::Tuple(_, span)
            | Expr::Name(_, span)
            | Expr::Neg(_, span) => *span,
            Expr::Attr { span, .. }
            | Expr::Index { span, .. }
            | Expr::Call { span, .. }
            | Expr::Binary { span, .. } => *span,
        }
    }
}
