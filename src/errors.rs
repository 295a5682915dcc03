//! Unified error handling for the notebook test harness.
//!
//! Every fault produced while reading a document, parsing cell source, or
//! evaluating a cell is represented by the single [`NbError`] type, rendered
//! through `miette` with the offending source attached.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};

use crate::ast::Span;
use crate::notebook::DocumentError;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source context for error reporting: the name and full text of whatever is
/// currently being parsed or executed (a notebook cell, a snippet, an
/// expectation line).
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real content. Preferred.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("# {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting.
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("no source available")
    }
}

/// Convert an AST span into a miette source span.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::new(span.start.into(), span.end.saturating_sub(span.start))
}

// ============================================================================
// THE ERROR TYPE
// ============================================================================

/// The single error type: what went wrong, where, and how to help.
#[derive(Debug)]
pub struct NbError {
    /// What went wrong (type-specific data).
    pub kind: ErrorKind,
    /// Where it happened.
    pub source_info: SourceInfo,
    /// How to help.
    pub diagnostic_info: DiagnosticInfo,
}

/// All error kinds as a clean enum.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Document errors - the notebook file itself is unusable
    Document {
        message: String,
    },

    // Parse errors - cell source that does not scan
    UnexpectedToken {
        expected: String,
        found: String,
    },
    InvalidLiteral {
        literal_type: String,
        value: String,
    },
    MalformedConstruct {
        construct: String,
    },

    // Runtime errors - evaluation failures inside a cell
    UndefinedSymbol {
        symbol: String,
    },
    UndefinedModule {
        module: String,
    },
    TypeMismatch {
        expected: String,
        actual: String,
    },
    ArityMismatch {
        callee: String,
        expected: String,
        actual: usize,
    },
    InvalidOperation {
        operation: String,
        operand_type: String,
    },
    DestructureMismatch {
        targets: usize,
        values: usize,
    },
    RecursionLimit,

    // Cell failures - the uniform wrapper every cell fault is re-raised as
    CellFailure {
        fault: String,
        message: String,
        code: String,
    },

    // Expectation errors - internal to the plot-call matcher, never escape it
    ExpectationNotACall {
        line: String,
    },
}

/// Context-specific source information.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
}

/// Diagnostic enhancement data.
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Document,
    Parse,
    Runtime,
    Cell,
    Expectation,
}

impl ErrorKind {
    /// Get the error category for test assertions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Document { .. } => ErrorCategory::Document,

            Self::UnexpectedToken { .. }
            | Self::InvalidLiteral { .. }
            | Self::MalformedConstruct { .. } => ErrorCategory::Parse,

            Self::UndefinedSymbol { .. }
            | Self::UndefinedModule { .. }
            | Self::TypeMismatch { .. }
            | Self::ArityMismatch { .. }
            | Self::InvalidOperation { .. }
            | Self::DestructureMismatch { .. }
            | Self::RecursionLimit => ErrorCategory::Runtime,

            Self::CellFailure { .. } => ErrorCategory::Cell,

            Self::ExpectationNotACall { .. } => ErrorCategory::Expectation,
        }
    }

    /// Short stable name for the kind, used in error codes and in the uniform
    /// cell-failure header.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Document { .. } => "document",
            Self::UnexpectedToken { .. } => "unexpected_token",
            Self::InvalidLiteral { .. } => "invalid_literal",
            Self::MalformedConstruct { .. } => "malformed_construct",
            Self::UndefinedSymbol { .. } => "undefined_symbol",
            Self::UndefinedModule { .. } => "undefined_module",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ArityMismatch { .. } => "arity_mismatch",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::DestructureMismatch { .. } => "destructure_mismatch",
            Self::RecursionLimit => "recursion_limit",
            Self::CellFailure { .. } => "cell_failure",
            Self::ExpectationNotACall { .. } => "expectation_not_a_call",
        }
    }
}

impl std::error::Error for NbError {}

impl fmt::Display for NbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Document { message } => {
                write!(f, "Document error: {}", message)
            }
            ErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "Parse error: expected {}, found {}", expected, found)
            }
            ErrorKind::InvalidLiteral {
                literal_type,
                value,
            } => {
                write!(f, "Parse error: invalid {} '{}'", literal_type, value)
            }
            ErrorKind::MalformedConstruct { construct } => {
                write!(f, "Parse error: malformed {}", construct)
            }
            ErrorKind::UndefinedSymbol { symbol } => {
                write!(f, "Runtime error: undefined symbol '{}'", symbol)
            }
            ErrorKind::UndefinedModule { module } => {
                write!(f, "Runtime error: no module '{}' is available", module)
            }
            ErrorKind::TypeMismatch { expected, actual } => {
                write!(f, "Type error: expected {}, got {}", expected, actual)
            }
            ErrorKind::ArityMismatch {
                callee,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Runtime error: '{}' expects {} argument(s), got {}",
                    callee, expected, actual
                )
            }
            ErrorKind::InvalidOperation {
                operation,
                operand_type,
            } => {
                write!(
                    f,
                    "Runtime error: invalid operation '{}' on {}",
                    operation, operand_type
                )
            }
            ErrorKind::DestructureMismatch { targets, values } => {
                write!(
                    f,
                    "Runtime error: cannot unpack {} value(s) into {} target(s)",
                    values, targets
                )
            }
            ErrorKind::RecursionLimit => {
                write!(f, "Runtime error: recursion limit exceeded")
            }
            ErrorKind::CellFailure {
                fault,
                message,
                code,
            } => {
                write!(
                    f,
                    "\n\n{fault}: {message}\n\nCode\n\
                     =======================================\n\
                     {code}\n\
                     =======================================\n"
                )
            }
            ErrorKind::ExpectationNotACall { line } => {
                write!(f, "Error: No function call ({})", line)
            }
        }
    }
}

impl Diagnostic for NbError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl NbError {
    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::Document { .. } => "unreadable document".into(),
            ErrorKind::UnexpectedToken { .. } => "unexpected token".into(),
            ErrorKind::InvalidLiteral { .. } => "invalid literal".into(),
            ErrorKind::MalformedConstruct { .. } => "malformed syntax".into(),
            ErrorKind::UndefinedSymbol { .. } => "undefined symbol".into(),
            ErrorKind::UndefinedModule { .. } => "unknown module".into(),
            ErrorKind::TypeMismatch { .. } => "type mismatch".into(),
            ErrorKind::ArityMismatch { .. } => "arity mismatch".into(),
            ErrorKind::InvalidOperation { .. } => "invalid operation".into(),
            ErrorKind::DestructureMismatch { .. } => "unpack mismatch".into(),
            ErrorKind::RecursionLimit => "recursion limit exceeded".into(),
            ErrorKind::CellFailure { .. } => "cell failed here".into(),
            ErrorKind::ExpectationNotACall { .. } => "not a call".into(),
        }
    }

    /// Re-wrap any fault raised while executing a cell as the uniform
    /// diagnostic failure carrying the fault name, its message, and the exact
    /// source text that produced it. Document errors pass through untouched.
    pub fn into_cell_failure(self, cell_source: &str) -> NbError {
        if matches!(
            self.kind,
            ErrorKind::Document { .. } | ErrorKind::CellFailure { .. }
        ) {
            return self;
        }
        let fault = self.kind.name().to_string();
        let message = self.to_string();
        NbError {
            kind: ErrorKind::CellFailure {
                fault,
                message,
                code: cell_source.to_string(),
            },
            source_info: self.source_info,
            diagnostic_info: DiagnosticInfo {
                help: self.diagnostic_info.help,
                error_code: "nbtester::loader::cell_failure".into(),
            },
        }
    }
}

impl From<DocumentError> for NbError {
    fn from(err: DocumentError) -> Self {
        let context = SourceContext::fallback(&err.to_string());
        NbError {
            kind: ErrorKind::Document {
                message: err.to_string(),
            },
            source_info: SourceInfo {
                source: context.to_named_source(),
                primary_span: SourceSpan::new(0.into(), 0),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code: "nbtester::notebook::document".into(),
            },
        }
    }
}

// ============================================================================
// CONTEXT-AWARE ERROR CREATION
// ============================================================================

/// Context-aware error creation: each context knows how to attach the right
/// source to the errors it reports.
pub trait ErrorReporting {
    /// Create an error with context-appropriate source information.
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> NbError;

    fn undefined_symbol(&self, symbol: &str, span: SourceSpan) -> NbError {
        self.report(
            ErrorKind::UndefinedSymbol {
                symbol: symbol.into(),
            },
            span,
        )
    }

    fn type_mismatch(&self, expected: &str, actual: &str, span: SourceSpan) -> NbError {
        self.report(
            ErrorKind::TypeMismatch {
                expected: expected.into(),
                actual: actual.into(),
            },
            span,
        )
    }

    fn arity_mismatch(&self, callee: &str, expected: &str, actual: usize, span: SourceSpan) -> NbError {
        self.report(
            ErrorKind::ArityMismatch {
                callee: callee.into(),
                expected: expected.into(),
                actual,
            },
            span,
        )
    }

    fn invalid_operation(&self, operation: &str, operand_type: &str, span: SourceSpan) -> NbError {
        self.report(
            ErrorKind::InvalidOperation {
                operation: operation.into(),
                operand_type: operand_type.into(),
            },
            span,
        )
    }
}

/// Standalone constructor for contexts that only have a [`SourceContext`].
pub fn report_with_source(context: &SourceContext, kind: ErrorKind, span: SourceSpan) -> NbError {
    let code = format!("nbtester::{}", kind.name());
    NbError {
        kind,
        source_info: SourceInfo {
            source: context.to_named_source(),
            primary_span: span,
        },
        diagnostic_info: DiagnosticInfo {
            help: None,
            error_code: code,
        },
    }
}
