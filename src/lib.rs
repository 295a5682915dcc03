pub use crate::errors::{ErrorCategory, ErrorKind, NbError, SourceContext};
pub use crate::loader::{load_cells, load_cells_indexes, run_cell, CellSelection, Loader};
pub use crate::notebook::{Cell, CellKind, DocumentError, Notebook};
pub use crate::output::{OutputBuffer, OutputSink, StderrSink, StdoutSink};
pub use crate::plotmock::{
    matplotlib_test, matplotlib_test_with, CallLog, MatchOutcome, MockHandle, RecordedCall,
};
pub use crate::runtime::{
    CellEngine, ExecContext, GlobalNamespace, Interpreter, Value, VariableScope,
};

pub mod ast;
pub mod cli;
pub mod errors;
pub mod loader;
pub mod magic;
pub mod notebook;
pub mod output;
pub mod plotmock;
pub mod runtime;
pub mod syntax;
