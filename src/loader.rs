//! Cell loader: selects which cells of a document to run and drives the
//! magic-command rewriter and the execution engine per cell.
//!
//! Bindings accumulate in the caller's [`VariableScope`]; the first fault in
//! any cell aborts the whole load as one uniform diagnostic failure, leaving
//! earlier cells' bindings in place.

use std::path::{Path, PathBuf};

use miette::SourceSpan;

use crate::errors::{report_with_source, ErrorKind, NbError, SourceContext};
use crate::magic::{rewrite_cell, CellPlan, RewriteOptions, Segment};
use crate::notebook::{Cell, Notebook};
use crate::runtime::{CellEngine, ExecContext, GlobalNamespace, Interpreter, VariableScope};

/// Bound on `%run` chains; a notebook that transitively runs itself is a
/// caller error and faults here rather than overflowing the stack.
pub const MAX_RUN_DEPTH: usize = 32;

// ============================================================================
// SELECTION POLICY
// ============================================================================

/// Which code cells of a document to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CellSelection {
    /// Every code cell, in document order. Canonical default.
    #[default]
    All,
    /// Only code cells whose position in the full cell sequence is in the
    /// set, still in document order.
    Indexes(Vec<usize>),
    /// Only code cells carrying a recorded execution counter, ascending by
    /// that counter: replay cells in the order they were last run
    /// interactively.
    ExecutionOrder,
}

// ============================================================================
// LOADER
// ============================================================================

/// Orchestrates one loading operation.
pub struct Loader {
    selection: CellSelection,
    rewrite: RewriteOptions,
    engine: Box<dyn CellEngine>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Loader with the built-in interpreter and the default selection.
    pub fn new() -> Self {
        Self::with_engine(Box::new(Interpreter::new()))
    }

    /// Loader delegating execution to the supplied engine.
    pub fn with_engine(engine: Box<dyn CellEngine>) -> Self {
        Self {
            selection: CellSelection::All,
            rewrite: RewriteOptions::default(),
            engine,
        }
    }

    pub fn selection(mut self, selection: CellSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn isolate_imports(mut self, on: bool) -> Self {
        self.rewrite.isolate_imports = on;
        self
    }

    /// Populate `variables` from the document's code cells.
    pub fn load(&mut self, variables: &mut VariableScope, path: &Path) -> Result<(), NbError> {
        let mut globals = GlobalNamespace::new();
        self.load_seeded(variables, &mut globals, path)
    }

    /// Like [`Loader::load`], but with a caller-prepared global namespace
    /// (used by the plotting mock to pre-install its stand-ins).
    pub fn load_seeded(
        &mut self,
        variables: &mut VariableScope,
        globals: &mut GlobalNamespace,
        path: &Path,
    ) -> Result<(), NbError> {
        self.load_at_depth(variables, globals, path, 0)
    }

    /// Execute one already-extracted source block; `%run` directives resolve
    /// relative to `path`'s directory.
    pub fn run_source(
        &mut self,
        source: &str,
        variables: &mut VariableScope,
        path: &Path,
    ) -> Result<(), NbError> {
        let mut globals = GlobalNamespace::new();
        self.run_source_seeded(source, variables, &mut globals, path)
    }

    pub fn run_source_seeded(
        &mut self,
        source: &str,
        variables: &mut VariableScope,
        globals: &mut GlobalNamespace,
        path: &Path,
    ) -> Result<(), NbError> {
        let base = base_dir_of(path);
        self.run_block(source, variables, globals, &base, "<cell>", 0)
    }

    fn load_at_depth(
        &mut self,
        variables: &mut VariableScope,
        globals: &mut GlobalNamespace,
        path: &Path,
        depth: usize,
    ) -> Result<(), NbError> {
        if depth > MAX_RUN_DEPTH {
            return Err(report_with_source(
                &SourceContext::fallback(&format!("%run chain at {}", path.display())),
                ErrorKind::RecursionLimit,
                SourceSpan::new(0.into(), 0),
            ));
        }
        let notebook = Notebook::read(path)?;
        let base = notebook.base_dir();
        let document = path.display().to_string();
        for (index, cell) in self.select(&notebook) {
            let name = format!("{}[cell {}]", document, index);
            self.run_block(&cell.source, variables, globals, &base, &name, depth)?;
        }
        Ok(())
    }

    /// Apply the selection policy. Cell indexes count every cell of the
    /// document, not only code cells.
    fn select<'n>(&self, notebook: &'n Notebook) -> Vec<(usize, &'n Cell)> {
        let code_cells = notebook
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_code());
        match &self.selection {
            CellSelection::All => code_cells.collect(),
            CellSelection::Indexes(indexes) => code_cells
                .filter(|(i, _)| indexes.contains(i))
                .collect(),
            CellSelection::ExecutionOrder => {
                let mut selected: Vec<(usize, &Cell)> =
                    code_cells.filter(|(_, cell)| cell.order.is_some()).collect();
                selected.sort_by_key(|(_, cell)| cell.order.unwrap_or(u64::MAX));
                selected
            }
        }
    }

    fn run_block(
        &mut self,
        source: &str,
        variables: &mut VariableScope,
        globals: &mut GlobalNamespace,
        base: &Path,
        name: &str,
        depth: usize,
    ) -> Result<(), NbError> {
        let segments = match rewrite_cell(source, base, &self.rewrite) {
            CellPlan::Skip => return Ok(()),
            CellPlan::Run(segments) => segments,
        };
        for segment in segments {
            match segment {
                Segment::Code(code) => {
                    let context = SourceContext::new(name, code.clone());
                    let mut exec = ExecContext::new(variables, globals, context);
                    self.engine
                        .execute(&code, &mut exec)
                        .map_err(|e| e.into_cell_failure(&code))?;
                }
                Segment::RunNotebook(child) => {
                    self.load_at_depth(variables, globals, &child, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

fn base_dir_of(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    }
}

// ============================================================================
// CONVENIENCE ENTRY POINTS
// ============================================================================

/// Populate `variables` from every code cell of the document, in document
/// order.
pub fn load_cells(variables: &mut VariableScope, path: impl AsRef<Path>) -> Result<(), NbError> {
    Loader::new().load(variables, path.as_ref())
}

/// Like [`load_cells`], restricted to the cells at the given positions.
pub fn load_cells_indexes(
    variables: &mut VariableScope,
    path: impl AsRef<Path>,
    indexes: &[usize],
) -> Result<(), NbError> {
    Loader::new()
        .selection(CellSelection::Indexes(indexes.to_vec()))
        .load(variables, path.as_ref())
}

/// Execute one source block against `variables`, resolving `%run` directives
/// relative to `path`.
pub fn run_cell(
    source: &str,
    variables: &mut VariableScope,
    path: impl AsRef<Path>,
) -> Result<(), NbError> {
    Loader::new().run_source(source, variables, path.as_ref())
}
