//! Notebook document reader.
//!
//! Parses the v4 interchange format: an ordered list of cells, each with a
//! `cell_type` tag, a `source` field (a string or a list of strings to be
//! joined), and an optional `execution_count`. Only the fields the loader
//! needs are modeled; everything else in the document is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Faults raised while reading the document itself. These surface as-is; they
/// are never re-wrapped as cell failures.
#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("failed to read notebook {path}: {source}")]
    #[diagnostic(code(nbtester::notebook::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notebook {path} is not a valid document: {source}")]
    #[diagnostic(code(nbtester::notebook::json))]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("notebook {path} has unsupported format version {found}")]
    #[diagnostic(
        code(nbtester::notebook::version),
        help("only nbformat 4 documents are supported")
    )]
    Version { path: PathBuf, found: u64 },
}

// ============================================================================
// DATA MODEL
// ============================================================================

/// Kind of a cell. Anything that is not code is lumped together; the loader
/// never executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Code,
    Other,
}

/// One unit of the document. Immutable once read; its identity is its
/// position in the document's cell sequence.
#[derive(Debug, Clone)]
pub struct Cell {
    pub kind: CellKind,
    pub source: String,
    /// Recorded execution counter, if the cell was ever run interactively.
    pub order: Option<u64>,
}

impl Cell {
    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }
}

/// A parsed notebook document.
#[derive(Debug, Clone)]
pub struct Notebook {
    pub path: PathBuf,
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// Read and parse the document at `path`.
    pub fn read(path: &Path) -> Result<Notebook, DocumentError> {
        let text = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawNotebook =
            serde_json::from_str(&text).map_err(|source| DocumentError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(version) = raw.nbformat {
            if version != 4 {
                return Err(DocumentError::Version {
                    path: path.to_path_buf(),
                    found: version,
                });
            }
        }
        let cells = raw.cells.into_iter().map(Cell::from).collect();
        Ok(Notebook {
            path: path.to_path_buf(),
            cells,
        })
    }

    /// Directory of the document; `%run` paths resolve against this, not the
    /// process working directory.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

// ============================================================================
// RAW WIRE MODEL
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawNotebook {
    #[serde(default)]
    cells: Vec<RawCell>,
    #[serde(default)]
    nbformat: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCell {
    cell_type: String,
    #[serde(default)]
    source: SourceField,
    #[serde(default)]
    execution_count: Option<u64>,
}

/// The `source` field is either a single string or a list of line fragments.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceField {
    Joined(String),
    Lines(Vec<String>),
}

impl Default for SourceField {
    fn default() -> Self {
        SourceField::Joined(String::new())
    }
}

impl SourceField {
    fn join(self) -> String {
        match self {
            SourceField::Joined(s) => s,
            SourceField::Lines(lines) => lines.concat(),
        }
    }
}

impl From<RawCell> for Cell {
    fn from(raw: RawCell) -> Self {
        let kind = if raw.cell_type == "code" {
            CellKind::Code
        } else {
            CellKind::Other
        };
        Cell {
            kind,
            source: raw.source.join(),
            order: raw.execution_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_source_line_fragments() {
        let raw: RawCell = serde_json::from_str(
            r#"{"cell_type": "code", "source": ["a = 1\n", "b = 2"], "execution_count": null}"#,
        )
        .unwrap();
        let cell = Cell::from(raw);
        assert_eq!(cell.source, "a = 1\nb = 2");
        assert_eq!(cell.order, None);
        assert!(cell.is_code());
    }

    #[test]
    fn accepts_plain_string_source() {
        let raw: RawCell = serde_json::from_str(
            r##"{"cell_type": "markdown", "source": "# heading"}"##,
        )
        .unwrap();
        let cell = Cell::from(raw);
        assert_eq!(cell.kind, CellKind::Other);
        assert_eq!(cell.source, "# heading");
    }
}
