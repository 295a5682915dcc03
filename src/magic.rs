//! Magic-command rewriter.
//!
//! Scans a cell's raw source for directive lines before the cell is handed to
//! the execution engine:
//!
//! - `%run <path>` becomes a nested-load instruction; the path resolves
//!   relative to the directory of the document currently loading.
//! - any other `%name` directive line is stripped (not understood).
//! - `!command` shell-escape lines are stripped.
//! - a cell opening with a `%%name` block directive is skipped entirely.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*%(%?)(\S+)\s*(.*)$").unwrap());
static SHELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*!").unwrap());

/// Rewrite policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions {
    /// Split leading `import` lines into their own segment so a delegate
    /// engine that mishandles repeated imports sees them in isolation.
    pub isolate_imports: bool,
}

/// One unit of work the loader must perform for a cell, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Source text to hand to the execution engine.
    Code(String),
    /// Nested notebook load requested by a `%run` directive.
    RunNotebook(PathBuf),
}

/// What to do with a whole cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellPlan {
    /// Block directive: the cell is not executed at all.
    Skip,
    Run(Vec<Segment>),
}

/// Classify every line of `source` and produce the execution plan.
pub fn rewrite_cell(source: &str, base_dir: &Path, options: &RewriteOptions) -> CellPlan {
    if let Some(first) = source.lines().find(|l| !l.trim().is_empty()) {
        if let Some(caps) = DIRECTIVE_RE.captures(first) {
            if &caps[1] == "%" {
                return CellPlan::Skip;
            }
        }
    }

    let mut segments = Vec::new();
    let mut code = String::new();
    for line in source.lines() {
        if let Some(caps) = DIRECTIVE_RE.captures(line) {
            let name = &caps[2];
            let rest = caps[3].trim();
            if name == "run" && !rest.is_empty() {
                flush_code(&mut segments, &mut code, options);
                segments.push(Segment::RunNotebook(base_dir.join(rest)));
            }
            // every other directive is not understood and dropped
            continue;
        }
        if SHELL_RE.is_match(line) {
            continue;
        }
        code.push_str(line);
        code.push('\n');
    }
    flush_code(&mut segments, &mut code, options);
    CellPlan::Run(segments)
}

fn flush_code(segments: &mut Vec<Segment>, code: &mut String, options: &RewriteOptions) {
    let text = std::mem::take(code);
    if text.trim().is_empty() {
        return;
    }
    if !options.isolate_imports {
        segments.push(Segment::Code(text));
        return;
    }
    let (imports, rest): (Vec<&str>, Vec<&str>) = text
        .lines()
        .partition(|line| line.trim_start().starts_with("import "));
    if imports.is_empty() || rest.iter().all(|l| l.trim().is_empty()) {
        segments.push(Segment::Code(text));
        return;
    }
    segments.push(Segment::Code(imports.join("\n") + "\n"));
    segments.push(Segment::Code(rest.join("\n") + "\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(source: &str) -> CellPlan {
        rewrite_cell(source, Path::new("/nb"), &RewriteOptions::default())
    }

    #[test]
    fn plain_code_passes_through() {
        let plan = plan("a = 1\nb = 2\n");
        assert_eq!(
            plan,
            CellPlan::Run(vec![Segment::Code("a = 1\nb = 2\n".into())])
        );
    }

    #[test]
    fn run_directive_resolves_relative_to_document() {
        let plan = plan("%run child.ipynb\nparent = 1\n");
        assert_eq!(
            plan,
            CellPlan::Run(vec![
                Segment::RunNotebook(PathBuf::from("/nb/child.ipynb")),
                Segment::Code("parent = 1\n".into()),
            ])
        );
    }

    #[test]
    fn unknown_directives_and_shell_lines_are_stripped() {
        let plan = plan("%matplotlib inline\n!ls -la\nc = 3\n");
        assert_eq!(plan, CellPlan::Run(vec![Segment::Code("c = 3\n".into())]));
    }

    #[test]
    fn block_directive_skips_the_whole_cell() {
        assert_eq!(plan("%%capture\na = 1\n"), CellPlan::Skip);
        // leading blank lines do not hide the block directive
        assert_eq!(plan("\n  \n%%timeit\na = 1\n"), CellPlan::Skip);
    }

    #[test]
    fn directive_only_cell_yields_no_segments() {
        assert_eq!(plan("%autoreload 2\n"), CellPlan::Run(vec![]));
    }

    #[test]
    fn isolate_imports_splits_leading_imports() {
        let options = RewriteOptions {
            isolate_imports: true,
        };
        let plan = rewrite_cell(
            "import matplotlib.pyplot as plt\na = 1\n",
            Path::new("."),
            &options,
        );
        assert_eq!(
            plan,
            CellPlan::Run(vec![
                Segment::Code("import matplotlib.pyplot as plt\n".into()),
                Segment::Code("a = 1\n".into()),
            ])
        );
    }
}
