//! End-to-end loading behavior against the notebook fixtures in
//! `tests/fixtures/`.

use std::path::PathBuf;

use nbtester::{
    load_cells, load_cells_indexes, run_cell, CellSelection, ErrorKind, Loader, Value,
    VariableScope,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn str_value(text: &str) -> Value {
    Value::Str(text.to_string())
}

fn num_value(n: f64) -> Value {
    Value::Number(n)
}

// ============================================================================
// WHOLE-DOCUMENT LOADING
// ============================================================================

mod whole_document {
    use super::*;

    #[test]
    fn loads_every_code_cell_in_document_order() {
        let mut variables = VariableScope::new();
        load_cells(&mut variables, fixture("define_variable.ipynb")).unwrap();
        assert_eq!(variables.get("a"), Some(&str_value("test")));
        assert_eq!(variables.get("b"), Some(&str_value("test2")));
        assert_eq!(variables.len(), 2);
    }

    #[test]
    fn markdown_cells_contribute_nothing() {
        // The fixture's middle cell is markdown; only the two code cells bind.
        let mut variables = VariableScope::new();
        load_cells(&mut variables, fixture("define_variable.ipynb")).unwrap();
        assert_eq!(variables.len(), 2);
    }

    #[test]
    fn repeated_loads_are_deterministic() {
        let mut first = VariableScope::new();
        let mut second = VariableScope::new();
        load_cells(&mut first, fixture("define_variable.ipynb")).unwrap();
        load_cells(&mut second, fixture("define_variable.ipynb")).unwrap();
        assert_eq!(first, second);
    }
}

// ============================================================================
// SELECTION POLICIES
// ============================================================================

mod selection {
    use super::*;

    #[test]
    fn index_subset_runs_only_the_named_cells() {
        let mut variables = VariableScope::new();
        load_cells_indexes(&mut variables, fixture("define_variable.ipynb"), &[0]).unwrap();
        assert_eq!(variables.get("a"), Some(&str_value("test")));
        assert_eq!(variables.get("b"), None);
    }

    #[test]
    fn indexes_count_every_cell_not_only_code_cells() {
        // Index 1 is the markdown cell; index 2 is the second code cell.
        let mut variables = VariableScope::new();
        load_cells_indexes(&mut variables, fixture("define_variable.ipynb"), &[0, 2]).unwrap();
        assert_eq!(variables.get("a"), Some(&str_value("test")));
        assert_eq!(variables.get("b"), Some(&str_value("test2")));
    }

    #[test]
    fn cell_outside_subset_leaves_its_dependents_undefined() {
        // Running only the cell that reads `a` without the cell that defines
        // it must fault, not silently succeed.
        let mut variables = VariableScope::new();
        let err =
            load_cells_indexes(&mut variables, fixture("define_variable.ipynb"), &[2]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CellFailure { .. }));
        assert!(variables.is_empty());
    }

    #[test]
    fn execution_order_replays_by_recorded_counter() {
        // In document order the fixture reads `first` before defining it.
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("exec_order.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CellFailure { .. }));

        let mut variables = VariableScope::new();
        Loader::new()
            .selection(CellSelection::ExecutionOrder)
            .load(&mut variables, &fixture("exec_order.ipynb"))
            .unwrap();
        assert_eq!(variables.get("first"), Some(&num_value(1.0)));
        assert_eq!(variables.get("second"), Some(&num_value(2.0)));
        // The never-executed cell (null counter) is excluded.
        assert_eq!(variables.get("unrun"), None);
    }
}

// ============================================================================
// FAILURE BEHAVIOR
// ============================================================================

mod failures {
    use super::*;

    #[test]
    fn syntax_error_aborts_with_a_cell_failure() {
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("syntax_error.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CellFailure { .. }));
        // The diagnostic carries the offending cell source verbatim.
        assert!(err.to_string().contains("a = (1 +"));
        assert!(variables.is_empty());
    }

    #[test]
    fn bindings_from_earlier_cells_survive_a_later_fault() {
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("partial_failure.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CellFailure { .. }));
        assert_eq!(variables.get("kept"), Some(&str_value("ok")));
        assert_eq!(variables.get("boom"), None);
    }

    #[test]
    fn unreadable_document_is_a_document_error() {
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("broken.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Document { .. }));
    }

    #[test]
    fn unsupported_format_version_is_a_document_error() {
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("bad_version.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Document { .. }));
        assert!(err.to_string().contains("version 3"));
    }

    #[test]
    fn missing_file_is_a_document_error() {
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("does_not_exist.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Document { .. }));
    }
}

// ============================================================================
// MAGIC COMMANDS AND %run
// ============================================================================

mod directives {
    use super::*;

    #[test]
    fn run_directive_merges_the_child_notebook() {
        let mut variables = VariableScope::new();
        load_cells(&mut variables, fixture("run_parent.ipynb")).unwrap();
        assert_eq!(variables.get("child"), Some(&str_value("CHILD")));
        assert_eq!(variables.get("parent"), Some(&str_value("PARENT")));
    }

    #[test]
    fn cell_magics_skip_the_cell_and_line_magics_are_stripped() {
        // The %%capture cell would fault on an undefined name if it ran.
        let mut variables = VariableScope::new();
        load_cells(&mut variables, fixture("magic.ipynb")).unwrap();
        assert_eq!(variables.get("c"), Some(&num_value(3.0)));
        assert_eq!(variables.len(), 1);
    }

    #[test]
    fn self_running_notebook_hits_the_recursion_limit() {
        // No cycle detection; the depth guard is what stops the chain.
        let mut variables = VariableScope::new();
        let err = load_cells(&mut variables, fixture("run_self.ipynb")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RecursionLimit));
    }

    #[test]
    fn run_cell_resolves_run_directives_against_the_given_document() {
        let mut variables = VariableScope::new();
        run_cell(
            "%run run_child.ipynb",
            &mut variables,
            fixture("run_parent.ipynb"),
        )
        .unwrap();
        assert_eq!(variables.get("child"), Some(&str_value("CHILD")));
    }
}

// ============================================================================
// INLINE SOURCE AND SHARED-SCOPE SEMANTICS
// ============================================================================

mod inline_source {
    use super::*;

    #[test]
    fn run_cell_executes_a_snippet_against_the_scope() {
        let mut variables = VariableScope::new();
        run_cell("z = 1 + 2", &mut variables, fixture("run_parent.ipynb")).unwrap();
        assert_eq!(variables.get("z"), Some(&num_value(3.0)));
    }

    #[test]
    fn bindings_persist_across_run_cell_calls() {
        let mut variables = VariableScope::new();
        let path = fixture("run_parent.ipynb");
        run_cell("base = 10", &mut variables, &path).unwrap();
        run_cell("doubled = base * 2", &mut variables, &path).unwrap();
        assert_eq!(variables.get("doubled"), Some(&num_value(20.0)));
    }

    #[test]
    fn functions_close_over_the_shared_scope() {
        // `probe` is defined while x == 1 but reads the scope at call time.
        let mut variables = VariableScope::new();
        load_cells(&mut variables, fixture("closure.ipynb")).unwrap();
        assert_eq!(variables.get("y"), Some(&num_value(2.0)));
    }
}
