//! End-to-end plot-call matching: run a notebook or snippet with the plotting
//! namespace mocked out, then check the recorded calls against expectation
//! text.
//!
//! The matcher holds a process-wide re-entrancy flag, so these tests take a
//! shared lock to keep the harness's parallel threads from tripping it.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use nbtester::{matplotlib_test_with, MatchOutcome, OutputBuffer};

static PLOT_LOCK: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    PLOT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .display()
        .to_string()
}

fn check(target: &str, expected: Option<&str>) -> (MatchOutcome, OutputBuffer) {
    let mut sink = OutputBuffer::new();
    let outcome = matplotlib_test_with(target, expected, None, &mut sink).unwrap();
    (outcome, sink)
}

// ============================================================================
// MATCHING AGAINST A NOTEBOOK DOCUMENT
// ============================================================================

#[test]
fn notebook_satisfies_its_expectations() {
    let _serial = serial();
    let expected = "plt.subplots()\nax.plot(1, 2)\nax.set_title('hello')";
    let (outcome, sink) = check(&fixture("plot.ipynb"), Some(expected));
    assert_eq!(outcome, MatchOutcome::Satisfied);
    assert_eq!(sink.as_str(), "");
}

#[test]
fn missing_call_is_reported_and_stops_matching() {
    let _serial = serial();
    let (outcome, sink) = check(&fixture("plot.ipynb"), Some("plt.plot(9, 9)"));
    assert_eq!(outcome, MatchOutcome::NotSatisfied);
    assert_eq!(sink.as_str(), "Expected call not found: plt.plot(9, 9)");
}

#[test]
fn blank_and_comment_lines_are_skipped() {
    let _serial = serial();
    let expected = "# layout\n\nax.plot(1, 2)\n";
    let (outcome, _) = check(&fixture("plot.ipynb"), Some(expected));
    assert_eq!(outcome, MatchOutcome::Satisfied);
}

// ============================================================================
// MATCHING AGAINST INLINE SNIPPETS
// ============================================================================

#[test]
fn snippet_target_runs_without_a_document() {
    let _serial = serial();
    let (outcome, _) = check("plt.plot(3, 4)", Some("plt.plot(3, 4)"));
    assert_eq!(outcome, MatchOutcome::Satisfied);
}

#[test]
fn pyplot_import_resolves_to_the_stand_in() {
    let _serial = serial();
    let source = "import matplotlib.pyplot as mpl\nmpl.plot(7)";
    let (outcome, _) = check(source, Some("plt.plot(7)"));
    assert_eq!(outcome, MatchOutcome::Satisfied);
}

#[test]
fn grid_axes_match_bracketed_expectations() {
    let _serial = serial();
    let source = "fig, axes = plt.subplots(2, 2)\naxes[0][1].plot(5)";
    let expected = "plt.subplots(2, 2)\naxes[0][1].plot(5)";
    let (outcome, _) = check(source, Some(expected));
    assert_eq!(outcome, MatchOutcome::Satisfied);
}

#[test]
fn vector_axes_match_single_index_expectations() {
    let _serial = serial();
    let source = "fig, axes = plt.subplots(2)\naxes[1].set_title('x')";
    let expected = "plt.subplots(2)\naxes[1].set_title('x')";
    let (outcome, _) = check(source, Some(expected));
    assert_eq!(outcome, MatchOutcome::Satisfied);
}

#[test]
fn explicit_default_counts_normalize_away() {
    let _serial = serial();
    let (outcome, _) = check("fig, ax = plt.subplots(1, 1)", Some("plt.subplots()"));
    assert_eq!(outcome, MatchOutcome::Satisfied);
}

#[test]
fn unrequested_keywords_do_not_block_a_match() {
    let _serial = serial();
    let source = "plt.plot(1, 2, color='red')";
    let (outcome, _) = check(source, Some("plt.plot(1, 2)"));
    assert_eq!(outcome, MatchOutcome::Satisfied);

    let (outcome, _) = check(source, Some("plt.plot(1, 2, color='blue')"));
    assert_eq!(outcome, MatchOutcome::NotSatisfied);
}

// ============================================================================
// DISCOVERY MODE AND DIAGNOSTICS
// ============================================================================

#[test]
fn discovery_lists_each_distinct_call_once() {
    let _serial = serial();
    let source = "plt.plot(1, 2)\nplt.plot(1, 2)\nplt.plot(3, 4)";
    let (outcome, sink) = check(source, None);
    assert_eq!(outcome, MatchOutcome::NotSatisfied);
    let lines: Vec<&str> = sink.lines().collect();
    assert_eq!(lines, vec!["plt.plot(1, 2)", "plt.plot(3, 4)"]);
}

#[test]
fn unparsable_expectation_line_is_reported() {
    let _serial = serial();
    let (outcome, sink) = check("x = 1", Some("just words"));
    assert_eq!(outcome, MatchOutcome::NotSatisfied);
    assert_eq!(sink.as_str(), "Error: no function call (just words)");
}

#[test]
fn conversion_pairs_rewrite_reported_text_only() {
    let _serial = serial();
    let conv = vec![("9".to_string(), "nine".to_string())];
    let mut sink = OutputBuffer::new();
    let outcome =
        matplotlib_test_with("x = 1", Some("plt.plot(9)"), Some(&conv), &mut sink).unwrap();
    assert_eq!(outcome, MatchOutcome::NotSatisfied);
    assert_eq!(sink.as_str(), "Expected call not found: plt.plot(nine)");
}

// ============================================================================
// FAULT PROPAGATION
// ============================================================================

#[test]
fn execution_faults_propagate_instead_of_matching() {
    let _serial = serial();
    let mut sink = OutputBuffer::new();
    let result = matplotlib_test_with("plt.plot(whoops)", Some("plt.plot(1)"), None, &mut sink);
    assert!(result.is_err());
}

#[test]
fn unreadable_document_faults_propagate() {
    let _serial = serial();
    let mut sink = OutputBuffer::new();
    let result = matplotlib_test_with(&fixture("broken.ipynb"), None, None, &mut sink);
    assert!(result.is_err());
}
