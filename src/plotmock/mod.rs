//! Plotting-mock subsystem: recording stand-ins for the plotting namespace.
//!
//! During a plot test the `plt` namespace is a [`MockHandle`]; every call that
//! lands on it (or on any stand-in it hands out) is appended to a shared
//! [`CallLog`]. The log is an explicit context object created per test, so
//! nothing leaks between tests. The `subplots` entry point is special-cased:
//! it records a normalized call and returns figure/axis stand-ins shaped like
//! the requested grid.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::Value;

pub mod matcher;

pub use matcher::{matplotlib_test, matplotlib_test_with, ExpectedCall, MatchOutcome};

// ============================================================================
// RECORDED CALLS
// ============================================================================

/// One invocation captured by a stand-in.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Name of the stand-in the call landed on (`plt`, `ax`, `axes[1]`, ..).
    pub owner: String,
    /// Member path relative to the owner (`plot`, `cm.get`, ..).
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl RecordedCall {
    /// `owner.method`, the form expectations are written in.
    pub fn qualified(&self) -> String {
        if self.method.is_empty() {
            self.owner.clone()
        } else {
            format!("{}.{}", self.owner, self.method)
        }
    }

    /// Render as `owner.method(arg, key=value)`, for discovery output.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = self.args.iter().map(Value::repr).collect();
        parts.extend(
            self.kwargs
                .iter()
                .map(|(name, value)| format!("{}={}", name, value.repr())),
        );
        format!("{}({})", self.qualified(), parts.join(", "))
    }
}

/// A subplot-count argument that was not a positive whole number.
#[derive(Debug, Clone)]
pub struct SubplotArgError {
    pub value: String,
}

// ============================================================================
// CALL LOG
// ============================================================================

/// Shared, append-only record of every call made during one test, plus the
/// stand-ins created for it in creation order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Rc<RefCell<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    calls: Vec<RecordedCall>,
    mock_names: Vec<String>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a named stand-in backed by this log.
    pub fn mock(&self, name: &str) -> MockHandle {
        self.inner.borrow_mut().mock_names.push(name.to_string());
        MockHandle {
            name: name.to_string(),
            path: Vec::new(),
            log: self.clone(),
        }
    }

    fn record(&self, call: RecordedCall) {
        self.inner.borrow_mut().calls.push(call);
    }

    fn first_mock_name(&self) -> Option<String> {
        self.inner.borrow().mock_names.first().cloned()
    }

    /// All recorded calls, flattened in the order they happened.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.borrow().calls.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().calls.is_empty()
    }
}

// ============================================================================
// MOCK HANDLES
// ============================================================================

/// A recording stand-in. Attribute access extends the member path; calling it
/// records into the shared log.
#[derive(Clone)]
pub struct MockHandle {
    name: String,
    path: Vec<String>,
    log: CallLog,
}

impl MockHandle {
    /// Root name of this stand-in.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root name plus any attribute path, e.g. `plt.cm`.
    pub fn qualified_name(&self) -> String {
        if self.path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.path.join("."))
        }
    }

    /// Stand-in for an attribute of this stand-in.
    pub fn attr(&self, name: &str) -> MockHandle {
        let mut path = self.path.clone();
        path.push(name.to_string());
        MockHandle {
            name: self.name.clone(),
            path,
            log: self.log.clone(),
        }
    }

    /// Record a call. The `subplots` entry point of the plotting namespace is
    /// intercepted and returns `(fig, axes)` stand-ins instead.
    pub fn call(
        &self,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, SubplotArgError> {
        let is_primary = self.log.first_mock_name().as_deref() == Some(self.name.as_str());
        if is_primary && self.path.as_slice() == ["subplots"] {
            return self.call_subplots(args, kwargs);
        }
        self.log.record(RecordedCall {
            owner: self.name.clone(),
            method: self.path.join("."),
            args,
            kwargs,
        });
        Ok(Value::Nil)
    }

    fn call_subplots(
        &self,
        args: Vec<Value>,
        mut kwargs: Vec<(String, Value)>,
    ) -> Result<Value, SubplotArgError> {
        let nrows = match args.first() {
            Some(value) => as_count(value)?,
            None => take_kwarg(&mut kwargs, "nrows").map_or(Ok(1), |v| as_count(&v))?,
        };
        let ncols = match args.get(1) {
            Some(value) => as_count(value)?,
            None => take_kwarg(&mut kwargs, "ncols").map_or(Ok(1), |v| as_count(&v))?,
        };

        // Trailing arguments equal to the default of 1 are dropped, mirroring
        // how a caller would typically write the call.
        let mut recorded_args = Vec::new();
        if ncols != 1 {
            recorded_args.push(Value::Number(nrows as f64));
            recorded_args.push(Value::Number(ncols as f64));
        } else if nrows != 1 {
            recorded_args.push(Value::Number(nrows as f64));
        }
        // The call is recorded against the first registered stand-in, and
        // only when that stand-in is the plotting namespace itself.
        if self.log.first_mock_name().as_deref() == Some(self.name.as_str()) {
            self.log.record(RecordedCall {
                owner: self.name.clone(),
                method: "subplots".to_string(),
                args: recorded_args,
                kwargs,
            });
        }

        let fig = Value::Mock(self.log.mock("fig"));
        let axes = if nrows == 1 && ncols == 1 {
            Value::Mock(self.log.mock("ax"))
        } else if nrows == 1 || ncols == 1 {
            let count = nrows * ncols;
            Value::List(
                (0..count)
                    .map(|i| Value::Mock(self.log.mock(&format!("axes[{}]", i))))
                    .collect(),
            )
        } else {
            Value::List(
                (0..nrows)
                    .map(|i| {
                        Value::List(
                            (0..ncols)
                                .map(|j| {
                                    Value::Mock(self.log.mock(&format!("axes[{}, {}]", i, j)))
                                })
                                .collect(),
                        )
                    })
                    .collect(),
            )
        };
        Ok(Value::Tuple(vec![fig, axes]))
    }
}

impl PartialEq for MockHandle {
    fn eq(&self, other: &MockHandle) -> bool {
        self.qualified_name() == other.qualified_name()
    }
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MockHandle({})", self.qualified_name())
    }
}

fn take_kwarg(kwargs: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let position = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(position).1)
}

fn as_count(value: &Value) -> Result<usize, SubplotArgError> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && *n >= 1.0 => Ok(*n as usize),
        other => Err(SubplotArgError {
            value: other.repr(),
        }),
    }
}
