//! Variable scopes for cell execution.
//!
//! A [`VariableScope`] is owned by the caller of the loader and populated in
//! place as cells run; the caller inspects it afterwards. A
//! [`GlobalNamespace`] lives for one top-level load and is shared by
//! reference into nested loads; it holds durable definitions (functions,
//! imported modules) so a cell can reach helpers defined by an earlier cell.

use std::collections::HashMap;

use super::Value;

/// The mutable binding set a cell's execution reads from and writes to.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VariableScope {
    bindings: HashMap<String, Value>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    /// Binding names in sorted order, for deterministic reporting.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Durable definitions shared across every cell of one loading operation,
/// including cells of notebooks pulled in through `%run`.
#[derive(Debug, Default)]
pub struct GlobalNamespace {
    bindings: HashMap<String, Value>,
    modules: HashMap<String, Value>,
}

impl GlobalNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Make a module importable under its dotted path. The plotting mock uses
    /// this to stand in for `matplotlib.pyplot`.
    pub fn register_module(&mut self, path: impl Into<String>, value: Value) {
        self.modules.insert(path.into(), value);
    }

    pub fn module(&self, path: &str) -> Option<&Value> {
        self.modules.get(path)
    }
}
