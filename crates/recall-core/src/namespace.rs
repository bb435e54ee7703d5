//! The persistent name → value mapping of a session.

use indexmap::IndexMap;

use crate::eval::{ErrorKind, EvalError};
use crate::value::{Dict, Value};

/// Reserved entry that collects findings from independent callers.
///
/// Seeded with an empty dict when the namespace is created. Callers agree
/// out-of-band to write only under their own key; the server does not
/// enforce that.
pub const RESULTS_KEY: &str = "results";

/// Top-level bindings of a session, in first-bound order.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    bindings: IndexMap<String, Value>,
}

impl Namespace {
    /// Create a namespace holding only the empty results store.
    pub fn new() -> Self {
        let mut bindings = IndexMap::new();
        bindings.insert(RESULTS_KEY.to_string(), Value::Dict(Dict::new()));
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Mutable access for in-place updates, including of the results store.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.bindings.get_mut(name)
    }

    /// Bind or rebind `name`. The results store can never be rebound.
    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        if name == RESULTS_KEY {
            return Err(reserved(name, "rebound"));
        }
        self.bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// Remove a binding, returning its value.
    pub fn unbind(&mut self, name: &str) -> Result<Value, EvalError> {
        if name == RESULTS_KEY {
            return Err(reserved(name, "deleted"));
        }
        self.bindings
            .shift_remove(name)
            .ok_or_else(|| EvalError::new(ErrorKind::Name, format!("name '{name}' is not defined")))
    }

    /// The results store.
    pub fn results(&self) -> Option<&Dict> {
        match self.bindings.get(RESULTS_KEY) {
            Some(Value::Dict(map)) => Some(map),
            _ => None,
        }
    }

    /// Whether `name` shows up in listings. Underscore names are private.
    pub fn is_visible(name: &str) -> bool {
        !name.starts_with('_') || name == RESULTS_KEY
    }

    /// Visible names in first-bound order.
    pub fn visible_names(&self) -> Vec<String> {
        self.bindings
            .keys()
            .filter(|name| Self::is_visible(name))
            .cloned()
            .collect()
    }

    /// Visible names with their type names.
    pub fn describe(&self) -> IndexMap<String, String> {
        self.bindings
            .iter()
            .filter(|(name, _)| Self::is_visible(name))
            .map(|(name, value)| (name.clone(), value.type_name().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

fn reserved(name: &str, action: &str) -> EvalError {
    EvalError::new(
        ErrorKind::ReservedName,
        format!("'{name}' is reserved and cannot be {action}; mutate it in place instead"),
    )
}
