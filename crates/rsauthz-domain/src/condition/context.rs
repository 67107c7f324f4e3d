//! Request context for condition evaluation

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::{ConditionError, ConditionResult};

/// A scalar value usable in conditions and request contexts
///
/// Values of different variants are never equal, even when they print the
/// same (`"5"` vs `5`, `5` vs `5.0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Null value
    Null,
    /// A boolean value
    Bool(bool),
    /// A 64-bit signed integer
    Int(i64),
    /// A 64-bit floating point number
    Float(f64),
    /// A string value
    String(String),
}

impl ConditionValue {
    /// Human-readable type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ConditionValue::Null => "null",
            ConditionValue::Bool(_) => "bool",
            ConditionValue::Int(_) => "int",
            ConditionValue::Float(_) => "float",
            ConditionValue::String(_) => "string",
        }
    }

    /// Converts a JSON scalar; arrays and objects yield `None`
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(ConditionValue::Null),
            serde_json::Value::Bool(b) => Some(ConditionValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(ConditionValue::Int(i)),
                None => n.as_f64().map(ConditionValue::Float),
            },
            serde_json::Value::String(s) => Some(ConditionValue::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Converts back to JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConditionValue::Null => serde_json::Value::Null,
            ConditionValue::Bool(b) => serde_json::Value::Bool(*b),
            ConditionValue::Int(i) => serde_json::Value::from(*i),
            ConditionValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConditionValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Appends an unambiguous, type-tagged encoding of the value
    fn write_canonical(&self, out: &mut String) {
        // Writing to a String cannot fail.
        let _ = match self {
            ConditionValue::Null => write!(out, "n"),
            ConditionValue::Bool(b) => write!(out, "b:{b}"),
            ConditionValue::Int(i) => write!(out, "i:{i}"),
            ConditionValue::Float(f) => write!(out, "f:{f:?}"),
            ConditionValue::String(s) => write!(out, "s:{}", quote(s)),
        };
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        ConditionValue::Bool(value)
    }
}

impl From<i64> for ConditionValue {
    fn from(value: i64) -> Self {
        ConditionValue::Int(value)
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Float(value)
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::String(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::String(value)
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Variable bindings supplied with a permission check
///
/// Keys are kept ordered so the context has a stable fingerprint for
/// cache keys.
///
/// # Example
///
/// ```ignore
/// use rsauthz_domain::condition::ConditionContext;
///
/// let mut ctx = ConditionContext::new();
/// ctx.set_string("department", "engineering");
/// ctx.set_int("clearance", 3);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionContext {
    variables: BTreeMap<String, ConditionValue>,
}

impl ConditionContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from JSON values, rejecting arrays and objects
    pub fn from_json(values: &HashMap<String, serde_json::Value>) -> ConditionResult<Self> {
        let mut ctx = Self::new();
        for (key, value) in values {
            let scalar =
                ConditionValue::from_json(value).ok_or_else(|| ConditionError::InvalidContext {
                    key: key.clone(),
                    message: "context values must be scalars".to_string(),
                })?;
            ctx.set(key.clone(), scalar);
        }
        Ok(ctx)
    }

    /// Set a boolean variable
    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        self.set(name, ConditionValue::Bool(value));
    }

    /// Set an integer variable
    pub fn set_int(&mut self, name: impl Into<String>, value: i64) {
        self.set(name, ConditionValue::Int(value));
    }

    /// Set a float variable
    pub fn set_float(&mut self, name: impl Into<String>, value: f64) {
        self.set(name, ConditionValue::Float(value));
    }

    /// Set a string variable
    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, ConditionValue::String(value.into()));
    }

    /// Set any ConditionValue directly
    pub fn set(&mut self, name: impl Into<String>, value: ConditionValue) {
        self.variables.insert(name.into(), value);
    }

    /// Builder-style variant of [`set`](Self::set)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Looks up a variable
    pub fn get(&self, name: &str) -> Option<&ConditionValue> {
        self.variables.get(name)
    }

    /// Check if the context is empty
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Stable, collision-free encoding of the context
    ///
    /// Returns `None` for an empty context. Two contexts share a fingerprint
    /// only if they bind the same keys to values of the same type and value.
    pub fn fingerprint(&self) -> Option<String> {
        if self.variables.is_empty() {
            return None;
        }
        let mut out = String::new();
        for (key, value) in &self.variables {
            out.push_str(&quote(key));
            out.push('=');
            value.write_canonical(&mut out);
            out.push(';');
        }
        Some(out)
    }
}
