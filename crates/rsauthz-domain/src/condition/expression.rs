//! Condition predicates and their evaluation

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::context::{ConditionContext, ConditionValue};
use super::{ConditionError, ConditionResult};

/// A comparison operator usable in an operator object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// Parses the `$`-prefixed operator name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "$eq" => Some(Operator::Eq),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            _ => None,
        }
    }

    /// The operator as written in a condition document
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The constraint placed on one context key
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Plain literal: exact, type-strict equality
    Equals(ConditionValue),
    /// Operator object: every comparison must hold
    Compare(Vec<(Operator, ConditionValue)>),
}

impl Predicate {
    fn from_json(key: &str, value: &serde_json::Value) -> ConditionResult<Self> {
        if let Some(literal) = ConditionValue::from_json(value) {
            return Ok(Predicate::Equals(literal));
        }

        let object = value
            .as_object()
            .ok_or_else(|| ConditionError::InvalidExpression {
                key: key.to_string(),
                message: "expected a literal or an operator object".to_string(),
            })?;
        if object.is_empty() {
            return Err(ConditionError::InvalidExpression {
                key: key.to_string(),
                message: "operator object cannot be empty".to_string(),
            });
        }

        let mut comparisons = Vec::with_capacity(object.len());
        for (name, operand) in object {
            let operator = Operator::parse(name).ok_or_else(|| ConditionError::UnknownOperator {
                key: key.to_string(),
                operator: name.clone(),
            })?;
            let operand =
                ConditionValue::from_json(operand).ok_or_else(|| ConditionError::InvalidExpression {
                    key: key.to_string(),
                    message: format!("operand of {operator} must be a scalar"),
                })?;
            comparisons.push((operator, operand));
        }
        comparisons.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Predicate::Compare(comparisons))
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Predicate::Equals(value) => value.to_json(),
            Predicate::Compare(comparisons) => serde_json::Value::Object(
                comparisons
                    .iter()
                    .map(|(op, value)| (op.as_str().to_string(), value.to_json()))
                    .collect(),
            ),
        }
    }

    fn evaluate(&self, key: &str, actual: &ConditionValue) -> ConditionResult<bool> {
        match self {
            Predicate::Equals(expected) => Ok(strict_equals(actual, expected)),
            Predicate::Compare(comparisons) => {
                for (operator, operand) in comparisons {
                    let ordering = compare(key, *operator, actual, operand)?;
                    if !operator.accepts(ordering) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Type-strict equality used for plain literals.
fn strict_equals(actual: &ConditionValue, expected: &ConditionValue) -> bool {
    match (actual, expected) {
        (ConditionValue::Null, ConditionValue::Null) => true,
        (ConditionValue::Bool(a), ConditionValue::Bool(b)) => a == b,
        (ConditionValue::Int(a), ConditionValue::Int(b)) => a == b,
        (ConditionValue::Float(a), ConditionValue::Float(b)) => a == b,
        (ConditionValue::String(a), ConditionValue::String(b)) => a == b,
        _ => false,
    }
}

/// Orders an int against a float exactly, without rounding the int.
///
/// `None` when the float is NaN.
fn cmp_int_float(int: i64, float: f64) -> Option<Ordering> {
    // i64::MIN is -2^63 and exactly representable; 2^63 is just above i64::MAX.
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return None;
    }
    if float >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if float < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }

    let whole = float.trunc();
    // In range and integral, so the cast is exact.
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)),
        unequal => Some(unequal),
    }
}

/// Orders two values under an operator, or reports that they are incomparable.
///
/// Numbers compare numerically (ints and floats together), strings
/// lexicographically. Bools and null only support `$eq` against their own type.
fn compare(
    key: &str,
    operator: Operator,
    actual: &ConditionValue,
    operand: &ConditionValue,
) -> ConditionResult<Ordering> {
    let ordering = match (actual, operand) {
        (ConditionValue::Int(a), ConditionValue::Int(b)) => Some(a.cmp(b)),
        (ConditionValue::Int(a), ConditionValue::Float(b)) => cmp_int_float(*a, *b),
        (ConditionValue::Float(a), ConditionValue::Int(b)) => {
            cmp_int_float(*b, *a).map(Ordering::reverse)
        }
        (ConditionValue::Float(a), ConditionValue::Float(b)) => a.partial_cmp(b),
        (ConditionValue::String(a), ConditionValue::String(b)) => Some(a.cmp(b)),
        (ConditionValue::Bool(a), ConditionValue::Bool(b)) if operator == Operator::Eq => {
            Some(a.cmp(b))
        }
        (ConditionValue::Null, ConditionValue::Null) if operator == Operator::Eq => {
            Some(Ordering::Equal)
        }
        _ => None,
    };

    ordering.ok_or_else(|| ConditionError::IncomparableTypes {
        key: key.to_string(),
        operator: operator.to_string(),
        left: actual.type_name().to_string(),
        right: operand.type_name().to_string(),
    })
}

/// A conjunction of per-key predicates attached to a grant
///
/// Parsed from a JSON object such as
/// `{"department": "finance", "amount": {"$lte": 1000}}`.
/// An empty set of conditions imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Conditions {
    predicates: BTreeMap<String, Predicate>,
}

impl Conditions {
    /// Parses a condition document
    ///
    /// `null` and `{}` both mean "no conditions".
    pub fn from_json(value: &serde_json::Value) -> ConditionResult<Self> {
        let object = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(object) => object,
            _ => {
                return Err(ConditionError::InvalidExpression {
                    key: String::new(),
                    message: "conditions must be a JSON object".to_string(),
                })
            }
        };

        let mut predicates = BTreeMap::new();
        for (key, value) in object {
            predicates.insert(key.clone(), Predicate::from_json(key, value)?);
        }
        Ok(Self { predicates })
    }

    /// Adds a plain-literal equality constraint
    pub fn with_equals(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.predicates
            .insert(key.into(), Predicate::Equals(value.into()));
        self
    }

    /// Adds an operator comparison, merging with existing comparisons on the key
    pub fn with_comparison(
        mut self,
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<ConditionValue>,
    ) -> Self {
        let value = value.into();
        let entry = self
            .predicates
            .entry(key.into())
            .or_insert_with(|| Predicate::Compare(Vec::new()));
        match entry {
            Predicate::Compare(comparisons) => {
                comparisons.push((operator, value));
                comparisons.sort_by(|a, b| a.0.cmp(&b.0));
            }
            other => *other = Predicate::Compare(vec![(operator, value)]),
        }
        self
    }

    /// Check if there are no constraints
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The context keys these conditions require
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    /// Evaluates the conditions against a request context
    ///
    /// A key missing from the context makes the whole predicate false before
    /// any comparison runs, so missing context never produces an error.
    pub fn evaluate(&self, context: &ConditionContext) -> ConditionResult<bool> {
        if self.keys().any(|key| context.get(key).is_none()) {
            return Ok(false);
        }

        for (key, predicate) in &self.predicates {
            let Some(actual) = context.get(key) else {
                return Ok(false);
            };
            if !predicate.evaluate(key, actual)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl TryFrom<serde_json::Value> for Conditions {
    type Error = ConditionError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Conditions::from_json(&value)
    }
}

impl From<Conditions> for serde_json::Value {
    fn from(conditions: Conditions) -> Self {
        serde_json::Value::Object(
            conditions
                .predicates
                .iter()
                .map(|(key, predicate)| (key.clone(), predicate.to_json()))
                .collect(),
        )
    }
}

/// Evaluates `conditions` against `context`
///
/// Free-function form of [`Conditions::evaluate`].
pub fn evaluate(conditions: &Conditions, context: &ConditionContext) -> ConditionResult<bool> {
    conditions.evaluate(context)
}
