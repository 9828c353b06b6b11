//! Subscription filter expressions evaluated against an event payload

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// How a subscription combines its top-level filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterJoin {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    Exists,
}

/// A filter tree: condition leaves combined by AND/OR nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterExpr {
    Condition {
        /// Dot-separated path into the payload
        field: String,
        operator: FilterOperator,
        #[serde(default)]
        value: Value,
    },
    And {
        filters: Vec<FilterExpr>,
    },
    Or {
        filters: Vec<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn evaluate(&self, payload: &Value) -> bool {
        match self {
            FilterExpr::Condition {
                field,
                operator,
                value,
            } => evaluate_condition(lookup(payload, field), *operator, value),
            FilterExpr::And { filters } => filters.iter().all(|f| f.evaluate(payload)),
            FilterExpr::Or { filters } => filters.iter().any(|f| f.evaluate(payload)),
        }
    }
}

/// Evaluate a subscription's filter list. An empty list always passes.
pub fn evaluate_filters(join: FilterJoin, filters: &[FilterExpr], payload: &Value) -> bool {
    if filters.is_empty() {
        return true;
    }
    match join {
        FilterJoin::And => filters.iter().all(|f| f.evaluate(payload)),
        FilterJoin::Or => filters.iter().any(|f| f.evaluate(payload)),
    }
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn evaluate_condition(actual: Option<&Value>, operator: FilterOperator, expected: &Value) -> bool {
    match (operator, actual) {
        (FilterOperator::Exists, actual) => {
            let wanted = expected.as_bool().unwrap_or(true);
            actual.is_some_and(|v| !v.is_null()) == wanted
        }
        (FilterOperator::Ne, None) => true,
        (_, None) => false,
        (FilterOperator::Eq, Some(actual)) => values_equal(actual, expected),
        (FilterOperator::Ne, Some(actual)) => !values_equal(actual, expected),
        (FilterOperator::Gt, Some(actual)) => compare(actual, expected).is_some_and(|o| o.is_gt()),
        (FilterOperator::Gte, Some(actual)) => compare(actual, expected).is_some_and(|o| o.is_ge()),
        (FilterOperator::Lt, Some(actual)) => compare(actual, expected).is_some_and(|o| o.is_lt()),
        (FilterOperator::Lte, Some(actual)) => compare(actual, expected).is_some_and(|o| o.is_le()),
        (FilterOperator::In, Some(actual)) => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
        (FilterOperator::Contains, Some(actual)) => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        _ => None,
    }
}

/// Integers compare exactly; f64 only when either side is fractional.
fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (integer(a), integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}
