//! Evaluation of template-declared targeting conditions against a lead
//! snapshot. Every operator fails closed: a malformed operand or an
//! unresolvable comparison yields `false`, never an error.

use nurture_core::types::{Condition, ConditionOperator, LeadCharacteristics};
use serde_json::Value;
use tracing::debug;

/// Resolve a condition variable name to a lead attribute value.
///
/// Accepts both the canonical field names and the short aliases template
/// authors tend to write. `None` means the variable is unresolved on this
/// lead, which only `not_exists` treats as a match.
pub fn resolve_variable(lead: &LeadCharacteristics, name: &str) -> Option<Value> {
    if let Some(value) = lead.attribute(name) {
        return Some(value);
    }
    match name {
        "urgency" => lead.attribute("urgency_level"),
        "score" => lead.attribute("lead_score"),
        "stage" => lead.attribute("lead_stage"),
        "channel" => lead.attribute("preferred_channel"),
        "content_type" => lead.attribute("preferred_content_type"),
        "days_since_contact" => lead.attribute("days_since_last_contact"),
        "budget" => lead.attribute("budget_range"),
        "budget_min" => lead.budget_range.as_ref().map(|b| Value::from(b.min)),
        "budget_max" => lead.budget_range.as_ref().map(|b| Value::from(b.max)),
        _ => None,
    }
}

/// Evaluate one condition against the lead. Pure; no side effects beyond
/// a debug log when an operand is malformed.
///
/// Unlike `str::contains`, a `contains` condition with an empty-string
/// operand is treated as malformed and fails closed (`not_contains` on
/// an empty operand therefore matches).
pub fn evaluate(condition: &Condition, lead: &LeadCharacteristics) -> bool {
    let actual = match resolve_variable(lead, &condition.variable) {
        Some(value) => value,
        None => return condition.operator == ConditionOperator::NotExists,
    };

    match condition.operator {
        ConditionOperator::Exists => true,
        ConditionOperator::NotExists => false,
        ConditionOperator::Equals => values_equal(&actual, &condition.value),
        ConditionOperator::NotEquals => !values_equal(&actual, &condition.value),
        ConditionOperator::Contains => contains(&actual, &condition.value),
        ConditionOperator::NotContains => !contains(&actual, &condition.value),
        ConditionOperator::GreaterThan => {
            numeric_pair(&actual, &condition.value, condition).is_some_and(|(a, e)| a > e)
        }
        ConditionOperator::LessThan => {
            numeric_pair(&actual, &condition.value, condition).is_some_and(|(a, e)| a < e)
        }
        ConditionOperator::Between => between(&actual, condition),
        ConditionOperator::In => membership(&actual, condition).unwrap_or(false),
        ConditionOperator::NotIn => membership(&actual, condition).map(|m| !m).unwrap_or(false),
    }
}

/// Strict equality, except numbers compare as f64 so integer and float
/// spellings of the same operand (85 vs 85.0) match.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Case-insensitive substring test on the string representations.
fn contains(actual: &Value, expected: &Value) -> bool {
    let haystack = value_to_string(actual).to_lowercase();
    let needle = value_to_string(expected).to_lowercase();
    !needle.is_empty() && haystack.contains(&needle)
}

fn numeric_pair(actual: &Value, expected: &Value, condition: &Condition) -> Option<(f64, f64)> {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => Some((a, e)),
        _ => {
            debug!(
                variable = %condition.variable,
                operator = ?condition.operator,
                "non-numeric operand for numeric comparison, failing closed"
            );
            None
        }
    }
}

/// Inclusive range test; operand must be a two-element [min, max] array.
fn between(actual: &Value, condition: &Condition) -> bool {
    let bounds = condition.value.as_array().and_then(|arr| {
        if arr.len() != 2 {
            return None;
        }
        Some((arr[0].as_f64()?, arr[1].as_f64()?))
    });
    match (actual.as_f64(), bounds) {
        (Some(a), Some((min, max))) => a >= min && a <= max,
        _ => {
            debug!(
                variable = %condition.variable,
                "between operand is not a numeric [min, max] pair, failing closed"
            );
            false
        }
    }
}

/// Collection membership; `None` when the operand is not an array.
fn membership(actual: &Value, condition: &Condition) -> Option<bool> {
    match condition.value.as_array() {
        Some(list) => Some(list.iter().any(|item| values_equal(actual, item))),
        None => {
            debug!(
                variable = %condition.variable,
                operator = ?condition.operator,
                "membership operand is not an array, failing closed"
            );
            None
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
