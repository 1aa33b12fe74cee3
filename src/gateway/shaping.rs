//! Views over a cached device dump
//!
//! A dump payload holds a `VALUE` array of parameter records
//! (`A` id, `N` label, `V` value, `U` unit) and an `EXTRA` object.

use serde::Serialize;
use serde_json::Value;

/// One device parameter as served over HTTP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub id: Value,
    pub label: Value,
    pub value: Value,
    pub unit: Value,
}

/// Parameter id and label only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterName {
    pub id: Value,
    pub label: Value,
}

/// Parse an `id=293,274` filter. Entries that are not integers are ignored.
pub fn parse_id_filter(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Records carrying an id and a non-empty label
fn labelled_records(payload: &Value) -> impl Iterator<Item = &Value> {
    payload
        .get("VALUE")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.get("A").is_some() && item.get("N").is_some_and(is_truthy))
}

fn field(item: &Value, name: &str) -> Value {
    item.get(name).cloned().unwrap_or(Value::Null)
}

/// Full parameter list, optionally restricted to the given ids
pub fn parameters(payload: &Value, ids: Option<&[i64]>) -> Vec<Parameter> {
    labelled_records(payload)
        .filter(|item| match ids {
            Some(ids) => item
                .get("A")
                .and_then(numeric_id)
                .is_some_and(|id| ids.contains(&id)),
            None => true,
        })
        .map(|item| Parameter {
            id: field(item, "A"),
            label: field(item, "N"),
            value: field(item, "V"),
            unit: field(item, "U"),
        })
        .collect()
}

pub fn parameter_names(payload: &Value) -> Vec<ParameterName> {
    labelled_records(payload)
        .map(|item| ParameterName {
            id: field(item, "A"),
            label: field(item, "N"),
        })
        .collect()
}

fn extra(payload: &Value, name: &str) -> Value {
    payload
        .get("EXTRA")
        .and_then(|extra| extra.get(name))
        .filter(|v| is_truthy(v))
        .cloned()
        .unwrap_or(Value::Null)
}

/// `EXTRA.Alarm`, or null
pub fn alarm(payload: &Value) -> Value {
    extra(payload, "Alarm")
}

/// `EXTRA.Leds`, or null
pub fn leds(payload: &Value) -> Value {
    extra(payload, "Leds")
}
