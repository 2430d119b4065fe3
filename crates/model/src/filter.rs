//! Filter matching and update application for the in-memory collection.
//!
//! Supported filter forms: field equality (array fields match when any
//! element is equal), `$eq $ne $in $nin $exists $gt $gte $lt $lte` operator
//! objects, and top-level `$and` / `$or` lists. Field names may use dotted
//! paths into nested objects.

use std::cmp::Ordering;

use docgate_core_types::{is_truthy, Document, ID_FIELD};
use serde_json::{Map, Value};

use crate::errors::ModelError;
use crate::pending::{normalize_modify, UpdatePayload};

pub fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_filters(condition).is_some_and(|mut all| all.all(|f| matches(document, f))),
        "$or" => sub_filters(condition).is_some_and(|mut any| any.any(|f| matches(document, f))),
        field => field_matches(lookup(document, field), condition),
    })
}

fn sub_filters(condition: &Value) -> Option<impl Iterator<Item = &Document>> {
    let list = condition.as_array()?;
    if list.iter().any(|entry| !entry.is_object()) {
        return None;
    }
    Some(list.iter().filter_map(Value::as_object))
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn field_matches(value: Option<&Value>, condition: &Value) -> bool {
    match condition {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|key| key.starts_with('$')) => ops
            .iter()
            .all(|(op, argument)| operator_matches(value, op, argument)),
        expected => equals(value, expected),
    }
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
        None => expected.is_null(),
    }
}

fn operator_matches(value: Option<&Value>, op: &str, argument: &Value) -> bool {
    match op {
        "$eq" => equals(value, argument),
        "$ne" => !equals(value, argument),
        "$in" => argument
            .as_array()
            .is_some_and(|options| options.iter().any(|option| equals(value, option))),
        "$nin" => argument
            .as_array()
            .is_some_and(|options| !options.iter().any(|option| equals(value, option))),
        "$exists" => value.is_some() == is_truthy(argument),
        "$gt" => compare(value, argument) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(value, argument),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(value, argument) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(value, argument),
            Some(Ordering::Less | Ordering::Equal)
        ),
        _ => false,
    }
}

fn compare(value: Option<&Value>, argument: &Value) -> Option<Ordering> {
    match (value?, argument) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// Apply `payload` to `document`, returning whether anything changed.
pub fn apply_update(document: &mut Document, payload: &UpdatePayload) -> Result<bool, ModelError> {
    match payload {
        UpdatePayload::Replace(replacement) => {
            let mut next = replacement.clone();
            if let Some(id) = document.get(ID_FIELD) {
                next.insert(ID_FIELD.to_string(), id.clone());
            }
            let changed = next != *document;
            *document = next;
            Ok(changed)
        }
        UpdatePayload::Modify(update) => {
            let before = document.clone();
            for (op, arguments) in normalize_modify(update.clone()) {
                let Value::Object(arguments) = arguments else {
                    return Err(ModelError::InvalidUpdate(format!(
                        "{op} expects an object of fields"
                    )));
                };
                apply_operator(document, &op, arguments)?;
            }
            Ok(before != *document)
        }
    }
}

fn apply_operator(
    document: &mut Document,
    op: &str,
    arguments: Map<String, Value>,
) -> Result<(), ModelError> {
    match op {
        "$set" => {
            for (field, value) in arguments {
                if field == ID_FIELD {
                    continue;
                }
                document.insert(field, value);
            }
        }
        "$unset" => {
            for field in arguments.keys() {
                document.remove(field);
            }
        }
        "$inc" => {
            for (field, delta) in arguments {
                let Some(delta) = delta.as_f64() else {
                    return Err(ModelError::InvalidUpdate(format!(
                        "$inc on {field} expects a number"
                    )));
                };
                let next = match document.get(&field) {
                    None | Some(Value::Null) => delta,
                    Some(Value::Number(current)) => current.as_f64().unwrap_or_default() + delta,
                    Some(_) => {
                        return Err(ModelError::InvalidUpdate(format!(
                            "$inc on non-numeric field {field}"
                        )))
                    }
                };
                document.insert(field, number_value(next));
            }
        }
        other => {
            return Err(ModelError::InvalidUpdate(format!(
                "unsupported update operator {other}"
            )))
        }
    }
    Ok(())
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
