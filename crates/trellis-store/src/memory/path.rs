//! Dotted-path access and value ordering over JSON documents.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Every value reachable at `path`, descending into arrays along the way
/// (`items.productId` on `{items: [{productId: 1}, {productId: 2}]}` yields
/// both ids).
pub(crate) fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(map) = item {
                            next.extend(map.get(segment));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Resolved values with array leaves also contributing their elements, the
/// set a query condition is tested against.
pub(crate) fn candidates<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    for value in resolve(doc, path) {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

/// Value at `path` through objects only.
pub(crate) fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |value, segment| value.as_object()?.get(segment))
}

/// Write `value` at `path`, creating intermediate objects.
pub(crate) fn set(doc: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Remove the field at `path` if it exists.
pub(crate) fn remove(doc: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (get_mut(doc, parent), leaf),
        None => (Some(doc), path),
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(leaf);
    }
}

fn get_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(doc, |value, segment| value.as_object_mut()?.get_mut(segment))
}

/// Copy of `doc` restricted to `path`, keeping the nesting (and descending
/// into arrays of sub-documents).
pub(crate) fn project(doc: &Value, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc
            .as_object()?
            .get(path)
            .map(|v| wrap(path, v.clone())),
        Some((head, rest)) => {
            let child = doc.as_object()?.get(head)?;
            let inner = match child {
                Value::Array(items) => {
                    Value::Array(items.iter().filter_map(|item| project_inner(item, rest)).collect())
                }
                other => project_inner(other, rest)?,
            };
            Some(wrap(head, inner))
        }
    }
}

fn project_inner(value: &Value, rest: &str) -> Option<Value> {
    project(value, rest).and_then(|wrapped| match wrapped {
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map)),
        _ => None,
    })
}

fn wrap(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Deep-merge `addition` into `target`.
pub(crate) fn merge(target: &mut Value, addition: Value) {
    match (target, addition) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                match into.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        into.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(into), Value::Array(from)) if into.len() == from.len() => {
            for (slot, value) in into.iter_mut().zip(from) {
                merge(slot, value);
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Equality with numbers compared by value (`1 == 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order across JSON values: null < numbers < strings < objects <
/// arrays < booleans.
pub(crate) fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Whether two values are of a type that can be range-compared.
pub(crate) fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
    )
}
