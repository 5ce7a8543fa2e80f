//! Stage evaluation for the in-memory store.

use super::path;
use crate::error::{StoreError, StoreResult};
use regex::RegexBuilder;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;
use trellis_query::{Accumulator, AccumulatorOp, GroupKey, SortKey, Stage};

static NULL: Value = Value::Null;

/// Apply one stage to the current document stream.
pub(crate) fn apply(
    stage: &Stage,
    docs: Vec<Value>,
    collections: &HashMap<String, Vec<Value>>,
) -> StoreResult<Vec<Value>> {
    match stage {
        Stage::Match(expr) => {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if matches(&doc, expr)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        Stage::Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
        } => {
            let foreign = collections.get(from).map(Vec::as_slice).unwrap_or_default();
            Ok(docs
                .into_iter()
                .map(|doc| lookup(doc, foreign, local_field, foreign_field, as_field))
                .collect())
        }
        Stage::Unwind {
            path,
            preserve_null_and_empty_arrays,
        } => Ok(docs
            .into_iter()
            .flat_map(|doc| unwind(doc, path, *preserve_null_and_empty_arrays))
            .collect()),
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| compare_by(a, b, keys));
            Ok(docs)
        }
        Stage::Project(paths) => Ok(docs.iter().map(|doc| project(doc, paths)).collect()),
        Stage::Limit(n) => {
            let mut docs = docs;
            docs.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
            Ok(docs)
        }
        Stage::Group { key, accumulators } => Ok(group(&docs, key, accumulators)),
        Stage::Count(field) => {
            if docs.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![json!({ field: docs.len() })])
        }
    }
}

fn lookup(
    mut doc: Value,
    foreign: &[Value],
    local_field: &str,
    foreign_field: &str,
    as_field: &str,
) -> Value {
    let local = join_keys(&doc, local_field);
    let joined: Vec<Value> = foreign
        .iter()
        .filter(|candidate| {
            join_keys(candidate, foreign_field)
                .iter()
                .any(|f| local.iter().any(|l| path::values_equal(l, f)))
        })
        .cloned()
        .collect();
    path::set(&mut doc, as_field, Value::Array(joined));
    doc
}

/// Scalar keys at `field`, arrays flattened; a missing field joins as null.
fn join_keys(doc: &Value, field: &str) -> Vec<Value> {
    let mut keys: Vec<Value> = path::resolve(doc, field)
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .collect();
    if keys.is_empty() {
        keys.push(Value::Null);
    }
    keys
}

fn unwind(doc: Value, field: &str, preserve: bool) -> Vec<Value> {
    match path::get(&doc, field) {
        Some(Value::Array(items)) if !items.is_empty() => {
            let items = items.clone();
            items
                .into_iter()
                .map(|item| {
                    let mut row = doc.clone();
                    path::set(&mut row, field, item);
                    row
                })
                .collect()
        }
        Some(Value::Array(_)) => {
            if preserve {
                let mut row = doc;
                path::remove(&mut row, field);
                vec![row]
            } else {
                Vec::new()
            }
        }
        None | Some(Value::Null) => {
            if preserve {
                vec![doc]
            } else {
                Vec::new()
            }
        }
        Some(_) => vec![doc],
    }
}

fn compare_by(a: &Value, b: &Value, keys: &[SortKey]) -> std::cmp::Ordering {
    for key in keys {
        let left = path::resolve(a, &key.path).first().copied().unwrap_or(&NULL);
        let right = path::resolve(b, &key.path).first().copied().unwrap_or(&NULL);
        let ordering = path::compare(left, right);
        let ordering = if key.dir.as_order() < 0 {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering.is_ne() {
            return ordering;
        }
    }
    std::cmp::Ordering::Equal
}

fn project(doc: &Value, paths: &[String]) -> Value {
    let mut out = Value::Object(Map::new());
    if let Some(id) = doc.get("_id") {
        path::set(&mut out, "_id", id.clone());
    }
    for field in paths {
        if let Some(projected) = path::project(doc, field) {
            path::merge(&mut out, projected);
        }
    }
    out
}

fn group(docs: &[Value], key: &GroupKey, accumulators: &[Accumulator]) -> Vec<Value> {
    let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
    for doc in docs {
        let id = match key {
            GroupKey::All => Value::Null,
            GroupKey::Fields(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, field)| (name.clone(), first_value(doc, field)))
                    .collect(),
            ),
        };
        match groups.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, members)) => members.push(doc),
            None => groups.push((id, vec![doc])),
        }
    }

    groups
        .into_iter()
        .map(|(id, members)| {
            let mut row = Map::new();
            row.insert("_id".to_string(), id);
            for acc in accumulators {
                row.insert(acc.name.clone(), accumulate(acc, &members));
            }
            Value::Object(row)
        })
        .collect()
}

fn first_value(doc: &Value, field: &str) -> Value {
    path::resolve(doc, field)
        .first()
        .map(|v| (*v).clone())
        .unwrap_or(Value::Null)
}

fn accumulate(acc: &Accumulator, members: &[&Value]) -> Value {
    let field = match (acc.op, acc.path.as_deref()) {
        (AccumulatorOp::Count, _) | (_, None) => return json!(members.len()),
        (_, Some(field)) => field,
    };
    let values: Vec<Value> = members
        .iter()
        .map(|doc| first_value(doc, field))
        .filter(|v| !v.is_null())
        .collect();

    match acc.op {
        AccumulatorOp::Sum => sum(&values),
        AccumulatorOp::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AccumulatorOp::Min => values
            .into_iter()
            .min_by(path::compare)
            .unwrap_or(Value::Null),
        AccumulatorOp::Max => values
            .into_iter()
            .max_by(path::compare)
            .unwrap_or(Value::Null),
        AccumulatorOp::Count => json!(members.len()),
    }
}

/// Sum of the numeric values; stays integral while every input is and the
/// total fits in an `i64`, otherwise promoted to a double.
fn sum(values: &[Value]) -> Value {
    let numbers: Vec<&Number> = values
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => Some(n),
            _ => None,
        })
        .collect();
    let integral = numbers
        .iter()
        .try_fold(0i64, |total, n| n.as_i64().and_then(|n| total.checked_add(n)));
    match integral {
        Some(total) => json!(total),
        None => float(numbers.iter().filter_map(|n| n.as_f64()).sum()),
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Evaluate a query object against one document.
pub(crate) fn matches(doc: &Value, expr: &Map<String, Value>) -> StoreResult<bool> {
    for (key, condition) in expr {
        let ok = match key.as_str() {
            "$and" => all_clauses(doc, condition, true)?,
            "$or" => all_clauses(doc, condition, false)?,
            op if op.starts_with('$') => {
                return Err(StoreError::invalid_stage("$match", format!("unknown operator {op}")))
            }
            field => field_matches(doc, field, condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses(doc: &Value, clauses: &Value, conjunctive: bool) -> StoreResult<bool> {
    let Some(clauses) = clauses.as_array() else {
        return Err(StoreError::invalid_stage("$match", "logical operator needs an array"));
    };
    for clause in clauses {
        let Some(clause) = clause.as_object() else {
            return Err(StoreError::invalid_stage("$match", "logical clause must be an object"));
        };
        let hit = matches(doc, clause)?;
        if hit != conjunctive {
            return Ok(!conjunctive);
        }
    }
    Ok(conjunctive)
}

fn is_operator_doc(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn field_matches(doc: &Value, field: &str, condition: &Value) -> StoreResult<bool> {
    let found = path::candidates(doc, field);
    let Some(ops) = condition.as_object().filter(|_| is_operator_doc(condition)) else {
        return Ok(equals_any(&found, condition));
    };

    let case_insensitive = ops
        .get("$options")
        .and_then(Value::as_str)
        .is_some_and(|o| o.contains('i'));

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_any(&found, operand),
            "$ne" => !equals_any(&found, operand),
            "$gt" => compares(&found, operand, |o| o.is_gt()),
            "$gte" => compares(&found, operand, |o| o.is_ge()),
            "$lt" => compares(&found, operand, |o| o.is_lt()),
            "$lte" => compares(&found, operand, |o| o.is_le()),
            "$in" => match operand.as_array() {
                Some(options) => options.iter().any(|o| equals_any(&found, o)),
                None => return Err(StoreError::invalid_stage("$match", "$in needs an array")),
            },
            "$nin" => match operand.as_array() {
                Some(options) => !options.iter().any(|o| equals_any(&found, o)),
                None => return Err(StoreError::invalid_stage("$match", "$nin needs an array")),
            },
            "$exists" => operand.as_bool().unwrap_or(true) != found.is_empty(),
            "$regex" => {
                let Some(pattern) = operand.as_str() else {
                    return Err(StoreError::invalid_stage("$match", "$regex needs a string"));
                };
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|e| StoreError::invalid_stage("$match", e.to_string()))?;
                found
                    .iter()
                    .filter_map(|v| v.as_str())
                    .any(|s| regex.is_match(s))
            }
            "$options" => true,
            other => {
                return Err(StoreError::invalid_stage(
                    "$match",
                    format!("unsupported operator {other}"),
                ))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Missing fields equal null.
fn equals_any(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found.iter().any(|v| path::values_equal(v, expected))
}

fn compares(found: &[&Value], operand: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    found
        .iter()
        .filter(|v| path::comparable(v, operand))
        .any(|v| test(path::compare(v, operand)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn expr(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test_case(json!({"status": "READY"}), true; "equality")]
    #[test_case(json!({"tags": "VIP"}), true; "array contains")]
    #[test_case(json!({"status": {"$ne": "READY"}}), false; "not equal")]
    #[test_case(json!({"price": {"$gte": 4500, "$lt": 5000}}), true; "range")]
    #[test_case(json!({"price": {"$gt": "4000"}}), false; "mixed types never compare")]
    #[test_case(json!({"status": {"$in": ["PENDING", "READY"]}}), true; "in")]
    #[test_case(json!({"name": {"$regex": "gateau", "$options": "i"}}), true; "case insensitive regex")]
    #[test_case(json!({"name": {"$regex": "gateau"}}), false; "case sensitive regex")]
    #[test_case(json!({"deliveredAt": null}), true; "missing equals null")]
    #[test_case(json!({"$and": [{"status": "READY"}, {"price": 4500}]}), true; "and")]
    #[test_case(json!({"$or": [{"status": "PENDING"}, {"price": 1}]}), false; "or")]
    fn test_match_semantics(query: Value, expected: bool) {
        let doc = json!({
            "status": "READY",
            "name": "Chocolate Gateau",
            "price": 4500,
            "tags": ["VIP", "CAKE"]
        });
        assert_eq!(matches(&doc, &expr(query)).unwrap(), expected);
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let doc = json!({"qty": 1});
        let result = matches(&doc, &expr(json!({"qty": {"$mod": [2, 0]}})));
        assert!(matches!(result, Err(StoreError::InvalidStage { .. })));
    }

    #[test]
    fn test_unwind_preserves_missing_and_empty() {
        let empty = json!({"_id": 1, "items": []});
        let missing = json!({"_id": 2});

        assert_eq!(unwind(empty.clone(), "items", true), vec![json!({"_id": 1})]);
        assert_eq!(unwind(missing.clone(), "items", true), vec![missing.clone()]);
        assert!(unwind(empty, "items", false).is_empty());
        assert!(unwind(missing, "items", false).is_empty());
    }

    #[test]
    fn test_lookup_matches_any_array_element() {
        let doc = json!({"_id": "O1", "items": [{"productId": "P1"}, {"productId": "P3"}]});
        let products = vec![json!({"_id": "P1"}), json!({"_id": "P2"}), json!({"_id": "P3"})];

        let joined = lookup(doc, &products, "items.productId", "_id", "products");

        assert_eq!(joined["products"], json!([{"_id": "P1"}, {"_id": "P3"}]));
    }

    #[test]
    fn test_group_accumulators() {
        let docs = vec![
            json!({"method": "CARD", "amount": 5100}),
            json!({"method": "CASH", "amount": 8800}),
            json!({"method": "CARD", "amount": 900.5}),
        ];
        let stage = Stage::Group {
            key: GroupKey::Fields(vec![("method".to_string(), "method".to_string())]),
            accumulators: vec![
                Accumulator {
                    name: "sum_amount".to_string(),
                    op: AccumulatorOp::Sum,
                    path: Some("amount".to_string()),
                },
                Accumulator {
                    name: "max_amount".to_string(),
                    op: AccumulatorOp::Max,
                    path: Some("amount".to_string()),
                },
                Accumulator {
                    name: "count".to_string(),
                    op: AccumulatorOp::Count,
                    path: None,
                },
            ],
        };

        let rows = apply(&stage, docs, &HashMap::new()).unwrap();

        assert_eq!(
            rows,
            vec![
                json!({"_id": {"method": "CARD"}, "sum_amount": 6000.5, "max_amount": 5100, "count": 2}),
                json!({"_id": {"method": "CASH"}, "sum_amount": 8800, "max_amount": 8800, "count": 1}),
            ]
        );
    }

    #[test]
    fn test_integer_sum_promotes_to_double_on_overflow() {
        let totals = |amounts: Vec<Value>| {
            let docs = amounts.into_iter().map(|a| json!({"amount": a})).collect();
            let stage = Stage::Group {
                key: GroupKey::All,
                accumulators: vec![Accumulator {
                    name: "sum".to_string(),
                    op: AccumulatorOp::Sum,
                    path: Some("amount".to_string()),
                }],
            };
            apply(&stage, docs, &HashMap::new()).unwrap()[0]["sum"].clone()
        };

        let overflowed = totals(vec![json!(i64::MAX), json!(1)]);
        assert!(overflowed.is_f64());
        assert_eq!(overflowed.as_f64(), Some(i64::MAX as f64 + 1.0));

        assert_eq!(totals(vec![json!(i64::MAX - 1), json!(1)]), json!(i64::MAX));
    }

    #[test]
    fn test_count_of_nothing_is_no_row() {
        let rows = apply(&Stage::Count("total".to_string()), Vec::new(), &HashMap::new()).unwrap();
        assert!(rows.is_empty());
    }
}
