//! Filter compilation.
//!
//! Renders intent filters as one conjunctive query object in the document
//! store's vocabulary. Logical paths that pass through a flattened array are
//! rewritten to the field the joined document occupies after the flatten
//! (`items.product.name` becomes `product.name`).

use crate::error::CompileError;
use crate::intent::{Filter, FilterOp};
use crate::paths::has_segment_prefix;
use crate::recipe::JoinRecipe;
use serde_json::{json, Map, Value};
use std::borrow::Cow;

/// Query object keyed by physical path.
pub type MatchExpr = Map<String, Value>;

/// Logical → physical path rewrites derived from join recipes.
///
/// Rules are kept longest logical prefix first so the most specific rewrite
/// wins; prefixes only match on whole segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRewriter {
    rules: Vec<(String, String)>,
}

impl PathRewriter {
    pub fn from_recipes(recipes: &[JoinRecipe]) -> Self {
        let mut rules: Vec<(String, String)> = recipes
            .iter()
            .filter(|r| r.is_rewritten())
            .map(|r| (r.logical_path.clone(), r.target_path.clone()))
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { rules }
    }

    /// Rewrite the longest matching logical prefix of `path`.
    pub fn rewrite<'a>(&self, path: &'a str) -> Cow<'a, str> {
        for (logical, physical) in &self.rules {
            if has_segment_prefix(path, logical) {
                return Cow::Owned(format!("{}{}", physical, &path[logical.len()..]));
            }
        }
        Cow::Borrowed(path)
    }

    /// Whether `path` lies under any rewritten logical prefix.
    pub fn covers(&self, path: &str) -> bool {
        self.rules
            .iter()
            .any(|(logical, _)| has_segment_prefix(path, logical))
    }
}

/// Compiles filters against a fixed set of recipes.
#[derive(Debug, Clone)]
pub struct MatchCompiler {
    rewriter: PathRewriter,
}

impl MatchCompiler {
    pub fn new(recipes: &[JoinRecipe]) -> Self {
        Self {
            rewriter: PathRewriter::from_recipes(recipes),
        }
    }

    pub fn rewriter(&self) -> &PathRewriter {
        &self.rewriter
    }

    /// AND every filter into one query object.
    pub fn compile(&self, filters: &[Filter]) -> Result<MatchExpr, CompileError> {
        let mut expr = MatchExpr::new();
        for filter in filters {
            let path = self.rewriter.rewrite(&filter.path_hint).into_owned();
            let condition = condition(filter)?;
            insert_condition(&mut expr, path, condition);
        }
        Ok(expr)
    }
}

/// `compile(filters, recipes)` in one call.
pub fn compile_match(filters: &[Filter], recipes: &[JoinRecipe]) -> Result<MatchExpr, CompileError> {
    MatchCompiler::new(recipes).compile(filters)
}

fn condition(filter: &Filter) -> Result<Value, CompileError> {
    let value = &filter.value;
    match &filter.op {
        FilterOp::Eq => {
            require(filter, !value.is_object(), "requires a scalar or sequence")?;
            Ok(value.clone())
        }
        FilterOp::Neq => {
            require(filter, !value.is_object(), "requires a scalar or sequence")?;
            Ok(json!({ "$ne": value }))
        }
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            require(filter, is_scalar(value), "requires a scalar")?;
            let op = format!("${}", filter.op.as_str());
            Ok(json!({ op: value }))
        }
        FilterOp::In => {
            let is_scalar_list = value
                .as_array()
                .is_some_and(|items| items.iter().all(is_scalar));
            require(filter, is_scalar_list, "requires a sequence of scalars")?;
            Ok(json!({ "$in": value }))
        }
        FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
            let Some(text) = value.as_str() else {
                return Err(incompatible(filter, "requires a string"));
            };
            let escaped = regex::escape(text);
            let pattern = match filter.op {
                FilterOp::StartsWith => format!("^{escaped}"),
                FilterOp::EndsWith => format!("{escaped}$"),
                _ => escaped,
            };
            Ok(json!({ "$regex": pattern, "$options": "i" }))
        }
        FilterOp::Unsupported(op) => Err(CompileError::UnsupportedOperator {
            op: op.clone(),
            path: filter.path_hint.clone(),
        }),
    }
}

fn is_scalar(value: &Value) -> bool {
    !(value.is_array() || value.is_object())
}

fn require(filter: &Filter, ok: bool, expected: &'static str) -> Result<(), CompileError> {
    if ok {
        Ok(())
    } else {
        Err(incompatible(filter, expected))
    }
}

fn incompatible(filter: &Filter, expected: &'static str) -> CompileError {
    let found = match &filter.value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "an object",
    };
    CompileError::IncompatibleValue {
        op: filter.op.to_string(),
        path: filter.path_hint.clone(),
        expected,
        found: found.to_string(),
    }
}

fn is_operator_doc(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

/// Add `path: condition` without losing an existing condition on the same path.
fn insert_condition(expr: &mut MatchExpr, path: String, condition: Value) {
    let Some(existing) = expr.get_mut(&path) else {
        expr.insert(path, condition);
        return;
    };

    if is_operator_doc(existing) && is_operator_doc(&condition) {
        if let (Some(target), Value::Object(extra)) = (existing.as_object_mut(), &condition) {
            if extra.keys().all(|k| !target.contains_key(k)) {
                target.extend(extra.clone());
                return;
            }
        }
    }

    let clause = json!({ path: condition });
    match expr.get_mut("$and").and_then(Value::as_array_mut) {
        Some(clauses) => clauses.push(clause),
        None => {
            expr.insert("$and".to_string(), Value::Array(vec![clause]));
        }
    }
}
