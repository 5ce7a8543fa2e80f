//! Pipeline stage vocabulary.
//!
//! A [`Pipeline`] is an ordered list of typed [`Stage`]s. It serializes to the
//! JSON stage documents a document store's aggregation endpoint accepts
//! (`{"$lookup": {...}}`, `{"$unwind": {...}}`, ...), and in-process stores can
//! evaluate the typed stages directly.

use crate::intent::{AccumulatorOp, SortDirection};
use crate::matcher::MatchExpr;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::{json, Map, Value};

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents matching the query object
    Match(MatchExpr),
    /// Left-outer join of `from` where `local_field == foreign_field`,
    /// matches stored as an array under `as_field`
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// One output document per element of the array at `path`
    Unwind {
        path: String,
        preserve_null_and_empty_arrays: bool,
    },
    Sort(Vec<SortKey>),
    /// Inclusion projection, in output order
    Project(Vec<String>),
    Limit(u64),
    Group {
        key: GroupKey,
        accumulators: Vec<Accumulator>,
    },
    /// Replace the stream with one document `{field: n}`
    Count(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub dir: SortDirection,
}

/// Grouping key of a `$group` stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    /// Everything in one group
    All,
    /// `(output name, source path)` pairs
    Fields(Vec<(String, String)>),
}

/// Named accumulator inside a `$group` stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    pub name: String,
    pub op: AccumulatorOp,
    /// Source path; `None` only for `count`
    pub path: Option<String>,
}

impl Accumulator {
    fn to_document(&self) -> Value {
        match (self.op, &self.path) {
            (AccumulatorOp::Count, _) | (_, None) => json!({ "$sum": 1 }),
            (op, Some(path)) => {
                let key = format!("${}", op.as_str());
                json!({ key: field_ref(path) })
            }
        }
    }
}

impl Stage {
    /// Outer-preserving unwind, the only kind the assembler emits.
    pub fn unwind(path: impl Into<String>) -> Self {
        Stage::Unwind {
            path: path.into(),
            preserve_null_and_empty_arrays: true,
        }
    }

    /// Stage operator name, e.g. `$lookup`.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Lookup { .. } => "$lookup",
            Stage::Unwind { .. } => "$unwind",
            Stage::Sort(_) => "$sort",
            Stage::Project(_) => "$project",
            Stage::Limit(_) => "$limit",
            Stage::Group { .. } => "$group",
            Stage::Count(_) => "$count",
        }
    }

    /// The stage as the store's JSON stage document.
    pub fn to_document(&self) -> Value {
        let body = match self {
            Stage::Match(expr) => Value::Object(expr.clone()),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => json!({
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "as": as_field,
            }),
            Stage::Unwind {
                path,
                preserve_null_and_empty_arrays,
            } => json!({
                "path": field_ref(path),
                "preserveNullAndEmptyArrays": preserve_null_and_empty_arrays,
            }),
            Stage::Sort(keys) => Value::Object(
                keys.iter()
                    .map(|k| (k.path.clone(), json!(k.dir.as_order())))
                    .collect(),
            ),
            Stage::Project(paths) => {
                Value::Object(paths.iter().map(|p| (p.clone(), json!(1))).collect())
            }
            Stage::Limit(n) => json!(n),
            Stage::Group { key, accumulators } => {
                let mut group = Map::new();
                let id = match key {
                    GroupKey::All => Value::Null,
                    GroupKey::Fields(fields) => Value::Object(
                        fields
                            .iter()
                            .map(|(name, path)| (name.clone(), field_ref(path)))
                            .collect(),
                    ),
                };
                group.insert("_id".to_string(), id);
                for acc in accumulators {
                    group.insert(acc.name.clone(), acc.to_document());
                }
                Value::Object(group)
            }
            Stage::Count(field) => json!(field),
        };
        json!({ self.name(): body })
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

/// `$path`, the store's syntax for reading a field inside an expression.
fn field_ref(path: &str) -> Value {
    Value::String(format!("${path}"))
}

/// An ordered, immutable-once-built list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every stage rendered as a JSON stage document.
    pub fn to_documents(&self) -> Vec<Value> {
        self.stages.iter().map(Stage::to_document).collect()
    }

    /// Paths of every `$unwind`, in pipeline order.
    pub fn unwound_paths(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Unwind { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

impl Serialize for Pipeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.stages.len()))?;
        for stage in &self.stages {
            seq.serialize_element(stage)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_unwind_documents() {
        let lookup = Stage::Lookup {
            from: "products".to_string(),
            local_field: "items.productId".to_string(),
            foreign_field: "_id".to_string(),
            as_field: "product".to_string(),
        };

        assert_eq!(
            lookup.to_document(),
            json!({"$lookup": {
                "from": "products",
                "localField": "items.productId",
                "foreignField": "_id",
                "as": "product"
            }})
        );
        assert_eq!(
            Stage::unwind("items").to_document(),
            json!({"$unwind": {"path": "$items", "preserveNullAndEmptyArrays": true}})
        );
    }

    #[test]
    fn test_sort_keeps_declared_order() {
        let stage = Stage::Sort(vec![
            SortKey {
                path: "status".to_string(),
                dir: SortDirection::Asc,
            },
            SortKey {
                path: "createdAt".to_string(),
                dir: SortDirection::Desc,
            },
        ]);

        let doc = stage.to_document();
        let keys: Vec<&String> = doc["$sort"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["status", "createdAt"]);
        assert_eq!(doc["$sort"]["createdAt"], json!(-1));
    }

    #[test]
    fn test_group_document() {
        let stage = Stage::Group {
            key: GroupKey::Fields(vec![("product_name".to_string(), "product.name".to_string())]),
            accumulators: vec![
                Accumulator {
                    name: "sum_items_qty".to_string(),
                    op: AccumulatorOp::Sum,
                    path: Some("items.qty".to_string()),
                },
                Accumulator {
                    name: "count".to_string(),
                    op: AccumulatorOp::Count,
                    path: None,
                },
            ],
        };

        assert_eq!(
            stage.to_document(),
            json!({"$group": {
                "_id": {"product_name": "$product.name"},
                "sum_items_qty": {"$sum": "$items.qty"},
                "count": {"$sum": 1}
            }})
        );
    }

    #[test]
    fn test_pipeline_serializes_as_stage_list() {
        let pipeline = Pipeline::from(vec![Stage::Limit(5), Stage::Count("total".to_string())]);

        let value = serde_json::to_value(&pipeline).unwrap();

        assert_eq!(value, json!([{"$limit": 5}, {"$count": "total"}]));
        assert_eq!(pipeline.to_documents(), value.as_array().unwrap().clone());
    }
}
