//! Pipeline assembly.
//!
//! Stage order is fixed: pre-join `$match`, then one `$lookup`/`$unwind` group
//! per recipe, then post-join `$match`, then either sort/project/limit or the
//! aggregation stages. Filters that only touch root fields are pushed ahead of
//! every join; everything that reads joined data waits until the joins ran.
//! A root filter under an array that gets flattened runs on both sides: before
//! the joins it keeps documents with at least one matching element, after the
//! flatten it drops the elements that do not match.

use crate::error::CompileError;
use crate::intent::{AccumulatorOp, Aggregation, Filter, GroupAccumulator, Intent};
use crate::matcher::{MatchCompiler, PathRewriter};
use crate::paths::has_segment_prefix;
use crate::pipeline::{Accumulator, GroupKey, Pipeline, SortKey, Stage};
use crate::recipe::{JoinKind, JoinRecipe};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Field a `count` aggregation writes its result to.
pub const COUNT_FIELD: &str = "total";

/// Build the pipeline for `intent` over already-resolved `recipes`.
///
/// `recipes` must be in resolver order: a recipe that reads a joined field
/// comes after the recipe that joined it. Each array is flattened at most once
/// even when several embedded joins hang off it.
pub fn assemble(intent: &Intent, recipes: &[JoinRecipe]) -> Result<Pipeline, CompileError> {
    check_recipes(recipes)?;

    let matcher = MatchCompiler::new(recipes);
    let partition = FilterPartition::new(recipes, matcher.rewriter());
    let mut pre: Vec<Filter> = Vec::new();
    let mut post: Vec<Filter> = Vec::new();
    for filter in &intent.filters {
        if partition.is_post_join(&filter.path_hint) {
            post.push(filter.clone());
            continue;
        }
        if partition.is_under_flattened_array(&filter.path_hint) {
            post.push(filter.clone());
        }
        pre.push(filter.clone());
    }
    debug!(pre = pre.len(), post = post.len(), "partitioned filters");

    let mut pipeline = Pipeline::new();

    if !pre.is_empty() {
        pipeline.push(Stage::Match(matcher.compile(&pre)?));
    }

    let mut flattened: HashSet<&str> = HashSet::new();
    for recipe in recipes {
        if recipe.kind == JoinKind::Embedded {
            if let Some(array_path) = recipe.array_path.as_deref() {
                if flattened.insert(array_path) {
                    pipeline.push(Stage::unwind(array_path));
                }
            }
        }
        pipeline.push(Stage::Lookup {
            from: recipe.dst_collection.clone(),
            local_field: recipe.effective_local_field().to_string(),
            foreign_field: recipe.foreign_field.clone(),
            as_field: recipe.target_path.clone(),
        });
        pipeline.push(Stage::unwind(recipe.target_path.clone()));
    }

    if !post.is_empty() {
        pipeline.push(Stage::Match(matcher.compile(&post)?));
    }

    let rewriter = matcher.rewriter();
    match &intent.aggregation {
        None => {
            if !intent.sort.is_empty() {
                pipeline.push(Stage::Sort(
                    intent
                        .sort
                        .iter()
                        .map(|s| SortKey {
                            path: rewriter.rewrite(&s.path_hint).into_owned(),
                            dir: s.dir,
                        })
                        .collect(),
                ));
            }
            let projection = projection(&intent.select, rewriter);
            if !projection.is_empty() {
                pipeline.push(Stage::Project(projection));
            }
            if let Some(limit) = intent.limit {
                pipeline.push(Stage::Limit(limit.get()));
            }
        }
        Some(Aggregation::Count) => pipeline.push(Stage::Count(COUNT_FIELD.to_string())),
        Some(Aggregation::Sum { field })
        | Some(Aggregation::Avg { field })
        | Some(Aggregation::Min { field })
        | Some(Aggregation::Max { field }) => {
            let op = match &intent.aggregation {
                Some(Aggregation::Sum { .. }) => AccumulatorOp::Sum,
                Some(Aggregation::Avg { .. }) => AccumulatorOp::Avg,
                Some(Aggregation::Min { .. }) => AccumulatorOp::Min,
                _ => AccumulatorOp::Max,
            };
            pipeline.push(Stage::Group {
                key: GroupKey::All,
                accumulators: vec![Accumulator {
                    name: op.as_str().to_string(),
                    op,
                    path: Some(rewriter.rewrite(field).into_owned()),
                }],
            });
        }
        Some(Aggregation::Group { by, accumulators }) => {
            let mut key_names = OutputNames::default();
            let mut fields = Vec::with_capacity(by.len());
            for path in by {
                let physical = rewriter.rewrite(path).into_owned();
                let name = output_name(&physical);
                if key_names.claim(&name, &physical)? {
                    fields.push((name, physical));
                }
            }

            let mut acc_names = OutputNames::default();
            let mut outputs = Vec::with_capacity(accumulators.len().max(1));
            let requested = if accumulators.is_empty() {
                vec![count_accumulator()]
            } else {
                accumulators
                    .iter()
                    .map(|acc| group_accumulator(acc, rewriter))
                    .collect()
            };
            for acc in requested {
                let source = match &acc.path {
                    Some(path) => format!("{}({})", acc.op.as_str(), path),
                    None => acc.op.as_str().to_string(),
                };
                if acc_names.claim(&acc.name, &source)? {
                    outputs.push(acc);
                }
            }

            pipeline.push(Stage::Group {
                key: GroupKey::Fields(fields),
                accumulators: outputs,
            });
            if let Some(limit) = intent.limit {
                pipeline.push(Stage::Limit(limit.get()));
            }
        }
    }

    debug!(stages = pipeline.len(), "assembled pipeline");
    Ok(pipeline)
}

/// Decides which filters must wait for the joins.
struct FilterPartition<'a> {
    aliases: HashSet<&'a str>,
    target_heads: HashSet<&'a str>,
    array_paths: HashSet<&'a str>,
    rewriter: &'a PathRewriter,
}

impl<'a> FilterPartition<'a> {
    fn new(recipes: &'a [JoinRecipe], rewriter: &'a PathRewriter) -> Self {
        Self {
            aliases: recipes.iter().map(|r| r.alias.as_str()).collect(),
            target_heads: recipes.iter().map(|r| first_segment(&r.target_path)).collect(),
            array_paths: recipes
                .iter()
                .filter(|r| r.kind == JoinKind::Embedded)
                .filter_map(|r| r.array_path.as_deref())
                .collect(),
            rewriter,
        }
    }

    fn is_post_join(&self, path: &str) -> bool {
        let head = first_segment(path);
        self.aliases.contains(head) || self.target_heads.contains(head) || self.rewriter.covers(path)
    }

    /// Whether `path` reads inside an array the joins will unwind.
    fn is_under_flattened_array(&self, path: &str) -> bool {
        self.array_paths
            .iter()
            .any(|array| path != *array && has_segment_prefix(path, array))
    }
}

fn first_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Rewritten select paths, order kept, dropping repeats and paths already
/// covered by a selected ancestor.
fn projection(select: &[String], rewriter: &PathRewriter) -> Vec<String> {
    let rewritten: Vec<String> = select
        .iter()
        .map(|p| rewriter.rewrite(p).into_owned())
        .collect();
    let mut out: Vec<String> = Vec::with_capacity(rewritten.len());
    for path in &rewritten {
        let covered = rewritten
            .iter()
            .any(|other| other != path && has_segment_prefix(path, other));
        if !covered && !out.contains(path) {
            out.push(path.clone());
        }
    }
    out
}

fn output_name(path: &str) -> String {
    path.replace('.', "_")
}

/// Output field names of one `$group`, each owned by exactly one source.
#[derive(Default)]
struct OutputNames {
    owners: HashMap<String, String>,
}

impl OutputNames {
    /// Returns false when `source` already owns `name`; a different owner is
    /// a clash (`a.b` and `a_b` both flatten to `a_b`).
    fn claim(&mut self, name: &str, source: &str) -> Result<bool, CompileError> {
        match self.owners.get(name) {
            Some(owner) if owner == source => Ok(false),
            Some(owner) => Err(CompileError::OutputNameClash {
                name: name.to_string(),
                first: owner.clone(),
                second: source.to_string(),
            }),
            None => {
                self.owners.insert(name.to_string(), source.to_string());
                Ok(true)
            }
        }
    }
}

fn count_accumulator() -> Accumulator {
    Accumulator {
        name: AccumulatorOp::Count.as_str().to_string(),
        op: AccumulatorOp::Count,
        path: None,
    }
}

fn group_accumulator(acc: &GroupAccumulator, rewriter: &PathRewriter) -> Accumulator {
    match (&acc.op, &acc.field) {
        (AccumulatorOp::Count, _) | (_, None) => count_accumulator(),
        (op, Some(field)) => {
            let physical = rewriter.rewrite(field).into_owned();
            Accumulator {
                name: format!("{}_{}", op.as_str(), output_name(&physical)),
                op: *op,
                path: Some(physical),
            }
        }
    }
}

/// Reject recipe lists the stage walk could not honour.
fn check_recipes(recipes: &[JoinRecipe]) -> Result<(), CompileError> {
    let mut exposed = HashSet::new();
    for recipe in recipes {
        if !exposed.insert(recipe.target_path.as_str()) {
            return Err(CompileError::DuplicateAlias(recipe.target_path.clone()));
        }
    }

    for (index, recipe) in recipes.iter().enumerate() {
        let reads = match (recipe.kind, recipe.array_path.as_deref()) {
            (JoinKind::Embedded, Some(array_path)) => array_path,
            _ => recipe.effective_local_field(),
        };
        let prerequisite = recipes
            .iter()
            .enumerate()
            .filter(|(_, other)| reads != other.target_path && has_segment_prefix(reads, &other.target_path))
            .max_by_key(|(_, other)| other.target_path.len());
        if let Some((position, other)) = prerequisite {
            if position > index {
                return Err(CompileError::RecipeOrder {
                    target_path: recipe.target_path.clone(),
                    prerequisite: other.target_path.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{FilterOp, Sort};
    use serde_json::json;
    use std::num::NonZeroU64;

    fn delivery_recipes() -> Vec<JoinRecipe> {
        let driver = JoinRecipe::collection("deliveries", "driver", "drivers", "driverId", "_id");
        let order = JoinRecipe::collection("deliveries", "order", "orders", "orderId", "_id");
        let mut product = JoinRecipe::embedded("orders", "items", "product", "products", "productId", "_id");
        product.array_path = Some("order.items".to_string());
        product.lookup_local_field = Some("order.items.productId".to_string());
        product.logical_path = "order.items.product".to_string();
        vec![driver, order, product]
    }

    fn limit(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn stage_names(pipeline: &Pipeline) -> Vec<&'static str> {
        pipeline.stages().iter().map(Stage::name).collect()
    }

    #[test]
    fn test_embedded_join_through_collection_join() {
        let intent = Intent::new("deliveries")
            .with_select(["orderNo"])
            .with_filter(Filter::eq("driver.name", "Ruwan"))
            .with_filter(Filter::new(
                "order.items.product.name",
                FilterOp::Contains,
                "Chocolate Gateau",
            ));

        let pipeline = assemble(&intent, &delivery_recipes()).unwrap();

        assert_eq!(
            pipeline.to_documents(),
            vec![
                json!({"$lookup": {"from": "drivers", "localField": "driverId", "foreignField": "_id", "as": "driver"}}),
                json!({"$unwind": {"path": "$driver", "preserveNullAndEmptyArrays": true}}),
                json!({"$lookup": {"from": "orders", "localField": "orderId", "foreignField": "_id", "as": "order"}}),
                json!({"$unwind": {"path": "$order", "preserveNullAndEmptyArrays": true}}),
                json!({"$unwind": {"path": "$order.items", "preserveNullAndEmptyArrays": true}}),
                json!({"$lookup": {"from": "products", "localField": "order.items.productId", "foreignField": "_id", "as": "product"}}),
                json!({"$unwind": {"path": "$product", "preserveNullAndEmptyArrays": true}}),
                json!({"$match": {
                    "driver.name": "Ruwan",
                    "product.name": {"$regex": "Chocolate Gateau", "$options": "i"}
                }}),
                json!({"$project": {"orderNo": 1}}),
            ]
        );
    }

    #[test]
    fn test_root_filter_is_pushed_before_joins() {
        let intent = Intent::new("orders")
            .with_filter(Filter::eq("status", "READY"))
            .with_filter(Filter::eq("customer.name", "Nimal"));
        let recipes = vec![JoinRecipe::collection("orders", "customer", "customers", "customerId", "_id")];

        let pipeline = assemble(&intent, &recipes).unwrap();

        assert_eq!(stage_names(&pipeline), vec!["$match", "$lookup", "$unwind", "$match"]);
        assert_eq!(pipeline.to_documents()[0], json!({"$match": {"status": "READY"}}));
    }

    #[test]
    fn test_shared_array_is_unwound_once() {
        let recipes = vec![
            JoinRecipe::embedded("Order", "deliveries", "driver", "Driver", "driverId", "_id"),
            JoinRecipe::embedded("Order", "deliveries", "vehicle", "Vehicle", "vehicleId", "_id"),
        ];

        let pipeline = assemble(&Intent::new("Order"), &recipes).unwrap();

        let array_unwinds = pipeline
            .unwound_paths()
            .into_iter()
            .filter(|p| *p == "deliveries")
            .count();
        assert_eq!(array_unwinds, 1);
    }

    #[test]
    fn test_filter_placement_around_embedded_join() {
        let recipes = vec![JoinRecipe::embedded(
            "Order", "deliveries", "driver", "Driver", "driverId", "_id",
        )];
        let intent = Intent::new("Order")
            .with_filter(Filter::eq("deliveries.status", "DELIVERED"))
            .with_filter(Filter::eq("driver.name", "Kamal"));

        let pipeline = assemble(&intent, &recipes).unwrap();
        let docs = pipeline.to_documents();

        assert_eq!(docs[0], json!({"$match": {"deliveries.status": "DELIVERED"}}));
        assert_eq!(
            docs.last(),
            Some(&json!({"$match": {"deliveries.status": "DELIVERED", "driver.name": "Kamal"}}))
        );
    }

    #[test]
    fn test_array_element_filter_is_rechecked_after_unwind() {
        let recipes = vec![JoinRecipe::embedded("orders", "items", "product", "products", "productId", "_id")];
        let intent = Intent::new("orders")
            .with_filter(Filter::eq("items.product.category", "CAKE"))
            .with_filter(Filter::new("items.qty", FilterOp::Gte, 2));

        let docs = assemble(&intent, &recipes).unwrap().to_documents();

        assert_eq!(docs[0], json!({"$match": {"items.qty": {"$gte": 2}}}));
        assert_eq!(docs[1], json!({"$unwind": {"path": "$items", "preserveNullAndEmptyArrays": true}}));
        assert_eq!(
            docs.last(),
            Some(&json!({"$match": {"product.category": "CAKE", "items.qty": {"$gte": 2}}}))
        );
    }

    #[test]
    fn test_filter_on_unflattened_array_stays_pre_join() {
        let recipes = vec![JoinRecipe::collection("orders", "customer", "customers", "customerId", "_id")];
        let intent = Intent::new("orders")
            .with_filter(Filter::new("items.qty", FilterOp::Gte, 2))
            .with_filter(Filter::eq("customer.name", "Nimal"));

        let docs = assemble(&intent, &recipes).unwrap().to_documents();

        assert_eq!(docs[0], json!({"$match": {"items.qty": {"$gte": 2}}}));
        assert_eq!(docs.last(), Some(&json!({"$match": {"customer.name": "Nimal"}})));
    }

    #[test]
    fn test_sort_project_limit_are_rewritten() {
        let recipes = vec![JoinRecipe::embedded("orders", "items", "product", "products", "productId", "_id")];
        let intent = Intent::new("orders")
            .with_select(["orderNo", "items.product.name", "orderNo"])
            .with_sort(Sort::desc("items.product.price"))
            .with_limit(limit(10));

        let docs = assemble(&intent, &recipes).unwrap().to_documents();
        let tail = &docs[docs.len() - 3..];

        assert_eq!(tail[0], json!({"$sort": {"product.price": -1}}));
        assert_eq!(tail[1], json!({"$project": {"orderNo": 1, "product.name": 1}}));
        assert_eq!(tail[2], json!({"$limit": 10}));
    }

    #[test]
    fn test_projection_drops_paths_under_selected_parent() {
        let rewriter = PathRewriter::default();
        let select = vec!["customer.name".to_string(), "customer".to_string()];
        assert_eq!(projection(&select, &rewriter), vec!["customer"]);
    }

    #[test]
    fn test_count_replaces_projection() {
        let intent = Intent::new("orders")
            .with_select(["orderNo"])
            .with_filter(Filter::eq("status", "READY"))
            .with_limit(limit(5))
            .with_aggregation(Aggregation::Count);

        let docs = assemble(&intent, &[]).unwrap().to_documents();

        assert_eq!(
            docs,
            vec![json!({"$match": {"status": "READY"}}), json!({"$count": "total"})]
        );
    }

    #[test]
    fn test_sum_groups_everything() {
        let intent = Intent::new("payments").with_aggregation(Aggregation::Sum {
            field: "amount".to_string(),
        });

        let docs = assemble(&intent, &[]).unwrap().to_documents();

        assert_eq!(
            docs,
            vec![json!({"$group": {"_id": null, "sum": {"$sum": "$amount"}}})]
        );
    }

    #[test]
    fn test_group_by_rewritten_path() {
        let recipes = vec![JoinRecipe::embedded("orders", "items", "product", "products", "productId", "_id")];
        let intent = Intent::new("orders")
            .with_limit(limit(3))
            .with_aggregation(Aggregation::Group {
                by: vec!["items.product.category".to_string()],
                accumulators: vec![GroupAccumulator {
                    op: AccumulatorOp::Sum,
                    field: Some("items.qty".to_string()),
                }],
            });

        let docs = assemble(&intent, &recipes).unwrap().to_documents();
        let tail = &docs[docs.len() - 2..];

        assert_eq!(
            tail[0],
            json!({"$group": {
                "_id": {"product_category": "$product.category"},
                "sum_items_qty": {"$sum": "$items.qty"}
            }})
        );
        assert_eq!(tail[1], json!({"$limit": 3}));
    }

    #[test]
    fn test_group_outputs_that_flatten_alike_are_rejected() {
        let intent = Intent::new("orders").with_aggregation(Aggregation::Group {
            by: vec!["customer.tier".to_string(), "customer_tier".to_string()],
            accumulators: Vec::new(),
        });

        assert_eq!(
            assemble(&intent, &[]),
            Err(CompileError::OutputNameClash {
                name: "customer_tier".to_string(),
                first: "customer.tier".to_string(),
                second: "customer_tier".to_string(),
            })
        );

        let intent = Intent::new("orders").with_aggregation(Aggregation::Group {
            by: vec!["status".to_string()],
            accumulators: vec![
                GroupAccumulator {
                    op: AccumulatorOp::Sum,
                    field: Some("total.net".to_string()),
                },
                GroupAccumulator {
                    op: AccumulatorOp::Sum,
                    field: Some("total_net".to_string()),
                },
            ],
        });
        assert!(matches!(
            assemble(&intent, &[]),
            Err(CompileError::OutputNameClash { ref name, .. }) if name == "sum_total_net"
        ));
    }

    #[test]
    fn test_repeated_group_outputs_are_emitted_once() {
        let intent = Intent::new("payments").with_aggregation(Aggregation::Group {
            by: vec!["method".to_string(), "method".to_string()],
            accumulators: vec![
                GroupAccumulator {
                    op: AccumulatorOp::Count,
                    field: None,
                },
                GroupAccumulator {
                    op: AccumulatorOp::Count,
                    field: None,
                },
            ],
        });

        let docs = assemble(&intent, &[]).unwrap().to_documents();

        assert_eq!(
            docs,
            vec![json!({"$group": {"_id": {"method": "$method"}, "count": {"$sum": 1}}})]
        );
    }

    #[test]
    fn test_out_of_order_recipes_are_rejected() {
        let mut recipes = delivery_recipes();
        recipes.swap(1, 2);

        let result = assemble(&Intent::new("deliveries"), &recipes);

        assert_eq!(
            result,
            Err(CompileError::RecipeOrder {
                target_path: "product".to_string(),
                prerequisite: "order".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_exposed_name_is_rejected() {
        let recipes = vec![
            JoinRecipe::collection("payments", "customer", "customers", "customerId", "_id"),
            JoinRecipe::embedded("payments", "lines", "customer", "customers", "customerId", "_id"),
        ];

        let result = assemble(&Intent::new("payments"), &recipes);

        assert_eq!(result, Err(CompileError::DuplicateAlias("customer".to_string())));
    }

    #[test]
    fn test_unsupported_operator_fails_whole_assembly() {
        let intent = Intent::new("orders").with_filter(Filter::new(
            "createdAt",
            FilterOp::from("between"),
            json!(["2025-12-01", "2025-12-31"]),
        ));

        assert!(matches!(
            assemble(&intent, &[]),
            Err(CompileError::UnsupportedOperator { ref op, .. }) if op == "between"
        ));
    }

    #[test]
    fn test_assembly_is_repeatable() {
        let intent = Intent::new("deliveries")
            .with_select(["orderNo", "driver.name"])
            .with_filter(Filter::eq("status", "OUT"))
            .with_sort(Sort::asc("order.createdAt"));

        let first = assemble(&intent, &delivery_recipes()).unwrap();
        let second = assemble(&intent, &delivery_recipes()).unwrap();
        assert_eq!(first, second);
    }
}
