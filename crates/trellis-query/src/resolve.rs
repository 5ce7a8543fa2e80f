//! Join recipe discovery.
//!
//! Turns candidate paths into an ordered list of [`JoinRecipe`]s by asking the
//! relationship graph two questions per *anchor* (a collection reachable from
//! the root, plus the logical and physical paths it is exposed at):
//!
//! 1. which refers-to chains start here and spell out one of the paths below
//!    the anchor, alias by alias
//! 2. which embedded arrays declared here refer to another collection under a
//!    `array.alias` path the intent mentions
//!
//! The root is the first anchor. Every collection reached by a chain hop
//! becomes an anchor for embedded discovery; every collection reached through
//! an embedded array becomes an anchor for both, which is how joins that pass
//! through an array (`items.product.supplier`) are found.

use crate::error::{CompileError, IntentError, QueryError};
use crate::graph::RelationshipGraph;
use crate::paths::{depth, has_segment_prefix, join, PathSet};
use crate::recipe::{JoinKind, JoinRecipe};
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Resolves candidate paths into join recipes against a relationship graph.
pub struct GraphJoinResolver<G> {
    graph: G,
}

impl<G: RelationshipGraph> GraphJoinResolver<G> {
    pub fn new(graph: G) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Resolve every join needed to reach `paths` from `root`.
    ///
    /// Recipes come back ordered by logical depth, ties in discovery order, so
    /// a recipe's prerequisites always precede it. Paths without a matching
    /// chain are plain fields and are skipped. Any graph failure aborts the
    /// whole call, as do two joins that would write the same field.
    #[tracing::instrument(skip(self, paths), fields(root = %root))]
    pub async fn resolve(&self, root: &str, paths: &PathSet) -> Result<Vec<JoinRecipe>, QueryError> {
        for path in paths.sources() {
            validate_path(path)?;
        }
        let working = working_paths(paths);
        debug!(count = working.len(), "resolving working paths");

        let mut recipes = RecipeSet::default();
        let mut anchors = VecDeque::from([Anchor {
            collection: root.to_string(),
            logical: String::new(),
            physical: String::new(),
            walk_chains: true,
        }]);

        while let Some(anchor) = anchors.pop_front() {
            let relative = anchor.relative_paths(&working);
            if relative.is_empty() {
                continue;
            }

            if anchor.walk_chains {
                self.walk_chains(&anchor, &relative, &mut recipes, &mut anchors)
                    .await?;
            }
            self.discover_embedded(&anchor, &relative, &mut recipes, &mut anchors)
                .await?;
        }

        let mut ordered = recipes.into_inner();
        ordered.sort_by_key(JoinRecipe::depth);
        for recipe in &ordered {
            debug!(
                kind = ?recipe.kind,
                alias = %recipe.alias,
                target_path = %recipe.target_path,
                logical_path = %recipe.logical_path,
                "resolved join"
            );
        }
        Ok(ordered)
    }

    async fn walk_chains(
        &self,
        anchor: &Anchor,
        relative: &[String],
        recipes: &mut RecipeSet,
        anchors: &mut VecDeque<Anchor>,
    ) -> Result<(), QueryError> {
        for path in relative {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            let Some(hops) = self.graph.find_chain(&anchor.collection, &segments).await? else {
                continue;
            };

            let mut logical = anchor.logical.clone();
            let mut physical = anchor.physical.clone();
            for hop in hops {
                let parent_physical = physical.clone();
                logical = join(&logical, &hop.alias);
                physical = join(&physical, &hop.alias);

                let recipe = JoinRecipe {
                    kind: JoinKind::Collection,
                    lookup_local_field: (!parent_physical.is_empty())
                        .then(|| join(&parent_physical, &hop.local_field)),
                    src_collection: hop.src_collection,
                    alias: hop.alias,
                    dst_collection: hop.dst_collection.clone(),
                    local_field: hop.local_field,
                    foreign_field: hop.foreign_field,
                    array_path: None,
                    target_path: physical.clone(),
                    logical_path: logical.clone(),
                };
                if recipes.insert(recipe)? {
                    anchors.push_back(Anchor {
                        collection: hop.dst_collection,
                        logical: logical.clone(),
                        physical: physical.clone(),
                        walk_chains: false,
                    });
                }
            }
        }
        Ok(())
    }

    async fn discover_embedded(
        &self,
        anchor: &Anchor,
        relative: &[String],
        recipes: &mut RecipeSet,
        anchors: &mut VecDeque<Anchor>,
    ) -> Result<(), QueryError> {
        let candidates: BTreeSet<String> = relative.iter().cloned().collect();
        let joins = self
            .graph
            .discover_embedded(&anchor.collection, &candidates)
            .await?;

        for found in joins {
            let array_path = join(&anchor.physical, &found.array_path);
            let logical = join(&anchor.logical, &found.logical_path());
            let recipe = JoinRecipe {
                kind: JoinKind::Embedded,
                src_collection: found.owner,
                lookup_local_field: Some(join(&array_path, &found.local_field)),
                alias: found.alias.clone(),
                dst_collection: found.dst_collection.clone(),
                local_field: found.local_field,
                foreign_field: found.foreign_field,
                array_path: Some(array_path),
                target_path: found.alias.clone(),
                logical_path: logical.clone(),
            };
            if recipes.insert(recipe)? {
                anchors.push_back(Anchor {
                    collection: found.dst_collection,
                    logical,
                    physical: found.alias,
                    walk_chains: true,
                });
            }
        }
        Ok(())
    }
}

/// A collection reachable from the root and where its data lives.
#[derive(Debug)]
struct Anchor {
    collection: String,
    /// Alias chain the intent uses to reach it
    logical: String,
    /// Field the joined document occupies in the pipeline
    physical: String,
    walk_chains: bool,
}

impl Anchor {
    /// Working paths strictly below this anchor, relative to it.
    fn relative_paths(&self, working: &[String]) -> Vec<String> {
        if self.logical.is_empty() {
            return working.to_vec();
        }
        working
            .iter()
            .filter(|p| p.len() > self.logical.len() && has_segment_prefix(p, &self.logical))
            .map(|p| p[self.logical.len() + 1..].to_string())
            .collect()
    }
}

/// Insertion-ordered recipes, first write wins per alias chain.
#[derive(Default)]
struct RecipeSet {
    recipes: Vec<JoinRecipe>,
    logical: HashSet<String>,
    exposed: HashSet<String>,
}

impl RecipeSet {
    /// Returns false when the alias chain is already known. A different chain
    /// exposed at a field an earlier join already writes is an error: its
    /// filters could no longer be rewritten to the joined data.
    fn insert(&mut self, recipe: JoinRecipe) -> Result<bool, CompileError> {
        if self.logical.contains(&recipe.logical_path) {
            return Ok(false);
        }
        if !self.exposed.insert(recipe.target_path.clone()) {
            return Err(CompileError::DuplicateAlias(recipe.target_path));
        }
        self.logical.insert(recipe.logical_path.clone());
        self.recipes.push(recipe);
        Ok(true)
    }

    fn into_inner(self) -> Vec<JoinRecipe> {
        self.recipes
    }
}

fn validate_path(path: &str) -> Result<(), IntentError> {
    let reason = if path.trim().is_empty() {
        Some("path is empty")
    } else if path.split('.').any(|s| s.trim().is_empty()) {
        Some("path has an empty segment")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(IntentError::MalformedPath {
            path: path.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Candidates plus every deeper prefix of the source paths, shallowest first.
fn working_paths(paths: &PathSet) -> Vec<String> {
    let mut all: BTreeSet<String> = paths.candidates().clone();
    for source in paths.sources() {
        let segments: Vec<&str> = source.split('.').collect();
        for end in 1..=segments.len() {
            all.insert(segments[..end].join("."));
        }
    }
    let mut ordered: Vec<String> = all.into_iter().collect();
    ordered.sort_by_key(|p| depth(p));
    ordered
}
