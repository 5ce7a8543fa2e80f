//! Candidate path extraction.
//!
//! Collects the dotted paths an intent references and the shallow prefixes
//! that might name a join. Only the first one and two segments are emitted as
//! candidates; the resolver walks deeper prefixes itself from `sources`.

use crate::intent::Intent;
use serde::Serialize;
use std::collections::BTreeSet;

/// Number of leading segments emitted as candidates per path.
pub const CANDIDATE_SEGMENT_CAP: usize = 2;

/// Paths extracted from one intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathSet {
    candidates: BTreeSet<String>,
    sources: BTreeSet<String>,
}

impl PathSet {
    /// Capped prefixes (`a`, `a.b`) of every referenced path.
    pub fn candidates(&self) -> &BTreeSet<String> {
        &self.candidates
    }

    /// Full paths as written in the intent.
    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Build from raw paths without an intent.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = PathSet::default();
        for path in paths {
            set.insert(path.as_ref());
        }
        set
    }

    fn insert(&mut self, path: &str) {
        self.sources.insert(path.to_string());
        let segments: Vec<&str> = path.split('.').collect();
        for depth in 1..=segments.len().min(CANDIDATE_SEGMENT_CAP) {
            let prefix = segments[..depth].join(".");
            if !prefix.is_empty() {
                self.candidates.insert(prefix);
            }
        }
    }
}

/// Extract candidate paths from `select`, filter and sort paths (and any
/// aggregation fields).
pub fn extract_paths(intent: &Intent) -> PathSet {
    let set = PathSet::from_paths(intent.referenced_paths());
    tracing::debug!(root = %intent.root, candidates = ?set.candidates, "extracted candidate paths");
    set
}

/// Number of dot-separated segments in `path`.
pub(crate) fn depth(path: &str) -> usize {
    path.split('.').count()
}

/// Whether `path` equals `prefix` or continues it on a segment boundary.
pub(crate) fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// Join two dotted paths, either of which may be empty.
pub(crate) fn join(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}.{rest}"),
    }
}
