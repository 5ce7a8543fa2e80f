//! Intent model.
//!
//! An `Intent` is the already-validated, database-agnostic description of a
//! query. It arrives as JSON from an upstream producer, so field names follow
//! that producer's camelCase convention (`pathHint`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU64;

/// What the caller wants to read, starting from `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Starting collection
    pub root: String,
    /// Dotted paths to project, in output order
    #[serde(default)]
    pub select: Vec<String>,
    /// Conjunctive filters
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Sort keys, earlier entries dominate
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<NonZeroU64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
}

impl Intent {
    /// Create an intent over `root` with nothing selected
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            select: Vec::new(),
            filters: Vec::new(),
            sort: Vec::new(),
            limit: None,
            aggregation: None,
        }
    }

    pub fn with_select<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    /// Cap the result at `limit` rows. Zero is not a limit; leave it unset
    /// instead.
    pub fn with_limit(mut self, limit: NonZeroU64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Every path the intent mentions: select, then filters, then sort.
    pub fn referenced_paths(&self) -> impl Iterator<Item = &str> {
        self.select
            .iter()
            .map(String::as_str)
            .chain(self.filters.iter().map(|f| f.path_hint.as_str()))
            .chain(self.sort.iter().map(|s| s.path_hint.as_str()))
            .chain(
                self.aggregation
                    .iter()
                    .flat_map(|a| a.referenced_paths()),
            )
    }
}

/// A single conjunctive filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Logical path expressed through relationship aliases
    pub path_hint: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(path_hint: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            path_hint: path_hint.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(path_hint: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(path_hint, FilterOp::Eq, value)
    }
}

/// Filter operators.
///
/// Unknown operator names survive deserialization as `Unsupported` so the
/// match compiler can report them with the offending path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Unsupported(String),
}

impl FilterOp {
    pub fn as_str(&self) -> &str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::EndsWith => "ends_with",
            FilterOp::Unsupported(op) => op,
        }
    }
}

impl From<&str> for FilterOp {
    fn from(op: &str) -> Self {
        match op {
            "eq" => FilterOp::Eq,
            "neq" | "ne" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "in" => FilterOp::In,
            "contains" => FilterOp::Contains,
            "starts_with" => FilterOp::StartsWith,
            "ends_with" => FilterOp::EndsWith,
            other => FilterOp::Unsupported(other.to_string()),
        }
    }
}

impl From<String> for FilterOp {
    fn from(op: String) -> Self {
        FilterOp::from(op.as_str())
    }
}

impl From<FilterOp> for String {
    fn from(op: FilterOp) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub path_hint: String,
    pub dir: SortDirection,
}

impl Sort {
    pub fn asc(path_hint: impl Into<String>) -> Self {
        Self {
            path_hint: path_hint.into(),
            dir: SortDirection::Asc,
        }
    }

    pub fn desc(path_hint: impl Into<String>) -> Self {
        Self {
            path_hint: path_hint.into(),
            dir: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

impl SortDirection {
    /// Target-store sort order: 1 ascending, -1 descending
    pub fn as_order(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Aggregation requested instead of a plain projection.
///
/// `"count"` deserializes from a bare string; the field accumulations take an
/// object, e.g. `{"sum": {"field": "amount"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    Sum { field: String },
    Avg { field: String },
    Min { field: String },
    Max { field: String },
    Group {
        by: Vec<String>,
        #[serde(default)]
        accumulators: Vec<GroupAccumulator>,
    },
}

impl Aggregation {
    fn referenced_paths(&self) -> Vec<&str> {
        match self {
            Aggregation::Count => Vec::new(),
            Aggregation::Sum { field }
            | Aggregation::Avg { field }
            | Aggregation::Min { field }
            | Aggregation::Max { field } => vec![field.as_str()],
            Aggregation::Group { by, accumulators } => by
                .iter()
                .map(String::as_str)
                .chain(accumulators.iter().filter_map(|a| a.field.as_deref()))
                .collect(),
        }
    }
}

/// One accumulator inside a `group` aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAccumulator {
    pub op: AccumulatorOp,
    /// Not needed for `count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AccumulatorOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AccumulatorOp::Count => "count",
            AccumulatorOp::Sum => "sum",
            AccumulatorOp::Avg => "avg",
            AccumulatorOp::Min => "min",
            AccumulatorOp::Max => "max",
        }
    }
}
