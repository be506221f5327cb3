//! # Graph Query Engine
//!
//! Composable path queries over the [`ComponentGraph`]. A query is a
//! sequence of steps applied to a working set of nodes, starting from the
//! roots handed to [`Query::execute`]:
//!
//! - `children` / `descendants` move the working set down the tree
//! - `filter` keeps the nodes a [`Matcher`] accepts
//! - `chain` runs another query from the current working set
//! - `empty` discards everything (used by kinds that never resolve)
//! - `ensure_unique` fails if more than one node remains
//!
//! No match is an empty result, never an error.
//!
//! # Examples
//!
//! ```
//! use tiercache_stats::{ComponentGraph, Matcher, NodeSpec, NodeType, QueryBuilder};
//!
//! let graph = ComponentGraph::new();
//! let cache = graph.add_root(NodeSpec::new(NodeType::Cache, "users"));
//! graph.add_child(cache, NodeSpec::new(NodeType::Store, "users:heap").with_tag("heap")).unwrap();
//! graph.add_child(cache, NodeSpec::new(NodeType::Store, "users:disk").with_tag("disk")).unwrap();
//!
//! let stores = QueryBuilder::new()
//!     .children()
//!     .filter(Matcher::node_type(NodeType::Store))
//!     .build();
//! assert_eq!(stores.execute(&graph, &[cache]).unwrap().len(), 2);
//!
//! let heap = QueryBuilder::new()
//!     .descendants()
//!     .filter(Matcher::has_tags(["heap"]))
//!     .ensure_unique()
//!     .build();
//! assert_eq!(heap.execute(&graph, &[cache]).unwrap().len(), 1);
//! ```

use std::collections::{BTreeSet, HashSet};

use crate::error::StatisticsError;
use crate::graph::{ComponentGraph, ContextNode, NodeId, NodeType};

/// Predicate over a single node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    Any,
    NodeType(NodeType),
    /// Named attribute equals the value. `name` is always an attribute.
    Attribute { key: String, value: String },
    /// Node's tag set contains every listed tag.
    HasTags(BTreeSet<String>),
    AllOf(Vec<Matcher>),
    AnyOf(Vec<Matcher>),
}

impl Matcher {
    pub fn node_type(node_type: NodeType) -> Self {
        Matcher::NodeType(node_type)
    }

    pub fn attribute(key: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher::Attribute {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::attribute("name", value)
    }

    pub fn has_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::HasTags(tags.into_iter().map(Into::into).collect())
    }

    pub fn all_of(matchers: Vec<Matcher>) -> Self {
        Matcher::AllOf(matchers)
    }

    pub fn any_of(matchers: Vec<Matcher>) -> Self {
        Matcher::AnyOf(matchers)
    }

    pub fn matches(&self, node: &ContextNode) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::NodeType(t) => node.node_type == *t,
            Matcher::Attribute { key, value } => node.attribute(key) == Some(value.as_str()),
            Matcher::HasTags(tags) => tags.is_subset(&node.tags),
            Matcher::AllOf(ms) => ms.iter().all(|m| m.matches(node)),
            Matcher::AnyOf(ms) => ms.iter().any(|m| m.matches(node)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Children,
    Descendants,
    Filter(Matcher),
    Chain(Query),
    Empty,
    EnsureUnique,
}

/// An immutable, reusable graph query.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Query {
    steps: Vec<Step>,
}

impl Query {
    /// Runs the query from `roots`. The result keeps first-seen order and
    /// holds no duplicates.
    pub fn execute(
        &self,
        graph: &ComponentGraph,
        roots: &[NodeId],
    ) -> Result<Vec<NodeId>, StatisticsError> {
        let mut current = dedup(roots.iter().copied().filter(|id| graph.contains(*id)));

        for step in &self.steps {
            current = match step {
                Step::Children => dedup(current.iter().flat_map(|id| graph.children(*id))),
                Step::Descendants => dedup(current.iter().flat_map(|id| graph.descendants(*id))),
                Step::Filter(matcher) => current
                    .into_iter()
                    .filter(|id| graph.node(*id).is_some_and(|n| matcher.matches(&n)))
                    .collect(),
                Step::Chain(query) => query.execute(graph, &current)?,
                Step::Empty => Vec::new(),
                Step::EnsureUnique => {
                    if current.len() > 1 {
                        return Err(StatisticsError::NotUnique {
                            matches: current.len(),
                        });
                    }
                    current
                }
            };
        }

        Ok(current)
    }

    /// Whether the query ends with an `ensure_unique` step.
    pub fn requires_unique(&self) -> bool {
        matches!(self.steps.last(), Some(Step::EnsureUnique))
    }
}

fn dedup(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Builder for [`Query`].
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    steps: Vec<Step>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children(mut self) -> Self {
        self.steps.push(Step::Children);
        self
    }

    pub fn descendants(mut self) -> Self {
        self.steps.push(Step::Descendants);
        self
    }

    pub fn filter(mut self, matcher: Matcher) -> Self {
        self.steps.push(Step::Filter(matcher));
        self
    }

    pub fn chain(mut self, query: Query) -> Self {
        self.steps.push(Step::Chain(query));
        self
    }

    pub fn empty(mut self) -> Self {
        self.steps.push(Step::Empty);
        self
    }

    pub fn ensure_unique(mut self) -> Self {
        self.steps.push(Step::EnsureUnique);
        self
    }

    pub fn build(self) -> Query {
        Query { steps: self.steps }
    }
}
