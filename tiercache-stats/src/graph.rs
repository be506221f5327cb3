//! # Runtime Component Graph
//!
//! A labeled containment graph of live cache components. Caches, stores and
//! per-operation counters register themselves explicitly when they are
//! built, so the statistics engine can later find "the counter for operation
//! X under store Y" without knowing how many tiers a cache was configured
//! with.
//!
//! ```text
//!   cache "users"
//!   ├── statistic get     {cache}
//!   ├── statistic put     {cache}
//!   ├── store "users:heap"
//!   │   ├── statistic get {heap}
//!   │   └── statistic put {heap}
//!   └── store "users:disk"
//!       └── statistic get {disk}
//! ```
//!
//! # Examples
//!
//! ```
//! use tiercache_stats::{ComponentGraph, NodeSpec, NodeType};
//!
//! let graph = ComponentGraph::new();
//! let cache = graph.add_root(NodeSpec::new(NodeType::Cache, "users"));
//! let store = graph
//!     .add_child(cache, NodeSpec::new(NodeType::Store, "users:heap"))
//!     .unwrap();
//!
//! assert_eq!(graph.children(cache), vec![store]);
//! assert_eq!(graph.parent(store), Some(cache));
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::StatisticsError;
use crate::statistic::OutcomeCounter;

/// Stable identity of a graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type tag of a live component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Cache,
    Store,
    Statistic,
}

/// Description of a node to register.
#[derive(Clone, Debug)]
pub struct NodeSpec {
    pub node_type: NodeType,
    pub name: String,
    pub tags: BTreeSet<String>,
    pub attributes: HashMap<String, String>,
    pub counter: Option<Arc<OutcomeCounter>>,
}

impl NodeSpec {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
            tags: BTreeSet::new(),
            attributes: HashMap::new(),
            counter: None,
        }
    }

    /// A statistic node publishing `counter` under `name`.
    pub fn statistic(name: impl Into<String>, counter: Arc<OutcomeCounter>) -> Self {
        Self {
            counter: Some(counter),
            ..Self::new(NodeType::Statistic, name)
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A registered node, as handed out by lookups.
#[derive(Clone, Debug)]
pub struct ContextNode {
    pub id: NodeId,
    pub node_type: NodeType,
    pub name: String,
    pub tags: BTreeSet<String>,
    pub attributes: HashMap<String, String>,
    pub counter: Option<Arc<OutcomeCounter>>,
}

impl ContextNode {
    /// Looks up a named attribute. `name` is always available as an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        if key == "name" {
            return Some(&self.name);
        }
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Default)]
struct GraphInner {
    next_id: u64,
    nodes: HashMap<NodeId, ContextNode>,
    children: HashMap<NodeId, Vec<NodeId>>,
    parents: HashMap<NodeId, NodeId>,
    roots: Vec<NodeId>,
}

impl GraphInner {
    fn insert(&mut self, spec: NodeSpec) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            ContextNode {
                id,
                node_type: spec.node_type,
                name: spec.name,
                tags: spec.tags,
                attributes: spec.attributes,
                counter: spec.counter,
            },
        );
        id
    }
}

/// Thread-safe registry of live components and their containment edges.
///
/// Structural changes (registration, removal) take a write lock; queries take
/// a read lock. Neither happens on the cache's hot path.
pub struct ComponentGraph {
    inner: RwLock<GraphInner>,
}

static GLOBAL_GRAPH: Lazy<Arc<ComponentGraph>> = Lazy::new(|| Arc::new(ComponentGraph::new()));

impl ComponentGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// The process-wide graph used when a cache is not given its own.
    pub fn global() -> Arc<ComponentGraph> {
        Arc::clone(&GLOBAL_GRAPH)
    }

    /// Registers a node without a parent.
    pub fn add_root(&self, spec: NodeSpec) -> NodeId {
        let mut inner = self.inner.write();
        let id = inner.insert(spec);
        inner.roots.push(id);
        id
    }

    /// Registers a node under `parent`.
    pub fn add_child(&self, parent: NodeId, spec: NodeSpec) -> Result<NodeId, StatisticsError> {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(&parent) {
            return Err(StatisticsError::UnknownNode(parent));
        }
        let id = inner.insert(spec);
        inner.children.entry(parent).or_default().push(id);
        inner.parents.insert(id, parent);
        Ok(id)
    }

    /// Removes `id` and everything below it. Returns how many nodes went away.
    pub fn remove(&self, id: NodeId) -> usize {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(&id) {
            return 0;
        }

        if let Some(parent) = inner.parents.remove(&id) {
            if let Some(siblings) = inner.children.get_mut(&parent) {
                siblings.retain(|c| *c != id);
            }
        } else {
            inner.roots.retain(|r| *r != id);
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(children) = inner.children.remove(&next) {
                pending.extend(children);
            }
            inner.parents.remove(&next);
            if inner.nodes.remove(&next).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn node(&self, id: NodeId) -> Option<ContextNode> {
        self.inner.read().nodes.get(&id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.read().nodes.contains_key(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.read().parents.get(&id).copied()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.inner.read().roots.clone()
    }

    /// Direct children of `id`, in registration order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .read()
            .children
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every node strictly below `id`, breadth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut frontier = vec![id];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for n in frontier {
                if let Some(children) = inner.children.get(&n) {
                    out.extend(children.iter().copied());
                    next.extend(children.iter().copied());
                }
            }
            frontier = next;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ComponentGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentGraph")
            .field("nodes", &self.len())
            .finish()
    }
}
