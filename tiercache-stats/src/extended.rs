//! # Extended Statistics
//!
//! Binds every catalog kind to the live counters it resolves to under one
//! cache node, then samples them into windowed history.
//!
//! Binding walks the graph once per kind. A kind whose query finds nothing
//! is simply unbound and answers "no data"; a kind whose query demands a
//! unique counter but finds several is a configuration error raised by
//! [`ExtendedStatistics::bind`].
//!
//! ```
//! use std::sync::Arc;
//! use tiercache_stats::{
//!     names, CacheGetOutcome, ComponentGraph, ExtendedStatistics, NodeSpec, NodeType,
//!     OperationStatistic, OperationType,
//! };
//!
//! let graph = Arc::new(ComponentGraph::new());
//! let cache = graph.add_root(NodeSpec::new(NodeType::Cache, "users"));
//! let gets = OperationStatistic::<CacheGetOutcome>::new();
//! graph.add_child(cache, NodeSpec::statistic(names::GET, gets.counter())).unwrap();
//!
//! let stats = ExtendedStatistics::bind(Arc::clone(&graph), cache).unwrap();
//! gets.record(CacheGetOutcome::Hit);
//! stats.tick();
//!
//! let window = stats.window(OperationType::CacheGet, 0).unwrap();
//! assert_eq!(window.count("hit"), Some(1));
//! assert!(stats.window(OperationType::Search, 0).is_none());
//! ```

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::catalog::OperationType;
use crate::error::StatisticsError;
use crate::graph::{ComponentGraph, NodeId};
use crate::sampler::{SampledStatistic, WindowSample};

/// Windowed statistics for every resolvable operation kind of one cache.
pub struct ExtendedStatistics {
    graph: Arc<ComponentGraph>,
    root: NodeId,
    bound: RwLock<BTreeMap<OperationType, Arc<SampledStatistic>>>,
}

impl ExtendedStatistics {
    /// Resolves every catalog kind under `root`.
    pub fn bind(graph: Arc<ComponentGraph>, root: NodeId) -> Result<Self, StatisticsError> {
        let bound = resolve_all(&graph, root, &BTreeMap::new())?;
        tracing::debug!(
            root = %root,
            bound = bound.len(),
            "bound extended statistics"
        );
        Ok(Self {
            graph,
            root,
            bound: RwLock::new(bound),
        })
    }

    /// Re-runs resolution, e.g. after tiers were added or disposed. Kinds
    /// that resolve to the same counters keep their history.
    pub fn rebind(&self) -> Result<(), StatisticsError> {
        let current = self.bound.read().clone();
        let next = resolve_all(&self.graph, self.root, &current)?;
        *self.bound.write() = next;
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_bound(&self, kind: OperationType) -> bool {
        self.bound.read().contains_key(&kind)
    }

    pub fn bound_kinds(&self) -> Vec<OperationType> {
        self.bound.read().keys().copied().collect()
    }

    /// Advances every bound sampler by one tick.
    pub fn tick(&self) {
        let samplers: Vec<_> = self.bound.read().values().cloned().collect();
        for sampler in samplers {
            sampler.tick();
        }
    }

    /// Per-outcome counts of the window `index` samples back (0 is newest),
    /// or `None` when the kind has no counter or no such sample yet.
    pub fn window(&self, kind: OperationType, index: usize) -> Option<WindowSample> {
        self.sampler(kind)?.window(index)
    }

    /// Retained samples, oldest first.
    pub fn history(&self, kind: OperationType) -> Option<Vec<WindowSample>> {
        self.sampler(kind).map(|s| s.history())
    }

    /// Live cumulative counts, bypassing sampling.
    pub fn totals(&self, kind: OperationType) -> Option<Vec<u64>> {
        self.sampler(kind).map(|s| s.totals())
    }

    fn sampler(&self, kind: OperationType) -> Option<Arc<SampledStatistic>> {
        self.bound.read().get(&kind).cloned()
    }
}

fn resolve_all(
    graph: &ComponentGraph,
    root: NodeId,
    previous: &BTreeMap<OperationType, Arc<SampledStatistic>>,
) -> Result<BTreeMap<OperationType, Arc<SampledStatistic>>, StatisticsError> {
    if !graph.contains(root) {
        return Err(StatisticsError::UnknownNode(root));
    }

    let mut bound = BTreeMap::new();
    for kind in OperationType::ALL {
        let query = kind.query();
        let found = query.execute(graph, &[root]).map_err(|e| match e {
            StatisticsError::NotUnique { matches } => {
                StatisticsError::AmbiguousBinding { kind, matches }
            }
            other => other,
        })?;

        let mut sources = Vec::with_capacity(found.len());
        for id in found {
            let Some(node) = graph.node(id) else { continue };
            let Some(counter) = node.counter else { continue };
            if counter.outcomes() != kind.outcomes() {
                return Err(StatisticsError::OutcomeMismatch {
                    kind,
                    node: id,
                    expected: kind.outcomes(),
                    found: counter.outcomes(),
                });
            }
            sources.push((id, counter));
        }

        if sources.is_empty() {
            tracing::trace!(?kind, "no live counter, kind stays unbound");
            continue;
        }

        let ids: Vec<NodeId> = sources.iter().map(|(id, _)| *id).collect();
        let sampler = match previous.get(&kind) {
            Some(existing) if existing.source_nodes() == ids => Arc::clone(existing),
            _ => Arc::new(SampledStatistic::new(kind, kind.sampling(), sources)),
        };
        bound.insert(kind, sampler);
    }
    Ok(bound)
}

/// Background thread ticking an [`ExtendedStatistics`] at a fixed period.
///
/// The thread stops when the handle is dropped or [`SamplerHandle::stop`]
/// is called.
pub struct SamplerHandle {
    shared: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn spawn(stats: Arc<ExtendedStatistics>, period: Duration) -> std::io::Result<Self> {
        let shared = Arc::new((Mutex::new(false), Condvar::new()));
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("tiercache-sampler".to_string())
            .spawn(move || {
                let (stopped, signal) = &*worker;
                let mut stopped = stopped.lock();
                while !*stopped {
                    let timed_out = signal.wait_for(&mut stopped, period).timed_out();
                    if *stopped {
                        break;
                    }
                    if timed_out {
                        stats.tick();
                    }
                }
            })?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        {
            let (stopped, signal) = &*self.shared;
            *stopped.lock() = true;
            signal.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("statistics sampler thread panicked");
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
