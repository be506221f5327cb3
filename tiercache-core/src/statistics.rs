use std::sync::Arc;
use tiercache_stats::{
    names, ComponentGraph, EvictionOutcome, NodeId, NodeSpec, NodeType, OperationStatistic,
    StatisticsError, StoreGetOutcome, StorePutOutcome, StoreRemoveOutcome,
};

use crate::TierKind;

/// Where a store registers itself in the component graph.
///
/// A detached scope registers nothing; the store still counts outcomes but
/// no query can find them.
#[derive(Clone, Default)]
pub struct StatisticsScope {
    graph: Option<Arc<ComponentGraph>>,
    parent: Option<NodeId>,
}

impl StatisticsScope {
    pub fn detached() -> Self {
        Self::default()
    }

    /// Stores register as roots of `graph`.
    pub fn root(graph: Arc<ComponentGraph>) -> Self {
        Self {
            graph: Some(graph),
            parent: None,
        }
    }

    /// Stores register as children of `parent`.
    pub fn under(graph: Arc<ComponentGraph>, parent: NodeId) -> Self {
        Self {
            graph: Some(graph),
            parent: Some(parent),
        }
    }

    /// Registers a store node plus its get/put/remove statistics, and an
    /// eviction statistic for actual tiers. Statistics carry the tier tag.
    pub fn register_store(
        &self,
        name: &str,
        tier: Option<TierKind>,
    ) -> Result<StoreStatistics, StatisticsError> {
        let mut stats = StoreStatistics::unregistered();
        let Some(graph) = &self.graph else {
            return Ok(stats);
        };

        let mut spec = NodeSpec::new(NodeType::Store, name);
        if let Some(tier) = tier {
            spec = spec.with_tag(tier.tag());
        }
        let node = match self.parent {
            Some(parent) => graph.add_child(parent, spec)?,
            None => graph.add_root(spec),
        };
        stats.registration = Some((Arc::clone(graph), node));

        let tagged = |spec: NodeSpec| match tier {
            Some(tier) => spec.with_tag(tier.tag()),
            None => spec,
        };
        let mut children = vec![
            tagged(NodeSpec::statistic(names::GET, stats.get.counter())),
            tagged(NodeSpec::statistic(names::PUT, stats.put.counter())),
            tagged(NodeSpec::statistic(names::REMOVE, stats.remove.counter())),
        ];
        if tier.is_some() {
            children.push(tagged(NodeSpec::statistic(
                names::EVICTION,
                stats.eviction.counter(),
            )));
        }
        for child in children {
            graph.add_child(node, child)?;
        }

        tracing::debug!(store = name, node = %node, ?tier, "registered store statistics");
        Ok(stats)
    }
}

/// Outcome counters of one store.
pub struct StoreStatistics {
    registration: Option<(Arc<ComponentGraph>, NodeId)>,
    pub get: OperationStatistic<StoreGetOutcome>,
    pub put: OperationStatistic<StorePutOutcome>,
    pub remove: OperationStatistic<StoreRemoveOutcome>,
    pub eviction: OperationStatistic<EvictionOutcome>,
}

impl StoreStatistics {
    fn unregistered() -> Self {
        Self {
            registration: None,
            get: OperationStatistic::new(),
            put: OperationStatistic::new(),
            remove: OperationStatistic::new(),
            eviction: OperationStatistic::new(),
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.registration.as_ref().map(|(_, node)| *node)
    }

    /// Scope for stores nested under this one.
    pub fn scope(&self) -> StatisticsScope {
        match &self.registration {
            Some((graph, node)) => StatisticsScope::under(Arc::clone(graph), *node),
            None => StatisticsScope::detached(),
        }
    }

    /// Drops this store's subtree from the graph. Also happens on drop.
    pub fn unregister(&self) {
        if let Some((graph, node)) = &self.registration {
            graph.remove(*node);
        }
    }
}

impl Drop for StoreStatistics {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercache_stats::{tags, ExtendedStatistics, OperationType};

    #[test]
    fn test_detached_registers_nothing() {
        let stats = StatisticsScope::detached()
            .register_store("s", Some(TierKind::Heap))
            .unwrap();
        assert!(stats.node().is_none());
        stats.get.record(StoreGetOutcome::Hit);
        assert_eq!(stats.get.count(StoreGetOutcome::Hit), 1);
    }

    #[test]
    fn test_tier_statistics_are_tagged() {
        let graph = Arc::new(ComponentGraph::new());
        let stats = StatisticsScope::root(Arc::clone(&graph))
            .register_store("s", Some(TierKind::Disk))
            .unwrap();
        let node = stats.node().unwrap();
        let children = graph.children(node);
        assert_eq!(children.len(), 4);
        for child in children {
            assert!(graph.node(child).unwrap().tags.contains(tags::DISK));
        }
    }

    #[test]
    fn test_nested_tier_is_discoverable_from_cache() {
        let graph = Arc::new(ComponentGraph::new());
        let cache = graph.add_root(NodeSpec::new(NodeType::Cache, "c"));
        let chain = StatisticsScope::under(Arc::clone(&graph), cache)
            .register_store("c:chain", None)
            .unwrap();
        let heap = chain.scope().register_store("c:heap", Some(TierKind::Heap)).unwrap();

        let extended = ExtendedStatistics::bind(Arc::clone(&graph), cache).unwrap();
        heap.put.record(StorePutOutcome::Added);
        extended.tick();
        assert_eq!(
            extended.window(OperationType::HeapPut, 0).unwrap().count("added"),
            Some(1)
        );

        chain.unregister();
        assert_eq!(graph.children(cache), Vec::<NodeId>::new());
    }
}
