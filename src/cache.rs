use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tiercache_core::writer::{notify_delete, notify_write};
use tiercache_core::{
    now_millis, CacheWriter, DefaultElementValueComparator, DiskStore, Element, MemoryStore,
    StatisticsScope, Status, Store, StoreKey, StoreManagement, StoreValue, TieredStore,
    VersionComparator,
};
use tiercache_stats::{
    names, stats_registry, tags, CacheGetOutcome, CachePutOutcome, CacheRemoveOutcome,
    ComponentGraph, ExpiredOutcome, ExtendedStatistics, NodeId, NodeSpec, NodeType,
    OperationStatistic, SamplerHandle,
};

use crate::{CacheConfig, Error, Result};

/// Cache-level outcome counters, published as children of the cache node.
struct CacheStatistics {
    get: OperationStatistic<CacheGetOutcome>,
    put: OperationStatistic<CachePutOutcome>,
    remove: OperationStatistic<CacheRemoveOutcome>,
    expiry: OperationStatistic<ExpiredOutcome>,
}

impl CacheStatistics {
    fn register(graph: &ComponentGraph, node: NodeId) -> Result<Self> {
        let stats = Self {
            get: OperationStatistic::new(),
            put: OperationStatistic::new(),
            remove: OperationStatistic::new(),
            expiry: OperationStatistic::new(),
        };
        for spec in [
            NodeSpec::statistic(names::GET, stats.get.counter()),
            NodeSpec::statistic(names::PUT, stats.put.counter()),
            NodeSpec::statistic(names::REMOVE, stats.remove.counter()),
            NodeSpec::statistic(names::EXPIRY, stats.expiry.counter()),
        ] {
            graph.add_child(node, spec.with_tag(tags::CACHE))?;
        }
        Ok(stats)
    }
}

/// A named cache over a heap tier and an optional disk overflow tier.
///
/// The cache owns its tier chain, filters expired elements on read and
/// publishes its statistics into a component graph. With statistics enabled
/// the whole operation catalog is bound at construction and sampled in the
/// background; the bound statistics are also reachable by cache name through
/// [`stats_registry`].
///
/// # Examples
///
/// ```
/// use tiercache::{Cache, CacheConfig};
///
/// let cache: Cache<String, String> =
///     Cache::new(CacheConfig::new("greetings").statistics(false)).unwrap();
/// cache.put("en".to_string(), "hello".to_string()).unwrap();
/// assert_eq!(cache.get(&"en".to_string()).unwrap(), Some("hello".to_string()));
/// assert_eq!(cache.get(&"fr".to_string()).unwrap(), None);
/// ```
pub struct Cache<K: StoreKey, V: StoreValue> {
    config: CacheConfig,
    graph: Arc<ComponentGraph>,
    node: NodeId,
    store: TieredStore<K, V>,
    statistics: CacheStatistics,
    extended: Option<Arc<ExtendedStatistics>>,
    sampler: Mutex<Option<SamplerHandle>>,
    writer: Option<Arc<dyn CacheWriter<K, V>>>,
    last_creation: AtomicU64,
    disposed: AtomicBool,
}

impl<K, V> Cache<K, V>
where
    K: StoreKey + Serialize + DeserializeOwned,
    V: StoreValue + Serialize + DeserializeOwned,
{
    /// Builds a cache registered in the process-wide component graph.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_graph(config, ComponentGraph::global())
    }

    /// Builds a cache registered in `graph`.
    pub fn with_graph(config: CacheConfig, graph: Arc<ComponentGraph>) -> Result<Self> {
        config.validate()?;
        let node = graph.add_root(NodeSpec::new(NodeType::Cache, config.name.as_str()));
        match Self::assemble(config, Arc::clone(&graph), node) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                graph.remove(node);
                Err(e)
            }
        }
    }

    fn assemble(config: CacheConfig, graph: Arc<ComponentGraph>, node: NodeId) -> Result<Self> {
        let statistics = CacheStatistics::register(&graph, node)?;
        let policy = config.eviction_policy()?;
        let name = config.name.clone();

        let chain_stats = StatisticsScope::under(Arc::clone(&graph), node)
            .register_store(&format!("{}:chain", name), None)?;
        let tier_scope = chain_stats.scope();

        let mut heap = MemoryStore::<K, V>::builder(format!("{}:heap", name))
            .capacity(config.max_entries_in_memory)
            .eviction_policy(policy.build())
            .statistics(tier_scope.clone());
        let mut tiers: Vec<Arc<dyn Store<K, V>>> = Vec::with_capacity(2);
        let disk: Option<Arc<dyn Store<K, V>>> = if config.overflow_to_disk {
            let disk: DiskStore<K, V> = DiskStore::builder(format!("{}:disk", name), config.data_file())
                .capacity(config.max_entries_on_disk)
                .statistics(tier_scope)
                .build()?;
            Some(Arc::new(disk))
        } else {
            None
        };
        if let Some(disk) = &disk {
            heap = heap.overflow(Arc::clone(disk));
        }
        tiers.push(Arc::new(heap.build()?));
        tiers.extend(disk);
        let store = TieredStore::new(name.as_str(), tiers, chain_stats);

        let (extended, sampler) = if config.statistics {
            let extended = Arc::new(ExtendedStatistics::bind(Arc::clone(&graph), node)?);
            let sampler = SamplerHandle::spawn(Arc::clone(&extended), config.sample_period())
                .map_err(Error::Sampler)?;
            stats_registry::register(&name, Arc::clone(&extended));
            (Some(extended), Some(sampler))
        } else {
            (None, None)
        };

        tracing::info!(
            cache = %name,
            overflow_to_disk = config.overflow_to_disk,
            bound = extended.as_ref().map_or(0, |e| e.bound_kinds().len()),
            "cache ready"
        );

        Ok(Self {
            config,
            graph,
            node,
            store,
            statistics,
            extended,
            sampler: Mutex::new(sampler),
            writer: None,
            last_creation: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        })
    }

    /// Installs a write-through delegate notified of every stored and removed
    /// element.
    pub fn with_writer(mut self, writer: Arc<dyn CacheWriter<K, V>>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// This cache's node in its component graph.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn graph(&self) -> &Arc<ComponentGraph> {
        &self.graph
    }

    /// The tier chain backing this cache.
    pub fn store(&self) -> &TieredStore<K, V> {
        &self.store
    }

    /// Bound statistics, when enabled.
    pub fn statistics(&self) -> Option<&Arc<ExtendedStatistics>> {
        self.extended.as_ref()
    }

    fn writer(&self) -> Option<&dyn CacheWriter<K, V>> {
        self.writer.as_deref()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// A creation time strictly greater than every one handed out before.
    fn next_creation_time(&self) -> u64 {
        let now = now_millis();
        let previous = self
            .last_creation
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        now.max(previous + 1)
    }

    /// Applies the configured lifespan and re-stamps `element` as created now.
    fn prepare(&self, mut element: Element<K, V>) -> Element<K, V> {
        if self.config.eternal && element.time_to_live().is_none() && element.time_to_idle().is_none() {
            element = element.with_eternal(true);
        }
        if element.time_to_live().is_none() && self.config.time_to_live_secs > 0 {
            element = element.with_time_to_live(self.config.time_to_live_secs);
        }
        if element.time_to_idle().is_none() && self.config.time_to_idle_secs > 0 {
            element = element.with_time_to_idle(self.config.time_to_idle_secs);
        }
        element.restamp(self.next_creation_time());
        element
    }

    fn live(&self, key: &K) -> Result<bool> {
        Ok(self.store.get_quiet(key)?.is_some_and(|e| !e.is_expired()))
    }

    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.put_element(Element::new(key, value))
    }

    /// Stores `element`, overwriting any previous mapping. The element is
    /// re-stamped: its creation time and version are always fresh.
    pub fn put_element(&self, element: Element<K, V>) -> Result<()> {
        let element = self.prepare(element);
        // Added vs Updated is classified before the write and may race with
        // another writer on the same key.
        let existed = self.live(element.key())?;
        self.store.put_with_writer(element, self.writer())?;
        self.statistics.put.record(if existed {
            CachePutOutcome::Updated
        } else {
            CachePutOutcome::Added
        });
        Ok(())
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.get_element(key)?.map(Element::into_value))
    }

    /// The live element for `key`. An expired element is removed and
    /// reported as a miss.
    pub fn get_element(&self, key: &K) -> Result<Option<Element<K, V>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let Some(element) = self.store.get(key)? else {
            self.statistics.get.record(CacheGetOutcome::MissNotFound);
            return Ok(None);
        };
        if element.is_expired() {
            let outcome = match self.store.remove_element(&element, &VersionComparator) {
                Ok(_) => ExpiredOutcome::Success,
                Err(e) => {
                    tracing::warn!(cache = %self.name(), error = %e, "failed to remove expired element");
                    ExpiredOutcome::Failure
                }
            };
            self.statistics.expiry.record(outcome);
            self.statistics.get.record(CacheGetOutcome::MissExpired);
            return Ok(None);
        }
        self.statistics.get.record(CacheGetOutcome::Hit);
        Ok(Some(element))
    }

    /// Stores `value` unless a live mapping exists, in which case that
    /// value is returned and nothing changes.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        let element = self.prepare(Element::new(key, value));
        let notified = self.writer.as_ref().map(|_| element.clone());
        match self.store.put_if_absent(element)? {
            Some(existing) => {
                self.statistics.put.record(CachePutOutcome::Ignored);
                Ok(Some(existing.into_value()))
            }
            None => {
                self.statistics.put.record(CachePutOutcome::Added);
                notify_write(self.writer(), notified.as_ref())?;
                Ok(None)
            }
        }
    }

    /// Overwrites a live mapping; returns the previous value, or `None` with
    /// nothing stored.
    pub fn replace(&self, key: K, value: V) -> Result<Option<V>> {
        let element = self.prepare(Element::new(key, value));
        let notified = self.writer.as_ref().map(|_| element.clone());
        match self.store.replace(element)? {
            Some(previous) => {
                self.statistics.put.record(CachePutOutcome::Updated);
                notify_write(self.writer(), notified.as_ref())?;
                Ok(Some(previous.into_value()))
            }
            None => {
                self.statistics.put.record(CachePutOutcome::Ignored);
                Ok(None)
            }
        }
    }

    /// Removes the mapping and returns its value if it was live.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        // An expired element is dropped but reported as not found.
        let removed = self
            .store
            .remove_with_writer(key, self.writer())?
            .filter(|e| !e.is_expired());
        self.statistics.remove.record(match removed {
            Some(_) => CacheRemoveOutcome::Success,
            None => CacheRemoveOutcome::NotFound,
        });
        Ok(removed.map(Element::into_value))
    }

    /// Drops every mapping, tier by tier. The write delegate is not
    /// notified.
    pub fn remove_all(&self) -> Result<()> {
        self.store.remove_all()?;
        tracing::debug!(cache = %self.name(), "removed all elements");
        Ok(())
    }

    /// Sweeps expired elements out of every tier and returns how many went.
    pub fn evict_expired(&self) -> usize {
        let expired = self.store.expire_elements();
        for _ in 0..expired {
            self.statistics.expiry.record(ExpiredOutcome::Success);
        }
        expired
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn size(&self) -> usize {
        self.store.size()
    }

    pub fn in_memory_size(&self) -> usize {
        self.store.in_memory_size()
    }

    pub fn on_disk_size(&self) -> usize {
        self.store.on_disk_size()
    }

    pub fn in_memory_size_in_bytes(&self) -> u64 {
        self.store.in_memory_size_in_bytes()
    }

    pub fn on_disk_size_in_bytes(&self) -> u64 {
        self.store.on_disk_size_in_bytes()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    pub fn contains_key_in_memory(&self, key: &K) -> bool {
        self.store.contains_key_in_memory(key)
    }

    pub fn contains_key_on_disk(&self, key: &K) -> bool {
        self.store.contains_key_on_disk(key)
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.store.flush()?)
    }

    pub fn status(&self) -> Status {
        self.store.status()
    }

    pub fn management(&self) -> Option<StoreManagement> {
        self.store.management()
    }
}

impl<K, V> Cache<K, V>
where
    K: StoreKey + Serialize + DeserializeOwned,
    V: StoreValue + Serialize + DeserializeOwned + PartialEq,
{
    /// Swaps in `value` iff the live value equals `expected`.
    pub fn replace_if_equals(&self, key: K, expected: &V, value: V) -> Result<bool> {
        let old = Element::new(key.clone(), expected.clone());
        let new = self.prepare(Element::new(key, value));
        let notified = self.writer.as_ref().map(|_| new.clone());
        let replaced = self
            .store
            .replace_if(&old, new, &DefaultElementValueComparator)?;
        if replaced {
            self.statistics.put.record(CachePutOutcome::Updated);
            notify_write(self.writer(), notified.as_ref())?;
        }
        Ok(replaced)
    }

    /// Removes the mapping iff the live value equals `expected`.
    pub fn remove_if_equals(&self, key: K, expected: V) -> Result<bool> {
        let probe = Element::new(key, expected);
        let removed = self
            .store
            .remove_element(&probe, &DefaultElementValueComparator)?;
        self.statistics.remove.record(match removed {
            Some(_) => CacheRemoveOutcome::Success,
            None => CacheRemoveOutcome::NotFound,
        });
        notify_delete(self.writer(), removed.as_ref())?;
        Ok(removed.is_some())
    }
}

impl<K: StoreKey, V: StoreValue> Cache<K, V> {
    /// Stops sampling, releases every tier and removes this cache from its
    /// graph and the statistics registry. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut sampler) = self.sampler.lock().take() {
            sampler.stop();
        }
        if let Some(extended) = &self.extended {
            stats_registry::unregister(&self.config.name, extended);
        }
        self.store.dispose();
        self.graph.remove(self.node);
        tracing::info!(cache = %self.config.name, "cache disposed");
    }
}

impl<K: StoreKey, V: StoreValue> Drop for Cache<K, V> {
    fn drop(&mut self) {
        self.dispose();
    }
}
