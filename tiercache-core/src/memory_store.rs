use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tiercache_stats::{EvictionOutcome, NodeId, StoreGetOutcome, StorePutOutcome, StoreRemoveOutcome};

use crate::element::now_millis;
use crate::writer::{notify_delete, notify_write};
use crate::{
    CacheError, CacheWriter, Element, ElementValueComparator, EvictionCandidate, EvictionPolicy,
    Lru, MemoryEstimator, Result, StatisticsScope, Status, Store, StoreKey, StoreManagement,
    StoreStatistics, StoreValue, TierKind, VersionComparator,
};

/// Consecutive failed evictions (victim changed under us) before a sweep
/// gives up and lets the tier run over capacity until the next put.
const MAX_EVICTION_FAILURES: usize = 8;

/// Heap tier on a sharded concurrent map.
///
/// Every key operation runs under its shard's lock only. When a capacity is
/// set, a put that adds a key consults the eviction policy until the tier is
/// back within bounds. Victims go to the overflow tier if there is one and
/// are discarded otherwise, or when the overflow tier refuses them. Either
/// way they count as evictions of this tier.
///
/// # Examples
///
/// ```
/// use tiercache_core::{Element, MemoryStore, Store};
///
/// let store = MemoryStore::<String, u32>::builder("users").capacity(2).build().unwrap();
/// store.put(Element::new("a".to_string(), 1)).unwrap();
/// store.put(Element::new("b".to_string(), 2)).unwrap();
/// let evicted = store.put(Element::new("c".to_string(), 3)).unwrap();
///
/// assert!(evicted);
/// assert_eq!(store.size(), 2);
/// ```
pub struct MemoryStore<K, V> {
    name: String,
    map: DashMap<K, Element<K, V>>,
    capacity: Option<usize>,
    bytes: AtomicI64,
    policy: RwLock<Arc<dyn EvictionPolicy<K>>>,
    overflow: Option<Arc<dyn Store<K, V>>>,
    disposed: AtomicBool,
    statistics: StoreStatistics,
}

pub struct MemoryStoreBuilder<K, V> {
    name: String,
    capacity: Option<usize>,
    policy: Option<Arc<dyn EvictionPolicy<K>>>,
    overflow: Option<Arc<dyn Store<K, V>>>,
    scope: StatisticsScope,
}

impl<K: StoreKey, V: StoreValue> MemoryStoreBuilder<K, V> {
    /// Maximum resident elements; 0 means unbounded.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = (capacity > 0).then_some(capacity);
        self
    }

    pub fn eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K>>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Tier receiving evicted elements.
    pub fn overflow(mut self, overflow: Arc<dyn Store<K, V>>) -> Self {
        self.overflow = Some(overflow);
        self
    }

    pub fn statistics(mut self, scope: StatisticsScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn build(self) -> Result<MemoryStore<K, V>> {
        let statistics = self.scope.register_store(&self.name, Some(TierKind::Heap))?;
        Ok(MemoryStore {
            name: self.name,
            map: DashMap::new(),
            capacity: self.capacity,
            bytes: AtomicI64::new(0),
            policy: RwLock::new(self.policy.unwrap_or_else(|| Arc::new(Lru))),
            overflow: self.overflow,
            disposed: AtomicBool::new(false),
            statistics,
        })
    }
}

fn weight<K: MemoryEstimator, V: MemoryEstimator>(element: &Element<K, V>) -> i64 {
    element.estimate_memory() as i64
}

impl<K: StoreKey, V: StoreValue> MemoryStore<K, V> {
    pub fn builder(name: impl Into<String>) -> MemoryStoreBuilder<K, V> {
        MemoryStoreBuilder {
            name: name.into(),
            capacity: None,
            policy: None,
            overflow: None,
            scope: StatisticsScope::detached(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn statistics(&self) -> &StoreStatistics {
        &self.statistics
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CacheError::Disposed)
        } else {
            Ok(())
        }
    }

    fn adjust_bytes(&self, delta: i64) {
        self.bytes.fetch_add(delta, Ordering::Relaxed);
    }

    fn released(&self, element: Element<K, V>) -> Element<K, V> {
        self.adjust_bytes(-weight(&element));
        element
    }

    /// Evicts until the tier is within capacity. `just_added` is never a
    /// victim.
    fn make_room(&self, just_added: &K) -> bool {
        let Some(capacity) = self.capacity else {
            return false;
        };

        let mut evicted = false;
        let mut failures = 0;
        while self.map.len() > capacity && failures < MAX_EVICTION_FAILURES {
            let Some(victim) = self.select_victim(just_added) else {
                break;
            };
            if self.evict(&victim) {
                evicted = true;
            } else {
                failures += 1;
            }
        }
        evicted
    }

    fn select_victim(&self, just_added: &K) -> Option<K> {
        let candidates: Vec<EvictionCandidate<K>> = self
            .map
            .iter()
            .filter(|entry| entry.key() != just_added)
            .map(|entry| EvictionCandidate {
                key: entry.key().clone(),
                metadata: *entry.value().metadata(),
            })
            .collect();
        let policy = Arc::clone(&*self.policy.read());
        policy.select_victim(&candidates)
    }

    /// Moves `key` out of this tier. The overflow copy is written before the
    /// local one is dropped so readers probing tiers in order never miss it.
    /// A victim the overflow tier refuses is discarded.
    fn evict(&self, key: &K) -> bool {
        let Some(victim) = self.map.get(key).map(|entry| entry.value().clone()) else {
            return false;
        };

        let spill = match &self.overflow {
            Some(overflow) if !victim.is_expired() => Some(overflow),
            _ => None,
        };
        let spilled = match spill {
            Some(overflow) => match overflow.put(victim.clone()) {
                Ok(_) => Some(overflow),
                Err(e) => {
                    tracing::warn!(store = %self.name, error = %e, "spill to overflow failed, discarding victim");
                    None
                }
            },
            None => None,
        };

        if self.remove_version(key, victim.version()) {
            self.statistics.eviction.record(EvictionOutcome::Success);
            return true;
        }

        if let Some(overflow) = spilled {
            // Updated or removed while spilling; the spilled copy is stale.
            match overflow.remove_element(&victim, &VersionComparator) {
                Ok(_) => {
                    tracing::debug!(store = %self.name, "victim changed during spill, withdrew overflow copy");
                }
                Err(e) => {
                    tracing::warn!(store = %self.name, error = %e, "could not withdraw stale overflow copy");
                }
            }
        }
        false
    }

    fn remove_version(&self, key: &K, version: u64) -> bool {
        match self.map.remove_if(key, |_, current| current.version() == version) {
            Some((_, removed)) => {
                self.released(removed);
                true
            }
            None => false,
        }
    }
}

impl<K: StoreKey, V: StoreValue> Store<K, V> for MemoryStore<K, V> {
    fn put_with_writer(
        &self,
        element: Element<K, V>,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<bool> {
        self.ensure_alive()?;
        let key = element.key().clone();
        let notified = writer.map(|_| element.clone());
        let added = weight(&element);

        let previous = self.map.insert(key.clone(), element);
        self.adjust_bytes(added - previous.as_ref().map_or(0, weight));

        let evicted = if previous.is_some() {
            self.statistics.put.record(StorePutOutcome::Replaced);
            false
        } else {
            self.statistics.put.record(StorePutOutcome::Added);
            self.make_room(&key)
        };

        notify_write(writer, notified.as_ref())?;
        Ok(evicted)
    }

    fn get(&self, key: &K) -> Result<Option<Element<K, V>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let now = now_millis();
        let found = self.map.get_mut(key).map(|mut entry| {
            entry.value_mut().record_access(now);
            entry.value().clone()
        });
        self.statistics.get.record(match found {
            Some(_) => StoreGetOutcome::Hit,
            None => StoreGetOutcome::Miss,
        });
        Ok(found)
    }

    fn get_quiet(&self, key: &K) -> Result<Option<Element<K, V>>> {
        Ok(self.map.get(key).map(|entry| entry.value().clone()))
    }

    fn keys(&self) -> Vec<K> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    fn put_if_absent(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let now = now_millis();
        let key = element.key().clone();
        let added = weight(&element);

        let outcome = match self.map.entry(key.clone()) {
            Entry::Occupied(occupied) if !occupied.get().is_expired_at(now) => {
                return Ok(Some(occupied.get().clone()));
            }
            Entry::Occupied(mut occupied) => {
                let stale = occupied.insert(element);
                self.adjust_bytes(added - weight(&stale));
                StorePutOutcome::Replaced
            }
            Entry::Vacant(vacant) => {
                vacant.insert(element);
                self.adjust_bytes(added);
                StorePutOutcome::Added
            }
        };

        self.statistics.put.record(outcome);
        if outcome == StorePutOutcome::Added {
            self.make_room(&key);
        }
        Ok(None)
    }

    fn replace_if(
        &self,
        old: &Element<K, V>,
        new: Element<K, V>,
        comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<bool> {
        if old.key() != new.key() {
            return Err(CacheError::KeyMismatch);
        }
        self.ensure_alive()?;
        let now = now_millis();
        let added = weight(&new);

        match self.map.get_mut(old.key()) {
            Some(mut current)
                if !current.value().is_expired_at(now) && comparator.equals(old, current.value()) =>
            {
                let previous = std::mem::replace(current.value_mut(), new);
                self.adjust_bytes(added - weight(&previous));
                self.statistics.put.record(StorePutOutcome::Replaced);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn replace(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let now = now_millis();
        let added = weight(&element);

        match self.map.get_mut(element.key()) {
            Some(mut current) if !current.value().is_expired_at(now) => {
                let previous = std::mem::replace(current.value_mut(), element);
                self.adjust_bytes(added - weight(&previous));
                self.statistics.put.record(StorePutOutcome::Replaced);
                Ok(Some(previous))
            }
            _ => Ok(None),
        }
    }

    fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let now = now_millis();
        let removed = self.map.remove_if(element.key(), |_, current| {
            !current.is_expired_at(now) && comparator.equals(element, current)
        });
        Ok(removed.map(|(_, removed)| {
            self.statistics.remove.record(StoreRemoveOutcome::Success);
            self.released(removed)
        }))
    }

    fn remove_with_writer(
        &self,
        key: &K,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let removed = self.map.remove(key).map(|(_, removed)| {
            self.statistics.remove.record(StoreRemoveOutcome::Success);
            self.released(removed)
        });
        notify_delete(writer, removed.as_ref())?;
        Ok(removed)
    }

    fn remove_all(&self) -> Result<()> {
        self.ensure_alive()?;
        for key in self.keys() {
            if let Some((_, removed)) = self.map.remove(&key) {
                self.statistics.remove.record(StoreRemoveOutcome::Success);
                self.released(removed);
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn in_memory_size(&self) -> usize {
        self.map.len()
    }

    fn on_disk_size(&self) -> usize {
        0
    }

    fn in_memory_size_in_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed).max(0) as u64
    }

    fn on_disk_size_in_bytes(&self) -> u64 {
        0
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn contains_key_in_memory(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn contains_key_on_disk(&self, _key: &K) -> bool {
        false
    }

    fn eviction_policy(&self) -> Option<Arc<dyn EvictionPolicy<K>>> {
        Some(Arc::clone(&*self.policy.read()))
    }

    fn set_eviction_policy(&self, policy: Arc<dyn EvictionPolicy<K>>) {
        *self.policy.write() = policy;
    }

    fn expire_elements(&self) -> usize {
        if self.is_disposed() {
            return 0;
        }
        let now = now_millis();
        let mut expired = 0;
        for key in self.keys() {
            if let Some((_, removed)) = self.map.remove_if(&key, |_, e| e.is_expired_at(now)) {
                self.released(removed);
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::debug!(store = %self.name, expired, "expired elements");
        }
        expired
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.map.clear();
        self.bytes.store(0, Ordering::Relaxed);
        self.statistics.unregister();
        tracing::info!(store = %self.name, "disposed memory store");
    }

    fn status(&self) -> Status {
        if self.is_disposed() {
            Status::Shutdown
        } else {
            Status::Alive
        }
    }

    fn internal_context(&self) -> Option<NodeId> {
        self.statistics.node()
    }

    fn management(&self) -> Option<StoreManagement> {
        Some(StoreManagement {
            name: self.name.clone(),
            tier: Some(TierKind::Heap),
            status: self.status(),
            size: self.size(),
            in_memory_size: self.in_memory_size(),
            off_heap_size: 0,
            on_disk_size: 0,
            in_memory_size_in_bytes: self.in_memory_size_in_bytes(),
            on_disk_size_in_bytes: 0,
            capacity: self.capacity,
            eviction_policy: Some(self.policy.read().name().to_string()),
            tiers: Vec::new(),
        })
    }

    fn tier(&self) -> Option<TierKind> {
        Some(TierKind::Heap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultElementValueComparator, Fifo, WriterError};
    use parking_lot::Mutex;

    fn store(capacity: usize) -> MemoryStore<String, String> {
        MemoryStore::builder("test").capacity(capacity).build().unwrap()
    }

    fn element(key: &str, value: &str) -> Element<String, String> {
        Element::new(key.to_string(), value.to_string())
    }

    #[test]
    fn test_put_get_and_overwrite() {
        let s = store(0);
        assert!(!s.put(element("k", "v1")).unwrap());
        assert!(!s.put(element("k", "v2")).unwrap());
        assert_eq!(s.get(&"k".to_string()).unwrap().unwrap().value(), "v2");
        assert_eq!(s.size(), 1);
        assert_eq!(s.statistics().put.count(StorePutOutcome::Added), 1);
        assert_eq!(s.statistics().put.count(StorePutOutcome::Replaced), 1);
    }

    #[test]
    fn test_get_quiet_leaves_bookkeeping_alone() {
        let s = store(0);
        s.put(element("k", "v")).unwrap();
        s.get_quiet(&"k".to_string()).unwrap();
        assert_eq!(s.get_quiet(&"k".to_string()).unwrap().unwrap().hit_count(), 0);
        assert_eq!(s.statistics().get.total(), 0);

        s.get(&"k".to_string()).unwrap();
        assert_eq!(s.get_quiet(&"k".to_string()).unwrap().unwrap().hit_count(), 1);
    }

    #[test]
    fn test_lru_eviction_respects_recent_access() {
        let s = store(2);
        s.put(Element::new_at("a".to_string(), "1".to_string(), 1)).unwrap();
        s.put(Element::new_at("b".to_string(), "2".to_string(), 2)).unwrap();
        s.get(&"a".to_string()).unwrap();

        assert!(s.put(element("c", "3")).unwrap());
        assert!(s.contains_key(&"a".to_string()));
        assert!(!s.contains_key(&"b".to_string()));
        assert_eq!(s.statistics().eviction.count(EvictionOutcome::Success), 1);
    }

    #[test]
    fn test_policy_can_be_swapped() {
        let s = store(2);
        s.set_eviction_policy(Arc::new(Fifo));
        assert_eq!(s.eviction_policy().unwrap().name(), "fifo");

        s.put(Element::new_at("a".to_string(), "1".to_string(), 1)).unwrap();
        s.put(Element::new_at("b".to_string(), "2".to_string(), 2)).unwrap();
        s.get(&"a".to_string()).unwrap();
        s.put(element("c", "3")).unwrap();
        assert!(!s.contains_key(&"a".to_string()));
    }

    #[test]
    fn test_spill_to_overflow_preserves_metadata() {
        let overflow: Arc<MemoryStore<String, String>> = Arc::new(store(0));
        let s = MemoryStore::builder("front")
            .capacity(1)
            .overflow(Arc::clone(&overflow) as Arc<dyn Store<String, String>>)
            .build()
            .unwrap();

        let first = element("a", "1");
        let (version, created) = (first.version(), first.creation_time());
        s.put(first).unwrap();
        assert!(s.put(element("b", "2")).unwrap());

        let spilled = overflow.get_quiet(&"a".to_string()).unwrap().unwrap();
        assert_eq!(spilled.version(), version);
        assert_eq!(spilled.creation_time(), created);
        assert_eq!(s.size() + overflow.size(), 2);
    }

    #[test]
    fn test_expired_victim_is_discarded_not_spilled() {
        let overflow: Arc<MemoryStore<String, String>> = Arc::new(store(0));
        let s = MemoryStore::builder("front")
            .capacity(1)
            .overflow(Arc::clone(&overflow) as Arc<dyn Store<String, String>>)
            .build()
            .unwrap();
        s.put(Element::new_at("old".to_string(), "x".to_string(), 0).with_time_to_live(1))
            .unwrap();
        assert!(s.put(element("new", "y")).unwrap());
        assert_eq!(overflow.size(), 0);
    }

    #[test]
    fn test_refused_spill_discards_victim_and_keeps_capacity() {
        let overflow: Arc<MemoryStore<String, String>> = Arc::new(store(0));
        let s = MemoryStore::builder("front")
            .capacity(1)
            .overflow(Arc::clone(&overflow) as Arc<dyn Store<String, String>>)
            .build()
            .unwrap();
        let writer = Recording::default();

        s.put(element("a", "1")).unwrap();
        overflow.dispose();
        assert!(s.put_with_writer(element("b", "2"), Some(&writer)).unwrap());

        assert_eq!(s.size(), 1);
        assert_eq!(s.keys(), vec!["b".to_string()]);
        assert_eq!(*writer.written.lock(), vec!["b".to_string()]);
        assert_eq!(s.statistics().eviction.count(EvictionOutcome::Success), 1);
    }

    #[test]
    fn test_conditional_operations_skip_expired() {
        let s = store(0);
        let stale = Element::new_at("k".to_string(), "old".to_string(), 0).with_time_to_live(1);
        s.put(stale.clone()).unwrap();

        assert!(s.replace(element("k", "x")).unwrap().is_none());
        assert!(!s
            .replace_if(&stale, element("k", "y"), &DefaultElementValueComparator)
            .unwrap());
        assert!(s.put_if_absent(element("k", "fresh")).unwrap().is_none());
        assert_eq!(s.get_quiet(&"k".to_string()).unwrap().unwrap().value(), "fresh");
    }

    #[test]
    fn test_byte_accounting() {
        let s = store(0);
        s.put(element("k", "short")).unwrap();
        let small = s.in_memory_size_in_bytes();
        assert!(small > 0);

        s.put(element("k", &"long".repeat(100))).unwrap();
        assert!(s.in_memory_size_in_bytes() > small);

        s.remove(&"k".to_string()).unwrap();
        assert_eq!(s.in_memory_size_in_bytes(), 0);
    }

    #[test]
    fn test_expire_elements() {
        let s = store(0);
        s.put(Element::new_at("gone".to_string(), "x".to_string(), 0).with_time_to_live(1))
            .unwrap();
        s.put(element("kept", "y")).unwrap();
        assert_eq!(s.expire_elements(), 1);
        assert_eq!(s.keys(), vec!["kept".to_string()]);
    }

    #[derive(Default)]
    struct Recording {
        written: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CacheWriter<String, String> for Recording {
        fn write(&self, element: &Element<String, String>) -> std::result::Result<(), WriterError> {
            if self.fail {
                return Err("backend down".into());
            }
            self.written.lock().push(element.key().clone());
            Ok(())
        }

        fn delete(&self, element: &Element<String, String>) -> std::result::Result<(), WriterError> {
            self.deleted.lock().push(element.key().clone());
            Ok(())
        }
    }

    #[test]
    fn test_writer_notified_once_per_change() {
        let s = store(0);
        let writer = Recording::default();
        s.put_with_writer(element("k", "v"), Some(&writer)).unwrap();
        s.remove_with_writer(&"k".to_string(), Some(&writer)).unwrap();
        s.remove_with_writer(&"k".to_string(), Some(&writer)).unwrap();

        assert_eq!(*writer.written.lock(), vec!["k".to_string()]);
        assert_eq!(*writer.deleted.lock(), vec!["k".to_string()]);
    }

    #[test]
    fn test_writer_failure_keeps_local_change() {
        let s = store(0);
        let writer = Recording {
            fail: true,
            ..Default::default()
        };
        let err = s.put_with_writer(element("k", "v"), Some(&writer)).unwrap_err();
        assert!(matches!(err, CacheError::Writer(_)));
        assert!(s.contains_key(&"k".to_string()));
    }

    #[test]
    fn test_dispose() {
        let s = store(0);
        s.put(element("k", "v")).unwrap();
        s.dispose();
        s.dispose();

        assert_eq!(s.status(), Status::Shutdown);
        assert_eq!(s.size(), 0);
        assert!(s.get(&"k".to_string()).unwrap().is_none());
        assert!(matches!(s.put(element("k", "v")), Err(CacheError::Disposed)));
    }

    #[test]
    fn test_management_snapshot() {
        let s = store(5);
        s.put(element("k", "v")).unwrap();
        let m = s.management().unwrap();
        assert_eq!(m.size, 1);
        assert_eq!(m.capacity, Some(5));
        assert_eq!(m.eviction_policy.as_deref(), Some("lru"));
        assert_eq!(m.tier, Some(TierKind::Heap));
    }
}
