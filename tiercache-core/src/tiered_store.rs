use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tiercache_stats::{NodeId, StoreGetOutcome, StorePutOutcome, StoreRemoveOutcome};

use crate::element::now_millis;
use crate::striped_lock::StripedLock;
use crate::writer::{notify_delete, notify_write};
use crate::{
    CacheError, CacheWriter, Element, ElementValueComparator, EvictionPolicy, NullStore, Result,
    Status, Store, StoreKey, StoreManagement, StoreStatistics, StoreValue, TierKind,
};

const LOCK_STRIPES: usize = 64;

/// A chain of tiers, fastest first, behind the same store contract.
///
/// Writes land in the first tier and then clear the key from every lower
/// tier, so a key is resident in one tier at a time outside a spill. Reads
/// probe the tiers in order and do not promote. Each chain-level operation
/// on a key runs under that key's stripe lock.
///
/// Tiers spill on their own: a first tier built with an overflow moves its
/// victims down without going through the chain.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiercache_core::{Element, MemoryStore, StatisticsScope, Store, TieredStore};
///
/// let overflow: Arc<MemoryStore<String, u32>> =
///     Arc::new(MemoryStore::builder("users:overflow").build().unwrap());
/// let front = MemoryStore::<String, u32>::builder("users:front")
///     .capacity(1)
///     .overflow(overflow.clone())
///     .build()
///     .unwrap();
/// let chain = TieredStore::new(
///     "users",
///     vec![Arc::new(front) as Arc<dyn Store<_, _>>, overflow],
///     StatisticsScope::detached().register_store("users", None).unwrap(),
/// );
///
/// chain.put(Element::new("a".to_string(), 1)).unwrap();
/// chain.put(Element::new("b".to_string(), 2)).unwrap();
/// assert_eq!(chain.size(), 2);
/// assert!(chain.get(&"a".to_string()).unwrap().is_some());
/// ```
pub struct TieredStore<K, V> {
    name: String,
    tiers: Vec<Arc<dyn Store<K, V>>>,
    locks: StripedLock,
    disposed: AtomicBool,
    statistics: StoreStatistics,
}

impl<K: StoreKey, V: StoreValue> TieredStore<K, V> {
    /// `statistics` is normally the registration the tiers were scoped
    /// under, so the tiers appear as its children.
    pub fn new(
        name: impl Into<String>,
        mut tiers: Vec<Arc<dyn Store<K, V>>>,
        statistics: StoreStatistics,
    ) -> Self {
        if tiers.is_empty() {
            tiers.push(Arc::new(NullStore::new()));
        }
        Self {
            name: name.into(),
            tiers,
            locks: StripedLock::new(LOCK_STRIPES),
            disposed: AtomicBool::new(false),
            statistics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tiers(&self) -> &[Arc<dyn Store<K, V>>] {
        &self.tiers
    }

    pub fn statistics(&self) -> &StoreStatistics {
        &self.statistics
    }

    fn front(&self) -> &Arc<dyn Store<K, V>> {
        &self.tiers[0]
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

    /// First resident copy of `key`, without touching bookkeeping.
    fn locate(&self, key: &K) -> Result<Option<Element<K, V>>> {
        for tier in &self.tiers {
            if let Some(element) = tier.get_quiet(key)? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    fn locate_live(&self, key: &K) -> Result<Option<Element<K, V>>> {
        let now = now_millis();
        Ok(self.locate(key)?.filter(|e| !e.is_expired_at(now)))
    }

    /// Clears lower copies, then writes to the front tier. Returns whether the
    /// front tier evicted, and whether any tier already held the key.
    ///
    /// A lower tier that fails to drop its copy aborts the write before the
    /// front is touched, so a key never ends up resident in two tiers.
    fn write_front(&self, element: Element<K, V>) -> Result<(bool, bool)> {
        let key = element.key().clone();
        let existed = self.front().contains_key(&key);
        let mut cleared = false;
        for tier in &self.tiers[1..] {
            cleared |= tier.remove(&key)?.is_some();
        }
        let evicted = self.front().put(element)?;
        Ok((evicted, existed || cleared))
    }

    fn remove_everywhere(&self, key: &K) -> Result<Option<Element<K, V>>> {
        let mut removed = None;
        for tier in &self.tiers {
            if let Some(element) = tier.remove(key)? {
                removed.get_or_insert(element);
            }
        }
        Ok(removed)
    }

    fn record_put(&self, existed: bool) {
        self.statistics.put.record(if existed {
            StorePutOutcome::Replaced
        } else {
            StorePutOutcome::Added
        });
    }
}

impl<K: StoreKey, V: StoreValue> Store<K, V> for TieredStore<K, V> {
    fn put_with_writer(
        &self,
        element: Element<K, V>,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<bool> {
        self.ensure_alive()?;
        let notified = writer.map(|_| element.clone());
        let (evicted, existed) = {
            let _guard = self.locks.lock(element.key());
            self.write_front(element)?
        };
        self.record_put(existed);
        notify_write(writer, notified.as_ref())?;
        Ok(evicted)
    }

    fn get(&self, key: &K) -> Result<Option<Element<K, V>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let _guard = self.locks.lock(key);
        for tier in &self.tiers {
            if let Some(element) = tier.get(key)? {
                self.statistics.get.record(StoreGetOutcome::Hit);
                return Ok(Some(element));
            }
        }
        self.statistics.get.record(StoreGetOutcome::Miss);
        Ok(None)
    }

    fn get_quiet(&self, key: &K) -> Result<Option<Element<K, V>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let _guard = self.locks.lock(key);
        self.locate(key)
    }

    fn keys(&self) -> Vec<K> {
        let mut seen = std::collections::HashSet::new();
        self.tiers
            .iter()
            .flat_map(|tier| tier.keys())
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    fn put_if_absent(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let _guard = self.locks.lock(element.key());
        if let Some(existing) = self.locate_live(element.key())? {
            return Ok(Some(existing));
        }
        let (_, existed) = self.write_front(element)?;
        self.record_put(existed);
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
        let _guard = self.locks.lock(old.key());
        match self.locate_live(old.key())? {
            Some(current) if comparator.equals(old, &current) => {
                self.write_front(new)?;
                self.record_put(true);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn replace(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let _guard = self.locks.lock(element.key());
        let Some(current) = self.locate_live(element.key())? else {
            return Ok(None);
        };
        self.write_front(element)?;
        self.record_put(true);
        Ok(Some(current))
    }

    fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let _guard = self.locks.lock(element.key());
        match self.locate_live(element.key())? {
            Some(current) if comparator.equals(element, &current) => {
                self.remove_everywhere(element.key())?;
                self.statistics.remove.record(StoreRemoveOutcome::Success);
                Ok(Some(current))
            }
            _ => Ok(None),
        }
    }

    fn remove_with_writer(
        &self,
        key: &K,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let removed = {
            let _guard = self.locks.lock(key);
            self.remove_everywhere(key)?
        };
        if removed.is_some() {
            self.statistics.remove.record(StoreRemoveOutcome::Success);
        }
        notify_delete(writer, removed.as_ref())?;
        Ok(removed)
    }

    fn remove_all(&self) -> Result<()> {
        self.ensure_alive()?;
        for tier in &self.tiers {
            tier.remove_all()?;
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.tiers.iter().map(|t| t.size()).sum()
    }

    fn in_memory_size(&self) -> usize {
        self.tiers.iter().map(|t| t.in_memory_size()).sum()
    }

    fn off_heap_size(&self) -> usize {
        self.tiers.iter().map(|t| t.off_heap_size()).sum()
    }

    fn on_disk_size(&self) -> usize {
        self.tiers.iter().map(|t| t.on_disk_size()).sum()
    }

    fn clustered_size(&self) -> usize {
        self.tiers.iter().map(|t| t.clustered_size()).sum()
    }

    fn in_memory_size_in_bytes(&self) -> u64 {
        self.tiers.iter().map(|t| t.in_memory_size_in_bytes()).sum()
    }

    fn off_heap_size_in_bytes(&self) -> u64 {
        self.tiers.iter().map(|t| t.off_heap_size_in_bytes()).sum()
    }

    fn on_disk_size_in_bytes(&self) -> u64 {
        self.tiers.iter().map(|t| t.on_disk_size_in_bytes()).sum()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.tiers.iter().any(|t| t.contains_key(key))
    }

    fn contains_key_in_memory(&self, key: &K) -> bool {
        self.tiers.iter().any(|t| t.contains_key_in_memory(key))
    }

    fn contains_key_off_heap(&self, key: &K) -> bool {
        self.tiers.iter().any(|t| t.contains_key_off_heap(key))
    }

    fn contains_key_on_disk(&self, key: &K) -> bool {
        self.tiers.iter().any(|t| t.contains_key_on_disk(key))
    }

    fn eviction_policy(&self) -> Option<Arc<dyn EvictionPolicy<K>>> {
        self.front().eviction_policy()
    }

    fn set_eviction_policy(&self, policy: Arc<dyn EvictionPolicy<K>>) {
        self.front().set_eviction_policy(policy);
    }

    fn expire_elements(&self) -> usize {
        self.tiers.iter().map(|t| t.expire_elements()).sum()
    }

    fn flush(&self) -> Result<()> {
        for tier in &self.tiers {
            tier.flush()?;
        }
        Ok(())
    }

    fn buffer_full(&self) -> bool {
        self.tiers.iter().any(|t| t.buffer_full())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for tier in &self.tiers {
            tier.dispose();
        }
        self.statistics.unregister();
        tracing::info!(store = %self.name, tiers = self.tiers.len(), "disposed tiered store");
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
            tier: None,
            status: self.status(),
            size: self.size(),
            in_memory_size: self.in_memory_size(),
            off_heap_size: self.off_heap_size(),
            on_disk_size: self.on_disk_size(),
            in_memory_size_in_bytes: self.in_memory_size_in_bytes(),
            on_disk_size_in_bytes: self.on_disk_size_in_bytes(),
            capacity: None,
            eviction_policy: self.eviction_policy().map(|p| p.name().to_string()),
            tiers: self.tiers.iter().filter_map(|t| t.management()).collect(),
        })
    }

    fn tier(&self) -> Option<TierKind> {
        None
    }
}
