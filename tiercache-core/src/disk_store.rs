use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tiercache_stats::{EvictionOutcome, NodeId, StoreGetOutcome, StorePutOutcome, StoreRemoveOutcome};

use crate::element::now_millis;
use crate::writer::{notify_delete, notify_write};
use crate::{
    CacheError, CacheWriter, Element, ElementMetadata, ElementValueComparator, EvictionCandidate,
    EvictionPolicy, Lru, Result, StatisticsScope, Status, Store, StoreKey, StoreManagement,
    StoreStatistics, StoreValue, TierKind,
};

const MAX_EVICTION_FAILURES: usize = 8;

/// Where one element's encoded bytes live, plus its current metadata.
///
/// The metadata in the file is whatever it was at write time; the copy in
/// the index is authoritative.
#[derive(Clone, Copy, Debug)]
struct DiskSlot {
    offset: u64,
    len: u64,
    metadata: ElementMetadata,
}

struct DataFile {
    file: File,
    end: u64,
}

/// Disk tier: an append-only data file plus an in-memory index.
///
/// Elements are encoded with `bincode` and appended; the index maps each key
/// to its latest record. Superseded records stay in the file as dead space
/// until the store is disposed, which deletes the file.
///
/// Index shard locks are always taken before the file lock, never after.
/// A failed write or read leaves the index as it was.
pub struct DiskStore<K, V> {
    name: String,
    path: PathBuf,
    index: DashMap<K, DiskSlot>,
    file: Mutex<Option<DataFile>>,
    capacity: Option<usize>,
    live_bytes: AtomicU64,
    policy: RwLock<Arc<dyn EvictionPolicy<K>>>,
    disposed: AtomicBool,
    statistics: StoreStatistics,
    _marker: PhantomData<fn() -> V>,
}

pub struct DiskStoreBuilder<K, V> {
    name: String,
    path: PathBuf,
    capacity: Option<usize>,
    policy: Option<Arc<dyn EvictionPolicy<K>>>,
    scope: StatisticsScope,
    _marker: PhantomData<fn() -> V>,
}

impl<K, V> DiskStoreBuilder<K, V>
where
    K: StoreKey + Serialize + DeserializeOwned,
    V: StoreValue + Serialize + DeserializeOwned,
{
    /// Maximum resident elements; 0 means unbounded.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = (capacity > 0).then_some(capacity);
        self
    }

    pub fn eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K>>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn statistics(mut self, scope: StatisticsScope) -> Self {
        self.scope = scope;
        self
    }

    /// Creates the data file, or takes over and truncates an existing one.
    ///
    /// The file is held under an exclusive lock for the life of the store; a
    /// path already owned by a live store fails with [`CacheError::FileInUse`].
    pub fn build(self) -> Result<DiskStore<K, V>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CacheError::io("create directory", e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| CacheError::io("open", e))?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Err(CacheError::FileInUse { path: self.path });
            }
            Err(e) => return Err(CacheError::io("lock", e)),
        }
        file.set_len(0).map_err(|e| CacheError::io("truncate", e))?;

        let statistics = self.scope.register_store(&self.name, Some(TierKind::Disk))?;
        tracing::debug!(store = %self.name, path = %self.path.display(), "opened disk store");
        Ok(DiskStore {
            name: self.name,
            path: self.path,
            index: DashMap::new(),
            file: Mutex::new(Some(DataFile { file, end: 0 })),
            capacity: self.capacity,
            live_bytes: AtomicU64::new(0),
            policy: RwLock::new(self.policy.unwrap_or_else(|| Arc::new(Lru))),
            disposed: AtomicBool::new(false),
            statistics,
            _marker: PhantomData,
        })
    }
}

impl<K, V> DiskStore<K, V>
where
    K: StoreKey + Serialize + DeserializeOwned,
    V: StoreValue + Serialize + DeserializeOwned,
{
    pub fn builder(name: impl Into<String>, path: impl Into<PathBuf>) -> DiskStoreBuilder<K, V> {
        DiskStoreBuilder {
            name: name.into(),
            path: path.into(),
            capacity: None,
            policy: None,
            scope: StatisticsScope::detached(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
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

    fn append(&self, element: &Element<K, V>) -> Result<DiskSlot> {
        let bytes = bincode::serialize(element)?;
        let mut guard = self.file.lock();
        let data = guard.as_mut().ok_or(CacheError::Disposed)?;

        let offset = data.end;
        let written = data
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| data.file.write_all(&bytes));
        if let Err(e) = written {
            tracing::warn!(store = %self.name, error = %e, "disk write failed");
            return Err(CacheError::io("write", e));
        }
        data.end += bytes.len() as u64;

        Ok(DiskSlot {
            offset,
            len: bytes.len() as u64,
            metadata: *element.metadata(),
        })
    }

    fn read(&self, slot: &DiskSlot) -> Result<Element<K, V>> {
        let mut buf = vec![0u8; slot.len as usize];
        {
            let mut guard = self.file.lock();
            let data = guard.as_mut().ok_or(CacheError::Disposed)?;
            let read = data
                .file
                .seek(SeekFrom::Start(slot.offset))
                .and_then(|_| data.file.read_exact(&mut buf));
            if let Err(e) = read {
                tracing::warn!(store = %self.name, error = %e, "disk read failed");
                return Err(CacheError::io("read", e));
            }
        }
        let mut element: Element<K, V> = bincode::deserialize(&buf)?;
        element.set_metadata(slot.metadata);
        Ok(element)
    }

    fn account(&self, added: Option<&DiskSlot>, released: Option<&DiskSlot>) {
        if let Some(slot) = added {
            self.live_bytes.fetch_add(slot.len, Ordering::Relaxed);
        }
        if let Some(slot) = released {
            self.live_bytes.fetch_sub(slot.len, Ordering::Relaxed);
        }
    }

    fn make_room(&self, just_added: &K) -> bool {
        let Some(capacity) = self.capacity else {
            return false;
        };

        let mut evicted = false;
        let mut failures = 0;
        while self.index.len() > capacity && failures < MAX_EVICTION_FAILURES {
            let candidates: Vec<EvictionCandidate<K>> = self
                .index
                .iter()
                .filter(|entry| entry.key() != just_added)
                .map(|entry| EvictionCandidate {
                    key: entry.key().clone(),
                    metadata: entry.value().metadata,
                })
                .collect();
            let policy = Arc::clone(&*self.policy.read());
            let Some(victim) = policy.select_victim(&candidates) else {
                break;
            };
            let version = candidates
                .iter()
                .find(|c| c.key == victim)
                .map(|c| c.metadata.version);

            let removed = version.and_then(|version| {
                self.index
                    .remove_if(&victim, |_, slot| slot.metadata.version == version)
            });
            match removed {
                Some((_, slot)) => {
                    self.account(None, Some(&slot));
                    self.statistics.eviction.record(EvictionOutcome::Success);
                    evicted = true;
                }
                None => failures += 1,
            }
        }
        evicted
    }
}

impl<K, V> Store<K, V> for DiskStore<K, V>
where
    K: StoreKey + Serialize + DeserializeOwned,
    V: StoreValue + Serialize + DeserializeOwned,
{
    fn put_with_writer(
        &self,
        element: Element<K, V>,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<bool> {
        self.ensure_alive()?;
        let key = element.key().clone();

        let outcome = match self.index.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = self.append(&element)?;
                let previous = occupied.insert(slot);
                self.account(Some(&slot), Some(&previous));
                StorePutOutcome::Replaced
            }
            Entry::Vacant(vacant) => {
                let slot = self.append(&element)?;
                self.account(Some(&slot), None);
                vacant.insert(slot);
                StorePutOutcome::Added
            }
        };
        self.statistics.put.record(outcome);

        let evicted = outcome == StorePutOutcome::Added && self.make_room(&key);
        notify_write(writer, Some(&element))?;
        Ok(evicted)
    }

    fn get(&self, key: &K) -> Result<Option<Element<K, V>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let now = now_millis();
        let slot = self.index.get_mut(key).map(|mut slot| {
            slot.metadata.record_access(now);
            *slot
        });
        let Some(slot) = slot else {
            self.statistics.get.record(StoreGetOutcome::Miss);
            return Ok(None);
        };
        // Records are never overwritten, so the slot stays readable even if
        // the key changes after the index lock is released.
        let element = self.read(&slot)?;
        self.statistics.get.record(StoreGetOutcome::Hit);
        Ok(Some(element))
    }

    fn get_quiet(&self, key: &K) -> Result<Option<Element<K, V>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let slot = self.index.get(key).map(|slot| *slot);
        slot.map(|slot| self.read(&slot)).transpose()
    }

    fn keys(&self) -> Vec<K> {
        self.index.iter().map(|entry| entry.key().clone()).collect()
    }

    fn put_if_absent(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let now = now_millis();
        let key = element.key().clone();

        let outcome = match self.index.entry(key.clone()) {
            Entry::Occupied(occupied) if !occupied.get().metadata.is_expired_at(now) => {
                return self.read(occupied.get()).map(Some);
            }
            Entry::Occupied(mut occupied) => {
                let slot = self.append(&element)?;
                let stale = occupied.insert(slot);
                self.account(Some(&slot), Some(&stale));
                StorePutOutcome::Replaced
            }
            Entry::Vacant(vacant) => {
                let slot = self.append(&element)?;
                self.account(Some(&slot), None);
                vacant.insert(slot);
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

        let Some(mut current) = self.index.get_mut(old.key()) else {
            return Ok(false);
        };
        if current.metadata.is_expired_at(now) {
            return Ok(false);
        }
        let stored = self.read(&current)?;
        if !comparator.equals(old, &stored) {
            return Ok(false);
        }
        let slot = self.append(&new)?;
        let previous = std::mem::replace(&mut *current, slot);
        self.account(Some(&slot), Some(&previous));
        self.statistics.put.record(StorePutOutcome::Replaced);
        Ok(true)
    }

    fn replace(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let now = now_millis();

        let Some(mut current) = self.index.get_mut(element.key()) else {
            return Ok(None);
        };
        if current.metadata.is_expired_at(now) {
            return Ok(None);
        }
        let stored = self.read(&current)?;
        let slot = self.append(&element)?;
        let previous = std::mem::replace(&mut *current, slot);
        self.account(Some(&slot), Some(&previous));
        self.statistics.put.record(StorePutOutcome::Replaced);
        Ok(Some(stored))
    }

    fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let now = now_millis();

        let Entry::Occupied(occupied) = self.index.entry(element.key().clone()) else {
            return Ok(None);
        };
        if occupied.get().metadata.is_expired_at(now) {
            return Ok(None);
        }
        let stored = self.read(occupied.get())?;
        if !comparator.equals(element, &stored) {
            return Ok(None);
        }
        let slot = occupied.remove();
        self.account(None, Some(&slot));
        self.statistics.remove.record(StoreRemoveOutcome::Success);
        Ok(Some(stored))
    }

    fn remove_with_writer(
        &self,
        key: &K,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<Option<Element<K, V>>> {
        self.ensure_alive()?;
        let removed = match self.index.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let stored = self.read(occupied.get())?;
                let slot = occupied.remove();
                self.account(None, Some(&slot));
                self.statistics.remove.record(StoreRemoveOutcome::Success);
                Some(stored)
            }
            Entry::Vacant(_) => None,
        };
        notify_delete(writer, removed.as_ref())?;
        Ok(removed)
    }

    fn remove_all(&self) -> Result<()> {
        self.ensure_alive()?;
        for key in self.keys() {
            if let Some((_, slot)) = self.index.remove(&key) {
                self.account(None, Some(&slot));
                self.statistics.remove.record(StoreRemoveOutcome::Success);
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.index.len()
    }

    fn in_memory_size(&self) -> usize {
        0
    }

    fn on_disk_size(&self) -> usize {
        self.index.len()
    }

    fn in_memory_size_in_bytes(&self) -> u64 {
        0
    }

    fn on_disk_size_in_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn contains_key_in_memory(&self, _key: &K) -> bool {
        false
    }

    fn contains_key_on_disk(&self, key: &K) -> bool {
        self.index.contains_key(key)
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
            if let Some((_, slot)) = self
                .index
                .remove_if(&key, |_, slot| slot.metadata.is_expired_at(now))
            {
                self.account(None, Some(&slot));
                expired += 1;
            }
        }
        expired
    }

    fn flush(&self) -> Result<()> {
        let guard = self.file.lock();
        match guard.as_ref() {
            Some(data) => data
                .file
                .sync_data()
                .map_err(|e| CacheError::io("flush", e)),
            None => Ok(()),
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.index.clear();
        self.live_bytes.store(0, Ordering::Relaxed);
        // Unlink while still holding the lock so a new owner never opens the
        // file we are about to delete.
        let data = self.file.lock().take();
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(store = %self.name, path = %self.path.display(), error = %e, "could not delete data file");
        }
        drop(data);
        self.statistics.unregister();
        tracing::info!(store = %self.name, "disposed disk store");
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
            tier: Some(TierKind::Disk),
            status: self.status(),
            size: self.size(),
            in_memory_size: 0,
            off_heap_size: 0,
            on_disk_size: self.on_disk_size(),
            in_memory_size_in_bytes: 0,
            on_disk_size_in_bytes: self.on_disk_size_in_bytes(),
            capacity: self.capacity,
            eviction_policy: Some(self.policy.read().name().to_string()),
            tiers: Vec::new(),
        })
    }

    fn tier(&self) -> Option<TierKind> {
        Some(TierKind::Disk)
    }
}

impl<K, V> Drop for DiskStore<K, V> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            let data = self.file.get_mut().take();
            let _ = fs::remove_file(&self.path);
            drop(data);
        }
    }
}
