//! # Store Contract
//!
//! The operation set every storage tier implements, whatever its medium.
//!
//! ## Semantics shared by all tiers
//!
//! - `get` returns what is resident, expired or not; filtering expired
//!   elements is the cache's job. Conditional operations (`put_if_absent`,
//!   `replace`, `replace_if`, `remove_element`) treat an expired element as
//!   absent.
//! - Every conditional operation is atomic per key.
//! - Sizes and `contains_key*` are tier-local and only count physically
//!   resident elements.
//! - A write delegate is notified after the local change is applied, at most
//!   once per call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiercache_stats::{tags, NodeId};

use crate::{CacheWriter, Element, ElementValueComparator, EvictionPolicy, Result};

/// Lifecycle of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Uninitialized,
    Alive,
    Shutdown,
}

/// Storage medium of a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierKind {
    Heap,
    OffHeap,
    Disk,
    Clustered,
}

impl TierKind {
    /// Tag carried by statistics this tier publishes.
    pub fn tag(self) -> &'static str {
        match self {
            TierKind::Heap => tags::HEAP,
            TierKind::OffHeap => tags::OFFHEAP,
            TierKind::Disk => tags::DISK,
            TierKind::Clustered => tags::CLUSTERED,
        }
    }
}

/// Serializable point-in-time view of a store, for management tooling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManagement {
    pub name: String,
    pub tier: Option<TierKind>,
    pub status: Status,
    pub size: usize,
    pub in_memory_size: usize,
    pub off_heap_size: usize,
    pub on_disk_size: usize,
    pub in_memory_size_in_bytes: u64,
    pub on_disk_size_in_bytes: u64,
    pub capacity: Option<usize>,
    pub eviction_policy: Option<String>,
    /// Member tiers, fastest first, for composite stores.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<StoreManagement>,
}

/// The uniform tier contract.
pub trait Store<K, V>: Send + Sync {
    /// Stores or overwrites by key. Returns whether an element was evicted
    /// to make room.
    fn put(&self, element: Element<K, V>) -> Result<bool> {
        self.put_with_writer(element, None)
    }

    fn put_with_writer(
        &self,
        element: Element<K, V>,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<bool>;

    fn get(&self, key: &K) -> Result<Option<Element<K, V>>>;

    /// Like `get` but leaves access time, hit count and statistics alone.
    fn get_quiet(&self, key: &K) -> Result<Option<Element<K, V>>>;

    fn keys(&self) -> Vec<K>;

    /// Stores the element unless a live one exists, which is then returned
    /// untouched.
    fn put_if_absent(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>>;

    /// Replaces the live element matching `old` under `comparator` with `new`.
    /// Fails with [`CacheError::KeyMismatch`](crate::CacheError::KeyMismatch)
    /// if the two keys differ.
    fn replace_if(
        &self,
        old: &Element<K, V>,
        new: Element<K, V>,
        comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<bool>;

    /// Swaps in `element` iff a live element exists; returns the prior one.
    fn replace(&self, element: Element<K, V>) -> Result<Option<Element<K, V>>>;

    /// Removes the live element if it matches `element` under `comparator`.
    fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<Option<Element<K, V>>>;

    fn remove(&self, key: &K) -> Result<Option<Element<K, V>>> {
        self.remove_with_writer(key, None)
    }

    fn remove_with_writer(
        &self,
        key: &K,
        writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<Option<Element<K, V>>>;

    /// Clears the tier one key at a time. Each key goes absent exactly once;
    /// the whole clear is not instantaneous.
    fn remove_all(&self) -> Result<()>;

    fn size(&self) -> usize;

    fn in_memory_size(&self) -> usize;

    fn off_heap_size(&self) -> usize {
        0
    }

    fn on_disk_size(&self) -> usize;

    fn clustered_size(&self) -> usize {
        0
    }

    fn in_memory_size_in_bytes(&self) -> u64;

    fn off_heap_size_in_bytes(&self) -> u64 {
        0
    }

    fn on_disk_size_in_bytes(&self) -> u64;

    fn contains_key(&self, key: &K) -> bool;

    fn contains_key_in_memory(&self, key: &K) -> bool;

    fn contains_key_off_heap(&self, _key: &K) -> bool {
        false
    }

    fn contains_key_on_disk(&self, key: &K) -> bool;

    fn eviction_policy(&self) -> Option<Arc<dyn EvictionPolicy<K>>>;

    fn set_eviction_policy(&self, policy: Arc<dyn EvictionPolicy<K>>);

    /// Removes every expired element, returning how many went.
    fn expire_elements(&self) -> usize;

    fn flush(&self) -> Result<()>;

    /// Whether a write-behind buffer is saturated.
    fn buffer_full(&self) -> bool {
        false
    }

    /// Releases the tier. Idempotent.
    fn dispose(&self);

    fn status(&self) -> Status;

    /// The tier's node in the component graph.
    fn internal_context(&self) -> Option<NodeId>;

    fn management(&self) -> Option<StoreManagement>;

    fn tier(&self) -> Option<TierKind>;
}
