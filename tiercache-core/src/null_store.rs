use std::marker::PhantomData;
use std::sync::Arc;
use tiercache_stats::NodeId;

use crate::{
    CacheWriter, Element, ElementValueComparator, EvictionPolicy, Result, Status,
    Store, StoreManagement, TierKind,
};

/// The absent tier: stands in for a tier that is administratively disabled.
///
/// Accepts nothing, holds nothing, never fails.
///
/// ```
/// use tiercache_core::{Element, NullStore, Status, Store};
///
/// let store = NullStore::<String, u32>::new();
/// assert!(!store.put(Element::new("a".to_string(), 1)).unwrap());
/// assert!(store.get(&"a".to_string()).unwrap().is_none());
/// assert_eq!(store.size(), 0);
/// assert_eq!(store.status(), Status::Uninitialized);
/// ```
pub struct NullStore<K, V> {
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> NullStore<K, V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for NullStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Store<K, V> for NullStore<K, V> {
    fn put_with_writer(
        &self,
        _element: Element<K, V>,
        _writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn get(&self, _key: &K) -> Result<Option<Element<K, V>>> {
        Ok(None)
    }

    fn get_quiet(&self, _key: &K) -> Result<Option<Element<K, V>>> {
        Ok(None)
    }

    fn keys(&self) -> Vec<K> {
        Vec::new()
    }

    fn put_if_absent(&self, _element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        Ok(None)
    }

    fn replace_if(
        &self,
        _old: &Element<K, V>,
        _new: Element<K, V>,
        _comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn replace(&self, _element: Element<K, V>) -> Result<Option<Element<K, V>>> {
        Ok(None)
    }

    fn remove_element(
        &self,
        _element: &Element<K, V>,
        _comparator: &dyn ElementValueComparator<K, V>,
    ) -> Result<Option<Element<K, V>>> {
        Ok(None)
    }

    fn remove_with_writer(
        &self,
        _key: &K,
        _writer: Option<&dyn CacheWriter<K, V>>,
    ) -> Result<Option<Element<K, V>>> {
        Ok(None)
    }

    fn remove_all(&self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> usize {
        0
    }

    fn in_memory_size(&self) -> usize {
        0
    }

    fn on_disk_size(&self) -> usize {
        0
    }

    fn in_memory_size_in_bytes(&self) -> u64 {
        0
    }

    fn on_disk_size_in_bytes(&self) -> u64 {
        0
    }

    fn contains_key(&self, _key: &K) -> bool {
        false
    }

    fn contains_key_in_memory(&self, _key: &K) -> bool {
        false
    }

    fn contains_key_on_disk(&self, _key: &K) -> bool {
        false
    }

    fn eviction_policy(&self) -> Option<Arc<dyn EvictionPolicy<K>>> {
        None
    }

    fn set_eviction_policy(&self, _policy: Arc<dyn EvictionPolicy<K>>) {}

    fn expire_elements(&self) -> usize {
        0
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn dispose(&self) {}

    fn status(&self) -> Status {
        Status::Uninitialized
    }

    fn internal_context(&self) -> Option<NodeId> {
        None
    }

    fn management(&self) -> Option<StoreManagement> {
        None
    }

    fn tier(&self) -> Option<TierKind> {
        None
    }
}
