use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::MemoryEstimator;

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bookkeeping carried alongside every stored value.
///
/// Split out from [`Element`] so tiers that keep values elsewhere (the disk
/// tier keeps them in its data file) can hold the metadata in their index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMetadata {
    pub version: u64,
    /// Milliseconds since the Unix epoch.
    pub creation_time: u64,
    pub last_access_time: u64,
    pub hit_count: u64,
    /// Seconds; `None` or `Some(0)` means no limit.
    pub time_to_live: Option<u64>,
    /// Seconds; `None` or `Some(0)` means no limit.
    pub time_to_idle: Option<u64>,
    pub eternal: bool,
    pub dirty: bool,
}

impl ElementMetadata {
    fn at(creation_time: u64) -> Self {
        Self {
            version: next_version(),
            creation_time,
            last_access_time: creation_time,
            hit_count: 0,
            time_to_live: None,
            time_to_idle: None,
            eternal: false,
            dirty: false,
        }
    }

    /// Absolute expiry instant in milliseconds, or `None` if the element
    /// never expires.
    pub fn expiration_time(&self) -> Option<u64> {
        if self.eternal {
            return None;
        }
        let by_ttl = self
            .time_to_live
            .filter(|ttl| *ttl > 0)
            .map(|ttl| self.creation_time.saturating_add(ttl.saturating_mul(1000)));
        let by_tti = self.time_to_idle.filter(|tti| *tti > 0).map(|tti| {
            self.last_access_time
                .max(self.creation_time)
                .saturating_add(tti.saturating_mul(1000))
        });
        match (by_ttl, by_tti) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expiration_time().is_some_and(|at| now >= at)
    }

    pub(crate) fn record_access(&mut self, now: u64) {
        self.last_access_time = now;
        self.hit_count = self.hit_count.saturating_add(1);
    }
}

/// A stored key/value pair plus its timing metadata.
///
/// # Examples
///
/// ```
/// use tiercache_core::Element;
///
/// let element = Element::new("user:1".to_string(), 42u64).with_time_to_live(60);
/// assert_eq!(element.value(), &42);
/// assert!(!element.is_expired());
/// assert_eq!(element.entity_tag(), element.creation_time().to_string());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Element<K, V> {
    key: K,
    value: V,
    metadata: ElementMetadata,
}

impl<K, V> Element<K, V> {
    /// Creates an element stamped with the current time and a fresh version.
    pub fn new(key: K, value: V) -> Self {
        Self::new_at(key, value, now_millis())
    }

    /// Creates an element with an explicit creation time.
    pub fn new_at(key: K, value: V, creation_time: u64) -> Self {
        Self {
            key,
            value,
            metadata: ElementMetadata::at(creation_time),
        }
    }

    pub fn with_time_to_live(mut self, secs: u64) -> Self {
        self.metadata.time_to_live = Some(secs);
        self
    }

    pub fn with_time_to_idle(mut self, secs: u64) -> Self {
        self.metadata.time_to_idle = Some(secs);
        self
    }

    pub fn with_eternal(mut self, eternal: bool) -> Self {
        self.metadata.eternal = eternal;
        self
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    pub fn metadata(&self) -> &ElementMetadata {
        &self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: ElementMetadata) {
        self.metadata = metadata;
    }

    pub fn version(&self) -> u64 {
        self.metadata.version
    }

    pub fn creation_time(&self) -> u64 {
        self.metadata.creation_time
    }

    pub fn last_access_time(&self) -> u64 {
        self.metadata.last_access_time
    }

    pub fn hit_count(&self) -> u64 {
        self.metadata.hit_count
    }

    pub fn time_to_live(&self) -> Option<u64> {
        self.metadata.time_to_live
    }

    pub fn time_to_idle(&self) -> Option<u64> {
        self.metadata.time_to_idle
    }

    pub fn is_eternal(&self) -> bool {
        self.metadata.eternal
    }

    pub fn is_dirty(&self) -> bool {
        self.metadata.dirty
    }

    /// Marks the element as pending a write-behind flush.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.metadata.dirty = dirty;
    }

    /// Re-stamps the element as newly created: new creation time, new
    /// version, access history cleared. Updates are re-creations.
    pub fn restamp(&mut self, creation_time: u64) {
        let mut metadata = ElementMetadata::at(creation_time);
        metadata.time_to_live = self.metadata.time_to_live;
        metadata.time_to_idle = self.metadata.time_to_idle;
        metadata.eternal = self.metadata.eternal;
        metadata.dirty = self.metadata.dirty;
        self.metadata = metadata;
    }

    pub(crate) fn record_access(&mut self, now: u64) {
        self.metadata.record_access(now);
    }

    pub fn expiration_time(&self) -> Option<u64> {
        self.metadata.expiration_time()
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.metadata.is_expired_at(now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Change-detection tag derived from the creation time only.
    pub fn entity_tag(&self) -> String {
        self.metadata.creation_time.to_string()
    }

    /// The creation time as a `SystemTime`, for Last-Modified style headers.
    pub fn last_modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.metadata.creation_time)
    }
}

impl<K: MemoryEstimator, V: MemoryEstimator> MemoryEstimator for Element<K, V> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<ElementMetadata>()
            + self.key.estimate_memory()
            + self.value.estimate_memory()
    }
}
