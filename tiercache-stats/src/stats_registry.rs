use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::extended::ExtendedStatistics;

/// Global registry of bound statistics, indexed by cache name.
///
/// Caches built with statistics enabled register themselves here so their
/// windows can be inspected from anywhere without holding the cache.
///
/// # Thread Safety
///
/// This registry is thread-safe and can be accessed from multiple threads concurrently.
///
/// # Examples
///
/// ```
/// use tiercache_stats::{stats_registry, OperationType};
///
/// if let Some(stats) = stats_registry::get("users") {
///     println!("{:?}", stats.window(OperationType::CacheGet, 0));
/// }
///
/// for name in stats_registry::list() {
///     println!("cache: {}", name);
/// }
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<ExtendedStatistics>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register statistics under `name`, replacing any previous registration.
pub fn register(name: &str, stats: Arc<ExtendedStatistics>) {
    let previous = STATS_REGISTRY.write().insert(name.to_string(), stats);
    if previous.is_some() {
        tracing::debug!(cache = name, "replaced registered statistics");
    }
}

/// Statistics registered under `name`.
pub fn get(name: &str) -> Option<Arc<ExtendedStatistics>> {
    STATS_REGISTRY.read().get(name).cloned()
}

/// All registered cache names.
pub fn list() -> Vec<String> {
    STATS_REGISTRY.read().keys().cloned().collect()
}

/// Remove the registration for `name`, only if it is still `stats`.
///
/// A cache dropping late must not unregister a newer cache that reused its
/// name.
pub fn unregister(name: &str, stats: &Arc<ExtendedStatistics>) -> bool {
    let mut registry = STATS_REGISTRY.write();
    match registry.get(name) {
        Some(current) if Arc::ptr_eq(current, stats) => {
            registry.remove(name);
            true
        }
        _ => false,
    }
}

/// Tick every registered statistics instance once.
pub fn tick_all() {
    let all: Vec<_> = STATS_REGISTRY.read().values().cloned().collect();
    for stats in all {
        stats.tick();
    }
}

/// Clear all registrations. The statistics themselves are untouched.
pub fn clear() {
    STATS_REGISTRY.write().clear();
}
