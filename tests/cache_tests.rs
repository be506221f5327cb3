use parking_lot::Mutex;
use std::sync::Arc;
use tiercache::{
    Cache, CacheConfig, CacheWriter, ComponentGraph, Element, Error, OperationType, Status,
    Store, WriterError,
};

fn two_tier(dir: &tempfile::TempDir, name: &str) -> Cache<String, String> {
    let config = CacheConfig::new(name)
        .max_entries_in_memory(2)
        .overflow_to_disk(true)
        .disk_path(dir.path())
        .sample_period_ms(60_000);
    Cache::with_graph(config, Arc::new(ComponentGraph::new())).unwrap()
}

fn key(k: &str) -> String {
    k.to_string()
}

/// Memory capacity 2 over an unbounded disk tier: the third key evicts
/// exactly one element and every key stays readable from its tier.
#[test]
fn test_two_tier_overflow_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let cache = two_tier(&dir, "two-tier");

    cache.put(key("a"), "1".into()).unwrap();
    cache.put(key("b"), "2".into()).unwrap();
    cache.put(key("c"), "3".into()).unwrap();

    let stats = cache.statistics().unwrap();
    assert_eq!(stats.totals(OperationType::Evicted), Some(vec![1]));

    assert_eq!(cache.size(), 3);
    assert_eq!(cache.in_memory_size(), 2);
    assert_eq!(cache.on_disk_size(), 1);

    // LRU picks the oldest untouched key.
    assert!(cache.contains_key_on_disk(&key("a")));
    assert!(!cache.contains_key_in_memory(&key("a")));
    assert!(cache.contains_key_in_memory(&key("b")));
    assert!(cache.contains_key_in_memory(&key("c")));

    assert_eq!(cache.get(&key("a")).unwrap(), Some("1".into()));
    assert_eq!(cache.get(&key("b")).unwrap(), Some("2".into()));
    assert_eq!(cache.get(&key("c")).unwrap(), Some("3".into()));
    assert!(cache.on_disk_size_in_bytes() > 0);
}

#[test]
fn test_update_of_spilled_key_moves_it_back_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cache = two_tier(&dir, "move-back");
    for k in ["a", "b", "c"] {
        cache.put(key(k), k.into()).unwrap();
    }

    cache.put(key("a"), "updated".into()).unwrap();
    assert!(cache.contains_key_in_memory(&key("a")));
    assert!(!cache.contains_key_on_disk(&key("a")));
    assert_eq!(cache.size(), 3);
    assert_eq!(cache.get(&key("a")).unwrap(), Some("updated".into()));
}

#[test]
fn test_put_restamps_creation_time() {
    let graph = Arc::new(ComponentGraph::new());
    let cache: Cache<String, u64> =
        Cache::with_graph(CacheConfig::new("restamp").statistics(false), graph).unwrap();

    let mut previous: Option<Element<String, u64>> = None;
    for value in 0..20 {
        cache.put(key("k"), value).unwrap();
        let current = cache.get_element(&key("k")).unwrap().unwrap();
        assert_eq!(current.value(), &value);
        if let Some(previous) = previous {
            assert!(current.creation_time() > previous.creation_time());
            assert_ne!(current.entity_tag(), previous.entity_tag());
            assert_ne!(current.version(), previous.version());
        }
        previous = Some(current);
    }
}

#[test]
fn test_conditional_operations() {
    let graph = Arc::new(ComponentGraph::new());
    let cache: Cache<String, String> =
        Cache::with_graph(CacheConfig::new("conditional").statistics(false), graph).unwrap();

    assert_eq!(cache.put_if_absent(key("a"), "1".into()).unwrap(), None);
    assert_eq!(cache.put_if_absent(key("a"), "2".into()).unwrap(), Some("1".into()));

    assert!(!cache.replace_if_equals(key("a"), &"stale".into(), "3".into()).unwrap());
    assert!(cache.replace_if_equals(key("a"), &"1".into(), "3".into()).unwrap());
    assert_eq!(cache.get(&key("a")).unwrap(), Some("3".into()));

    assert_eq!(cache.replace(key("missing"), "x".into()).unwrap(), None);
    assert!(!cache.contains_key(&key("missing")));

    assert!(!cache.remove_if_equals(key("a"), "1".into()).unwrap());
    assert!(cache.remove_if_equals(key("a"), "3".into()).unwrap());
    assert!(!cache.contains_key(&key("a")));
}

#[test]
fn test_remove_all_clears_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = two_tier(&dir, "clear");
    for k in ["a", "b", "c", "d"] {
        cache.put(key(k), k.into()).unwrap();
    }
    cache.remove_all().unwrap();
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.on_disk_size(), 0);
    assert!(cache.keys().is_empty());
}

#[test]
fn test_evict_expired_sweeps_every_tier() {
    let dir = tempfile::tempdir().unwrap();
    let cache = two_tier(&dir, "sweep");
    let stale = |k: &str| Element::new_at(key(k), k.to_string(), 1_000).with_time_to_live(1);
    let tiers = cache.store().tiers();
    tiers[0].put(stale("a")).unwrap();
    tiers[1].put(stale("b")).unwrap();
    tiers[1].put(stale("c")).unwrap();
    cache.put(key("fresh"), "x".into()).unwrap();

    assert_eq!(cache.evict_expired(), 3);
    assert_eq!(cache.keys(), vec![key("fresh")]);
}

#[test]
fn test_expired_victim_is_not_spilled() {
    let dir = tempfile::tempdir().unwrap();
    let cache = two_tier(&dir, "no-spill");
    let stale = Element::new_at(key("old"), "x".to_string(), 1_000).with_time_to_live(1);
    cache.store().tiers()[0].put(stale).unwrap();
    cache.put(key("a"), "1".into()).unwrap();
    cache.put(key("b"), "2".into()).unwrap();

    assert_eq!(cache.on_disk_size(), 0);
    assert!(!cache.contains_key(&key("old")));
    assert_eq!(cache.size(), 2);
}

#[derive(Default)]
struct Journal {
    events: Mutex<Vec<String>>,
}

impl CacheWriter<String, String> for Journal {
    fn write(&self, element: &Element<String, String>) -> Result<(), WriterError> {
        self.events.lock().push(format!("write {}", element.key()));
        Ok(())
    }

    fn delete(&self, element: &Element<String, String>) -> Result<(), WriterError> {
        if element.value() == "locked" {
            return Err("record is locked".into());
        }
        self.events.lock().push(format!("delete {}", element.key()));
        Ok(())
    }
}

#[test]
fn test_writer_sees_each_change_once() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(Journal::default());
    let cache = two_tier(&dir, "journal").with_writer(journal.clone());

    cache.put(key("a"), "1".into()).unwrap();
    cache.put(key("b"), "2".into()).unwrap();
    cache.put(key("c"), "3".into()).unwrap();
    cache.remove(&key("a")).unwrap();
    cache.remove(&key("a")).unwrap();

    assert_eq!(
        *journal.events.lock(),
        vec!["write a", "write b", "write c", "delete a"]
    );
}

#[test]
fn test_writer_failure_is_reported_after_local_change() {
    let graph = Arc::new(ComponentGraph::new());
    let cache: Cache<String, String> =
        Cache::with_graph(CacheConfig::new("journal-fail").statistics(false), graph)
            .unwrap()
            .with_writer(Arc::new(Journal::default()));

    cache.put(key("a"), "locked".into()).unwrap();
    let err = cache.remove(&key("a")).unwrap_err();
    assert!(matches!(err, Error::Cache(tiercache::CacheError::Writer(_))));
    assert!(!cache.contains_key(&key("a")));
}

#[test]
fn test_dispose_removes_disk_file_and_graph_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let graph = Arc::new(ComponentGraph::new());
    let config = CacheConfig::new("disposable")
        .max_entries_in_memory(1)
        .overflow_to_disk(true)
        .disk_path(dir.path())
        .statistics(false);
    let data_file = config.data_file();
    let cache: Cache<String, String> = Cache::with_graph(config, Arc::clone(&graph)).unwrap();
    cache.put(key("a"), "1".into()).unwrap();
    cache.put(key("b"), "2".into()).unwrap();
    assert!(data_file.exists());

    cache.dispose();
    assert_eq!(cache.status(), Status::Shutdown);
    assert!(!data_file.exists());
    assert!(graph.is_empty());
    assert!(matches!(
        cache.put(key("c"), "3".into()).unwrap_err(),
        Error::Cache(tiercache::CacheError::Disposed)
    ));
}

#[test]
fn test_management_reports_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = two_tier(&dir, "managed");
    for k in ["a", "b", "c"] {
        cache.put(key(k), k.into()).unwrap();
    }
    let m = cache.management().unwrap();
    assert_eq!(m.size, 3);
    assert_eq!(m.tiers.len(), 2);
    assert_eq!(m.tiers[0].size, 2);
    assert_eq!(m.tiers[1].size, 1);
    assert_eq!(m.eviction_policy.as_deref(), Some("lru"));

    let json = serde_json::to_value(&m).unwrap();
    assert_eq!(json["tiers"][1]["tier"], "Disk");
}

#[test]
fn test_same_named_disk_cache_cannot_share_live_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = two_tier(&dir, "dup");
    for k in ["a", "b", "c"] {
        cache_put(&first, k);
    }
    assert!(first.contains_key_on_disk(&key("a")));

    let graph = Arc::new(ComponentGraph::new());
    let config = CacheConfig::new("dup")
        .max_entries_in_memory(2)
        .overflow_to_disk(true)
        .disk_path(dir.path());
    let second: Result<Cache<String, String>, Error> = Cache::with_graph(config, Arc::clone(&graph));
    assert!(matches!(
        second,
        Err(Error::Cache(tiercache::CacheError::FileInUse { .. }))
    ));
    assert!(graph.is_empty());
    assert_eq!(first.get(&key("a")).unwrap(), Some("a".into()));

    first.dispose();
    let successor = two_tier(&dir, "dup");
    for k in ["x", "y", "z"] {
        cache_put(&successor, k);
    }
    assert_eq!(successor.get(&key("x")).unwrap(), Some("x".into()));
}

fn cache_put(cache: &Cache<String, String>, k: &str) {
    cache.put(key(k), k.into()).unwrap();
}

#[test]
fn test_cache_from_json_config() {
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        r#"{{
            "name": "from-json",
            "max_entries_in_memory": 1,
            "memory_eviction_policy": "fifo",
            "overflow_to_disk": true,
            "disk_path": {},
            "statistics": false
        }}"#,
        serde_json::to_string(dir.path()).unwrap()
    );
    let config = CacheConfig::from_json(&json).unwrap();
    let cache: Cache<String, String> =
        Cache::with_graph(config, Arc::new(ComponentGraph::new())).unwrap();
    cache.put(key("a"), "1".into()).unwrap();
    cache.put(key("b"), "2".into()).unwrap();
    assert!(cache.contains_key_on_disk(&key("a")));
    assert_eq!(cache.management().unwrap().eviction_policy.as_deref(), Some("fifo"));
}

#[test]
fn test_invalid_config_is_rejected_before_registration() {
    let graph = Arc::new(ComponentGraph::new());
    let config = CacheConfig::new("bad").memory_eviction_policy("mru");
    let result: Result<Cache<String, String>, Error> = Cache::with_graph(config, Arc::clone(&graph));
    assert!(matches!(
        result,
        Err(Error::Config(tiercache::ConfigError::UnknownPolicy(_)))
    ));
    assert!(graph.is_empty());
}
