use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiercache::{
    cache_names, names, statistics_for, Cache, CacheConfig, ComponentGraph, ExtendedStatistics,
    NodeSpec, OperationStatistic, OperationType, StatisticsError, StoreGetOutcome,
};

fn cache_in(graph: &Arc<ComponentGraph>, config: CacheConfig) -> Cache<String, String> {
    Cache::with_graph(config, Arc::clone(graph)).unwrap()
}

#[test]
fn test_kinds_without_counters_produce_no_data() {
    let graph = Arc::new(ComponentGraph::new());
    let cache = cache_in(&graph, CacheConfig::new("heap-only").sample_period_ms(60_000));
    cache.put("a".into(), "1".into()).unwrap();

    let stats = cache.statistics().unwrap();
    stats.tick();
    for kind in [
        OperationType::DiskGet,
        OperationType::OffHeapPut,
        OperationType::XaCommit,
        OperationType::Search,
    ] {
        assert!(!stats.is_bound(kind));
        assert!(stats.window(kind, 0).is_none());
        assert!(stats.history(kind).is_none());
    }
    assert_eq!(
        stats.window(OperationType::HeapPut, 0).unwrap().count("added"),
        Some(1)
    );
}

#[test]
fn test_disk_tier_binds_disk_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let graph = Arc::new(ComponentGraph::new());
    let cache = cache_in(
        &graph,
        CacheConfig::new("with-disk")
            .max_entries_in_memory(1)
            .overflow_to_disk(true)
            .disk_path(dir.path())
            .sample_period_ms(60_000),
    );
    cache.put("a".into(), "1".into()).unwrap();
    cache.put("b".into(), "2".into()).unwrap();
    assert_eq!(cache.get(&"a".to_string()).unwrap(), Some("1".into()));

    let stats = cache.statistics().unwrap();
    stats.tick();
    let disk_put = stats.window(OperationType::DiskPut, 0).unwrap();
    assert_eq!(disk_put.count("added"), Some(1));
    let disk_get = stats.window(OperationType::DiskGet, 0).unwrap();
    assert_eq!(disk_get.count("hit"), Some(1));
    let cache_get = stats.window(OperationType::CacheGet, 0).unwrap();
    assert_eq!(cache_get.count("hit"), Some(1));
}

#[test]
fn test_duplicate_cache_counter_fails_binding() {
    let graph = Arc::new(ComponentGraph::new());
    let cache = cache_in(&graph, CacheConfig::new("ambiguous").statistics(false));

    let rogue: OperationStatistic<StoreGetOutcome> = OperationStatistic::new();
    graph
        .add_child(cache.node(), NodeSpec::statistic(names::GET, rogue.counter()))
        .unwrap();

    match ExtendedStatistics::bind(Arc::clone(&graph), cache.node()) {
        Err(StatisticsError::AmbiguousBinding { kind, matches }) => {
            assert_eq!(kind, OperationType::CacheGet);
            assert_eq!(matches, 2);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("binding should fail"),
    }
}

#[test]
fn test_binding_a_disposed_cache_fails() {
    let graph = Arc::new(ComponentGraph::new());
    let cache = cache_in(&graph, CacheConfig::new("gone").statistics(false));
    let node = cache.node();
    cache.dispose();
    assert!(matches!(
        ExtendedStatistics::bind(graph, node),
        Err(StatisticsError::UnknownNode(n)) if n == node
    ));
}

#[test]
fn test_background_sampler_fills_history() {
    let graph = Arc::new(ComponentGraph::new());
    let cache = cache_in(&graph, CacheConfig::new("sampled").sample_period_ms(5));
    cache.put("a".into(), "1".into()).unwrap();

    let stats = cache.statistics().unwrap();
    let mut samples = 0;
    for _ in 0..200 {
        samples = stats.history(OperationType::CachePut).unwrap().len();
        if samples >= 2 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(samples >= 2);
}

#[test]
#[serial]
fn test_registry_follows_cache_lifetime() {
    let graph = Arc::new(ComponentGraph::new());
    let cache = cache_in(&graph, CacheConfig::new("registry-lifetime").sample_period_ms(60_000));

    let registered = statistics_for("registry-lifetime").unwrap();
    assert!(Arc::ptr_eq(&registered, cache.statistics().unwrap()));
    assert!(cache_names().contains(&"registry-lifetime".to_string()));

    drop(cache);
    assert!(statistics_for("registry-lifetime").is_none());
}

#[test]
#[serial]
fn test_registry_keeps_newest_cache_with_same_name() {
    let first = cache_in(
        &Arc::new(ComponentGraph::new()),
        CacheConfig::new("registry-shared").sample_period_ms(60_000),
    );
    let second = cache_in(
        &Arc::new(ComponentGraph::new()),
        CacheConfig::new("registry-shared").sample_period_ms(60_000),
    );

    // Dropping the replaced cache must not unregister its successor.
    drop(first);
    let registered = statistics_for("registry-shared").unwrap();
    assert!(Arc::ptr_eq(&registered, second.statistics().unwrap()));

    drop(second);
    assert!(statistics_for("registry-shared").is_none());
}
