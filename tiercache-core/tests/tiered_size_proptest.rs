use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tiercache_core::{DiskStore, Element, MemoryStore, StatisticsScope, Store, TieredStore};

#[derive(Clone, Debug)]
enum Op {
    Put(u8, u32),
    Remove(u8),
    PutIfAbsent(u8, u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => (0u8..16).prop_map(Op::Remove),
        1 => (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::PutIfAbsent(k, v)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn chain_holds_every_live_key_once(ops in prop::collection::vec(op(), 1..80), capacity in 1usize..6) {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatisticsScope::detached().register_store("prop", None).unwrap();
        let disk: Arc<dyn Store<u8, u32>> = Arc::new(
            DiskStore::<u8, u32>::builder("prop:disk", dir.path().join("prop.data")).build().unwrap(),
        );
        let heap: Arc<MemoryStore<u8, u32>> = Arc::new(
            MemoryStore::builder("prop:heap")
                .capacity(capacity)
                .overflow(Arc::clone(&disk))
                .build()
                .unwrap(),
        );
        let chain = TieredStore::new("prop", vec![heap.clone() as Arc<dyn Store<u8, u32>>, disk], stats);
        let mut model: HashMap<u8, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    chain.put(Element::new(k, v)).unwrap();
                    model.insert(k, v);
                }
                Op::Remove(k) => {
                    let removed = chain.remove(&k).unwrap().map(|e| *e.value());
                    prop_assert_eq!(removed, model.remove(&k));
                }
                Op::PutIfAbsent(k, v) => {
                    let existing = chain.put_if_absent(Element::new(k, v)).unwrap();
                    match model.get(&k) {
                        Some(current) => prop_assert_eq!(existing.map(|e| *e.value()), Some(*current)),
                        None => {
                            prop_assert!(existing.is_none());
                            model.insert(k, v);
                        }
                    }
                }
            }

            prop_assert!(heap.size() <= capacity);
            prop_assert_eq!(chain.size(), model.len());
        }

        for (k, v) in &model {
            let got = chain.get(k).unwrap().map(|e| *e.value());
            prop_assert_eq!(got, Some(*v));
        }
    }
}
