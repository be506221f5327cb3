use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Fixed pool of mutexes; a key always maps to the same stripe.
///
/// Unrelated keys rarely contend and no lock ever covers the whole store.
pub(crate) struct StripedLock {
    stripes: Box<[Mutex<()>]>,
}

impl StripedLock {
    pub(crate) fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1).next_power_of_two();
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) fn lock<K: Hash + ?Sized>(&self, key: &K) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) & (self.stripes.len() - 1);
        self.stripes[index].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_stripe() {
        let locks = StripedLock::new(16);
        let guard = locks.lock("a");
        assert!(locks.stripes.iter().filter(|m| m.is_locked()).count() == 1);
        drop(guard);
        assert!(locks.stripes.iter().all(|m| !m.is_locked()));
    }

    #[test]
    fn test_stripe_count_rounds_up() {
        assert_eq!(StripedLock::new(0).stripes.len(), 1);
        assert_eq!(StripedLock::new(12).stripes.len(), 16);
    }
}
