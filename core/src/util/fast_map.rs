use std::sync::Arc;

pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

#[inline]
pub fn fast_hash_map_new<K, V>() -> FastHashMap<K, V> {
    rustc_hash::FxHashMap::default()
}

#[inline]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    rustc_hash::FxHashMap::with_capacity_and_hasher(capacity, Default::default())
}

/// Keys of a string-keyed map in ascending order. Map iteration, display and
/// `keys()` all go through this so scripts observe a stable order.
pub fn sorted_keys<V>(map: &FastHashMap<Arc<str>, V>) -> Vec<Arc<str>> {
    let mut keys: Vec<Arc<str>> = map.keys().cloned().collect();
    keys.sort_unstable();
    keys
}
