/// Callback fired whenever an entry transitions to PRIMARY through
/// failover promotion or an explicit `get`-triggered promotion — never on
/// the initial local `put`, which is PRIMARY from birth.
pub trait MapOwner<K, V>: Send + Sync {
    fn object_made_primary(&self, key: &K, value: &V);
}

impl<K, V, F: Fn(&K, &V) + Send + Sync> MapOwner<K, V> for F {
    fn object_made_primary(&self, key: &K, value: &V) {
        self(key, value)
    }
}
