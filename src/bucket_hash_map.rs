//! BucketHashMap: separately chained buckets over a growable table.

use crate::config::MapConfig;
use crate::error::ConfigError;
use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use std::collections::TryReserveError;
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashSet;
use slotmap::{DefaultKey, SlotMap};

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
    next: Option<DefaultKey>, // following entry in the same chain
}

/// Bucket index of `hash` in a table of `capacity` buckets.
///
/// The hash is unsigned, so there is no negative remainder to normalize.
#[inline]
pub(crate) fn position(hash: u64, capacity: usize) -> usize {
    debug_assert!(capacity > 0, "bucket table must not be empty");
    (hash % capacity as u64) as usize
}

/// Chain storage: bucket heads plus an arena of linked entries.
///
/// Every live arena slot is reachable from exactly one bucket, namely
/// `position(entry.hash, buckets.len())`.
struct Table<K, V> {
    buckets: Vec<Option<DefaultKey>>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
}

impl<K, V> Table<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: vec![None; capacity],
            slots: SlotMap::with_key(),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn find<Q>(&self, hash: u64, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut cur = self.buckets[position(hash, self.capacity())];
        while let Some(k) = cur {
            let e = &self.slots[k];
            if e.hash == hash && e.key.borrow() == q {
                return Some(k);
            }
            cur = e.next;
        }
        None
    }

    /// Link the (unlinked) entry `k` at the tail of its chain.
    fn append(&mut self, k: DefaultKey) {
        let idx = position(self.slots[k].hash, self.capacity());
        match self.buckets[idx] {
            None => self.buckets[idx] = Some(k),
            Some(mut tail) => {
                while let Some(next) = self.slots[tail].next {
                    tail = next;
                }
                self.slots[tail].next = Some(k);
            }
        }
    }

    /// Splice the entry matching `q` out of its chain and free its slot.
    fn unlink<Q>(&mut self, hash: u64, q: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let idx = position(hash, self.capacity());
        let mut prev: Option<DefaultKey> = None;
        let mut cur = self.buckets[idx];
        while let Some(k) = cur {
            let e = &self.slots[k];
            if e.hash == hash && e.key.borrow() == q {
                let next = e.next;
                match prev {
                    None => self.buckets[idx] = next,
                    Some(p) => self.slots[p].next = next,
                }
                return self.slots.remove(k);
            }
            prev = Some(k);
            cur = e.next;
        }
        None
    }

    /// Double the bucket count and relink every entry by its cached hash.
    fn grow(&mut self) -> Result<(), TryReserveError> {
        self.resize(self.capacity().saturating_mul(2))
    }

    /// Move every entry into a fresh table of `new_capacity` buckets.
    /// On allocation failure the table is left untouched.
    fn resize(&mut self, new_capacity: usize) -> Result<(), TryReserveError> {
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(new_capacity)?;
        buckets.resize(new_capacity, None);
        let old = core::mem::replace(&mut self.buckets, buckets);
        for head in old {
            let mut cur = head;
            while let Some(k) = cur {
                cur = self.slots[k].next.take();
                self.append(k);
            }
        }
        Ok(())
    }

    fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            slots: &self.slots,
            cursor: None,
            remaining: self.len(),
        }
    }
}

/// A hash map that resolves collisions by chaining entries per bucket.
///
/// The table starts at `MapConfig::initial_capacity` buckets and doubles
/// whenever a `put` finds `len >= capacity * load_factor` *before*
/// inserting. It never shrinks; `clear` resets it to the initial size.
pub struct BucketHashMap<K, V> {
    hasher: DefaultHashBuilder,
    table: Table<K, V>,
    config: MapConfig,
    reentrancy: DebugReentrancy,
}

impl<K, V> BucketHashMap<K, V>
where
    K: Eq + Hash,
{
    /// Empty map with 16 buckets and a 0.75 load factor.
    pub fn new() -> Self {
        Self::from_valid_config(MapConfig::default())
    }

    pub fn with_config(config: MapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: MapConfig) -> Self {
        Self {
            hasher: DefaultHashBuilder::default(),
            table: Table::with_capacity(config.initial_capacity),
            config,
            reentrancy: DebugReentrancy::new(),
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Insert or overwrite. Returns the previous value when `key` was
    /// already present; the entry keeps its place in its chain.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let _g = self.reentrancy.enter("put");
        if self
            .config
            .needs_growth(self.table.len(), self.table.capacity())
        {
            let from = self.table.capacity();
            match self.table.grow() {
                Ok(()) => log::debug!(
                    "bucket table grew from {} to {} buckets at {} entries",
                    from,
                    self.table.capacity(),
                    self.table.len()
                ),
                Err(e) => log::warn!(
                    "bucket table stays at {} buckets, doubling failed ({}); chains will lengthen",
                    from,
                    e
                ),
            }
        }

        let hash = self.make_hash(&key);
        if let Some(k) = self.table.find(hash, &key) {
            return Some(core::mem::replace(&mut self.table.slots[k].value, value));
        }
        let k = self.table.slots.insert(Entry {
            key,
            value,
            hash,
            next: None,
        });
        self.table.append(k);
        None
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("get");
        let hash = self.make_hash(q);
        self.table
            .find(hash, q)
            .map(|k| &self.table.slots[k].value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("get_mut");
        let hash = self.make_hash(q);
        let k = self.table.find(hash, q)?;
        self.table.slots.get_mut(k).map(|e| &mut e.value)
    }

    /// Distinguishes an absent key from a present key whose value is
    /// itself "empty" (e.g. `V = Option<T>` holding `None`).
    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("contains_key");
        let hash = self.make_hash(q);
        self.table.find(hash, q).is_some()
    }

    /// Remove `q`'s entry. Returns false if there was none.
    pub fn remove<Q>(&mut self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        // The removed pair is dropped here, after the guard is released.
        self.remove_entry(q).is_some()
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("remove");
        let hash = self.make_hash(q);
        let entry = self.table.unlink(hash, q)?;
        Some((entry.key, entry.value))
    }

    /// Owned snapshot of every key.
    pub fn key_set(&self) -> HashSet<K>
    where
        K: Clone,
    {
        let mut keys = HashSet::with_capacity(self.len());
        keys.extend(self.iter().map(|(k, _)| k.clone()));
        keys
    }

    /// Owned snapshot of every value, one per entry, in no particular order.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl<K, V> BucketHashMap<K, V> {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Current number of buckets.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Drop every entry and return to `initial_capacity` buckets.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        log::trace!(
            "clearing {} entries from {} buckets",
            self.table.len(),
            self.table.capacity()
        );
        let old = core::mem::replace(
            &mut self.table,
            Table::with_capacity(self.config.initial_capacity),
        );
        drop(_g);
        // K/V destructors run with the map already consistent.
        drop(old);
    }

    /// Iterate bucket by bucket, following each chain.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.table.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.table.slots.iter_mut(),
        }
    }
}

impl<K, V> Default for BucketHashMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for BucketHashMap<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Extend<(K, V)> for BucketHashMap<K, V>
where
    K: Eq + Hash,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.put(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for BucketHashMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::new();
        m.extend(iter);
        m
    }
}

impl<'a, K, V> IntoIterator for &'a BucketHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V> IntoIterator for &'a mut BucketHashMap<K, V> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Iterator over `(&K, &V)` in bucket/chain order.
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Option<DefaultKey>>,
    slots: &'a SlotMap<DefaultKey, Entry<K, V>>,
    cursor: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slots: &'a SlotMap<DefaultKey, Entry<K, V>> = self.slots;
        loop {
            if let Some(k) = self.cursor {
                let e = &slots[k];
                self.cursor = e.next;
                self.remaining -= 1;
                return Some((&e.key, &e.value));
            }
            self.cursor = *self.buckets.next()?;
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over `(&K, &mut V)` in arena order.
pub struct IterMut<'a, K, V> {
    it: slotmap::basic::IterMut<'a, DefaultKey, Entry<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &mut e.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

#[cfg(test)]
impl<K, V> BucketHashMap<K, V> {
    /// Keys of the chain at bucket `idx`, head first.
    fn chain(&self, idx: usize) -> Vec<&K> {
        let mut out = Vec::new();
        let mut cur = self.table.buckets[idx];
        while let Some(k) = cur {
            let e = &self.table.slots[k];
            out.push(&e.key);
            cur = e.next;
        }
        out
    }

    fn bucket_of(&self, key: &K) -> usize
    where
        K: Eq + Hash,
    {
        position(self.make_hash(key), self.capacity())
    }

    /// Panics unless every arena entry is linked exactly once, in the
    /// bucket its cached hash selects.
    pub(crate) fn check_invariants(&self) {
        let mut reached = 0;
        for (idx, head) in self.table.buckets.iter().enumerate() {
            let mut cur = *head;
            while let Some(k) = cur {
                let e = &self.table.slots[k];
                assert_eq!(position(e.hash, self.capacity()), idx);
                reached += 1;
                assert!(reached <= self.len(), "chain cycle or stray link");
                cur = e.next;
            }
        }
        assert_eq!(reached, self.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::hash::Hasher;

    /// Key whose hash ignores its payload, forcing every instance into one chain.
    #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct Colliding(&'static str);
    impl Hash for Colliding {
        fn hash<H: Hasher>(&self, state: &mut H) {
            0u8.hash(state);
        }
    }

    #[test]
    fn position_stays_in_range_for_extreme_hashes() {
        for cap in [1usize, 16, 17, 1024] {
            for h in [0u64, 1, u64::MAX, u64::MAX - 1, 1 << 63] {
                assert!(position(h, cap) < cap);
            }
        }
        assert_eq!(position(u64::MAX, 16), 15);
        assert_eq!(position(1 << 63, 16), 0);
    }

    #[test]
    fn new_map_has_sixteen_empty_buckets() {
        let m: BucketHashMap<String, i32> = BucketHashMap::new();
        assert_eq!(m.capacity(), 16);
        assert!(m.is_empty());
        assert_eq!(m.iter().count(), 0);
        m.check_invariants();
    }

    /// Growth is decided from the size before the insert: 12 entries fit in
    /// 16 buckets, the 13th put doubles the table first.
    #[test]
    fn thirteenth_insert_doubles_the_table() {
        let mut m = BucketHashMap::new();
        for i in 0..12 {
            m.put(i, i);
        }
        assert_eq!(m.capacity(), 16);
        m.put(12, 12);
        assert_eq!(m.capacity(), 32);
        assert_eq!(m.len(), 13);
        m.check_invariants();
    }

    #[test]
    fn overwrite_at_threshold_still_grows() {
        let mut m = BucketHashMap::new();
        for i in 0..12 {
            m.put(i, i);
        }
        assert_eq!(m.put(0, 100), Some(0));
        assert_eq!(m.capacity(), 32);
        assert_eq!(m.len(), 12);
        assert_eq!(m.get(&0), Some(&100));
    }

    #[test]
    fn growth_doubles_repeatedly_and_keeps_entries_placed() {
        let mut m = BucketHashMap::new();
        let mut seen = Vec::new();
        for i in 0..150 {
            m.put(format!("key{i}"), i);
            if seen.last() != Some(&m.capacity()) {
                seen.push(m.capacity());
            }
        }
        assert_eq!(seen, vec![16, 32, 64, 128, 256]);
        assert_eq!(m.len(), 150);
        m.check_invariants();
        for i in 0..150 {
            assert_eq!(m.get(&format!("key{i}")), Some(&i));
        }
    }

    #[test]
    fn colliding_keys_append_in_insert_order() {
        let mut m = BucketHashMap::new();
        for k in ["a", "b", "c"] {
            m.put(Colliding(k), k.len());
        }
        let idx = m.bucket_of(&Colliding("a"));
        assert_eq!(
            m.chain(idx),
            vec![&Colliding("a"), &Colliding("b"), &Colliding("c")]
        );
        // Overwrite keeps chain position.
        m.put(Colliding("b"), 7);
        assert_eq!(m.chain(idx)[1], &Colliding("b"));
        assert_eq!(m.get(&Colliding("b")), Some(&7));
        m.check_invariants();
    }

    #[test]
    fn remove_splices_head_interior_and_tail() {
        let build = || {
            let mut m = BucketHashMap::new();
            for (i, k) in ["a", "b", "c", "d"].into_iter().enumerate() {
                m.put(Colliding(k), i);
            }
            m
        };

        // head
        let mut m = build();
        assert!(m.remove(&Colliding("a")));
        let idx = m.bucket_of(&Colliding("b"));
        assert_eq!(
            m.chain(idx),
            vec![&Colliding("b"), &Colliding("c"), &Colliding("d")]
        );
        m.check_invariants();

        // interior
        let mut m = build();
        let idx = m.bucket_of(&Colliding("a"));
        assert!(m.remove(&Colliding("c")));
        assert_eq!(
            m.chain(idx),
            vec![&Colliding("a"), &Colliding("b"), &Colliding("d")]
        );
        m.check_invariants();

        // tail
        let mut m = build();
        let idx = m.bucket_of(&Colliding("a"));
        assert_eq!(m.remove_entry(&Colliding("d")), Some((Colliding("d"), 3)));
        assert_eq!(
            m.chain(idx),
            vec![&Colliding("a"), &Colliding("b"), &Colliding("c")]
        );
        assert!(!m.remove(&Colliding("d")));
        assert_eq!(m.len(), 3);
        m.check_invariants();
    }

    #[test]
    fn colliding_chain_survives_growth() {
        let mut m = BucketHashMap::new();
        let names: Vec<&'static str> = (0..40)
            .map(|i| &*Box::leak(format!("c{i}").into_boxed_str()))
            .collect();
        for (i, n) in names.iter().enumerate() {
            m.put(Colliding(n), i);
        }
        assert!(m.capacity() > 16);
        let idx = m.bucket_of(&Colliding("c0"));
        // Relinking walks the old chain in order, so insertion order holds.
        let chain: Vec<&'static str> = m.chain(idx).into_iter().map(|c| c.0).collect();
        assert_eq!(chain, names);
        m.check_invariants();
    }

    /// A table that cannot be allocated leaves the old one in place and
    /// every entry still reachable.
    #[test]
    fn failed_resize_keeps_table_intact() {
        let mut m = BucketHashMap::new();
        for i in 0..10u32 {
            m.put(i, i);
        }
        assert!(m.table.resize(usize::MAX).is_err());
        assert!(m.table.resize(isize::MAX as usize).is_err());
        assert_eq!(m.capacity(), 16);
        m.check_invariants();
        for i in 0..10u32 {
            assert_eq!(m.get(&i), Some(&i));
        }
        // The map keeps working afterwards, growth included.
        for i in 10..20u32 {
            m.put(i, i);
        }
        assert_eq!(m.capacity(), 32);
        m.check_invariants();
    }

    /// At the smallest accepted load factor the table grows with the entry
    /// count instead of doubling without bound.
    #[test]
    fn minimum_load_factor_keeps_capacity_bounded() {
        let cfg = MapConfig::new().with_load_factor(crate::config::MIN_LOAD_FACTOR);
        let mut m = BucketHashMap::with_config(cfg).unwrap();
        for i in 0..80u32 {
            m.put(i, i);
            assert!(m.capacity() <= 20 * (i as usize + 1) + 16);
        }
        assert_eq!(m.len(), 80);
        m.check_invariants();
    }

    #[test]
    fn clear_resets_to_initial_capacity() {
        let mut m = BucketHashMap::new();
        for i in 0..100 {
            m.put(i, i);
        }
        assert!(m.capacity() > 16);
        m.clear();
        assert_eq!(m.capacity(), 16);
        assert_eq!(m.len(), 0);
        m.check_invariants();
        m.clear();
        assert!(m.is_empty());
    }

    #[test]
    fn custom_config_controls_growth_and_clear() {
        let cfg = MapConfig::new()
            .with_initial_capacity(4)
            .with_load_factor(1.0);
        let mut m = BucketHashMap::with_config(cfg).unwrap();
        for i in 0..4 {
            m.put(i, ());
        }
        assert_eq!(m.capacity(), 4);
        m.put(4, ());
        assert_eq!(m.capacity(), 8);
        m.clear();
        assert_eq!(m.capacity(), 4);
        assert_eq!(m.config(), &cfg);
    }

    #[test]
    fn with_config_rejects_zero_capacity() {
        let res = BucketHashMap::<u8, u8>::with_config(MapConfig::new().with_initial_capacity(0));
        assert!(matches!(res, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn iter_walks_every_chain_once() {
        let mut m = BucketHashMap::new();
        for i in 0..50u32 {
            m.put(i, i * 2);
        }
        let it = m.iter();
        assert_eq!(it.len(), 50);
        let keys: BTreeSet<u32> = it.map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..50).collect());

        for (_, v) in m.iter_mut() {
            *v += 1;
        }
        assert_eq!(m.get(&10), Some(&21));
    }

    /// Re-entering the map from `K: Eq` during a lookup panics in debug builds.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_from_eq_during_get() {
        struct ReentryKey {
            id: &'static str,
            map: *const BucketHashMap<ReentryKey, i32>,
            trigger: bool,
        }
        impl PartialEq for ReentryKey {
            fn eq(&self, other: &Self) -> bool {
                if other.trigger {
                    // Attempt to re-enter the same map while it walks a chain.
                    unsafe {
                        let m = &*other.map;
                        let _ = m.contains_key(self.id);
                    }
                }
                self.id == other.id
            }
        }
        impl Eq for ReentryKey {}
        impl Hash for ReentryKey {
            fn hash<H: Hasher>(&self, state: &mut H) {
                0u8.hash(state);
            }
        }
        impl Borrow<str> for ReentryKey {
            fn borrow(&self) -> &str {
                self.id
            }
        }

        let mut m: BucketHashMap<ReentryKey, i32> = BucketHashMap::new();
        let ptr = &m as *const _;
        m.put(
            ReentryKey {
                id: "a",
                map: ptr,
                trigger: false,
            },
            1,
        );
        let query = ReentryKey {
            id: "b",
            map: ptr,
            trigger: true,
        };
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = m.get(&query);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }
}
