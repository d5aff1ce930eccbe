#![cfg(test)]

// Property tests for BucketHashMap kept inside the crate so they can check
// chain-level invariants that the public API does not expose.

use crate::bucket_hash_map::BucketHashMap;
use crate::config::{MapConfig, MIN_LOAD_FACTOR};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Same key, but every instance hashes identically so all entries share
// one chain. Borrow<str> is deliberately absent: str would hash differently.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct SameHash(String);
impl Hash for SameHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(0);
    }
}

// Pool-indexed operations: indices shrink to earlier keys, the pool
// shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Put(usize, i32),
    Get(usize),
    Remove(usize),
    Contains(String),
    Mutate(usize, i32),
    Clear,
    Snapshot,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=40).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Put(i, v)),
            2 => idx.clone().prop_map(Op::Get),
            2 => idx.clone().prop_map(Op::Remove),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(Op::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => Just(Op::Clear),
            1 => Just(Op::Snapshot),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn arb_config() -> impl Strategy<Value = MapConfig> {
    let lf = prop_oneof![
        Just(0.75),
        Just(MIN_LOAD_FACTOR),
        MIN_LOAD_FACTOR..4.0f64,
    ];
    (1usize..=32, lf).prop_map(|(cap, lf)| {
        MapConfig::new()
            .with_initial_capacity(cap)
            .with_load_factor(lf)
    })
}

// Drives one scenario against `sut` and a std HashMap model. `wrap` builds
// the map's key type from a pool string.
fn run_scenario<K, F>(
    mut sut: BucketHashMap<K, i32>,
    pool: &[String],
    ops: Vec<Op>,
    wrap: F,
) -> Result<(), TestCaseError>
where
    K: Clone + Eq + Hash + Ord + fmt::Debug,
    F: Fn(&str) -> K,
{
    let mut model: HashMap<K, i32> = HashMap::new();
    let initial_capacity = sut.config().initial_capacity;
    let load_factor = sut.config().load_factor;
    // Largest size seen since the last clear; the table never shrinks, so
    // its capacity is bounded by the peak rather than the current size.
    let mut peak = 0usize;

    for op in ops {
        match op {
            Op::Put(i, v) => {
                let k = wrap(&pool[i]);
                let prev = sut.put(k.clone(), v);
                prop_assert_eq!(prev, model.insert(k, v));
                // With the default 16/0.75 sizing, doubling before the
                // insert always leaves the table at or under its threshold.
                if *sut.config() == MapConfig::default() {
                    let threshold = sut.capacity() as f64 * load_factor;
                    prop_assert!((sut.len() as f64) <= threshold);
                }
                // A doubling only happens once `len >= capacity * load_factor`,
                // so for any accepted load factor (down to the minimum) the
                // table stays within twice `peak / load_factor` buckets.
                peak = peak.max(sut.len());
                let bound = (2.0 * peak as f64 / load_factor) * (1.0 + 1e-9);
                prop_assert!(
                    sut.capacity() <= initial_capacity || (sut.capacity() as f64) <= bound,
                    "capacity {} exceeds bound {} (peak {}, load factor {})",
                    sut.capacity(), bound, peak, load_factor
                );
            }
            Op::Get(i) => {
                let k = wrap(&pool[i]);
                prop_assert_eq!(sut.get(&k), model.get(&k));
            }
            Op::Remove(i) => {
                let k = wrap(&pool[i]);
                prop_assert_eq!(sut.remove(&k), model.remove(&k).is_some());
                prop_assert!(sut.get(&k).is_none());
            }
            Op::Contains(s) => {
                let k = wrap(&s);
                prop_assert_eq!(sut.contains_key(&k), model.contains_key(&k));
            }
            Op::Mutate(i, d) => {
                let k = wrap(&pool[i]);
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.saturating_add(d);
                    let mv = model.get_mut(&k).expect("model tracks live key");
                    *mv = mv.saturating_add(d);
                } else {
                    prop_assert!(!model.contains_key(&k));
                }
            }
            Op::Clear => {
                sut.clear();
                model.clear();
                peak = 0;
                prop_assert_eq!(sut.capacity(), initial_capacity);
            }
            Op::Snapshot => {
                let s_keys: BTreeSet<K> = sut.key_set().into_iter().collect();
                let m_keys: BTreeSet<K> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
                let mut s_vals = sut.values();
                let mut m_vals: Vec<i32> = model.values().copied().collect();
                s_vals.sort_unstable();
                m_vals.sort_unstable();
                prop_assert_eq!(s_vals, m_vals);
            }
        }

        sut.check_invariants();
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert_eq!(sut.iter().count(), model.len());
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - `put` returns the previous value and overwrites in place.
// - `get`/`contains_key`/`remove` agree with the model.
// - Snapshots (`key_set`, `values`) match the model's contents.
// - Every entry stays linked exactly once in its hash's bucket, across
//   growth, removal and clear.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(), cfg in arb_config()) {
        let sut = BucketHashMap::with_config(cfg).expect("generated config is valid");
        run_scenario(sut, &pool, ops, |s| Key(s.to_string()))?;
    }

    #[test]
    fn prop_borrowed_lookup_matches_owned((pool, ops) in arb_scenario()) {
        let mut sut: BucketHashMap<Key, i32> = BucketHashMap::new();
        for op in ops {
            if let Op::Put(i, v) = op {
                sut.put(Key(pool[i].clone()), v);
            }
        }
        for s in &pool {
            prop_assert_eq!(sut.get(s.as_str()), sut.get(&Key(s.clone())));
            prop_assert_eq!(sut.contains_key(s.as_str()), sut.contains_key(&Key(s.clone())));
        }
    }
}

// Property: same state machine under worst-case collisions. Every entry
// lands in one chain, stressing head/interior/tail splicing and relinking
// of a long chain during growth.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let sut: BucketHashMap<SameHash, i32> = BucketHashMap::new();
        run_scenario(sut, &pool, ops, |s| SameHash(s.to_string()))?;
    }
}
