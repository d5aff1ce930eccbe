//! bucket-hashmap: a single-threaded hash map built from separately
//! chained buckets over a table that doubles as it fills.
//!
//! ```
//! use bucket_hashmap::BucketHashMap;
//!
//! let mut m = BucketHashMap::new();
//! m.put("key1".to_string(), "value1");
//! m.put("key2".to_string(), "value2");
//! assert_eq!(m.get("key1"), Some(&"value1"));
//! assert!(m.remove("key1"));
//! assert_eq!(m.len(), 1);
//! ```
//!
//! Internal Design:
//!
//! Summary
//! - Goal: the classic bucket-array hash map (chain per bucket, growth by
//!   doubling at a load-factor threshold) expressed without aliased
//!   pointers.
//! - Layers:
//!   - `Table<K, V>`: bucket heads (`Vec<Option<DefaultKey>>`) plus a
//!     `SlotMap` arena of entries. Chains are arena keys linking entry to
//!     entry; every structural edit (append, splice, relink) lives here.
//!   - `BucketHashMap<K, V>`: public API. Hashes keys, decides growth,
//!     and guards each entry point with a debug-only reentrancy check.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (no locking).
//! - Unique keys; `put` on an existing key overwrites the value in place.
//! - Sizing comes from `MapConfig`: 16 buckets and a 0.75 load factor
//!   unless configured otherwise.
//!
//! Growth policy
//! - `put` compares the size *before* inserting against
//!   `capacity * load_factor` and doubles the table first when it is
//!   reached, even if the key turns out to be present already.
//! - Growth walks the old buckets in order and appends every entry to the
//!   tail of its new chain. The table never shrinks; `clear` replaces it
//!   with a fresh one of the initial size.
//! - The doubled table is reserved with `try_reserve_exact`. If that
//!   allocation fails the old table stays in place (logged at `warn`), the
//!   insert still happens and chains simply grow longer.
//! - Load factors below `MIN_LOAD_FACTOR` (0.1) are rejected, so the table
//!   stays within a constant multiple of the entry count.
//!
//! Hasher and rehashing invariants
//! - Each entry stores its precomputed `u64` hash; growth relinks by the
//!   stored hash, so `K: Hash` is never invoked after insertion.
//! - The bucket index is `hash % capacity` on the unsigned hash; there is
//!   no sign to normalize.
//!
//! Absent versus empty values
//! - `get` returns `Option<&V>`, so a missing key (`None`) is never
//!   confused with a present key holding an "empty" value. `contains_key`
//!   answers presence directly.
//!
//! Reentrancy policy
//! - Public methods that call into `K: Hash`/`K: Eq` hold a debug-only
//!   guard; nested entry from that user code panics in debug builds.
//!   Removed keys and values (and the old table on `clear`) are dropped
//!   after the guard is released, so their `Drop` may use the map.
//!
//! Notes and non-goals
//! - No custom hasher injection: the table uses hashbrown's default
//!   hasher.
//! - No iteration order guarantee, no shrinking, no persistence.

mod bucket_hash_map;
mod bucket_hash_map_proptest;
pub mod config;
mod error;
mod reentrancy;

// Public surface
pub use bucket_hash_map::{BucketHashMap, Iter, IterMut};
pub use config::{MapConfig, INITIAL_CAPACITY, LOAD_FACTOR, MIN_LOAD_FACTOR};
pub use error::ConfigError;
