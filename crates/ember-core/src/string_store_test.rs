use super::*;

#[test]
fn short_string_boundary() {
    let s = GcString::new_short(vec![b'a'; SHORT_STRING_MAX].into_boxed_slice(), 0);
    assert!(s.is_short());
    let long = GcString::new_long(vec![b'a'; SHORT_STRING_MAX + 1].into_boxed_slice());
    assert!(!long.is_short());
}

#[test]
fn hash_is_stable_for_the_same_bytes_and_seed() {
    let a = hash_bytes(b"hello world", 7);
    let b = hash_bytes(b"hello world", 7);
    assert_eq!(a, b);
}

#[test]
fn hash_differs_across_seeds_for_the_same_bytes() {
    let a = hash_bytes(b"hello world", 1);
    let b = hash_bytes(b"hello world", 2);
    assert_ne!(a, b);
}

#[test]
fn hash_samples_long_strings_without_reading_every_byte() {
    // Two long strings differing only deep inside a region the sampling
    // step skips must still be allowed to collide; what matters is that
    // hashing completes and stays deterministic, not full avalanche.
    let long = vec![b'x'; 10_000];
    let h1 = hash_bytes(&long, 42);
    let h2 = hash_bytes(&long, 42);
    assert_eq!(h1, h2);
}

#[test]
fn long_string_hash_is_computed_lazily_and_then_cached() {
    let s = GcString::new_long(b"a very long string indeed".to_vec().into_boxed_slice());
    let h1 = s.hash(9);
    let h2 = s.hash(9);
    assert_eq!(h1, h2);
}

#[test]
fn short_string_hash_is_available_immediately() {
    let h = hash_bytes(b"short", 3);
    let s = GcString::new_short(b"short".to_vec().into_boxed_slice(), h);
    assert_eq!(s.hash(3), h);
}

#[test]
fn string_store_bucket_index_wraps_power_of_two() {
    let store = StringStore::new(0);
    assert_eq!(store.bucket_count(), MIN_BUCKETS);
    let idx = store.bucket_index(0xFFFF_FFFF);
    assert!(idx < store.bucket_count());
}

#[test]
fn string_store_tracks_live_count_and_grow_threshold() {
    let mut store = StringStore::new(0);
    assert!(!store.should_grow());
    for _ in 0..MIN_BUCKETS {
        store.note_insert();
    }
    assert!(store.should_grow());
    for _ in 0..MIN_BUCKETS {
        store.note_remove();
    }
    assert!(!store.should_grow());
}

#[test]
fn next_in_bucket_chain_round_trips() {
    let s = GcString::new_short(b"x".to_vec().into_boxed_slice(), 1);
    assert!(next_in_bucket(&s).is_none());
    let target = crate::object::GcRef::from_index(3);
    set_next_in_bucket(&s, Some(target));
    assert_eq!(next_in_bucket(&s), Some(target));
}
