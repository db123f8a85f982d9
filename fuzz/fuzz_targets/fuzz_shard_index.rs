//! Fuzz target for key sharding.
//!
//! Tests that shard selection never panics, stays in range and is stable.

#![no_main]

use libfuzzer_sys::fuzz_target;
use memcached_udp::topology::shard_index;

fuzz_target!(|data: (&str, u8)| {
    let (key, shards) = data;
    let shards = shards as usize + 1;

    let index = shard_index(key, shards);
    assert!(index < shards);
    assert_eq!(index, shard_index(key, shards));
});
