//! Fuzz target for inbound datagram decoding.
//!
//! Every byte string the network can deliver must decode to either noise or
//! a response, never a panic, and a success must respect the declared lengths.

#![no_main]

use libfuzzer_sys::fuzz_target;
use memcached_udp::protocol::{decode_response, Inbound, Reply, HEADERS_LEN};

fuzz_target!(|data: &[u8]| {
    match decode_response(data) {
        Inbound::Noise(_) => {}
        Inbound::Response { outcome, status, .. } => {
            assert!(data.len() >= HEADERS_LEN);
            if let Ok(reply) = outcome {
                assert_eq!(status, 0);
                if let Reply::Value(value) = reply {
                    // Lossy decoding never grows past 3 bytes per input byte.
                    assert!(value.len() <= 3 * data.len());
                }
            }
        }
    }
});
