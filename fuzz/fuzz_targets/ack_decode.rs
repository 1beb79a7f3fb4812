//! Fuzz target for Acknowledgment::decode
//!
//! Acks share an inbound path with envelopes, so any byte string a
//! peer sends eventually reaches this decoder. It must never panic
//! and must reject payloads past the size cap before parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quiver_proto::Acknowledgment;

fuzz_target!(|data: &[u8]| {
    if let Ok(ack) = Acknowledgment::decode(data) {
        let _ = ack.encode();
    }
});
