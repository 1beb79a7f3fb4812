//! Fuzz target for Envelope::decode
//!
//! Exercises CBOR deserialization of the wire envelope with:
//! - Malformed CBOR data
//! - Truncated and oversized inputs
//! - Valid CBOR of the wrong shape
//!
//! Decoding must NEVER panic; invalid inputs return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quiver_proto::Envelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = Envelope::decode(data) {
        // A decodable envelope always carries a parseable version and
        // must survive a re-encode.
        let _ = envelope.protocol_version();
        let _ = envelope.encode();
    }
});
