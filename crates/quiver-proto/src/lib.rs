//! Quiver wire protocol.
//!
//! Defines the CBOR wire envelope carried by the transport and the
//! protocol version tag embedded in every envelope. This crate holds
//! no cryptography and no I/O - it is the shared vocabulary between
//! the engine and its transport collaborators.
//!
//! # Compatibility
//!
//! Envelopes from a newer schema or an unknown cipher suite are
//! rejected during decoding. The engine never attempts to partially
//! interpret an envelope it does not fully understand.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod ack;
pub mod envelope;
pub mod error;
pub mod version;

pub use ack::{Acknowledgment, MAX_ACK_SIZE};
pub use envelope::{Envelope, MAX_ENVELOPE_SIZE, build_aad};
pub use error::ProtocolError;
pub use version::{CipherSuite, MAX_SCHEMA_VERSION, ProtocolVersion};
