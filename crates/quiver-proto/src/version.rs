//! Protocol version tags.
//!
//! Every envelope carries a version string of the form
//! `<cipher-suite>-<schema-version>[-padded]`, for example
//! `xchacha20poly1305-1-padded`. Unknown suites or schema versions are
//! rejected outright - there is no best-effort parsing of envelopes
//! from a future protocol.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Cipher suites this implementation understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherSuite {
    /// XChaCha20-Poly1305 AEAD with HKDF/HMAC-SHA256 derivation.
    XChaCha20Poly1305,
}

impl CipherSuite {
    fn as_str(self) -> &'static str {
        match self {
            Self::XChaCha20Poly1305 => "xchacha20poly1305",
        }
    }
}

/// Highest schema version this implementation accepts.
pub const MAX_SCHEMA_VERSION: u16 = 1;

/// A parsed protocol version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    /// The cipher suite in use.
    pub suite: CipherSuite,
    /// Envelope schema version.
    pub schema: u16,
    /// Whether the plaintext was length-padded before encryption.
    pub padded: bool,
}

impl ProtocolVersion {
    /// The version tag produced by this implementation.
    pub const CURRENT: Self =
        Self { suite: CipherSuite::XChaCha20Poly1305, schema: 1, padded: true };

    /// Parse and validate a version tag.
    ///
    /// # Errors
    ///
    /// `UnsupportedVersion` for unknown suites, schema versions above
    /// [`MAX_SCHEMA_VERSION`], or malformed tags.
    pub fn parse(tag: &str) -> Result<Self, ProtocolError> {
        let unsupported = || ProtocolError::UnsupportedVersion { tag: tag.to_string() };

        let mut parts = tag.split('-');
        let suite = match parts.next() {
            Some("xchacha20poly1305") => CipherSuite::XChaCha20Poly1305,
            _ => return Err(unsupported()),
        };

        let schema: u16 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(unsupported)?;
        if schema == 0 || schema > MAX_SCHEMA_VERSION {
            return Err(unsupported());
        }

        let padded = match parts.next() {
            None => false,
            Some("padded") => true,
            Some(_) => return Err(unsupported()),
        };

        if parts.next().is_some() {
            return Err(unsupported());
        }

        Ok(Self { suite, schema, padded })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.suite.as_str(), self.schema)?;
        if self.padded {
            write!(f, "-padded")?;
        }
        Ok(())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
