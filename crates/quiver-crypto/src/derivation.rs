//! Consolidated key derivation.
//!
//! Every KDF call site in the engine goes through this module so the
//! domain-separation labels live in one place. A label collision
//! between the ratchet, group, and handshake derivations would silently
//! produce related keys; keeping them side by side makes the
//! separation auditable.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Label for the X3DH handshake secret.
const HANDSHAKE_LABEL: &[u8] = b"quiver-handshake-v1";

/// Label for root key advancement (DH ratchet step).
const ROOT_LABEL: &[u8] = b"quiver-root-v1";

/// Label for deriving a message key from a chain key.
const MESSAGE_LABEL: &[u8] = b"quiver-message-v1";

/// Label for deriving the next chain key.
const CHAIN_LABEL: &[u8] = b"quiver-chain-v1";

/// Label for group epoch secret rotation.
const GROUP_EPOCH_LABEL: &[u8] = b"quiver-group-epoch-v1";

/// Label for per-pair session material inside a group epoch.
const GROUP_PAIR_LABEL: &[u8] = b"quiver-group-pair-v1";

/// Derive the handshake shared secret from concatenated DH outputs.
///
/// Used by both X3DH roles; identical inputs produce identical output,
/// which is what makes the asynchronous handshake symmetric.
pub fn derive_handshake_secret(dh_outputs: &[u8]) -> [u8; 32] {
    hkdf_expand(None, dh_outputs, HANDSHAKE_LABEL)
}

/// Advance the root key with fresh DH output.
///
/// Returns `(new_root_key, chain_key)`. The old root key must be
/// zeroized by the caller once the new values are installed.
pub fn derive_root(root_key: &[u8; 32], dh_output: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key), dh_output);

    let mut okm = [0u8; 64];
    let Ok(()) = hkdf.expand(ROOT_LABEL, &mut okm) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut new_root = [0u8; 32];
    let mut chain_key = [0u8; 32];
    new_root.copy_from_slice(&okm[..32]);
    chain_key.copy_from_slice(&okm[32..]);
    (new_root, chain_key)
}

/// Derive a one-use message key from the current chain key.
pub fn derive_message_key(chain_key: &[u8; 32]) -> [u8; 32] {
    hmac_derive(chain_key, MESSAGE_LABEL)
}

/// Derive the next chain key from the current chain key.
pub fn derive_next_chain_key(chain_key: &[u8; 32]) -> [u8; 32] {
    hmac_derive(chain_key, CHAIN_LABEL)
}

/// Derive a fresh group epoch secret.
///
/// Bound to the group id and the post-rotation version so distinct
/// groups and distinct epochs can never share a secret.
pub fn derive_group_epoch(
    previous_secret: &[u8; 32],
    group_id: &[u8],
    version: u64,
) -> [u8; 32] {
    // info: label || group_id || version
    let mut info = Vec::with_capacity(GROUP_EPOCH_LABEL.len() + group_id.len() + 8);
    info.extend_from_slice(GROUP_EPOCH_LABEL);
    info.extend_from_slice(group_id);
    info.extend_from_slice(&version.to_be_bytes());

    hkdf_expand(Some(group_id), previous_secret, &info)
}

/// Derive session material for one directed member pair of a group.
///
/// Returns `(handshake_secret, prekey_seed)`: the secret that seeds
/// the pair's ratchet session and the seed for the recipient-side
/// prekey. Bound to sender and recipient separately so the two
/// directions of a pair never share keys. Fields are length-prefixed
/// to keep the encoding unambiguous.
pub fn derive_pair_material(
    epoch_secret: &[u8; 32],
    group_id: &[u8],
    sender: &[u8],
    recipient: &[u8],
) -> ([u8; 32], [u8; 32]) {
    let mut info = Vec::with_capacity(
        GROUP_PAIR_LABEL.len() + group_id.len() + sender.len() + recipient.len() + 12,
    );
    info.extend_from_slice(GROUP_PAIR_LABEL);
    for field in [group_id, sender, recipient] {
        info.extend_from_slice(&(field.len() as u32).to_be_bytes());
        info.extend_from_slice(field);
    }

    let hkdf = Hkdf::<Sha256>::new(Some(group_id), epoch_secret);

    let mut okm = [0u8; 64];
    let Ok(()) = hkdf.expand(&info, &mut okm) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut secret = [0u8; 32];
    let mut prekey_seed = [0u8; 32];
    secret.copy_from_slice(&okm[..32]);
    prekey_seed.copy_from_slice(&okm[32..]);
    (secret, prekey_seed)
}

fn hkdf_expand(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = [0u8; 32];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

fn hmac_derive(key: &[u8; 32], label: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}
