//! Asynchronous X3DH-style key agreement.
//!
//! Two parties derive an identical shared secret without being online
//! at the same time. The responder publishes a prekey bundle; the
//! initiator combines three Diffie-Hellman operations over identity,
//! ephemeral, and signed-prekey material and the responder later
//! computes the mirror image.
//!
//! ```text
//! SK = KDF( DH(IK_i, SPK_r) || DH(EK_i, IK_r) || DH(EK_i, SPK_r) )
//! ```

use zeroize::Zeroize;

use crate::{
    derivation::derive_handshake_secret,
    error::CryptoError,
    keys::{KEY_SIZE, Keypair, PublicKey, SIGNATURE_SIZE, SigningKeypair, verify_signature},
};

/// A published prekey bundle for asynchronous session setup.
///
/// The signed prekey is authenticated by the owner's Ed25519 key so
/// a relay cannot substitute its own prekey.
#[derive(Debug, Clone)]
pub struct PrekeyBundle {
    /// Owner's long-term identity public key (X25519).
    pub identity: PublicKey,
    /// Medium-term signed prekey (X25519).
    pub signed_prekey: PublicKey,
    /// Owner's Ed25519 verifying key.
    pub signing_key: [u8; KEY_SIZE],
    /// Signature over the signed prekey bytes.
    pub prekey_signature: [u8; SIGNATURE_SIZE],
}

impl PrekeyBundle {
    /// Build a bundle, signing the prekey with the owner's Ed25519 key.
    pub fn new(identity: PublicKey, signed_prekey: PublicKey, signer: &SigningKeypair) -> Self {
        Self {
            identity,
            signed_prekey,
            signing_key: signer.public_bytes(),
            prekey_signature: signer.sign(signed_prekey.as_bytes()),
        }
    }

    fn verify(&self) -> Result<(), CryptoError> {
        verify_signature(&self.signing_key, self.signed_prekey.as_bytes(), &self.prekey_signature)
            .map_err(|_| CryptoError::KeyExchange {
                reason: "prekey signature verification failed".to_string(),
            })
    }
}

/// Outcome of the initiator side of the handshake.
///
/// The ephemeral public key must be delivered to the responder so it
/// can compute the same secret.
pub struct InitiatedExchange {
    /// The derived shared secret.
    pub shared_secret: [u8; KEY_SIZE],
    /// Initiator's ephemeral public key, sent alongside the first message.
    pub ephemeral_public: PublicKey,
}

/// Initiator side: derive a shared secret from the responder's bundle.
///
/// # Errors
///
/// `KeyExchange` when the bundle signature does not verify or any DH
/// operation encounters malformed key material.
pub fn initiate(
    our_identity: &Keypair,
    their_bundle: &PrekeyBundle,
) -> Result<InitiatedExchange, CryptoError> {
    their_bundle.verify()?;

    let ephemeral = Keypair::generate();

    let dh1 = our_identity.diffie_hellman(&their_bundle.signed_prekey)?;
    let dh2 = ephemeral.diffie_hellman(&their_bundle.identity)?;
    let dh3 = ephemeral.diffie_hellman(&their_bundle.signed_prekey)?;

    let shared_secret = combine(dh1.as_bytes(), dh2.as_bytes(), dh3.as_bytes());

    Ok(InitiatedExchange { shared_secret, ephemeral_public: ephemeral.public() })
}

/// Responder side: derive the same secret from the initiator's keys.
///
/// The responder swaps roles in each DH pair, which is what makes the
/// two sides land on an identical secret.
pub fn respond(
    our_identity: &Keypair,
    our_signed_prekey: &Keypair,
    their_identity: &PublicKey,
    their_ephemeral: &PublicKey,
) -> Result<[u8; KEY_SIZE], CryptoError> {
    let dh1 = our_signed_prekey.diffie_hellman(their_identity)?;
    let dh2 = our_identity.diffie_hellman(their_ephemeral)?;
    let dh3 = our_signed_prekey.diffie_hellman(their_ephemeral)?;

    Ok(combine(dh1.as_bytes(), dh2.as_bytes(), dh3.as_bytes()))
}

fn combine(dh1: &[u8; KEY_SIZE], dh2: &[u8; KEY_SIZE], dh3: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut ikm = [0u8; 3 * KEY_SIZE];
    ikm[..KEY_SIZE].copy_from_slice(dh1);
    ikm[KEY_SIZE..2 * KEY_SIZE].copy_from_slice(dh2);
    ikm[2 * KEY_SIZE..].copy_from_slice(dh3);

    let secret = derive_handshake_secret(&ikm);
    ikm.zeroize();
    secret
}
