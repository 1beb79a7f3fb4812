//! Pairwise group messaging.
//!
//! A group is modeled as one ratchet session per ordered member pair,
//! all seeded deterministically from a shared epoch secret. Fan-out
//! cost grows quadratically with membership, which is why
//! [`GroupConfig::max_members`] defaults to a small cap. Group
//! envelopes additionally carry an Ed25519 signature over the AAD and
//! a hash of the plaintext, so membership of the pairwise mesh alone
//! is not enough to impersonate a sender.
//!
//! Epoch changes cut the key continuity: a scheduled rotation derives
//! the next epoch one-way from the previous, while removing a member
//! draws fresh randomness so the removed member cannot follow the
//! derivation chain forward.

use std::collections::{BTreeSet, HashMap};

use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use quiver_crypto::{CryptoError, Keypair, SigningKeypair, derivation, verify_signature};
use quiver_proto::Envelope;

use crate::{
    error::EngineError,
    session::{RatchetSession, SessionState},
};

/// How often a group's epoch secret rotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationInterval {
    /// Daily. For high-churn or high-sensitivity groups.
    Short,
    /// Weekly. The default.
    Medium,
    /// Monthly. For mostly-idle groups.
    Long,
}

impl RotationInterval {
    /// Interval length in seconds.
    pub fn as_secs(self) -> u64 {
        match self {
            Self::Short => 24 * 60 * 60,
            Self::Medium => 7 * 24 * 60 * 60,
            Self::Long => 30 * 24 * 60 * 60,
        }
    }
}

/// Group behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct GroupConfig {
    /// Scheduled epoch rotation cadence.
    pub rotation: RotationInterval,
    /// Hard membership cap. Keeps the pairwise session mesh bounded.
    pub max_members: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self { rotation: RotationInterval::Medium, max_members: 32 }
    }
}

/// Result of encrypting one message to a group.
///
/// Fan-out is best-effort: members whose pair session failed are
/// reported alongside the envelopes that did encrypt.
#[derive(Debug)]
pub struct GroupSendOutcome {
    /// Message id shared by every per-member envelope.
    pub message_id: String,
    /// One envelope per reachable member.
    pub envelopes: Vec<Envelope>,
    /// Members that could not be encrypted to, with the reason.
    pub failures: Vec<(String, EngineError)>,
}

/// Both directions of one ordered member pair.
#[derive(Debug)]
struct PairChannel {
    sender_side: RatchetSession,
    recipient_side: RatchetSession,
}

/// Persisted form of one pair channel.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct ChannelState {
    sender: String,
    recipient: String,
    sender_side: SessionState,
    recipient_side: SessionState,
}

/// Serializable snapshot of a group.
///
/// Contains the epoch secret and every pair session; snapshots belong
/// in the secure storage partition only, and are zeroized on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct GroupState {
    group_id: String,
    version: u64,
    members: Vec<String>,
    admins: Vec<String>,
    signing_secret: [u8; 32],
    epoch_secret: [u8; 32],
    epoch_started_at: u64,
    #[zeroize(skip)]
    rotation: RotationInterval,
    max_members: u64,
    channels: Vec<ChannelState>,
}

impl GroupState {
    /// Id of the snapshotted group.
    pub fn id(&self) -> &str {
        &self.group_id
    }
}

/// One messaging group and its pairwise session mesh.
#[derive(Debug)]
pub struct Group {
    group_id: String,
    version: u64,
    members: BTreeSet<String>,
    admins: BTreeSet<String>,
    signing: SigningKeypair,
    epoch_secret: [u8; 32],
    epoch_started_at: u64,
    config: GroupConfig,
    channels: HashMap<(String, String), PairChannel>,
}

impl Group {
    /// Create a group. The creator becomes the first admin.
    ///
    /// Seeds a ratchet session for every ordered member pair.
    ///
    /// # Errors
    ///
    /// `GroupMembership` if the member list exceeds the cap.
    pub fn create(
        group_id: &str,
        creator: &str,
        members: &[String],
        config: GroupConfig,
        now: u64,
    ) -> Result<Self, EngineError> {
        let mut all: BTreeSet<String> = members.iter().cloned().collect();
        all.insert(creator.to_string());

        if all.len() > config.max_members {
            return Err(EngineError::GroupMembership {
                reason: format!(
                    "{} members exceeds the cap of {}",
                    all.len(),
                    config.max_members
                ),
            });
        }

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let epoch_secret = derivation::derive_group_epoch(&seed, group_id.as_bytes(), 1);
        seed.zeroize();

        let mut group = Self {
            group_id: group_id.to_string(),
            version: 1,
            members: all,
            admins: BTreeSet::from([creator.to_string()]),
            signing: SigningKeypair::generate(),
            epoch_secret,
            epoch_started_at: now,
            config,
            channels: HashMap::new(),
        };
        group.reseed_all_channels(now)?;

        info!(group_id, members = group.members.len(), "group created");
        Ok(group)
    }

    /// Group id.
    pub fn id(&self) -> &str {
        &self.group_id
    }

    /// Membership version; increments on every add, remove, and epoch
    /// rotation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Current members, sorted.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Whether the peer is a member.
    pub fn is_member(&self, peer_id: &str) -> bool {
        self.members.contains(peer_id)
    }

    /// Whether the peer holds admin rights.
    pub fn is_admin(&self, peer_id: &str) -> bool {
        self.admins.contains(peer_id)
    }

    /// Encrypt a message from `sender` to every other member.
    ///
    /// Rotates the epoch first if the scheduled interval has elapsed.
    /// Per-member failures do not abort the fan-out.
    ///
    /// # Errors
    ///
    /// `GroupMembership` if the sender is not a member.
    pub fn encrypt_to_group(
        &mut self,
        sender: &str,
        plaintext: &[u8],
        now: u64,
    ) -> Result<GroupSendOutcome, EngineError> {
        if !self.members.contains(sender) {
            return Err(EngineError::GroupMembership {
                reason: format!("{sender} is not a member of {}", self.group_id),
            });
        }
        self.rotate_if_due(now)?;

        let message_id = random_message_id();
        let content_hash = Sha256::digest(plaintext);

        let recipients: Vec<String> =
            self.members.iter().filter(|m| m.as_str() != sender).cloned().collect();

        let mut envelopes = Vec::with_capacity(recipients.len());
        let mut failures = Vec::new();
        for recipient in recipients {
            match self.encrypt_to_member(sender, &recipient, plaintext, &message_id, now) {
                Ok(mut envelope) => {
                    let mut signed = envelope.aad.clone();
                    signed.extend_from_slice(&content_hash);
                    envelope.signature = Some(self.signing.sign(&signed).to_vec());
                    envelopes.push(envelope);
                }
                Err(e) => {
                    debug!(group_id = %self.group_id, member = %recipient, error = %e,
                        "group fan-out failed for member");
                    failures.push((recipient, e));
                }
            }
        }

        Ok(GroupSendOutcome { message_id, envelopes, failures })
    }

    /// Decrypt a group envelope addressed to `recipient`.
    ///
    /// A missing pair session gets one automatic recovery attempt:
    /// the recipient side is reseeded from the current epoch and the
    /// envelope is retried. Recovery is limited to lost sessions;
    /// reseeding on ordinary decrypt failures would let consumed
    /// counters be replayed.
    ///
    /// # Errors
    ///
    /// - `GroupMembership` for wrong group or non-member sender
    /// - `Crypto(SignatureInvalid)` when the sender signature does
    ///   not verify against the group signing key
    pub fn decrypt_from_group(
        &mut self,
        recipient: &str,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, EngineError> {
        if envelope.group_id.as_deref() != Some(self.group_id.as_str()) {
            return Err(EngineError::GroupMembership {
                reason: "envelope does not belong to this group".to_string(),
            });
        }
        let sender = envelope.sender_id.clone();
        if !self.members.contains(&sender) || !self.members.contains(recipient) {
            return Err(EngineError::GroupMembership {
                reason: format!("{sender} -> {recipient} is not a member pair"),
            });
        }
        let Some(signature) = envelope.signature.as_deref() else {
            return Err(EngineError::Crypto(CryptoError::SignatureInvalid));
        };

        let plaintext = match self.decrypt_via_channel(&sender, recipient, envelope) {
            Ok(plaintext) => plaintext,
            Err(EngineError::SessionMissing { .. }) => {
                debug!(group_id = %self.group_id, sender = %sender,
                    "pair session lost, reseeding recipient side");
                self.recover_recipient_side(&sender, recipient)?;
                self.decrypt_via_channel(&sender, recipient, envelope)?
            }
            Err(e) => return Err(e),
        };

        let mut signed = envelope.aad.clone();
        signed.extend_from_slice(&Sha256::digest(&plaintext));
        let signature: [u8; 64] = signature
            .try_into()
            .map_err(|_| EngineError::Crypto(CryptoError::SignatureInvalid))?;
        verify_signature(&self.signing.public_bytes(), &signed, &signature)?;

        Ok(plaintext)
    }

    /// Add a member. Admin only.
    ///
    /// Seeds sessions between the newcomer and every existing member
    /// at the current epoch; nothing sent before the join becomes
    /// readable to them.
    ///
    /// # Errors
    ///
    /// `NotAdmin`, or `GroupMembership` when the cap is reached or
    /// the peer already belongs.
    pub fn add_member(&mut self, actor: &str, member: &str, now: u64) -> Result<(), EngineError> {
        self.require_admin(actor)?;
        if self.members.contains(member) {
            return Err(EngineError::GroupMembership {
                reason: format!("{member} is already a member"),
            });
        }
        if self.members.len() >= self.config.max_members {
            return Err(EngineError::GroupMembership {
                reason: format!("group is at its cap of {}", self.config.max_members),
            });
        }

        let existing: Vec<String> = self.members.iter().cloned().collect();
        self.members.insert(member.to_string());
        self.version += 1;
        for other in existing {
            self.seed_channel(member, &other, now)?;
            self.seed_channel(&other, member, now)?;
        }

        info!(group_id = %self.group_id, member, version = self.version, "member added");
        Ok(())
    }

    /// Remove a member. Admin only.
    ///
    /// Tears down every session involving the member and starts a new
    /// epoch from fresh randomness, so the removed member's retained
    /// state cannot derive any future key.
    ///
    /// # Errors
    ///
    /// `NotAdmin`, or `GroupMembership` if the peer is not a member.
    pub fn remove_member(
        &mut self,
        actor: &str,
        member: &str,
        now: u64,
    ) -> Result<(), EngineError> {
        self.require_admin(actor)?;
        if !self.members.remove(member) {
            return Err(EngineError::GroupMembership {
                reason: format!("{member} is not a member"),
            });
        }
        self.admins.remove(member);
        self.channels.retain(|(s, r), _| s != member && r != member);

        self.version += 1;
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        self.install_epoch(
            derivation::derive_group_epoch(&seed, self.group_id.as_bytes(), self.version),
            now,
        )?;
        seed.zeroize();

        info!(group_id = %self.group_id, member, version = self.version,
            "member removed, new epoch started");
        Ok(())
    }

    /// Rotate the epoch if the configured interval has elapsed.
    ///
    /// The next epoch is derived one-way from the current one; old
    /// epoch secrets are unrecoverable afterwards.
    ///
    /// # Errors
    ///
    /// `Crypto` if reseeding a pair session fails.
    pub fn rotate_if_due(&mut self, now: u64) -> Result<bool, EngineError> {
        if now.saturating_sub(self.epoch_started_at) < self.config.rotation.as_secs() {
            return Ok(false);
        }
        self.version += 1;
        self.install_epoch(
            derivation::derive_group_epoch(
                &self.epoch_secret,
                self.group_id.as_bytes(),
                self.version,
            ),
            now,
        )?;

        info!(group_id = %self.group_id, version = self.version, "scheduled epoch rotation");
        Ok(true)
    }

    fn require_admin(&self, actor: &str) -> Result<(), EngineError> {
        if self.admins.contains(actor) {
            Ok(())
        } else {
            Err(EngineError::NotAdmin {
                peer_id: actor.to_string(),
                group_id: self.group_id.clone(),
            })
        }
    }

    fn install_epoch(&mut self, epoch_secret: [u8; 32], now: u64) -> Result<(), EngineError> {
        self.epoch_secret.zeroize();
        self.epoch_secret = epoch_secret;
        self.epoch_started_at = now;
        self.reseed_all_channels(now)
    }

    fn reseed_all_channels(&mut self, now: u64) -> Result<(), EngineError> {
        self.channels.clear();
        let members: Vec<String> = self.members.iter().cloned().collect();
        for sender in &members {
            for recipient in &members {
                if sender != recipient {
                    self.seed_channel(sender, recipient, now)?;
                }
            }
        }
        Ok(())
    }

    fn seed_channel(
        &mut self,
        sender: &str,
        recipient: &str,
        now: u64,
    ) -> Result<(), EngineError> {
        let (mut secret, mut prekey_seed) = derivation::derive_pair_material(
            &self.epoch_secret,
            self.group_id.as_bytes(),
            sender.as_bytes(),
            recipient.as_bytes(),
        );
        let prekey = Keypair::from_secret_bytes(prekey_seed);

        let sender_side =
            RatchetSession::initiate(sender, recipient, &secret, prekey.public(), now)?;
        let recipient_side = RatchetSession::respond(recipient, sender, &secret, prekey, now);
        secret.zeroize();
        prekey_seed.zeroize();

        self.channels.insert(
            (sender.to_string(), recipient.to_string()),
            PairChannel { sender_side, recipient_side },
        );
        Ok(())
    }

    /// Snapshot the group for persistence.
    pub fn to_state(&self) -> GroupState {
        GroupState {
            group_id: self.group_id.clone(),
            version: self.version,
            members: self.members.iter().cloned().collect(),
            admins: self.admins.iter().cloned().collect(),
            signing_secret: self.signing.secret_bytes(),
            epoch_secret: self.epoch_secret,
            epoch_started_at: self.epoch_started_at,
            rotation: self.config.rotation,
            max_members: self.config.max_members as u64,
            channels: self
                .channels
                .iter()
                .map(|((sender, recipient), channel)| ChannelState {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                    sender_side: channel.sender_side.to_state(),
                    recipient_side: channel.recipient_side.to_state(),
                })
                .collect(),
        }
    }

    /// Rebuild a group from a persisted snapshot.
    pub fn from_state(state: &GroupState) -> Self {
        Self {
            group_id: state.group_id.clone(),
            version: state.version,
            members: state.members.iter().cloned().collect(),
            admins: state.admins.iter().cloned().collect(),
            signing: SigningKeypair::from_secret_bytes(state.signing_secret),
            epoch_secret: state.epoch_secret,
            epoch_started_at: state.epoch_started_at,
            config: GroupConfig {
                rotation: state.rotation,
                max_members: state.max_members as usize,
            },
            channels: state
                .channels
                .iter()
                .map(|c| {
                    (
                        (c.sender.clone(), c.recipient.clone()),
                        PairChannel {
                            sender_side: RatchetSession::from_state(&c.sender_side),
                            recipient_side: RatchetSession::from_state(&c.recipient_side),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Rebuild only the recipient half of a pair, leaving an intact
    /// sender half alone. If the whole channel is gone, both halves
    /// are reseeded.
    fn recover_recipient_side(
        &mut self,
        sender: &str,
        recipient: &str,
    ) -> Result<(), EngineError> {
        let key = (sender.to_string(), recipient.to_string());
        if !self.channels.contains_key(&key) {
            return self.seed_channel(sender, recipient, self.epoch_started_at);
        }

        let (mut secret, mut prekey_seed) = derivation::derive_pair_material(
            &self.epoch_secret,
            self.group_id.as_bytes(),
            sender.as_bytes(),
            recipient.as_bytes(),
        );
        let prekey = Keypair::from_secret_bytes(prekey_seed);
        let fresh = RatchetSession::respond(recipient, sender, &secret, prekey, self.epoch_started_at);
        secret.zeroize();
        prekey_seed.zeroize();

        if let Some(channel) = self.channels.get_mut(&key) {
            channel.recipient_side = fresh;
        }
        Ok(())
    }

    fn encrypt_to_member(
        &mut self,
        sender: &str,
        recipient: &str,
        plaintext: &[u8],
        message_id: &str,
        now: u64,
    ) -> Result<Envelope, EngineError> {
        let key = (sender.to_string(), recipient.to_string());
        if !self.channels.contains_key(&key) {
            self.seed_channel(sender, recipient, now)?;
        }
        let Some(channel) = self.channels.get_mut(&key) else {
            return Err(EngineError::SessionMissing { peer_id: recipient.to_string() });
        };
        let group_id = self.group_id.clone();
        channel.sender_side.encrypt(plaintext, message_id, Some(&group_id), now)
    }

    fn decrypt_via_channel(
        &mut self,
        sender: &str,
        recipient: &str,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, EngineError> {
        let key = (sender.to_string(), recipient.to_string());
        let Some(channel) = self.channels.get_mut(&key) else {
            return Err(EngineError::SessionMissing { peer_id: sender.to_string() });
        };
        channel.recipient_side.decrypt(envelope)
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        self.epoch_secret.zeroize();
    }
}

/// Groups indexed by id.
#[derive(Default)]
pub struct GroupManager {
    groups: HashMap<String, Group>,
}

impl GroupManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group and register it.
    ///
    /// # Errors
    ///
    /// `GroupMembership` if the id is taken or the member list
    /// exceeds the cap.
    pub fn create_group(
        &mut self,
        group_id: &str,
        creator: &str,
        members: &[String],
        config: GroupConfig,
        now: u64,
    ) -> Result<&Group, EngineError> {
        if self.groups.contains_key(group_id) {
            return Err(EngineError::GroupMembership {
                reason: format!("group {group_id} already exists"),
            });
        }
        let group = Group::create(group_id, creator, members, config, now)?;
        Ok(self.groups.entry(group_id.to_string()).or_insert(group))
    }

    /// Register a restored group, replacing any same-id entry.
    pub fn insert(&mut self, group: Group) {
        self.groups.insert(group.id().to_string(), group);
    }

    /// Iterate over all groups.
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Iterate over all groups mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        self.groups.values_mut()
    }

    /// Look up a group.
    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.get(group_id)
    }

    /// Look up a group mutably.
    ///
    /// # Errors
    ///
    /// `GroupMembership` if no such group exists.
    pub fn group_mut(&mut self, group_id: &str) -> Result<&mut Group, EngineError> {
        self.groups.get_mut(group_id).ok_or_else(|| EngineError::GroupMembership {
            reason: format!("unknown group {group_id}"),
        })
    }
}

pub(crate) fn random_message_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
