//! The member roles of the GJKR protocol, one per phase.
//!
//! A member starts as a [`LocalMember`] and is transformed into the role of
//! each following phase by value, so a role can only perform the operations
//! of its own phase and only after the previous phase completed:
//!
//! | Phase | Role |
//! |---|---|
//! | 1 | [`EphemeralKeyPairGeneratingMember`] |
//! | 2 | [`SymmetricKeyGeneratingMember`] |
//! | 3 | [`CommittingMember`] |
//! | 4 | [`CommitmentsVerifyingMember`] |
//! | 5 | [`SharesJustifyingMember`] |
//! | 6 | [`QualifiedMember`] |
//! | 7 | [`SharingMember`] |
//! | 8 | [`PointsValidatingMember`] |
//! | 9 | [`PointsJustifyingMember`] |
//! | 10 | [`RevealingMember`] |
//! | 11 | [`ReconstructingMember`] |
//! | 12 | [`CombiningMember`] |
//! | 13 | [`FinalizingMember`] |
//!
//! Every role shares a [`MemberCore`] holding the member's group view and its
//! evidence log. Faults of other members never surface as errors; they
//! disqualify or inactivate the faulty member in the local group view.

use alloc::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::{
    config::Config,
    ephemeral::{EphemeralKeyPair, EphemeralPrivateKey, EphemeralPublicKey, SymmetricKey},
    evidence::{Evidence, EvidenceLog},
    group::{Group, MemberIndex, MembershipValidator},
    inactivity,
    messages::EphemeralPublicKeyMessage,
    serialization::SerializableScalar,
    Ciphersuite, Error, Scalar,
};

mod justification;
mod points;
mod reconstruction;
mod sharing;

pub use justification::{QualifiedMember, SharesJustifyingMember};
pub use points::{PointsJustifyingMember, PointsValidatingMember, SharingMember};
pub use reconstruction::{
    CombiningMember, FinalizingMember, MisbehavedShares, ReconstructingMember, RevealingMember,
};
pub use sharing::{CommitmentsVerifyingMember, CommittingMember};

/// State common to every member role.
pub struct MemberCore<C: Ciphersuite> {
    index: MemberIndex,
    group: Group,
    session_id: String,
    membership_validator: MembershipValidator,
    evidence_log: EvidenceLog<C>,
}

impl<C> MemberCore<C>
where
    C: Ciphersuite,
{
    /// The index of this member.
    pub fn index(&self) -> MemberIndex {
        self.index
    }

    /// This member's view of the group.
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// The DKG session this member takes part in.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The operator keys selected for the group.
    pub fn membership_validator(&self) -> &MembershipValidator {
        &self.membership_validator
    }

    /// The messages kept to resolve accusations.
    pub fn evidence_log(&self) -> &EvidenceLog<C> {
        &self.evidence_log
    }

    /// Whether a message claiming to come from `sender`, delivered with the
    /// transport key `sender_public_key`, should be processed.
    pub fn should_accept_message(&self, sender: MemberIndex, sender_public_key: &[u8]) -> bool {
        sender != self.index
            && self.group.is_operating(sender)
            && self
                .membership_validator
                .is_valid_membership(sender, sender_public_key)
    }

    pub(crate) fn group_mut(&mut self) -> &mut Group {
        &mut self.group
    }

    pub(crate) fn mark_inactive_members(&mut self, senders: impl IntoIterator<Item = MemberIndex>) {
        inactivity::mark_inactive_members(self.index, &mut self.group, senders);
    }

    pub(crate) fn disqualify(&mut self, member: MemberIndex, reason: &str) {
        if self.group.is_operating(member) {
            warn!(member = %self.index, disqualified = %member, reason, "disqualifying member");
        }
        self.group.mark_member_as_disqualified(member);
    }

    /// Log a message as evidence. A duplicate is reported and ignored.
    pub(crate) fn record_evidence(&mut self, message: impl Into<Evidence<C>>) -> bool {
        match self.evidence_log.put(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(member = %self.index, %err, "could not record evidence");
                false
            }
        }
    }
}

/// Access to the [`MemberCore`] of a role.
pub trait Member<C: Ciphersuite> {
    /// The shared state of the role.
    fn core(&self) -> &MemberCore<C>;

    /// The index of this member.
    fn index(&self) -> MemberIndex {
        self.core().index()
    }

    /// This member's view of the group.
    fn group(&self) -> &Group {
        self.core().group()
    }

    /// See [`MemberCore::should_accept_message`].
    fn should_accept_message(&self, sender: MemberIndex, sender_public_key: &[u8]) -> bool {
        self.core().should_accept_message(sender, sender_public_key)
    }
}

macro_rules! impl_member {
    ($($role:ident),+ $(,)?) => {
        $(
            impl<C: Ciphersuite> Member<C> for $role<C> {
                fn core(&self) -> &MemberCore<C> {
                    &self.core
                }
            }
        )+
    };
}

impl_member!(
    LocalMember,
    EphemeralKeyPairGeneratingMember,
    SymmetricKeyGeneratingMember,
    CommittingMember,
    CommitmentsVerifyingMember,
    SharesJustifyingMember,
    QualifiedMember,
    SharingMember,
    PointsValidatingMember,
    PointsJustifyingMember,
    RevealingMember,
    ReconstructingMember,
    CombiningMember,
    FinalizingMember,
);

/// A member before the protocol starts.
pub struct LocalMember<C: Ciphersuite> {
    core: MemberCore<C>,
}

impl<C> LocalMember<C>
where
    C: Ciphersuite,
{
    /// Create a member with the given index in a group described by
    /// `config`.
    pub fn new(
        index: MemberIndex,
        config: &Config,
        session_id: impl Into<String>,
        membership_validator: MembershipValidator,
    ) -> Result<Self, Error> {
        config.validate()?;
        let group_size = u8::try_from(config.group_size).map_err(|_| Error::InvalidGroupSize)?;
        let dishonest_threshold = u8::try_from(config.dishonest_threshold())
            .map_err(|_| Error::InvalidHonestThreshold)?;
        let group = Group::new(dishonest_threshold, group_size)?;
        if !group.is_in_group(index) {
            return Err(Error::UnknownMember(index));
        }

        Ok(Self {
            core: MemberCore {
                index,
                group,
                session_id: session_id.into(),
                membership_validator,
                evidence_log: EvidenceLog::new(),
            },
        })
    }

    /// Start phase 1.
    pub fn into_ephemeral_key_pair_generating_member(self) -> EphemeralKeyPairGeneratingMember<C> {
        EphemeralKeyPairGeneratingMember {
            core: self.core,
            ephemeral_key_pairs: BTreeMap::new(),
        }
    }
}

/// Phase 1: generates one ephemeral key pair per peer.
pub struct EphemeralKeyPairGeneratingMember<C: Ciphersuite> {
    core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
}

impl<C> EphemeralKeyPairGeneratingMember<C>
where
    C: Ciphersuite,
{
    /// Generate an ephemeral key pair for every other member of the group and
    /// return the message broadcasting their public keys.
    pub fn generate_ephemeral_key_pair<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<EphemeralPublicKeyMessage<C>, Error> {
        let mut public_keys = BTreeMap::new();
        let peers: Vec<_> = self
            .core
            .group
            .member_ids()
            .filter(|member| *member != self.core.index)
            .collect();

        for peer in peers {
            if self.ephemeral_key_pairs.contains_key(&peer) {
                return Err(Error::DuplicateEphemeralKeyPair(peer));
            }
            let key_pair = EphemeralKeyPair::generate(rng);
            public_keys.insert(peer, *key_pair.public_key());
            self.ephemeral_key_pairs.insert(peer, key_pair);
        }

        let message = EphemeralPublicKeyMessage::new(self.core.index, public_keys);
        self.core.evidence_log.put(message.clone())?;
        Ok(message)
    }

    /// Start phase 2.
    pub fn into_symmetric_key_generating_member(self) -> SymmetricKeyGeneratingMember<C> {
        SymmetricKeyGeneratingMember {
            core: self.core,
            ephemeral_key_pairs: self.ephemeral_key_pairs,
            symmetric_keys: BTreeMap::new(),
        }
    }
}

/// Phase 2: derives the pairwise symmetric keys.
pub struct SymmetricKeyGeneratingMember<C: Ciphersuite> {
    core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    symmetric_keys: BTreeMap<MemberIndex, SymmetricKey>,
}

impl<C> SymmetricKeyGeneratingMember<C>
where
    C: Ciphersuite,
{
    /// Mark members who sent no phase 1 message as inactive.
    pub fn mark_inactive_members(&mut self, messages: &[EphemeralPublicKeyMessage<C>]) {
        self.core
            .mark_inactive_members(messages.iter().map(|message| *message.sender_id()));
    }

    /// Derive a symmetric key with the sender of every phase 1 message.
    ///
    /// A sender whose message lacks a key for any operating member other than
    /// itself is disqualified.
    pub fn generate_symmetric_keys(
        &mut self,
        messages: &[EphemeralPublicKeyMessage<C>],
    ) -> Result<(), Error> {
        for message in messages {
            let sender = *message.sender_id();
            if !self.core.group.is_operating(sender) {
                continue;
            }

            let missing_key = self.core.group.operating_member_ids().into_iter().any(|member| {
                member != sender && !message.ephemeral_public_keys().contains_key(&member)
            });
            if missing_key {
                self.core
                    .disqualify(sender, "ephemeral public key message is incomplete");
                continue;
            }

            if !self.core.record_evidence(message.clone()) {
                continue;
            }

            // Checked above: the message holds a key for every operating
            // member, including this one.
            let Some(peer_public_key) = message.ephemeral_public_keys().get(&self.core.index)
            else {
                continue;
            };
            let key_pair = self
                .ephemeral_key_pairs
                .get(&sender)
                .ok_or(Error::UnknownMember(sender))?;
            let symmetric_key = key_pair.private_key().ecdh(peer_public_key)?;
            self.symmetric_keys.insert(sender, symmetric_key);
            debug!(member = %self.core.index, peer = %sender, "derived symmetric key");
        }
        Ok(())
    }

    /// Start phase 3.
    pub fn into_committing_member(self) -> CommittingMember<C> {
        CommittingMember::new(self.core, self.ephemeral_key_pairs, self.symmetric_keys)
    }
}

/// Recompute the symmetric key of the pair `(revealer, peer)` from the
/// ephemeral private key `revealer` disclosed for `peer`.
///
/// Fails with [`RevealFailure::KeyMismatch`] if the disclosed key does not
/// match the public key `revealer` broadcast for `peer` in phase 1.
pub(crate) fn recover_symmetric_key<C: Ciphersuite>(
    evidence_log: &EvidenceLog<C>,
    revealer: MemberIndex,
    peer: MemberIndex,
    private_key: &EphemeralPrivateKey<C>,
) -> Result<SymmetricKey, RevealFailure> {
    let revealer_public_key = evidence_log
        .ephemeral_public_key_message(revealer)
        .and_then(|message| message.ephemeral_public_keys().get(&peer))
        .ok_or(RevealFailure::KeyMismatch)?;
    if private_key.public_key() != *revealer_public_key {
        return Err(RevealFailure::KeyMismatch);
    }

    let peer_public_key: &EphemeralPublicKey<C> = evidence_log
        .ephemeral_public_key_message(peer)
        .and_then(|message| message.ephemeral_public_keys().get(&revealer))
        .ok_or(RevealFailure::MissingShares)?;
    private_key
        .ecdh(peer_public_key)
        .map_err(|_| RevealFailure::MissingShares)
}

/// Decrypt the shares `peer` sent to `receiver` with a recovered symmetric
/// key.
pub(crate) fn recover_shares<C: Ciphersuite>(
    evidence_log: &EvidenceLog<C>,
    peer: MemberIndex,
    receiver: MemberIndex,
    symmetric_key: &SymmetricKey,
) -> Result<(Scalar<C>, Scalar<C>), RevealFailure> {
    let shares = evidence_log
        .peer_shares_message(peer)
        .and_then(|message| message.shares_for(receiver))
        .ok_or(RevealFailure::MissingShares)?;
    let share_s = decrypt_share::<C>(symmetric_key, shares.encrypted_share_s())?;
    let share_t = decrypt_share::<C>(symmetric_key, shares.encrypted_share_t())?;
    Ok((share_s, share_t))
}

/// Why shares recovered from a revealed ephemeral key could not be checked.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RevealFailure {
    /// The revealed key does not match the revealer's phase 1 public key.
    KeyMismatch,
    /// The peer broadcast no shares for the revealer.
    MissingShares,
    /// The ciphertext failed authentication.
    Undecryptable,
    /// The plaintext is not a valid scalar.
    Malformed,
}

impl From<Error> for RevealFailure {
    fn from(err: Error) -> Self {
        match err {
            Error::DecryptionError => RevealFailure::Undecryptable,
            _ => RevealFailure::Malformed,
        }
    }
}

/// Encrypt a share for a peer.
pub(crate) fn encrypt_share<C: Ciphersuite, R: RngCore + CryptoRng>(
    symmetric_key: &SymmetricKey,
    rng: &mut R,
    share: Scalar<C>,
) -> Result<Vec<u8>, Error> {
    symmetric_key.encrypt(rng, &SerializableScalar::<C>(share).serialize())
}

/// Decrypt and decode a share. Fails with [`Error::DecryptionError`] if the
/// ciphertext does not authenticate and with a decoding error if the
/// plaintext is not a scalar.
pub(crate) fn decrypt_share<C: Ciphersuite>(
    symmetric_key: &SymmetricKey,
    ciphertext: &[u8],
) -> Result<Scalar<C>, Error> {
    let plaintext = symmetric_key.decrypt(ciphertext)?;
    Ok(SerializableScalar::<C>::deserialize(&plaintext)?.0)
}
