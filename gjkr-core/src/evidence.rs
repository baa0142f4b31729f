//! Write-once log of broadcast messages used to adjudicate accusations.
//!
//! When a member accuses another one, every member replays the accusation
//! against the messages both parties broadcast earlier. Those messages are
//! kept here, at most one of each kind per sender. A second insertion fails
//! loudly, which is distinct from a message that was never received.

use alloc::collections::BTreeMap;

use crate::{
    group::MemberIndex,
    messages::{
        EphemeralPublicKeyMessage, MemberCommitmentsMessage, MemberPublicKeySharePointsMessage,
        PeerSharesMessage,
    },
    Ciphersuite, Error,
};

/// The kinds of messages kept as evidence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvidenceKind {
    /// Phase 1 ephemeral public keys.
    EphemeralPublicKey,
    /// Phase 3 encrypted shares.
    PeerShares,
    /// Phase 3 Pedersen commitments.
    MemberCommitments,
    /// Phase 7 public key share points.
    PublicKeySharePoints,
}

/// A message kept as evidence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evidence<C: Ciphersuite> {
    /// Phase 1 ephemeral public keys.
    EphemeralPublicKey(EphemeralPublicKeyMessage<C>),
    /// Phase 3 encrypted shares.
    PeerShares(PeerSharesMessage),
    /// Phase 3 Pedersen commitments.
    MemberCommitments(MemberCommitmentsMessage<C>),
    /// Phase 7 public key share points.
    PublicKeySharePoints(MemberPublicKeySharePointsMessage<C>),
}

impl<C> Evidence<C>
where
    C: Ciphersuite,
{
    /// The kind of the message.
    pub fn kind(&self) -> EvidenceKind {
        match self {
            Evidence::EphemeralPublicKey(_) => EvidenceKind::EphemeralPublicKey,
            Evidence::PeerShares(_) => EvidenceKind::PeerShares,
            Evidence::MemberCommitments(_) => EvidenceKind::MemberCommitments,
            Evidence::PublicKeySharePoints(_) => EvidenceKind::PublicKeySharePoints,
        }
    }

    /// The sender of the message.
    pub fn sender_id(&self) -> MemberIndex {
        match self {
            Evidence::EphemeralPublicKey(m) => *m.sender_id(),
            Evidence::PeerShares(m) => *m.sender_id(),
            Evidence::MemberCommitments(m) => *m.sender_id(),
            Evidence::PublicKeySharePoints(m) => *m.sender_id(),
        }
    }
}

impl<C: Ciphersuite> From<EphemeralPublicKeyMessage<C>> for Evidence<C> {
    fn from(message: EphemeralPublicKeyMessage<C>) -> Self {
        Evidence::EphemeralPublicKey(message)
    }
}

impl<C: Ciphersuite> From<PeerSharesMessage> for Evidence<C> {
    fn from(message: PeerSharesMessage) -> Self {
        Evidence::PeerShares(message)
    }
}

impl<C: Ciphersuite> From<MemberCommitmentsMessage<C>> for Evidence<C> {
    fn from(message: MemberCommitmentsMessage<C>) -> Self {
        Evidence::MemberCommitments(message)
    }
}

impl<C: Ciphersuite> From<MemberPublicKeySharePointsMessage<C>> for Evidence<C> {
    fn from(message: MemberPublicKeySharePointsMessage<C>) -> Self {
        Evidence::PublicKeySharePoints(message)
    }
}

/// Evidence messages of one member's protocol execution, keyed by sender and
/// kind.
#[derive(Clone, Debug)]
pub struct EvidenceLog<C: Ciphersuite> {
    entries: BTreeMap<(MemberIndex, EvidenceKind), Evidence<C>>,
}

impl<C> Default for EvidenceLog<C>
where
    C: Ciphersuite,
{
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C> EvidenceLog<C>
where
    C: Ciphersuite,
{
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message. Fails if a message of the same kind from the same
    /// sender is already stored.
    pub fn put(&mut self, message: impl Into<Evidence<C>>) -> Result<(), Error> {
        let evidence = message.into();
        let key = (evidence.sender_id(), evidence.kind());
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateEvidence {
                sender: key.0,
                kind: key.1,
            });
        }
        self.entries.insert(key, evidence);
        Ok(())
    }

    /// The message of the given kind from `sender`, if one was stored.
    pub fn get(&self, sender: MemberIndex, kind: EvidenceKind) -> Option<&Evidence<C>> {
        self.entries.get(&(sender, kind))
    }

    /// The phase 1 message of `sender`.
    pub fn ephemeral_public_key_message(
        &self,
        sender: MemberIndex,
    ) -> Option<&EphemeralPublicKeyMessage<C>> {
        match self.get(sender, EvidenceKind::EphemeralPublicKey) {
            Some(Evidence::EphemeralPublicKey(message)) => Some(message),
            _ => None,
        }
    }

    /// The phase 3 shares message of `sender`.
    pub fn peer_shares_message(&self, sender: MemberIndex) -> Option<&PeerSharesMessage> {
        match self.get(sender, EvidenceKind::PeerShares) {
            Some(Evidence::PeerShares(message)) => Some(message),
            _ => None,
        }
    }

    /// The phase 3 commitments message of `sender`.
    pub fn commitments_message(
        &self,
        sender: MemberIndex,
    ) -> Option<&MemberCommitmentsMessage<C>> {
        match self.get(sender, EvidenceKind::MemberCommitments) {
            Some(Evidence::MemberCommitments(message)) => Some(message),
            _ => None,
        }
    }

    /// The phase 7 points message of `sender`.
    pub fn points_message(
        &self,
        sender: MemberIndex,
    ) -> Option<&MemberPublicKeySharePointsMessage<C>> {
        match self.get(sender, EvidenceKind::PublicKeySharePoints) {
            Some(Evidence::PublicKeySharePoints(message)) => Some(message),
            _ => None,
        }
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
