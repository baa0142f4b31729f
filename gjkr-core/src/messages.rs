//! Wire messages exchanged by group members.
//!
//! Every phase that talks to the network produces exactly one kind of
//! message. All kinds are gathered in the closed [`Payload`] enum, wrapped in
//! a [`Message`] carrying the serialization [`Header`] and the session id.
//! Decoding validates every member index and never panics on malformed input.

use alloc::collections::BTreeMap;
use core::fmt::{self, Debug};

use derive_getters::Getters;

use crate::{
    ephemeral::{EphemeralPrivateKey, EphemeralPublicKey},
    group::MemberIndex,
    result::ResultHash,
    serialization::{Deserialize, SerializableElement, Serialize},
    Ciphersuite, Element, Error, Header,
};

/// A [`Group::Element`](crate::Group::Element) newtype that commits to one
/// coefficient of a secret polynomial.
///
/// Used both for the Pedersen commitments `C_k = g·a_k + h·b_k` of phase 3
/// and for the public key share points `A_k = g·a_k` of phase 7.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(transparent)]
pub struct CoefficientCommitment<C: Ciphersuite>(SerializableElement<C>);

impl<C> CoefficientCommitment<C>
where
    C: Ciphersuite,
{
    /// Create a new CoefficientCommitment.
    pub fn new(value: Element<C>) -> Self {
        Self(SerializableElement(value))
    }

    /// Returns inner element value
    pub fn value(&self) -> Element<C> {
        self.0 .0
    }
}

impl<C> Debug for CoefficientCommitment<C>
where
    C: Ciphersuite,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CoefficientCommitment")
            .field(
                &self
                    .0
                    .serialize()
                    .map(hex::encode)
                    .unwrap_or("<invalid>".to_string()),
            )
            .finish()
    }
}

/// The two shares `s_ij` and `t_ij` a member sends to one peer, each
/// encrypted with the pairwise symmetric key.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedShares {
    /// Encrypted share of the secret polynomial, `s_ij`.
    encrypted_share_s: Vec<u8>,
    /// Encrypted share of the blinding polynomial, `t_ij`.
    encrypted_share_t: Vec<u8>,
}

impl EncryptedShares {
    /// Create a new [`EncryptedShares`] instance.
    pub fn new(encrypted_share_s: Vec<u8>, encrypted_share_t: Vec<u8>) -> Self {
        Self {
            encrypted_share_s,
            encrypted_share_t,
        }
    }
}

/// Phase 1: the ephemeral public keys a member generated, one per peer.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct EphemeralPublicKeyMessage<C: Ciphersuite> {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// One ephemeral public key per peer, keyed by the peer's index.
    ephemeral_public_keys: BTreeMap<MemberIndex, EphemeralPublicKey<C>>,
}

impl<C> EphemeralPublicKeyMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`EphemeralPublicKeyMessage`] instance.
    pub fn new(
        sender_id: MemberIndex,
        ephemeral_public_keys: BTreeMap<MemberIndex, EphemeralPublicKey<C>>,
    ) -> Self {
        Self {
            sender_id,
            ephemeral_public_keys,
        }
    }
}

/// Phase 3: Pedersen commitments `C_0 … C_t` to the sender's coefficients.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct MemberCommitmentsMessage<C: Ciphersuite> {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// The commitments `C_0 … C_t`.
    commitments: Vec<CoefficientCommitment<C>>,
}

impl<C> MemberCommitmentsMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`MemberCommitmentsMessage`] instance.
    pub fn new(sender_id: MemberIndex, commitments: Vec<CoefficientCommitment<C>>) -> Self {
        Self {
            sender_id,
            commitments,
        }
    }
}

/// Phase 3: the encrypted shares the sender computed for every peer.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerSharesMessage {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// Encrypted shares keyed by the receiving member.
    shares: BTreeMap<MemberIndex, EncryptedShares>,
}

impl PeerSharesMessage {
    /// Create a new [`PeerSharesMessage`] instance.
    pub fn new(sender_id: MemberIndex, shares: BTreeMap<MemberIndex, EncryptedShares>) -> Self {
        Self { sender_id, shares }
    }

    /// The shares addressed to `receiver`, if any.
    pub fn shares_for(&self, receiver: MemberIndex) -> Option<&EncryptedShares> {
        self.shares.get(&receiver)
    }
}

/// Phase 4: accused members and, for each, the accuser's ephemeral private
/// key generated for that member.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct SecretSharesAccusationsMessage<C: Ciphersuite> {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// The revealed ephemeral private key for each accused member.
    accused_members_keys: BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
}

impl<C> SecretSharesAccusationsMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`SecretSharesAccusationsMessage`] instance.
    pub fn new(
        sender_id: MemberIndex,
        accused_members_keys: BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
    ) -> Self {
        Self {
            sender_id,
            accused_members_keys,
        }
    }
}

/// Phase 7: public key share points `A_0 … A_t`.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct MemberPublicKeySharePointsMessage<C: Ciphersuite> {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// The points `A_0 … A_t`.
    public_key_share_points: Vec<CoefficientCommitment<C>>,
}

impl<C> MemberPublicKeySharePointsMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`MemberPublicKeySharePointsMessage`] instance.
    pub fn new(
        sender_id: MemberIndex,
        public_key_share_points: Vec<CoefficientCommitment<C>>,
    ) -> Self {
        Self {
            sender_id,
            public_key_share_points,
        }
    }
}

/// Phase 8: members accused of publishing points inconsistent with their
/// shares, with the revealed ephemeral private keys.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct PointsAccusationsMessage<C: Ciphersuite> {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// The revealed ephemeral private key for each accused member.
    accused_members_keys: BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
}

impl<C> PointsAccusationsMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`PointsAccusationsMessage`] instance.
    pub fn new(
        sender_id: MemberIndex,
        accused_members_keys: BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
    ) -> Self {
        Self {
            sender_id,
            accused_members_keys,
        }
    }
}

/// Phase 10: ephemeral private keys generated for members that passed
/// qualification but were excluded afterwards, so their shares can be
/// recovered.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct MisbehavedEphemeralKeysMessage<C: Ciphersuite> {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// The revealed ephemeral private key for each misbehaved member.
    private_keys: BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
}

impl<C> MisbehavedEphemeralKeysMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`MisbehavedEphemeralKeysMessage`] instance.
    pub fn new(
        sender_id: MemberIndex,
        private_keys: BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
    ) -> Self {
        Self {
            sender_id,
            private_keys,
        }
    }
}

/// Result publication: the sender's signature over its preferred result hash.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DkgResultHashSignatureMessage {
    /// The index of the sending member.
    sender_id: MemberIndex,
    /// The hash of the result the sender supports.
    result_hash: ResultHash,
    /// The operator signature over the result hash.
    signature: Vec<u8>,
    /// The operator public key that verifies the signature.
    public_key: Vec<u8>,
}

impl DkgResultHashSignatureMessage {
    /// Create a new [`DkgResultHashSignatureMessage`] instance.
    pub fn new(
        sender_id: MemberIndex,
        result_hash: ResultHash,
        signature: Vec<u8>,
        public_key: Vec<u8>,
    ) -> Self {
        Self {
            sender_id,
            result_hash,
            signature,
            public_key,
        }
    }
}

/// Every message kind of the protocol.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
pub enum Payload<C: Ciphersuite> {
    /// Phase 1.
    EphemeralPublicKey(EphemeralPublicKeyMessage<C>),
    /// Phase 3, commitments.
    MemberCommitments(MemberCommitmentsMessage<C>),
    /// Phase 3, encrypted shares.
    PeerShares(PeerSharesMessage),
    /// Phase 4.
    SecretSharesAccusations(SecretSharesAccusationsMessage<C>),
    /// Phase 7.
    MemberPublicKeySharePoints(MemberPublicKeySharePointsMessage<C>),
    /// Phase 8.
    PointsAccusations(PointsAccusationsMessage<C>),
    /// Phase 10.
    MisbehavedEphemeralKeys(MisbehavedEphemeralKeysMessage<C>),
    /// Result publication.
    DkgResultHashSignature(DkgResultHashSignatureMessage),
}

impl<C> Payload<C>
where
    C: Ciphersuite,
{
    /// The member index the sender claims.
    pub fn sender_id(&self) -> MemberIndex {
        match self {
            Payload::EphemeralPublicKey(m) => m.sender_id,
            Payload::MemberCommitments(m) => m.sender_id,
            Payload::PeerShares(m) => m.sender_id,
            Payload::SecretSharesAccusations(m) => m.sender_id,
            Payload::MemberPublicKeySharePoints(m) => m.sender_id,
            Payload::PointsAccusations(m) => m.sender_id,
            Payload::MisbehavedEphemeralKeys(m) => m.sender_id,
            Payload::DkgResultHashSignature(m) => m.sender_id,
        }
    }

    /// A short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::EphemeralPublicKey(_) => "ephemeral_public_key",
            Payload::MemberCommitments(_) => "member_commitments",
            Payload::PeerShares(_) => "peer_shares",
            Payload::SecretSharesAccusations(_) => "secret_shares_accusations",
            Payload::MemberPublicKeySharePoints(_) => "member_public_key_share_points",
            Payload::PointsAccusations(_) => "points_accusations",
            Payload::MisbehavedEphemeralKeys(_) => "misbehaved_ephemeral_keys",
            Payload::DkgResultHashSignature(_) => "dkg_result_hash_signature",
        }
    }
}

/// A protocol message as broadcast on the channel.
#[derive(Clone, Debug, PartialEq, Eq, Getters, serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
#[serde(deny_unknown_fields)]
pub struct Message<C: Ciphersuite> {
    /// Serialization header
    #[getter(skip)]
    header: Header<C>,
    /// The DKG session this message belongs to.
    session_id: String,
    /// The phase message.
    payload: Payload<C>,
}

impl<C> Message<C>
where
    C: Ciphersuite,
{
    /// Create a new [`Message`] instance.
    pub fn new(session_id: impl Into<String>, payload: Payload<C>) -> Self {
        Self {
            header: Header::default(),
            session_id: session_id.into(),
            payload,
        }
    }

    /// The member index the sender claims.
    pub fn sender_id(&self) -> MemberIndex {
        self.payload.sender_id()
    }

    /// Take the payload out of the message.
    pub fn into_payload(self) -> Payload<C> {
        self.payload
    }

    /// Serialize the struct into a Vec.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        Serialize::serialize(&self)
    }

    /// Deserialize the struct from a slice of bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Deserialize::deserialize(bytes)
    }
}

/// A message as delivered by the broadcast channel, together with the
/// transport-level public key of the operator who sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetMessage<C: Ciphersuite> {
    message: Message<C>,
    sender_public_key: Vec<u8>,
}

impl<C> NetMessage<C>
where
    C: Ciphersuite,
{
    /// Create a new [`NetMessage`] instance.
    pub fn new(message: Message<C>, sender_public_key: Vec<u8>) -> Self {
        Self {
            message,
            sender_public_key,
        }
    }

    /// The protocol message.
    pub fn message(&self) -> &Message<C> {
        &self.message
    }

    /// The operator public key of the sender.
    pub fn sender_public_key(&self) -> &[u8] {
        &self.sender_public_key
    }

    /// Split into the protocol message and the sender key.
    pub fn into_parts(self) -> (Message<C>, Vec<u8>) {
        (self.message, self.sender_public_key)
    }
}
