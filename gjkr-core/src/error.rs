//! GJKR Error types

use thiserror::Error;

use crate::{evidence::EvidenceKind, group::MemberIndex};

/// An error related to the GJKR protocol.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// group_size is invalid
    #[error("group size must be between 1 and 255")]
    InvalidGroupSize,
    /// honest_threshold is invalid
    #[error("honest threshold must be at least 1 and not larger than the group size")]
    InvalidHonestThreshold,
    /// The result publication block step is invalid.
    #[error("result publication block step must be at least 1")]
    InvalidBlockStep,
    /// A member index is outside of [1, 255].
    #[error("Member index {0} is out of range.")]
    InvalidMemberIndex(u32),
    /// A member index does not belong to the group.
    #[error("Member index {0} is not part of the group.")]
    UnknownMember(MemberIndex),
    /// The encoding of a group scalar was malformed.
    #[error("Malformed scalar encoding.")]
    MalformedScalar,
    /// The encoding of a group element was malformed.
    #[error("Malformed group element encoding.")]
    MalformedElement,
    /// This scalar MUST NOT be zero.
    #[error("Invalid for this scalar to be zero.")]
    InvalidZeroScalar,
    /// This element MUST NOT be the identity.
    #[error("Invalid for this element to be the identity.")]
    InvalidIdentityElement,
    /// Error in scalar Field.
    #[error("Error in scalar Field.")]
    FieldError(#[from] FieldError),
    /// Error in elliptic curve Group.
    #[error("Error in elliptic curve Group.")]
    GroupError(#[from] GroupError),
    /// Serialization error
    #[error("Error serializing value.")]
    SerializationError,
    /// Deserialization error
    #[error("Error deserializing value.")]
    DeserializationError,
    /// An ephemeral key pair was already generated for this peer.
    #[error("Ephemeral key pair for member {0} already exists.")]
    DuplicateEphemeralKeyPair(MemberIndex),
    /// A message of this kind was already logged for the sender.
    #[error("Evidence of kind {kind:?} from member {sender} already logged.")]
    DuplicateEvidence {
        /// The sender of the rejected message.
        sender: MemberIndex,
        /// The kind of the rejected message.
        kind: EvidenceKind,
    },
    /// There is no symmetric key established with the peer.
    #[error("Symmetric key for member {0} not found.")]
    MissingSymmetricKey(MemberIndex),
    /// Encrypting a share failed.
    #[error("Could not encrypt share.")]
    EncryptionError,
    /// Decrypting a share failed.
    #[error("Could not decrypt share.")]
    DecryptionError,
    /// Not enough shares were revealed to reconstruct a misbehaved member.
    #[error(
        "Could not reconstruct member {member}: {shares} shares available, {required} required."
    )]
    InsufficientShares {
        /// The misbehaved member whose key could not be reconstructed.
        member: MemberIndex,
        /// Number of shares collected.
        shares: usize,
        /// Number of shares required, `t+1`.
        required: usize,
    },
    /// Interpolation was given a duplicated or zero share index.
    #[error("Duplicated shares provided.")]
    DuplicatedShares,
    /// A state failed while initiating.
    #[error("failed to initiate state [{state}]: {reason}")]
    InitiateFailed {
        /// The name of the failing state.
        state: &'static str,
        /// The underlying failure.
        reason: String,
    },
    /// The inbound message channel was closed.
    #[error("The message channel was closed.")]
    ChannelClosed,
    /// Not enough result signatures were collected.
    #[error("Could not submit result with {signatures} signatures for threshold {threshold}.")]
    InsufficientSignatures {
        /// Number of collected signatures.
        signatures: usize,
        /// Required number of signatures.
        threshold: usize,
    },
    /// No result was published before the timeout block.
    #[error("Result publication timed out at block {0}.")]
    ResultPublicationTimeout(u64),
    /// The published group public key differs from the local one.
    #[error("Member {0} does not support the published group public key.")]
    GroupPublicKeyMismatch(MemberIndex),
    /// The published result lists the member as misbehaving.
    #[error("Member {0} is considered as misbehaving by the group.")]
    MemberMisbehaved(MemberIndex),
    /// A ledger interaction failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    /// A broadcast channel interaction failed.
    #[error("Network error: {0}")]
    Net(#[from] NetError),
}

/// An error related to a scalar Field.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum FieldError {
    /// The encoding of a group scalar was malformed.
    #[error("Malformed scalar encoding.")]
    MalformedScalar,
    /// This scalar MUST NOT be zero.
    #[error("Invalid for this scalar to be zero.")]
    InvalidZeroScalar,
}

/// An error related to a Group (usually an elliptic curve or constructed from one) or one of its Elements.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum GroupError {
    /// The encoding of a group element was malformed.
    #[error("Malformed group element encoding.")]
    MalformedElement,
    /// This element MUST NOT be the identity.
    #[error("Invalid for this element to be the identity.")]
    InvalidIdentityElement,
}

/// An error returned by a ledger collaborator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ChainError {
    /// A DKG result was already submitted.
    #[error("DKG result already submitted")]
    AlreadySubmitted,
    /// The submission was rejected by the ledger.
    #[error("DKG result rejected: {0}")]
    Rejected(String),
    /// The block counter stopped.
    #[error("block counter is closed")]
    BlockCounterClosed,
    /// Signing or signature verification failed.
    #[error("signing failure: {0}")]
    Signing(String),
}

/// An error returned by a broadcast channel collaborator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum NetError {
    /// The channel can no longer deliver messages.
    #[error("broadcast channel is closed")]
    Closed,
    /// The message could not be encoded for the transport.
    #[error("could not encode message")]
    Encoding,
}
