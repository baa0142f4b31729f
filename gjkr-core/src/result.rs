//! The outcome of a DKG execution and its ledger-facing projection.

use alloc::collections::BTreeMap;
use core::fmt::{self, Debug, Display};

use sha2::{Digest, Sha256};

use crate::{
    group::{Group, MemberIndex},
    serialization::{SerializableElement, Serialize},
    Ciphersuite, Element, Error, Field, Scalar,
};

/// The result of a successful DKG execution for one member.
pub struct DkgResult<C: Ciphersuite> {
    group: Group,
    group_public_key: Element<C>,
    group_private_key_share: Scalar<C>,
    group_public_key_shares: BTreeMap<MemberIndex, Element<C>>,
}

impl<C> DkgResult<C>
where
    C: Ciphersuite,
{
    pub(crate) fn new(
        group: Group,
        group_public_key: Element<C>,
        group_private_key_share: Scalar<C>,
        group_public_key_shares: BTreeMap<MemberIndex, Element<C>>,
    ) -> Self {
        Self {
            group,
            group_public_key,
            group_private_key_share,
            group_public_key_shares,
        }
    }

    /// The group view at the end of the protocol.
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// The group public key.
    pub fn group_public_key(&self) -> Element<C> {
        self.group_public_key
    }

    /// The serialized group public key.
    pub fn group_public_key_bytes(&self) -> Result<Vec<u8>, Error> {
        SerializableElement::<C>(self.group_public_key).serialize()
    }

    /// This member's share of the group private key.
    pub fn group_private_key_share(&self) -> Scalar<C> {
        self.group_private_key_share
    }

    /// The public key share of every operating member.
    pub fn group_public_key_shares(&self) -> &BTreeMap<MemberIndex, Element<C>> {
        &self.group_public_key_shares
    }

    /// The ledger-facing projection of this result.
    pub fn chain_result(&self) -> Result<ChainResult, Error> {
        Ok(ChainResult::new(
            self.group_public_key_bytes()?,
            self.group.misbehaved_member_ids(),
        ))
    }
}

impl<C> Debug for DkgResult<C>
where
    C: Ciphersuite,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkgResult")
            .field("group", &self.group)
            .field(
                "group_public_key",
                &self.group_public_key_bytes().map(hex::encode),
            )
            .field("group_private_key_share", &"<redacted>")
            .field(
                "group_public_key_shares",
                &self.group_public_key_shares.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<C> Drop for DkgResult<C>
where
    C: Ciphersuite,
{
    fn drop(&mut self) {
        self.group_private_key_share = <<C::Group as crate::Group>::Field>::zero();
    }
}

/// The result as submitted to the ledger: the group public key and the
/// members that were disqualified or marked inactive.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainResult {
    group_public_key: Vec<u8>,
    misbehaved_members: Vec<MemberIndex>,
}

impl ChainResult {
    /// Create a new [`ChainResult`]. The misbehaved members are sorted and
    /// deduplicated.
    pub fn new(group_public_key: Vec<u8>, mut misbehaved_members: Vec<MemberIndex>) -> Self {
        misbehaved_members.sort();
        misbehaved_members.dedup();
        Self {
            group_public_key,
            misbehaved_members,
        }
    }

    /// The serialized group public key.
    pub fn group_public_key(&self) -> &[u8] {
        &self.group_public_key
    }

    /// The sorted misbehaved member indices.
    pub fn misbehaved_members(&self) -> &[MemberIndex] {
        &self.misbehaved_members
    }

    /// SHA-256 of the postcard encoding of this result.
    pub fn hash(&self) -> Result<ResultHash, Error> {
        let encoded = Serialize::serialize(self)?;
        Ok(ResultHash(Sha256::digest(encoded).into()))
    }
}

/// The hash of a [`ChainResult`], the value members sign.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ResultHash([u8; 32]);

impl ResultHash {
    /// Wrap raw hash bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for ResultHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultHash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl Display for ResultHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Emitted by the ledger when a DKG result was accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DkgResultSubmittedEvent {
    /// The member that submitted the result.
    pub member_index: MemberIndex,
    /// The serialized group public key of the accepted result.
    pub group_public_key: Vec<u8>,
    /// The misbehaved members of the accepted result.
    pub misbehaved_members: Vec<MemberIndex>,
    /// The block at which the result was accepted.
    pub block_number: u64,
}
