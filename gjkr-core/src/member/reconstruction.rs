//! Phases 10 to 13: reconstruction of misbehaved members' keys and
//! combination of the group key.

use alloc::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use super::{
    recover_shares, recover_symmetric_key,
    sharing::{are_shares_valid_against_commitments, commitment_values},
    MemberCore,
};
use crate::{
    ephemeral::{EphemeralKeyPair, EphemeralPrivateKey},
    group::MemberIndex,
    messages::MisbehavedEphemeralKeysMessage,
    polynomial::{evaluate_commitments, interpolate},
    result::DkgResult,
    Ciphersuite, Element, Error, Field, Group, Scalar,
};

/// Shares of misbehaved members' secret polynomials recovered from revealed
/// keys: misbehaved member to revealing member to share.
pub type MisbehavedShares<C> = BTreeMap<MemberIndex, BTreeMap<MemberIndex, Scalar<C>>>;

/// Phase 10: reveals the ephemeral keys generated for qualified members that
/// misbehaved afterwards.
pub struct RevealingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    master_private_key_share: Scalar<C>,
    valid_points: BTreeMap<MemberIndex, Vec<Element<C>>>,
    misbehaved: BTreeSet<MemberIndex>,
}

impl<C> RevealingMember<C>
where
    C: Ciphersuite,
{
    pub(super) fn new(
        core: MemberCore<C>,
        ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
        received_shares: BTreeMap<MemberIndex, Scalar<C>>,
        qualified: BTreeSet<MemberIndex>,
        master_private_key_share: Scalar<C>,
        valid_points: BTreeMap<MemberIndex, Vec<Element<C>>>,
    ) -> Self {
        let misbehaved = qualified
            .into_iter()
            .filter(|member| *member != core.index && !core.group.is_operating(*member))
            .collect();
        Self {
            core,
            ephemeral_key_pairs,
            received_shares,
            master_private_key_share,
            valid_points,
            misbehaved,
        }
    }

    /// Qualified members that were disqualified or marked inactive after
    /// qualification.
    pub fn misbehaved_members(&self) -> &BTreeSet<MemberIndex> {
        &self.misbehaved
    }

    /// Reveal this member's ephemeral private key generated for every
    /// misbehaved member. The message is produced even if nobody misbehaved.
    pub fn reveal_misbehaved_members_keys(
        &self,
    ) -> Result<MisbehavedEphemeralKeysMessage<C>, Error> {
        let private_keys = self
            .misbehaved
            .iter()
            .map(|member| {
                self.ephemeral_key_pairs
                    .get(member)
                    .map(|key_pair| (*member, *key_pair.private_key()))
                    .ok_or(Error::UnknownMember(*member))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        if !private_keys.is_empty() {
            info!(
                member = %self.core.index,
                misbehaved = ?self.misbehaved,
                "revealing ephemeral keys of misbehaved members"
            );
        }
        Ok(MisbehavedEphemeralKeysMessage::new(
            self.core.index,
            private_keys,
        ))
    }

    /// Start phase 11.
    pub fn into_reconstructing_member(self) -> ReconstructingMember<C> {
        ReconstructingMember {
            core: self.core,
            received_shares: self.received_shares,
            master_private_key_share: self.master_private_key_share,
            valid_points: self.valid_points,
            misbehaved: self.misbehaved,
            misbehaved_shares: BTreeMap::new(),
            reconstructed_keys: BTreeMap::new(),
        }
    }
}

/// Phase 11: reconstructs the individual private keys of misbehaved
/// members.
pub struct ReconstructingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    master_private_key_share: Scalar<C>,
    valid_points: BTreeMap<MemberIndex, Vec<Element<C>>>,
    misbehaved: BTreeSet<MemberIndex>,
    misbehaved_shares: MisbehavedShares<C>,
    reconstructed_keys: BTreeMap<MemberIndex, Scalar<C>>,
}

impl<C> ReconstructingMember<C>
where
    C: Ciphersuite,
{
    /// Mark members who sent no reveal message as inactive. They keep their
    /// place in the valid points set.
    pub fn mark_inactive_members(&mut self, messages: &[MisbehavedEphemeralKeysMessage<C>]) {
        self.core
            .mark_inactive_members(messages.iter().map(|message| *message.sender_id()));
    }

    /// Recover the shares of every misbehaved member from the revealed keys
    /// and interpolate each misbehaved member's individual private key
    /// `z_m = f_m(0)`.
    ///
    /// A revealer whose message does not reveal exactly the misbehaved set,
    /// or whose keys do not open valid shares, is disqualified and its
    /// reveals are discarded. Fails if fewer than `t + 1` shares of a
    /// misbehaved member are available.
    pub fn reconstruct_misbehaved_individual_keys(
        &mut self,
        messages: &[MisbehavedEphemeralKeysMessage<C>],
    ) -> Result<(), Error> {
        for message in messages {
            let revealer = *message.sender_id();
            if revealer == self.core.index || !self.core.group.is_operating(revealer) {
                continue;
            }
            match self.recover_revealed_shares(revealer, message.private_keys()) {
                Ok(shares) => {
                    for (misbehaved, share) in shares {
                        self.misbehaved_shares
                            .entry(misbehaved)
                            .or_default()
                            .insert(revealer, share);
                    }
                }
                Err(reason) => {
                    warn!(member = %self.core.index, %revealer, reason, "discarding revealed keys");
                    self.core.disqualify(revealer, "invalid key reveal");
                }
            }
        }

        for misbehaved in &self.misbehaved {
            if let Some(share) = self.received_shares.get(misbehaved) {
                self.misbehaved_shares
                    .entry(*misbehaved)
                    .or_default()
                    .insert(self.core.index, *share);
            }
        }

        let required = self.core.group.dishonest_threshold() + 1;
        let zero = <<C::Group as Group>::Field>::zero();
        for misbehaved in &self.misbehaved {
            let shares = self
                .misbehaved_shares
                .get(misbehaved)
                .filter(|shares| shares.len() >= required)
                .ok_or_else(|| Error::InsufficientShares {
                    member: *misbehaved,
                    shares: self.misbehaved_shares.get(misbehaved).map_or(0, BTreeMap::len),
                    required,
                })?;
            let individual_private_key = interpolate::<C>(shares, zero)?;
            self.reconstructed_keys
                .insert(*misbehaved, individual_private_key);
            debug!(
                member = %self.core.index,
                %misbehaved,
                shares = shares.len(),
                "reconstructed individual private key"
            );
        }
        Ok(())
    }

    fn recover_revealed_shares(
        &self,
        revealer: MemberIndex,
        private_keys: &BTreeMap<MemberIndex, EphemeralPrivateKey<C>>,
    ) -> Result<Vec<(MemberIndex, Scalar<C>)>, &'static str> {
        let revealed: BTreeSet<_> = private_keys.keys().copied().collect();
        let expected: BTreeSet<_> = self
            .misbehaved
            .iter()
            .copied()
            .filter(|member| *member != revealer)
            .collect();
        if revealed != expected {
            return Err("revealed keys do not match the misbehaved set");
        }

        let log = &self.core.evidence_log;
        let mut shares = Vec::with_capacity(private_keys.len());
        for (misbehaved, private_key) in private_keys {
            let symmetric_key = recover_symmetric_key(log, revealer, *misbehaved, private_key)
                .map_err(|_| "revealed key does not match")?;
            let (share_s, share_t) = recover_shares(log, *misbehaved, revealer, &symmetric_key)
                .map_err(|_| "revealed key does not open shares")?;
            let Some(commitments) = log
                .commitments_message(*misbehaved)
                .map(|message| commitment_values(message.commitments()))
            else {
                continue;
            };
            if !are_shares_valid_against_commitments::<C>(share_s, share_t, &commitments, revealer)
            {
                return Err("revealed shares do not match commitments");
            }
            shares.push((*misbehaved, share_s));
        }
        Ok(shares)
    }

    /// The reconstructed individual private keys.
    pub fn reconstructed_individual_private_keys(&self) -> &BTreeMap<MemberIndex, Scalar<C>> {
        &self.reconstructed_keys
    }

    /// Start phase 12.
    pub fn into_combining_member(self) -> CombiningMember<C> {
        CombiningMember {
            core: self.core,
            master_private_key_share: self.master_private_key_share,
            valid_points: self.valid_points,
            misbehaved_shares: self.misbehaved_shares,
            reconstructed_keys: self.reconstructed_keys,
            group_public_key: <C::Group>::identity(),
            group_public_key_shares: BTreeMap::new(),
        }
    }
}

/// Phase 12: combines the group public key and the public key shares.
pub struct CombiningMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    master_private_key_share: Scalar<C>,
    valid_points: BTreeMap<MemberIndex, Vec<Element<C>>>,
    misbehaved_shares: MisbehavedShares<C>,
    reconstructed_keys: BTreeMap<MemberIndex, Scalar<C>>,
    group_public_key: Element<C>,
    group_public_key_shares: BTreeMap<MemberIndex, Element<C>>,
}

impl<C> CombiningMember<C>
where
    C: Ciphersuite,
{
    /// Compute the public key share of every operating member `j`:
    /// `Σ_i Σ_k A_ik·j^k` over the valid points plus `g·f_m(j)` for every
    /// reconstructed member `m`.
    pub fn compute_group_public_key_shares(&mut self) -> Result<(), Error> {
        let generator = <C::Group>::generator();
        let mut public_key_shares = BTreeMap::new();

        for member in self.core.group.operating_member_ids() {
            let mut share = self
                .valid_points
                .values()
                .map(|points| evaluate_commitments::<C>(member, points))
                .fold(<C::Group>::identity(), |sum, point| sum + point);

            for shares in self.misbehaved_shares.values() {
                share = share + generator * interpolate::<C>(shares, member.to_scalar::<C>())?;
            }
            public_key_shares.insert(member, share);
        }

        self.group_public_key_shares = public_key_shares;
        Ok(())
    }

    /// Compute the group public key `Σ A_i0 + Σ g·z_m`.
    pub fn combine_group_public_key(&mut self) {
        let generator = <C::Group>::generator();
        let from_points = self
            .valid_points
            .values()
            .filter_map(|points| points.first())
            .fold(<C::Group>::identity(), |sum, point| sum + *point);
        self.group_public_key = self
            .reconstructed_keys
            .values()
            .fold(from_points, |sum, key| sum + generator * *key);

        info!(member = %self.core.index, "combined group public key");
    }

    /// Start phase 13.
    pub fn into_finalizing_member(self) -> FinalizingMember<C> {
        FinalizingMember {
            core: self.core,
            master_private_key_share: self.master_private_key_share,
            group_public_key: self.group_public_key,
            group_public_key_shares: self.group_public_key_shares,
        }
    }
}

/// Phase 13: holds the final result.
pub struct FinalizingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    master_private_key_share: Scalar<C>,
    group_public_key: Element<C>,
    group_public_key_shares: BTreeMap<MemberIndex, Element<C>>,
}

impl<C> FinalizingMember<C>
where
    C: Ciphersuite,
{
    /// The result of the protocol.
    pub fn result(&self) -> DkgResult<C> {
        DkgResult::new(
            self.core.group.clone(),
            self.group_public_key,
            self.master_private_key_share,
            self.group_public_key_shares.clone(),
        )
    }
}
