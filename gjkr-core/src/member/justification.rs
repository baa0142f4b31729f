//! Phases 5 and 6: accusation resolution and qualification.

use alloc::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::{
    points::SharingMember,
    recover_shares, recover_symmetric_key,
    sharing::{are_shares_valid_against_commitments, commitment_values},
    MemberCore, RevealFailure,
};
use crate::{
    ephemeral::{EphemeralKeyPair, EphemeralPrivateKey},
    group::MemberIndex,
    messages::SecretSharesAccusationsMessage,
    Ciphersuite, Field, Group, Scalar,
};

/// Phase 5: resolves the accusations published in phase 4.
pub struct SharesJustifyingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    secret_coefficients: Vec<Scalar<C>>,
    self_secret_share: Scalar<C>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
}

impl<C> SharesJustifyingMember<C>
where
    C: Ciphersuite,
{
    pub(super) fn new(
        core: MemberCore<C>,
        ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
        secret_coefficients: Vec<Scalar<C>>,
        self_secret_share: Scalar<C>,
        received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    ) -> Self {
        Self {
            core,
            ephemeral_key_pairs,
            secret_coefficients,
            self_secret_share,
            received_shares,
        }
    }

    /// Mark members who sent no accusations message as inactive.
    pub fn mark_inactive_members(&mut self, messages: &[SecretSharesAccusationsMessage<C>]) {
        self.core
            .mark_inactive_members(messages.iter().map(|message| *message.sender_id()));
    }

    /// Resolve every accusation against the evidence log.
    ///
    /// For each accused member the revealed ephemeral private key lets every
    /// member decrypt the shares the accused sent to the accuser and check
    /// them against the accused's commitments. Whoever is wrong is
    /// disqualified: the accused if its shares or commitments are missing or
    /// invalid, the accuser otherwise.
    pub fn resolve_secret_shares_accusations_messages(
        &mut self,
        messages: &[SecretSharesAccusationsMessage<C>],
    ) {
        let operating: BTreeSet<_> = self.core.group.operating_member_ids().into_iter().collect();

        for message in messages {
            let accuser = *message.sender_id();
            for (accused, revealed_key) in message.accused_members_keys() {
                let culprit = self.resolve_accusation(&operating, accuser, *accused, revealed_key);
                debug!(
                    member = %self.core.index,
                    %accuser,
                    %accused,
                    %culprit,
                    "resolved shares accusation"
                );
                self.core.disqualify(culprit, "shares accusation");
            }
        }
    }

    fn resolve_accusation(
        &self,
        operating: &BTreeSet<MemberIndex>,
        accuser: MemberIndex,
        accused: MemberIndex,
        revealed_key: &EphemeralPrivateKey<C>,
    ) -> MemberIndex {
        if accuser == accused || !operating.contains(&accused) {
            return accuser;
        }

        let log = &self.core.evidence_log;
        let symmetric_key = match recover_symmetric_key(log, accuser, accused, revealed_key) {
            Ok(key) => key,
            Err(RevealFailure::KeyMismatch) => return accuser,
            Err(_) => return accused,
        };
        let (share_s, share_t) = match recover_shares(log, accused, accuser, &symmetric_key) {
            Ok(shares) => shares,
            Err(_) => return accused,
        };

        let Some(commitments) = log
            .commitments_message(accused)
            .map(|message| commitment_values(message.commitments()))
        else {
            return accused;
        };
        if commitments.len() != self.core.group.dishonest_threshold() + 1 {
            return accused;
        }

        if are_shares_valid_against_commitments::<C>(share_s, share_t, &commitments, accuser) {
            accuser
        } else {
            accused
        }
    }

    /// Start phase 6.
    pub fn into_qualified_member(self) -> QualifiedMember<C> {
        QualifiedMember {
            core: self.core,
            ephemeral_key_pairs: self.ephemeral_key_pairs,
            secret_coefficients: self.secret_coefficients,
            self_secret_share: self.self_secret_share,
            received_shares: self.received_shares,
            qualified: BTreeSet::new(),
            master_private_key_share: <<C::Group as Group>::Field>::zero(),
        }
    }
}

/// Phase 6: combines the shares of the qualified members.
pub struct QualifiedMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    secret_coefficients: Vec<Scalar<C>>,
    self_secret_share: Scalar<C>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    qualified: BTreeSet<MemberIndex>,
    master_private_key_share: Scalar<C>,
}

impl<C> QualifiedMember<C>
where
    C: Ciphersuite,
{
    /// Fix the qualified set QUAL to the operating members and compute this
    /// member's share of the group private key, `x_i = s_ii + Σ s_ji` over
    /// QUAL.
    pub fn combine_member_shares(&mut self) {
        self.qualified = self.core.group.operating_member_ids().into_iter().collect();
        self.master_private_key_share = self
            .qualified
            .iter()
            .filter_map(|member| self.received_shares.get(member))
            .fold(self.self_secret_share, |sum, share| sum + *share);

        info!(
            member = %self.core.index,
            qualified = ?self.qualified,
            "combined qualified member shares"
        );
    }

    /// The qualified set.
    pub fn qualified_members(&self) -> &BTreeSet<MemberIndex> {
        &self.qualified
    }

    /// Start phase 7.
    pub fn into_sharing_member(self) -> SharingMember<C> {
        SharingMember::new(
            self.core,
            self.ephemeral_key_pairs,
            self.secret_coefficients,
            self.received_shares,
            self.qualified,
            self.master_private_key_share,
        )
    }
}
