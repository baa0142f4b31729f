//! Phases 7 to 9: public key share points.

use alloc::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{
    reconstruction::RevealingMember, recover_shares, recover_symmetric_key,
    sharing::commitment_values, MemberCore, RevealFailure,
};
use crate::{
    ephemeral::{EphemeralKeyPair, EphemeralPrivateKey},
    group::MemberIndex,
    messages::{CoefficientCommitment, MemberPublicKeySharePointsMessage, PointsAccusationsMessage},
    polynomial::evaluate_commitments,
    Ciphersuite, Element, Error, Group, Scalar,
};

/// Phase 7: publishes the public key share points `A_k = g·a_k`.
pub struct SharingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    secret_coefficients: Vec<Scalar<C>>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    qualified: BTreeSet<MemberIndex>,
    master_private_key_share: Scalar<C>,
    public_key_share_points: Vec<Element<C>>,
}

impl<C> SharingMember<C>
where
    C: Ciphersuite,
{
    pub(super) fn new(
        core: MemberCore<C>,
        ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
        secret_coefficients: Vec<Scalar<C>>,
        received_shares: BTreeMap<MemberIndex, Scalar<C>>,
        qualified: BTreeSet<MemberIndex>,
        master_private_key_share: Scalar<C>,
    ) -> Self {
        Self {
            core,
            ephemeral_key_pairs,
            secret_coefficients,
            received_shares,
            qualified,
            master_private_key_share,
            public_key_share_points: Vec::new(),
        }
    }

    /// Compute `A_k = g·a_k` for every coefficient of the secret polynomial
    /// and return the message publishing them.
    pub fn calculate_public_key_share_points(
        &mut self,
    ) -> Result<MemberPublicKeySharePointsMessage<C>, Error> {
        let generator = <C::Group>::generator();
        self.public_key_share_points = self
            .secret_coefficients
            .iter()
            .map(|coefficient| generator * *coefficient)
            .collect();

        let message = MemberPublicKeySharePointsMessage::new(
            self.core.index,
            self.public_key_share_points
                .iter()
                .copied()
                .map(CoefficientCommitment::new)
                .collect(),
        );
        self.core.evidence_log.put(message.clone())?;
        Ok(message)
    }

    /// Start phase 8.
    pub fn into_points_validating_member(self) -> PointsValidatingMember<C> {
        PointsValidatingMember {
            core: self.core,
            ephemeral_key_pairs: self.ephemeral_key_pairs,
            received_shares: self.received_shares,
            qualified: self.qualified,
            master_private_key_share: self.master_private_key_share,
            public_key_share_points: self.public_key_share_points,
        }
    }
}

/// Phase 8: checks the published points against the received shares.
pub struct PointsValidatingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    qualified: BTreeSet<MemberIndex>,
    master_private_key_share: Scalar<C>,
    public_key_share_points: Vec<Element<C>>,
}

impl<C> PointsValidatingMember<C>
where
    C: Ciphersuite,
{
    /// Mark members who published no points as inactive.
    pub fn mark_inactive_members(&mut self, messages: &[MemberPublicKeySharePointsMessage<C>]) {
        self.core
            .mark_inactive_members(messages.iter().map(|message| *message.sender_id()));
    }

    /// Check `g·s_ji == Σ A_jk·i^k` for every sender `j`.
    ///
    /// Returns the accusations message revealing this member's ephemeral
    /// private key for every sender whose points are inconsistent with the
    /// share it sent.
    pub fn verify_public_key_share_points(
        &mut self,
        messages: &[MemberPublicKeySharePointsMessage<C>],
    ) -> Result<PointsAccusationsMessage<C>, Error> {
        let mut accused_members_keys = BTreeMap::new();

        for message in messages {
            let sender = *message.sender_id();
            if !self.core.group.is_operating(sender) {
                continue;
            }
            if !self.core.record_evidence(message.clone()) {
                continue;
            }

            if let Err(reason) = self.verify_points(sender, message) {
                warn!(member = %self.core.index, accused = %sender, reason, "accusing member");
                let key_pair = self
                    .ephemeral_key_pairs
                    .get(&sender)
                    .ok_or(Error::UnknownMember(sender))?;
                accused_members_keys.insert(sender, *key_pair.private_key());
            }
        }

        Ok(PointsAccusationsMessage::new(
            self.core.index,
            accused_members_keys,
        ))
    }

    fn verify_points(
        &self,
        sender: MemberIndex,
        message: &MemberPublicKeySharePointsMessage<C>,
    ) -> Result<(), &'static str> {
        let points = commitment_values(message.public_key_share_points());
        if points.len() != self.core.group.dishonest_threshold() + 1 {
            return Err("wrong number of points");
        }
        let share = self
            .received_shares
            .get(&sender)
            .ok_or("no share stored for sender")?;
        if !is_share_valid_against_points::<C>(*share, &points, self.core.index) {
            return Err("points do not match share");
        }
        Ok(())
    }

    /// Start phase 9.
    pub fn into_points_justifying_member(self) -> PointsJustifyingMember<C> {
        PointsJustifyingMember {
            core: self.core,
            ephemeral_key_pairs: self.ephemeral_key_pairs,
            received_shares: self.received_shares,
            qualified: self.qualified,
            master_private_key_share: self.master_private_key_share,
            public_key_share_points: self.public_key_share_points,
        }
    }
}

/// Phase 9: resolves the accusations published in phase 8.
pub struct PointsJustifyingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
    qualified: BTreeSet<MemberIndex>,
    master_private_key_share: Scalar<C>,
    public_key_share_points: Vec<Element<C>>,
}

impl<C> PointsJustifyingMember<C>
where
    C: Ciphersuite,
{
    /// Mark members who sent no points accusations message as inactive.
    pub fn mark_inactive_members(&mut self, messages: &[PointsAccusationsMessage<C>]) {
        self.core
            .mark_inactive_members(messages.iter().map(|message| *message.sender_id()));
    }

    /// Resolve every points accusation against the evidence log.
    ///
    /// Works like the shares accusations of phase 5, except that a share the
    /// revealed key cannot decrypt disqualifies both the accuser and the
    /// accused, and the decrypted share is checked against the accused's
    /// points.
    pub fn resolve_public_key_share_points_accusations_messages(
        &mut self,
        messages: &[PointsAccusationsMessage<C>],
    ) {
        let operating: BTreeSet<_> = self.core.group.operating_member_ids().into_iter().collect();

        for message in messages {
            let accuser = *message.sender_id();
            for (accused, revealed_key) in message.accused_members_keys() {
                let culprits =
                    self.resolve_accusation(&operating, accuser, *accused, revealed_key);
                debug!(
                    member = %self.core.index,
                    %accuser,
                    %accused,
                    culprits = ?culprits,
                    "resolved points accusation"
                );
                for culprit in culprits {
                    self.core.disqualify(culprit, "points accusation");
                }
            }
        }
    }

    fn resolve_accusation(
        &self,
        operating: &BTreeSet<MemberIndex>,
        accuser: MemberIndex,
        accused: MemberIndex,
        revealed_key: &EphemeralPrivateKey<C>,
    ) -> Vec<MemberIndex> {
        if accuser == accused || !operating.contains(&accused) {
            return vec![accuser];
        }

        let log = &self.core.evidence_log;
        let symmetric_key = match recover_symmetric_key(log, accuser, accused, revealed_key) {
            Ok(key) => key,
            Err(RevealFailure::KeyMismatch) => return vec![accuser],
            Err(_) => return vec![accused],
        };
        let share_s = match recover_shares(log, accused, accuser, &symmetric_key) {
            Ok((share_s, _)) => share_s,
            Err(RevealFailure::Undecryptable) => return vec![accuser, accused],
            Err(_) => return vec![accused],
        };

        let Some(points) = log
            .points_message(accused)
            .map(|message| commitment_values(message.public_key_share_points()))
        else {
            return vec![accused];
        };
        if points.len() != self.core.group.dishonest_threshold() + 1 {
            return vec![accused];
        }

        if is_share_valid_against_points::<C>(share_s, &points, accuser) {
            vec![accuser]
        } else {
            vec![accused]
        }
    }

    /// The points of every operating member, including this member's own.
    ///
    /// Their contributions to the group key are taken from the points.
    pub fn valid_public_key_share_points(&self) -> BTreeMap<MemberIndex, Vec<Element<C>>> {
        let mut valid = BTreeMap::new();
        valid.insert(self.core.index, self.public_key_share_points.clone());
        for member in self.core.group.operating_member_ids() {
            if member == self.core.index {
                continue;
            }
            if let Some(message) = self.core.evidence_log.points_message(member) {
                valid.insert(member, commitment_values(message.public_key_share_points()));
            }
        }
        valid
    }

    /// Start phase 10.
    pub fn into_revealing_member(self) -> RevealingMember<C> {
        let valid_points = self.valid_public_key_share_points();
        RevealingMember::new(
            self.core,
            self.ephemeral_key_pairs,
            self.received_shares,
            self.qualified,
            self.master_private_key_share,
            valid_points,
        )
    }
}

/// Checks `g·s == Σ A_k·j^k`.
fn is_share_valid_against_points<C: Ciphersuite>(
    share: Scalar<C>,
    points: &[Element<C>],
    receiver: MemberIndex,
) -> bool {
    <C::Group>::generator() * share == evaluate_commitments::<C>(receiver, points)
}
