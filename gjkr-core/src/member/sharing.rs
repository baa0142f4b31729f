//! Phases 3 and 4: share distribution and verification.

use alloc::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};
use tracing::{debug, warn};

use super::{decrypt_share, encrypt_share, MemberCore, SharesJustifyingMember};
use crate::{
    ephemeral::{EphemeralKeyPair, SymmetricKey},
    group::MemberIndex,
    messages::{
        CoefficientCommitment, EncryptedShares, MemberCommitmentsMessage, PeerSharesMessage,
        SecretSharesAccusationsMessage,
    },
    polynomial::{evaluate_commitments, evaluate_polynomial, generate_coefficients},
    Ciphersuite, Element, Error, Field, Group, Scalar,
};

/// Phase 3: generates the secret polynomials and distributes shares.
pub struct CommittingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    symmetric_keys: BTreeMap<MemberIndex, SymmetricKey>,
    secret_coefficients: Vec<Scalar<C>>,
    self_secret_share: Scalar<C>,
}

impl<C> CommittingMember<C>
where
    C: Ciphersuite,
{
    pub(super) fn new(
        core: MemberCore<C>,
        ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
        symmetric_keys: BTreeMap<MemberIndex, SymmetricKey>,
    ) -> Self {
        Self {
            core,
            ephemeral_key_pairs,
            symmetric_keys,
            secret_coefficients: Vec::new(),
            self_secret_share: <<C::Group as Group>::Field>::zero(),
        }
    }

    /// Generate the secret polynomial `f` and the blinding polynomial `f'`,
    /// both of degree `t`, and compute for every operating peer `j` the
    /// shares `s_ij = f(j)` and `t_ij = f'(j)`, encrypted with the pairwise
    /// symmetric key.
    ///
    /// Returns the shares message and the message with the Pedersen
    /// commitments `C_k = g·a_k + h·b_k`.
    pub fn calculate_members_shares_and_commitments<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(PeerSharesMessage, MemberCommitmentsMessage<C>), Error> {
        let degree = self.core.group.dishonest_threshold();
        let coefficients_a = generate_coefficients::<C, R>(degree + 1, rng);
        let coefficients_b = generate_coefficients::<C, R>(degree + 1, rng);

        let mut shares = BTreeMap::new();
        for peer in self.core.group.operating_member_ids() {
            let x = peer.to_scalar::<C>();
            let share_s = evaluate_polynomial::<C>(x, &coefficients_a);
            let share_t = evaluate_polynomial::<C>(x, &coefficients_b);

            if peer == self.core.index {
                self.self_secret_share = share_s;
                continue;
            }

            let symmetric_key = self
                .symmetric_keys
                .get(&peer)
                .ok_or(Error::MissingSymmetricKey(peer))?;
            shares.insert(
                peer,
                EncryptedShares::new(
                    encrypt_share::<C, R>(symmetric_key, rng, share_s)?,
                    encrypt_share::<C, R>(symmetric_key, rng, share_t)?,
                ),
            );
        }

        let generator = <C::Group>::generator();
        let blinding_generator = C::blinding_generator();
        let commitments = coefficients_a
            .iter()
            .zip(coefficients_b.iter())
            .map(|(a, b)| CoefficientCommitment::new(generator * *a + blinding_generator * *b))
            .collect();

        self.secret_coefficients = coefficients_a;

        let shares_message = PeerSharesMessage::new(self.core.index, shares);
        let commitments_message = MemberCommitmentsMessage::new(self.core.index, commitments);
        self.core.evidence_log.put(shares_message.clone())?;
        self.core.evidence_log.put(commitments_message.clone())?;

        Ok((shares_message, commitments_message))
    }

    /// Start phase 4.
    pub fn into_commitments_verifying_member(self) -> CommitmentsVerifyingMember<C> {
        CommitmentsVerifyingMember {
            core: self.core,
            ephemeral_key_pairs: self.ephemeral_key_pairs,
            symmetric_keys: self.symmetric_keys,
            secret_coefficients: self.secret_coefficients,
            self_secret_share: self.self_secret_share,
            received_shares: BTreeMap::new(),
        }
    }
}

/// Phase 4: verifies the received shares against the senders' commitments.
pub struct CommitmentsVerifyingMember<C: Ciphersuite> {
    pub(super) core: MemberCore<C>,
    ephemeral_key_pairs: BTreeMap<MemberIndex, EphemeralKeyPair<C>>,
    symmetric_keys: BTreeMap<MemberIndex, SymmetricKey>,
    secret_coefficients: Vec<Scalar<C>>,
    self_secret_share: Scalar<C>,
    received_shares: BTreeMap<MemberIndex, Scalar<C>>,
}

impl<C> CommitmentsVerifyingMember<C>
where
    C: Ciphersuite,
{
    /// Mark members who did not send both phase 3 messages as inactive.
    pub fn mark_inactive_members(
        &mut self,
        shares_messages: &[PeerSharesMessage],
        commitments_messages: &[MemberCommitmentsMessage<C>],
    ) {
        let senders = shares_messages
            .iter()
            .map(|message| *message.sender_id())
            .filter(|sender| {
                commitments_messages
                    .iter()
                    .any(|message| message.sender_id() == sender)
            });
        self.core.mark_inactive_members(senders.collect::<Vec<_>>());
    }

    /// Verify the shares every operating sender computed for this member.
    ///
    /// Returns the accusations message. It reveals this member's ephemeral
    /// private key generated for every sender whose shares are missing,
    /// cannot be decrypted or fail the check `g·s + h·t == Σ C_k·i^k`.
    pub fn verify_received_shares_and_commitments_messages(
        &mut self,
        shares_messages: &[PeerSharesMessage],
        commitments_messages: &[MemberCommitmentsMessage<C>],
    ) -> Result<SecretSharesAccusationsMessage<C>, Error> {
        let mut accused_members_keys = BTreeMap::new();

        for shares_message in shares_messages {
            let sender = *shares_message.sender_id();
            if !self.core.group.is_operating(sender) {
                continue;
            }
            let Some(commitments_message) = commitments_messages
                .iter()
                .find(|message| *message.sender_id() == sender)
            else {
                continue;
            };

            if !self.core.record_evidence(shares_message.clone())
                || !self.core.record_evidence(commitments_message.clone())
            {
                continue;
            }

            match self.verify_shares(sender, shares_message, commitments_message) {
                Ok(share_s) => {
                    self.received_shares.insert(sender, share_s);
                }
                Err(reason) => {
                    warn!(member = %self.core.index, accused = %sender, reason, "accusing member");
                    let key_pair = self
                        .ephemeral_key_pairs
                        .get(&sender)
                        .ok_or(Error::UnknownMember(sender))?;
                    accused_members_keys.insert(sender, *key_pair.private_key());
                }
            }
        }

        debug!(
            member = %self.core.index,
            accused = accused_members_keys.len(),
            "verified received shares"
        );
        Ok(SecretSharesAccusationsMessage::new(
            self.core.index,
            accused_members_keys,
        ))
    }

    fn verify_shares(
        &self,
        sender: MemberIndex,
        shares_message: &PeerSharesMessage,
        commitments_message: &MemberCommitmentsMessage<C>,
    ) -> Result<Scalar<C>, &'static str> {
        let shares = shares_message
            .shares_for(self.core.index)
            .ok_or("missing shares")?;
        let symmetric_key = self
            .symmetric_keys
            .get(&sender)
            .ok_or("no symmetric key")?;
        let share_s = decrypt_share::<C>(symmetric_key, shares.encrypted_share_s())
            .map_err(|_| "cannot decrypt share s")?;
        let share_t = decrypt_share::<C>(symmetric_key, shares.encrypted_share_t())
            .map_err(|_| "cannot decrypt share t")?;

        let commitments = commitment_values(commitments_message.commitments());
        if commitments.len() != self.core.group.dishonest_threshold() + 1 {
            return Err("wrong number of commitments");
        }
        if !are_shares_valid_against_commitments::<C>(
            share_s,
            share_t,
            &commitments,
            self.core.index,
        ) {
            return Err("shares do not match commitments");
        }
        Ok(share_s)
    }

    /// Start phase 5.
    pub fn into_shares_justifying_member(self) -> SharesJustifyingMember<C> {
        SharesJustifyingMember::new(
            self.core,
            self.ephemeral_key_pairs,
            self.secret_coefficients,
            self.self_secret_share,
            self.received_shares,
        )
    }
}

/// The group elements of a list of commitments.
pub(super) fn commitment_values<C: Ciphersuite>(
    commitments: &[CoefficientCommitment<C>],
) -> Vec<Element<C>> {
    commitments.iter().map(CoefficientCommitment::value).collect()
}

/// Checks `g·s + h·t == Σ C_k·j^k`.
pub(super) fn are_shares_valid_against_commitments<C: Ciphersuite>(
    share_s: Scalar<C>,
    share_t: Scalar<C>,
    commitments: &[Element<C>],
    receiver: MemberIndex,
) -> bool {
    let expected = evaluate_commitments::<C>(receiver, commitments);
    let actual = <C::Group>::generator() * share_s + C::blinding_generator() * share_t;
    expected == actual
}
