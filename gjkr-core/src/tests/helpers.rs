//! Helper functions for testing

use alloc::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};

use crate::{
    config::Config,
    group::{MemberIndex, MembershipValidator},
    member::{LocalMember, Member},
    messages::{
        EphemeralPublicKeyMessage, MemberCommitmentsMessage, MemberPublicKeySharePointsMessage,
        MisbehavedEphemeralKeysMessage, PeerSharesMessage, PointsAccusationsMessage,
        SecretSharesAccusationsMessage,
    },
    result::DkgResult,
    Ciphersuite, Error, Field, Group,
};

/// The session id used by test members.
pub const SESSION_ID: &str = "test-session";

/// Install a log subscriber honoring `RUST_LOG`, writing to the test
/// output. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper function for building a member index.
pub fn member(index: u8) -> MemberIndex {
    MemberIndex::new(index).expect("index is in range")
}

/// Helper function for randomly generating an element
pub fn generate_element<C: Ciphersuite, R: RngCore + CryptoRng>(
    rng: &mut R,
) -> <<C as Ciphersuite>::Group as Group>::Element {
    let scalar = <<C::Group as Group>::Field>::random(rng);
    <C::Group>::generator() * scalar
}

/// Operator public keys for a group of `group_size` members. Member `i` is
/// held by the operator with key `[i]`.
pub fn operator_public_keys(group_size: usize) -> Vec<Vec<u8>> {
    (1..=group_size).map(|i| vec![i as u8]).collect()
}

/// Members of a group described by `config`, all in the same session.
pub fn local_members<C: Ciphersuite>(config: &Config) -> Vec<LocalMember<C>> {
    let validator = MembershipValidator::new(operator_public_keys(config.group_size))
        .expect("group size is valid");
    (1..=config.group_size)
        .map(|i| {
            LocalMember::new(
                member(i as u8),
                config,
                SESSION_ID,
                validator.clone(),
            )
            .expect("member is valid")
        })
        .collect()
}

/// The messages of one broadcast as delivered to one receiver. A tamper
/// function may rewrite or drop them before the receiver processes them.
pub enum Delivery<'a, C: Ciphersuite> {
    /// Phase 1.
    EphemeralPublicKeys(&'a mut Vec<EphemeralPublicKeyMessage<C>>),
    /// Phase 3, encrypted shares.
    PeerShares(&'a mut Vec<PeerSharesMessage>),
    /// Phase 3, commitments.
    Commitments(&'a mut Vec<MemberCommitmentsMessage<C>>),
    /// Phase 4.
    SharesAccusations(&'a mut Vec<SecretSharesAccusationsMessage<C>>),
    /// Phase 7.
    Points(&'a mut Vec<MemberPublicKeySharePointsMessage<C>>),
    /// Phase 8.
    PointsAccusations(&'a mut Vec<PointsAccusationsMessage<C>>),
    /// Phase 10.
    Reveals(&'a mut Vec<MisbehavedEphemeralKeysMessage<C>>),
}

/// Leaves every delivery untouched.
pub fn no_tampering<C: Ciphersuite>(_: MemberIndex, _: Delivery<'_, C>) {}

/// The outcome of a simulated key generation per member.
pub type Outcomes<C> = BTreeMap<MemberIndex, Result<DkgResult<C>, Error>>;

fn deliver<T: Clone>(
    messages: &[T],
    receiver: MemberIndex,
    sender: impl Fn(&T) -> MemberIndex,
) -> Vec<T> {
    messages
        .iter()
        .filter(|message| sender(message) != receiver)
        .cloned()
        .collect()
}

fn step<C, M, T>(
    roles: Vec<M>,
    failures: &mut BTreeMap<MemberIndex, Error>,
    mut f: impl FnMut(&mut M) -> Result<T, Error>,
) -> (Vec<M>, Vec<T>)
where
    C: Ciphersuite,
    M: Member<C>,
{
    let mut survivors = Vec::with_capacity(roles.len());
    let mut outputs = Vec::with_capacity(roles.len());
    for mut role in roles {
        match f(&mut role) {
            Ok(output) => {
                outputs.push(output);
                survivors.push(role);
            }
            Err(err) => {
                failures.insert(role.index(), err);
            }
        }
    }
    (survivors, outputs)
}

/// Run every phase of the key generation for all members of `config`
/// without a network, the same way the key generation states do: every
/// member receives the messages of all other members, and its own
/// accusations.
///
/// `tamper` is called for every receiver and broadcast and may alter what
/// the receiver sees. Members whose phase fails stop participating.
pub fn run_member_chain<C, R, F>(config: &Config, rng: &mut R, mut tamper: F) -> Outcomes<C>
where
    C: Ciphersuite,
    R: RngCore + CryptoRng,
    F: FnMut(MemberIndex, Delivery<'_, C>),
{
    let mut failures = BTreeMap::new();

    // Phase 1
    let roles = local_members::<C>(config)
        .into_iter()
        .map(LocalMember::into_ephemeral_key_pair_generating_member)
        .collect();
    let (roles, ephemeral_messages) =
        step::<C, _, _>(roles, &mut failures, |m| m.generate_ephemeral_key_pair(&mut *rng));

    // Phase 2
    let roles = roles
        .into_iter()
        .map(|m| m.into_symmetric_key_generating_member())
        .collect();
    let (roles, _) = step::<C, _, _>(roles, &mut failures, |m| {
        let mut received = deliver(&ephemeral_messages, m.index(), |msg| *msg.sender_id());
        tamper(m.index(), Delivery::EphemeralPublicKeys(&mut received));
        m.mark_inactive_members(&received);
        m.generate_symmetric_keys(&received)
    });

    // Phase 3
    let roles = roles
        .into_iter()
        .map(|m| m.into_committing_member())
        .collect();
    let (roles, sharing_messages) = step::<C, _, _>(roles, &mut failures, |m| {
        m.calculate_members_shares_and_commitments(&mut *rng)
    });
    let (shares_messages, commitments_messages): (Vec<_>, Vec<_>) =
        sharing_messages.into_iter().unzip();

    // Phase 4
    let roles = roles
        .into_iter()
        .map(|m| m.into_commitments_verifying_member())
        .collect();
    let (roles, shares_accusations) = step::<C, _, _>(roles, &mut failures, |m| {
        let mut shares = deliver(&shares_messages, m.index(), |msg| *msg.sender_id());
        let mut commitments = deliver(&commitments_messages, m.index(), |msg| *msg.sender_id());
        tamper(m.index(), Delivery::PeerShares(&mut shares));
        tamper(m.index(), Delivery::Commitments(&mut commitments));
        m.mark_inactive_members(&shares, &commitments);
        m.verify_received_shares_and_commitments_messages(&shares, &commitments)
    });

    // Phase 5
    let roles = roles
        .into_iter()
        .map(|m| m.into_shares_justifying_member())
        .collect();
    let (roles, _) = step::<C, _, _>(roles, &mut failures, |m| {
        let mut received = deliver(&shares_accusations, m.index(), |msg| *msg.sender_id());
        tamper(m.index(), Delivery::SharesAccusations(&mut received));
        received.extend(
            shares_accusations
                .iter()
                .filter(|msg| *msg.sender_id() == m.index())
                .cloned(),
        );
        m.mark_inactive_members(&received);
        m.resolve_secret_shares_accusations_messages(&received);
        Ok(())
    });

    // Phase 6
    let roles = roles
        .into_iter()
        .map(|m| m.into_qualified_member())
        .collect();
    let (roles, _) = step::<C, _, _>(roles, &mut failures, |m| {
        m.combine_member_shares();
        Ok(())
    });

    // Phase 7
    let roles = roles
        .into_iter()
        .map(|m| m.into_sharing_member())
        .collect();
    let (roles, points_messages) =
        step::<C, _, _>(roles, &mut failures, |m| m.calculate_public_key_share_points());

    // Phase 8
    let roles = roles
        .into_iter()
        .map(|m| m.into_points_validating_member())
        .collect();
    let (roles, points_accusations) = step::<C, _, _>(roles, &mut failures, |m| {
        let mut received = deliver(&points_messages, m.index(), |msg| *msg.sender_id());
        tamper(m.index(), Delivery::Points(&mut received));
        m.mark_inactive_members(&received);
        m.verify_public_key_share_points(&received)
    });

    // Phase 9
    let roles = roles
        .into_iter()
        .map(|m| m.into_points_justifying_member())
        .collect();
    let (roles, _) = step::<C, _, _>(roles, &mut failures, |m| {
        let mut received = deliver(&points_accusations, m.index(), |msg| *msg.sender_id());
        tamper(m.index(), Delivery::PointsAccusations(&mut received));
        received.extend(
            points_accusations
                .iter()
                .filter(|msg| *msg.sender_id() == m.index())
                .cloned(),
        );
        m.mark_inactive_members(&received);
        m.resolve_public_key_share_points_accusations_messages(&received);
        Ok(())
    });

    // Phase 10
    let roles = roles
        .into_iter()
        .map(|m| m.into_revealing_member())
        .collect();
    let (roles, reveal_messages) =
        step::<C, _, _>(roles, &mut failures, |m| m.reveal_misbehaved_members_keys());

    // Phase 11
    let roles = roles
        .into_iter()
        .map(|m| m.into_reconstructing_member())
        .collect();
    let (roles, _) = step::<C, _, _>(roles, &mut failures, |m| {
        let mut received = deliver(&reveal_messages, m.index(), |msg| *msg.sender_id());
        tamper(m.index(), Delivery::Reveals(&mut received));
        m.mark_inactive_members(&received);
        m.reconstruct_misbehaved_individual_keys(&received)
    });

    // Phase 12
    let roles = roles
        .into_iter()
        .map(|m| m.into_combining_member())
        .collect();
    let (roles, _) = step::<C, _, _>(roles, &mut failures, |m| {
        m.compute_group_public_key_shares()?;
        m.combine_group_public_key();
        Ok(())
    });

    // Phase 13
    let mut outcomes: Outcomes<C> = failures
        .into_iter()
        .map(|(index, err)| (index, Err(err)))
        .collect();
    for role in roles {
        let role = role.into_finalizing_member();
        outcomes.insert(role.index(), Ok(role.result()));
    }
    outcomes
}

/// The results of the given members, panicking if any of them failed.
pub fn results_of<'a, C: Ciphersuite>(
    outcomes: &'a Outcomes<C>,
    members: &[u8],
) -> Vec<&'a DkgResult<C>> {
    members
        .iter()
        .map(|i| {
            outcomes
                .get(&member(*i))
                .expect("member took part")
                .as_ref()
                .expect("member completed the key generation")
        })
        .collect()
}
