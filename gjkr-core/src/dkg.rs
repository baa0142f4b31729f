//! The GJKR distributed key generation as a block-paced state machine.
//!
//! Each [`DkgState`] wraps the member role of one protocol phase together
//! with the messages received for it. Messages are buffered per sender and
//! only the first message of each sender is kept. Phases that talk to the
//! network wait one block before initiating so that members who are a little
//! behind still receive every message of the phase.

use alloc::collections::BTreeMap;
use core::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use rand_core::{CryptoRng, RngCore};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    chain::BlockCounter,
    group::MemberIndex,
    member::{
        CombiningMember, CommitmentsVerifyingMember, CommittingMember,
        EphemeralKeyPairGeneratingMember, FinalizingMember, LocalMember, Member, MemberCore,
        PointsJustifyingMember, PointsValidatingMember, QualifiedMember, ReconstructingMember,
        RevealingMember, SharesJustifyingMember, SharingMember, SymmetricKeyGeneratingMember,
    },
    messages::{
        EphemeralPublicKeyMessage, MemberCommitmentsMessage, MemberPublicKeySharePointsMessage,
        Message, MisbehavedEphemeralKeysMessage, NetMessage, Payload, PeerSharesMessage,
        PointsAccusationsMessage, SecretSharesAccusationsMessage,
    },
    net::BroadcastChannel,
    result::DkgResult,
    state::{self, State, Transition},
    Ciphersuite, Error,
};

const SILENT_STATE_DELAY_BLOCKS: u64 = 0;
const SILENT_STATE_ACTIVE_BLOCKS: u64 = 0;

const EPHEMERAL_KEY_PAIR_STATE_DELAY_BLOCKS: u64 = 1;
const EPHEMERAL_KEY_PAIR_STATE_ACTIVE_BLOCKS: u64 = 5;

const COMMITMENT_STATE_DELAY_BLOCKS: u64 = 1;
const COMMITMENT_STATE_ACTIVE_BLOCKS: u64 = 5;

const COMMITMENT_VERIFICATION_STATE_DELAY_BLOCKS: u64 = 1;
const COMMITMENT_VERIFICATION_STATE_ACTIVE_BLOCKS: u64 = 10;

const POINTS_SHARE_STATE_DELAY_BLOCKS: u64 = 1;
const POINTS_SHARE_STATE_ACTIVE_BLOCKS: u64 = 5;

const POINTS_VALIDATION_STATE_DELAY_BLOCKS: u64 = 1;
const POINTS_VALIDATION_STATE_ACTIVE_BLOCKS: u64 = 10;

const KEY_REVEAL_STATE_DELAY_BLOCKS: u64 = 1;
const KEY_REVEAL_STATE_ACTIVE_BLOCKS: u64 = 5;

const COMBINATION_STATE_DELAY_BLOCKS: u64 = 0;
const COMBINATION_STATE_ACTIVE_BLOCKS: u64 = 20;

/// The number of blocks a complete key generation takes.
pub const fn protocol_blocks() -> u64 {
    EPHEMERAL_KEY_PAIR_STATE_DELAY_BLOCKS
        + EPHEMERAL_KEY_PAIR_STATE_ACTIVE_BLOCKS
        + COMMITMENT_STATE_DELAY_BLOCKS
        + COMMITMENT_STATE_ACTIVE_BLOCKS
        + COMMITMENT_VERIFICATION_STATE_DELAY_BLOCKS
        + COMMITMENT_VERIFICATION_STATE_ACTIVE_BLOCKS
        + POINTS_SHARE_STATE_DELAY_BLOCKS
        + POINTS_SHARE_STATE_ACTIVE_BLOCKS
        + POINTS_VALIDATION_STATE_DELAY_BLOCKS
        + POINTS_VALIDATION_STATE_ACTIVE_BLOCKS
        + KEY_REVEAL_STATE_DELAY_BLOCKS
        + KEY_REVEAL_STATE_ACTIVE_BLOCKS
        + COMBINATION_STATE_DELAY_BLOCKS
        + COMBINATION_STATE_ACTIVE_BLOCKS
}

/// Messages received in one phase, at most one per sender.
type PhaseMessages<T> = BTreeMap<MemberIndex, T>;

fn into_messages<T>(messages: PhaseMessages<T>) -> Vec<T> {
    messages.into_values().collect()
}

/// The phases of the key generation, in protocol order.
pub enum DkgState<C: Ciphersuite> {
    /// Phase 1: ephemeral public keys are broadcast.
    EphemeralKeyPairGeneration {
        /// The member role.
        member: EphemeralKeyPairGeneratingMember<C>,
        /// Ephemeral public key messages received.
        phase_messages: PhaseMessages<EphemeralPublicKeyMessage<C>>,
    },
    /// Phase 2 (silent): symmetric keys are derived.
    SymmetricKeyGeneration {
        /// The member role.
        member: SymmetricKeyGeneratingMember<C>,
        /// Ephemeral public key messages of phase 1.
        previous_phase_messages: Vec<EphemeralPublicKeyMessage<C>>,
    },
    /// Phase 3: shares and commitments are broadcast.
    Commitment {
        /// The member role.
        member: CommittingMember<C>,
        /// Shares messages received.
        phase_shares_messages: PhaseMessages<PeerSharesMessage>,
        /// Commitments messages received.
        phase_commitments_messages: PhaseMessages<MemberCommitmentsMessage<C>>,
    },
    /// Phase 4: shares are verified and accusations broadcast.
    CommitmentsVerification {
        /// The member role.
        member: CommitmentsVerifyingMember<C>,
        /// Shares messages of phase 3.
        previous_phase_shares_messages: Vec<PeerSharesMessage>,
        /// Commitments messages of phase 3.
        previous_phase_commitments_messages: Vec<MemberCommitmentsMessage<C>>,
        /// Accusations received, and this member's own.
        phase_accusations_messages: PhaseMessages<SecretSharesAccusationsMessage<C>>,
    },
    /// Phase 5 (silent): shares accusations are resolved.
    SharesJustification {
        /// The member role.
        member: SharesJustifyingMember<C>,
        /// Accusations of phase 4.
        previous_phase_accusations_messages: Vec<SecretSharesAccusationsMessage<C>>,
    },
    /// Phase 6 (silent): the qualified set is fixed.
    Qualification {
        /// The member role.
        member: QualifiedMember<C>,
    },
    /// Phase 7: public key share points are broadcast.
    PointsShare {
        /// The member role.
        member: SharingMember<C>,
        /// Points messages received.
        phase_messages: PhaseMessages<MemberPublicKeySharePointsMessage<C>>,
    },
    /// Phase 8: points are verified and accusations broadcast.
    PointsValidation {
        /// The member role.
        member: PointsValidatingMember<C>,
        /// Points messages of phase 7.
        previous_phase_messages: Vec<MemberPublicKeySharePointsMessage<C>>,
        /// Accusations received, and this member's own.
        phase_messages: PhaseMessages<PointsAccusationsMessage<C>>,
    },
    /// Phase 9 (silent): points accusations are resolved.
    PointsJustification {
        /// The member role.
        member: PointsJustifyingMember<C>,
        /// Accusations of phase 8.
        previous_phase_messages: Vec<PointsAccusationsMessage<C>>,
    },
    /// Phase 10: ephemeral keys of misbehaved members are revealed.
    KeyReveal {
        /// The member role.
        member: RevealingMember<C>,
        /// Reveal messages received.
        phase_messages: PhaseMessages<MisbehavedEphemeralKeysMessage<C>>,
    },
    /// Phase 11 (silent): misbehaved members' keys are reconstructed.
    Reconstruction {
        /// The member role.
        member: ReconstructingMember<C>,
        /// Reveal messages of phase 10.
        previous_phase_messages: Vec<MisbehavedEphemeralKeysMessage<C>>,
    },
    /// Phase 12: the group key is combined.
    Combination {
        /// The member role.
        member: CombiningMember<C>,
    },
    /// Phase 13 (silent): the result is produced.
    Finalization {
        /// The member role.
        member: FinalizingMember<C>,
    },
}

impl<C> DkgState<C>
where
    C: Ciphersuite,
{
    /// The name of the phase.
    pub fn name(&self) -> &'static str {
        match self {
            DkgState::EphemeralKeyPairGeneration { .. } => "ephemeral_key_pair_generation",
            DkgState::SymmetricKeyGeneration { .. } => "symmetric_key_generation",
            DkgState::Commitment { .. } => "commitment",
            DkgState::CommitmentsVerification { .. } => "commitments_verification",
            DkgState::SharesJustification { .. } => "shares_justification",
            DkgState::Qualification { .. } => "qualification",
            DkgState::PointsShare { .. } => "points_share",
            DkgState::PointsValidation { .. } => "points_validation",
            DkgState::PointsJustification { .. } => "points_justification",
            DkgState::KeyReveal { .. } => "key_reveal",
            DkgState::Reconstruction { .. } => "reconstruction",
            DkgState::Combination { .. } => "combination",
            DkgState::Finalization { .. } => "finalization",
        }
    }

    /// The `(delay, active)` window of the phase, in blocks.
    pub fn window(&self) -> (u64, u64) {
        match self {
            DkgState::EphemeralKeyPairGeneration { .. } => (
                EPHEMERAL_KEY_PAIR_STATE_DELAY_BLOCKS,
                EPHEMERAL_KEY_PAIR_STATE_ACTIVE_BLOCKS,
            ),
            DkgState::Commitment { .. } => {
                (COMMITMENT_STATE_DELAY_BLOCKS, COMMITMENT_STATE_ACTIVE_BLOCKS)
            }
            DkgState::CommitmentsVerification { .. } => (
                COMMITMENT_VERIFICATION_STATE_DELAY_BLOCKS,
                COMMITMENT_VERIFICATION_STATE_ACTIVE_BLOCKS,
            ),
            DkgState::PointsShare { .. } => (
                POINTS_SHARE_STATE_DELAY_BLOCKS,
                POINTS_SHARE_STATE_ACTIVE_BLOCKS,
            ),
            DkgState::PointsValidation { .. } => (
                POINTS_VALIDATION_STATE_DELAY_BLOCKS,
                POINTS_VALIDATION_STATE_ACTIVE_BLOCKS,
            ),
            DkgState::KeyReveal { .. } => {
                (KEY_REVEAL_STATE_DELAY_BLOCKS, KEY_REVEAL_STATE_ACTIVE_BLOCKS)
            }
            DkgState::Combination { .. } => (
                COMBINATION_STATE_DELAY_BLOCKS,
                COMBINATION_STATE_ACTIVE_BLOCKS,
            ),
            DkgState::SymmetricKeyGeneration { .. }
            | DkgState::SharesJustification { .. }
            | DkgState::Qualification { .. }
            | DkgState::PointsJustification { .. }
            | DkgState::Reconstruction { .. }
            | DkgState::Finalization { .. } => {
                (SILENT_STATE_DELAY_BLOCKS, SILENT_STATE_ACTIVE_BLOCKS)
            }
        }
    }

    /// The shared state of the current member role.
    pub fn core(&self) -> &MemberCore<C> {
        match self {
            DkgState::EphemeralKeyPairGeneration { member, .. } => member.core(),
            DkgState::SymmetricKeyGeneration { member, .. } => member.core(),
            DkgState::Commitment { member, .. } => member.core(),
            DkgState::CommitmentsVerification { member, .. } => member.core(),
            DkgState::SharesJustification { member, .. } => member.core(),
            DkgState::Qualification { member } => member.core(),
            DkgState::PointsShare { member, .. } => member.core(),
            DkgState::PointsValidation { member, .. } => member.core(),
            DkgState::PointsJustification { member, .. } => member.core(),
            DkgState::KeyReveal { member, .. } => member.core(),
            DkgState::Reconstruction { member, .. } => member.core(),
            DkgState::Combination { member } => member.core(),
            DkgState::Finalization { member } => member.core(),
        }
    }
}

/// Resources a key generation run needs besides the member itself.
pub struct DkgContext<C, B, R> {
    channel: Arc<B>,
    rng: R,
    _phantom: PhantomData<fn() -> C>,
}

impl<C, B, R> DkgContext<C, B, R>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    R: RngCore + CryptoRng + Send,
{
    /// Create a context broadcasting on `channel` and drawing randomness from
    /// `rng`.
    pub fn new(channel: Arc<B>, rng: R) -> Self {
        Self {
            channel,
            rng,
            _phantom: PhantomData,
        }
    }
}

async fn send<C, B>(channel: &B, session_id: &str, payload: Payload<C>) -> Result<(), Error>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
{
    debug!(kind = payload.kind(), "sending message");
    channel.send(Message::new(session_id, payload)).await?;
    Ok(())
}

/// A member executing one phase of the key generation.
pub struct KeyGenerationState<C: Ciphersuite, B, R> {
    context: DkgContext<C, B, R>,
    phase: DkgState<C>,
}

impl<C, B, R> KeyGenerationState<C, B, R>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    R: RngCore + CryptoRng + Send,
{
    /// The first state of the key generation for `member`.
    pub fn new(member: LocalMember<C>, context: DkgContext<C, B, R>) -> Self {
        Self {
            context,
            phase: DkgState::EphemeralKeyPairGeneration {
                member: member.into_ephemeral_key_pair_generating_member(),
                phase_messages: BTreeMap::new(),
            },
        }
    }

    /// The current phase.
    pub fn phase(&self) -> &DkgState<C> {
        &self.phase
    }

    fn buffer(&mut self, sender: MemberIndex, payload: Payload<C>) {
        match (&mut self.phase, payload) {
            (
                DkgState::EphemeralKeyPairGeneration { phase_messages, .. },
                Payload::EphemeralPublicKey(message),
            ) => {
                phase_messages.entry(sender).or_insert(message);
            }
            (
                DkgState::Commitment {
                    phase_shares_messages,
                    ..
                },
                Payload::PeerShares(message),
            ) => {
                phase_shares_messages.entry(sender).or_insert(message);
            }
            (
                DkgState::Commitment {
                    phase_commitments_messages,
                    ..
                },
                Payload::MemberCommitments(message),
            ) => {
                phase_commitments_messages.entry(sender).or_insert(message);
            }
            (
                DkgState::CommitmentsVerification {
                    phase_accusations_messages,
                    ..
                },
                Payload::SecretSharesAccusations(message),
            ) => {
                phase_accusations_messages.entry(sender).or_insert(message);
            }
            (
                DkgState::PointsShare { phase_messages, .. },
                Payload::MemberPublicKeySharePoints(message),
            ) => {
                phase_messages.entry(sender).or_insert(message);
            }
            (
                DkgState::PointsValidation { phase_messages, .. },
                Payload::PointsAccusations(message),
            ) => {
                phase_messages.entry(sender).or_insert(message);
            }
            (DkgState::KeyReveal { phase_messages, .. }, Payload::MisbehavedEphemeralKeys(message)) => {
                phase_messages.entry(sender).or_insert(message);
            }
            (phase, payload) => {
                debug!(
                    phase = phase.name(),
                    kind = payload.kind(),
                    %sender,
                    "ignoring message not expected in this phase"
                );
            }
        }
    }
}

#[async_trait]
impl<C, B, R> State for KeyGenerationState<C, B, R>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    R: RngCore + CryptoRng + Send,
{
    type Message = NetMessage<C>;
    type Output = DkgResult<C>;

    fn name(&self) -> &'static str {
        self.phase.name()
    }

    fn delay_blocks(&self) -> u64 {
        self.phase.window().0
    }

    fn active_blocks(&self) -> u64 {
        self.phase.window().1
    }

    fn member_index(&self) -> MemberIndex {
        self.phase.core().index()
    }

    async fn initiate(&mut self) -> Result<(), Error> {
        let channel = self.context.channel.as_ref();
        let rng = &mut self.context.rng;
        let session_id = self.phase.core().session_id().to_owned();

        match &mut self.phase {
            DkgState::EphemeralKeyPairGeneration { member, .. } => {
                let message = member.generate_ephemeral_key_pair(rng)?;
                send(channel, &session_id, Payload::EphemeralPublicKey(message)).await?;
            }
            DkgState::SymmetricKeyGeneration {
                member,
                previous_phase_messages,
            } => {
                member.mark_inactive_members(previous_phase_messages);
                member.generate_symmetric_keys(previous_phase_messages)?;
            }
            DkgState::Commitment { member, .. } => {
                let (shares_message, commitments_message) =
                    member.calculate_members_shares_and_commitments(rng)?;
                send(channel, &session_id, Payload::PeerShares(shares_message)).await?;
                send(channel, &session_id, Payload::MemberCommitments(commitments_message)).await?;
            }
            DkgState::CommitmentsVerification {
                member,
                previous_phase_shares_messages,
                previous_phase_commitments_messages,
                phase_accusations_messages,
            } => {
                member.mark_inactive_members(
                    previous_phase_shares_messages,
                    previous_phase_commitments_messages,
                );
                let message = member.verify_received_shares_and_commitments_messages(
                    previous_phase_shares_messages,
                    previous_phase_commitments_messages,
                )?;
                phase_accusations_messages.insert(member.index(), message.clone());
                send(channel, &session_id, Payload::SecretSharesAccusations(message)).await?;
            }
            DkgState::SharesJustification {
                member,
                previous_phase_accusations_messages,
            } => {
                member.mark_inactive_members(previous_phase_accusations_messages);
                member.resolve_secret_shares_accusations_messages(
                    previous_phase_accusations_messages,
                );
            }
            DkgState::Qualification { member } => {
                member.combine_member_shares();
            }
            DkgState::PointsShare { member, .. } => {
                let message = member.calculate_public_key_share_points()?;
                send(channel, &session_id, Payload::MemberPublicKeySharePoints(message)).await?;
            }
            DkgState::PointsValidation {
                member,
                previous_phase_messages,
                phase_messages,
            } => {
                member.mark_inactive_members(previous_phase_messages);
                let message = member.verify_public_key_share_points(previous_phase_messages)?;
                phase_messages.insert(member.index(), message.clone());
                send(channel, &session_id, Payload::PointsAccusations(message)).await?;
            }
            DkgState::PointsJustification {
                member,
                previous_phase_messages,
            } => {
                member.mark_inactive_members(previous_phase_messages);
                member.resolve_public_key_share_points_accusations_messages(
                    previous_phase_messages,
                );
            }
            DkgState::KeyReveal { member, .. } => {
                let message = member.reveal_misbehaved_members_keys()?;
                send(channel, &session_id, Payload::MisbehavedEphemeralKeys(message)).await?;
            }
            DkgState::Reconstruction {
                member,
                previous_phase_messages,
            } => {
                member.mark_inactive_members(previous_phase_messages);
                member.reconstruct_misbehaved_individual_keys(previous_phase_messages)?;
            }
            DkgState::Combination { member } => {
                member.compute_group_public_key_shares()?;
                member.combine_group_public_key();
            }
            DkgState::Finalization { .. } => {}
        }
        Ok(())
    }

    fn receive(&mut self, message: NetMessage<C>) -> Result<(), Error> {
        let (message, sender_public_key) = message.into_parts();
        let core = self.phase.core();

        if message.session_id() != core.session_id() {
            debug!(
                member = %core.index(),
                session = %message.session_id(),
                "ignoring message from another session"
            );
            return Ok(());
        }

        let sender = message.sender_id();
        if !core.should_accept_message(sender, &sender_public_key) {
            debug!(member = %core.index(), %sender, "ignoring message from rejected sender");
            return Ok(());
        }

        self.buffer(sender, message.into_payload());
        Ok(())
    }

    fn next(self) -> Result<Transition<Self, DkgResult<C>>, Error> {
        let KeyGenerationState { context, phase } = self;

        let phase = match phase {
            DkgState::EphemeralKeyPairGeneration {
                member,
                phase_messages,
            } => DkgState::SymmetricKeyGeneration {
                member: member.into_symmetric_key_generating_member(),
                previous_phase_messages: into_messages(phase_messages),
            },
            DkgState::SymmetricKeyGeneration { member, .. } => DkgState::Commitment {
                member: member.into_committing_member(),
                phase_shares_messages: BTreeMap::new(),
                phase_commitments_messages: BTreeMap::new(),
            },
            DkgState::Commitment {
                member,
                phase_shares_messages,
                phase_commitments_messages,
            } => DkgState::CommitmentsVerification {
                member: member.into_commitments_verifying_member(),
                previous_phase_shares_messages: into_messages(phase_shares_messages),
                previous_phase_commitments_messages: into_messages(phase_commitments_messages),
                phase_accusations_messages: BTreeMap::new(),
            },
            DkgState::CommitmentsVerification {
                member,
                phase_accusations_messages,
                ..
            } => DkgState::SharesJustification {
                member: member.into_shares_justifying_member(),
                previous_phase_accusations_messages: into_messages(phase_accusations_messages),
            },
            DkgState::SharesJustification { member, .. } => DkgState::Qualification {
                member: member.into_qualified_member(),
            },
            DkgState::Qualification { member } => DkgState::PointsShare {
                member: member.into_sharing_member(),
                phase_messages: BTreeMap::new(),
            },
            DkgState::PointsShare {
                member,
                phase_messages,
            } => DkgState::PointsValidation {
                member: member.into_points_validating_member(),
                previous_phase_messages: into_messages(phase_messages),
                phase_messages: BTreeMap::new(),
            },
            DkgState::PointsValidation {
                member,
                phase_messages,
                ..
            } => DkgState::PointsJustification {
                member: member.into_points_justifying_member(),
                previous_phase_messages: into_messages(phase_messages),
            },
            DkgState::PointsJustification { member, .. } => DkgState::KeyReveal {
                member: member.into_revealing_member(),
                phase_messages: BTreeMap::new(),
            },
            DkgState::KeyReveal {
                member,
                phase_messages,
            } => DkgState::Reconstruction {
                member: member.into_reconstructing_member(),
                previous_phase_messages: into_messages(phase_messages),
            },
            DkgState::Reconstruction { member, .. } => DkgState::Combination {
                member: member.into_combining_member(),
            },
            DkgState::Combination { member } => DkgState::Finalization {
                member: member.into_finalizing_member(),
            },
            DkgState::Finalization { member } => {
                let result = member.result();
                info!(
                    member = %member.index(),
                    misbehaved = ?result.group().misbehaved_member_ids(),
                    "key generation completed"
                );
                return Ok(Transition::Done(result));
            }
        };

        Ok(Transition::Next(KeyGenerationState { context, phase }))
    }
}

/// Run the key generation for `member` starting at `start_block`.
///
/// `inbound` must be subscribed to the broadcast channel before any member
/// starts. Returns the result and the block at which the key generation
/// ended.
pub async fn execute<C, B, BC, R>(
    member: LocalMember<C>,
    context: DkgContext<C, B, R>,
    block_counter: &BC,
    start_block: u64,
    inbound: &mut mpsc::Receiver<NetMessage<C>>,
) -> Result<(DkgResult<C>, u64), Error>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    BC: BlockCounter + ?Sized,
    R: RngCore + CryptoRng + Send,
{
    info!(member = %member.index(), start_block, "starting key generation");
    let initial_state = KeyGenerationState::new(member, context);
    state::execute(initial_state, block_counter, start_block, inbound).await
}
