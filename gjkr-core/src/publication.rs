//! Publication of a DKG result to the ledger.
//!
//! Members sign the hash of their result, collect the signatures of members
//! that agree with it and submit in turn: member `i` submits
//! `(i - 1) * result_publication_block_step` blocks after the submission
//! phase starts, unless a result was published before.

use alloc::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    chain::{BlockCounter, Ledger, Signing},
    error::ChainError,
    group::{Group, MemberIndex, MembershipValidator},
    messages::{DkgResultHashSignatureMessage, Message, NetMessage, Payload},
    net::BroadcastChannel,
    result::{ChainResult, DkgResultSubmittedEvent, ResultHash},
    state::{self, State, Transition},
    Ciphersuite, Error,
};

const RESULT_SIGNING_STATE_DELAY_BLOCKS: u64 = 1;
const RESULT_SIGNING_STATE_ACTIVE_BLOCKS: u64 = 5;

const SIGNATURES_VERIFICATION_STATE_DELAY_BLOCKS: u64 = 0;
const SIGNATURES_VERIFICATION_STATE_ACTIVE_BLOCKS: u64 = 0;

const RESULT_SUBMISSION_STATE_DELAY_BLOCKS: u64 = 0;
const RESULT_SUBMISSION_STATE_ACTIVE_BLOCKS: u64 = 0;

/// The number of blocks the publication states take, not counting the
/// submission turns of the members.
pub const fn publication_blocks() -> u64 {
    RESULT_SIGNING_STATE_DELAY_BLOCKS
        + RESULT_SIGNING_STATE_ACTIVE_BLOCKS
        + SIGNATURES_VERIFICATION_STATE_DELAY_BLOCKS
        + SIGNATURES_VERIFICATION_STATE_ACTIVE_BLOCKS
        + RESULT_SUBMISSION_STATE_DELAY_BLOCKS
        + RESULT_SUBMISSION_STATE_ACTIVE_BLOCKS
}

/// How the submission phase ended for this member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The member's own submission was accepted.
    Submitted,
    /// Another member's submission was observed first.
    Observed(DkgResultSubmittedEvent),
    /// The group was already registered when the phase started.
    AlreadyRegistered,
    /// The member's own submission failed.
    Failed(ChainError),
}

/// Everything a member publishing a result needs.
pub struct PublicationContext<B, L, S> {
    member_index: MemberIndex,
    session_id: String,
    group: Group,
    membership_validator: MembershipValidator,
    chain_result: ChainResult,
    result_hash: ResultHash,
    start_block: u64,
    channel: Arc<B>,
    ledger: Arc<L>,
    signer: Arc<S>,
}

impl<B, L, S> PublicationContext<B, L, S>
where
    L: Ledger,
    S: Signing,
{
    /// Create a context for publishing `chain_result` from `start_block`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        member_index: MemberIndex,
        session_id: impl Into<String>,
        group: Group,
        membership_validator: MembershipValidator,
        chain_result: ChainResult,
        start_block: u64,
        channel: Arc<B>,
        ledger: Arc<L>,
        signer: Arc<S>,
    ) -> Result<Self, Error> {
        let result_hash = chain_result.hash()?;
        Ok(Self {
            member_index,
            session_id: session_id.into(),
            group,
            membership_validator,
            chain_result,
            result_hash,
            start_block,
            channel,
            ledger,
            signer,
        })
    }

    /// The hash of the result this member supports.
    pub fn result_hash(&self) -> ResultHash {
        self.result_hash
    }

    fn submission_start_block(&self) -> u64 {
        self.start_block
            + RESULT_SIGNING_STATE_DELAY_BLOCKS
            + RESULT_SIGNING_STATE_ACTIVE_BLOCKS
            + SIGNATURES_VERIFICATION_STATE_DELAY_BLOCKS
            + SIGNATURES_VERIFICATION_STATE_ACTIVE_BLOCKS
    }

    fn should_accept_message(&self, sender: MemberIndex, sender_public_key: &[u8]) -> bool {
        sender != self.member_index
            && self.group.is_operating(sender)
            && self
                .membership_validator
                .is_valid_membership(sender, sender_public_key)
    }

    fn is_signature_valid(
        &self,
        message: &DkgResultHashSignatureMessage,
        sender_public_key: &[u8],
    ) -> Result<(), &'static str> {
        if *message.result_hash() != self.result_hash {
            return Err("signed a different result");
        }
        if message.public_key().as_slice() != sender_public_key {
            return Err("embedded public key does not match the sender");
        }
        match self.signer.verify_with_public_key(
            self.result_hash.as_bytes(),
            message.signature(),
            message.public_key(),
        ) {
            Ok(true) => Ok(()),
            Ok(false) => Err("invalid signature"),
            Err(_) => Err("signature could not be verified"),
        }
    }
}

/// The phases of the result publication.
pub enum PublicationState {
    /// Signs the result hash and collects the signatures of other members.
    Signing {
        /// Signature messages received, with the sender's transport key.
        phase_messages: BTreeMap<MemberIndex, (DkgResultHashSignatureMessage, Vec<u8>)>,
        /// This member's own signature.
        own_signature: Vec<u8>,
    },
    /// Keeps the signatures of members that support the same result.
    Verification {
        /// Signature messages of the signing phase.
        previous_phase_messages: Vec<(DkgResultHashSignatureMessage, Vec<u8>)>,
        /// Valid signatures, this member's own included.
        valid_signatures: BTreeMap<MemberIndex, Vec<u8>>,
    },
    /// Submits the result when it is this member's turn.
    Submission {
        /// Valid signatures, this member's own included.
        signatures: BTreeMap<MemberIndex, Vec<u8>>,
        /// Set once the phase was initiated.
        outcome: Option<SubmissionOutcome>,
    },
}

impl PublicationState {
    /// The name of the phase.
    pub fn name(&self) -> &'static str {
        match self {
            PublicationState::Signing { .. } => "result_signing",
            PublicationState::Verification { .. } => "signatures_verification",
            PublicationState::Submission { .. } => "result_submission",
        }
    }

    fn window(&self) -> (u64, u64) {
        match self {
            PublicationState::Signing { .. } => (
                RESULT_SIGNING_STATE_DELAY_BLOCKS,
                RESULT_SIGNING_STATE_ACTIVE_BLOCKS,
            ),
            PublicationState::Verification { .. } => (
                SIGNATURES_VERIFICATION_STATE_DELAY_BLOCKS,
                SIGNATURES_VERIFICATION_STATE_ACTIVE_BLOCKS,
            ),
            PublicationState::Submission { .. } => (
                RESULT_SUBMISSION_STATE_DELAY_BLOCKS,
                RESULT_SUBMISSION_STATE_ACTIVE_BLOCKS,
            ),
        }
    }
}

/// A member executing one phase of the result publication.
pub struct ResultPublicationState<C, B, L, S> {
    context: PublicationContext<B, L, S>,
    state: PublicationState,
    _phantom: core::marker::PhantomData<fn() -> C>,
}

impl<C, B, L, S> ResultPublicationState<C, B, L, S>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    L: Ledger,
    S: Signing,
{
    /// The first state of the publication.
    pub fn new(context: PublicationContext<B, L, S>) -> Self {
        Self {
            context,
            state: PublicationState::Signing {
                phase_messages: BTreeMap::new(),
                own_signature: Vec::new(),
            },
            _phantom: core::marker::PhantomData,
        }
    }

    /// The current phase.
    pub fn state(&self) -> &PublicationState {
        &self.state
    }

    async fn submit(
        context: &PublicationContext<B, L, S>,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
    ) -> Result<SubmissionOutcome, Error> {
        let ledger = &context.ledger;
        let threshold = ledger.config().signature_threshold();
        if signatures.len() < threshold {
            return Err(Error::InsufficientSignatures {
                signatures: signatures.len(),
                threshold,
            });
        }

        let mut events = ledger.on_dkg_result_submitted();

        if ledger
            .is_group_registered(context.chain_result.group_public_key())
            .await?
        {
            info!(member = %context.member_index, "group already registered");
            return Ok(SubmissionOutcome::AlreadyRegistered);
        }

        let step = ledger.config().result_publication_block_step;
        let submission_block = context.submission_start_block()
            + u64::from(context.member_index.get() - 1) * step;
        debug!(
            member = %context.member_index,
            block = submission_block,
            "waiting for submission turn"
        );

        let group_public_key = context.chain_result.group_public_key();
        tokio::select! {
            biased;

            Some(event) = next_group_event(&mut events, group_public_key) => {
                info!(
                    member = %context.member_index,
                    submitter = %event.member_index,
                    "result submitted by another member"
                );
                Ok(SubmissionOutcome::Observed(event))
            }
            reached = ledger.block_counter().wait_for_block_height(submission_block) => {
                reached?;
                match ledger
                    .submit_dkg_result(context.member_index, &context.chain_result, signatures)
                    .await
                {
                    Ok(()) => {
                        info!(
                            member = %context.member_index,
                            signatures = signatures.len(),
                            "submitted DKG result"
                        );
                        Ok(SubmissionOutcome::Submitted)
                    }
                    Err(err) => {
                        warn!(member = %context.member_index, %err, "DKG result submission failed");
                        Ok(SubmissionOutcome::Failed(err))
                    }
                }
            }
        }
    }
}

/// The next submission event, skipping over lagged ones. `None` once the
/// ledger closed the subscription.
pub(crate) async fn next_event(
    events: &mut broadcast::Receiver<DkgResultSubmittedEvent>,
) -> Option<DkgResultSubmittedEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "missed submission events");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// The next submission event for the group with `group_public_key`. Events
/// of other groups are skipped.
async fn next_group_event(
    events: &mut broadcast::Receiver<DkgResultSubmittedEvent>,
    group_public_key: &[u8],
) -> Option<DkgResultSubmittedEvent> {
    loop {
        let event = next_event(events).await?;
        if event.group_public_key == group_public_key {
            return Some(event);
        }
        debug!(
            submitter = %event.member_index,
            "ignoring result submitted for another group"
        );
    }
}

#[async_trait]
impl<C, B, L, S> State for ResultPublicationState<C, B, L, S>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    L: Ledger,
    S: Signing,
{
    type Message = NetMessage<C>;
    type Output = SubmissionOutcome;

    fn name(&self) -> &'static str {
        self.state.name()
    }

    fn delay_blocks(&self) -> u64 {
        self.state.window().0
    }

    fn active_blocks(&self) -> u64 {
        self.state.window().1
    }

    fn member_index(&self) -> MemberIndex {
        self.context.member_index
    }

    async fn initiate(&mut self) -> Result<(), Error> {
        let context = &self.context;
        match &mut self.state {
            PublicationState::Signing { own_signature, .. } => {
                let signature = context.signer.sign(context.result_hash.as_bytes())?;
                let message = DkgResultHashSignatureMessage::new(
                    context.member_index,
                    context.result_hash,
                    signature.clone(),
                    context.signer.public_key(),
                );
                *own_signature = signature;
                debug!(
                    member = %context.member_index,
                    hash = %context.result_hash,
                    "signed DKG result"
                );
                context
                    .channel
                    .send(Message::new(
                        context.session_id.as_str(),
                        Payload::DkgResultHashSignature(message),
                    ))
                    .await?;
            }
            PublicationState::Verification {
                previous_phase_messages,
                valid_signatures,
            } => {
                for (message, sender_public_key) in previous_phase_messages.iter() {
                    let sender = *message.sender_id();
                    match context.is_signature_valid(message, sender_public_key) {
                        Ok(()) => {
                            valid_signatures
                                .entry(sender)
                                .or_insert_with(|| message.signature().clone());
                        }
                        Err(reason) => {
                            warn!(member = %context.member_index, %sender, reason, "rejecting result signature");
                        }
                    }
                }
                debug!(
                    member = %context.member_index,
                    signatures = valid_signatures.len(),
                    "verified result signatures"
                );
            }
            PublicationState::Submission {
                signatures,
                outcome,
            } => {
                *outcome = Some(Self::submit(context, signatures).await?);
            }
        }
        Ok(())
    }

    fn receive(&mut self, message: NetMessage<C>) -> Result<(), Error> {
        let (message, sender_public_key) = message.into_parts();
        let context = &self.context;

        if *message.session_id() != context.session_id {
            return Ok(());
        }
        let sender = message.sender_id();
        if !context.should_accept_message(sender, &sender_public_key) {
            debug!(member = %context.member_index, %sender, "ignoring message from rejected sender");
            return Ok(());
        }

        match (&mut self.state, message.into_payload()) {
            (
                PublicationState::Signing { phase_messages, .. },
                Payload::DkgResultHashSignature(message),
            ) => {
                phase_messages
                    .entry(sender)
                    .or_insert((message, sender_public_key));
            }
            (state, payload) => {
                debug!(
                    state = state.name(),
                    kind = payload.kind(),
                    %sender,
                    "ignoring message not expected in this phase"
                );
            }
        }
        Ok(())
    }

    fn next(self) -> Result<Transition<Self, SubmissionOutcome>, Error> {
        let ResultPublicationState {
            context,
            state,
            _phantom,
        } = self;

        let state = match state {
            PublicationState::Signing {
                phase_messages,
                own_signature,
            } => {
                let mut valid_signatures = BTreeMap::new();
                valid_signatures.insert(context.member_index, own_signature);
                PublicationState::Verification {
                    previous_phase_messages: phase_messages.into_values().collect(),
                    valid_signatures,
                }
            }
            PublicationState::Verification {
                valid_signatures, ..
            } => PublicationState::Submission {
                signatures: valid_signatures,
                outcome: None,
            },
            PublicationState::Submission { outcome, .. } => {
                return outcome
                    .map(Transition::Done)
                    .ok_or_else(|| Error::InitiateFailed {
                        state: "result_submission",
                        reason: "submission was not attempted".into(),
                    });
            }
        };

        Ok(Transition::Next(ResultPublicationState {
            context,
            state,
            _phantom,
        }))
    }
}

/// Publish the result described by `context`.
///
/// Returns how the submission ended and the block at which the publication
/// states ended.
pub async fn execute<C, B, L, S>(
    context: PublicationContext<B, L, S>,
    inbound: &mut mpsc::Receiver<NetMessage<C>>,
) -> Result<(SubmissionOutcome, u64), Error>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    L: Ledger,
    S: Signing,
{
    let ledger = context.ledger.clone();
    let start_block = context.start_block;
    info!(
        member = %context.member_index,
        hash = %context.result_hash,
        start_block,
        "publishing DKG result"
    );
    let initial_state = ResultPublicationState::new(context);
    state::execute(initial_state, ledger.block_counter(), start_block, inbound).await
}
