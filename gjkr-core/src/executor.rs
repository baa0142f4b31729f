//! Runs a complete membership: key generation, result publication and the
//! decision whether the member stays in the group.

use std::sync::Arc;

use rand_core::{CryptoRng, RngCore};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    chain::{BlockCounter, Ledger, Signing},
    dkg::{self, DkgContext},
    group::MemberIndex,
    member::{LocalMember, Member},
    net::BroadcastChannel,
    publication::{self, next_event, publication_blocks, PublicationContext, SubmissionOutcome},
    result::{ChainResult, DkgResult, DkgResultSubmittedEvent},
    Ciphersuite, Error,
};

/// A member that completed key generation and whose result was published.
pub struct Membership<C: Ciphersuite> {
    result: DkgResult<C>,
    operating_members: Vec<MemberIndex>,
    outcome: SubmissionOutcome,
}

impl<C> Membership<C>
where
    C: Ciphersuite,
{
    /// The key generation result of this member.
    pub fn result(&self) -> &DkgResult<C> {
        &self.result
    }

    /// The members of the group that were not listed as misbehaving by the
    /// published result.
    pub fn operating_members(&self) -> &[MemberIndex] {
        &self.operating_members
    }

    /// How this member's submission phase ended.
    pub fn outcome(&self) -> &SubmissionOutcome {
        &self.outcome
    }
}

impl<C> core::fmt::Debug for Membership<C>
where
    C: Ciphersuite,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Membership")
            .field("result", &self.result)
            .field("operating_members", &self.operating_members)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Run the key generation and publish its result.
///
/// The member subscribes to `channel` and to the ledger's submission events
/// before anything is sent, so every member must call this before the
/// ledger reaches `start_block + 1`.
pub async fn execute<C, B, L, S, R>(
    member: LocalMember<C>,
    channel: Arc<B>,
    ledger: Arc<L>,
    signer: Arc<S>,
    start_block: u64,
    rng: R,
) -> Result<Membership<C>, Error>
where
    C: Ciphersuite,
    B: BroadcastChannel<C>,
    L: Ledger,
    S: Signing,
    R: RngCore + CryptoRng + Send,
{
    let index = member.index();
    let session_id = member.core().session_id().to_owned();
    let membership_validator = member.core().membership_validator().clone();

    let mut inbound = channel.subscribe();
    let mut events = ledger.on_dkg_result_submitted();

    let (result, dkg_end_block) = dkg::execute(
        member,
        DkgContext::new(channel.clone(), rng),
        ledger.block_counter(),
        start_block,
        &mut inbound,
    )
    .await?;

    let chain_result = result.chain_result()?;
    let context = PublicationContext::new(
        index,
        session_id,
        result.group().clone(),
        membership_validator,
        chain_result.clone(),
        dkg_end_block,
        channel,
        ledger.clone(),
        signer,
    )?;
    let (outcome, _) = publication::execute(context, &mut inbound).await?;

    let group_size = result.group().group_size();
    let operating_members = match &outcome {
        SubmissionOutcome::Submitted | SubmissionOutcome::AlreadyRegistered => {
            members_not_misbehaving(group_size, chain_result.misbehaved_members())
        }
        SubmissionOutcome::Observed(event) => {
            decide_fate(index, group_size, &chain_result, event)?
        }
        SubmissionOutcome::Failed(_) => {
            let config = ledger.config();
            let timeout_block = dkg_end_block
                + publication_blocks()
                + config.group_size as u64 * config.result_publication_block_step;
            let event = wait_for_published_result(ledger.as_ref(), &mut events, timeout_block).await?;
            decide_fate(index, group_size, &chain_result, &event)?
        }
    };

    info!(
        member = %index,
        operating = ?operating_members,
        "membership established"
    );
    Ok(Membership {
        result,
        operating_members,
        outcome,
    })
}

async fn wait_for_published_result<L: Ledger>(
    ledger: &L,
    events: &mut broadcast::Receiver<DkgResultSubmittedEvent>,
    timeout_block: u64,
) -> Result<DkgResultSubmittedEvent, Error> {
    tokio::select! {
        biased;

        Some(event) = next_event(events) => Ok(event),
        reached = ledger.block_counter().wait_for_block_height(timeout_block) => {
            reached?;
            Err(Error::ResultPublicationTimeout(timeout_block))
        }
    }
}

/// Whether the member stays in the group published by `event`. Returns the
/// members the published result does not list as misbehaving.
fn decide_fate(
    index: MemberIndex,
    group_size: usize,
    local_result: &ChainResult,
    event: &DkgResultSubmittedEvent,
) -> Result<Vec<MemberIndex>, Error> {
    if event.group_public_key != local_result.group_public_key() {
        warn!(member = %index, "published group public key differs from the local one");
        return Err(Error::GroupPublicKeyMismatch(index));
    }
    if event.misbehaved_members.contains(&index) {
        warn!(member = %index, "published result lists this member as misbehaving");
        return Err(Error::MemberMisbehaved(index));
    }
    Ok(members_not_misbehaving(group_size, &event.misbehaved_members))
}

fn members_not_misbehaving(group_size: usize, misbehaved: &[MemberIndex]) -> Vec<MemberIndex> {
    (1..=group_size)
        .filter_map(|i| u8::try_from(i).ok())
        .filter_map(|i| MemberIndex::new(i).ok())
        .filter(|member| !misbehaved.contains(member))
        .collect()
}
