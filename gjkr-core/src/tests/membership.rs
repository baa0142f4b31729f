//! Ciphersuite-generic end-to-end tests: key generation and result
//! publication over the in-memory network and ledger.
//!
//! Every function must run inside a tokio runtime with paused time, so the
//! block counter advances deterministically.

use alloc::collections::BTreeMap;
use core::{cell::Cell, marker::PhantomData, time::Duration};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use tokio::sync::broadcast;

use crate::{
    chain::{BlockCounter, Ledger, Signing},
    config::Config,
    dkg::protocol_blocks,
    error::ChainError,
    executor::{self, Membership},
    group::{MemberIndex, MembershipValidator},
    local::{Interceptor, LocalBlockCounter, LocalLedger, LocalNetwork, LocalSigner},
    member::LocalMember,
    messages::{EncryptedShares, Message, Payload, PeerSharesMessage},
    publication::{publication_blocks, SubmissionOutcome},
    result::{ChainResult, DkgResultSubmittedEvent},
    tests::helpers::{init_tracing, member, SESSION_ID},
    Ciphersuite, Error,
};

const BLOCK_TIME: Duration = Duration::from_secs(1);

/// The outcome of a membership run per member.
pub type Memberships<C> = BTreeMap<MemberIndex, Result<Membership<C>, Error>>;

/// A member RNG that may move to another thread but is not `Sync`.
struct UnsyncRng {
    inner: ChaCha20Rng,
    _unsync: PhantomData<Cell<()>>,
}

impl UnsyncRng {
    fn from_rng<R: RngCore>(rng: &mut R) -> Self {
        Self {
            inner: ChaCha20Rng::from_rng(rng).unwrap(),
            _unsync: PhantomData,
        }
    }
}

impl RngCore for UnsyncRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

impl CryptoRng for UnsyncRng {}

/// Run the key generation and publication for every member of the group
/// described by the ledger's config, starting at the current block.
/// Members listed in `interceptors` pass their outgoing messages through
/// the given interceptor.
pub async fn run_group<C, L, R>(
    ledger: Arc<L>,
    interceptors: BTreeMap<MemberIndex, Interceptor<C>>,
    rng: &mut R,
) -> Memberships<C>
where
    C: Ciphersuite,
    L: Ledger + 'static,
    R: RngCore + CryptoRng,
{
    init_tracing();
    let config = ledger.config();
    let network = LocalNetwork::<C>::new();
    let signers: Vec<_> = (0..config.group_size)
        .map(|_| Arc::new(LocalSigner::<C>::generate(&mut *rng)))
        .collect();
    let validator =
        MembershipValidator::new(signers.iter().map(|signer| signer.public_key()).collect())
            .unwrap();
    let start_block = ledger.block_counter().current_block().await.unwrap();

    let mut handles = Vec::new();
    for (i, signer) in signers.into_iter().enumerate() {
        let index = member(i as u8 + 1);
        let local_member =
            LocalMember::<C>::new(index, &config, SESSION_ID, validator.clone()).unwrap();
        let mut channel = network.channel(signer.public_key());
        if let Some(interceptor) = interceptors.get(&index) {
            channel = channel.with_interceptor(interceptor.clone());
        }
        let member_rng = UnsyncRng::from_rng(&mut *rng);
        let handle = tokio::spawn(executor::execute(
            local_member,
            Arc::new(channel),
            ledger.clone(),
            signer,
            start_block,
            member_rng,
        ));
        handles.push((index, handle));
    }

    let mut memberships = BTreeMap::new();
    for (index, handle) in handles {
        memberships.insert(index, handle.await.expect("member task panicked"));
    }
    memberships
}

/// A ledger ticking one block per [`BLOCK_TIME`].
pub fn ticking_ledger(config: Config) -> LocalLedger {
    LocalLedger::new(config, LocalBlockCounter::with_block_time(BLOCK_TIME))
}

/// An interceptor dropping every message of the given kind.
pub fn drop_kind<C: Ciphersuite>(kind: &'static str) -> Interceptor<C> {
    Arc::new(move |message: Message<C>| {
        if message.payload().kind() == kind {
            None
        } else {
            Some(message)
        }
    })
}

/// An interceptor replacing every encrypted `s` share with `{0x00}`.
fn corrupting_shares<C: Ciphersuite>() -> Interceptor<C> {
    Arc::new(|message: Message<C>| {
        let session_id = message.session_id().clone();
        match message.into_payload() {
            Payload::PeerShares(shares_message) => {
                let shares = shares_message
                    .shares()
                    .iter()
                    .map(|(receiver, shares)| {
                        (
                            *receiver,
                            EncryptedShares::new(vec![0x00], shares.encrypted_share_t().clone()),
                        )
                    })
                    .collect();
                let corrupted = PeerSharesMessage::new(*shares_message.sender_id(), shares);
                Some(Message::new(session_id, Payload::PeerShares(corrupted)))
            }
            payload => Some(Message::new(session_id, payload)),
        }
    })
}

fn members(indices: &[u8]) -> Vec<MemberIndex> {
    indices.iter().copied().map(member).collect()
}

fn assert_members_stay<C: Ciphersuite>(memberships: &Memberships<C>, honest: &[u8]) {
    let group_public_key = memberships[&member(honest[0])]
        .as_ref()
        .unwrap()
        .result()
        .group_public_key();
    for index in honest {
        let membership = memberships[&member(*index)]
            .as_ref()
            .unwrap_or_else(|err| panic!("member {index} failed: {err}"));
        assert_eq!(membership.operating_members(), members(honest));
        assert!(membership.result().group_public_key() == group_public_key);
    }
}

/// The block at which member `index` submits when the group starts at
/// `start_block`.
pub fn submission_block(start_block: u64, index: u8, step: u64) -> u64 {
    start_block + protocol_blocks() + publication_blocks() + u64::from(index - 1) * step
}

/// Test a complete membership in which nobody misbehaves: the first member
/// submits and everybody else observes its submission.
pub async fn check_membership_without_faults<C: Ciphersuite, R: RngCore + CryptoRng>(
    mut rng: R,
) {
    let config = Config::new(5, 3, 2).unwrap();
    let ledger = Arc::new(ticking_ledger(config));

    let memberships = run_group::<C, _, _>(ledger.clone(), BTreeMap::new(), &mut rng).await;

    assert_members_stay(&memberships, &[1, 2, 3, 4, 5]);
    let event = ledger.submitted_result().unwrap();
    assert_eq!(event.member_index, member(1));
    assert!(event.misbehaved_members.is_empty());
    assert_eq!(event.block_number, submission_block(0, 1, 2));

    assert_eq!(
        memberships[&member(1)].as_ref().unwrap().outcome(),
        &SubmissionOutcome::Submitted
    );
    // Members reaching the submission phase in the block of the first
    // submission may already find the group registered.
    for index in 2..=5 {
        assert!(matches!(
            memberships[&member(index)].as_ref().unwrap().outcome(),
            SubmissionOutcome::Observed(_) | SubmissionOutcome::AlreadyRegistered
        ));
    }
}

/// Test that members who drop a required message are excluded: member 1
/// drops its commitments and member 2 drops its shares.
pub async fn check_dropped_messages_exclude_senders<C: Ciphersuite, R: RngCore + CryptoRng>(
    mut rng: R,
) {
    let config = Config::new(6, 3, 1).unwrap();
    let ledger = Arc::new(ticking_ledger(config));
    let interceptors = BTreeMap::from([
        (member(1), drop_kind::<C>("member_commitments")),
        (member(2), drop_kind::<C>("peer_shares")),
    ]);

    let memberships = run_group::<C, _, _>(ledger.clone(), interceptors, &mut rng).await;

    assert_members_stay(&memberships, &[3, 4, 5, 6]);
    let event = ledger.submitted_result().unwrap();
    assert_eq!(event.misbehaved_members, members(&[1, 2]));
    assert_eq!(event.member_index, member(3));
    assert!(memberships[&member(1)].is_err());
    assert!(memberships[&member(2)].is_err());
}

/// Test that a member sending undecryptable shares is disqualified.
pub async fn check_undecryptable_shares_disqualify_sender<
    C: Ciphersuite,
    R: RngCore + CryptoRng,
>(
    mut rng: R,
) {
    let config = Config::new(5, 3, 1).unwrap();
    let ledger = Arc::new(ticking_ledger(config));
    let interceptors = BTreeMap::from([(member(2), corrupting_shares::<C>())]);

    let memberships = run_group::<C, _, _>(ledger.clone(), interceptors, &mut rng).await;

    assert_members_stay(&memberships, &[1, 3, 4, 5]);
    let event = ledger.submitted_result().unwrap();
    assert_eq!(event.misbehaved_members, members(&[2]));
    assert!(memberships[&member(2)].is_err());
}

/// A ledger rejecting the submissions of some members, optionally claiming
/// every group is already registered. Accepted submissions are confirmed
/// `confirmation_blocks` after they were sent.
pub struct ScriptedLedger {
    inner: LocalLedger,
    rejected: Vec<MemberIndex>,
    registered: bool,
    confirmation_blocks: u64,
    attempts: Mutex<Vec<(MemberIndex, u64)>>,
    events: broadcast::Sender<DkgResultSubmittedEvent>,
}

impl ScriptedLedger {
    fn new(config: Config, rejected: Vec<MemberIndex>, registered: bool) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: ticking_ledger(config),
            rejected,
            registered,
            confirmation_blocks: 0,
            attempts: Mutex::new(Vec::new()),
            events,
        }
    }

    fn with_confirmation_blocks(mut self, blocks: u64) -> Self {
        self.confirmation_blocks = blocks;
        self
    }

    /// Every submission attempt with the block it was made at.
    fn attempts(&self) -> Vec<(MemberIndex, u64)> {
        self.attempts.lock().unwrap().clone()
    }

    /// Publish a submission event as if another group registered a result.
    fn announce(&self, event: DkgResultSubmittedEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    type BlockCounter = LocalBlockCounter;

    fn block_counter(&self) -> &LocalBlockCounter {
        self.inner.block_counter()
    }

    async fn submit_dkg_result(
        &self,
        member_index: MemberIndex,
        result: &ChainResult,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
    ) -> Result<(), ChainError> {
        let block = self.block_counter().current_block().await?;
        self.attempts.lock().unwrap().push((member_index, block));
        if self.rejected.contains(&member_index) {
            return Err(ChainError::Rejected("submitter is not eligible".into()));
        }
        self.block_counter()
            .wait_for_block_height(block + self.confirmation_blocks)
            .await?;
        self.inner
            .submit_dkg_result(member_index, result, signatures)
            .await?;
        if let Some(event) = self.inner.submitted_result() {
            self.announce(event);
        }
        Ok(())
    }

    async fn is_group_registered(&self, group_public_key: &[u8]) -> Result<bool, ChainError> {
        if self.registered {
            return Ok(true);
        }
        self.inner.is_group_registered(group_public_key).await
    }

    fn on_dkg_result_submitted(&self) -> broadcast::Receiver<DkgResultSubmittedEvent> {
        self.events.subscribe()
    }

    fn config(&self) -> Config {
        self.inner.config()
    }
}

/// Test that members submit in index order, one step apart: when the first
/// member's submission fails, the second submits one step later and the
/// first member learns its fate from the published result.
pub async fn check_submission_order<C: Ciphersuite, R: RngCore + CryptoRng>(mut rng: R) {
    let step = 3;
    let config = Config::new(5, 3, step).unwrap();
    let ledger = Arc::new(ScriptedLedger::new(config, vec![member(1)], false));

    let memberships = run_group::<C, _, _>(ledger.clone(), BTreeMap::new(), &mut rng).await;

    assert_members_stay(&memberships, &[1, 2, 3, 4, 5]);
    let event = ledger.inner.submitted_result().unwrap();
    assert_eq!(event.member_index, member(2));
    assert_eq!(event.block_number, submission_block(0, 2, step));
    assert_eq!(
        ledger.attempts(),
        vec![
            (member(1), submission_block(0, 1, step)),
            (member(2), submission_block(0, 2, step)),
        ]
    );

    assert!(matches!(
        memberships[&member(1)].as_ref().unwrap().outcome(),
        SubmissionOutcome::Failed(ChainError::Rejected(_))
    ));
    assert_eq!(
        memberships[&member(2)].as_ref().unwrap().outcome(),
        &SubmissionOutcome::Submitted
    );
    for index in 3..=5 {
        assert!(matches!(
            memberships[&member(index)].as_ref().unwrap().outcome(),
            SubmissionOutcome::Observed(event) if event.member_index == member(2)
        ));
    }
}

/// Test that a member whose submission fails and who never sees a published
/// result gives up at the publication timeout.
pub async fn check_publication_timeout<C: Ciphersuite, R: RngCore + CryptoRng>(mut rng: R) {
    let step = 2;
    let config = Config::new(3, 2, step).unwrap();
    let ledger = Arc::new(ScriptedLedger::new(config, members(&[1, 2, 3]), false));

    let memberships = run_group::<C, _, _>(ledger.clone(), BTreeMap::new(), &mut rng).await;

    let timeout_block = protocol_blocks() + publication_blocks() + 3 * step;
    for index in 1..=3 {
        assert!(matches!(
            memberships[&member(index)],
            Err(Error::ResultPublicationTimeout(block)) if block == timeout_block
        ));
    }
    assert!(ledger.inner.submitted_result().is_none());
}

/// Test that members who find the group already registered do not submit
/// it again and keep their membership.
pub async fn check_registered_group_is_not_resubmitted<C: Ciphersuite, R: RngCore + CryptoRng>(
    mut rng: R,
) {
    let config = Config::new(3, 2, 1).unwrap();
    let ledger = Arc::new(ScriptedLedger::new(config, Vec::new(), true));

    let memberships = run_group::<C, _, _>(ledger.clone(), BTreeMap::new(), &mut rng).await;

    assert_members_stay(&memberships, &[1, 2, 3]);
    for index in 1..=3 {
        assert_eq!(
            memberships[&member(index)].as_ref().unwrap().outcome(),
            &SubmissionOutcome::AlreadyRegistered
        );
    }
    assert!(ledger.attempts().is_empty());
    assert!(ledger.inner.submitted_result().is_none());
}

/// Test that member `i` attempts its submission exactly
/// `(i - 1) * step` blocks after the submission phase starts, when every
/// attempt is rejected.
pub async fn check_submission_eligibility<C: Ciphersuite, R: RngCore + CryptoRng>(mut rng: R) {
    let step = 2;
    let config = Config::new(5, 3, step).unwrap();
    let everyone = members(&[1, 2, 3, 4, 5]);
    let ledger = Arc::new(ScriptedLedger::new(config, everyone.clone(), false));

    let memberships = run_group::<C, _, _>(ledger.clone(), BTreeMap::new(), &mut rng).await;

    let mut attempts = ledger.attempts();
    attempts.sort();
    let expected: Vec<_> = (1..=5)
        .map(|index| (member(index), submission_block(0, index, step)))
        .collect();
    assert_eq!(attempts, expected);

    let timeout_block = protocol_blocks() + publication_blocks() + 5 * step;
    for index in everyone {
        assert!(matches!(
            memberships[&index],
            Err(Error::ResultPublicationTimeout(block)) if block == timeout_block
        ));
    }
}

/// Test that a result registered for another group does not end the
/// submission phase.
pub async fn check_other_group_submission_is_ignored<C: Ciphersuite, R: RngCore + CryptoRng>(
    mut rng: R,
) {
    let step = 4;
    let config = Config::new(5, 3, step).unwrap();
    let ledger =
        Arc::new(ScriptedLedger::new(config, Vec::new(), false).with_confirmation_blocks(2));

    // Lands while the first member's submission is pending.
    let announced_at = submission_block(0, 1, step) + 1;
    let announcer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .block_counter()
                .wait_for_block_height(announced_at)
                .await
                .unwrap();
            ledger.announce(DkgResultSubmittedEvent {
                member_index: member(3),
                group_public_key: vec![0x02; 33],
                misbehaved_members: Vec::new(),
                block_number: announced_at,
            });
        })
    };

    let memberships = run_group::<C, _, _>(ledger.clone(), BTreeMap::new(), &mut rng).await;
    announcer.await.unwrap();

    assert_members_stay(&memberships, &[1, 2, 3, 4, 5]);
    let event = ledger.inner.submitted_result().unwrap();
    assert_eq!(event.member_index, member(1));
    assert_eq!(event.block_number, announced_at + 1);
    for index in 2..=5 {
        assert!(matches!(
            memberships[&member(index)].as_ref().unwrap().outcome(),
            SubmissionOutcome::Observed(event) if event.member_index == member(1)
        ));
    }
}
