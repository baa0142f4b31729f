//! In-memory collaborators: a block counter, a ledger, a broadcast network
//! and an operator signer.
//!
//! They implement the collaborator traits without any external system and
//! back the tests and local simulations of the protocol.

use alloc::collections::BTreeMap;
use core::{fmt, time::Duration};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand_core::{CryptoRng, RngCore};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    chain::{BlockCounter, Ledger, Signing},
    config::Config,
    error::{ChainError, NetError},
    group::MemberIndex,
    messages::{Message, NetMessage},
    net::BroadcastChannel,
    result::{ChainResult, DkgResultSubmittedEvent},
    serialization::{Deserialize, SerializableElement, SerializableScalar, Serialize},
    Ciphersuite, Field, Group,
};

const CHANNEL_CAPACITY: usize = 1024;
const EVENT_CAPACITY: usize = 16;

/// A block counter whose height is advanced by a timer or by hand.
pub struct LocalBlockCounter {
    height: Arc<watch::Sender<u64>>,
    ticker: Option<JoinHandle<()>>,
}

impl LocalBlockCounter {
    /// A counter at height 0 that only moves through
    /// [`LocalBlockCounter::advance`].
    pub fn new() -> Self {
        let (height, _) = watch::channel(0);
        Self {
            height: Arc::new(height),
            ticker: None,
        }
    }

    /// A counter at height 0 that mines a block every `block_time`. Must be
    /// called within a tokio runtime.
    pub fn with_block_time(block_time: Duration) -> Self {
        let (height, _) = watch::channel(0);
        let height = Arc::new(height);
        let sender = height.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(block_time);
            interval.tick().await;
            loop {
                interval.tick().await;
                sender.send_modify(|height| *height += 1);
            }
        });
        Self {
            height,
            ticker: Some(ticker),
        }
    }

    /// Mine `blocks` blocks.
    pub fn advance(&self, blocks: u64) {
        self.height.send_modify(|height| *height += blocks);
    }
}

impl Default for LocalBlockCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalBlockCounter {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl fmt::Debug for LocalBlockCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBlockCounter")
            .field("height", &*self.height.borrow())
            .finish()
    }
}

#[async_trait]
impl BlockCounter for LocalBlockCounter {
    async fn current_block(&self) -> Result<u64, ChainError> {
        Ok(*self.height.borrow())
    }

    async fn wait_for_block_height(&self, height: u64) -> Result<(), ChainError> {
        let mut receiver = self.height.subscribe();
        receiver
            .wait_for(|current| *current >= height)
            .await
            .map_err(|_| ChainError::BlockCounterClosed)?;
        Ok(())
    }
}

#[derive(Default)]
struct LedgerState {
    submitted: Option<DkgResultSubmittedEvent>,
    registered_groups: Vec<Vec<u8>>,
}

/// A ledger accepting a single DKG result.
pub struct LocalLedger {
    block_counter: LocalBlockCounter,
    config: Config,
    state: Mutex<LedgerState>,
    events: broadcast::Sender<DkgResultSubmittedEvent>,
}

impl LocalLedger {
    /// Create a ledger with the given parameters and block counter.
    pub fn new(config: Config, block_counter: LocalBlockCounter) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            block_counter,
            config,
            state: Mutex::new(LedgerState::default()),
            events,
        }
    }

    /// The accepted submission, if any.
    pub fn submitted_result(&self) -> Option<DkgResultSubmittedEvent> {
        self.lock_state().submitted.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    type BlockCounter = LocalBlockCounter;

    fn block_counter(&self) -> &LocalBlockCounter {
        &self.block_counter
    }

    async fn submit_dkg_result(
        &self,
        member_index: MemberIndex,
        result: &ChainResult,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
    ) -> Result<(), ChainError> {
        let block_number = self.block_counter.current_block().await?;

        let event = {
            let mut state = self.lock_state();
            if state.submitted.is_some() {
                return Err(ChainError::AlreadySubmitted);
            }
            if signatures.len() < self.config.signature_threshold() {
                return Err(ChainError::Rejected(format!(
                    "{} signatures below threshold {}",
                    signatures.len(),
                    self.config.signature_threshold()
                )));
            }

            let event = DkgResultSubmittedEvent {
                member_index,
                group_public_key: result.group_public_key().to_vec(),
                misbehaved_members: result.misbehaved_members().to_vec(),
                block_number,
            };
            state.submitted = Some(event.clone());
            state
                .registered_groups
                .push(result.group_public_key().to_vec());
            event
        };

        info!(member = %member_index, block = block_number, "DKG result accepted");
        // Nobody listening is not an error.
        let _ = self.events.send(event);
        Ok(())
    }

    async fn is_group_registered(&self, group_public_key: &[u8]) -> Result<bool, ChainError> {
        Ok(self
            .lock_state()
            .registered_groups
            .iter()
            .any(|registered| registered.as_slice() == group_public_key))
    }

    fn on_dkg_result_submitted(&self) -> broadcast::Receiver<DkgResultSubmittedEvent> {
        self.events.subscribe()
    }

    fn config(&self) -> Config {
        self.config
    }
}

/// Rewrites or drops a message before it is broadcast.
pub type Interceptor<C> = Arc<dyn Fn(Message<C>) -> Option<Message<C>> + Send + Sync>;

/// An in-memory broadcast network. Every message is encoded and decoded on
/// its way, like on a real transport.
pub struct LocalNetwork<C: Ciphersuite> {
    subscribers: Mutex<Vec<mpsc::Sender<NetMessage<C>>>>,
}

impl<C> LocalNetwork<C>
where
    C: Ciphersuite,
{
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// A channel sending with the operator key `public_key`.
    pub fn channel(self: &Arc<Self>, public_key: Vec<u8>) -> LocalChannel<C> {
        LocalChannel {
            network: self.clone(),
            public_key,
            interceptor: None,
        }
    }

    async fn deliver(&self, message: &Message<C>, sender_public_key: &[u8]) -> Result<(), NetError> {
        let bytes = message.serialize().map_err(|_| NetError::Encoding)?;
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for subscriber in subscribers {
            // Every receiver decodes its own copy.
            let Ok(decoded) = Message::deserialize(&bytes) else {
                return Err(NetError::Encoding);
            };
            // A closed subscriber left the network.
            let _ = subscriber
                .send(NetMessage::new(decoded, sender_public_key.to_vec()))
                .await;
        }

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| !subscriber.is_closed());
        Ok(())
    }
}

/// One member's handle on a [`LocalNetwork`].
pub struct LocalChannel<C: Ciphersuite> {
    network: Arc<LocalNetwork<C>>,
    public_key: Vec<u8>,
    interceptor: Option<Interceptor<C>>,
}

impl<C> LocalChannel<C>
where
    C: Ciphersuite,
{
    /// Pass every outgoing message through `interceptor`.
    pub fn with_interceptor(mut self, interceptor: Interceptor<C>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }
}

#[async_trait]
impl<C> BroadcastChannel<C> for LocalChannel<C>
where
    C: Ciphersuite,
{
    async fn send(&self, message: Message<C>) -> Result<(), NetError> {
        let message = match &self.interceptor {
            Some(interceptor) => match interceptor(message) {
                Some(message) => message,
                None => {
                    debug!("message dropped by interceptor");
                    return Ok(());
                }
            },
            None => message,
        };
        self.network.deliver(&message, &self.public_key).await
    }

    fn subscribe(&self) -> mpsc::Receiver<NetMessage<C>> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        self.network
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "C: Ciphersuite")]
struct SchnorrSignature<C: Ciphersuite> {
    commitment: SerializableElement<C>,
    response: SerializableScalar<C>,
}

/// Schnorr signatures over the ciphersuite group, used as operator keys.
pub struct LocalSigner<C: Ciphersuite> {
    private_key: SerializableScalar<C>,
    public_key: SerializableElement<C>,
}

impl<C> LocalSigner<C>
where
    C: Ciphersuite,
{
    /// Generate a fresh operator key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let private_key = loop {
            let scalar = <<C::Group as Group>::Field>::random(rng);
            if scalar != <<C::Group as Group>::Field>::zero() {
                break scalar;
            }
        };
        Self {
            private_key: SerializableScalar(private_key),
            public_key: SerializableElement(<C::Group>::generator() * private_key),
        }
    }

    fn challenge(commitment: &[u8], public_key: &[u8], message: &[u8]) -> crate::Scalar<C> {
        let mut preimage = Vec::with_capacity(commitment.len() + public_key.len() + message.len());
        preimage.extend_from_slice(commitment);
        preimage.extend_from_slice(public_key);
        preimage.extend_from_slice(message);
        C::H1(&preimage)
    }
}

impl<C> Signing for LocalSigner<C>
where
    C: Ciphersuite,
{
    fn public_key(&self) -> Vec<u8> {
        // Never the identity: the private key is non-zero.
        self.public_key.serialize().unwrap_or_default()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ChainError> {
        let signing_error = |_| ChainError::Signing("cannot encode signature".into());
        let public_key = self.public_key.serialize().map_err(signing_error)?;

        let mut nonce_preimage = self.private_key.serialize();
        nonce_preimage.extend_from_slice(message);
        let nonce = C::H1(&nonce_preimage);

        let commitment = SerializableElement::<C>(<C::Group>::generator() * nonce);
        let commitment_bytes = commitment.serialize().map_err(signing_error)?;
        let challenge = Self::challenge(&commitment_bytes, &public_key, message);
        let response = nonce + challenge * self.private_key.0;

        Serialize::serialize(&SchnorrSignature {
            commitment,
            response: SerializableScalar(response),
        })
        .map_err(signing_error)
    }

    fn verify_with_public_key(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, ChainError> {
        let Ok(signature) = <SchnorrSignature<C> as Deserialize>::deserialize(signature) else {
            return Ok(false);
        };
        let Ok(verifying_key) = SerializableElement::<C>::deserialize(public_key) else {
            return Ok(false);
        };
        let Ok(commitment_bytes) = signature.commitment.serialize() else {
            return Ok(false);
        };

        let challenge = Self::challenge(&commitment_bytes, public_key, message);
        Ok(<C::Group>::generator() * signature.response.0
            == signature.commitment.0 + verifying_key.0 * challenge)
    }
}
