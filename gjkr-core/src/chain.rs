//! Ledger-facing collaborators: the block counter, result submission and
//! operator signing.

use alloc::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    config::Config,
    error::ChainError,
    group::MemberIndex,
    result::{ChainResult, DkgResultSubmittedEvent},
};

/// Observes the height of the ledger.
#[async_trait]
pub trait BlockCounter: Send + Sync {
    /// The current block height.
    async fn current_block(&self) -> Result<u64, ChainError>;

    /// Resolves once the ledger reaches `height`. Returns immediately if it
    /// already has.
    async fn wait_for_block_height(&self, height: u64) -> Result<(), ChainError>;
}

/// The ledger the result is published to.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// The block counter type of this ledger.
    type BlockCounter: BlockCounter;

    /// The block counter of this ledger.
    fn block_counter(&self) -> &Self::BlockCounter;

    /// Submit a result on behalf of `member_index`, with the signatures of
    /// the members supporting it.
    async fn submit_dkg_result(
        &self,
        member_index: MemberIndex,
        result: &ChainResult,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
    ) -> Result<(), ChainError>;

    /// Whether a group with the given public key is already registered.
    async fn is_group_registered(&self, group_public_key: &[u8]) -> Result<bool, ChainError>;

    /// Subscribe to result submissions. Dropping the receiver unsubscribes.
    fn on_dkg_result_submitted(&self) -> broadcast::Receiver<DkgResultSubmittedEvent>;

    /// The protocol parameters.
    fn config(&self) -> Config;
}

/// Operator signing used to endorse a result hash.
pub trait Signing: Send + Sync {
    /// The operator public key.
    fn public_key(&self) -> Vec<u8>;

    /// Sign `message` with the operator key.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ChainError>;

    /// Verify `signature` over `message` against `public_key`.
    fn verify_with_public_key(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, ChainError>;
}
