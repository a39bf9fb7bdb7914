//! Chain module - the narrow interface the coordinator uses to reach a network
//!
//! This module provides:
//! - The `ChainClient` capability trait, one implementation per network
//! - An EVM client with multi-RPC failover and retrying submission
//! - An in-process simulated chain for local runs and tests

pub mod provider;
pub mod simulated;

pub use provider::EvmChainClient;
pub use simulated::SimulatedChain;

use crate::error::BridgeResult;
use crate::types::{Amount, ChainId, TransferKind};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde::Serialize;

/// A bridge contract call to execute on a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOperation {
    pub kind: TransferKind,
    pub token: Address,
    pub amount: Amount,
    /// Recipient of the released or minted funds, or the depositor for
    /// lock and burn
    pub counterparty: Address,
    /// The other side of the transfer
    pub counterpart_chain: ChainId,
}

/// Outcome of a submitted chain transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Not yet mined
    Pending,
    Success,
    Reverted,
}

/// Capability interface for one network. Retries and failover are the
/// implementation's concern; callers see a single result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// Submit an operation and return its transaction hash
    async fn submit(&self, operation: ChainOperation) -> BridgeResult<H256>;

    async fn receipt_status(&self, hash: H256) -> BridgeResult<ReceiptStatus>;

    /// Current gas price in wei
    async fn gas_price(&self) -> BridgeResult<U256>;

    async fn block_number(&self) -> BridgeResult<u64>;

    async fn health_check(&self) -> bool;
}
