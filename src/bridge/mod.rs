//! Bridge facade: the operations a caller can perform on one bridge instance
//!
//! `Bridge` composes the asset registry, ledger, validator set, security
//! policy and route optimizer behind the `BridgeFacade` capability trait.
//! `BridgeEngine` drives pending transfers to completion in the background.

mod coordinator;
mod engine;

pub use coordinator::{Bridge, BridgeOptions, BridgeStatus};
pub use engine::BridgeEngine;

#[cfg(test)]
pub(crate) use coordinator::tests::{bridge_with, LOCAL, REMOTE};

use crate::consensus::ValidatorInfo;
use crate::error::BridgeResult;
use crate::ledger::TransactionStatus;
use crate::routing::SecurityLevel;
use crate::types::{Amount, ChainId};

use async_trait::async_trait;
use ethers::types::{Address, H256};

/// A caller's request to move `amount` of `symbol`
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub symbol: String,
    pub amount: Amount,
    pub sender: Address,
    pub recipient: Address,
    /// The chain on the other side: the destination for lock and burn, the
    /// origin for mint and unlock
    pub counterpart_chain: ChainId,
    pub min_security: SecurityLevel,
    /// Highest bridge fee the caller accepts
    pub max_fee: Option<Amount>,
}

impl TransferRequest {
    pub fn new(
        symbol: impl Into<String>,
        amount: Amount,
        sender: Address,
        recipient: Address,
        counterpart_chain: ChainId,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            sender,
            recipient,
            counterpart_chain,
            min_security: SecurityLevel::Low,
            max_fee: None,
        }
    }
}

/// Uniform surface of a bridge instance, one per network
#[async_trait]
pub trait BridgeFacade: Send + Sync {
    /// One-time setup; a second call fails
    async fn initialize(&self) -> BridgeResult<()>;
    async fn is_initialized(&self) -> bool;

    async fn register_asset(&self, symbol: &str, token_address: Address) -> BridgeResult<()>;
    async fn unregister_asset(&self, symbol: &str) -> BridgeResult<()>;
    async fn is_asset_supported(&self, symbol: &str) -> bool;

    async fn lock_tokens(&self, request: TransferRequest) -> BridgeResult<H256>;
    async fn unlock_tokens(&self, request: TransferRequest) -> BridgeResult<H256>;
    async fn mint_tokens(&self, request: TransferRequest) -> BridgeResult<H256>;
    async fn burn_tokens(&self, request: TransferRequest) -> BridgeResult<H256>;

    async fn get_transaction_status(&self, hash: H256) -> BridgeResult<TransactionStatus>;
    /// Hashes still PENDING, in no particular order
    async fn get_pending_transactions(&self) -> Vec<H256>;
    /// Drive a PENDING transaction as far as chain and consensus state allow
    async fn process_transaction(&self, hash: H256) -> BridgeResult<TransactionStatus>;

    async fn add_validator(&self, address: Address, stake: Amount) -> BridgeResult<()>;
    async fn remove_validator(&self, address: Address) -> BridgeResult<()>;
    async fn is_validator(&self, address: Address) -> bool;
    async fn get_validators(&self) -> Vec<ValidatorInfo>;

    async fn pause(&self) -> BridgeResult<()>;
    async fn unpause(&self) -> BridgeResult<()>;
    /// Withdraw the whole locked balance of `symbol`; only while paused
    async fn emergency_withdraw(&self, symbol: &str) -> BridgeResult<H256>;
}
