//! In-process chain for local runs and tests
//!
//! Submissions receive deterministic hashes and stay pending until settled,
//! unless auto-confirm is on.

use super::{ChainClient, ChainOperation, ReceiptStatus};
use crate::error::{BridgeError, BridgeResult};
use crate::types::ChainId;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{H256, U256};
use sha3::{Digest, Keccak256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub struct SimulatedChain {
    chain_id: ChainId,
    nonce: AtomicU64,
    gas_price_wei: AtomicU64,
    auto_confirm: AtomicBool,
    offline: AtomicBool,
    submissions: DashMap<H256, (ChainOperation, ReceiptStatus)>,
}

impl SimulatedChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            nonce: AtomicU64::new(0),
            gas_price_wei: AtomicU64::new(25_000_000_000),
            auto_confirm: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            submissions: DashMap::new(),
        }
    }

    /// Mark every future submission successful as soon as it is sent
    pub fn with_auto_confirm(self, enabled: bool) -> Self {
        self.auto_confirm.store(enabled, Ordering::Relaxed);
        self
    }

    pub fn set_gas_price(&self, wei: u64) {
        self.gas_price_wei.store(wei, Ordering::Relaxed);
    }

    /// Make every call fail as if the RPC endpoint were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Resolve a pending submission
    pub fn settle(&self, hash: H256, success: bool) -> BridgeResult<()> {
        let mut entry = self
            .submissions
            .get_mut(&hash)
            .ok_or(BridgeError::TransactionNotFound { hash })?;
        entry.1 = if success {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Reverted
        };
        debug!("Simulated chain {} settled {:?}: {:?}", self.chain_id, hash, entry.1);
        Ok(())
    }

    pub fn operation(&self, hash: &H256) -> Option<ChainOperation> {
        self.submissions.get(hash).map(|e| e.0.clone())
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    fn ensure_online(&self) -> BridgeResult<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(BridgeError::Chain {
                chain_id: self.chain_id,
                message: "simulated endpoint offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn submit(&self, operation: ChainOperation) -> BridgeResult<H256> {
        self.ensure_online()?;
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);

        let mut hasher = Keccak256::new();
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(operation.kind.as_str().as_bytes());
        let hash = H256::from_slice(&hasher.finalize());

        let status = if self.auto_confirm.load(Ordering::Relaxed) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Pending
        };
        debug!(
            "Simulated chain {} accepted {} of {} as {:?}",
            self.chain_id, operation.kind, operation.amount, hash
        );
        self.submissions.insert(hash, (operation, status));
        Ok(hash)
    }

    async fn receipt_status(&self, hash: H256) -> BridgeResult<ReceiptStatus> {
        self.ensure_online()?;
        self.submissions
            .get(&hash)
            .map(|e| e.1)
            .ok_or_else(|| BridgeError::Chain {
                chain_id: self.chain_id,
                message: format!("unknown transaction {:?}", hash),
            })
    }

    async fn gas_price(&self) -> BridgeResult<U256> {
        self.ensure_online()?;
        Ok(U256::from(self.gas_price_wei.load(Ordering::Relaxed)))
    }

    async fn block_number(&self) -> BridgeResult<u64> {
        self.ensure_online()?;
        Ok(self.nonce.load(Ordering::Relaxed))
    }

    async fn health_check(&self) -> bool {
        !self.offline.load(Ordering::Relaxed)
    }
}
