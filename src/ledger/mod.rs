//! Append-only transaction ledger and lifecycle state machine
//!
//! Every transfer enters as PENDING and leaves exactly once, into one of the
//! success terminals, FAILED or CANCELLED. A caller must hold a
//! [`ProcessingClaim`] to move an entry out of PENDING; claims are exclusive
//! per hash, so two concurrent processors can never both transition it.

mod transaction;

pub use transaction::{BridgeTransaction, TransactionStatus};

use crate::consensus::Attestation;
use crate::error::{BridgeError, BridgeResult};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use ethers::types::H256;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Exclusive right to transition one PENDING entry. Released on drop.
pub struct ProcessingClaim {
    hash: H256,
    in_flight: Arc<DashSet<H256>>,
}

impl ProcessingClaim {
    pub fn hash(&self) -> H256 {
        self.hash
    }
}

impl Drop for ProcessingClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.hash);
    }
}

/// Ledger counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub pending: u64,
    pub locked: u64,
    pub minted: u64,
    pub burned: u64,
    pub unlocked: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub archived: u64,
}

pub struct TransactionLedger {
    transactions: RwLock<HashMap<H256, BridgeTransaction>>,
    /// Terminal entries past the retention period
    archive: RwLock<HashMap<H256, BridgeTransaction>>,
    in_flight: Arc<DashSet<H256>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            archive: RwLock::new(HashMap::new()),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Record a new PENDING transaction
    pub async fn insert(&self, tx: BridgeTransaction) -> BridgeResult<()> {
        if tx.status != TransactionStatus::Pending {
            return Err(BridgeError::InvalidStateTransition {
                hash: tx.hash,
                from: "none".to_string(),
                to: tx.status.to_string(),
            });
        }

        let mut txs = self.transactions.write().await;
        if txs.contains_key(&tx.hash) || self.archive.read().await.contains_key(&tx.hash) {
            return Err(BridgeError::DuplicateTransaction { hash: tx.hash });
        }

        debug!(
            "Recorded {} of {} {} as {:?}",
            tx.kind, tx.amount, tx.symbol, tx.hash
        );
        txs.insert(tx.hash, tx);
        Ok(())
    }

    /// Look up a transaction, including archived ones
    pub async fn get(&self, hash: &H256) -> BridgeResult<BridgeTransaction> {
        if let Some(tx) = self.transactions.read().await.get(hash) {
            return Ok(tx.clone());
        }
        self.archive
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or(BridgeError::TransactionNotFound { hash: *hash })
    }

    pub async fn status(&self, hash: &H256) -> BridgeResult<TransactionStatus> {
        Ok(self.get(hash).await?.status)
    }

    /// Hashes currently PENDING, in no particular order
    pub async fn pending_hashes(&self) -> Vec<H256> {
        self.transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.is_pending())
            .map(|tx| tx.hash)
            .collect()
    }

    pub async fn pending(&self) -> Vec<BridgeTransaction> {
        self.transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.is_pending())
            .cloned()
            .collect()
    }

    /// Attach a validator attestation to a PENDING transaction.
    ///
    /// Returns false when the same validator already attested this hash.
    pub async fn add_attestation(&self, attestation: Attestation) -> BridgeResult<bool> {
        let mut txs = self.transactions.write().await;
        let tx = txs
            .get_mut(&attestation.tx_hash)
            .ok_or(BridgeError::TransactionNotFound {
                hash: attestation.tx_hash,
            })?;
        ensure_pending(tx)?;

        if tx
            .validator_signatures
            .iter()
            .any(|existing| existing.validator == attestation.validator)
        {
            return Ok(false);
        }
        tx.validator_signatures.push(attestation);
        Ok(true)
    }

    /// Take the exclusive processing claim for a PENDING hash
    pub async fn claim(&self, hash: &H256) -> BridgeResult<ProcessingClaim> {
        ensure_pending(&self.get(hash).await?)?;

        if !self.in_flight.insert(*hash) {
            return Err(BridgeError::AlreadyProcessing { hash: *hash });
        }
        let claim = ProcessingClaim {
            hash: *hash,
            in_flight: self.in_flight.clone(),
        };

        // a previous claimant may have finished between the check and the insert
        ensure_pending(&self.get(hash).await?)?;
        Ok(claim)
    }

    /// Move a claimed PENDING entry into a terminal state
    pub async fn transition(
        &self,
        claim: &ProcessingClaim,
        to: TransactionStatus,
        now: DateTime<Utc>,
    ) -> BridgeResult<BridgeTransaction> {
        let mut txs = self.transactions.write().await;
        let tx = txs
            .get_mut(&claim.hash)
            .ok_or(BridgeError::TransactionNotFound { hash: claim.hash })?;

        if tx.status.is_terminal() || !to.is_terminal() {
            return Err(BridgeError::InvalidStateTransition {
                hash: tx.hash,
                from: tx.status.to_string(),
                to: to.to_string(),
            });
        }

        info!("Transaction {:?}: {} -> {}", tx.hash, tx.status, to);
        tx.status = to;
        tx.updated_at = now;
        Ok(tx.clone())
    }

    /// PENDING hashes whose deadline has passed
    pub async fn expired(&self, now: DateTime<Utc>) -> Vec<H256> {
        self.transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.is_expired(now))
            .map(|tx| tx.hash)
            .collect()
    }

    /// Move terminal entries last updated before `cutoff` into the archive
    pub async fn archive_terminal(&self, cutoff: DateTime<Utc>) -> usize {
        let mut txs = self.transactions.write().await;
        let to_archive: Vec<H256> = txs
            .values()
            .filter(|tx| tx.status.is_terminal() && tx.updated_at < cutoff)
            .map(|tx| tx.hash)
            .collect();

        let mut archive = self.archive.write().await;
        for hash in &to_archive {
            if let Some(tx) = txs.remove(hash) {
                archive.insert(*hash, tx);
            }
        }

        if !to_archive.is_empty() {
            info!("Archived {} terminal transactions", to_archive.len());
        }
        to_archive.len()
    }

    pub async fn stats(&self) -> LedgerStats {
        let txs = self.transactions.read().await;
        let mut stats = LedgerStats {
            archived: self.archive.read().await.len() as u64,
            ..Default::default()
        };
        for tx in txs.values() {
            let counter = match tx.status {
                TransactionStatus::Pending => &mut stats.pending,
                TransactionStatus::Locked => &mut stats.locked,
                TransactionStatus::Minted => &mut stats.minted,
                TransactionStatus::Burned => &mut stats.burned,
                TransactionStatus::Unlocked => &mut stats.unlocked,
                TransactionStatus::Failed => &mut stats.failed,
                TransactionStatus::Cancelled => &mut stats.cancelled,
            };
            *counter += 1;
        }
        stats
    }
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_pending(tx: &BridgeTransaction) -> BridgeResult<()> {
    if !tx.is_pending() {
        return Err(BridgeError::NotPending {
            hash: tx.hash,
            status: tx.status.to_string(),
        });
    }
    Ok(())
}
