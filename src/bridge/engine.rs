//! Background loop driving PENDING transfers to a terminal state

use super::{Bridge, BridgeFacade};
use crate::config::BridgeConfig;
use crate::consensus::Validator;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::TransactionStatus;

use chrono::Utc;
use ethers::types::H256;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

pub struct BridgeEngine {
    bridge: Arc<Bridge>,
    /// Validator hosted by this process, if any; attests inbound transfers
    attester: Option<Arc<Validator>>,
    process_interval: Duration,
    sweep_interval: Duration,
    shutdown: Arc<RwLock<bool>>,
}

impl BridgeEngine {
    pub fn new(bridge: Arc<Bridge>, attester: Option<Arc<Validator>>, config: &BridgeConfig) -> Self {
        Self {
            bridge,
            attester,
            process_interval: Duration::from_millis(config.process_interval_ms.max(1)),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Main processing loop
    pub async fn run(&self) -> BridgeResult<()> {
        let mut process_interval = interval(self.process_interval);
        let mut sweep_interval = interval(self.sweep_interval);

        info!("Bridge engine started for {}", self.bridge.instance_id());

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                _ = process_interval.tick() => {
                    if let Err(e) = self.process_round().await {
                        error!("Error processing pending transactions: {}", e);
                    }
                }

                _ = sweep_interval.tick() => {
                    self.maintenance().await;
                }
            }
        }

        info!("Bridge engine stopped");
        Ok(())
    }

    /// Attest, plan and process everything currently PENDING.
    /// Returns the transactions that reached a terminal state.
    pub async fn process_round(&self) -> BridgeResult<Vec<(H256, TransactionStatus)>> {
        if let Some(attester) = &self.attester {
            self.attest_pending(attester).await;
        }

        let mut finished = Vec::new();
        for batch in self.bridge.plan_pending().await? {
            debug!(
                "Processing batch {} of {} {} transfers via {}",
                batch.id,
                batch.transactions.len(),
                batch.symbol,
                batch.route
            );
            for hash in batch.transactions {
                match self.bridge.process_transaction(hash).await {
                    Ok(TransactionStatus::Pending) => {}
                    Ok(status) => finished.push((hash, status)),
                    Err(e @ BridgeError::NotPending { .. })
                    | Err(e @ BridgeError::AlreadyProcessing { .. }) => {
                        debug!("Skipping {:?}: {}", hash, e);
                    }
                    Err(e) if e.is_retryable() => {
                        warn!("Retryable error processing {:?}: {}", hash, e);
                    }
                    Err(e) => {
                        error!("Failed to process {:?}: {}", hash, e);
                    }
                }
            }
        }
        Ok(finished)
    }

    async fn attest_pending(&self, attester: &Validator) {
        for tx in self.bridge.pending_transactions().await {
            if !tx.kind.requires_consensus() || attester.get_signature(&tx.hash).await.is_ok() {
                continue;
            }
            let attestation = match attester.sign(tx.hash).await {
                Ok(attestation) => attestation,
                Err(e) => {
                    debug!("Local validator cannot attest {:?}: {}", tx.hash, e);
                    return;
                }
            };
            if let Err(e) = self.bridge.submit_attestation(attestation).await {
                warn!("Attestation for {:?} rejected: {}", tx.hash, e);
            }
        }
    }

    /// Timeout sweep, archival and chain health
    pub async fn maintenance(&self) {
        let now = Utc::now();
        let cancelled = self.bridge.sweep_expired_at(now).await;
        if !cancelled.is_empty() {
            warn!("Cancelled {} expired transactions", cancelled.len());
        }

        let pruned = self.bridge.security().prune_history_at(now).await;
        if pruned > 0 {
            debug!("Pruned {} idle rate-limit windows", pruned);
        }

        let archived = self.bridge.archive_at(now).await;
        if archived > 0 {
            debug!("Archived {} terminal transactions", archived);
        }

        if !self.bridge.chain_healthy().await {
            warn!("Chain {} failed its health check", self.bridge.chain_id());
        }
        crate::metrics::record_pending_transactions(
            self.bridge.get_pending_transactions().await.len() as u64,
        );
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Bridge engine shutdown initiated");
    }
}
