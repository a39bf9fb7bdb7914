//! Bridge instance composing registry, ledger, consensus, security and routing

use super::{BridgeFacade, TransferRequest};
use crate::chain::{ChainClient, ChainOperation, ReceiptStatus};
use crate::config::Settings;
use crate::consensus::{Attestation, SlashOrigin, ValidatorInfo, ValidatorSet};
use crate::error::{BridgeError, BridgeResult, ValidationError};
use crate::ledger::{BridgeTransaction, LedgerStats, TransactionLedger, TransactionStatus};
use crate::registry::{Asset, AssetRegistry};
use crate::routing::{
    plan_batches, Batch, GasEstimator, RouteOptimizer, RouteQuote, RouteRequest, TransferCandidate,
    DIRECT_ROUTE,
};
use crate::security::{self, SecurityPolicy, TokenPolicy};
use crate::types::{Amount, ChainId, TransferKind};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ethers::types::{Address, H256};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-instance tuning
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub instance_id: String,
    pub pending_deadline_secs: u64,
    pub archive_retention_secs: u64,
    pub gas_per_transfer: u64,
    pub gas_buffer_percent: u64,
}

impl BridgeOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            instance_id: settings.bridge.instance_id.clone(),
            pending_deadline_secs: settings.bridge.pending_deadline_secs,
            archive_retention_secs: settings.bridge.archive_retention_secs,
            gas_per_transfer: settings.routing.gas_per_transfer,
            gas_buffer_percent: settings.routing.gas_buffer_percent,
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            instance_id: "bridge".to_string(),
            pending_deadline_secs: 3600,
            archive_retention_secs: 7 * 86_400,
            gas_per_transfer: 150_000,
            gas_buffer_percent: 20,
        }
    }
}

/// Snapshot served by the status API
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub instance_id: String,
    pub chain_id: ChainId,
    pub initialized: bool,
    pub paused: bool,
    pub emergency: bool,
    pub multisig_threshold: usize,
    pub assets: usize,
    pub active_validators: usize,
    pub ledger: LedgerStats,
}

pub struct Bridge {
    options: BridgeOptions,
    chain: Arc<dyn ChainClient>,
    registry: AssetRegistry,
    ledger: TransactionLedger,
    validators: Arc<ValidatorSet>,
    security: Arc<SecurityPolicy>,
    token_policy: Arc<TokenPolicy>,
    router: Arc<RouteOptimizer>,
    gas: GasEstimator,
    initialized: AtomicBool,
    paused: AtomicBool,
}

impl Bridge {
    pub fn new(
        options: BridgeOptions,
        chain: Arc<dyn ChainClient>,
        security: Arc<SecurityPolicy>,
        token_policy: Arc<TokenPolicy>,
        router: Arc<RouteOptimizer>,
    ) -> Self {
        let gas = GasEstimator::new(options.gas_per_transfer, options.gas_buffer_percent);
        Self {
            options,
            chain,
            registry: AssetRegistry::new(),
            ledger: TransactionLedger::new(),
            validators: Arc::new(ValidatorSet::new()),
            security,
            token_policy,
            router,
            gas,
            initialized: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    pub fn instance_id(&self) -> &str {
        &self.options.instance_id
    }

    /// Shared with locally hosted validators so they can sign
    pub fn validator_set(&self) -> Arc<ValidatorSet> {
        self.validators.clone()
    }

    pub fn security(&self) -> &Arc<SecurityPolicy> {
        &self.security
    }

    pub fn router(&self) -> &Arc<RouteOptimizer> {
        &self.router
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> BridgeResult<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(BridgeError::NotInitialized);
        }
        Ok(())
    }

    fn ensure_running(&self) -> BridgeResult<()> {
        self.ensure_initialized()?;
        if self.is_paused() {
            return Err(BridgeError::Paused);
        }
        Ok(())
    }

    /// (source, target) of a transfer executed on this instance's chain
    fn direction(&self, kind: TransferKind, counterpart: ChainId) -> (ChainId, ChainId) {
        match kind {
            TransferKind::Lock | TransferKind::Burn => (self.chain_id(), counterpart),
            _ => (counterpart, self.chain_id()),
        }
    }

    /// Price a transfer without submitting it
    pub async fn quote(&self, kind: TransferKind, request: &TransferRequest) -> BridgeResult<RouteQuote> {
        let (source_chain, target_chain) = self.direction(kind, request.counterpart_chain);
        self.router
            .select_route(&RouteRequest {
                symbol: request.symbol.clone(),
                amount: request.amount,
                source_chain,
                target_chain,
                min_security: request.min_security,
                max_fee: request.max_fee,
            })
            .await
    }

    async fn transfer(&self, kind: TransferKind, request: TransferRequest) -> BridgeResult<H256> {
        self.ensure_running()?;
        let now = Utc::now();
        let symbol = request.symbol.clone();
        let amount = request.amount;

        if amount.is_zero() {
            return Err(BridgeError::TransferLimit {
                symbol,
                bound: "non-zero amount",
                amount: "0".to_string(),
                limit: "1".to_string(),
            });
        }

        let asset = self.registry.get(&symbol).await?;
        asset.ensure_active()?;

        let quote = self.quote(kind, &request).await?;
        let (source_chain, target_chain) = (quote.source_chain, quote.target_chain);

        let gas_price = self.chain.gas_price().await?;
        self.security
            .check_transfer_at(request.sender, request.recipient, amount, gas_price, now)
            .await?;

        self.registry.reserve(&symbol, kind, amount).await?;
        if let Err(e) = self.token_policy.admit_at(&symbol, amount, now).await {
            self.release_reservation(&symbol, kind, amount).await;
            return Err(e);
        }

        let counterparty = match kind {
            TransferKind::Lock | TransferKind::Burn => request.sender,
            _ => request.recipient,
        };
        let operation = ChainOperation {
            kind,
            token: asset.token_address,
            amount,
            counterparty,
            counterpart_chain: request.counterpart_chain,
        };
        let hash = match self.chain.submit(operation).await {
            Ok(hash) => hash,
            Err(e) => {
                self.unwind(&symbol, kind, amount, now).await;
                return Err(e);
            }
        };

        let deadline_secs = self
            .router
            .pending_deadline_for(&quote.route)
            .unwrap_or(self.options.pending_deadline_secs);
        let tx = BridgeTransaction {
            hash,
            kind,
            symbol: symbol.clone(),
            amount,
            sender: request.sender,
            recipient: request.recipient,
            source_chain,
            target_chain,
            route: Some(quote.route.clone()),
            timestamp: now,
            deadline: now + Duration::seconds(deadline_secs as i64),
            status: TransactionStatus::Pending,
            updated_at: now,
            validator_signatures: Vec::new(),
        };
        if let Err(e) = self.ledger.insert(tx).await {
            self.unwind(&symbol, kind, amount, now).await;
            return Err(e);
        }

        crate::metrics::record_transfer_initiated(kind);
        info!(
            "{} {} {} from chain {} to chain {} via {}: {:?}",
            kind, amount, symbol, source_chain, target_chain, quote.route, hash
        );
        Ok(hash)
    }

    /// Undo an admitted transfer: release its balance reservation and return
    /// its amount to the token's daily cap.
    async fn unwind(&self, symbol: &str, kind: TransferKind, amount: Amount, admitted_at: DateTime<Utc>) {
        self.release_reservation(symbol, kind, amount).await;
        self.token_policy.refund(symbol, amount, admitted_at);
    }

    async fn release_reservation(&self, symbol: &str, kind: TransferKind, amount: Amount) {
        if let Err(e) = self.registry.release(symbol, kind, amount).await {
            warn!("Failed to release {} reservation on {}: {}", kind, symbol, e);
        }
    }

    /// `process_transaction` evaluated at `now`
    pub async fn process_transaction_at(
        &self,
        hash: H256,
        now: DateTime<Utc>,
    ) -> BridgeResult<TransactionStatus> {
        self.ensure_initialized()?;
        let claim = self.ledger.claim(&hash).await?;
        let tx = self.ledger.get(&hash).await?;

        match self.chain.receipt_status(hash).await? {
            ReceiptStatus::Pending => {
                debug!("Transaction {:?} not yet confirmed", hash);
                return Ok(TransactionStatus::Pending);
            }
            ReceiptStatus::Reverted => {
                self.ledger
                    .transition(&claim, TransactionStatus::Failed, now)
                    .await?;
                self.unwind(&tx.symbol, tx.kind, tx.amount, tx.timestamp).await;
                crate::metrics::record_transaction_completed(TransactionStatus::Failed);
                crate::metrics::record_processing_latency(tx.kind, latency_secs(&tx, now));
                warn!("Transaction {:?} reverted on chain {}", hash, self.chain_id());
                return Ok(TransactionStatus::Failed);
            }
            ReceiptStatus::Success => {}
        }

        if tx.kind.requires_consensus() {
            let authorized = self.validators.authorized().await;
            let tally = security::tally(&hash, &tx.validator_signatures, &authorized, now);
            let threshold = self.security.multisig_threshold().await;
            if !tally.meets(threshold) {
                debug!(
                    "Transaction {:?} awaiting consensus: {} of {} signatures",
                    hash,
                    tally.valid(),
                    threshold
                );
                return Ok(TransactionStatus::Pending);
            }
        }

        self.registry
            .settle(&tx.symbol, tx.kind, tx.amount, now)
            .await?;
        let status = TransactionStatus::success_for(tx.kind);
        self.ledger.transition(&claim, status, now).await?;

        crate::metrics::record_transaction_completed(status);
        crate::metrics::record_processing_latency(tx.kind, latency_secs(&tx, now));
        info!("Transaction {:?} completed as {}", hash, status);
        Ok(status)
    }

    /// Attach a validator attestation. The signature must recover to the
    /// claimed validator, who must be active.
    pub async fn submit_attestation(&self, attestation: Attestation) -> BridgeResult<bool> {
        self.submit_attestation_at(attestation, Utc::now()).await
    }

    pub async fn submit_attestation_at(
        &self,
        attestation: Attestation,
        now: DateTime<Utc>,
    ) -> BridgeResult<bool> {
        let hash = attestation.tx_hash;
        let authorized = self.validators.authorized().await;
        let signer = security::verify_attestation(&hash, &attestation, &authorized, now)?;
        if signer != attestation.validator {
            return Err(ValidationError::UnauthorizedSigner { hash, signer }.into());
        }

        let added = self.ledger.add_attestation(attestation).await?;
        if added {
            self.validators.record_validation(&signer, now).await;
            crate::metrics::record_attestation();
            debug!("Validator {:?} attested {:?}", signer, hash);
        }
        Ok(added)
    }

    /// Administratively cancel a PENDING transaction
    pub async fn cancel_transaction(&self, hash: H256) -> BridgeResult<BridgeTransaction> {
        self.cancel_at(hash, Utc::now()).await
    }

    async fn cancel_at(&self, hash: H256, now: DateTime<Utc>) -> BridgeResult<BridgeTransaction> {
        let claim = self.ledger.claim(&hash).await?;
        let tx = self
            .ledger
            .transition(&claim, TransactionStatus::Cancelled, now)
            .await?;
        self.release_reservation(&tx.symbol, tx.kind, tx.amount).await;
        crate::metrics::record_transaction_completed(TransactionStatus::Cancelled);
        Ok(tx)
    }

    /// Cancel every PENDING transaction past its deadline. Entries being
    /// processed concurrently are left for the next sweep.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Vec<H256> {
        let mut cancelled = Vec::new();
        for hash in self.ledger.expired(now).await {
            match self.cancel_at(hash, now).await {
                Ok(tx) => {
                    warn!(
                        "Transaction {:?} timed out after {}s, cancelled",
                        hash,
                        (now - tx.timestamp).num_seconds()
                    );
                    cancelled.push(hash);
                }
                Err(e) => debug!("Skipping expired {:?}: {}", hash, e),
            }
        }
        cancelled
    }

    /// Archive terminal entries older than the retention period
    pub async fn archive_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(self.options.archive_retention_secs as i64);
        self.ledger.archive_terminal(cutoff).await
    }

    /// Order PENDING transactions for processing
    pub async fn plan_pending(&self) -> BridgeResult<Vec<Batch>> {
        let pending = self.ledger.pending().await;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let gas_price = self.chain.gas_price().await?;
        let batch_size = self.router.routing_config().await.batch_size;

        let candidates = pending
            .into_iter()
            .map(|tx| {
                let route = tx.route.clone().unwrap_or_else(|| DIRECT_ROUTE.to_string());
                let bridge_fee = self
                    .router
                    .protocol(&route)
                    .map(|p| p.fee_for(tx.amount))
                    .unwrap_or_default();
                TransferCandidate {
                    hash: tx.hash,
                    symbol: tx.symbol,
                    route,
                    amount: tx.amount,
                    gas_cost: GasEstimator::calculate_cost(self.gas.gas_limit(tx.kind), gas_price),
                    bridge_fee,
                }
            })
            .collect();

        Ok(plan_batches(candidates, batch_size))
    }

    pub async fn register_asset_with_decimals(
        &self,
        symbol: &str,
        token_address: Address,
        decimals: u8,
    ) -> BridgeResult<Asset> {
        self.registry
            .register_with_decimals(symbol, token_address, decimals)
            .await
    }

    pub async fn set_asset_active(&self, symbol: &str, active: bool) -> BridgeResult<Asset> {
        self.registry.set_active(symbol, active).await
    }

    pub async fn get_asset(&self, symbol: &str) -> BridgeResult<Asset> {
        self.registry.get(symbol).await
    }

    pub async fn list_assets(&self) -> Vec<Asset> {
        self.registry.list().await
    }

    pub async fn total_supply(&self, symbol: &str) -> BridgeResult<Amount> {
        self.registry.total_supply(symbol).await
    }

    pub async fn get_transaction(&self, hash: H256) -> BridgeResult<BridgeTransaction> {
        self.ledger.get(&hash).await
    }

    pub async fn pending_transactions(&self) -> Vec<BridgeTransaction> {
        self.ledger.pending().await
    }

    pub async fn slash_validator(
        &self,
        target: Address,
        origin: SlashOrigin,
        amount: Option<Amount>,
    ) -> BridgeResult<ValidatorInfo> {
        self.validators.slash(&target, origin, amount).await
    }

    pub async fn reactivate_validator(&self, address: Address, stake: Amount) -> BridgeResult<ValidatorInfo> {
        self.validators.reactivate(&address, stake).await
    }

    pub async fn stats(&self) -> LedgerStats {
        self.ledger.stats().await
    }

    pub async fn status(&self) -> BridgeStatus {
        let ledger = self.ledger.stats().await;
        crate::metrics::record_pending_transactions(ledger.pending);
        BridgeStatus {
            instance_id: self.options.instance_id.clone(),
            chain_id: self.chain_id(),
            initialized: self.initialized.load(Ordering::SeqCst),
            paused: self.is_paused(),
            emergency: self.security.is_emergency().await,
            multisig_threshold: self.security.multisig_threshold().await,
            assets: self.registry.list().await.len(),
            active_validators: self.validators.authorized().await.len(),
            ledger,
        }
    }

    pub async fn chain_healthy(&self) -> bool {
        let healthy = self.chain.health_check().await;
        crate::metrics::record_chain_health(self.chain_id(), healthy);
        healthy
    }
}

fn latency_secs(tx: &BridgeTransaction, now: DateTime<Utc>) -> f64 {
    (now - tx.timestamp).num_milliseconds().max(0) as f64 / 1000.0
}

#[async_trait]
impl BridgeFacade for Bridge {
    async fn initialize(&self) -> BridgeResult<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BridgeError::AlreadyInitialized);
        }
        if !self.chain.health_check().await {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(BridgeError::Chain {
                chain_id: self.chain_id(),
                message: "health check failed during initialization".to_string(),
            });
        }
        info!(
            "Bridge {} initialized on chain {}",
            self.options.instance_id,
            self.chain_id()
        );
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn register_asset(&self, symbol: &str, token_address: Address) -> BridgeResult<()> {
        self.registry.register(symbol, token_address).await.map(|_| ())
    }

    async fn unregister_asset(&self, symbol: &str) -> BridgeResult<()> {
        self.registry.unregister(symbol).await.map(|_| ())
    }

    async fn is_asset_supported(&self, symbol: &str) -> bool {
        self.registry.is_supported(symbol).await
    }

    async fn lock_tokens(&self, request: TransferRequest) -> BridgeResult<H256> {
        self.transfer(TransferKind::Lock, request).await
    }

    async fn unlock_tokens(&self, request: TransferRequest) -> BridgeResult<H256> {
        self.transfer(TransferKind::Unlock, request).await
    }

    async fn mint_tokens(&self, request: TransferRequest) -> BridgeResult<H256> {
        self.transfer(TransferKind::Mint, request).await
    }

    async fn burn_tokens(&self, request: TransferRequest) -> BridgeResult<H256> {
        self.transfer(TransferKind::Burn, request).await
    }

    async fn get_transaction_status(&self, hash: H256) -> BridgeResult<TransactionStatus> {
        self.ledger.status(&hash).await
    }

    async fn get_pending_transactions(&self) -> Vec<H256> {
        self.ledger.pending_hashes().await
    }

    async fn process_transaction(&self, hash: H256) -> BridgeResult<TransactionStatus> {
        self.process_transaction_at(hash, Utc::now()).await
    }

    async fn add_validator(&self, address: Address, stake: Amount) -> BridgeResult<()> {
        self.validators.add(address, stake).await.map(|_| ())
    }

    async fn remove_validator(&self, address: Address) -> BridgeResult<()> {
        self.validators.remove(&address).await.map(|_| ())
    }

    async fn is_validator(&self, address: Address) -> bool {
        self.validators.is_validator(&address).await
    }

    async fn get_validators(&self) -> Vec<ValidatorInfo> {
        self.validators.validators().await
    }

    async fn pause(&self) -> BridgeResult<()> {
        if !self.paused.swap(true, Ordering::SeqCst) {
            warn!("Bridge {} paused", self.options.instance_id);
            crate::metrics::record_bridge_paused(true);
        }
        Ok(())
    }

    async fn unpause(&self) -> BridgeResult<()> {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Bridge {} resumed", self.options.instance_id);
            crate::metrics::record_bridge_paused(false);
        }
        Ok(())
    }

    async fn emergency_withdraw(&self, symbol: &str) -> BridgeResult<H256> {
        self.ensure_initialized()?;
        if !self.is_paused() {
            return Err(BridgeError::NotPaused {
                operation: format!("emergency withdraw of {}", symbol),
            });
        }

        let asset = self.registry.get(symbol).await?;
        let amount = self.registry.reserve_for_withdrawal(symbol).await?;
        let kind = TransferKind::EmergencyWithdraw;
        let now = Utc::now();

        // a zero counterparty sends funds to the contract's recovery address
        let operation = ChainOperation {
            kind,
            token: asset.token_address,
            amount,
            counterparty: Address::zero(),
            counterpart_chain: self.chain_id(),
        };
        let hash = match self.chain.submit(operation).await {
            Ok(hash) => hash,
            Err(e) => {
                self.release_reservation(symbol, kind, amount).await;
                return Err(e);
            }
        };

        let tx = BridgeTransaction {
            hash,
            kind,
            symbol: symbol.to_string(),
            amount,
            sender: Address::zero(),
            recipient: Address::zero(),
            source_chain: self.chain_id(),
            target_chain: self.chain_id(),
            route: None,
            timestamp: now,
            deadline: now + Duration::seconds(self.options.pending_deadline_secs as i64),
            status: TransactionStatus::Pending,
            updated_at: now,
            validator_signatures: Vec::new(),
        };
        if let Err(e) = self.ledger.insert(tx).await {
            self.release_reservation(symbol, kind, amount).await;
            return Err(e);
        }

        warn!("Emergency withdrawal of {} {} submitted: {:?}", amount, symbol, hash);
        Ok(hash)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::{MockChainClient, SimulatedChain};
    use crate::config::{ChainConfig, ProtocolConfig, RoutingConfig, SecurityConfig, TokenLimits};
    use crate::consensus::{test_key, Validator};
    use crate::error::{AssetError, SecurityError};
    use crate::routing::SecurityLevel;
    use ethers::types::U256;
    use std::collections::HashMap;

    pub(crate) const LOCAL: ChainId = 43114;
    pub(crate) const REMOTE: ChainId = 1;

    fn chain_config(id: ChainId) -> ChainConfig {
        ChainConfig {
            chain_id: id,
            name: format!("chain-{}", id),
            rpc_urls: vec!["http://localhost:8545".to_string()],
            contract_address: "0x00000000000000000000000000000000000000a1".to_string(),
            min_gas_price_gwei: 1,
            max_gas_price_gwei: 500,
            supported_tokens: Vec::new(),
            low_latency_subnet: false,
            subnet_id: None,
            enabled: true,
        }
    }

    fn protocol(source: ChainId, target: ChainId, deadline: Option<u64>) -> ProtocolConfig {
        ProtocolConfig {
            name: format!("canonical-{}-{}", source, target),
            source_chain: source,
            target_chain: target,
            contract_address: "0x00000000000000000000000000000000000000c1".to_string(),
            supported_tokens: vec!["USDC".to_string()],
            base_fee: "10".to_string(),
            fee_bps: 0,
            min_fee: "0".to_string(),
            max_fee: "1000".to_string(),
            security_level: SecurityLevel::High,
            estimated_time_secs: 600,
            pending_deadline_secs: deadline,
        }
    }

    pub(crate) fn bridge_with(chain: Arc<dyn ChainClient>, security: SecurityConfig) -> Bridge {
        let mut chains = HashMap::new();
        chains.insert("local".to_string(), chain_config(LOCAL));
        chains.insert("remote".to_string(), chain_config(REMOTE));
        let protocols = vec![protocol(LOCAL, REMOTE, Some(120)), protocol(REMOTE, LOCAL, None)];
        let router = RouteOptimizer::new(chains, &protocols, RoutingConfig::default()).unwrap();

        Bridge::new(
            BridgeOptions::default(),
            chain,
            Arc::new(SecurityPolicy::new(security)),
            Arc::new(TokenPolicy::new(HashMap::new())),
            Arc::new(router),
        )
    }

    async fn ready_bridge() -> (Bridge, Arc<SimulatedChain>) {
        let chain = Arc::new(SimulatedChain::new(LOCAL));
        let bridge = bridge_with(chain.clone(), SecurityConfig::default());
        bridge.initialize().await.unwrap();
        bridge
            .register_asset("USDC", Address::repeat_byte(0xaa))
            .await
            .unwrap();
        (bridge, chain)
    }

    fn request(amount: u64) -> TransferRequest {
        TransferRequest::new(
            "USDC",
            U256::from(amount),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            REMOTE,
        )
    }

    async fn locked(bridge: &Bridge, chain: &SimulatedChain, amount: u64) -> H256 {
        let hash = bridge.lock_tokens(request(amount)).await.unwrap();
        chain.settle(hash, true).unwrap();
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Locked
        );
        hash
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let (bridge, _) = ready_bridge().await;
        assert!(bridge.is_initialized().await);
        assert!(matches!(
            bridge.initialize().await,
            Err(BridgeError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_initialize_requires_healthy_chain() {
        let mut mock = MockChainClient::new();
        mock.expect_chain_id().return_const(LOCAL);
        mock.expect_health_check().returning(|| false);
        let bridge = bridge_with(Arc::new(mock), SecurityConfig::default());

        let err = bridge.initialize().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!bridge.is_initialized().await);
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let chain = Arc::new(SimulatedChain::new(LOCAL));
        let bridge = bridge_with(chain, SecurityConfig::default());
        bridge
            .register_asset("USDC", Address::repeat_byte(0xaa))
            .await
            .unwrap();
        assert!(matches!(
            bridge.lock_tokens(request(5)).await,
            Err(BridgeError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_lock_records_route_and_deadline() {
        let (bridge, chain) = ready_bridge().await;
        let hash = bridge.lock_tokens(request(100)).await.unwrap();

        let tx = bridge.get_transaction(hash).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.route.as_deref(), Some("canonical-43114-1"));
        assert_eq!((tx.source_chain, tx.target_chain), (LOCAL, REMOTE));
        assert_eq!((tx.deadline - tx.timestamp).num_seconds(), 120);
        assert_eq!(bridge.get_pending_transactions().await, vec![hash]);

        let op = chain.operation(&hash).unwrap();
        assert_eq!(op.kind, TransferKind::Lock);
        assert_eq!(op.token, Address::repeat_byte(0xaa));

        // still unconfirmed on chain
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Pending
        );
        chain.settle(hash, true).unwrap();
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Locked
        );
        assert_eq!(bridge.total_supply("USDC").await.unwrap(), U256::from(100));
        assert!(matches!(
            bridge.process_transaction(hash).await,
            Err(BridgeError::NotPending { .. })
        ));
    }

    #[tokio::test]
    async fn test_reverted_transfer_fails_and_releases() {
        let (bridge, chain) = ready_bridge().await;
        locked(&bridge, &chain, 100).await;

        let unlock = bridge.unlock_tokens(request(80)).await.unwrap();
        // the reservation blocks a second overlapping unlock
        assert!(matches!(
            bridge.unlock_tokens(request(30)).await,
            Err(BridgeError::InsufficientBalance { .. })
        ));

        chain.settle(unlock, false).unwrap();
        assert_eq!(
            bridge.process_transaction(unlock).await.unwrap(),
            TransactionStatus::Failed
        );
        let asset = bridge.get_asset("USDC").await.unwrap();
        assert_eq!(asset.locked_amount, U256::from(100));
        assert!(asset.reserved_locked.is_zero());
        assert_eq!(asset.pending_refs, 0);
    }

    fn capped(cap: u64) -> TokenLimits {
        TokenLimits {
            min_transfer: U256::one(),
            max_transfer: U256::from(cap),
            daily_cap: U256::from(cap),
        }
    }

    #[tokio::test]
    async fn test_failed_submit_returns_daily_cap() {
        let mut mock = MockChainClient::new();
        mock.expect_chain_id().return_const(LOCAL);
        mock.expect_health_check().returning(|| true);
        mock.expect_gas_price().returning(|| Ok(U256::from(1_000_000_000u64)));
        mock.expect_submit().returning(|_| {
            Err(BridgeError::Chain {
                chain_id: LOCAL,
                message: "rpc down".to_string(),
            })
        });
        let bridge = bridge_with(Arc::new(mock), SecurityConfig::default());
        bridge.initialize().await.unwrap();
        bridge
            .register_asset("USDC", Address::repeat_byte(0xaa))
            .await
            .unwrap();
        bridge.token_policy.set_limits("USDC", capped(100)).await;

        let err = bridge.lock_tokens(request(100)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Chain { .. }));
        assert!(bridge
            .token_policy
            .daily_usage_at("USDC", Utc::now())
            .is_zero());
        assert_eq!(bridge.get_asset("USDC").await.unwrap().pending_refs, 0);
    }

    #[tokio::test]
    async fn test_reverted_transfer_returns_daily_cap() {
        let (bridge, chain) = ready_bridge().await;
        bridge.token_policy.set_limits("USDC", capped(100)).await;

        let hash = bridge.lock_tokens(request(100)).await.unwrap();
        assert!(matches!(
            bridge.lock_tokens(request(1)).await,
            Err(BridgeError::TransferLimit { bound: "daily cap", .. })
        ));

        chain.settle(hash, false).unwrap();
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Failed
        );
        assert!(bridge.lock_tokens(request(100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mint_waits_for_threshold() {
        let (bridge, chain) = ready_bridge().await;
        let validators: Vec<Validator> = (1..=3)
            .map(|i| Validator::from_key(&test_key(i), bridge.validator_set()).unwrap())
            .collect();
        for v in &validators {
            bridge.add_validator(v.address(), U256::from(1_000)).await.unwrap();
        }

        let hash = bridge.mint_tokens(request(40)).await.unwrap();
        chain.settle(hash, true).unwrap();

        let first = validators[0].sign(hash).await.unwrap();
        assert!(bridge.submit_attestation(first.clone()).await.unwrap());
        assert!(!bridge.submit_attestation(first).await.unwrap());
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Pending
        );

        let second = validators[1].sign(hash).await.unwrap();
        bridge.submit_attestation(second).await.unwrap();
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Minted
        );
        assert_eq!(
            bridge.get_asset("USDC").await.unwrap().minted_amount,
            U256::from(40)
        );
    }

    #[tokio::test]
    async fn test_forged_attestation_rejected() {
        let (bridge, _) = ready_bridge().await;
        let honest = Validator::from_key(&test_key(1), bridge.validator_set()).unwrap();
        let other = Validator::from_key(&test_key(2), bridge.validator_set()).unwrap();
        bridge.add_validator(honest.address(), U256::one()).await.unwrap();
        bridge.add_validator(other.address(), U256::one()).await.unwrap();

        let hash = bridge.mint_tokens(request(1)).await.unwrap();
        let mut forged = honest.sign(hash).await.unwrap();
        forged.validator = other.address();
        assert!(matches!(
            bridge.submit_attestation(forged).await,
            Err(BridgeError::Validation(ValidationError::UnauthorizedSigner { .. }))
        ));

        // active in some other set, unknown to this bridge
        let other_set = Arc::new(ValidatorSet::new());
        let foreign = Validator::from_key(&test_key(9), other_set.clone()).unwrap();
        other_set.add(foreign.address(), U256::one()).await.unwrap();
        assert!(matches!(
            bridge.submit_attestation(foreign.sign(hash).await.unwrap()).await,
            Err(BridgeError::Validation(ValidationError::UnauthorizedSigner { .. }))
        ));
    }

    #[tokio::test]
    async fn test_pause_and_emergency_withdraw() {
        let (bridge, chain) = ready_bridge().await;
        locked(&bridge, &chain, 250).await;

        assert!(matches!(
            bridge.emergency_withdraw("USDC").await,
            Err(BridgeError::NotPaused { .. })
        ));

        bridge.pause().await.unwrap();
        assert!(matches!(
            bridge.lock_tokens(request(1)).await,
            Err(BridgeError::Paused)
        ));

        let hash = bridge.emergency_withdraw("USDC").await.unwrap();
        assert_eq!(chain.operation(&hash).unwrap().amount, U256::from(250));
        // the whole balance is already reserved
        assert!(bridge.emergency_withdraw("USDC").await.is_err());

        chain.settle(hash, true).unwrap();
        assert_eq!(
            bridge.process_transaction(hash).await.unwrap(),
            TransactionStatus::Unlocked
        );
        assert!(bridge.total_supply("USDC").await.unwrap().is_zero());

        bridge.unpause().await.unwrap();
        assert!(!bridge.is_paused());
    }

    #[tokio::test]
    async fn test_unregister_blocked_until_settled() {
        let (bridge, _) = ready_bridge().await;
        let hash = bridge.lock_tokens(request(5)).await.unwrap();
        assert!(matches!(
            bridge.unregister_asset("USDC").await,
            Err(BridgeError::Asset(AssetError::PendingReferences { pending: 1, .. }))
        ));

        bridge.cancel_transaction(hash).await.unwrap();
        assert_eq!(
            bridge.get_transaction_status(hash).await.unwrap(),
            TransactionStatus::Cancelled
        );
        bridge.unregister_asset("USDC").await.unwrap();
        assert!(!bridge.is_asset_supported("USDC").await);
    }

    #[tokio::test]
    async fn test_sweep_uses_route_deadline() {
        let (bridge, _) = ready_bridge().await;
        let outbound = bridge.lock_tokens(request(5)).await.unwrap();
        let inbound = bridge.mint_tokens(request(5)).await.unwrap();

        let later = Utc::now() + Duration::seconds(121);
        assert_eq!(bridge.sweep_expired_at(later).await, vec![outbound]);

        let much_later = Utc::now() + Duration::seconds(3601);
        assert_eq!(bridge.sweep_expired_at(much_later).await, vec![inbound]);
        assert!(bridge.get_pending_transactions().await.is_empty());

        let archived = bridge
            .archive_at(much_later + Duration::days(8))
            .await;
        assert_eq!(archived, 2);
        assert_eq!(bridge.stats().await.archived, 2);
        assert_eq!(
            bridge.get_transaction_status(outbound).await.unwrap(),
            TransactionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_emergency_mode_blocks_transfers() {
        let (bridge, _) = ready_bridge().await;
        bridge.security().enable_emergency().await.unwrap();
        assert!(matches!(
            bridge.lock_tokens(request(5)).await,
            Err(BridgeError::Security(SecurityError::EmergencyActive))
        ));
        assert!(bridge.status().await.emergency);
    }

    #[tokio::test]
    async fn test_zero_amount_and_unknown_route() {
        let (bridge, _) = ready_bridge().await;
        assert!(matches!(
            bridge.lock_tokens(request(0)).await,
            Err(BridgeError::TransferLimit { .. })
        ));

        let mut req = request(5);
        req.counterpart_chain = 56;
        assert!(matches!(
            bridge.lock_tokens(req).await,
            Err(BridgeError::NoRoute { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_pending_orders_by_value() {
        let (bridge, _) = ready_bridge().await;
        let small = bridge.lock_tokens(request(10)).await.unwrap();
        let large = bridge.lock_tokens(request(10_000)).await.unwrap();

        let batches = bridge.plan_pending().await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].transactions, vec![large, small]);
    }
}
