//! EVM chain client with multi-RPC support and automatic failover

use super::{ChainClient, ChainOperation, ReceiptStatus};
use crate::config::ChainConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{ChainId, TransferKind};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use sha3::{Digest, Keccak256};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(500);
const GAS_LIMIT_BUFFER_PERCENT: u64 = 20;

/// Bridge contract client for an EVM network
pub struct EvmChainClient {
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    contract: Address,
    wallet: LocalWallet,
    /// Next nonce to use; refetched from the chain when unset
    nonce: Mutex<Option<U256>>,
    max_attempts: u32,
}

impl EvmChainClient {
    pub async fn new(config: ChainConfig, wallet: LocalWallet, max_attempts: u32) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BridgeError::Chain {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let contract = Address::from_str(&config.contract_address).map_err(|e| {
            BridgeError::Config(format!(
                "Chain {} has invalid contract address: {}",
                config.name, e
            ))
        })?;

        let wallet = wallet.with_chain_id(config.chain_id);
        info!(
            "EVM client for chain {} submitting from {:?}",
            config.chain_id,
            wallet.address()
        );

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            contract,
            wallet,
            nonce: Mutex::new(None),
            max_attempts: max_attempts.max(1),
        })
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    fn chain_error(&self, message: impl Into<String>) -> BridgeError {
        BridgeError::Chain {
            chain_id: self.config.chain_id,
            message: message.into(),
        }
    }

    async fn next_nonce(&self) -> BridgeResult<U256> {
        let mut guard = self.nonce.lock().await;
        let nonce = match *guard {
            Some(nonce) => nonce,
            None => self
                .http()
                .get_transaction_count(self.wallet.address(), Some(BlockNumber::Pending.into()))
                .await
                .map_err(|e| self.chain_error(format!("nonce lookup failed: {}", e)))?,
        };
        *guard = Some(nonce + 1);
        Ok(nonce)
    }

    async fn reset_nonce(&self) {
        *self.nonce.lock().await = None;
    }

    /// Gas price clamped to the configured bounds
    async fn bounded_gas_price(&self) -> BridgeResult<U256> {
        let gwei = U256::exp10(9);
        let min = U256::from(self.config.min_gas_price_gwei) * gwei;
        let max = U256::from(self.config.max_gas_price_gwei) * gwei;

        for _ in 0..self.http_providers.len() {
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price.clamp(min, max)),
                Err(e) => {
                    warn!("Failed to get gas price from chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }
        }
        Err(self.chain_error("All providers failed to return a gas price"))
    }

    async fn build_tx(&self, operation: &ChainOperation, nonce: U256) -> BridgeResult<TypedTransaction> {
        let gas_price = self.bounded_gas_price().await?;
        let tx = TransactionRequest::new()
            .from(self.wallet.address())
            .to(self.contract)
            .data(encode_call(operation))
            .nonce(nonce)
            .gas_price(gas_price)
            .chain_id(self.config.chain_id);
        let mut tx = TypedTransaction::Legacy(tx);

        let estimate = self
            .http()
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| self.chain_error(format!("gas estimation failed: {}", e)))?;
        tx.set_gas(estimate + estimate * GAS_LIMIT_BUFFER_PERCENT / 100);
        Ok(tx)
    }

    /// Send transaction with retry logic
    async fn send_with_retry(&self, tx: TypedTransaction) -> BridgeResult<H256> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            let signed_tx = match self.wallet.sign_transaction(&tx).await {
                Ok(sig) => tx.rlp_signed(&sig),
                Err(e) => {
                    error!("Failed to sign transaction: {}", e);
                    return Err(self.chain_error(format!("signing failed: {}", e)));
                }
            };

            match timeout(SEND_TIMEOUT, self.http().send_raw_transaction(signed_tx)).await {
                Ok(Ok(pending_tx)) => {
                    let tx_hash = pending_tx.tx_hash();
                    info!(
                        "Transaction sent on chain {}: {:?} (attempt {}/{})",
                        self.config.chain_id, tx_hash, attempt, self.max_attempts
                    );
                    return Ok(tx_hash);
                }
                Ok(Err(e)) => {
                    let error_msg = e.to_string();
                    if error_msg.contains("nonce too low") {
                        warn!("Nonce too low on chain {}, resyncing", self.config.chain_id);
                        self.reset_nonce().await;
                        return Err(self.chain_error("nonce too low"));
                    }
                    if error_msg.contains("insufficient funds") {
                        return Err(self.chain_error("insufficient funds for gas"));
                    }
                    warn!("Send failed on chain {}: {}", self.config.chain_id, error_msg);
                    self.failover();
                    last_error = Some(self.chain_error(error_msg));
                }
                Err(_) => {
                    warn!("Transaction send timeout (attempt {})", attempt);
                    last_error = Some(BridgeError::Timeout {
                        operation: "send transaction".to_string(),
                    });
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        self.reset_nonce().await;
        Err(last_error.unwrap_or_else(|| self.chain_error("Unknown error")))
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    async fn submit(&self, operation: ChainOperation) -> BridgeResult<H256> {
        let nonce = self.next_nonce().await?;
        let tx = match self.build_tx(&operation, nonce).await {
            Ok(tx) => tx,
            Err(e) => {
                self.reset_nonce().await;
                return Err(e);
            }
        };
        let hash = self.send_with_retry(tx).await?;
        crate::metrics::record_chain_submission(self.config.chain_id, operation.kind);
        Ok(hash)
    }

    async fn receipt_status(&self, hash: H256) -> BridgeResult<ReceiptStatus> {
        let receipt = self
            .http()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.chain_error(e.to_string()))?;

        Ok(match receipt {
            None => ReceiptStatus::Pending,
            Some(r) if r.status == Some(U64::one()) => ReceiptStatus::Success,
            Some(_) => ReceiptStatus::Reverted,
        })
    }

    async fn gas_price(&self) -> BridgeResult<U256> {
        self.bounded_gas_price().await
    }

    /// Get current block number with failover
    async fn block_number(&self) -> BridgeResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.chain_error("All providers failed"))
    }

    async fn health_check(&self) -> bool {
        match self.block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }
}

/// Solidity signature of the bridge contract entry point for `kind`
fn function_signature(kind: TransferKind) -> &'static str {
    match kind {
        TransferKind::Lock => "lock(address,uint256,address,uint256)",
        TransferKind::Unlock => "unlock(address,uint256,address,uint256)",
        TransferKind::Mint => "mint(address,uint256,address,uint256)",
        TransferKind::Burn => "burn(address,uint256,address,uint256)",
        TransferKind::EmergencyWithdraw => "emergencyWithdraw(address,uint256,address,uint256)",
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// ABI-encoded calldata for an operation
pub fn encode_call(operation: &ChainOperation) -> Bytes {
    let mut data = selector(function_signature(operation.kind)).to_vec();
    data.extend(abi::encode(&[
        Token::Address(operation.token),
        Token::Uint(operation.amount),
        Token::Address(operation.counterparty),
        Token::Uint(U256::from(operation.counterpart_chain)),
    ]));
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_selector() {
        // keccak256("transfer(address,uint256)")[..4]
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_encode_call_layout() {
        let operation = ChainOperation {
            kind: TransferKind::Lock,
            token: Address::repeat_byte(0x11),
            amount: U256::from(1_000),
            counterparty: Address::repeat_byte(0x22),
            counterpart_chain: 43114,
        };
        let data = encode_call(&operation);
        assert_eq!(data.len(), 4 + 4 * 32);
        assert_eq!(&data[..4], &selector("lock(address,uint256,address,uint256)"));
        assert_eq!(&data[16..36], Address::repeat_byte(0x11).as_bytes());
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(1_000));
        assert_eq!(U256::from_big_endian(&data[100..132]), U256::from(43114));

        let mint = encode_call(&ChainOperation {
            kind: TransferKind::Mint,
            ..operation
        });
        assert_ne!(&mint[..4], &data[..4]);
    }
}
