//! Error types for the bridge coordinator

use ethers::types::{Address, H256};
use thiserror::Error;

/// Asset registry violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("Asset {symbol} is already registered")]
    DuplicateSymbol { symbol: String },

    #[error("Token address {token:?} is already mapped to asset {symbol}")]
    DuplicateToken { token: Address, symbol: String },

    #[error("Asset {symbol} is not registered")]
    UnknownAsset { symbol: String },

    #[error("No asset is mapped to token address {token:?}")]
    UnknownToken { token: Address },

    #[error("Asset {symbol} is inactive")]
    Inactive { symbol: String },

    #[error("Asset {symbol} is referenced by {pending} pending transactions")]
    PendingReferences { symbol: String, pending: u64 },
}

/// Validator and attestation violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Validator {address:?} is not registered")]
    UnknownValidator { address: Address },

    #[error("Validator {address:?} is already registered")]
    DuplicateValidator { address: Address },

    #[error("Validator {address:?} is inactive")]
    InactiveValidator { address: Address },

    #[error("Validator {address:?} is still active")]
    ValidatorActive { address: Address },

    #[error("No signature from validator {address:?} for transaction {hash:?}")]
    MissingSignature { address: Address, hash: H256 },

    #[error("Signature for transaction {hash:?} expired (signed {age_secs}s ago)")]
    ExpiredSignature { hash: H256, age_secs: i64 },

    #[error("Signature for transaction {hash:?} is dated {ahead_secs}s in the future")]
    FutureSignature { hash: H256, ahead_secs: i64 },

    #[error("Signature for transaction {hash:?} recovers to unauthorized signer {signer:?}")]
    UnauthorizedSigner { hash: H256, signer: Address },

    #[error("Signature for transaction {hash:?} could not be recovered: {message}")]
    InvalidSignature { hash: H256, message: String },

    #[error("Slashing validator {target:?} not authorized by {origin}")]
    SlashNotAuthorized { target: Address, origin: String },

    #[error("Slash amount {requested} exceeds stake {stake} of validator {address:?}")]
    SlashExceedsStake {
        address: Address,
        requested: String,
        stake: String,
    },

    #[error("Signing failed for validator {address:?}: {message}")]
    Signing { address: Address, message: String },
}

/// Security policy violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Emergency mode is active, transfers are halted")]
    EmergencyActive,

    #[error("Emergency mode toggle rejected: cooldown has {remaining_secs}s remaining")]
    EmergencyCooldown { remaining_secs: i64 },

    #[error("Emergency mode is already {state}")]
    EmergencyUnchanged { state: &'static str },

    #[error("Address {address:?} is blacklisted")]
    Blacklisted { address: Address },

    #[error("Address {address:?} is not whitelisted")]
    NotWhitelisted { address: Address },

    #[error("Rate limit exceeded for {address:?}: {count} transfers in {window_secs}s window")]
    RateLimited {
        address: Address,
        count: usize,
        window_secs: u64,
    },

    #[error("Gas price {proposed} exceeds ceiling {ceiling}")]
    GasPriceTooHigh { proposed: String, ceiling: String },

    #[error("{list} enforcement is disabled")]
    ListDisabled { list: &'static str },
}

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bridge is already initialized")]
    AlreadyInitialized,

    #[error("Bridge is not initialized")]
    NotInitialized,

    #[error("Bridge is paused")]
    Paused,

    #[error("Bridge must be paused for {operation}")]
    NotPaused { operation: String },

    #[error("Transaction {hash:?} not found")]
    TransactionNotFound { hash: H256 },

    #[error("Transaction {hash:?} already exists in the ledger")]
    DuplicateTransaction { hash: H256 },

    #[error("Transaction {hash:?} is not pending (status {status})")]
    NotPending { hash: H256, status: String },

    #[error("Transaction {hash:?} is already being processed")]
    AlreadyProcessing { hash: H256 },

    #[error("Invalid state transition for {hash:?} from {from} to {to}")]
    InvalidStateTransition { hash: H256, from: String, to: String },

    #[error("Insufficient {balance} balance for {symbol}: available {available}, requested {requested}")]
    InsufficientBalance {
        symbol: String,
        balance: &'static str,
        available: String,
        requested: String,
    },

    #[error("Transfer of {amount} {symbol} violates {bound}: limit {limit}")]
    TransferLimit {
        symbol: String,
        bound: &'static str,
        amount: String,
        limit: String,
    },

    #[error("No route from chain {source_chain} to chain {target_chain} for {symbol}")]
    NoRoute {
        symbol: String,
        source_chain: u64,
        target_chain: u64,
    },

    #[error("Chain {chain_id} error: {message}")]
    Chain { chain_id: u64, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl BridgeError {
    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Chain { .. }
                | BridgeError::Timeout { .. }
                | BridgeError::AlreadyProcessing { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            BridgeError::Security(SecurityError::EmergencyActive)
                | BridgeError::Validation(ValidationError::UnauthorizedSigner { .. })
                | BridgeError::Validation(ValidationError::SlashNotAuthorized { .. })
                | BridgeError::InvalidStateTransition { .. }
        )
    }
}

/// Result type for coordinator operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_embed_identifiers() {
        let err = BridgeError::from(AssetError::UnknownAsset {
            symbol: "USDC".to_string(),
        });
        assert_eq!(err.to_string(), "Asset USDC is not registered");

        let err = BridgeError::InsufficientBalance {
            symbol: "USDC".to_string(),
            balance: "locked",
            available: "30".to_string(),
            requested: "31".to_string(),
        };
        assert!(err.to_string().contains("USDC"));
        assert!(err.to_string().contains("31"));
    }

    #[test]
    fn test_retry_and_alert_classification() {
        let chain = BridgeError::Chain {
            chain_id: 1,
            message: "connection reset".to_string(),
        };
        assert!(chain.is_retryable());
        assert!(!chain.should_alert());

        let emergency = BridgeError::from(SecurityError::EmergencyActive);
        assert!(!emergency.is_retryable());
        assert!(emergency.should_alert());
    }
}
