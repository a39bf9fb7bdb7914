//! Cross-chain transaction record and lifecycle states

use crate::consensus::Attestation;
use crate::types::{Amount, ChainId, TransferKind};

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Locked,
    Minted,
    Burned,
    Unlocked,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Success terminal reached by a confirmed operation of `kind`
    pub fn success_for(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Lock => TransactionStatus::Locked,
            TransferKind::Mint => TransactionStatus::Minted,
            TransferKind::Burn => TransactionStatus::Burned,
            TransferKind::Unlock | TransferKind::EmergencyWithdraw => TransactionStatus::Unlocked,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Locked
                | TransactionStatus::Minted
                | TransactionStatus::Burned
                | TransactionStatus::Unlocked
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Locked => "locked",
            TransactionStatus::Minted => "minted",
            TransactionStatus::Burned => "burned",
            TransactionStatus::Unlocked => "unlocked",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cross-chain transfer attempt. `hash` is the chain transaction hash
/// returned on submission and never changes afterwards.
#[derive(Debug, Clone)]
pub struct BridgeTransaction {
    pub hash: H256,
    pub kind: TransferKind,
    pub symbol: String,
    pub amount: Amount,
    pub sender: Address,
    pub recipient: Address,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    /// Protocol selected by the route optimizer, if any
    pub route: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// PENDING past this instant is cancelled by the timeout sweep
    pub deadline: DateTime<Utc>,
    pub status: TransactionStatus,
    pub updated_at: DateTime<Utc>,
    pub validator_signatures: Vec<Attestation>,
}

impl BridgeTransaction {
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now >= self.deadline
    }
}
