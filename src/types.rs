//! Shared primitive types

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amounts are unsigned 256-bit integers, never floating point.
pub type Amount = U256;

/// Numeric chain identifier (EIP-155 style)
pub type ChainId = u64;

/// Direction of a bridge operation on the chain it executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Lock,
    Unlock,
    Mint,
    Burn,
    EmergencyWithdraw,
}

impl TransferKind {
    /// Destination-side actions need validator consensus before completing
    pub fn requires_consensus(&self) -> bool {
        matches!(self, TransferKind::Mint | TransferKind::Unlock)
    }

    /// Actions that draw down an existing balance and must reserve it first
    pub fn debits_balance(&self) -> bool {
        matches!(
            self,
            TransferKind::Unlock | TransferKind::Burn | TransferKind::EmergencyWithdraw
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Lock => "lock",
            TransferKind::Unlock => "unlock",
            TransferKind::Mint => "mint",
            TransferKind::Burn => "burn",
            TransferKind::EmergencyWithdraw => "emergency_withdraw",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-point scale used when an integer ratio has to feed a float score
const RATIO_SCALE: u64 = 1_000_000;

/// `numerator / denominator` as a float in `[0, 1]` for `numerator <= denominator`.
///
/// Computed in integer space first so that 256-bit amounts never go through a
/// lossy float conversion.
pub fn ratio(numerator: Amount, denominator: Amount) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    if numerator >= denominator {
        return 1.0;
    }
    let scaled = numerator
        .full_mul(U256::from(RATIO_SCALE))
        .checked_div(denominator.into())
        .unwrap_or_default();
    scaled.low_u64() as f64 / RATIO_SCALE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(ratio(U256::zero(), U256::from(10)), 0.0);
        assert_eq!(ratio(U256::from(10), U256::from(10)), 1.0);
        assert_eq!(ratio(U256::from(5), U256::zero()), 0.0);
        assert!((ratio(U256::from(1), U256::from(4)) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_handles_large_amounts() {
        let max = U256::MAX;
        let half = max / 2;
        assert!((ratio(half, max) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_consensus_kinds() {
        assert!(TransferKind::Mint.requires_consensus());
        assert!(TransferKind::Unlock.requires_consensus());
        assert!(!TransferKind::Lock.requires_consensus());
        assert!(!TransferKind::EmergencyWithdraw.requires_consensus());
        assert!(TransferKind::Burn.debits_balance());
    }
}
