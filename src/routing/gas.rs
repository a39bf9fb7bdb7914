//! Gas estimation for bridge operations

use crate::types::{Amount, TransferKind};

use ethers::types::U256;

/// Gas estimator for bridge operations
pub struct GasEstimator {
    /// Gas units for a plain lock
    gas_per_transfer: u64,
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new(gas_per_transfer: u64, gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_per_transfer,
            gas_limit_buffer_percent,
        }
    }

    /// Buffered gas limit. Mint and unlock verify validator signatures on
    /// the destination contract and cost roughly half again as much.
    pub fn gas_limit(&self, kind: TransferKind) -> U256 {
        let base = match kind {
            TransferKind::Mint | TransferKind::Unlock => U256::from(self.gas_per_transfer) * 3 / 2,
            _ => U256::from(self.gas_per_transfer),
        };
        let buffer = base * self.gas_limit_buffer_percent / 100;
        base + buffer
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: U256) -> Amount {
        gas_limit.saturating_mul(gas_price)
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(150_000, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_limit_buffer() {
        let estimator = GasEstimator::new(100_000, 20);
        assert_eq!(estimator.gas_limit(TransferKind::Lock), U256::from(120_000));
        assert_eq!(estimator.gas_limit(TransferKind::Mint), U256::from(180_000));
    }

    #[test]
    fn test_cost_saturates() {
        let limit = GasEstimator::default().gas_limit(TransferKind::Burn);
        assert_eq!(limit, U256::from(180_000));
        assert_eq!(GasEstimator::calculate_cost(limit, U256::from(3)), U256::from(540_000));
        assert_eq!(GasEstimator::calculate_cost(U256::MAX, U256::from(2)), U256::MAX);
    }
}
