//! Route selection and batch planning
//!
//! Routes are derived from chain and protocol configuration and recomputed
//! whenever a chain changes. `RouteOptimizer::select_route` scores candidate
//! protocols on fee, latency and security; `plan_batches` orders pending
//! transfers by value per unit of cost within each (token, route) group.

mod batch;
mod gas;
mod optimizer;
mod protocol;

pub use batch::{plan_batches, Batch, TransferCandidate};
pub use gas::GasEstimator;
pub use optimizer::{RouteOptimizer, RouteQuote, RouteRequest, DIRECT_ROUTE};
pub use protocol::{BridgeProtocol, BridgeRoute, RouteTable};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust level of a bridge protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

impl SecurityLevel {
    pub const MAX: SecurityLevel = SecurityLevel::High;

    pub fn value(self) -> u8 {
        match self {
            SecurityLevel::Low => 1,
            SecurityLevel::Medium => 2,
            SecurityLevel::High => 3,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
        };
        f.write_str(s)
    }
}
