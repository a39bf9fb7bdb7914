//! Bridge coordinator - custody and transfer accounting for cross-chain assets
//!
//! One `Bridge` instance runs per network and accounts for the assets locked
//! or minted there. Every transfer moves through a PENDING-to-terminal state
//! machine; inbound transfers also need validator multi-signature consensus.

pub mod api;
pub mod bridge;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod routing;
pub mod security;
pub mod types;

pub use bridge::{Bridge, BridgeEngine, BridgeFacade, BridgeOptions, TransferRequest};
pub use error::{BridgeError, BridgeResult};
