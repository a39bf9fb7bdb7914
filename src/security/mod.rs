//! Security policy engine
//!
//! Every externally triggered transfer passes `SecurityPolicy::check_transfer`
//! and, when the token has bounds configured, `TokenPolicy::admit_at`.
//! Consensus on mint and unlock is checked with `multisig::tally`.

pub mod multisig;
mod policy;
mod token_policy;

pub use multisig::{tally, verify_attestation, ConsensusTally, SIGNATURE_VALIDITY_SECS};
pub use policy::SecurityPolicy;
pub use token_policy::TokenPolicy;
