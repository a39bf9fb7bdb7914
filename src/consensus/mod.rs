//! Validator set and attestation signing
//!
//! Validators sign a keccak digest binding the transaction hash and signing
//! time. Counting those signatures against the multi-signature threshold is
//! the security engine's job (see `security::multisig`).

mod attestation;
mod signer;
mod validator_set;

pub use attestation::Attestation;
pub use signer::Validator;
pub use validator_set::{SlashOrigin, ValidatorInfo, ValidatorSet};

#[cfg(test)]
pub(crate) use signer::tests::test_key;
