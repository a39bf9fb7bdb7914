//! Validator attestations bound to a transaction hash

use crate::error::ValidationError;

use chrono::{DateTime, Utc};
use ethers::types::{Address, Signature, H256};
use sha3::{Digest, Keccak256};

/// A validator's signature over `keccak256(tx_hash || signed_at)`.
///
/// `validator` is the identity the attestation claims; verification trusts
/// only the address recovered from `signature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub validator: Address,
    pub tx_hash: H256,
    pub signed_at: DateTime<Utc>,
    pub signature: Signature,
}

impl Attestation {
    /// Digest that validators sign for `tx_hash` at `signed_at`
    pub fn payload(tx_hash: &H256, signed_at: DateTime<Utc>) -> H256 {
        let mut hasher = Keccak256::new();
        hasher.update(tx_hash.as_bytes());
        hasher.update(signed_at.timestamp().to_be_bytes());
        H256::from_slice(&hasher.finalize())
    }

    /// Recover the signing address from the signature
    pub fn recover_signer(&self) -> Result<Address, ValidationError> {
        let digest = Self::payload(&self.tx_hash, self.signed_at);
        self.signature
            .recover(digest)
            .map_err(|e| ValidationError::InvalidSignature {
                hash: self.tx_hash,
                message: e.to_string(),
            })
    }

    /// 65-byte signature, hex encoded
    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature.to_vec()))
    }
}
