//! Local validator identity producing attestations

use super::{Attestation, SlashOrigin, ValidatorInfo, ValidatorSet};
use crate::error::{BridgeResult, ValidationError};
use crate::types::Amount;

use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A validator holding its own secp256k1 key
pub struct Validator {
    wallet: LocalWallet,
    set: Arc<ValidatorSet>,
    signatures: RwLock<HashMap<H256, Attestation>>,
}

impl Validator {
    pub fn new(wallet: LocalWallet, set: Arc<ValidatorSet>) -> Self {
        Self {
            wallet,
            set,
            signatures: RwLock::new(HashMap::new()),
        }
    }

    /// Build from a hex private key
    pub fn from_key(private_key: &str, set: Arc<ValidatorSet>) -> BridgeResult<Self> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| ValidationError::Signing {
                address: Address::zero(),
                message: format!("Invalid private key: {}", e),
            })?;
        Ok(Self::new(wallet, set))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Attest to `hash`. Fails if this validator is not active in the set.
    pub async fn sign(&self, hash: H256) -> BridgeResult<Attestation> {
        self.sign_at(hash, Utc::now()).await
    }

    pub async fn sign_at(&self, hash: H256, now: DateTime<Utc>) -> BridgeResult<Attestation> {
        let address = self.address();
        self.set.ensure_active(&address).await?;

        let digest = Attestation::payload(&hash, now);
        let signature = self
            .wallet
            .sign_hash(digest)
            .map_err(|e| ValidationError::Signing {
                address,
                message: e.to_string(),
            })?;

        let attestation = Attestation {
            validator: address,
            tx_hash: hash,
            signed_at: now,
            signature,
        };

        self.signatures.write().await.insert(hash, attestation.clone());
        self.set.record_validation(&address, now).await;
        debug!("Validator {:?} signed {:?}", address, hash);

        Ok(attestation)
    }

    /// Previously produced attestation for `hash`
    pub async fn get_signature(&self, hash: &H256) -> BridgeResult<Attestation> {
        self.signatures
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| {
                ValidationError::MissingSignature {
                    address: self.address(),
                    hash: *hash,
                }
                .into()
            })
    }

    /// Self-reported slash
    pub async fn slash_self(&self, amount: Option<Amount>) -> BridgeResult<ValidatorInfo> {
        let address = self.address();
        self.set
            .slash(&address, SlashOrigin::Validator(address), amount)
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::BridgeError;
    use ethers::types::U256;

    /// Deterministic test key for index `i` (must be non-zero)
    pub(crate) fn test_key(i: u64) -> String {
        format!("{:064x}", i)
    }

    #[tokio::test]
    async fn test_sign_and_recover() {
        let set = Arc::new(ValidatorSet::new());
        let validator = Validator::from_key(&test_key(1), set.clone()).unwrap();
        set.add(validator.address(), U256::from(100)).await.unwrap();

        let hash = H256::repeat_byte(7);
        let attestation = validator.sign(hash).await.unwrap();
        assert_eq!(attestation.recover_signer().unwrap(), validator.address());
        assert_eq!(validator.get_signature(&hash).await.unwrap(), attestation);

        let info = set.get(&validator.address()).await.unwrap();
        assert_eq!(info.last_validation_time, Some(attestation.signed_at));
    }

    #[tokio::test]
    async fn test_tampered_timestamp_changes_signer() {
        let set = Arc::new(ValidatorSet::new());
        let validator = Validator::from_key(&test_key(2), set.clone()).unwrap();
        set.add(validator.address(), U256::from(100)).await.unwrap();

        let mut attestation = validator.sign(H256::repeat_byte(1)).await.unwrap();
        attestation.signed_at = attestation.signed_at + chrono::Duration::hours(5);
        let recovered = attestation.recover_signer();
        assert!(recovered.map(|a| a != validator.address()).unwrap_or(true));
    }

    #[tokio::test]
    async fn test_inactive_validator_cannot_sign() {
        let set = Arc::new(ValidatorSet::new());
        let validator = Validator::from_key(&test_key(3), set.clone()).unwrap();
        set.add(validator.address(), U256::from(100)).await.unwrap();
        validator.slash_self(None).await.unwrap();

        let err = validator.sign(H256::zero()).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Validation(ValidationError::InactiveValidator { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_signature() {
        let set = Arc::new(ValidatorSet::new());
        let validator = Validator::from_key(&test_key(4), set).unwrap();
        let err = validator.get_signature(&H256::zero()).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Validation(ValidationError::MissingSignature { .. })
        ));
    }
}
