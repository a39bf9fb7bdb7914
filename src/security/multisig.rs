//! Multi-signature verification of validator attestations

use crate::consensus::Attestation;
use crate::error::ValidationError;

use chrono::{DateTime, Duration, Utc};
use ethers::types::{Address, H256};
use std::collections::HashSet;
use tracing::debug;

/// Attestations older than this no longer count
pub const SIGNATURE_VALIDITY_SECS: i64 = 3600;

/// Clock skew tolerated on `signed_at` ahead of local time
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Outcome of checking a set of attestations for one transaction
#[derive(Debug, Clone, Default)]
pub struct ConsensusTally {
    /// Distinct authorized signers with a valid, unexpired attestation
    pub signers: HashSet<Address>,
    pub rejected: Vec<ValidationError>,
}

impl ConsensusTally {
    pub fn valid(&self) -> usize {
        self.signers.len()
    }

    pub fn meets(&self, threshold: usize) -> bool {
        self.valid() >= threshold
    }
}

/// Verify one attestation for `hash` and return the recovered signer
pub fn verify_attestation(
    hash: &H256,
    attestation: &Attestation,
    authorized: &HashSet<Address>,
    now: DateTime<Utc>,
) -> Result<Address, ValidationError> {
    if attestation.tx_hash != *hash {
        return Err(ValidationError::InvalidSignature {
            hash: *hash,
            message: format!("attestation is for {:?}", attestation.tx_hash),
        });
    }

    let age = now - attestation.signed_at;
    if -age > Duration::seconds(MAX_CLOCK_SKEW_SECS) {
        return Err(ValidationError::FutureSignature {
            hash: *hash,
            ahead_secs: (-age).num_seconds(),
        });
    }
    if age > Duration::seconds(SIGNATURE_VALIDITY_SECS) {
        return Err(ValidationError::ExpiredSignature {
            hash: *hash,
            age_secs: age.num_seconds(),
        });
    }

    let signer = attestation.recover_signer()?;
    if !authorized.contains(&signer) {
        return Err(ValidationError::UnauthorizedSigner {
            hash: *hash,
            signer,
        });
    }
    Ok(signer)
}

/// Count distinct authorized signers over `attestations`. A signer attesting
/// more than once counts once.
pub fn tally(
    hash: &H256,
    attestations: &[Attestation],
    authorized: &HashSet<Address>,
    now: DateTime<Utc>,
) -> ConsensusTally {
    let mut result = ConsensusTally::default();
    for attestation in attestations {
        match verify_attestation(hash, attestation, authorized, now) {
            Ok(signer) => {
                result.signers.insert(signer);
            }
            Err(e) => {
                debug!("Discarding attestation from {:?}: {}", attestation.validator, e);
                result.rejected.push(e);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{test_key, Validator, ValidatorSet};
    use ethers::types::U256;
    use std::sync::Arc;

    async fn validators(n: u64) -> (Arc<ValidatorSet>, Vec<Validator>) {
        let set = Arc::new(ValidatorSet::new());
        let mut out = Vec::new();
        for i in 1..=n {
            let v = Validator::from_key(&test_key(i), set.clone()).unwrap();
            set.add(v.address(), U256::from(100)).await.unwrap();
            out.push(v);
        }
        (set, out)
    }

    #[tokio::test]
    async fn test_duplicates_count_once() {
        let (set, vals) = validators(2).await;
        let hash = H256::repeat_byte(3);
        let now = Utc::now();

        let a = vals[0].sign_at(hash, now).await.unwrap();
        let again = vals[0].sign_at(hash, now - Duration::seconds(5)).await.unwrap();
        let authorized = set.authorized().await;

        let result = tally(&hash, &[a.clone(), again], &authorized, now);
        assert_eq!(result.valid(), 1);
        assert!(!result.meets(2));

        let b = vals[1].sign_at(hash, now).await.unwrap();
        let result = tally(&hash, &[a, b], &authorized, now);
        assert!(result.meets(2));
    }

    #[tokio::test]
    async fn test_expired_and_unauthorized_rejected() {
        let (set, vals) = validators(2).await;
        let hash = H256::repeat_byte(4);
        let now = Utc::now();

        let stale = vals[0]
            .sign_at(hash, now - Duration::seconds(SIGNATURE_VALIDITY_SECS + 1))
            .await
            .unwrap();
        let fresh = vals[1].sign_at(hash, now).await.unwrap();

        let mut authorized = set.authorized().await;
        authorized.remove(&vals[1].address());

        let result = tally(&hash, &[stale, fresh], &authorized, now);
        assert_eq!(result.valid(), 0);
        assert!(matches!(result.rejected[0], ValidationError::ExpiredSignature { .. }));
        assert!(matches!(result.rejected[1], ValidationError::UnauthorizedSigner { .. }));
    }

    #[tokio::test]
    async fn test_future_dated_signature_rejected() {
        let (set, vals) = validators(1).await;
        let hash = H256::repeat_byte(6);
        let now = Utc::now();
        let authorized = set.authorized().await;

        let presigned = vals[0]
            .sign_at(hash, now + Duration::days(3650))
            .await
            .unwrap();
        for at in [now, now + Duration::days(1825)] {
            let err = verify_attestation(&hash, &presigned, &authorized, at);
            assert!(matches!(err, Err(ValidationError::FutureSignature { .. })));
        }

        // small skew is tolerated
        let skewed = vals[0]
            .sign_at(hash, now + Duration::seconds(MAX_CLOCK_SKEW_SECS - 5))
            .await
            .unwrap();
        assert_eq!(
            verify_attestation(&hash, &skewed, &authorized, now).unwrap(),
            vals[0].address()
        );
    }

    #[tokio::test]
    async fn test_forged_identity_is_not_trusted() {
        let (set, vals) = validators(2).await;
        let hash = H256::repeat_byte(5);
        let now = Utc::now();

        // validator 0 signs but claims to be validator 1
        let mut forged = vals[0].sign_at(hash, now).await.unwrap();
        forged.validator = vals[1].address();
        let own = vals[0].sign_at(hash, now).await.unwrap();

        let result = tally(&hash, &[forged, own], &set.authorized().await, now);
        assert_eq!(result.valid(), 1);
        assert!(result.signers.contains(&vals[0].address()));
    }

    #[tokio::test]
    async fn test_wrong_hash_rejected() {
        let (set, vals) = validators(1).await;
        let now = Utc::now();
        let attestation = vals[0].sign_at(H256::repeat_byte(1), now).await.unwrap();
        let err = verify_attestation(&H256::repeat_byte(2), &attestation, &set.authorized().await, now);
        assert!(matches!(err, Err(ValidationError::InvalidSignature { .. })));
    }
}
