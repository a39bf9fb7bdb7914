//! Validator registry: stake, activity and slashing

use crate::error::{BridgeResult, ValidationError};
use crate::types::Amount;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorInfo {
    pub address: Address,
    pub stake_amount: Amount,
    pub is_active: bool,
    pub last_validation_time: Option<DateTime<Utc>>,
    pub slashed_amount: Amount,
}

/// Who asks for a slash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashOrigin {
    /// The validator reporting its own misbehaviour
    Validator(Address),
    /// Bridge governance acting on peer evidence
    Governance,
}

impl fmt::Display for SlashOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlashOrigin::Validator(address) => write!(f, "validator {:?}", address),
            SlashOrigin::Governance => f.write_str("governance"),
        }
    }
}

pub struct ValidatorSet {
    validators: RwLock<HashMap<Address, ValidatorInfo>>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add(&self, address: Address, stake: Amount) -> BridgeResult<ValidatorInfo> {
        let mut validators = self.validators.write().await;
        if validators.contains_key(&address) {
            return Err(ValidationError::DuplicateValidator { address }.into());
        }
        let info = ValidatorInfo {
            address,
            stake_amount: stake,
            is_active: true,
            last_validation_time: None,
            slashed_amount: Amount::zero(),
        };
        validators.insert(address, info.clone());
        info!("Added validator {:?} with stake {}", address, stake);
        crate::metrics::record_active_validators(active_count(&validators));
        Ok(info)
    }

    pub async fn remove(&self, address: &Address) -> BridgeResult<ValidatorInfo> {
        let mut validators = self.validators.write().await;
        let info = validators
            .remove(address)
            .ok_or(ValidationError::UnknownValidator { address: *address })?;
        info!("Removed validator {:?}", address);
        crate::metrics::record_active_validators(active_count(&validators));
        Ok(info)
    }

    /// Registered and currently active
    pub async fn is_validator(&self, address: &Address) -> bool {
        self.validators
            .read()
            .await
            .get(address)
            .map(|v| v.is_active)
            .unwrap_or(false)
    }

    pub async fn get(&self, address: &Address) -> BridgeResult<ValidatorInfo> {
        self.validators
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownValidator { address: *address }.into())
    }

    pub async fn validators(&self) -> Vec<ValidatorInfo> {
        self.validators.read().await.values().cloned().collect()
    }

    /// Addresses whose attestations currently count toward consensus
    pub async fn authorized(&self) -> HashSet<Address> {
        self.validators
            .read()
            .await
            .values()
            .filter(|v| v.is_active)
            .map(|v| v.address)
            .collect()
    }

    /// Ensure `address` may sign right now
    pub async fn ensure_active(&self, address: &Address) -> BridgeResult<()> {
        let info = self.get(address).await?;
        if !info.is_active {
            return Err(ValidationError::InactiveValidator { address: *address }.into());
        }
        Ok(())
    }

    pub async fn record_validation(&self, address: &Address, at: DateTime<Utc>) {
        if let Some(info) = self.validators.write().await.get_mut(address) {
            info.last_validation_time = Some(at);
        }
    }

    /// Forfeit stake. `amount` of `None` slashes everything and deactivates
    /// the validator; a partial slash leaves it active while stake remains.
    pub async fn slash(
        &self,
        target: &Address,
        origin: SlashOrigin,
        amount: Option<Amount>,
    ) -> BridgeResult<ValidatorInfo> {
        let authorized = match origin {
            SlashOrigin::Validator(caller) => caller == *target,
            SlashOrigin::Governance => true,
        };
        if !authorized {
            return Err(ValidationError::SlashNotAuthorized {
                target: *target,
                origin: origin.to_string(),
            }
            .into());
        }

        let mut validators = self.validators.write().await;
        let info = validators
            .get_mut(target)
            .ok_or(ValidationError::UnknownValidator { address: *target })?;

        let amount = amount.unwrap_or(info.stake_amount);
        if amount > info.stake_amount {
            return Err(ValidationError::SlashExceedsStake {
                address: *target,
                requested: amount.to_string(),
                stake: info.stake_amount.to_string(),
            }
            .into());
        }

        info.stake_amount -= amount;
        info.slashed_amount += amount;
        if info.stake_amount.is_zero() {
            info.is_active = false;
        }

        warn!(
            "Slashed validator {:?} by {} ({}), remaining stake {}",
            target, amount, origin, info.stake_amount
        );
        let snapshot = info.clone();
        crate::metrics::record_active_validators(active_count(&validators));
        Ok(snapshot)
    }

    /// Re-admit a deactivated validator with fresh stake
    pub async fn reactivate(&self, address: &Address, stake: Amount) -> BridgeResult<ValidatorInfo> {
        let mut validators = self.validators.write().await;
        let info = validators
            .get_mut(address)
            .ok_or(ValidationError::UnknownValidator { address: *address })?;
        if info.is_active {
            return Err(ValidationError::ValidatorActive { address: *address }.into());
        }
        info.stake_amount = stake;
        info.is_active = true;
        info!("Reactivated validator {:?} with stake {}", address, stake);
        let snapshot = info.clone();
        crate::metrics::record_active_validators(active_count(&validators));
        Ok(snapshot)
    }
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self::new()
    }
}

fn active_count(validators: &HashMap<Address, ValidatorInfo>) -> usize {
    validators.values().filter(|v| v.is_active).count()
}
