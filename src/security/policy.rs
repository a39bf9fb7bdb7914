//! Transfer admission policy: emergency halt, allow/deny lists, per-address
//! rate limiting and gas price ceiling

use crate::config::{SecurityConfig, SecurityConfigUpdate};
use crate::error::{BridgeResult, SecurityError};
use crate::types::Amount;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
struct EmergencyState {
    active: bool,
    last_toggle: Option<DateTime<Utc>>,
}

/// Shared policy engine consulted before every externally triggered transfer
pub struct SecurityPolicy {
    config: RwLock<SecurityConfig>,
    emergency: RwLock<EmergencyState>,
    /// Accepted transfer timestamps per sender, oldest first
    history: DashMap<Address, VecDeque<DateTime<Utc>>>,
    blacklist: RwLock<HashSet<Address>>,
    whitelist: RwLock<HashSet<Address>>,
}

impl SecurityPolicy {
    pub fn new(config: SecurityConfig) -> Self {
        let blacklist = parse_addresses(&config.blacklist);
        let whitelist = parse_addresses(&config.whitelist);
        Self {
            config: RwLock::new(config),
            emergency: RwLock::new(EmergencyState::default()),
            history: DashMap::new(),
            blacklist: RwLock::new(blacklist),
            whitelist: RwLock::new(whitelist),
        }
    }

    pub async fn config(&self) -> SecurityConfig {
        self.config.read().await.clone()
    }

    /// Merge a partial update. The stored configuration is left untouched
    /// if the merged result is invalid.
    pub async fn update_config(&self, update: SecurityConfigUpdate) -> BridgeResult<SecurityConfig> {
        let mut config = self.config.write().await;
        let mut merged = config.clone();
        merged.merge(update);
        merged.validate()?;
        *config = merged;
        info!("Security configuration updated: {:?}", *config);
        Ok(config.clone())
    }

    pub async fn multisig_threshold(&self) -> usize {
        self.config.read().await.multisig_threshold
    }

    pub async fn check_transfer(
        &self,
        sender: Address,
        recipient: Address,
        amount: Amount,
        gas_price: U256,
    ) -> BridgeResult<()> {
        self.check_transfer_at(sender, recipient, amount, gas_price, Utc::now())
            .await
    }

    /// Admit or reject a transfer; an accepted transfer is recorded against
    /// the sender's rate-limit window.
    pub async fn check_transfer_at(
        &self,
        sender: Address,
        recipient: Address,
        amount: Amount,
        gas_price: U256,
        now: DateTime<Utc>,
    ) -> BridgeResult<()> {
        let result = self
            .evaluate(sender, recipient, gas_price, now)
            .await;
        match &result {
            Ok(()) => debug!(
                "Admitted transfer of {} from {:?} to {:?}",
                amount, sender, recipient
            ),
            Err(e) => {
                warn!("Rejected transfer from {:?} to {:?}: {}", sender, recipient, e);
                crate::metrics::record_security_rejection(rejection_reason(e));
            }
        }
        result.map_err(Into::into)
    }

    async fn evaluate(
        &self,
        sender: Address,
        recipient: Address,
        gas_price: U256,
        now: DateTime<Utc>,
    ) -> Result<(), SecurityError> {
        if self.emergency.read().await.active {
            return Err(SecurityError::EmergencyActive);
        }

        let config = self.config.read().await.clone();

        if config.enforce_blacklist {
            let blacklist = self.blacklist.read().await;
            for address in [sender, recipient] {
                if blacklist.contains(&address) {
                    return Err(SecurityError::Blacklisted { address });
                }
            }
        }
        if config.enforce_whitelist {
            let whitelist = self.whitelist.read().await;
            for address in [sender, recipient] {
                if !whitelist.contains(&address) {
                    return Err(SecurityError::NotWhitelisted { address });
                }
            }
        }

        // entry guard keeps check-and-record atomic per sender
        let mut history = self.history.entry(sender).or_default();
        let window_start = now - Duration::seconds(config.rate_limit_window_secs as i64);
        while history.front().map(|t| *t <= window_start).unwrap_or(false) {
            history.pop_front();
        }
        if history.len() >= config.rate_limit_max_transfers {
            return Err(SecurityError::RateLimited {
                address: sender,
                count: history.len(),
                window_secs: config.rate_limit_window_secs,
            });
        }

        let ceiling = config.max_gas_price_wei();
        if gas_price > ceiling {
            return Err(SecurityError::GasPriceTooHigh {
                proposed: gas_price.to_string(),
                ceiling: ceiling.to_string(),
            });
        }

        history.push_back(now);
        Ok(())
    }

    /// Drop rate-limit windows with no transfers left after `now`'s cutoff.
    /// Returns the number of senders removed.
    pub async fn prune_history_at(&self, now: DateTime<Utc>) -> usize {
        let window_start =
            now - Duration::seconds(self.config.read().await.rate_limit_window_secs as i64);
        let before = self.history.len();
        self.history.retain(|_, history| {
            while history.front().map(|t| *t <= window_start).unwrap_or(false) {
                history.pop_front();
            }
            !history.is_empty()
        });
        before.saturating_sub(self.history.len())
    }

    /// Senders with a live rate-limit window
    pub fn tracked_senders(&self) -> usize {
        self.history.len()
    }

    pub async fn is_emergency(&self) -> bool {
        self.emergency.read().await.active
    }

    pub async fn enable_emergency(&self) -> BridgeResult<()> {
        self.set_emergency_at(true, Utc::now()).await
    }

    pub async fn disable_emergency(&self) -> BridgeResult<()> {
        self.set_emergency_at(false, Utc::now()).await
    }

    /// Toggle emergency mode. Any toggle within the cooldown of the previous
    /// one is rejected.
    pub async fn set_emergency_at(&self, active: bool, now: DateTime<Utc>) -> BridgeResult<()> {
        let cooldown = Duration::seconds(self.config.read().await.emergency_cooldown_secs as i64);
        let mut state = self.emergency.write().await;

        if state.active == active {
            return Err(SecurityError::EmergencyUnchanged {
                state: if active { "enabled" } else { "disabled" },
            }
            .into());
        }
        if let Some(last) = state.last_toggle {
            let elapsed = now - last;
            if elapsed < cooldown {
                return Err(SecurityError::EmergencyCooldown {
                    remaining_secs: (cooldown - elapsed).num_seconds().max(1),
                }
                .into());
            }
        }

        state.active = active;
        state.last_toggle = Some(now);
        if active {
            warn!("Emergency mode ENABLED, all transfers halted");
        } else {
            info!("Emergency mode disabled");
        }
        crate::metrics::record_emergency_mode(active);
        Ok(())
    }

    pub async fn add_to_blacklist(&self, address: Address) -> BridgeResult<()> {
        self.ensure_list_enabled("blacklist").await?;
        self.blacklist.write().await.insert(address);
        info!("Blacklisted {:?}", address);
        Ok(())
    }

    pub async fn remove_from_blacklist(&self, address: &Address) -> BridgeResult<bool> {
        self.ensure_list_enabled("blacklist").await?;
        Ok(self.blacklist.write().await.remove(address))
    }

    pub async fn add_to_whitelist(&self, address: Address) -> BridgeResult<()> {
        self.ensure_list_enabled("whitelist").await?;
        self.whitelist.write().await.insert(address);
        info!("Whitelisted {:?}", address);
        Ok(())
    }

    pub async fn remove_from_whitelist(&self, address: &Address) -> BridgeResult<bool> {
        self.ensure_list_enabled("whitelist").await?;
        Ok(self.whitelist.write().await.remove(address))
    }

    pub async fn is_blacklisted(&self, address: &Address) -> bool {
        self.blacklist.read().await.contains(address)
    }

    async fn ensure_list_enabled(&self, list: &'static str) -> BridgeResult<()> {
        let config = self.config.read().await;
        let enabled = match list {
            "blacklist" => config.enforce_blacklist,
            _ => config.enforce_whitelist,
        };
        if !enabled {
            return Err(SecurityError::ListDisabled { list }.into());
        }
        Ok(())
    }
}

fn parse_addresses(values: &[String]) -> HashSet<Address> {
    values
        .iter()
        .filter_map(|value| match Address::from_str(value) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!("Ignoring invalid list address {}: {}", value, e);
                None
            }
        })
        .collect()
}

fn rejection_reason(error: &SecurityError) -> &'static str {
    match error {
        SecurityError::EmergencyActive => "emergency",
        SecurityError::Blacklisted { .. } => "blacklisted",
        SecurityError::NotWhitelisted { .. } => "not_whitelisted",
        SecurityError::RateLimited { .. } => "rate_limited",
        SecurityError::GasPriceTooHigh { .. } => "gas_price",
        _ => "other",
    }
}
