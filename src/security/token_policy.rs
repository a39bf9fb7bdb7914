//! Per-token transfer bounds and rolling daily caps

use crate::config::TokenLimits;
use crate::error::{BridgeError, BridgeResult};
use crate::types::Amount;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const DAILY_WINDOW_SECS: i64 = 86_400;

pub struct TokenPolicy {
    limits: RwLock<HashMap<String, TokenLimits>>,
    /// Admitted transfers per symbol within the daily window, oldest first
    usage: DashMap<String, VecDeque<(DateTime<Utc>, Amount)>>,
}

impl TokenPolicy {
    pub fn new(limits: HashMap<String, TokenLimits>) -> Self {
        Self {
            limits: RwLock::new(limits),
            usage: DashMap::new(),
        }
    }

    pub async fn set_limits(&self, symbol: &str, limits: TokenLimits) {
        self.limits.write().await.insert(symbol.to_string(), limits);
    }

    pub async fn limits(&self, symbol: &str) -> Option<TokenLimits> {
        self.limits.read().await.get(symbol).cloned()
    }

    /// Check `amount` against the token's bounds and record it toward the
    /// daily cap. Tokens without a policy are unbounded.
    pub async fn admit_at(&self, symbol: &str, amount: Amount, now: DateTime<Utc>) -> BridgeResult<()> {
        let Some(limits) = self.limits(symbol).await else {
            return Ok(());
        };

        let violation = |bound: &'static str, limit: Amount| BridgeError::TransferLimit {
            symbol: symbol.to_string(),
            bound,
            amount: amount.to_string(),
            limit: limit.to_string(),
        };

        if amount < limits.min_transfer {
            return Err(violation("minimum transfer", limits.min_transfer));
        }
        if amount > limits.max_transfer {
            return Err(violation("maximum transfer", limits.max_transfer));
        }

        let mut window = self.usage.entry(symbol.to_string()).or_default();
        let cutoff = now - Duration::seconds(DAILY_WINDOW_SECS);
        while window.front().map(|(t, _)| *t <= cutoff).unwrap_or(false) {
            window.pop_front();
        }
        let used = window
            .iter()
            .fold(Amount::zero(), |acc, (_, a)| acc.saturating_add(*a));
        if used.saturating_add(amount) > limits.daily_cap {
            warn!(
                "Daily cap reached for {}: used {}, requested {}, cap {}",
                symbol, used, amount, limits.daily_cap
            );
            return Err(violation("daily cap", limits.daily_cap));
        }

        window.push_back((now, amount));
        debug!("Admitted {} {} against daily cap", amount, symbol);
        Ok(())
    }

    /// Return an admitted amount to the daily cap. Removes the entry
    /// recorded by `admit_at(symbol, amount, at)`; false when none matches.
    pub fn refund(&self, symbol: &str, amount: Amount, at: DateTime<Utc>) -> bool {
        let Some(mut window) = self.usage.get_mut(symbol) else {
            return false;
        };
        match window.iter().position(|(t, a)| *t == at && *a == amount) {
            Some(index) => {
                window.remove(index);
                debug!("Refunded {} {} to daily cap", amount, symbol);
                true
            }
            None => false,
        }
    }

    /// Amount admitted for `symbol` in the 24 hours before `now`
    pub fn daily_usage_at(&self, symbol: &str, now: DateTime<Utc>) -> Amount {
        let cutoff = now - Duration::seconds(DAILY_WINDOW_SECS);
        self.usage
            .get(symbol)
            .map(|w| {
                w.iter()
                    .filter(|(t, _)| *t > cutoff)
                    .fold(Amount::zero(), |acc, (_, a)| acc.saturating_add(*a))
            })
            .unwrap_or_default()
    }
}
