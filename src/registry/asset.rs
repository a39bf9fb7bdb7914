//! Registered asset record and its balance arithmetic

use crate::error::{AssetError, BridgeError, BridgeResult};
use crate::types::{Amount, TransferKind};

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;

/// Default decimals for assets registered without explicit precision
pub const DEFAULT_DECIMALS: u8 = 18;

/// A bridged asset with its running locked/minted balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub symbol: String,
    pub token_address: Address,
    pub decimals: u8,
    pub locked_amount: Amount,
    pub minted_amount: Amount,
    /// Locked balance promised to in-flight unlocks and emergency withdrawals
    pub reserved_locked: Amount,
    /// Minted balance promised to in-flight burns
    pub reserved_minted: Amount,
    /// Ledger entries still PENDING that reference this asset
    pub pending_refs: u64,
    pub is_active: bool,
    pub last_update: DateTime<Utc>,
}

impl Asset {
    pub fn new(symbol: String, token_address: Address, decimals: u8, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            token_address,
            decimals,
            locked_amount: Amount::zero(),
            minted_amount: Amount::zero(),
            reserved_locked: Amount::zero(),
            reserved_minted: Amount::zero(),
            pending_refs: 0,
            is_active: true,
            last_update: now,
        }
    }

    /// Conserved quantity: locked + minted
    pub fn total_supply(&self) -> Amount {
        self.locked_amount.saturating_add(self.minted_amount)
    }

    /// Locked balance not yet promised to an in-flight transfer
    pub fn available_locked(&self) -> Amount {
        self.locked_amount.saturating_sub(self.reserved_locked)
    }

    /// Minted balance not yet promised to an in-flight transfer
    pub fn available_minted(&self) -> Amount {
        self.minted_amount.saturating_sub(self.reserved_minted)
    }

    pub(crate) fn ensure_active(&self) -> BridgeResult<()> {
        if !self.is_active {
            return Err(AssetError::Inactive {
                symbol: self.symbol.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Apply a balance mutation. Debits are checked against the unreserved
    /// balance plus `reserved`, the portion already set aside for this call.
    pub(crate) fn apply(
        &mut self,
        kind: TransferKind,
        amount: Amount,
        reserved: Amount,
        now: DateTime<Utc>,
    ) -> BridgeResult<()> {
        match kind {
            TransferKind::Lock => {
                self.locked_amount = checked_credit(&self.symbol, self.locked_amount, amount)?;
            }
            TransferKind::Mint => {
                self.minted_amount = checked_credit(&self.symbol, self.minted_amount, amount)?;
            }
            TransferKind::Unlock | TransferKind::EmergencyWithdraw => {
                let available = self.available_locked().saturating_add(reserved);
                ensure_covers(&self.symbol, "locked", available, amount)?;
                self.locked_amount -= amount;
                self.reserved_locked = self.reserved_locked.saturating_sub(reserved);
            }
            TransferKind::Burn => {
                let available = self.available_minted().saturating_add(reserved);
                ensure_covers(&self.symbol, "minted", available, amount)?;
                self.minted_amount -= amount;
                self.reserved_minted = self.reserved_minted.saturating_sub(reserved);
            }
        }
        self.last_update = now;
        Ok(())
    }

    /// Set aside balance for an in-flight debit
    pub(crate) fn reserve(&mut self, kind: TransferKind, amount: Amount) -> BridgeResult<()> {
        match kind {
            TransferKind::Unlock | TransferKind::EmergencyWithdraw => {
                ensure_covers(&self.symbol, "locked", self.available_locked(), amount)?;
                self.reserved_locked += amount;
            }
            TransferKind::Burn => {
                ensure_covers(&self.symbol, "minted", self.available_minted(), amount)?;
                self.reserved_minted += amount;
            }
            TransferKind::Lock | TransferKind::Mint => {}
        }
        Ok(())
    }

    /// Return a reservation that will not be consumed
    pub(crate) fn release(&mut self, kind: TransferKind, amount: Amount) {
        match kind {
            TransferKind::Unlock | TransferKind::EmergencyWithdraw => {
                self.reserved_locked = self.reserved_locked.saturating_sub(amount);
            }
            TransferKind::Burn => {
                self.reserved_minted = self.reserved_minted.saturating_sub(amount);
            }
            TransferKind::Lock | TransferKind::Mint => {}
        }
    }
}

fn checked_credit(symbol: &str, balance: Amount, amount: Amount) -> BridgeResult<Amount> {
    balance
        .checked_add(amount)
        .ok_or_else(|| BridgeError::TransferLimit {
            symbol: symbol.to_string(),
            bound: "balance capacity",
            amount: amount.to_string(),
            limit: (Amount::MAX - balance).to_string(),
        })
}

fn ensure_covers(
    symbol: &str,
    balance: &'static str,
    available: Amount,
    requested: Amount,
) -> BridgeResult<()> {
    if requested > available {
        return Err(BridgeError::InsufficientBalance {
            symbol: symbol.to_string(),
            balance,
            available: available.to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(())
}
