//! Asset registry and conservation accounting
//!
//! Maps symbolic asset ids to token addresses and tracks the locked/minted
//! balances behind every transfer. Balance mutations for one symbol are
//! serialized through that asset's own mutex; registration and removal take
//! the index write lock so both uniqueness keys are checked atomically.

mod asset;

pub use asset::{Asset, DEFAULT_DECIMALS};

use crate::error::{AssetError, BridgeError, BridgeResult};
use crate::types::{Amount, TransferKind};

use chrono::{DateTime, Utc};
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Default)]
struct Index {
    by_symbol: HashMap<String, Arc<Mutex<Asset>>>,
    by_token: HashMap<Address, String>,
}

/// Authoritative symbol -> asset mapping
pub struct AssetRegistry {
    index: RwLock<Index>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
        }
    }

    /// Register an asset with the default 18 decimals
    pub async fn register(&self, symbol: &str, token_address: Address) -> BridgeResult<Asset> {
        self.register_with_decimals(symbol, token_address, DEFAULT_DECIMALS)
            .await
    }

    /// Register an asset. Both the symbol and the token address must be unused.
    pub async fn register_with_decimals(
        &self,
        symbol: &str,
        token_address: Address,
        decimals: u8,
    ) -> BridgeResult<Asset> {
        let mut index = self.index.write().await;

        if index.by_symbol.contains_key(symbol) {
            return Err(AssetError::DuplicateSymbol {
                symbol: symbol.to_string(),
            }
            .into());
        }
        if let Some(existing) = index.by_token.get(&token_address) {
            return Err(AssetError::DuplicateToken {
                token: token_address,
                symbol: existing.clone(),
            }
            .into());
        }

        let asset = Asset::new(symbol.to_string(), token_address, decimals, Utc::now());
        index
            .by_symbol
            .insert(symbol.to_string(), Arc::new(Mutex::new(asset.clone())));
        index.by_token.insert(token_address, symbol.to_string());

        info!("Registered asset {} at {:?}", symbol, token_address);
        Ok(asset)
    }

    /// Remove an asset. Fails while PENDING transactions still reference it.
    pub async fn unregister(&self, symbol: &str) -> BridgeResult<Asset> {
        let mut index = self.index.write().await;

        let entry = index
            .by_symbol
            .get(symbol)
            .cloned()
            .ok_or_else(|| unknown(symbol))?;
        let asset = entry.lock().await.clone();

        if asset.pending_refs > 0 {
            return Err(AssetError::PendingReferences {
                symbol: symbol.to_string(),
                pending: asset.pending_refs,
            }
            .into());
        }

        index.by_symbol.remove(symbol);
        index.by_token.remove(&asset.token_address);

        info!("Unregistered asset {}", symbol);
        Ok(asset)
    }

    pub async fn is_supported(&self, symbol: &str) -> bool {
        self.index.read().await.by_symbol.contains_key(symbol)
    }

    /// Snapshot of an asset
    pub async fn get(&self, symbol: &str) -> BridgeResult<Asset> {
        let entry = self.entry(symbol).await?;
        let asset = entry.lock().await.clone();
        Ok(asset)
    }

    /// Resolve the symbol registered for a token address
    pub async fn symbol_for_token(&self, token_address: &Address) -> BridgeResult<String> {
        self.index
            .read()
            .await
            .by_token
            .get(token_address)
            .cloned()
            .ok_or_else(|| {
                AssetError::UnknownToken {
                    token: *token_address,
                }
                .into()
            })
    }

    /// Snapshots of every registered asset
    pub async fn list(&self) -> Vec<Asset> {
        let entries: Vec<_> = self.index.read().await.by_symbol.values().cloned().collect();
        let mut assets = Vec::with_capacity(entries.len());
        for entry in entries {
            assets.push(entry.lock().await.clone());
        }
        assets
    }

    pub async fn total_supply(&self, symbol: &str) -> BridgeResult<Amount> {
        Ok(self.get(symbol).await?.total_supply())
    }

    pub async fn set_active(&self, symbol: &str, active: bool) -> BridgeResult<Asset> {
        let entry = self.entry(symbol).await?;
        let mut asset = entry.lock().await;
        asset.is_active = active;
        asset.last_update = Utc::now();
        info!("Asset {} active = {}", symbol, active);
        Ok(asset.clone())
    }

    pub async fn lock(&self, symbol: &str, amount: Amount) -> BridgeResult<Asset> {
        self.mutate(symbol, TransferKind::Lock, amount, Utc::now()).await
    }

    pub async fn unlock(&self, symbol: &str, amount: Amount) -> BridgeResult<Asset> {
        self.mutate(symbol, TransferKind::Unlock, amount, Utc::now()).await
    }

    pub async fn mint(&self, symbol: &str, amount: Amount) -> BridgeResult<Asset> {
        self.mutate(symbol, TransferKind::Mint, amount, Utc::now()).await
    }

    pub async fn burn(&self, symbol: &str, amount: Amount) -> BridgeResult<Asset> {
        self.mutate(symbol, TransferKind::Burn, amount, Utc::now()).await
    }

    /// Apply a balance mutation immediately
    pub async fn mutate(
        &self,
        symbol: &str,
        kind: TransferKind,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> BridgeResult<Asset> {
        let entry = self.entry(symbol).await?;
        let mut asset = entry.lock().await;
        asset.apply(kind, amount, Amount::zero(), now)?;
        debug!(
            "{} {} {}: locked={} minted={}",
            kind, amount, symbol, asset.locked_amount, asset.minted_amount
        );
        Ok(asset.clone())
    }

    /// Open a pending reference for a transfer about to be submitted.
    ///
    /// Debiting kinds reserve `amount` so concurrent requests cannot promise
    /// the same balance twice.
    pub async fn reserve(
        &self,
        symbol: &str,
        kind: TransferKind,
        amount: Amount,
    ) -> BridgeResult<Asset> {
        // the index guard is held until the reference is counted, so
        // `unregister` cannot remove the asset in between
        let index = self.index.read().await;
        let entry = index.by_symbol.get(symbol).ok_or_else(|| unknown(symbol))?;
        let mut asset = entry.lock().await;
        asset.ensure_active()?;
        asset.reserve(kind, amount)?;
        asset.pending_refs += 1;
        Ok(asset.clone())
    }

    /// Reserve the whole unreserved locked balance for an emergency
    /// withdrawal. Allowed on inactive assets.
    pub async fn reserve_for_withdrawal(&self, symbol: &str) -> BridgeResult<Amount> {
        let index = self.index.read().await;
        let entry = index.by_symbol.get(symbol).ok_or_else(|| unknown(symbol))?;
        let mut asset = entry.lock().await;
        let amount = asset.available_locked();
        if amount.is_zero() {
            return Err(BridgeError::InsufficientBalance {
                symbol: symbol.to_string(),
                balance: "locked",
                available: "0".to_string(),
                requested: "all".to_string(),
            });
        }
        asset.reserve(TransferKind::EmergencyWithdraw, amount)?;
        asset.pending_refs += 1;
        Ok(amount)
    }

    /// Close a pending reference by applying the confirmed mutation
    pub async fn settle(
        &self,
        symbol: &str,
        kind: TransferKind,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> BridgeResult<Asset> {
        let entry = self.entry(symbol).await?;
        let mut asset = entry.lock().await;
        let reserved = if kind.debits_balance() {
            amount
        } else {
            Amount::zero()
        };
        asset.apply(kind, amount, reserved, now)?;
        asset.pending_refs = asset.pending_refs.saturating_sub(1);
        debug!(
            "Settled {} {} {}: locked={} minted={}",
            kind, amount, symbol, asset.locked_amount, asset.minted_amount
        );
        Ok(asset.clone())
    }

    /// Close a pending reference without mutating balances
    pub async fn release(
        &self,
        symbol: &str,
        kind: TransferKind,
        amount: Amount,
    ) -> BridgeResult<Asset> {
        let entry = self.entry(symbol).await?;
        let mut asset = entry.lock().await;
        asset.release(kind, amount);
        asset.pending_refs = asset.pending_refs.saturating_sub(1);
        Ok(asset.clone())
    }

    async fn entry(&self, symbol: &str) -> BridgeResult<Arc<Mutex<Asset>>> {
        self.index
            .read()
            .await
            .by_symbol
            .get(symbol)
            .cloned()
            .ok_or_else(|| unknown(symbol))
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(symbol: &str) -> crate::error::BridgeError {
    AssetError::UnknownAsset {
        symbol: symbol.to_string(),
    }
    .into()
}
