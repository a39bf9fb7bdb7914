//! Multi-objective route selection

use super::protocol::{BridgeProtocol, BridgeRoute, RouteTable};
use super::SecurityLevel;
use crate::config::{ChainConfig, ChainConfigUpdate, ProtocolConfig, RoutingConfig, RoutingWeightsUpdate};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{ratio, Amount, ChainId};

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Route name recorded for same-subnet transfers
pub const DIRECT_ROUTE: &str = "direct";

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub symbol: String,
    pub amount: Amount,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub min_security: SecurityLevel,
    /// Reject protocols charging more than this
    pub max_fee: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteQuote {
    pub route: String,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub fee: Amount,
    pub estimated_time_secs: u64,
    pub security_level: SecurityLevel,
    pub score: f64,
}

impl RouteQuote {
    pub fn is_direct(&self) -> bool {
        self.route == DIRECT_ROUTE
    }
}

pub struct RouteOptimizer {
    chains: RwLock<HashMap<String, ChainConfig>>,
    protocols: Vec<BridgeProtocol>,
    table: RwLock<RouteTable>,
    config: RwLock<RoutingConfig>,
}

impl RouteOptimizer {
    pub fn new(
        chains: HashMap<String, ChainConfig>,
        protocols: &[ProtocolConfig],
        config: RoutingConfig,
    ) -> BridgeResult<Self> {
        config.validate()?;
        let protocols = protocols
            .iter()
            .map(BridgeProtocol::from_config)
            .collect::<BridgeResult<Vec<_>>>()?;
        let table = RouteTable::build(&chains, &protocols);
        info!(
            "Route optimizer ready with {} protocols over {} routes",
            protocols.len(),
            table.len()
        );

        Ok(Self {
            chains: RwLock::new(chains),
            protocols,
            table: RwLock::new(table),
            config: RwLock::new(config),
        })
    }

    pub async fn routing_config(&self) -> RoutingConfig {
        self.config.read().await.clone()
    }

    /// Merge new weights; rejected if they no longer sum to 1
    pub async fn update_weights(&self, update: RoutingWeightsUpdate) -> BridgeResult<RoutingConfig> {
        let mut config = self.config.write().await;
        let mut merged = config.clone();
        merged.merge(update);
        merged.validate()?;
        *config = merged;
        info!(
            "Routing weights updated: fee={} time={} security={}",
            config.fee_weight, config.time_weight, config.security_weight
        );
        Ok(config.clone())
    }

    /// Apply a partial chain update and recompute every route. The stored
    /// chain is left untouched if the merged result is invalid.
    pub async fn update_chain(&self, name: &str, update: ChainConfigUpdate) -> BridgeResult<ChainConfig> {
        let mut chains = self.chains.write().await;
        let chain = chains
            .get_mut(name)
            .ok_or_else(|| BridgeError::Config(format!("Unknown chain {}", name)))?;
        let mut updated = chain.clone();
        updated.merge(update);
        updated.validate(name)?;
        *chain = updated.clone();

        *self.table.write().await = RouteTable::build(&chains, &self.protocols);
        info!("Chain {} updated, routes recomputed", name);
        Ok(updated)
    }

    pub async fn chain(&self, name: &str) -> Option<ChainConfig> {
        self.chains.read().await.get(name).cloned()
    }

    pub async fn route(&self, source: ChainId, target: ChainId) -> Option<BridgeRoute> {
        self.table.read().await.get(source, target).cloned()
    }

    pub async fn routes(&self) -> Vec<BridgeRoute> {
        self.table.read().await.routes().cloned().collect()
    }

    pub fn protocol(&self, name: &str) -> Option<&BridgeProtocol> {
        self.protocols.iter().find(|p| p.name == name)
    }

    /// Deadline override configured for a protocol
    pub fn pending_deadline_for(&self, route: &str) -> Option<u64> {
        self.protocol(route).and_then(|p| p.pending_deadline_secs)
    }

    /// Choose the best protocol for `request`
    pub async fn select_route(&self, request: &RouteRequest) -> BridgeResult<RouteQuote> {
        let no_route = || BridgeError::NoRoute {
            symbol: request.symbol.clone(),
            source_chain: request.source_chain,
            target_chain: request.target_chain,
        };

        if request.source_chain == request.target_chain {
            return Ok(direct_quote(request));
        }

        let route = self
            .route(request.source_chain, request.target_chain)
            .await
            .ok_or_else(no_route)?;
        if route.direct {
            debug!(
                "Chains {} and {} share a subnet, bypassing scoring",
                request.source_chain, request.target_chain
            );
            return Ok(direct_quote(request));
        }

        let config = self.config.read().await.clone();
        let min_security = request.min_security.max(config.min_security);

        let candidates: Vec<(&BridgeProtocol, Amount)> = route
            .protocols
            .iter()
            .filter(|p| p.security_level >= min_security && p.supports(&request.symbol))
            .map(|p| (p, p.fee_for(request.amount)))
            .filter(|(_, fee)| request.max_fee.map(|max| *fee <= max).unwrap_or(true))
            .collect();

        let max_fee = candidates.iter().map(|(_, fee)| *fee).max().unwrap_or_default();
        let max_time = candidates
            .iter()
            .map(|(p, _)| p.estimated_time_secs)
            .max()
            .unwrap_or_default();

        let mut best: Option<RouteQuote> = None;
        for (protocol, fee) in candidates {
            let normalized_fee = if max_fee.is_zero() { 0.0 } else { ratio(fee, max_fee) };
            let normalized_time = if max_time == 0 {
                0.0
            } else {
                protocol.estimated_time_secs as f64 / max_time as f64
            };
            let security = protocol.security_level.value() as f64 / SecurityLevel::MAX.value() as f64;

            let score = config.fee_weight * (1.0 - normalized_fee)
                + config.time_weight * (1.0 - normalized_time)
                + config.security_weight * security;

            debug!("Protocol {} scored {:.4} (fee {})", protocol.name, score, fee);

            // strict comparison keeps the first-seen protocol on ties
            if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                best = Some(RouteQuote {
                    route: protocol.name.clone(),
                    source_chain: request.source_chain,
                    target_chain: request.target_chain,
                    fee,
                    estimated_time_secs: protocol.estimated_time_secs,
                    security_level: protocol.security_level,
                    score,
                });
            }
        }

        best.ok_or_else(no_route)
    }
}

fn direct_quote(request: &RouteRequest) -> RouteQuote {
    RouteQuote {
        route: DIRECT_ROUTE.to_string(),
        source_chain: request.source_chain,
        target_chain: request.target_chain,
        fee: Amount::zero(),
        estimated_time_secs: 0,
        security_level: SecurityLevel::MAX,
        score: 1.0,
    }
}
