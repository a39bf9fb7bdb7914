//! Bridge protocols and the derived route table

use super::SecurityLevel;
use crate::config::{ChainConfig, FeeSchedule, ProtocolConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{Amount, ChainId};

use ethers::types::Address;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::debug;

const BPS_DENOMINATOR: u64 = 10_000;

/// A bridging mechanism for one directed chain pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeProtocol {
    pub name: String,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub contract_address: Address,
    pub supported_tokens: HashSet<String>,
    #[serde(skip)]
    pub fees: FeeSchedule,
    pub security_level: SecurityLevel,
    pub estimated_time_secs: u64,
    pub pending_deadline_secs: Option<u64>,
}

impl BridgeProtocol {
    pub fn from_config(config: &ProtocolConfig) -> BridgeResult<Self> {
        let contract_address = Address::from_str(&config.contract_address).map_err(|e| {
            BridgeError::Config(format!(
                "Protocol {} has invalid contract address: {}",
                config.name, e
            ))
        })?;
        Ok(Self {
            name: config.name.clone(),
            source_chain: config.source_chain,
            target_chain: config.target_chain,
            contract_address,
            supported_tokens: config.supported_tokens.iter().cloned().collect(),
            fees: config.fee_schedule()?,
            security_level: config.security_level,
            estimated_time_secs: config.estimated_time_secs,
            pending_deadline_secs: config.pending_deadline_secs,
        })
    }

    /// `base + amount * bps / 10000`, clamped to `[min_fee, max_fee]`
    pub fn fee_for(&self, amount: Amount) -> Amount {
        let proportional = amount.full_mul(self.fees.fee_bps.into()) / BPS_DENOMINATOR;
        let fee = Amount::try_from(proportional)
            .unwrap_or(Amount::MAX)
            .saturating_add(self.fees.base_fee);
        fee.clamp(self.fees.min_fee, self.fees.max_fee)
    }

    pub fn supports(&self, symbol: &str) -> bool {
        self.supported_tokens.contains(symbol)
    }
}

/// Everything available for one directed chain pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeRoute {
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    /// Both chains share a low-latency subnet
    pub direct: bool,
    pub protocols: Vec<BridgeProtocol>,
}

/// Routes keyed by (source, target)
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(ChainId, ChainId), BridgeRoute>,
}

impl RouteTable {
    /// Derive routes from the enabled chains. Protocol token support is
    /// narrowed to tokens both endpoints list, when they list any.
    pub fn build(chains: &HashMap<String, ChainConfig>, protocols: &[BridgeProtocol]) -> Self {
        let enabled: Vec<&ChainConfig> = chains.values().filter(|c| c.enabled).collect();
        let mut routes = HashMap::new();

        for source in &enabled {
            for target in &enabled {
                if source.chain_id == target.chain_id {
                    continue;
                }
                let direct = source.shares_subnet_with(target);
                let candidates: Vec<BridgeProtocol> = protocols
                    .iter()
                    .filter(|p| p.source_chain == source.chain_id && p.target_chain == target.chain_id)
                    .map(|p| {
                        let mut p = p.clone();
                        p.supported_tokens
                            .retain(|t| chain_lists(source, t) && chain_lists(target, t));
                        p
                    })
                    .collect();

                if direct || !candidates.is_empty() {
                    routes.insert(
                        (source.chain_id, target.chain_id),
                        BridgeRoute {
                            source_chain: source.chain_id,
                            target_chain: target.chain_id,
                            direct,
                            protocols: candidates,
                        },
                    );
                }
            }
        }

        debug!("Route table rebuilt with {} routes", routes.len());
        Self { routes }
    }

    pub fn get(&self, source: ChainId, target: ChainId) -> Option<&BridgeRoute> {
        self.routes.get(&(source, target))
    }

    pub fn routes(&self) -> impl Iterator<Item = &BridgeRoute> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn chain_lists(chain: &ChainConfig, symbol: &str) -> bool {
    chain.supported_tokens.is_empty() || chain.supported_tokens.iter().any(|t| t == symbol)
}
