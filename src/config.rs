//! Configuration management for the bridge coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Security and routing parameters can also be changed at runtime through
//! merge-style partial updates.

use crate::error::{BridgeError, BridgeResult};
use crate::routing::SecurityLevel;
use crate::types::{Amount, ChainId};

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub token_policies: HashMap<String, TokenPolicyConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub protocols: Vec<ProtocolConfig>,
    /// Assets registered at startup
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    /// Validators admitted at startup
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    pub chains: HashMap<String, ChainConfig>,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub instance_id: String,
    /// Key into `chains` for the network this bridge instance runs against
    pub chain: String,
    /// Key into `chains` for the counterpart network
    pub counterpart_chain: String,
    pub process_interval_ms: u64,
    pub sweep_interval_secs: u64,
    /// PENDING entries older than this are cancelled by the sweep
    pub pending_deadline_secs: u64,
    /// Terminal entries older than this are moved to the archive
    pub archive_retention_secs: u64,
    /// Private key of the coordinator's submitting account
    pub operator_key_env: Option<String>,
    /// Private key of a validator hosted in this process
    pub validator_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub token_address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    crate::registry::DEFAULT_DECIMALS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub address: String,
    pub stake: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SecurityConfig {
    pub multisig_threshold: usize,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_transfers: usize,
    pub emergency_cooldown_secs: u64,
    pub max_gas_price_gwei: u64,
    pub enforce_blacklist: bool,
    pub enforce_whitelist: bool,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            multisig_threshold: 2,
            rate_limit_window_secs: 3600,
            rate_limit_max_transfers: 10,
            emergency_cooldown_secs: 300,
            max_gas_price_gwei: 500,
            enforce_blacklist: true,
            enforce_whitelist: false,
            blacklist: Vec::new(),
            whitelist: Vec::new(),
        }
    }
}

impl SecurityConfig {
    /// Gas price ceiling in wei
    pub fn max_gas_price_wei(&self) -> U256 {
        U256::from(self.max_gas_price_gwei) * U256::exp10(9)
    }

    /// Apply a partial update, leaving unspecified fields untouched
    pub fn merge(&mut self, update: SecurityConfigUpdate) {
        if let Some(v) = update.multisig_threshold {
            self.multisig_threshold = v;
        }
        if let Some(v) = update.rate_limit_window_secs {
            self.rate_limit_window_secs = v;
        }
        if let Some(v) = update.rate_limit_max_transfers {
            self.rate_limit_max_transfers = v;
        }
        if let Some(v) = update.emergency_cooldown_secs {
            self.emergency_cooldown_secs = v;
        }
        if let Some(v) = update.max_gas_price_gwei {
            self.max_gas_price_gwei = v;
        }
        if let Some(v) = update.enforce_blacklist {
            self.enforce_blacklist = v;
        }
        if let Some(v) = update.enforce_whitelist {
            self.enforce_whitelist = v;
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.multisig_threshold == 0 {
            return Err(BridgeError::Config(
                "multisig_threshold must be at least 1".to_string(),
            ));
        }
        if self.rate_limit_window_secs == 0 || self.rate_limit_max_transfers == 0 {
            return Err(BridgeError::Config(
                "rate limit window and max transfers must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`SecurityConfig`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfigUpdate {
    pub multisig_threshold: Option<usize>,
    pub rate_limit_window_secs: Option<u64>,
    pub rate_limit_max_transfers: Option<usize>,
    pub emergency_cooldown_secs: Option<u64>,
    pub max_gas_price_gwei: Option<u64>,
    pub enforce_blacklist: Option<bool>,
    pub enforce_whitelist: Option<bool>,
}

/// Per-token transfer bounds. Amounts are decimal strings in base units.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPolicyConfig {
    pub min_transfer: String,
    pub max_transfer: String,
    pub daily_cap: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RoutingConfig {
    pub fee_weight: f64,
    pub time_weight: f64,
    pub security_weight: f64,
    pub batch_size: usize,
    pub min_security: SecurityLevel,
    /// Gas units charged per bridge operation when estimating batch cost
    pub gas_per_transfer: u64,
    pub gas_buffer_percent: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fee_weight: 0.4,
            time_weight: 0.3,
            security_weight: 0.3,
            batch_size: 50,
            min_security: SecurityLevel::Low,
            gas_per_transfer: 150_000,
            gas_buffer_percent: 20,
        }
    }
}

impl RoutingConfig {
    pub fn merge(&mut self, update: RoutingWeightsUpdate) {
        if let Some(v) = update.fee_weight {
            self.fee_weight = v;
        }
        if let Some(v) = update.time_weight {
            self.time_weight = v;
        }
        if let Some(v) = update.security_weight {
            self.security_weight = v;
        }
        if let Some(v) = update.batch_size {
            self.batch_size = v;
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        let sum = self.fee_weight + self.time_weight + self.security_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(BridgeError::Config(format!(
                "routing weights must sum to 1, got {}",
                sum
            )));
        }
        if [self.fee_weight, self.time_weight, self.security_weight]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(BridgeError::Config(
                "routing weights must be non-negative".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(BridgeError::Config("batch_size must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Partial update for routing weights and batch size
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingWeightsUpdate {
    pub fee_weight: Option<f64>,
    pub time_weight: Option<f64>,
    pub security_weight: Option<f64>,
    pub batch_size: Option<usize>,
}

/// A bridge protocol available between two chains
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub contract_address: String,
    pub supported_tokens: Vec<String>,
    pub base_fee: String,
    pub fee_bps: u64,
    pub min_fee: String,
    pub max_fee: String,
    pub security_level: SecurityLevel,
    pub estimated_time_secs: u64,
    pub pending_deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    pub min_gas_price_gwei: u64,
    pub max_gas_price_gwei: u64,
    #[serde(default)]
    pub supported_tokens: Vec<String>,
    /// Chains sharing a low-latency subnet bridge without fees or delay
    #[serde(default)]
    pub low_latency_subnet: bool,
    pub subnet_id: Option<String>,
    pub enabled: bool,
}

impl ChainConfig {
    /// Whether two chains belong to the same low-latency subnet
    pub fn shares_subnet_with(&self, other: &ChainConfig) -> bool {
        self.low_latency_subnet
            && other.low_latency_subnet
            && self.subnet_id.is_some()
            && self.subnet_id == other.subnet_id
    }

    pub fn validate(&self, name: &str) -> BridgeResult<()> {
        if self.enabled && self.rpc_urls.is_empty() {
            return Err(BridgeError::Config(format!(
                "Chain {} has no RPC URLs configured",
                name
            )));
        }
        if self.min_gas_price_gwei > self.max_gas_price_gwei {
            return Err(BridgeError::Config(format!(
                "Chain {} has min gas price above max gas price",
                name
            )));
        }
        Ok(())
    }

    /// Merge-style update: only the fields present in `update` change
    pub fn merge(&mut self, update: ChainConfigUpdate) {
        if let Some(v) = update.rpc_urls {
            self.rpc_urls = v;
        }
        if let Some(v) = update.contract_address {
            self.contract_address = v;
        }
        if let Some(v) = update.min_gas_price_gwei {
            self.min_gas_price_gwei = v;
        }
        if let Some(v) = update.max_gas_price_gwei {
            self.max_gas_price_gwei = v;
        }
        if let Some(v) = update.supported_tokens {
            self.supported_tokens = v;
        }
        if let Some(v) = update.low_latency_subnet {
            self.low_latency_subnet = v;
        }
        if let Some(v) = update.subnet_id {
            self.subnet_id = Some(v);
        }
        if let Some(v) = update.enabled {
            self.enabled = v;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfigUpdate {
    pub rpc_urls: Option<Vec<String>>,
    pub contract_address: Option<String>,
    pub min_gas_price_gwei: Option<u64>,
    pub max_gas_price_gwei: Option<u64>,
    pub supported_tokens: Option<Vec<String>>,
    pub low_latency_subnet: Option<bool>,
    pub subnet_id: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from the file named by `BRIDGE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn parse(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> BridgeResult<()> {
        if self.enabled_chains().is_empty() {
            return Err(BridgeError::Config(
                "At least one chain must be enabled".to_string(),
            ));
        }

        for key in [&self.bridge.chain, &self.bridge.counterpart_chain] {
            if !self.chains.contains_key(key) {
                return Err(BridgeError::Config(format!(
                    "Bridge references unknown chain {}",
                    key
                )));
            }
        }

        for (name, chain) in &self.chains {
            chain.validate(name)?;
        }

        for (symbol, policy) in &self.token_policies {
            let limits = policy.limits()?;
            if limits.min_transfer > limits.max_transfer {
                return Err(BridgeError::Config(format!(
                    "Token policy {} has min_transfer above max_transfer",
                    symbol
                )));
            }
        }

        for protocol in &self.protocols {
            protocol.fee_schedule()?;
        }

        for asset in &self.assets {
            parse_address(&asset.token_address)?;
        }

        for validator in &self.validators {
            parse_address(&validator.address)?;
            parse_amount(&validator.stake)?;
        }

        self.security.validate()?;
        self.routing.validate()?;

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Parsed per-token transfer bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLimits {
    pub min_transfer: Amount,
    pub max_transfer: Amount,
    pub daily_cap: Amount,
}

impl TokenPolicyConfig {
    pub fn limits(&self) -> BridgeResult<TokenLimits> {
        Ok(TokenLimits {
            min_transfer: parse_amount(&self.min_transfer)?,
            max_transfer: parse_amount(&self.max_transfer)?,
            daily_cap: parse_amount(&self.daily_cap)?,
        })
    }
}

/// Parsed fee parameters of a protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub base_fee: Amount,
    pub fee_bps: u64,
    pub min_fee: Amount,
    pub max_fee: Amount,
}

impl ProtocolConfig {
    pub fn fee_schedule(&self) -> BridgeResult<FeeSchedule> {
        let schedule = FeeSchedule {
            base_fee: parse_amount(&self.base_fee)?,
            fee_bps: self.fee_bps,
            min_fee: parse_amount(&self.min_fee)?,
            max_fee: parse_amount(&self.max_fee)?,
        };
        if schedule.min_fee > schedule.max_fee {
            return Err(BridgeError::Config(format!(
                "Protocol {} has min_fee above max_fee",
                self.name
            )));
        }
        Ok(schedule)
    }
}

/// Parse a decimal amount string in base units
pub fn parse_amount(value: &str) -> BridgeResult<Amount> {
    U256::from_dec_str(value.trim())
        .map_err(|e| BridgeError::Config(format!("Invalid amount {:?}: {}", value, e)))
}

/// Parse a hex account address
pub fn parse_address(value: &str) -> BridgeResult<Address> {
    Address::from_str(value.trim())
        .map_err(|e| BridgeError::Config(format!("Invalid address {:?}: {}", value, e)))
}

lazy_static! {
    static ref ENV_VAR_PATTERN: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
