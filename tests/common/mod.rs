//! Shared harness: a bridge on chain 43114 bridging to chain 1 over a
//! simulated chain, with three staked validators.

use bridge_coordinator::bridge::{Bridge, BridgeFacade, BridgeOptions, TransferRequest};
use bridge_coordinator::chain::SimulatedChain;
use bridge_coordinator::config::Settings;
use bridge_coordinator::consensus::Validator;
use bridge_coordinator::routing::RouteOptimizer;
use bridge_coordinator::security::{SecurityPolicy, TokenPolicy};

use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::Arc;

pub const LOCAL: u64 = 43114;
pub const REMOTE: u64 = 1;

pub const CONFIG: &str = r#"
[bridge]
instance_id = "it-bridge"
chain = "avalanche"
counterpart_chain = "ethereum"
process_interval_ms = 50
sweep_interval_secs = 1
pending_deadline_secs = 3600
archive_retention_secs = 86400

[security]
multisig_threshold = 2
rate_limit_window_secs = 3600
rate_limit_max_transfers = 100
emergency_cooldown_secs = 300
max_gas_price_gwei = 500
enforce_blacklist = true
enforce_whitelist = false

[token_policies.USDC]
min_transfer = "10"
max_transfer = "1000000"
daily_cap = "2000000"

[[protocols]]
name = "canonical-out"
source_chain = 43114
target_chain = 1
contract_address = "0x0000000000000000000000000000000000000c01"
supported_tokens = ["USDC"]
base_fee = "5"
fee_bps = 10
min_fee = "5"
max_fee = "500"
security_level = "high"
estimated_time_secs = 900

[[protocols]]
name = "canonical-in"
source_chain = 1
target_chain = 43114
contract_address = "0x0000000000000000000000000000000000000c02"
supported_tokens = ["USDC"]
base_fee = "5"
fee_bps = 10
min_fee = "5"
max_fee = "500"
security_level = "high"
estimated_time_secs = 600
pending_deadline_secs = 600

[chains.avalanche]
chain_id = 43114
name = "Avalanche C-Chain"
rpc_urls = ["http://127.0.0.1:9650"]
contract_address = "0x0000000000000000000000000000000000000a01"
min_gas_price_gwei = 25
max_gas_price_gwei = 300
enabled = true

[chains.ethereum]
chain_id = 1
name = "Ethereum"
rpc_urls = ["http://127.0.0.1:8545"]
contract_address = "0x0000000000000000000000000000000000000e01"
min_gas_price_gwei = 1
max_gas_price_gwei = 500
enabled = true

[api]
host = "127.0.0.1"
port = 0

[metrics]
enabled = false
port = 0
"#;

pub struct Harness {
    pub bridge: Arc<Bridge>,
    pub chain: Arc<SimulatedChain>,
    pub validators: Vec<Validator>,
}

pub fn usdc() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn user(i: u8) -> Address {
    Address::repeat_byte(i)
}

pub fn request(sender: u8, amount: u64) -> TransferRequest {
    TransferRequest::new("USDC", U256::from(amount), user(sender), user(sender + 100), REMOTE)
}

pub async fn harness() -> Harness {
    let settings = Settings::parse(CONFIG).unwrap();

    let mut limits = HashMap::new();
    for (symbol, policy) in &settings.token_policies {
        limits.insert(symbol.clone(), policy.limits().unwrap());
    }
    let router = RouteOptimizer::new(
        settings.chains.clone(),
        &settings.protocols,
        settings.routing.clone(),
    )
    .unwrap();

    let chain = Arc::new(SimulatedChain::new(LOCAL));
    let bridge = Arc::new(Bridge::new(
        BridgeOptions::from_settings(&settings),
        chain.clone(),
        Arc::new(SecurityPolicy::new(settings.security.clone())),
        Arc::new(TokenPolicy::new(limits)),
        Arc::new(router),
    ));
    bridge.initialize().await.unwrap();
    bridge.register_asset("USDC", usdc()).await.unwrap();

    let mut validators = Vec::new();
    for i in 1..=3u64 {
        let validator =
            Validator::from_key(&format!("{:064x}", i), bridge.validator_set()).unwrap();
        bridge
            .add_validator(validator.address(), U256::from(1_000))
            .await
            .unwrap();
        validators.push(validator);
    }

    Harness {
        bridge,
        chain,
        validators,
    }
}

impl Harness {
    /// Confirm on chain and collect `signatures` attestations
    pub async fn confirm(&self, hash: H256, signatures: usize) {
        self.chain.settle(hash, true).unwrap();
        for validator in self.validators.iter().take(signatures) {
            let attestation = validator.sign(hash).await.unwrap();
            self.bridge.submit_attestation(attestation).await.unwrap();
        }
    }

    pub async fn conserved(&self) -> bool {
        let asset = self.bridge.get_asset("USDC").await.unwrap();
        self.bridge.total_supply("USDC").await.unwrap()
            == asset.locked_amount + asset.minted_amount
    }
}
