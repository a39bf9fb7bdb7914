//! Bridge coordinator service
//!
//! Runs one bridge instance against its configured chain, processes pending
//! transfers in the background and serves the status API.

use anyhow::{Context, Result};
use bridge_coordinator::api;
use bridge_coordinator::bridge::{Bridge, BridgeEngine, BridgeFacade, BridgeOptions};
use bridge_coordinator::chain::{ChainClient, EvmChainClient, SimulatedChain};
use bridge_coordinator::config::{parse_address, parse_amount, ChainConfig, Settings};
use bridge_coordinator::consensus::Validator;
use bridge_coordinator::metrics::MetricsServer;
use bridge_coordinator::routing::RouteOptimizer;
use bridge_coordinator::security::{SecurityPolicy, TokenPolicy};

use ethers::signers::LocalWallet;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Send attempts per chain submission
const SUBMIT_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting bridge coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let chain_config = settings
        .chains
        .get(&settings.bridge.chain)
        .cloned()
        .with_context(|| format!("Unknown chain {}", settings.bridge.chain))?;
    info!(
        "Bridge {} on chain {} ({}), counterpart {}",
        settings.bridge.instance_id,
        chain_config.name,
        chain_config.chain_id,
        settings.bridge.counterpart_chain
    );

    let chain = connect_chain(&settings, chain_config).await?;

    let mut limits = HashMap::new();
    for (symbol, policy) in &settings.token_policies {
        limits.insert(symbol.clone(), policy.limits()?);
    }
    let security = Arc::new(SecurityPolicy::new(settings.security.clone()));
    let token_policy = Arc::new(TokenPolicy::new(limits));
    let router = Arc::new(RouteOptimizer::new(
        settings.chains.clone(),
        &settings.protocols,
        settings.routing.clone(),
    )?);

    let bridge = Arc::new(Bridge::new(
        BridgeOptions::from_settings(&settings),
        chain,
        security,
        token_policy,
        router,
    ));
    bridge.initialize().await?;

    for asset in &settings.assets {
        bridge
            .register_asset_with_decimals(
                &asset.symbol,
                parse_address(&asset.token_address)?,
                asset.decimals,
            )
            .await?;
    }
    for validator in &settings.validators {
        bridge
            .add_validator(
                parse_address(&validator.address)?,
                parse_amount(&validator.stake)?,
            )
            .await?;
    }
    info!(
        "Registered {} assets and {} validators",
        settings.assets.len(),
        settings.validators.len()
    );

    let attester = match &settings.bridge.validator_key_env {
        Some(var) => {
            let key = env::var(var).with_context(|| format!("{} is not set", var))?;
            let validator = Validator::from_key(&key, bridge.validator_set())?;
            info!("Hosting validator {:?}", validator.address());
            Some(Arc::new(validator))
        }
        None => None,
    };

    let engine = Arc::new(BridgeEngine::new(
        bridge.clone(),
        attester,
        &settings.bridge,
    ));

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let bridge = bridge.clone();
        async move {
            if let Err(e) = api::run_server(config, bridge).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start processing engine
    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            if let Err(e) = engine.run().await {
                error!("Bridge engine error: {}", e);
            }
        }
    });

    info!("Bridge coordinator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    engine.stop().await;
    if let Err(e) = engine_handle.await {
        warn!("Bridge engine task ended abnormally: {}", e);
    }

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Bridge coordinator stopped");
    Ok(())
}

/// EVM client when an operator key is configured, otherwise an in-process chain
async fn connect_chain(settings: &Settings, config: ChainConfig) -> Result<Arc<dyn ChainClient>> {
    match &settings.bridge.operator_key_env {
        Some(var) => {
            let key = env::var(var).with_context(|| format!("{} is not set", var))?;
            let wallet: LocalWallet = key.parse().context("Invalid operator key")?;
            let client = EvmChainClient::new(config, wallet, SUBMIT_ATTEMPTS).await?;
            Ok(Arc::new(client))
        }
        None => {
            warn!(
                "No operator key configured, running chain {} in simulation",
                config.chain_id
            );
            Ok(Arc::new(SimulatedChain::new(config.chain_id).with_auto_confirm(true)))
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_coordinator=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
