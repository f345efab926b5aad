use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use block_trace_operations::indexer::rpc::registry::ScaleRegistry;
use block_trace_operations::indexer::rpc::RpcChainClient;
use block_trace_operations::indexer::TraceService;
use block_trace_operations::metrics::Metrics;
use block_trace_operations::utils::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config = match load_config("config.yml") {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(anyhow!(e));
        }
    };

    // Block hashes from the command line take precedence over the config
    let block_hashes: Vec<String> = match std::env::args().skip(1).collect::<Vec<_>>() {
        args if !args.is_empty() => args,
        _ => config.block_hashes.clone(),
    };
    if block_hashes.is_empty() {
        return Err(anyhow!("No block hashes given on the command line or in config"));
    }

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new(config.chain_name.clone())?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    // Stop between blocks on Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, initiating shutdown...");
            let _ = shutdown_tx.send(());
        }
    });

    let rpc_url: Url = config.rpc_url.parse()?;
    info!("RPC URL: {:?}", config.rpc_url);
    let client = RpcChainClient::new(rpc_url, config.retry.clone(), metrics.clone());
    let registry = ScaleRegistry::new(config.token_symbols.clone(), config.storage_items.clone())
        .with_ss58_prefix(config.ss58_prefix)
        .with_account_info_layout(config.account_info);
    let service = TraceService::new(client, registry, metrics);

    println!();
    info!("====================== DERIVING BLOCK OPERATIONS ======================");

    for hash in &block_hashes {
        if shutdown_rx.try_recv().is_ok() {
            info!("Shutting down before block {}", hash);
            break;
        }

        info!("Block hash to process: {}", hash);
        let response = service.operations(hash, config.include_actions).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
