mod config;
mod handler;

use anyhow::{Context, Result};
use argh::FromArgs;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use krypton_core::blockchain::{Blockchain, Chain};
use krypton_core::mempool::{Mempool, MempoolEvent};
use krypton_core::subscription::Subscription;

use crate::config::NodeConfig;
use crate::handler::Node;

#[derive(FromArgs)]
/// A Krypton node: chain state, mempool and transaction intake
struct Args {
    #[argh(option, default = "PathBuf::from(\"krypton.toml\")")]
    /// config file location; defaults apply when it does not exist
    config: PathBuf,

    #[argh(option)]
    /// port number, overrides the config file
    port: Option<u16>,

    #[argh(option)]
    /// network name or id, overrides the config file
    network: Option<String>,
}

async fn log_mempool_events(
    mut events: tokio::sync::broadcast::Receiver<MempoolEvent>,
    subscription: Subscription,
) {
    loop {
        match events.recv().await {
            Ok(MempoolEvent::TransactionAdded(tx)) if subscription.matches_transaction(&tx) => {
                info!("Mempool added {}", tx);
            }
            Ok(MempoolEvent::TransactionRemoved(tx)) if subscription.matches_transaction(&tx) => {
                info!("Mempool removed {}", tx);
            }
            Ok(MempoolEvent::TransactionsReady) => debug!("Mempool re-checked against new head"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Mempool log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = if args.config.exists() {
        info!("Loading config from {}", args.config.display());
        NodeConfig::load(&args.config)?
    } else {
        info!("No config at {}, using defaults", args.config.display());
        NodeConfig::default()
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(network) = args.network {
        config.network = network;
    }

    let genesis = config.genesis()?;
    let chain = Arc::new(
        Chain::from_genesis(&genesis)
            .await
            .context("Failed to build chain from genesis")?
            .with_pow_verification(config.verify_pow),
    );
    info!(
        "Network {} ({}), genesis {}",
        genesis.network_name,
        chain.network_id(),
        chain.head().await.hash()
    );

    let (mempool, worker) = Mempool::spawn(chain.clone(), chain.accounts().clone(), config.mempool.clone());
    tokio::spawn(log_mempool_events(mempool.subscribe(), config.subscription()));
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            error!("Mempool worker failed: {}", e);
        }
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let node = Node { chain, mempool };
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("Connection from {}", peer);
                let node = node.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler::handle_connection(socket, node).await {
                        warn!("Connection {} closed: {:?}", peer, e);
                    }
                });
            }
            Err(e) => error!("Error accepting connection: {}", e),
        }
    }
}
