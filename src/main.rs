//! Settlement engine binary.

use clap::Parser;
use giftspin::{
    api::{auth::IdentityVerifier, handlers::AppState, ApiServer},
    board::BoardCache,
    catalog::PriceCatalog,
    chain::HttpGateway,
    config::ConfigLoader,
    deposit::DepositReconciler,
    inventory::InventoryStore,
    ledger::Ledger,
    storage::{RowLocks, Store},
    withdraw::WithdrawalQueue,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "giftspin")]
#[command(about = "Stochastic reward and settlement engine", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<String>,
}

/// Withdrawal leases outlive one fulfillment pass by a wide margin.
const WITHDRAWAL_LEASE_SECS: i64 = 600;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "giftspin=info,tower_http=info".into()),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    if config.auth.identity_secret.is_empty() {
        warn!("auth.identity_secret is empty; every player route will reject");
    }
    if config.deposit.wallet_address.is_empty() {
        warn!("deposit.wallet_address is empty; deposits cannot be verified");
    }

    info!(data_dir = %config.storage.data_dir, "opening store");
    let store = Store::open(&config.storage.data_dir)?;
    let locks = RowLocks::new();

    let catalog = PriceCatalog::new(store.clone());
    let boards = BoardCache::new(store.clone(), config.game.board_ttl_secs);
    let ledger = Ledger::new(store.clone(), locks.clone(), config.game.clone());
    let inventory = InventoryStore::new(store.clone(), locks.clone(), config.game.bonus_permille);
    let gateway = HttpGateway::new(
        &config.deposit.gateway_url,
        config.deposit.scan_limit,
        Duration::from_secs(config.deposit.verify_timeout_secs),
    )?;
    let deposits = DepositReconciler::new(
        store.clone(),
        locks.clone(),
        Arc::new(gateway),
        config.deposit.clone(),
    );
    let withdrawals = WithdrawalQueue::new(store, locks, WITHDRAWAL_LEASE_SECS);

    // Expired cached boards are reaped on a fixed interval.
    let sweeper = boards.clone();
    let sweep_secs = config.game.board_sweep_secs.max(1);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_secs));
        loop {
            ticker.tick().await;
            match sweeper.sweep() {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept expired boards"),
                Err(e) => warn!(error = %e, "board sweep failed"),
            }
        }
    });

    let state = Arc::new(AppState {
        ledger,
        inventory,
        catalog,
        boards,
        deposits,
        withdrawals,
        identity: IdentityVerifier::new(&config.auth.identity_secret),
        service_key_hash: config.auth.service_key_hash.clone(),
        game: config.game.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    ApiServer::new(config.server.clone(), state).run().await
}
