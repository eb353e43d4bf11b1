//! ddns-server
//!
//! An authoritative DNS server for one dynamic-DNS zone, backed by a
//! SQLite record store and managed over HTTP.

use std::sync::Arc;

use log::info;
use tokio::{signal, task};

use ddns_server::{
    api::{self, ApiState},
    cache::{ResponseCache, CACHE_CLEANUP_INTERVAL},
    config::ServerConfig,
    errors::DnsError,
    resolver::Resolver,
    server::DnsServer,
    stats::QueryStats,
    store::RecordStore,
};

#[tokio::main]
async fn main() -> Result<(), DnsError> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    // Load configuration
    let config = ServerConfig::load()?;
    info!("Serving zone {} (db: {})", config.zone, config.db_path);

    // Open the record store
    let store = RecordStore::open(&config.db_path, &config.zone)?;

    let cache = ResponseCache::new();
    let stats = Arc::new(QueryStats::new());

    // Set up cache cleanup task
    let cache_cleanup = task::spawn({
        let cache = cache.clone();
        async move {
            let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                cache.cleanup();
            }
        }
    });

    let resolver = Arc::new(Resolver::new(
        &config,
        store.clone(),
        cache.clone(),
        stats.clone(),
    ));
    let dns_server = DnsServer::bind(config.dns_bind, resolver).await?;
    let http_server = api::run_http_server(config.http_bind, ApiState::new(&config, store, stats));

    // Set up shutdown signal handler
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to listen for shutdown signal");
        info!("Shutdown signal received");
    };

    // Wait for either a shutdown signal or server error
    tokio::select! {
        _ = shutdown_signal => {
            info!("Initiating graceful shutdown...");
            cache_cleanup.abort();
            Ok(())
        },
        res = dns_server.serve() => res,
        res = http_server => res,
    }
}
