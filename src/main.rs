use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use rulecheck::config::Config;
use rulecheck::engine::HttpFetcher;
use rulecheck::init::setup_logging;
use rulecheck::service::RuleService;
use rulecheck::stats::StatsCollector;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("config.toml".to_string());
    let config_found = std::path::Path::new(&config_path).exists();
    let config = if config_found {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting rulecheck...");

    if !config_found {
        info!("Config file not found, using defaults.");
    }

    // 3. Init Stats
    let stats = StatsCollector::new(config.stats.log_interval_seconds);
    if config.stats.enable {
        stats.spawn_logger();
    }

    // 4. Build the rule service
    let fetcher = Arc::new(HttpFetcher::new(config.updates.fetch_timeout())?);
    let (service, refresh_rx) = RuleService::new(&config, fetcher, stats);
    info!(
        "Loaded {} rule sources ({} enabled)",
        service.list_sources().len(),
        config.sources.iter().filter(|s| s.enabled).count()
    );

    // 5. Spawn Periodic Updater (first run fetches everything)
    let scheduler = service.spawn_scheduler(refresh_rx, config.updates.interval());

    // 6. Start API Server
    let api_service = service.clone();
    let host = config.host.clone();
    let port = config.port;
    let api = tokio::spawn(async move {
        if let Err(e) = rulecheck::api::start_api_server(api_service, &host, port).await {
            error!("API server failed: {:#}", e);
        }
    });

    // 7. Graceful Shutdown
    tokio::select! {
        _ = api => {},
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }
    scheduler.abort();

    Ok(())
}
