use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use grid_recon_engine::config::{GridConfig, Mode, Venue, ZoneDef};
use grid_recon_engine::grid::Spacing;
use grid_recon_engine::orchestrator::Orchestrator;
use grid_recon_engine::venue::VenueAdapter;
use grid_recon_engine::venues::simulator::Simulator;
use grid_recon_engine::venues::venue_a::{VenueA, VenueAConfig};
use grid_recon_engine::venues::venue_b::{LibraryClient, VenueB};

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn build_venue_adapter(mode: Mode, venue: Venue) -> Arc<dyn VenueAdapter> {
    match mode {
        Mode::Simulated => {
            let initial_price = env_f64("GRID_SIM_INITIAL_PRICE", 150.0);
            let volatility = env_f64("GRID_SIM_VOLATILITY", 0.0005);
            let seed = env_usize("GRID_SIM_SEED", 42) as u64;
            let mut balances = HashMap::new();
            balances.insert("USDT".to_string(), env_f64("GRID_SIM_QUOTE_BALANCE", 100_000.0));
            balances.insert("BTC".to_string(), env_f64("GRID_SIM_BASE_BALANCE", 5.0));
            Arc::new(Simulator::new(initial_price, volatility, seed, balances))
        }
        Mode::Live => match venue {
            Venue::A => {
                let config = VenueAConfig {
                    base_url: env_string("VENUE_A_BASE_URL", "https://api.bitkub.com"),
                    api_key: env_string("VENUE_A_API_KEY", ""),
                    api_secret: env_string("VENUE_A_API_SECRET", ""),
                };
                Arc::new(VenueA::new(config))
            }
            Venue::B => {
                let client = LibraryClient::new(
                    env_string("VENUE_B_BASE_URL", "https://www.okx.com"),
                    env_string("VENUE_B_API_KEY", ""),
                    env_string("VENUE_B_API_SECRET", ""),
                    env_string("VENUE_B_PASSPHRASE", ""),
                );
                Arc::new(VenueB::new(client))
            }
        },
    }
}

fn load_grid_config() -> GridConfig {
    let mode = match env_string("GRID_MODE", "simulated").as_str() {
        "live" => Mode::Live,
        _ => Mode::Simulated,
    };
    let venue = match env_string("GRID_VENUE", "b").to_lowercase().as_str() {
        "a" => Venue::A,
        _ => Venue::B,
    };
    let spacing = match env_string("GRID_SPACING", "arithmetic").as_str() {
        "geometric" => Spacing::Geometric,
        _ => Spacing::Arithmetic,
    };

    GridConfig::new(
        env_f64("GRID_LOWER", 100.0),
        env_f64("GRID_UPPER", 200.0),
        env_usize("GRID_N_LEVELS", 10),
        spacing,
        env_f64("GRID_SIZE_PER_LEVEL", 0.01),
        Vec::<ZoneDef>::new(),
        mode,
        venue,
        env_string("GRID_SYMBOL", "BTC/USDT"),
    )
    .expect("invalid grid configuration supplied via environment")
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    let session_id = uuid::Uuid::new_v4().to_string();
    log::info!("grid-recon-engine starting, session {}", session_id);

    let config = load_grid_config();
    let venue = build_venue_adapter(config.mode, config.venue);
    let manual_sync_path = PathBuf::from(env_string("GRID_MANUAL_SYNC_PATH", "manual_sync_orders.json"));

    let orchestrator = Arc::new(Orchestrator::new(venue, manual_sync_path));

    orchestrator
        .update_config(config)
        .await
        .expect("failed to install initial grid config");

    let store = orchestrator.state_store();
    store
        .subscribe(|event| {
            log::info!("state event: {:?}", event);
        })
        .await;

    let start_resp = orchestrator.start(true).await;
    if !start_resp.success {
        log::error!("failed to start engine: {}", start_resp.message);
        return;
    }
    log::info!("{}", start_resp.message);

    // The HTTP/WebSocket operator surface described alongside this engine
    // is a separate transport concern; this binary's job is to assemble
    // and run the reconciliation engine itself. Block until interrupted.
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", e);
    }

    log::info!("shutdown signal received, stopping engine");
    let stop_resp = orchestrator.stop(true).await;
    log::info!("{}", stop_resp.message);
}
