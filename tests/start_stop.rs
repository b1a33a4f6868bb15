use std::collections::HashMap;
use std::sync::Arc;

use grid_recon_engine::config::{GridConfig, Mode, Venue, ZoneDef};
use grid_recon_engine::grid::Spacing;
use grid_recon_engine::orchestrator::Orchestrator;
use grid_recon_engine::state::BotState;
use grid_recon_engine::venue::VenueAdapter;
use grid_recon_engine::venues::simulator::Simulator;

fn test_sim() -> Arc<dyn VenueAdapter> {
    Arc::new(Simulator::new(
        62_500.0,
        0.0,
        11,
        HashMap::from([("USDT".to_string(), 1_000_000.0), ("BTC".to_string(), 10.0)]),
    ))
}

fn test_config(zones: Vec<ZoneDef>) -> GridConfig {
    GridConfig::new(
        60_000.0,
        65_000.0,
        11,
        Spacing::Arithmetic,
        0.001,
        zones,
        Mode::Simulated,
        Venue::B,
        "BTC/USDT".to_string(),
    )
    .unwrap()
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(test_sim(), std::env::temp_dir().join("grid_recon_test_sync_unused.json"))
}

#[tokio::test]
async fn start_requires_confirmation() {
    let orch = orchestrator();
    orch.update_config(test_config(vec![])).await.unwrap();

    let state = orch.state_store().snapshot().await;
    assert_eq!(state.bot_state, BotState::Stopped);

    let result = orch.start(false).await;
    assert!(!result.success);
    assert!(result.message.contains("confirm"));

    let result = orch.start(true).await;
    assert!(result.success);

    let state = orch.state_store().snapshot().await;
    assert_eq!(state.bot_state, BotState::Running);

    orch.stop(true).await;
}

#[tokio::test]
async fn stop_requires_confirmation() {
    let orch = orchestrator();
    orch.update_config(test_config(vec![])).await.unwrap();
    orch.start(true).await;

    let result = orch.stop(false).await;
    assert!(!result.success);
    assert!(result.message.contains("confirm"));

    let result = orch.stop(true).await;
    assert!(result.success);

    let state = orch.state_store().snapshot().await;
    assert_eq!(state.bot_state, BotState::Stopped);
}

#[tokio::test]
async fn reset_requires_confirmation() {
    let orch = orchestrator();
    orch.update_config(test_config(vec![])).await.unwrap();
    orch.start(true).await;

    let result = orch.reset(false, false, true).await;
    assert!(!result.success);

    let result = orch.reset(true, false, true).await;
    assert!(result.success);

    let result = orch.reset(true, true, false).await;
    assert!(result.success);
}

#[tokio::test]
async fn zone_toggle_enables_and_disables() {
    let orch = orchestrator();
    orch.update_config(test_config(vec![
        ZoneDef {
            id: 1,
            start_idx: 0,
            end_idx: 5,
            enabled: true,
        },
        ZoneDef {
            id: 2,
            start_idx: 6,
            end_idx: 10,
            enabled: true,
        },
    ]))
    .await
    .unwrap();
    orch.start(true).await;

    let result = orch.toggle_zone(1, false).await;
    assert!(result.success);

    let result = orch.toggle_zone(1, true).await;
    assert!(result.success);

    orch.stop(true).await;
}

#[tokio::test]
async fn state_transitions_through_lifecycle() {
    let orch = orchestrator();
    orch.update_config(test_config(vec![])).await.unwrap();

    assert_eq!(orch.state_store().snapshot().await.bot_state, BotState::Stopped);

    orch.start(true).await;
    assert_eq!(orch.state_store().snapshot().await.bot_state, BotState::Running);

    orch.stop(true).await;
    assert_eq!(orch.state_store().snapshot().await.bot_state, BotState::Stopped);
}

#[tokio::test]
async fn double_start_without_stop_is_rejected() {
    let orch = orchestrator();
    orch.update_config(test_config(vec![])).await.unwrap();

    let first = orch.start(true).await;
    assert!(first.success);

    let second = orch.start(true).await;
    assert!(!second.success);

    orch.stop(true).await;
}
