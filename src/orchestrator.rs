//! Orchestrator. Guards life-cycle legality, serializes
//! start/stop/reset/update_config via a single lock, and decides which
//! config changes require a restart versus hot-apply. Grounded in
//! `grid_engine.py`'s top-level `start`/`stop`/`reset` guards. Ownership is
//! one-way: the orchestrator owns the engine, the engine holds the state
//! store — no cyclic back-references.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{GridConfig, Venue};
use crate::engine::ReconciliationEngine;
use crate::error::Result;
use crate::persistence::{
    load_manual_sync, save_manual_sync, ActionLogEntry, ConfigHistoryEntry, InMemoryPersistence,
    ManualSyncFile, ManualSyncOrder, Persistence,
};
use crate::quantizer::Quantizer;
use crate::state::{BotState, StateStore};
use crate::venue::VenueAdapter;

/// `{success, message, data?}`, the shape every operator-facing call in
/// spec §6 returns; `data` carries whatever payload that call promises
/// (status echoes `RuntimeState` + config, `levels` a row per level, etc).
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    fn ok_with(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

pub struct Orchestrator {
    engine: Mutex<Option<Arc<ReconciliationEngine>>>,
    state_store: Arc<StateStore>,
    venue: Arc<dyn VenueAdapter>,
    persistence: Mutex<InMemoryPersistence>,
    manual_sync_path: PathBuf,
    lifecycle_lock: Mutex<()>,
    quantizer: Quantizer,
}

impl Orchestrator {
    pub fn new(venue: Arc<dyn VenueAdapter>, manual_sync_path: PathBuf) -> Self {
        Self {
            engine: Mutex::new(None),
            state_store: StateStore::new(),
            venue,
            persistence: Mutex::new(InMemoryPersistence::default()),
            manual_sync_path,
            lifecycle_lock: Mutex::new(()),
            quantizer: Quantizer::new(),
        }
    }

    pub fn state_store(&self) -> Arc<StateStore> {
        self.state_store.clone()
    }

    fn log_action(&self, persistence: &mut InMemoryPersistence, action: &str, result: &str) {
        persistence.record_action(ActionLogEntry {
            id: None,
            ts: chrono::Utc::now().timestamp_millis(),
            user: "local".to_string(),
            action: action.to_string(),
            params_json: "{}".to_string(),
            result: result.to_string(),
            mode: "n/a".to_string(),
            venue: "n/a".to_string(),
        });
    }

    /// `PUT config(GridConfig)`: validates and installs a new config.
    /// Returns whether the change required a restart. If the engine isn't
    /// running, the new config simply becomes the one `start()` will use.
    /// A running engine is a fresh `ReconciliationEngine` instance either
    /// way (it has no in-place config setter), so bounds/venue/mode
    /// changes stop the old loop first; zone/size-only changes restart it
    /// transparently without the caller needing to call stop/start around it.
    pub async fn update_config(&self, new_config: GridConfig) -> Result<bool> {
        let _guard = self.lifecycle_lock.lock().await;
        new_config.validate()?;
        let config_json = serde_json::to_string(&new_config)?;

        let mut engine_slot = self.engine.lock().await;
        let (restart_required, was_running) = match engine_slot.as_ref() {
            Some(engine) => {
                let old = engine.config_snapshot().await;
                let running = self.state_store.snapshot().await.bot_state == BotState::Running;
                (old.requires_restart(&new_config), running)
            }
            None => (false, false),
        };

        if was_running {
            if let Some(engine) = engine_slot.as_ref() {
                if let Err(e) = engine.stop().await {
                    let mut persistence = self.persistence.lock().await;
                    self.log_action(&mut persistence, "update_config", &e.to_string());
                    return Err(e);
                }
            }
        }

        let new_engine = ReconciliationEngine::new(new_config, self.venue.clone(), self.state_store.clone());
        if was_running {
            if let Err(e) = new_engine.start(None).await {
                let mut persistence = self.persistence.lock().await;
                self.log_action(&mut persistence, "update_config", &e.to_string());
                return Err(e);
            }
        }
        *engine_slot = Some(new_engine);

        let mut persistence = self.persistence.lock().await;
        self.log_action(&mut persistence, "update_config", "ok");
        persistence.record_config(ConfigHistoryEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            config_json,
        });
        drop(persistence);

        Ok(restart_required)
    }

    pub async fn start(&self, confirm: bool) -> ApiResponse {
        if !confirm {
            return ApiResponse::err("start requires confirm=true");
        }
        let _guard = self.lifecycle_lock.lock().await;

        let current = self.state_store.snapshot().await.bot_state;
        if current == BotState::Running || current == BotState::Starting {
            return ApiResponse::err("illegal state: already running");
        }

        let engine_slot = self.engine.lock().await;
        let engine = match engine_slot.as_ref() {
            Some(e) => e.clone(),
            None => return ApiResponse::err("illegal state: no config installed"),
        };
        drop(engine_slot);

        let manual_sync = load_manual_sync(&self.manual_sync_path).map(|f| f.orders);

        let mut persistence = self.persistence.lock().await;
        match engine.start(manual_sync).await {
            Ok(()) => {
                self.log_action(&mut persistence, "start", "ok");
                ApiResponse::ok("engine started")
            }
            Err(e) => {
                self.log_action(&mut persistence, "start", &e.to_string());
                ApiResponse::err(e.to_string())
            }
        }
    }

    pub async fn stop(&self, confirm: bool) -> ApiResponse {
        if !confirm {
            return ApiResponse::err("stop requires confirm=true");
        }
        let _guard = self.lifecycle_lock.lock().await;

        let engine_slot = self.engine.lock().await;
        let engine = match engine_slot.as_ref() {
            Some(e) => e.clone(),
            None => return ApiResponse::err("illegal state: no engine to stop"),
        };
        drop(engine_slot);

        let mut persistence = self.persistence.lock().await;
        match engine.stop().await {
            Ok(()) => {
                self.log_action(&mut persistence, "stop", "ok");
                ApiResponse::ok("engine stopped")
            }
            Err(e) => {
                self.log_action(&mut persistence, "stop", &e.to_string());
                ApiResponse::err(e.to_string())
            }
        }
    }

    pub async fn reset(&self, confirm: bool, clear_positions: bool, cancel_only: bool) -> ApiResponse {
        if !confirm {
            return ApiResponse::err("reset requires confirm=true");
        }
        let _guard = self.lifecycle_lock.lock().await;

        let engine_slot = self.engine.lock().await;
        let engine = match engine_slot.as_ref() {
            Some(e) => e.clone(),
            None => return ApiResponse::err("illegal state: no engine to reset"),
        };
        drop(engine_slot);

        let outcome = if cancel_only {
            engine.stop().await
        } else {
            engine.reset(clear_positions).await
        };

        let mut persistence = self.persistence.lock().await;
        match outcome {
            Ok(()) => {
                self.log_action(&mut persistence, "reset", "ok");
                ApiResponse::ok("engine reset")
            }
            Err(e) => {
                self.log_action(&mut persistence, "reset", &e.to_string());
                ApiResponse::err(e.to_string())
            }
        }
    }

    pub async fn toggle_zone(&self, zone_id: u32, enabled: bool) -> ApiResponse {
        let engine_slot = self.engine.lock().await;
        match engine_slot.as_ref() {
            Some(engine) => match engine.toggle_zone(zone_id, enabled).await {
                Ok(()) => ApiResponse::ok("zone toggled"),
                Err(e) => ApiResponse::err(e.to_string()),
            },
            None => ApiResponse::err("illegal state: no engine installed"),
        }
    }

    pub async fn cancel_level(&self, level: usize) -> ApiResponse {
        let engine_slot = self.engine.lock().await;
        match engine_slot.as_ref() {
            Some(engine) => match engine.cancel_level(level).await {
                Ok(()) => ApiResponse::ok("level cancelled"),
                Err(e) => ApiResponse::err(e.to_string()),
            },
            None => ApiResponse::err("illegal state: no engine installed"),
        }
    }

    pub async fn enable_level(&self, level: usize) -> ApiResponse {
        let engine_slot = self.engine.lock().await;
        match engine_slot.as_ref() {
            Some(engine) => match engine.enable_level(level).await {
                Ok(()) => ApiResponse::ok("level enabled"),
                Err(e) => ApiResponse::err(e.to_string()),
            },
            None => ApiResponse::err("illegal state: no engine installed"),
        }
    }

    /// `POST orders/{venue_order_id}/cancel`.
    pub async fn cancel_order(&self, venue_order_id: &str) -> ApiResponse {
        let engine_slot = self.engine.lock().await;
        match engine_slot.as_ref() {
            Some(engine) => match engine.cancel_order(venue_order_id).await {
                Ok(()) => ApiResponse::ok("order cancelled"),
                Err(e) => ApiResponse::err(e.to_string()),
            },
            None => ApiResponse::err("illegal state: no engine installed"),
        }
    }

    /// `GET status` → RuntimeState + config echo.
    pub async fn status(&self) -> ApiResponse {
        let state = self.state_store.snapshot().await;
        let config = match self.engine.lock().await.as_ref() {
            Some(engine) => serde_json::to_value(engine.config_snapshot().await).ok(),
            None => None,
        };
        let data = serde_json::json!({
            "bot_state": format!("{:?}", state.bot_state),
            "active_levels": state.active_levels,
            "pnl_realized": state.pnl_realized,
            "pnl_unrealized": state.pnl_unrealized,
            "inventory": state.inventory,
            "last_error": state.last_error,
            "config": config,
        });
        ApiResponse::ok_with("status", data)
    }

    /// `GET levels` → `{index, price, zone_id, active, side}` per level.
    pub async fn levels(&self) -> ApiResponse {
        let engine_slot = self.engine.lock().await;
        match engine_slot.as_ref() {
            Some(engine) => {
                let rows: Vec<serde_json::Value> = engine
                    .levels_view()
                    .await
                    .into_iter()
                    .map(|v| {
                        serde_json::json!({
                            "index": v.index,
                            "price": v.price,
                            "zone_id": v.zone_id,
                            "active": v.active,
                            "side": format!("{:?}", v.side).to_lowercase(),
                        })
                    })
                    .collect();
                ApiResponse::ok_with("levels", serde_json::Value::Array(rows))
            }
            None => ApiResponse::err("illegal state: no engine installed"),
        }
    }

    /// `GET orders/active`.
    pub async fn orders_active(&self) -> ApiResponse {
        let engine_slot = self.engine.lock().await;
        match engine_slot.as_ref() {
            Some(engine) => {
                let rows: Vec<serde_json::Value> = engine
                    .active_orders_snapshot()
                    .await
                    .into_iter()
                    .map(|o| {
                        serde_json::json!({
                            "level_index": o.level_index,
                            "zone_id": o.zone_id,
                            "side": o.side.as_str(),
                            "price": o.price,
                            "size": o.size,
                            "venue_order_id": o.venue_order_id,
                            "status": format!("{:?}", o.status),
                        })
                    })
                    .collect();
                ApiResponse::ok_with("active orders", serde_json::Value::Array(rows))
            }
            None => ApiResponse::err("illegal state: no engine installed"),
        }
    }

    /// `GET minimum-requirements/{venue}/{symbol}`.
    pub fn minimum_requirements(&self, venue: Venue, symbol: &str) -> ApiResponse {
        match self.quantizer.requirements(venue, symbol) {
            Some(r) => ApiResponse::ok_with(
                "requirements",
                serde_json::json!({
                    "min_size": r.min_size,
                    "min_notional": r.min_notional,
                    "size_step": r.size_step,
                    "price_tick": r.price_tick,
                }),
            ),
            None => ApiResponse::err("no requirements configured for this venue/symbol"),
        }
    }

    /// `POST sync/manual{orders}`: persists the sidecar immediately (so a
    /// later `start()` picks it up even if the engine isn't running right
    /// now) and, if an engine is installed, merges the orders into its
    /// active_orders right away rather than waiting for a restart.
    pub async fn sync_manual(&self, orders: Vec<ManualSyncOrder>) -> ApiResponse {
        let count = orders.len();
        save_manual_sync(&self.manual_sync_path, &ManualSyncFile { orders: orders.clone() });

        if let Some(engine) = self.engine.lock().await.as_ref() {
            engine.adopt_external(&orders).await;
        }
        ApiResponse::ok(format!("adopted {} manually-synced orders", count))
    }
}
