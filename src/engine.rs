//! Reconciliation Engine — the heart of the system. Owns the mapping from
//! grid levels to live exchange orders and drives it toward the desired
//! configuration in the face of asynchronous fills, partial connectivity,
//! duplicate orders on the venue, and operator-initiated changes. Grounded
//! in `grid_engine.py`'s `GridEngine` (the tick algorithm, the API-outage
//! guard, `_cancel_all`) and in `execution.rs`'s `MmExecutionEngine` (Rust
//! shape: `Arc<dyn VenueAdapter>` behind a single-writer mutex, async
//! lifecycle methods).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::GridConfig;
use crate::error::{is_halting, is_retryable, GridError, Result};
use crate::grid::{determine_side, mid_tolerance, snap_to_level, Side};
use crate::persistence::ManualSyncOrder;
use crate::quantizer::Quantizer;
use crate::state::{BotState, StateStore};
use crate::venue::{OrderSide, PlaceStatus, VenueAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Intended,
    Open,
    Filled,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct LiveOrder {
    pub level_index: usize,
    pub zone_id: u32,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub venue_order_id: String,
    pub status: OrderStatus,
}

/// `venue_order_id -> LiveOrder` plus a derived `level -> order_id` index,
/// rebuilt on each adoption, in place of per-level string-keyed dicts.
#[derive(Default)]
struct ActiveOrders {
    by_id: HashMap<String, LiveOrder>,
    by_level: HashMap<usize, String>,
}

impl ActiveOrders {
    fn insert(&mut self, order: LiveOrder) {
        self.by_level.insert(order.level_index, order.venue_order_id.clone());
        self.by_id.insert(order.venue_order_id.clone(), order);
    }

    fn remove_by_id(&mut self, id: &str) -> Option<LiveOrder> {
        if let Some(order) = self.by_id.remove(id) {
            if self.by_level.get(&order.level_index) == Some(&order.venue_order_id) {
                self.by_level.remove(&order.level_index);
            }
            Some(order)
        } else {
            None
        }
    }

    fn open_at_level(&self, level: usize) -> Option<&LiveOrder> {
        self.by_level
            .get(&level)
            .and_then(|id| self.by_id.get(id))
            .filter(|o| o.status == OrderStatus::Open)
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_level.clear();
    }

    fn active_levels(&self) -> Vec<usize> {
        let mut levels: Vec<usize> = self
            .by_id
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .map(|o| o.level_index)
            .collect();
        levels.sort_unstable();
        levels
    }
}

/// Cosmetic label for the read-only `GET levels` API: the engine itself
/// only ever reasons in `Side::{Buy,Sell,Skip}`, but the operator surface
/// resolves the mid level to `mid` and an unreachable ticker to `unknown`
/// rather than skip, per spec's own resolution of the polarity-at-mid
/// open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSide {
    Buy,
    Sell,
    Mid,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct LevelView {
    pub index: usize,
    pub price: f64,
    pub zone_id: u32,
    pub active: bool,
    pub side: LevelSide,
}

pub struct ReconciliationEngine {
    config: Mutex<GridConfig>,
    active_orders: Mutex<ActiveOrders>,
    venue: Arc<dyn VenueAdapter>,
    quantizer: Quantizer,
    state_store: Arc<StateStore>,
    tick_interval: Duration,
    control: Mutex<Option<watch::Sender<Option<()>>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReconciliationEngine {
    pub fn new(
        config: GridConfig,
        venue: Arc<dyn VenueAdapter>,
        state_store: Arc<StateStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            active_orders: Mutex::new(ActiveOrders::default()),
            venue,
            quantizer: Quantizer::new(),
            state_store,
            tick_interval: Duration::from_secs(5),
            control: Mutex::new(None),
            loop_handle: Mutex::new(None),
        })
    }

    pub async fn config_snapshot(&self) -> GridConfig {
        self.config.lock().await.clone()
    }

    /// Merges a manually-supplied external order set into `active_orders`,
    /// snapping each to the nearest level. Adopting the same set twice is
    /// idempotent: an order already tracked under its venue_order_id is
    /// overwritten in place rather than duplicated.
    pub async fn adopt_external(&self, orders: &[ManualSyncOrder]) {
        let cfg = self.config.lock().await;
        let levels = cfg.levels().to_vec();
        drop(cfg);
        let mut active = self.active_orders.lock().await;
        for order in orders {
            let level_index = snap_to_level(order.price, &levels);
            active.insert(LiveOrder {
                level_index,
                zone_id: order.zone_id,
                side: order.side.into(),
                price: order.price,
                size: order.size,
                venue_order_id: order.id.clone(),
                status: OrderStatus::Open,
            });
        }
    }

    /// Startup adoption: one reconciliation tick against current open
    /// orders, with any manual-sync sidecar merged in first.
    pub async fn start(self: &Arc<Self>, manual_sync: Option<Vec<ManualSyncOrder>>) -> Result<()> {
        let current = self.state_store.snapshot().await.bot_state;
        if current == BotState::Running || current == BotState::Starting {
            return Err(GridError::IllegalState("engine already running".into()));
        }

        self.state_store.set_bot_state(BotState::Starting).await;

        if let Some(orders) = manual_sync {
            self.adopt_external(&orders).await;
        }

        if let Err(e) = self.tick().await {
            self.state_store.set_error(e.to_string()).await;
            return Err(e);
        }

        let (tx, mut rx) = watch::channel(None);
        *self.control.lock().await = Some(tx);

        let engine = self.clone();
        let interval = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut backoff = Duration::from_millis(500);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.tick().await {
                            Ok(()) => {
                                backoff = Duration::from_millis(500);
                            }
                            Err(e) if is_retryable(&e) => {
                                log::warn!("RECON: transient tick error, backing off {:?}: {}", backoff, e);
                                tokio::time::sleep(backoff).await;
                                backoff = (backoff * 2).min(Duration::from_secs(10));
                            }
                            Err(e) if is_halting(&e) => {
                                log::error!("RECON: halting error, stopping loop: {}", e);
                                engine.state_store.set_error(e.to_string()).await;
                                break;
                            }
                            Err(e) => {
                                log::error!("RECON: unexpected tick error, stopping loop: {}", e);
                                engine.state_store.set_error(e.to_string()).await;
                                break;
                            }
                        }
                    }
                    _ = rx.changed() => {
                        if rx.borrow().is_some() {
                            break;
                        }
                    }
                }
            }
        });
        *self.loop_handle.lock().await = Some(handle);

        self.state_store.set_bot_state(BotState::Running).await;
        Ok(())
    }

    /// Signals the loop to exit after the current step, awaits
    /// termination with a bounded timeout, then runs cancel-all
    /// regardless.
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        self.state_store.set_bot_state(BotState::Stopping).await;

        if let Some(tx) = self.control.lock().await.take() {
            let _ = tx.send(Some(()));
        }
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(10), handle).await.is_err() {
                log::warn!("RECON: stop timed out waiting for loop to drain, aborting");
            }
        }

        self.cancel_all().await?;
        self.state_store.set_bot_state(BotState::Stopped).await;
        Ok(())
    }

    /// `reset(cancel_only=true)` is equivalent to stop + cancel-all
    /// without restart.
    pub async fn reset(self: &Arc<Self>, clear_positions: bool) -> Result<()> {
        self.stop().await?;
        if clear_positions {
            self.active_orders.lock().await.clear();
        }
        self.state_store.reset().await;
        Ok(())
    }

    pub async fn toggle_zone(&self, zone_id: u32, enabled: bool) -> Result<()> {
        let mut cfg = self.config.lock().await;
        if !cfg.zones.iter().any(|z| z.id == zone_id) {
            return Err(GridError::NotFound(format!("zone {} not found", zone_id)));
        }
        for zone in cfg.zones.iter_mut() {
            if zone.id == zone_id {
                zone.enabled = enabled;
            }
        }
        cfg.finalize()
    }

    pub async fn cancel_level(&self, level: usize) -> Result<()> {
        let cfg = self.config.lock().await;
        let symbol = cfg.symbol.clone();
        drop(cfg);

        let mut active = self.active_orders.lock().await;
        if let Some(order) = active.open_at_level(level).cloned() {
            self.venue.cancel(&order.venue_order_id, &symbol).await?;
            active.remove_by_id(&order.venue_order_id);
        }
        Ok(())
    }

    /// Cannot manually enable a level whose polarity is `skip` at the
    /// current mid (mirrors `grid_engine.py::enable_order_at_level`). Past
    /// the guard, this mirrors the tick's own place path: quantize,
    /// validate, place, record — a level already holding an Open entry is
    /// left alone rather than double-placed.
    pub async fn enable_level(&self, level: usize) -> Result<()> {
        let cfg = self.config.lock().await.clone();
        let price = *cfg
            .levels()
            .get(level)
            .ok_or_else(|| GridError::IllegalState(format!("no such level {}", level)))?;
        let zone = cfg.zone_of(level).unwrap_or(crate::grid::ZoneEntry {
            zone_id: 0,
            enabled: true,
        });

        let ticker = self.venue.fetch_ticker(&cfg.symbol).await?;
        let mid = ticker.mid();
        let side = match determine_side(price, mid, mid_tolerance(mid)) {
            Side::Buy => OrderSide::Buy,
            Side::Sell => OrderSide::Sell,
            Side::Skip => {
                return Err(GridError::IllegalState(
                    "cannot manually enable a level at the mid price".into(),
                ));
            }
        };

        let mut active = self.active_orders.lock().await;
        if active.open_at_level(level).is_some() {
            return Ok(());
        }

        let rounded_price = self.quantizer.round_price(cfg.venue, &cfg.symbol, price);
        let rounded_size = self.quantizer.round_size(cfg.venue, &cfg.symbol, cfg.size_per_level);
        self.quantizer
            .validate(cfg.venue, &cfg.symbol, rounded_size, rounded_price)
            .map_err(|e| GridError::ValidatorRejection(format!("{:?}", e)))?;

        let place = self
            .venue
            .place_limit(&cfg.symbol, side, rounded_price, rounded_size)
            .await?;
        match place.status {
            PlaceStatus::Open => {
                active.insert(LiveOrder {
                    level_index: level,
                    zone_id: zone.zone_id,
                    side,
                    price: rounded_price,
                    size: rounded_size,
                    venue_order_id: place.venue_order_id,
                    status: OrderStatus::Open,
                });
                Ok(())
            }
            PlaceStatus::Rejected(reason) => Err(GridError::ValidatorRejection(reason)),
        }
    }

    /// `GET orders/active`: a copy of every tracked `LiveOrder`, observers
    /// never get the map itself (the engine exclusively owns it).
    pub async fn active_orders_snapshot(&self) -> Vec<LiveOrder> {
        self.active_orders.lock().await.by_id.values().cloned().collect()
    }

    /// `POST orders/{venue_order_id}/cancel`: cancels a single tracked
    /// order directly by its venue id, independent of which level it
    /// occupies.
    pub async fn cancel_order(&self, venue_order_id: &str) -> Result<()> {
        let cfg = self.config.lock().await;
        let symbol = cfg.symbol.clone();
        drop(cfg);

        self.venue.cancel(venue_order_id, &symbol).await?;
        self.active_orders.lock().await.remove_by_id(venue_order_id);
        Ok(())
    }

    /// `GET levels`: one row per level with its current polarity. A
    /// ticker that can't be fetched resolves every row to `Unknown`
    /// rather than failing the whole call.
    pub async fn levels_view(&self) -> Vec<LevelView> {
        let cfg = self.config.lock().await.clone();
        let mid = self.venue.fetch_ticker(&cfg.symbol).await.ok().map(|t| t.mid());
        let active = self.active_orders.lock().await;

        (0..cfg.n_levels)
            .map(|i| {
                let price = cfg.levels()[i];
                let zone = cfg.zone_of(i).unwrap_or(crate::grid::ZoneEntry {
                    zone_id: 0,
                    enabled: true,
                });
                let side = match mid {
                    Some(m) => match determine_side(price, m, mid_tolerance(m)) {
                        Side::Buy => LevelSide::Buy,
                        Side::Sell => LevelSide::Sell,
                        Side::Skip => LevelSide::Mid,
                    },
                    None => LevelSide::Unknown,
                };
                LevelView {
                    index: i,
                    price,
                    zone_id: zone.zone_id,
                    active: active.open_at_level(i).is_some(),
                    side,
                }
            })
            .collect()
    }

    /// Cancel-all: best-effort cancellation of every order this engine
    /// knows about or can see on the venue, then clears local tracking.
    pub async fn cancel_all(&self) -> Result<()> {
        let cfg = self.config.lock().await;
        let symbol = cfg.symbol.clone();
        drop(cfg);

        let open_orders = self.venue.fetch_open_orders(&symbol).await.unwrap_or_default();
        let mut active = self.active_orders.lock().await;

        for order in &open_orders {
            match self.venue.cancel(&order.id, &symbol).await {
                Ok(_) => {}
                Err(e) => log::warn!("RECON: cancel-all: failed to cancel {}: {}", order.id, e),
            }
        }

        let tracked_but_unlisted: Vec<String> = active
            .by_id
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .filter(|o| !open_orders.iter().any(|oo| oo.id == o.venue_order_id))
            .map(|o| o.venue_order_id.clone())
            .collect();

        for id in tracked_but_unlisted {
            if let Err(e) = self.venue.cancel(&id, &symbol).await {
                log::warn!("RECON: cancel-all: best-effort cancel of {} failed: {}", id, e);
                if let Some(order) = active.by_id.get_mut(&id) {
                    order.status = OrderStatus::Unknown;
                }
            }
        }

        active.clear();
        drop(active);
        self.state_store.set_active_levels(Vec::new()).await;
        Ok(())
    }

    /// One reconciliation tick: discovery -> fill processing -> adoption
    /// -> replacement -> zone cancels.
    pub async fn tick(&self) -> Result<()> {
        let cfg = self.config.lock().await.clone();
        let ticker = self.venue.fetch_ticker(&cfg.symbol).await?;
        let mid = ticker.mid();
        let tol = mid_tolerance(mid);

        let open_orders = self.venue.fetch_open_orders(&cfg.symbol).await?;
        let mut active = self.active_orders.lock().await;

        // Step 2: API-outage guard.
        if open_orders.is_empty() && active.len() > 0 {
            log::warn!("RECON: venue returned no open orders while {} tracked; skipping tick (outage guard)", active.len());
            return Ok(());
        }

        // Step 3: fill detection.
        let missing: Vec<String> = active
            .by_id
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .filter(|o| !open_orders.iter().any(|oo| oo.id == o.venue_order_id))
            .map(|o| o.venue_order_id.clone())
            .collect();
        for id in &missing {
            if let Some(order) = active.by_id.get_mut(id) {
                order.status = OrderStatus::Filled;
            }
        }

        // Step 4: adoption — orders present on the venue but not tracked.
        for order in &open_orders {
            if active.by_id.contains_key(&order.id) {
                continue;
            }
            let level_index = snap_to_level(order.price, cfg.levels());
            let zone_id = cfg.zone_of(level_index).map(|z| z.zone_id).unwrap_or(0);
            active.insert(LiveOrder {
                level_index,
                zone_id,
                side: order.side,
                price: order.price,
                size: order.amount,
                venue_order_id: order.id.clone(),
                status: OrderStatus::Open,
            });
        }

        // Filled orders are removed from the active map now; they are
        // re-placed below on this SAME level but that re-placement
        // happens next tick per the ordering guarantee (fills observed
        // this tick are replaced next tick, never in the current one).
        let mut filled_levels = Vec::new();
        for id in &missing {
            if let Some(order) = active.remove_by_id(id) {
                filled_levels.push(order.level_index);
            }
        }

        // Step 5: zone cancels happen before desired-state convergence so
        // a disabled level never gets re-placed into within the same tick.
        for level in 0..cfg.n_levels {
            let zone = cfg.zone_of(level).unwrap_or(crate::grid::ZoneEntry {
                zone_id: 0,
                enabled: true,
            });
            if !zone.enabled {
                if let Some(order) = active.open_at_level(level).cloned() {
                    match self.venue.cancel(&order.venue_order_id, &cfg.symbol).await {
                        Ok(_) => {
                            active.remove_by_id(&order.venue_order_id);
                        }
                        Err(e) => log::warn!("RECON: zone cancel failed for level {}: {}", level, e),
                    }
                }
            }
        }

        // Step 5 (continued): desired-state convergence. Every enabled
        // level with no Open entry gets a placement attempt if its
        // polarity isn't skip and the validator passes. This naturally
        // covers levels freed up by fills observed in a PRIOR tick (not
        // this one — `filled_levels` computed above isn't re-placed here).
        for level in 0..cfg.n_levels {
            let zone = cfg.zone_of(level).unwrap_or(crate::grid::ZoneEntry {
                zone_id: 0,
                enabled: true,
            });
            if !zone.enabled {
                continue;
            }
            if active.open_at_level(level).is_some() {
                continue;
            }
            if filled_levels.contains(&level) {
                // Observed as filled THIS tick: re-placed next tick, not now.
                continue;
            }

            let price = cfg.levels()[level];
            let side = determine_side(price, mid, tol);
            let side = match side {
                Side::Buy => OrderSide::Buy,
                Side::Sell => OrderSide::Sell,
                Side::Skip => continue,
            };

            let rounded_price = self.quantizer.round_price(cfg.venue, &cfg.symbol, price);
            let rounded_size = self.quantizer.round_size(cfg.venue, &cfg.symbol, cfg.size_per_level);

            if self
                .quantizer
                .validate(cfg.venue, &cfg.symbol, rounded_size, rounded_price)
                .is_err()
            {
                continue;
            }

            match self
                .venue
                .place_limit(&cfg.symbol, side, rounded_price, rounded_size)
                .await
            {
                Ok(place) => match place.status {
                    PlaceStatus::Open => {
                        active.insert(LiveOrder {
                            level_index: level,
                            zone_id: zone.zone_id,
                            side,
                            price: rounded_price,
                            size: rounded_size,
                            venue_order_id: place.venue_order_id,
                            status: OrderStatus::Open,
                        });
                    }
                    PlaceStatus::Rejected(reason) => {
                        log::warn!("RECON: level {} rejected: {}", level, reason);
                    }
                },
                Err(e) if is_retryable(&e) => {
                    log::warn!("RECON: level {} place deferred, retry next tick: {}", level, e);
                }
                Err(e) => return Err(e),
            }
        }

        // Step 7: update active_levels in the State Store.
        let levels = active.active_levels();
        drop(active);
        self.state_store.set_active_levels(levels).await;

        self.update_pnl_and_inventory(&cfg, mid).await;
        Ok(())
    }

    /// Best-effort PnL/inventory snapshot, grounded in
    /// `grid_engine.py::_update_pnl` (`balance.total[base] * ticker.last`,
    /// spec's Open Question #3). A balance fetch failure here never fails
    /// the tick — this is explicitly a non-authoritative heuristic, not
    /// part of the reconciliation contract.
    async fn update_pnl_and_inventory(&self, cfg: &GridConfig, mid: f64) {
        let balance = match self.venue.fetch_balance().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("RECON: balance fetch failed, skipping pnl/inventory update: {}", e);
                return;
            }
        };

        let inventory: HashMap<String, f64> = balance.iter().map(|(k, v)| (k.clone(), v.total)).collect();
        self.state_store.update_inventory(inventory).await;

        if let Some(base) = cfg.symbol.split('/').next() {
            if let Some(b) = balance.get(base) {
                self.state_store.update_pnl(None, Some(b.total * mid)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridConfig, Mode, Venue};
    use crate::grid::Spacing;
    use crate::venues::simulator::Simulator;
    use std::collections::HashMap as StdHashMap;

    async fn s1_engine() -> Arc<ReconciliationEngine> {
        let cfg = GridConfig::new(
            100.0,
            200.0,
            5,
            Spacing::Arithmetic,
            0.1,
            vec![],
            Mode::Simulated,
            Venue::B,
            "BTC/USDT".to_string(),
        )
        .unwrap();
        let sim = Arc::new(Simulator::new(
            150.0,
            0.0,
            1,
            StdHashMap::from([("USDT".to_string(), 1_000_000.0), ("BTC".to_string(), 10.0)]),
        ));
        let store = StateStore::new();
        ReconciliationEngine::new(cfg, sim, store)
    }

    #[tokio::test]
    async fn s1_tick_places_orders_at_non_skip_levels() {
        let engine = s1_engine().await;
        engine.tick().await.unwrap();
        let active = engine.active_orders.lock().await;
        // levels [100,125,150,175,200] at mid=150 -> buy,buy,skip,sell,sell
        assert!(active.open_at_level(0).is_some());
        assert!(active.open_at_level(1).is_some());
        assert!(active.open_at_level(2).is_none());
        assert!(active.open_at_level(3).is_some());
        assert!(active.open_at_level(4).is_some());
    }

    #[tokio::test]
    async fn s3_single_fill_is_replaced_next_tick() {
        let engine = s1_engine().await;
        engine.tick().await.unwrap();

        let order_id = {
            let active = engine.active_orders.lock().await;
            active.open_at_level(1).unwrap().venue_order_id.clone()
        };
        // Simulate the fill by cancelling through the venue directly so
        // the next fetch_open_orders() no longer lists it.
        engine.venue.cancel(&order_id, "BTC/USDT").await.unwrap();

        // Tick N: fill detected, order removed, NOT yet replaced this tick.
        engine.tick().await.unwrap();
        {
            let active = engine.active_orders.lock().await;
            assert!(active.open_at_level(1).is_none());
        }

        // Tick N+1: replacement happens now.
        engine.tick().await.unwrap();
        let active = engine.active_orders.lock().await;
        assert!(active.open_at_level(1).is_some());
    }

    #[tokio::test]
    async fn s4_zone_disable_cancels_only_its_levels() {
        let cfg = GridConfig::new(
            100.0,
            200.0,
            5,
            Spacing::Arithmetic,
            0.1,
            vec![
                crate::config::ZoneDef { id: 1, start_idx: 0, end_idx: 1, enabled: true },
                crate::config::ZoneDef { id: 2, start_idx: 2, end_idx: 4, enabled: true },
            ],
            Mode::Simulated,
            Venue::B,
            "BTC/USDT".to_string(),
        )
        .unwrap();
        let sim = Arc::new(Simulator::new(
            150.0,
            0.0,
            2,
            StdHashMap::from([("USDT".to_string(), 1_000_000.0), ("BTC".to_string(), 10.0)]),
        ));
        let store = StateStore::new();
        let engine = ReconciliationEngine::new(cfg, sim, store);
        engine.tick().await.unwrap();

        engine.toggle_zone(1, false).await.unwrap();
        engine.tick().await.unwrap();

        let active = engine.active_orders.lock().await;
        assert!(active.open_at_level(0).is_none());
        assert!(active.open_at_level(1).is_none());
        assert!(active.open_at_level(3).is_some());
        assert!(active.open_at_level(4).is_some());
    }

    #[tokio::test]
    async fn s5_outage_guard_skips_tick_without_mass_fill() {
        let engine = s1_engine().await;
        engine.tick().await.unwrap();

        let tracked_before = engine.active_orders.lock().await.len();
        assert!(tracked_before > 0);

        // Force the next fetch_open_orders() to look like an outage by
        // cancelling every order through the venue directly (so the
        // venue's own listing goes empty) while leaving them tracked.
        let ids: Vec<String> = engine
            .active_orders
            .lock()
            .await
            .by_id
            .keys()
            .cloned()
            .collect();
        for id in &ids {
            engine.venue.cancel(id, "BTC/USDT").await.unwrap();
        }

        engine.tick().await.unwrap();
        let active = engine.active_orders.lock().await;
        // Outage guard should have left the map untouched, not marked
        // everything Filled.
        assert_eq!(active.len(), tracked_before);
    }

    #[tokio::test]
    async fn levels_view_labels_mid_and_reports_active() {
        let engine = s1_engine().await;
        engine.tick().await.unwrap();
        let views = engine.levels_view().await;
        assert_eq!(views.len(), 5);
        assert_eq!(views[2].side, LevelSide::Mid);
        assert!(!views[2].active);
        assert_eq!(views[0].side, LevelSide::Buy);
        assert!(views[0].active);
    }

    #[tokio::test]
    async fn cancel_order_by_id_removes_it_from_active_orders() {
        let engine = s1_engine().await;
        engine.tick().await.unwrap();
        let order_id = {
            let active = engine.active_orders.lock().await;
            active.open_at_level(0).unwrap().venue_order_id.clone()
        };
        engine.cancel_order(&order_id).await.unwrap();
        let active = engine.active_orders.lock().await;
        assert!(active.open_at_level(0).is_none());
    }

    #[tokio::test]
    async fn tick_updates_pnl_and_inventory_from_balance() {
        let engine = s1_engine().await;
        engine.tick().await.unwrap();
        let snap = engine.state_store.snapshot().await;
        // s1_engine seeds 10.0 BTC at mid=150.0 -> pnl_unrealized = 1500.0.
        assert_eq!(snap.pnl_unrealized, 1500.0);
        assert_eq!(snap.inventory.get("BTC"), Some(&10.0));
        assert_eq!(snap.inventory.get("USDT"), Some(&1_000_000.0));
    }

    #[test]
    fn adoption_twice_is_idempotent() {
        // ActiveOrders::insert overwrites by venue_order_id, so two
        // identical ManualSyncOrder adoptions never duplicate an entry;
        // covered at the engine level in adopt_external, re-verified here
        // against the underlying map directly.
        let mut active = ActiveOrders::default();
        let order = LiveOrder {
            level_index: 1,
            zone_id: 0,
            side: OrderSide::Buy,
            price: 125.0,
            size: 0.01,
            venue_order_id: "ext-1".to_string(),
            status: OrderStatus::Open,
        };
        active.insert(order.clone());
        active.insert(order);
        assert_eq!(active.len(), 1);
    }
}
