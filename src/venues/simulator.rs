//! Deterministic simulator adapter, so test suites are hermetic: seeded
//! RNG, geometric Brownian walk, open orders match when the simulated mid
//! crosses the limit price. Grounded in `exchange_sim.py`'s
//! `SimulatedExchange` (random-walk price updater + order matcher), with
//! in-process mutex-guarded state updated by a spawned background task in
//! place of a Python event loop task.

use async_trait::async_trait;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::error::{GridError, Result};
use crate::venue::{
    AssetBalance, CancelResult, MarketInfo, OpenOrder, Order, OrderSide, PlaceResult, PlaceStatus,
    Ticker, VenueAdapter,
};

#[derive(Debug, Clone)]
struct SimOrder {
    id: String,
    symbol: String,
    side: OrderSide,
    price: f64,
    amount: f64,
    filled: f64,
    status: String,
    ts: i64,
}

struct SimulatorInner {
    rng: StdRng,
    mid: f64,
    volatility: f64,
    orders: HashMap<String, SimOrder>,
    balances: HashMap<String, f64>,
    order_counter: u64,
}

impl SimulatorInner {
    fn step(&mut self) {
        let change: f64 = self.rng.sample(rand_distr_normal(0.0, self.volatility));
        self.mid *= 1.0 + change;
        self.mid = self.mid.max(1.0);
        self.match_orders();
    }

    fn match_orders(&mut self) {
        for order in self.orders.values_mut() {
            if order.status != "open" {
                continue;
            }
            let matched = match order.side {
                OrderSide::Buy => self.mid <= order.price,
                OrderSide::Sell => self.mid >= order.price,
            };
            if matched {
                let (base, quote) = split_symbol(&order.symbol);
                match order.side {
                    OrderSide::Buy => {
                        let cost = order.amount * order.price;
                        *self.balances.entry(quote).or_insert(0.0) -= cost;
                        *self.balances.entry(base).or_insert(0.0) += order.amount;
                    }
                    OrderSide::Sell => {
                        *self.balances.entry(base).or_insert(0.0) -= order.amount;
                        *self.balances.entry(quote).or_insert(0.0) += order.amount * order.price;
                    }
                }
                order.status = "filled".to_string();
                order.filled = order.amount;
            }
        }
    }
}

// rand 0.8 has no built-in normal distribution without rand_distr; this
// codebase already reaches for `rand::Rng::gen` directly elsewhere, so a
// minimal Box-Muller sampler is used here instead of adding another
// dependency for one call site.
fn rand_distr_normal(mean: f64, std_dev: f64) -> BoxMuller {
    BoxMuller { mean, std_dev }
}

struct BoxMuller {
    mean: f64,
    std_dev: f64,
}

impl Distribution<f64> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u1: f64 = rng.gen_range(1e-12..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        self.mean + z0 * self.std_dev
    }
}

fn split_symbol(symbol: &str) -> (String, String) {
    match symbol.split_once('/') {
        Some((base, quote)) => (base.to_string(), quote.to_string()),
        None => (symbol.to_string(), "USD".to_string()),
    }
}

pub struct Simulator {
    inner: Arc<Mutex<SimulatorInner>>,
    running: Arc<AtomicBool>,
    tick_counter: Arc<AtomicU64>,
    updater: Mutex<Option<JoinHandle<()>>>,
}

impl Simulator {
    pub fn new(initial_price: f64, volatility: f64, seed: u64, initial_balances: HashMap<String, f64>) -> Self {
        let inner = Arc::new(Mutex::new(SimulatorInner {
            rng: StdRng::seed_from_u64(seed),
            mid: initial_price,
            volatility,
            orders: HashMap::new(),
            balances: initial_balances,
            order_counter: 1000,
        }));

        let running = Arc::new(AtomicBool::new(true));
        let tick_counter = Arc::new(AtomicU64::new(0));

        let updater = {
            let inner = inner.clone();
            let running = running.clone();
            let tick_counter = tick_counter.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                while running.load(Ordering::Relaxed) {
                    interval.tick().await;
                    let mut guard = inner.lock().await;
                    guard.step();
                    drop(guard);
                    tick_counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        Self {
            inner,
            running,
            tick_counter,
            updater: Mutex::new(Some(updater)),
        }
    }

    /// Test seam: advance the simulated price/matcher one step without
    /// waiting on the background task's real-time interval.
    pub async fn step_once(&self) {
        self.inner.lock().await.step();
    }

    pub async fn ticks_elapsed(&self) -> u64 {
        self.tick_counter.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VenueAdapter for Simulator {
    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>> {
        let mut markets = HashMap::new();
        markets.insert(
            "BTC/USDT".to_string(),
            MarketInfo {
                symbol: "BTC/USDT".to_string(),
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                active: true,
                min_size: 0.00001,
                price_step: 0.01,
            },
        );
        Ok(markets)
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker> {
        let guard = self.inner.lock().await;
        let spread = guard.mid * 0.001;
        Ok(Ticker {
            bid: guard.mid - spread,
            ask: guard.mid + spread,
            last: guard.mid,
            ts: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<PlaceResult> {
        let mut guard = self.inner.lock().await;
        let id = format!("sim_{}", guard.order_counter);
        guard.order_counter += 1;
        guard.orders.insert(
            id.clone(),
            SimOrder {
                id: id.clone(),
                symbol: symbol.to_string(),
                side,
                price,
                amount: size,
                filled: 0.0,
                status: "open".to_string(),
                ts: chrono::Utc::now().timestamp_millis(),
            },
        );
        Ok(PlaceResult {
            venue_order_id: id,
            status: PlaceStatus::Open,
        })
    }

    async fn cancel(&self, venue_order_id: &str, _symbol: &str) -> Result<CancelResult> {
        let mut guard = self.inner.lock().await;
        match guard.orders.get_mut(venue_order_id) {
            Some(order) => {
                order.status = "cancelled".to_string();
                Ok(CancelResult::Ok)
            }
            None => Ok(CancelResult::NotFound),
        }
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.status == "open")
            .map(|o| OpenOrder {
                id: o.id.clone(),
                side: o.side,
                price: o.price,
                amount: o.amount,
                remaining: o.amount - o.filled,
                ts: o.ts,
            })
            .collect())
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, AssetBalance>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .balances
            .iter()
            .map(|(k, &v)| {
                (
                    k.clone(),
                    AssetBalance {
                        free: v,
                        used: 0.0,
                        total: v,
                    },
                )
            })
            .collect())
    }

    async fn fetch_order(&self, id: &str, _symbol: &str) -> Result<Order> {
        let guard = self.inner.lock().await;
        let o = guard
            .orders
            .get(id)
            .ok_or_else(|| GridError::NotFound(format!("order {} not found", id)))?;
        Ok(Order {
            id: o.id.clone(),
            side: o.side,
            price: o.price,
            amount: o.amount,
            filled: o.filled,
            remaining: o.amount - o.filled,
            status: o.status.clone(),
            ts: o.ts,
        })
    }

    async fn close(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.updater.lock().await.take() {
            handle.abort();
        }
        log::info!("simulator closed");
    }
}
