//! Venue Adapter Contract. A capability set, not an inheritance hierarchy —
//! modeled the way `exchange.rs`'s `ExchangeClient` trait abstracts over
//! `SimExchange`/`LiveExchange`, generalized to the three concrete adapters
//! this engine needs (`venues::venue_a`, `venues::venue_b`,
//! `venues::simulator`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaceStatus {
    Open,
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct PlaceResult {
    pub venue_order_id: String,
    pub status: PlaceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelResult {
    Ok,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub active: bool,
    pub min_size: f64,
    pub price_step: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub ts: i64,
}

impl Ticker {
    pub fn mid(&self) -> f64 {
        self.last
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub id: String,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub remaining: f64,
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssetBalance {
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub filled: f64,
    pub remaining: f64,
    pub status: String,
    pub ts: i64,
}

/// Uniform async surface every venue adapter implements. The engine only
/// ever supplies base-currency size at a given level price; converting to
/// the venue's own size-unit convention (quote vs base currency, inverted
/// symbol naming) is the adapter's job.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>>;
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;
    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<PlaceResult>;
    /// For venues that require the order side as a cancellation
    /// parameter, the adapter looks the side up from its own open-orders
    /// listing, retrying with each side if the order isn't found there.
    async fn cancel(&self, venue_order_id: &str, symbol: &str) -> Result<CancelResult>;
    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;
    async fn fetch_balance(&self) -> Result<HashMap<String, AssetBalance>>;
    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<Order>;
    async fn close(&self);
}
