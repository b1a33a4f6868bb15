//! Venue B: library-backed adapter. Unlike Venue A, which builds and
//! signs its own REST envelope, Venue B wraps a typed client struct the
//! way `exchange_okx_ccxt.py` wraps a ccxt exchange object and
//! `smohantty-hyperliquid-rust-sdk`'s `market` module wraps its own
//! typed REST client — callers never see raw signing or wire JSON.
//! `symbol`/size conventions match the underlying venue one-for-one, so
//! this adapter does no unit conversion (contrast Venue A).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{GridError, Result};
use crate::venue::{
    AssetBalance, CancelResult, MarketInfo, OpenOrder, Order, OrderSide, PlaceResult, PlaceStatus,
    Ticker, VenueAdapter,
};

/// Minimal typed client standing in for a real exchange SDK crate (the
/// corpus's Rust SDK example depends on a venue-specific crate it owns;
/// no such crate exists for this venue, so the client is implemented
/// directly over `reqwest`, kept separate from `VenueB` so the adapter
/// itself never touches wire details).
pub struct LibraryClient {
    base_url: String,
    api_key: String,
    api_secret: String,
    passphrase: String,
    http: reqwest::Client,
}

impl LibraryClient {
    pub fn new(base_url: String, api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            base_url,
            api_key,
            api_secret,
            passphrase,
            http: reqwest::Client::new(),
        }
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("OKX-API-KEY", self.api_key.clone()),
            ("OKX-API-SECRET", self.api_secret.clone()),
            ("OKX-API-PASSPHRASE", self.passphrase.clone()),
        ]
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        for (k, v) in self.auth_headers() {
            req = req.header(k, v);
        }
        Ok(req.send().await?.json::<Value>().await?)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let mut req = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        for (k, v) in self.auth_headers() {
            req = req.header(k, v);
        }
        Ok(req.send().await?.json::<Value>().await?)
    }
}

pub struct VenueB {
    client: LibraryClient,
}

impl VenueB {
    pub fn new(client: LibraryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VenueAdapter for VenueB {
    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>> {
        let data = self.client.get("/api/v5/public/instruments?instType=SPOT").await?;
        let mut markets = HashMap::new();
        if let Some(arr) = data.get("data").and_then(|v| v.as_array()) {
            for inst in arr {
                let symbol = inst
                    .get("instId")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .replace('-', "/");
                if symbol.is_empty() {
                    continue;
                }
                let (base, quote) = symbol.split_once('/').unwrap_or(("", ""));
                markets.insert(
                    symbol.clone(),
                    MarketInfo {
                        symbol,
                        base: base.to_string(),
                        quote: quote.to_string(),
                        active: true,
                        min_size: inst
                            .get("minSz")
                            .and_then(|v| v.as_str())
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0),
                        price_step: inst
                            .get("tickSz")
                            .and_then(|v| v.as_str())
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0),
                    },
                );
            }
        }
        Ok(markets)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let inst_id = symbol.replace('/', "-");
        let data = self
            .client
            .get(&format!("/api/v5/market/ticker?instId={}", inst_id))
            .await?;
        let ticker = data
            .get("data")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .ok_or_else(|| GridError::NotFound(format!("ticker for {} not present", symbol)))?;

        let parse = |key: &str| -> f64 {
            ticker
                .get(key)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0)
        };

        Ok(Ticker {
            bid: parse("bidPx"),
            ask: parse("askPx"),
            last: parse("last"),
            ts: ticker
                .get("ts")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<PlaceResult> {
        let inst_id = symbol.replace('/', "-");
        let body = serde_json::json!({
            "instId": inst_id,
            "tdMode": "cash",
            "side": side.as_str(),
            "ordType": "limit",
            "px": price.to_string(),
            "sz": size.to_string(),
        });
        let data = self.client.post("/api/v5/trade/order", &body).await?;
        let entry = data.get("data").and_then(|v| v.as_array()).and_then(|a| a.first());
        match entry {
            Some(e) if e.get("sCode").and_then(|v| v.as_str()) == Some("0") => Ok(PlaceResult {
                venue_order_id: e.get("ordId").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                status: PlaceStatus::Open,
            }),
            Some(e) => Ok(PlaceResult {
                venue_order_id: String::new(),
                status: PlaceStatus::Rejected(
                    e.get("sMsg").and_then(|v| v.as_str()).unwrap_or("rejected").to_string(),
                ),
            }),
            None => Ok(PlaceResult {
                venue_order_id: String::new(),
                status: PlaceStatus::Rejected("empty response".into()),
            }),
        }
    }

    async fn cancel(&self, venue_order_id: &str, symbol: &str) -> Result<CancelResult> {
        let inst_id = symbol.replace('/', "-");
        let body = serde_json::json!({ "instId": inst_id, "ordId": venue_order_id });
        let data = self.client.post("/api/v5/trade/cancel-order", &body).await?;
        let entry = data.get("data").and_then(|v| v.as_array()).and_then(|a| a.first());
        match entry {
            Some(e) if e.get("sCode").and_then(|v| v.as_str()) == Some("0") => Ok(CancelResult::Ok),
            _ => Ok(CancelResult::NotFound),
        }
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let inst_id = symbol.replace('/', "-");
        let data = self
            .client
            .get(&format!("/api/v5/trade/orders-pending?instId={}", inst_id))
            .await?;
        let mut orders = Vec::new();
        if let Some(arr) = data.get("data").and_then(|v| v.as_array()) {
            for o in arr {
                let parse = |key: &str| -> f64 {
                    o.get(key)
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0.0)
                };
                let amount = parse("sz");
                let filled = parse("accFillSz");
                orders.push(OpenOrder {
                    id: o.get("ordId").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    side: match o.get("side").and_then(|v| v.as_str()) {
                        Some("sell") => OrderSide::Sell,
                        _ => OrderSide::Buy,
                    },
                    price: parse("px"),
                    amount,
                    remaining: amount - filled,
                    ts: o
                        .get("cTime")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                });
            }
        }
        Ok(orders)
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, AssetBalance>> {
        let data = self.client.get("/api/v5/account/balance").await?;
        let mut balances = HashMap::new();
        if let Some(details) = data
            .get("data")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|d| d.get("details"))
            .and_then(|v| v.as_array())
        {
            for d in details {
                let parse = |key: &str| -> f64 {
                    d.get(key)
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0.0)
                };
                let ccy = d.get("ccy").and_then(|v| v.as_str()).unwrap_or("").to_string();
                if ccy.is_empty() {
                    continue;
                }
                balances.insert(
                    ccy,
                    AssetBalance {
                        free: parse("availBal"),
                        used: parse("frozenBal"),
                        total: parse("cashBal"),
                    },
                );
            }
        }
        Ok(balances)
    }

    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<Order> {
        let inst_id = symbol.replace('/', "-");
        let data = self
            .client
            .get(&format!("/api/v5/trade/order?instId={}&ordId={}", inst_id, id))
            .await?;
        let entry = data
            .get("data")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .ok_or_else(|| GridError::NotFound(format!("order {} not found", id)))?;

        let parse = |key: &str| -> f64 {
            entry
                .get(key)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0)
        };
        let amount = parse("sz");
        let filled = parse("accFillSz");

        Ok(Order {
            id: id.to_string(),
            side: match entry.get("side").and_then(|v| v.as_str()) {
                Some("sell") => OrderSide::Sell,
                _ => OrderSide::Buy,
            },
            price: parse("px"),
            amount,
            filled,
            remaining: amount - filled,
            status: entry.get("state").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            ts: entry
                .get("cTime")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }

    async fn close(&self) {
        log::info!("venue B connection closed");
    }
}
