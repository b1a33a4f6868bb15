//! Venue A: signed JSON-REST, inverted symbol convention (external
//! `QUOTE_BASE` vs the engine's `QUOTE/BASE`), quote-currency amount for
//! buys and base-currency amount for sells. Wire shapes and the integer
//! error-code taxonomy are grounded in `exchange_bitkub.py`; the
//! request-signing shape (build the signing message, HMAC, attach as
//! headers) follows `cooprefr-bettersys`'s `PolymarketClobAdapter::sign_request`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::{GridError, Result};
use crate::venue::{
    AssetBalance, CancelResult, MarketInfo, OpenOrder, Order, OrderSide, PlaceResult, PlaceStatus,
    Ticker, VenueAdapter,
};

type HmacSha256 = Hmac<Sha256>;

/// Bitkub-shaped integer error codes, grounded in `exchange_bitkub.py`'s
/// `error_messages` dict.
fn classify_error_code(code: i64) -> GridError {
    match code {
        4 | 5 | 6 | 9 | 10 | 11 => GridError::AdapterAuth(format!("venue A error {}", code)),
        20 => GridError::AdapterRateLimited(format!("venue A error {}", code)),
        1 | 2 | 3 | 15 | 18 => GridError::AdapterPermanent(format!("venue A error {}", code)),
        _ => GridError::AdapterTransient(format!("venue A error {}", code)),
    }
}

pub struct VenueAConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

pub struct VenueA {
    config: VenueAConfig,
    client: reqwest::Client,
}

impl VenueA {
    pub fn new(config: VenueAConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Converts the engine's `QUOTE/BASE` symbol convention to the
    /// venue's `BASE_QUOTE` convention, e.g. `THB/BTC` <-> `BTC_THB`.
    fn to_venue_symbol(&self, symbol: &str) -> String {
        if let Some((quote, base)) = symbol.split_once('/') {
            format!("{}_{}", base, quote)
        } else {
            symbol.to_string()
        }
    }

    fn sign(&self, ts: i64, method: &str, path: &str, body: &str) -> String {
        let message = format!("{}{}{}{}", ts, method, path, body);
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn server_timestamp_ms(&self) -> i64 {
        let url = format!("{}/servertime", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => match resp.json::<i64>().await {
                Ok(secs) => secs * 1000,
                Err(_) => Self::local_timestamp_ms(),
            },
            Err(_) => Self::local_timestamp_ms(),
        }
    }

    fn local_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn signed_post(&self, path: &str, params: &Value) -> Result<Value> {
        let ts = self.server_timestamp_ms().await;
        let body = if params.is_null() {
            String::new()
        } else {
            serde_json::to_string(params)?
        };
        let sig = self.sign(ts, "POST", path, &body);
        let url = format!("{}{}", self.config.base_url, path);

        let mut req = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.config.api_key)
            .header("X-API-TS", ts.to_string())
            .header("X-API-SIG", sig)
            .header("Content-Type", "application/json");
        if !body.is_empty() {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let data: Value = resp.json().await?;

        if let Some(err_code) = data.get("error").and_then(|v| v.as_i64()) {
            if err_code != 0 {
                return Err(classify_error_code(err_code));
            }
        }

        Ok(data)
    }

    fn find_side_for_order(&self, orders: &[OpenOrder], order_id: &str) -> Option<OrderSide> {
        orders.iter().find(|o| o.id == order_id).map(|o| o.side)
    }

    async fn cancel_with_side(
        &self,
        venue_order_id: &str,
        api_symbol: &str,
        side: OrderSide,
    ) -> Result<bool> {
        let params = json!({
            "sym": api_symbol,
            "id": venue_order_id,
            "sd": side.as_str(),
            "hash": venue_order_id,
        });
        match self
            .signed_post("/api/v3/market/cancel-order", &params)
            .await
        {
            Ok(_) => Ok(true),
            Err(GridError::AdapterPermanent(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl VenueAdapter for VenueA {
    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>> {
        let data = self
            .client
            .get(format!("{}/api/v3/market/symbols", self.config.base_url))
            .send()
            .await?
            .json::<Value>()
            .await?;

        let mut markets = HashMap::new();
        if let Some(result) = data.get("result").and_then(|v| v.as_array()) {
            for entry in result {
                let base = entry.get("base_asset").and_then(|v| v.as_str()).unwrap_or("");
                let quote = entry.get("quote_asset").and_then(|v| v.as_str()).unwrap_or("");
                if base.is_empty() || quote.is_empty() {
                    continue;
                }
                let symbol = format!("{}/{}", quote, base);
                markets.insert(
                    symbol.clone(),
                    MarketInfo {
                        symbol,
                        base: base.to_string(),
                        quote: quote.to_string(),
                        active: !(entry.get("freeze_buy").and_then(|v| v.as_bool()).unwrap_or(false)
                            || entry.get("freeze_sell").and_then(|v| v.as_bool()).unwrap_or(false)),
                        min_size: entry
                            .get("min_quote_size")
                            .and_then(|v| v.as_f64())
                            .unwrap_or(10.0),
                        price_step: entry
                            .get("price_step")
                            .and_then(|v| v.as_str())
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.01),
                    },
                );
            }
        }
        Ok(markets)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let data = self
            .client
            .get(format!("{}/api/market/ticker", self.config.base_url))
            .send()
            .await?
            .json::<Value>()
            .await?;

        let api_symbol = self.to_venue_symbol(symbol);
        let ticker = data.get(&api_symbol).ok_or_else(|| {
            GridError::NotFound(format!("ticker for {} not present", api_symbol))
        })?;

        Ok(Ticker {
            bid: ticker.get("highestBid").and_then(|v| v.as_f64()).unwrap_or(0.0),
            ask: ticker.get("lowestAsk").and_then(|v| v.as_f64()).unwrap_or(0.0),
            last: ticker.get("last").and_then(|v| v.as_f64()).unwrap_or(0.0),
            ts: Self::local_timestamp_ms(),
        })
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<PlaceResult> {
        let api_symbol = self.to_venue_symbol(symbol);
        let endpoint = match side {
            OrderSide::Buy => "/api/v3/market/place-bid",
            OrderSide::Sell => "/api/v3/market/place-ask",
        };

        // Venue A takes quote-currency amount for buys, base-currency
        // amount for sells; the engine always passes base size, so the
        // adapter converts for buys.
        let amount = match side {
            OrderSide::Buy => size * price,
            OrderSide::Sell => size,
        };

        let params = json!({
            "sym": api_symbol,
            "amt": amount,
            "rat": price,
            "typ": "limit",
        });

        match self.signed_post(endpoint, &params).await {
            Ok(data) => {
                let order_id = data
                    .get("result")
                    .and_then(|r| r.get("id"))
                    .and_then(|v| v.as_str().map(String::from).or_else(|| v.as_i64().map(|i| i.to_string())))
                    .unwrap_or_default();
                if order_id.is_empty() {
                    Ok(PlaceResult {
                        venue_order_id: String::new(),
                        status: PlaceStatus::Rejected("no order id returned".into()),
                    })
                } else {
                    Ok(PlaceResult {
                        venue_order_id: order_id,
                        status: PlaceStatus::Open,
                    })
                }
            }
            Err(GridError::AdapterPermanent(msg)) => Ok(PlaceResult {
                venue_order_id: String::new(),
                status: PlaceStatus::Rejected(msg),
            }),
            Err(e) => Err(e),
        }
    }

    async fn cancel(&self, venue_order_id: &str, symbol: &str) -> Result<CancelResult> {
        let api_symbol = self.to_venue_symbol(symbol);
        let open_orders = self.fetch_open_orders(symbol).await?;

        if let Some(side) = self.find_side_for_order(&open_orders, venue_order_id) {
            return if self
                .cancel_with_side(venue_order_id, &api_symbol, side)
                .await?
            {
                Ok(CancelResult::Ok)
            } else {
                Ok(CancelResult::NotFound)
            };
        }

        // Order not present in the current listing: retry cancellation
        // with each side before giving up.
        for side in [OrderSide::Sell, OrderSide::Buy] {
            if self.cancel_with_side(venue_order_id, &api_symbol, side).await? {
                return Ok(CancelResult::Ok);
            }
        }
        Ok(CancelResult::NotFound)
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let api_symbol = self.to_venue_symbol(symbol);
        let params = json!({ "sym": api_symbol });
        let data = self
            .signed_post("/api/v3/market/my-open-orders", &params)
            .await?;

        let result = match data.get("result") {
            Some(r) => r,
            None => return Ok(Vec::new()),
        };

        let entries: Vec<&Value> = match result {
            Value::Array(arr) => arr.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => return Ok(Vec::new()),
        };

        let mut orders = Vec::new();
        for order in entries {
            let id = order
                .get("id")
                .map(|v| v.to_string().trim_matches('"').to_string())
                .unwrap_or_default();
            let side = match order.get("side").and_then(|v| v.as_str()) {
                Some("sell") => OrderSide::Sell,
                _ => OrderSide::Buy,
            };
            let amount = order.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let filled = order.get("filled").and_then(|v| v.as_f64()).unwrap_or(0.0);
            orders.push(OpenOrder {
                id,
                side,
                price: order.get("rate").and_then(|v| v.as_f64()).unwrap_or(0.0),
                amount,
                remaining: amount - filled,
                ts: order.get("ts").and_then(|v| v.as_i64()).unwrap_or(0),
            });
        }
        Ok(orders)
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, AssetBalance>> {
        let data = self
            .signed_post("/api/v3/market/wallet", &Value::Null)
            .await?;

        let mut balances = HashMap::new();
        if let Some(result) = data.get("result").and_then(|v| v.as_object()) {
            for (currency, value) in result {
                if let Some(total) = value.as_f64() {
                    balances.insert(
                        currency.clone(),
                        AssetBalance {
                            free: total,
                            used: 0.0,
                            total,
                        },
                    );
                }
            }
        }
        Ok(balances)
    }

    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<Order> {
        let api_symbol = self.to_venue_symbol(symbol);
        let params = json!({ "sym": api_symbol, "id": id });
        let data = self.signed_post("/api/v3/market/order-info", &params).await?;
        let order = data
            .get("result")
            .ok_or_else(|| GridError::NotFound(format!("order {} not found", id)))?;

        let amount = order.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let filled = order.get("filled").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let side = match order.get("side").and_then(|v| v.as_str()) {
            Some("sell") => OrderSide::Sell,
            _ => OrderSide::Buy,
        };

        Ok(Order {
            id: id.to_string(),
            side,
            price: order.get("rate").and_then(|v| v.as_f64()).unwrap_or(0.0),
            amount,
            filled,
            remaining: amount - filled,
            status: order
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            ts: order.get("ts").and_then(|v| v.as_i64()).unwrap_or(0),
        })
    }

    async fn close(&self) {
        log::info!("venue A connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> VenueA {
        VenueA::new(VenueAConfig {
            base_url: "https://example.invalid".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        })
    }

    #[test]
    fn symbol_conversion_round_trips() {
        let a = adapter();
        assert_eq!(a.to_venue_symbol("THB/BTC"), "BTC_THB");
    }

    #[test]
    fn signature_is_deterministic_for_same_inputs() {
        let a = adapter();
        let sig1 = a.sign(1000, "POST", "/api/v3/market/place-bid", "{}");
        let sig2 = a.sign(1000, "POST", "/api/v3/market/place-bid", "{}");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn signature_changes_with_body() {
        let a = adapter();
        let sig1 = a.sign(1000, "POST", "/api/v3/market/place-bid", "{}");
        let sig2 = a.sign(1000, "POST", "/api/v3/market/place-bid", "{\"sym\":\"BTC_THB\"}");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn error_code_classification() {
        assert_eq!(
            classify_error_code(6),
            GridError::AdapterAuth("venue A error 6".into())
        );
        assert_eq!(
            classify_error_code(20),
            GridError::AdapterRateLimited("venue A error 20".into())
        );
        assert_eq!(
            classify_error_code(18),
            GridError::AdapterPermanent("venue A error 18".into())
        );
    }
}
