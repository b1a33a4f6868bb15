//! Quantizer / Validator. Rounds size/price to a venue's lot and tick, and
//! enforces minimum-size / minimum-notional before an order is allowed to
//! reach the adapter.

use std::collections::HashMap;

use crate::config::Venue;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationError {
    BelowMinSize,
    BelowMinNotional,
    BadSizeStep,
    BadPriceTick,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenueRequirements {
    pub min_size: f64,
    pub min_notional: f64,
    pub size_step: f64,
    pub price_tick: f64,
}

/// Step/tick tolerance: 0.1% of the step, matching the source's
/// `tolerance = step * 0.001` (exchange_validator.py).
const STEP_TOLERANCE_FRACTION: f64 = 0.001;

pub struct Quantizer {
    table: HashMap<(Venue, String), VenueRequirements>,
}

impl Quantizer {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        // Default requirements, lifted from exchange_validator.py's
        // REQUIREMENTS table. A venue's own
        // `load_markets()` response may later refine or add entries via
        // `insert`.
        table.insert(
            (Venue::A, "THB_BTC".to_string()),
            VenueRequirements {
                min_size: 0.000003,
                min_notional: 10.0,
                size_step: 0.00000001,
                price_tick: 0.01,
            },
        );
        table.insert(
            (Venue::A, "THB_ETH".to_string()),
            VenueRequirements {
                min_size: 0.005,
                min_notional: 10.0,
                size_step: 0.00000001,
                price_tick: 0.01,
            },
        );
        table.insert(
            (Venue::B, "BTC/USDT".to_string()),
            VenueRequirements {
                min_size: 0.00001,
                min_notional: 5.0,
                size_step: 0.00000001,
                price_tick: 0.1,
            },
        );
        table.insert(
            (Venue::B, "ETH/USDT".to_string()),
            VenueRequirements {
                min_size: 0.001,
                min_notional: 5.0,
                size_step: 0.0001,
                price_tick: 0.01,
            },
        );
        table.insert(
            (Venue::B, "SOL/USDT".to_string()),
            VenueRequirements {
                min_size: 0.01,
                min_notional: 5.0,
                size_step: 0.01,
                price_tick: 0.001,
            },
        );
        Self { table }
    }

    pub fn insert(&mut self, venue: Venue, symbol: &str, reqs: VenueRequirements) {
        self.table.insert((venue, symbol.to_string()), reqs);
    }

    fn lookup(&self, venue: Venue, symbol: &str) -> Option<&VenueRequirements> {
        self.table.get(&(venue, symbol.to_string()))
    }

    /// `GET minimum-requirements/{venue}/{symbol}`: the validator's own
    /// table, read-only, for the operator API to surface.
    pub fn requirements(&self, venue: Venue, symbol: &str) -> Option<VenueRequirements> {
        self.lookup(venue, symbol).copied()
    }

    pub fn round_size(&self, venue: Venue, symbol: &str, size: f64) -> f64 {
        match self.lookup(venue, symbol) {
            Some(r) if r.size_step > 0.0 => (size / r.size_step).round() * r.size_step,
            _ => size,
        }
    }

    pub fn round_price(&self, venue: Venue, symbol: &str, price: f64) -> f64 {
        match self.lookup(venue, symbol) {
            Some(r) if r.price_tick > 0.0 => (price / r.price_tick).round() * r.price_tick,
            _ => price,
        }
    }

    /// Unknown (venue, symbol) pairs pass permissively — the caller is
    /// expected to log this, the quantizer itself stays silent.
    pub fn validate(
        &self,
        venue: Venue,
        symbol: &str,
        size: f64,
        price: f64,
    ) -> Result<(), ValidationError> {
        let reqs = match self.lookup(venue, symbol) {
            Some(r) => r,
            None => return Ok(()),
        };

        if size < reqs.min_size {
            return Err(ValidationError::BelowMinSize);
        }

        let notional = size * price;
        if notional < reqs.min_notional {
            return Err(ValidationError::BelowMinNotional);
        }

        if reqs.size_step > 0.0 {
            let steps = (size / reqs.size_step).round();
            let expected = steps * reqs.size_step;
            let tolerance = reqs.size_step * STEP_TOLERANCE_FRACTION;
            if (size - expected).abs() > tolerance {
                return Err(ValidationError::BadSizeStep);
            }
        }

        if reqs.price_tick > 0.0 {
            let ticks = (price / reqs.price_tick).round();
            let expected = ticks * reqs.price_tick;
            let tolerance = reqs.price_tick * STEP_TOLERANCE_FRACTION;
            if (price - expected).abs() > tolerance {
                return Err(ValidationError::BadPriceTick);
            }
        }

        Ok(())
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_passes_permissively() {
        let q = Quantizer::new();
        assert!(q.validate(Venue::B, "DOGE/USDT", 1.0, 0.1).is_ok());
    }

    #[test]
    fn below_min_size_rejected() {
        let q = Quantizer::new();
        assert_eq!(
            q.validate(Venue::B, "BTC/USDT", 0.000001, 50000.0),
            Err(ValidationError::BelowMinSize)
        );
    }

    #[test]
    fn below_min_notional_rejected() {
        let q = Quantizer::new();
        assert_eq!(
            q.validate(Venue::B, "BTC/USDT", 0.00001, 1.0),
            Err(ValidationError::BelowMinNotional)
        );
    }

    #[test]
    fn round_trip_idempotent_price() {
        let q = Quantizer::new();
        let p1 = q.round_price(Venue::B, "ETH/USDT", 1234.567);
        let p2 = q.round_price(Venue::B, "ETH/USDT", p1);
        assert_eq!(p1, p2);
    }

    #[test]
    fn round_trip_idempotent_size() {
        let q = Quantizer::new();
        let s1 = q.round_size(Venue::B, "SOL/USDT", 1.2345);
        let s2 = q.round_size(Venue::B, "SOL/USDT", s1);
        assert_eq!(s1, s2);
    }

    #[test]
    fn step_tolerance_accepts_near_multiple() {
        let q = Quantizer::new();
        // ETH/USDT size_step = 0.0001; 0.0010000001 is within 0.1% tolerance.
        assert!(q.validate(Venue::B, "ETH/USDT", 0.0010000001, 10000.0).is_ok());
    }
}
