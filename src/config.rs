use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::grid::{build_zone_map, compute_levels, Spacing, ZoneEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Live,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDef {
    pub id: u32,
    pub start_idx: usize,
    pub end_idx: usize,
    pub enabled: bool,
}

/// Grid trading configuration. Immutable once accepted by the orchestrator;
/// a new GridConfig replaces the old one wholesale rather than being
/// mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub lower: f64,
    pub upper: f64,
    pub n_levels: usize,
    pub spacing: Spacing,
    pub size_per_level: f64,
    pub zones: Vec<ZoneDef>,
    pub mode: Mode,
    pub venue: Venue,
    pub symbol: String,

    #[serde(skip)]
    levels: Vec<f64>,
    #[serde(skip)]
    zone_of: Vec<ZoneEntry>,
}

impl GridConfig {
    pub fn new(
        lower: f64,
        upper: f64,
        n_levels: usize,
        spacing: Spacing,
        size_per_level: f64,
        zones: Vec<ZoneDef>,
        mode: Mode,
        venue: Venue,
        symbol: String,
    ) -> Result<Self> {
        let mut cfg = Self {
            lower,
            upper,
            n_levels,
            spacing,
            size_per_level,
            zones,
            mode,
            venue,
            symbol,
            levels: Vec::new(),
            zone_of: Vec::new(),
        };
        cfg.validate()?;
        cfg.levels = compute_levels(cfg.lower, cfg.upper, cfg.n_levels, cfg.spacing)?;
        cfg.zone_of = build_zone_map(cfg.n_levels, &cfg.zones)?;
        Ok(cfg)
    }

    /// Re-derives the cached level prices and zone map after deserializing
    /// from JSON (where they are not stored, since they're pure functions
    /// of the rest of the config).
    pub fn finalize(&mut self) -> Result<()> {
        self.validate()?;
        self.levels = compute_levels(self.lower, self.upper, self.n_levels, self.spacing)?;
        self.zone_of = build_zone_map(self.n_levels, &self.zones)?;
        Ok(())
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn zone_of(&self, level: usize) -> Option<ZoneEntry> {
        self.zone_of.get(level).copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.upper <= self.lower {
            return Err(GridError::InvalidGrid(
                "upper_bound must be > lower_bound".into(),
            ));
        }
        if self.lower <= 0.0 {
            return Err(GridError::InvalidGrid("lower_bound must be positive".into()));
        }
        if self.n_levels < 2 {
            return Err(GridError::InvalidGrid(
                "total_levels must be >= 2".into(),
            ));
        }
        if self.size_per_level <= 0.0 {
            return Err(GridError::InvalidGrid("size_per_level must be > 0".into()));
        }
        // Spacing too tight to be meaningful between adjacent levels.
        let spacing_value = (self.upper - self.lower) / self.n_levels as f64;
        if spacing_value < 0.0001 {
            return Err(GridError::InvalidGrid("grid spacing too small".into()));
        }
        for z in &self.zones {
            if z.end_idx < z.start_idx {
                return Err(GridError::InvalidGrid(
                    "zone end_idx must be >= start_idx".into(),
                ));
            }
            if z.end_idx >= self.n_levels {
                return Err(GridError::InvalidGrid(
                    "zone range exceeds n_levels".into(),
                ));
            }
        }
        Ok(())
    }

    /// Which config changes require a restart rather than hot-apply next
    /// tick, per the Orchestrator's rules (component G).
    pub fn requires_restart(&self, other: &GridConfig) -> bool {
        self.lower != other.lower
            || self.upper != other.upper
            || self.n_levels != other.n_levels
            || self.venue != other.venue
            || self.mode != other.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(lower: f64, upper: f64, n: usize, spacing: Spacing) -> Result<GridConfig> {
        GridConfig::new(
            lower,
            upper,
            n,
            spacing,
            0.01,
            vec![],
            Mode::Simulated,
            Venue::B,
            "BTC/USDT".to_string(),
        )
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(cfg(200.0, 100.0, 5, Spacing::Arithmetic).is_err());
    }

    #[test]
    fn rejects_too_few_levels() {
        assert!(cfg(100.0, 200.0, 1, Spacing::Arithmetic).is_err());
    }

    #[test]
    fn rejects_spacing_too_small() {
        assert!(cfg(100.0, 100.00005, 2, Spacing::Arithmetic).is_err());
    }

    #[test]
    fn accepts_sane_arithmetic_config() {
        let c = cfg(100.0, 200.0, 5, Spacing::Arithmetic).unwrap();
        assert_eq!(c.levels(), &[100.0, 125.0, 150.0, 175.0, 200.0]);
    }

    #[test]
    fn restart_required_on_bounds_change() {
        let a = cfg(100.0, 200.0, 5, Spacing::Arithmetic).unwrap();
        let mut b = a.clone();
        b.upper = 300.0;
        assert!(a.requires_restart(&b));
    }

    #[test]
    fn hot_apply_on_zone_only_change() {
        let a = cfg(100.0, 200.0, 5, Spacing::Arithmetic).unwrap();
        let mut b = a.clone();
        b.zones = vec![ZoneDef {
            id: 1,
            start_idx: 0,
            end_idx: 1,
            enabled: false,
        }];
        assert!(!a.requires_restart(&b));
    }
}
