//! Grid Geometry. Pure functions only — no I/O, no shared state.
//! `compute_levels` and `determine_side` are the two functions every other
//! module composes.

use serde::{Deserialize, Serialize};

use crate::config::ZoneDef;
use crate::error::{GridError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spacing {
    Arithmetic,
    Geometric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneEntry {
    pub zone_id: u32,
    pub enabled: bool,
}

/// `levels[i] = lower + i*(upper-lower)/(n-1)` for arithmetic spacing,
/// `levels[i] = lower * r^i` with `r = (upper/lower)^(1/(n-1))` for
/// geometric. `levels[0] == lower`, `levels[n-1] == upper`, strictly
/// increasing.
pub fn compute_levels(lower: f64, upper: f64, n: usize, spacing: Spacing) -> Result<Vec<f64>> {
    if n < 2 {
        return Err(GridError::InvalidGrid("n_levels must be >= 2".into()));
    }
    if upper <= lower {
        return Err(GridError::InvalidGrid("upper must be > lower".into()));
    }

    let levels = match spacing {
        Spacing::Arithmetic => {
            let step = (upper - lower) / (n - 1) as f64;
            (0..n).map(|i| lower + i as f64 * step).collect::<Vec<_>>()
        }
        Spacing::Geometric => {
            let r = (upper / lower).powf(1.0 / (n - 1) as f64);
            (0..n).map(|i| lower * r.powi(i as i32)).collect::<Vec<_>>()
        }
    };

    let mut levels = levels;
    // Snap the endpoints exactly; floating-point powf/step arithmetic can
    // drift by a ULP or two otherwise, violating levels[0]==lower.
    levels[0] = lower;
    *levels.last_mut().unwrap() = upper;

    Ok(levels)
}

/// `skip` iff `|price - mid| <= tol`. Tolerance is an absolute price
/// distance, scaled by mid ("1e-5 * price units").
pub fn determine_side(price: f64, mid: f64, tol: f64) -> Side {
    if (price - mid).abs() <= tol {
        Side::Skip
    } else if price < mid {
        Side::Buy
    } else {
        Side::Sell
    }
}

pub const DEFAULT_MID_TOLERANCE_FACTOR: f64 = 1e-5;

pub fn mid_tolerance(mid: f64) -> f64 {
    mid * DEFAULT_MID_TOLERANCE_FACTOR
}

/// Fills default (zone_id=0, enabled=true) for levels not covered by any
/// explicit zone. Zones must not overlap and must each lie within
/// `[0, n_levels-1]`; this is already enforced by `GridConfig::validate`,
/// but `build_zone_map` re-checks overlap since it's the thing that would
/// actually misbehave (silently let one zone's enabled flag win) if two
/// zones covered the same level.
pub fn build_zone_map(n_levels: usize, zones: &[ZoneDef]) -> Result<Vec<ZoneEntry>> {
    let mut map = vec![
        ZoneEntry {
            zone_id: 0,
            enabled: true,
        };
        n_levels
    ];
    let mut covered = vec![false; n_levels];

    for z in zones {
        for idx in z.start_idx..=z.end_idx {
            if idx >= n_levels {
                return Err(GridError::InvalidGrid("zone range exceeds n_levels".into()));
            }
            if covered[idx] {
                return Err(GridError::InvalidGrid(format!(
                    "level {} covered by more than one zone",
                    idx
                )));
            }
            covered[idx] = true;
            map[idx] = ZoneEntry {
                zone_id: z.id,
                enabled: z.enabled,
            };
        }
    }

    Ok(map)
}

/// Snap-to-level: nearest grid level by absolute price distance, ties
/// broken by lower index.
pub fn snap_to_level(price: f64, levels: &[f64]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &level_price) in levels.iter().enumerate() {
        let dist = (price - level_price).abs();
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_arithmetic_5_level() {
        let levels = compute_levels(100.0, 200.0, 5, Spacing::Arithmetic).unwrap();
        assert_eq!(levels, vec![100.0, 125.0, 150.0, 175.0, 200.0]);

        let mid = 150.0;
        let tol = mid_tolerance(mid);
        let sides: Vec<Side> = levels.iter().map(|&p| determine_side(p, mid, tol)).collect();
        assert_eq!(
            sides,
            vec![Side::Buy, Side::Buy, Side::Skip, Side::Sell, Side::Sell]
        );
    }

    #[test]
    fn s2_geometric_4_level() {
        let levels = compute_levels(100.0, 800.0, 4, Spacing::Geometric).unwrap();
        assert_eq!(levels[0], 100.0);
        assert_eq!(levels[3], 800.0);
        assert!((levels[1] - 200.0).abs() < 1e-6);
        assert!((levels[2] - 400.0).abs() < 1e-6);
    }

    #[test]
    fn geometric_ratios_are_equal() {
        let levels = compute_levels(100.0, 800.0, 4, Spacing::Geometric).unwrap();
        let r1 = levels[1] / levels[0];
        let r2 = levels[2] / levels[1];
        let r3 = levels[3] / levels[2];
        assert!((r1 - r2).abs() < 1e-8);
        assert!((r2 - r3).abs() < 1e-8);
    }

    #[test]
    fn arithmetic_diffs_are_equal() {
        let levels = compute_levels(10.0, 110.0, 11, Spacing::Arithmetic).unwrap();
        let diffs: Vec<f64> = levels.windows(2).map(|w| w[1] - w[0]).collect();
        for d in &diffs {
            assert!((d - diffs[0]).abs() < 1e-8);
        }
    }

    #[test]
    fn rejects_bad_bounds() {
        assert!(compute_levels(200.0, 100.0, 5, Spacing::Arithmetic).is_err());
        assert!(compute_levels(100.0, 200.0, 1, Spacing::Arithmetic).is_err());
    }

    #[test]
    fn zone_map_defaults_and_overrides() {
        let zones = vec![ZoneDef {
            id: 1,
            start_idx: 2,
            end_idx: 3,
            enabled: false,
        }];
        let map = build_zone_map(5, &zones).unwrap();
        assert_eq!(map[0], ZoneEntry { zone_id: 0, enabled: true });
        assert_eq!(map[2], ZoneEntry { zone_id: 1, enabled: false });
        assert_eq!(map[3], ZoneEntry { zone_id: 1, enabled: false });
        assert_eq!(map[4], ZoneEntry { zone_id: 0, enabled: true });
    }

    #[test]
    fn zone_map_rejects_overlap() {
        let zones = vec![
            ZoneDef { id: 1, start_idx: 0, end_idx: 2, enabled: true },
            ZoneDef { id: 2, start_idx: 2, end_idx: 3, enabled: false },
        ];
        assert!(build_zone_map(5, &zones).is_err());
    }

    #[test]
    fn snap_to_level_picks_nearest_ties_low() {
        let levels = vec![100.0, 125.0, 150.0, 175.0, 200.0];
        assert_eq!(snap_to_level(124.0, &levels), 1);
        assert_eq!(snap_to_level(137.5, &levels), 1); // tie -> lower index
        assert_eq!(snap_to_level(138.0, &levels), 2);
    }
}
