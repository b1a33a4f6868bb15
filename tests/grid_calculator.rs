use grid_recon_engine::grid::{
    build_zone_map, compute_levels, determine_side, mid_tolerance, snap_to_level, Side, Spacing,
};
use grid_recon_engine::config::ZoneDef;

#[test]
fn fixed_grid_spans_bounds_with_equal_steps() {
    let levels = compute_levels(60_000.0, 65_000.0, 11, Spacing::Arithmetic).unwrap();
    assert_eq!(levels.len(), 11);
    assert_eq!(levels[0], 60_000.0);
    assert_eq!(levels[10], 65_000.0);

    let step = (65_000.0 - 60_000.0) / 10.0;
    for (i, level) in levels.iter().enumerate() {
        let expected = 60_000.0 + i as f64 * step;
        assert!((level - expected).abs() < 0.01);
    }
}

#[test]
fn percent_grid_is_geometric() {
    let levels = compute_levels(60_000.0, 65_000.0, 11, Spacing::Geometric).unwrap();
    assert_eq!(levels.len(), 11);
    assert!((levels[0] - 60_000.0).abs() < 0.01);
    assert!((levels[10] - 65_000.0).abs() < 0.01);

    let ratio = (65_000.0_f64 / 60_000.0).powf(1.0 / 10.0);
    for (i, level) in levels.iter().enumerate() {
        let expected = 60_000.0 * ratio.powi(i as i32);
        assert!((level - expected).abs() < 1.0);
    }
}

#[test]
fn rejects_upper_not_greater_than_lower() {
    let err = compute_levels(65_000.0, 60_000.0, 11, Spacing::Arithmetic);
    assert!(err.is_err());
}

#[test]
fn rejects_fewer_than_two_levels() {
    let err = compute_levels(60_000.0, 65_000.0, 1, Spacing::Arithmetic);
    assert!(err.is_err());
}

#[test]
fn side_determination_below_at_above_mid() {
    let mid = 62_500.0;
    let tol = mid_tolerance(mid);
    assert_eq!(determine_side(62_000.0, mid, tol), Side::Buy);
    assert_eq!(determine_side(63_000.0, mid, tol), Side::Sell);
    assert_eq!(determine_side(mid, mid, tol), Side::Skip);
}

#[test]
fn zone_mapping_assigns_ids_and_enabled_flags() {
    let zones = vec![
        ZoneDef {
            id: 1,
            start_idx: 0,
            end_idx: 2,
            enabled: true,
        },
        ZoneDef {
            id: 2,
            start_idx: 3,
            end_idx: 4,
            enabled: false,
        },
    ];
    let zone_map = build_zone_map(5, &zones).unwrap();
    assert_eq!(zone_map[0].zone_id, 1);
    assert!(zone_map[0].enabled);
    assert_eq!(zone_map[3].zone_id, 2);
    assert!(!zone_map[3].enabled);
}

#[test]
fn edge_case_minimum_levels_and_large_levels() {
    let minimal = compute_levels(60_000.0, 65_000.0, 2, Spacing::Arithmetic).unwrap();
    assert_eq!(minimal, vec![60_000.0, 65_000.0]);

    let many = compute_levels(50_000.0, 70_000.0, 101, Spacing::Arithmetic).unwrap();
    assert_eq!(many.len(), 101);
    assert_eq!(many[0], 50_000.0);
    assert_eq!(many[100], 70_000.0);
}

#[test]
fn snap_to_level_picks_nearest_with_low_tie_break() {
    let levels = vec![100.0, 110.0, 120.0, 130.0];
    assert_eq!(snap_to_level(105.0, &levels), 0); // exact tie 100/110 -> lower index
    assert_eq!(snap_to_level(115.0, &levels), 1); // exact tie 110/120 -> lower index
    assert_eq!(snap_to_level(129.9, &levels), 3);
}
