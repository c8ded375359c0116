//! End-to-end runs of the hydrology tools on synthetic DEMs.

use proptest::prelude::*;
use std::collections::HashMap;
use talweg_algorithms::hydrology::{
    fill_sinks, flow_direction, flow_distance, flow_fractions, flow_length, melton_ruggedness,
    FillSinksParams, FlowDistanceParams, FlowLengthParams, FlowRouting, MfdParams,
};
use talweg_core::io::{read_geotiff, write_geotiff};
use talweg_core::raster::{d8, Raster, SortOrder};
use talweg_core::GeoTransform;

/// Valley draining south with a pit pattern on the slopes
fn create_valley(rows: usize, cols: usize) -> Raster<f64> {
    let mut dem = Raster::new(rows, cols);
    dem.set_transform(GeoTransform::new(500_000.0, 4_000_000.0, 10.0, -10.0));
    let mid = cols as f64 / 2.0;
    for row in 0..rows {
        for col in 0..cols {
            let across = (col as f64 - mid).abs() * 2.0;
            let along = (rows - row) as f64;
            let pits = if (row * 5 + col * 3) % 11 == 0 { -3.0 } else { 0.0 };
            dem.set(row, col, 100.0 + across + along + pits).unwrap();
        }
    }
    dem
}

// ---------------------------------------------------------------------------
// Fill, then route
// ---------------------------------------------------------------------------

#[test]
fn filled_dem_drains_everywhere() {
    let dem = create_valley(20, 15);
    let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap().filled;
    let fdir = flow_direction(&filled).unwrap();

    let (rows, cols) = dem.shape();
    for row in 1..rows - 1 {
        for col in 1..cols - 1 {
            assert_ne!(
                fdir.get(row, col).unwrap(),
                d8::NO_FLOW,
                "({row},{col}) still has no outflow after filling"
            );
        }
    }
}

#[test]
fn flow_length_grows_downstream_on_filled_dem() {
    let dem = create_valley(20, 15);
    let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap().filled;
    let fdir = flow_direction(&filled).unwrap();
    let len = flow_length::<f64>(&filled, None, FlowLengthParams::default()).unwrap();

    // A receiver averages `upstream + step` over its donors, so it is at
    // least one cell size long
    let (rows, cols) = dem.shape();
    for row in 0..rows {
        for col in 0..cols {
            if let Some(dir) = d8::decode(fdir.get(row, col).unwrap()) {
                let (nr, nc) = filled.neighbor(row, col, dir).unwrap();
                assert!(len.get(nr, nc).unwrap() >= filled.cell_size() - 1e-9);
            }
        }
    }
}

#[test]
fn melton_area_sums_to_grid_area_at_outlets() {
    let dem = create_valley(12, 9);
    let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap().filled;
    let fdir = flow_direction(&filled).unwrap();
    let mrn = melton_ruggedness(&filled).unwrap();

    // Outlets (cells without a receiver) collect every cell exactly once
    let (rows, cols) = dem.shape();
    let mut outlet_area = 0.0;
    for row in 0..rows {
        for col in 0..cols {
            if fdir.get(row, col).unwrap() == d8::NO_FLOW {
                outlet_area += mrn.area.get(row, col).unwrap();
            }
        }
    }
    let expected = (rows * cols) as f64 * dem.cell_area();
    assert!((outlet_area - expected).abs() < 1e-6, "{outlet_area} vs {expected}");
}

#[test]
fn flow_distance_to_valley_floor() {
    let dem = create_valley(16, 11);
    let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap().filled;

    // The lowest row is the channel
    let (rows, cols) = dem.shape();
    let mut channels = Raster::filled(rows, cols, f64::NAN);
    for col in 0..cols {
        channels.set(rows - 1, col, 1.0).unwrap();
    }

    for routing in [FlowRouting::D8, FlowRouting::mfd()] {
        let params = FlowDistanceParams {
            routing,
            ..Default::default()
        };
        let out = flow_distance(&filled, &channels, params).unwrap();
        for row in 0..rows {
            for col in 0..cols {
                let d = out.distance.get(row, col).unwrap();
                if d.is_nan() {
                    continue;
                }
                let h = out.horizontal.get(row, col).unwrap();
                let v = out.vertical.get(row, col).unwrap();
                assert!(d + 1e-9 >= h && d + 1e-9 >= v.abs(), "({row},{col})");
            }
        }
        assert_eq!(out.distance.get(rows - 1, 0).unwrap(), 0.0);
    }
}

// ---------------------------------------------------------------------------
// GeoTIFF roundtrip of a tool output
// ---------------------------------------------------------------------------

#[test]
fn flow_length_survives_geotiff_roundtrip() {
    let dem = create_valley(10, 8);
    let len = flow_length::<f64>(&dem, None, FlowLengthParams::default()).unwrap();

    let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
    write_geotiff(&len, tmp.path()).unwrap();
    let back: Raster<f64> = read_geotiff(tmp.path()).unwrap();

    assert_eq!(back.shape(), len.shape());
    assert_eq!(back.transform(), len.transform());
    for ((row, col), v) in len.data().indexed_iter() {
        let w = back.get(row, col).unwrap();
        assert!((v - w).abs() < 1e-3, "({row},{col}): {v} vs {w}");
    }
}

// ---------------------------------------------------------------------------
// Traversal order
// ---------------------------------------------------------------------------

fn arb_dem() -> impl Strategy<Value = Raster<f64>> {
    (2usize..10, 2usize..10).prop_flat_map(|(rows, cols)| {
        proptest::collection::vec(prop_oneof![9 => 0.0f64..50.0, 1 => Just(f64::NAN)], rows * cols)
            .prop_map(move |v| Raster::from_vec(v, rows, cols).unwrap())
    })
}

proptest! {
    #[test]
    fn upstream_cells_are_visited_before_their_receiver(dem in arb_dem()) {
        let Ok(index) = dem.sorted_index(SortOrder::Descending) else {
            // all no-data
            return Ok(());
        };
        let position: HashMap<(usize, usize), usize> =
            index.iter().enumerate().map(|(n, cell)| (cell, n)).collect();
        let fdir = flow_direction(&dem).unwrap();

        for (&(row, col), &n) in &position {
            if let Some(dir) = d8::decode(fdir.get(row, col).unwrap()) {
                let receiver = dem.neighbor(row, col, dir).unwrap();
                prop_assert!(n < position[&receiver]);
            }
        }
    }

    #[test]
    fn mfd_donors_are_visited_before_every_receiver(dem in arb_dem()) {
        let Ok(index) = dem.sorted_index(SortOrder::Descending) else {
            return Ok(());
        };
        let position: HashMap<(usize, usize), usize> =
            index.iter().enumerate().map(|(n, cell)| (cell, n)).collect();
        let fractions = flow_fractions(&dem, MfdParams::default()).unwrap();

        for (&(row, col), &n) in &position {
            for dir in 0..d8::COUNT {
                if fractions.fraction(row, col, dir) > 0.0 {
                    let receiver = dem.neighbor(row, col, dir).unwrap();
                    prop_assert!(n < position[&receiver]);
                }
            }
        }
    }
}
