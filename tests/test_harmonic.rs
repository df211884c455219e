use approx::assert_abs_diff_eq;
use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array2;
use soilwatch::core::composite::{CompositeFrame, CompositeSeries, TimeIntervalSet};
use soilwatch::core::harmonic::{HarmonicParams, HarmonicSmoother, FITTED_BAND, FITTED_NEXT_BAND, FITTED_PREVIOUS_BAND};
use soilwatch::types::{Band, BandType, CoordinateSystem, ErosionError, GeoTransform, GridSpec, Raster};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn grid() -> GridSpec {
    GridSpec::new(2, 2, GeoTransform::north_up(500_000.0, 9_000_000.0, 10.0), CoordinateSystem::Projected { epsg: 32737 })
}

fn seasonal(t0: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    let years = (t - t0).num_seconds() as f64 / 86_400.0 / 365.25;
    let w = 2.0 * std::f64::consts::PI * years;
    5000.0 + 300.0 * years + 2000.0 * w.cos() + 1000.0 * (2.0 * w).sin()
}

/// Monthly FCover composites over two years; `valid(k, i, j)` masks samples
fn series<F: Fn(usize, usize, usize) -> bool>(valid: F) -> CompositeSeries {
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let intervals = TimeIntervalSet::from_span(start, end, 30.0).expect("Failed to build intervals");
    let t0 = intervals.intervals()[0].midpoint();

    let frames = intervals
        .iter()
        .enumerate()
        .map(|(k, interval)| {
            let timestamp = interval.midpoint();
            let value = seasonal(t0, timestamp) as f32;
            let values = Array2::from_shape_fn((2, 2), |(i, j)| if valid(k, i, j) { Some(value) } else { None });
            let raster = Raster::new(grid()).with_band(Band::from_options("fcover", &values)).unwrap();
            CompositeFrame { interval: *interval, timestamp, raster, scene_count: 1 }
        })
        .collect();
    CompositeSeries { frames }
}

fn float_params(harmonics: usize) -> HarmonicParams {
    HarmonicParams { harmonics, clamp_range: (0.0, 10_000.0), output_type: BandType::Float32 }
}

#[test]
fn test_exact_reconstruction_of_harmonic_signal() {
    init();
    let input = series(|_, _, _| true);
    assert_eq!(input.len(), 24);

    let smoothed = HarmonicSmoother::new(float_params(2)).smooth(&input, "fcover").expect("Failed to smooth");
    assert_eq!(smoothed.len(), input.len());

    let t0 = input.frames[0].timestamp;
    for frame in &smoothed.frames {
        let fitted = frame.raster.band(FITTED_BAND).unwrap();
        assert_eq!(fitted.band_type, BandType::Float32);
        let expected = seasonal(t0, frame.timestamp);
        assert_abs_diff_eq!(fitted.get(1, 1).unwrap() as f64, expected, epsilon = 0.1);
        assert!(frame.raster.has_band("fcover"));
    }
}

#[test]
fn test_default_output_is_clamped_int16() {
    init();
    let input = series(|_, _, _| true);
    let smoothed = HarmonicSmoother::standard().smooth(&input, "fcover").expect("Failed to smooth");
    for frame in &smoothed.frames {
        let fitted = frame.raster.band(FITTED_BAND).unwrap();
        assert_eq!(fitted.band_type, BandType::Int16);
        let v = fitted.get(0, 0).unwrap();
        assert_eq!(v.fract(), 0.0);
        assert!((0.0..=10_000.0).contains(&v));
    }
}

#[test]
fn test_gaps_are_filled() {
    init();
    let input = series(|k, i, j| !(k % 5 == 2 && i == 0 && j == 0));
    let smoothed = HarmonicSmoother::new(float_params(2)).smooth(&input, "fcover").unwrap();

    let t0 = input.frames[0].timestamp;
    let gap = &smoothed.frames[7];
    assert!(!gap.raster.band("fcover").unwrap().is_valid(0, 0));
    let filled = gap.raster.band(FITTED_BAND).unwrap().get(0, 0).expect("Gap was not filled");
    assert_abs_diff_eq!(filled as f64, seasonal(t0, gap.timestamp), epsilon = 0.1);
}

#[test]
fn test_pixel_with_too_few_samples_is_masked() {
    init();
    let input = series(|k, i, j| !(i == 1 && j == 0) || k < 3);
    let smoothed = HarmonicSmoother::new(float_params(2)).smooth(&input, "fcover").unwrap();
    for frame in &smoothed.frames {
        let fitted = frame.raster.band(FITTED_BAND).unwrap();
        assert!(!fitted.is_valid(1, 0));
        assert!(fitted.is_valid(0, 1));
    }
}

#[test]
fn test_neighbour_bands_chain_fitted_values() {
    init();
    let input = series(|_, _, _| true);
    let smoothed = HarmonicSmoother::new(float_params(2)).smooth(&input, "fcover").unwrap();
    let n = smoothed.len();

    let first = &smoothed.frames[0].raster;
    assert_eq!(first.band(FITTED_PREVIOUS_BAND).unwrap().get(0, 0), Some(0.0));
    let last = &smoothed.frames[n - 1].raster;
    assert_eq!(last.band(FITTED_NEXT_BAND).unwrap().get(0, 0), Some(0.0));

    for k in 1..n - 1 {
        let here = &smoothed.frames[k].raster;
        let previous = smoothed.frames[k - 1].raster.band(FITTED_BAND).unwrap().get(0, 0);
        let next = smoothed.frames[k + 1].raster.band(FITTED_BAND).unwrap().get(0, 0);
        assert_eq!(here.band(FITTED_PREVIOUS_BAND).unwrap().get(0, 0), previous);
        assert_eq!(here.band(FITTED_NEXT_BAND).unwrap().get(0, 0), next);
    }
}

#[test]
fn test_underdetermined_series_is_an_error() {
    init();
    let mut input = series(|_, _, _| true);
    input.frames.truncate(5);
    let result = HarmonicSmoother::new(float_params(2)).fit(&input, "fcover");
    assert!(matches!(result, Err(ErosionError::UnderdeterminedModel(_))));

    let empty = CompositeSeries::default();
    assert!(matches!(
        HarmonicSmoother::standard().fit(&empty, "fcover"),
        Err(ErosionError::UnderdeterminedModel(_))
    ));
}

#[test]
fn test_missing_band_is_reported() {
    init();
    let input = series(|_, _, _| true);
    assert!(matches!(
        HarmonicSmoother::new(float_params(2)).fit(&input, "ndvi"),
        Err(ErosionError::MissingBand(_))
    ));
}
