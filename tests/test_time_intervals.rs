use chrono::{TimeZone, Utc};
use soilwatch::core::composite::{Reducer, TemporalCompositor, TimeIntervalSet};
use soilwatch::types::{Band, CoordinateSystem, GeoTransform, GridSpec, Raster, Scene, SceneCollection, SceneMetadata, TimeInterval};
use ndarray::Array2;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn date(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

#[test]
fn test_sixty_day_intervals_follow_calendar_months() {
    init();
    let set = TimeIntervalSet::from_span(date(2019, 1, 1), date(2020, 1, 1), 60.0).expect("Failed to split year");
    let starts: Vec<_> = set.iter().map(|i| i.start).collect();

    println!("60-day intervals over 2019:");
    for interval in set.iter() {
        println!("  {} -> {}", interval.start, interval.end);
    }

    assert_eq!(
        starts,
        vec![
            date(2019, 1, 1),
            date(2019, 3, 1),
            date(2019, 5, 1),
            date(2019, 7, 1),
            date(2019, 9, 1),
            date(2019, 11, 1)
        ]
    );
    assert_eq!(set.intervals().last().unwrap().end, date(2020, 1, 1));
}

fn duration_ratio(set: &TimeIntervalSet) -> f64 {
    let durations: Vec<f64> = set.iter().map(|i| i.duration_days()).collect();
    let max = durations.iter().cloned().fold(f64::MIN, f64::max);
    let min = durations.iter().cloned().fold(f64::MAX, f64::min);
    max / min
}

#[test]
fn test_interval_count_and_balance() {
    init();
    let start = date(2019, 1, 1);
    let end = date(2020, 1, 1);
    for (target, expected) in [(20.0, 18), (30.0, 12), (45.0, 8), (60.0, 6), (90.0, 4), (120.0, 3)] {
        let set = TimeIntervalSet::from_span(start, end, target).expect("Failed to split year");
        let ratio = duration_ratio(&set);
        println!("target {} days: {} intervals, max/min duration {:.3}", target, set.len(), ratio);
        assert_eq!(set.len(), expected, "count for target {}", target);
        assert!(ratio < 1.5, "unbalanced intervals for target {}: {}", target, ratio);
        assert_eq!(set.intervals()[0].start, start);
        assert_eq!(set.intervals().last().unwrap().end, end);
    }
}

#[test]
fn test_equal_split_when_months_do_not_fit() {
    init();
    let set = TimeIntervalSet::from_span(date(2019, 1, 1), date(2020, 1, 1), 45.0).unwrap();
    for interval in set.iter() {
        assert!((interval.duration_days() - 365.0 / 8.0).abs() < 1e-3);
    }
}

#[test]
fn test_intervals_are_contiguous_and_cover_span() {
    init();
    let start = date(2018, 3, 15);
    let end = date(2020, 8, 2);
    for target in [10.0, 15.0, 30.0, 45.0, 90.0] {
        let set = TimeIntervalSet::from_span(start, end, target).expect("Failed to split span");
        assert!(!set.is_empty());
        assert_eq!(set.intervals()[0].start, start, "target {}", target);
        assert_eq!(set.intervals().last().unwrap().end, end, "target {}", target);
        for pair in set.intervals().windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap for target {}", target);
            assert!(pair[0].start < pair[0].end);
        }
    }
}

#[test]
fn test_short_span_yields_single_interval() {
    init();
    let set = TimeIntervalSet::from_span(date(2019, 6, 1), date(2019, 6, 11), 30.0).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.intervals()[0].duration_days(), 10.0);
}

#[test]
fn test_invalid_spans_rejected() {
    init();
    assert!(TimeIntervalSet::from_span(date(2019, 6, 1), date(2019, 6, 1), 30.0).is_err());
    assert!(TimeIntervalSet::from_span(date(2019, 6, 1), date(2019, 1, 1), 30.0).is_err());
    assert!(TimeIntervalSet::from_span(date(2019, 1, 1), date(2019, 6, 1), 0.0).is_err());

    let gap = vec![
        TimeInterval::new(date(2019, 1, 1), date(2019, 2, 1)).unwrap(),
        TimeInterval::new(date(2019, 2, 2), date(2019, 3, 1)).unwrap(),
    ];
    assert!(TimeIntervalSet::from_intervals(gap).is_err());
}

#[test]
fn test_empty_interval_gives_masked_frame() {
    init();
    let grid = GridSpec::new(2, 2, GeoTransform::north_up(0.0, 0.0, 10.0), CoordinateSystem::Projected { epsg: 32737 });
    let scene = |day: u32, value: f32| {
        let raster = Raster::new(grid.clone())
            .with_band(Band::new("fcover", Array2::from_elem((2, 2), value)))
            .unwrap();
        Scene::new(raster, SceneMetadata::new(format!("S2_{}", day), date(2019, 1, day)))
    };
    let scenes = SceneCollection::new(vec![scene(2, 100.0), scene(5, 300.0), scene(9, 200.0)]);

    let intervals = TimeIntervalSet::from_intervals(vec![
        TimeInterval::new(date(2019, 1, 1), date(2019, 1, 10)).unwrap(),
        TimeInterval::new(date(2019, 1, 10), date(2019, 1, 20)).unwrap(),
    ])
    .unwrap();

    let series = TemporalCompositor::new(grid.clone(), Reducer::Median)
        .composite(&scenes, &["fcover"], &intervals)
        .expect("Failed to composite");

    assert_eq!(series.len(), 2);
    assert_eq!(series.frames[0].scene_count, 3);
    assert_eq!(series.frames[0].raster.band("fcover").unwrap().get(0, 0), Some(200.0));
    assert_eq!(series.frames[0].timestamp, intervals.intervals()[0].midpoint());

    assert_eq!(series.frames[1].scene_count, 0);
    assert_eq!(series.frames[1].raster.band("fcover").unwrap().valid_count(), 0);
}
