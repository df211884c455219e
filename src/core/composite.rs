//! Regular time intervals and per-interval temporal reduction.
//!
//! A composite series always has one frame per interval. Intervals without
//! scenes produce a fully masked raster so the series keeps a fixed cadence.

use crate::constants::time as c;
use crate::core::tiling::map_pixels;
use crate::types::{
    check_dim, Band, BandType, ErosionError, ErosionResult, GridSpec, Raster, Scene, SceneCollection, TimeInterval,
};
use chrono::{DateTime, Duration, Months, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// `count + 1` boundaries stepping `months / per_month` from `start`, with the
/// last snapped to `end`. `None` when the steps miss `end` by more than half
/// of the shortest interval.
fn calendar_boundaries(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    count: usize,
    months: u32,
    per_month: i64,
) -> ErosionResult<Option<Vec<DateTime<Utc>>>> {
    let mut boundaries = Vec::with_capacity(count + 1);
    boundaries.push(start);
    let mut cursor = start;
    for _ in 0..count {
        let advanced = cursor
            .checked_add_months(Months::new(months))
            .ok_or_else(|| ErosionError::Processing(format!("Cannot advance {} by {} months", cursor, months)))?;
        cursor = cursor + Duration::seconds((advanced - cursor).num_seconds() / per_month);
        boundaries.push(cursor);
    }

    let shortest = boundaries
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds())
        .min()
        .unwrap_or(0);
    let miss = (cursor - end).num_seconds().abs();
    if shortest <= 0 || 2 * miss > shortest {
        return Ok(None);
    }
    if let Some(last) = boundaries.last_mut() {
        *last = end;
    }
    Ok(Some(boundaries))
}

fn equal_boundaries(start: DateTime<Utc>, end: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let total = (end - start).num_seconds();
    (0..=count)
        .map(|k| if k == count { end } else { start + Duration::seconds(total * k as i64 / count as i64) })
        .collect()
}

/// Ordered, contiguous, non-overlapping intervals covering a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIntervalSet {
    intervals: Vec<TimeInterval>,
}

impl TimeIntervalSet {
    /// Split [start, end) into round(days / target) intervals.
    ///
    /// Intervals first try to advance by a whole number of calendar months
    /// divided by the number of intervals per month, so a 60-day target over a
    /// calendar year yields two-month intervals. When that stepping lands more
    /// than half an interval away from `end`, the span is cut into equal
    /// lengths instead.
    pub fn from_span(start: DateTime<Utc>, end: DateTime<Utc>, target_days: f64) -> ErosionResult<Self> {
        if !(target_days > 0.0) {
            return Err(ErosionError::InvalidInput(format!(
                "Target interval length {} days must be positive",
                target_days
            )));
        }
        let span = TimeInterval::new(start, end)?;
        let days = span.duration_days();

        let count = ((days / target_days).round() as usize).max(1);
        let per_month = ((c::AVERAGE_MONTH_DAYS / target_days).round() as i64).max(1);
        let months = (days / (c::AVERAGE_MONTH_DAYS * count as f64)).ceil().max(1.0) as u32;

        let boundaries = match calendar_boundaries(start, end, count, months, per_month)? {
            Some(boundaries) => {
                log::debug!("Splitting {} days into {} intervals of {} month(s) / {}", days, count, months, per_month);
                boundaries
            }
            None => {
                log::debug!("Splitting {} days into {} equal intervals", days, count);
                equal_boundaries(start, end, count)
            }
        };

        let intervals = boundaries
            .windows(2)
            .map(|pair| TimeInterval::new(pair[0], pair[1]))
            .collect::<ErosionResult<Vec<_>>>()?;
        Ok(Self { intervals })
    }

    pub fn from_intervals(intervals: Vec<TimeInterval>) -> ErosionResult<Self> {
        for pair in intervals.windows(2) {
            if pair[0].end != pair[1].start {
                return Err(ErosionError::InvalidInput(format!(
                    "Intervals must be contiguous: {} is followed by {}",
                    pair[0].end, pair[1].start
                )));
            }
        }
        Ok(Self { intervals })
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeInterval> {
        self.intervals.iter()
    }

    pub fn intervals(&self) -> &[TimeInterval] {
        &self.intervals
    }
}

/// Temporal reducer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Median,
    /// Multi-band geometric median (Weiszfeld iterations)
    GeometricMedian,
    Sum,
    Mean,
    Count,
    /// Per pixel, take every band from the scene maximising `band`
    QualityMosaic { band: String },
}

impl Default for Reducer {
    fn default() -> Self {
        Reducer::Median
    }
}

impl Reducer {
    fn output_type(&self, source: BandType) -> BandType {
        match self {
            Reducer::Count => BandType::Int32,
            Reducer::QualityMosaic { .. } => source,
            _ => BandType::Float32,
        }
    }
}

/// One composite, stamped with the midpoint of its interval
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub interval: TimeInterval,
    pub timestamp: DateTime<Utc>,
    pub raster: Raster,
    pub scene_count: usize,
}

/// Composites in interval order
#[derive(Debug, Clone, Default)]
pub struct CompositeSeries {
    pub frames: Vec<CompositeFrame>,
}

impl CompositeSeries {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompositeFrame> {
        self.frames.iter()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    /// The named band of every frame, in order
    pub fn band_series(&self, name: &str) -> ErosionResult<Vec<&Band>> {
        self.frames.iter().map(|f| f.raster.band(name)).collect()
    }
}

/// Reduces scene collections onto a fixed grid
#[derive(Debug, Clone)]
pub struct TemporalCompositor {
    grid: GridSpec,
    reducer: Reducer,
}

impl TemporalCompositor {
    pub fn new(grid: GridSpec, reducer: Reducer) -> Self {
        Self { grid, reducer }
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    /// One composite per interval
    pub fn composite<S: AsRef<str>>(
        &self,
        scenes: &SceneCollection,
        bands: &[S],
        intervals: &TimeIntervalSet,
    ) -> ErosionResult<CompositeSeries> {
        let bands: Vec<String> = bands.iter().map(|b| b.as_ref().to_string()).collect();
        let types = self.output_types(scenes, &bands)?;
        log::info!(
            "Compositing {} scenes into {} intervals with {:?}",
            scenes.len(),
            intervals.len(),
            self.reducer
        );

        let mut frames = Vec::with_capacity(intervals.len());
        for interval in intervals.iter() {
            let members: Vec<&Scene> = scenes.iter().filter(|s| interval.contains(s.acquired())).collect();
            let raster = if members.is_empty() {
                log::warn!("No scenes between {} and {}; emitting masked composite", interval.start, interval.end);
                Raster::fully_masked(self.grid.clone(), &types)
            } else {
                self.reduce_scenes(&members, &bands, &types)?
            };
            frames.push(CompositeFrame {
                interval: *interval,
                timestamp: interval.midpoint(),
                raster,
                scene_count: members.len(),
            });
        }
        Ok(CompositeSeries { frames })
    }

    /// Reduce a whole collection to one raster
    pub fn reduce<S: AsRef<str>>(&self, scenes: &SceneCollection, bands: &[S]) -> ErosionResult<Raster> {
        let bands: Vec<String> = bands.iter().map(|b| b.as_ref().to_string()).collect();
        let types = self.output_types(scenes, &bands)?;
        let members: Vec<&Scene> = scenes.iter().collect();
        if members.is_empty() {
            log::warn!("Reducing an empty collection; emitting masked raster");
            return Ok(Raster::fully_masked(self.grid.clone(), &types));
        }
        self.reduce_scenes(&members, &bands, &types)
    }

    fn output_types(&self, scenes: &SceneCollection, bands: &[String]) -> ErosionResult<Vec<(String, BandType)>> {
        if let Reducer::QualityMosaic { band } = &self.reducer {
            if !bands.contains(band) {
                return Err(ErosionError::MissingBand(format!("Quality band {} is not among the composited bands", band)));
            }
        }
        bands
            .iter()
            .map(|name| {
                let source = match scenes.first() {
                    Some(scene) => scene.raster.band(name)?.band_type,
                    None => BandType::Float32,
                };
                Ok((name.clone(), self.reducer.output_type(source)))
            })
            .collect()
    }

    fn reduce_scenes(&self, scenes: &[&Scene], bands: &[String], types: &[(String, BandType)]) -> ErosionResult<Raster> {
        let dim = self.grid.dim();
        // stack[band][scene]
        let stack = bands
            .iter()
            .map(|name| {
                scenes
                    .iter()
                    .map(|s| {
                        let band = s.raster.band(name)?;
                        check_dim(dim, band.dim())?;
                        Ok(band)
                    })
                    .collect::<ErosionResult<Vec<&Band>>>()
            })
            .collect::<ErosionResult<Vec<_>>>()?;

        let mut raster = Raster::new(self.grid.clone());
        match &self.reducer {
            Reducer::GeometricMedian => {
                let pixels = map_pixels(dim, |i, j| {
                    let samples: Vec<Vec<f64>> = (0..scenes.len())
                        .filter_map(|s| stack.iter().map(|b| b[s].get(i, j).map(f64::from)).collect())
                        .collect();
                    geometric_median(&samples)
                });
                for (k, (name, band_type)) in types.iter().enumerate() {
                    let values = pixels.map(|p| p.as_ref().map(|v| v[k] as f32));
                    raster.add_band(Band::from_options(name.clone(), &values).with_type(*band_type))?;
                }
            }
            Reducer::QualityMosaic { band } => {
                let quality = bands.iter().position(|b| b == band).ok_or_else(|| ErosionError::MissingBand(band.clone()))?;
                let chosen = map_pixels(dim, |i, j| {
                    let mut best: Option<(usize, f32)> = None;
                    for (s, b) in stack[quality].iter().enumerate() {
                        if let Some(v) = b.get(i, j) {
                            if best.map_or(true, |(_, q)| v > q) {
                                best = Some((s, v));
                            }
                        }
                    }
                    best.map(|(s, _)| s)
                });
                for (k, (name, band_type)) in types.iter().enumerate() {
                    let values = Array2::from_shape_fn(dim, |(i, j)| chosen[[i, j]].and_then(|s| stack[k][s].get(i, j)));
                    raster.add_band(Band::from_options(name.clone(), &values).with_type(*band_type))?;
                }
            }
            reducer => {
                for (k, (name, band_type)) in types.iter().enumerate() {
                    let values = map_pixels(dim, |i, j| {
                        let mut samples: Vec<f32> = stack[k].iter().filter_map(|b| b.get(i, j)).collect();
                        reduce_samples(reducer, &mut samples)
                    });
                    raster.add_band(Band::from_options(name.clone(), &values).with_type(*band_type))?;
                }
            }
        }
        Ok(raster)
    }
}

fn reduce_samples(reducer: &Reducer, samples: &mut [f32]) -> Option<f32> {
    match reducer {
        Reducer::Count => Some(samples.len() as f32),
        _ if samples.is_empty() => None,
        Reducer::Sum => Some(samples.iter().map(|&v| v as f64).sum::<f64>() as f32),
        Reducer::Mean => Some((samples.iter().map(|&v| v as f64).sum::<f64>() / samples.len() as f64) as f32),
        _ => median(samples),
    }
}

/// Median; an even count averages the two middle values
pub fn median(samples: &mut [f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let n = samples.len();
    if n % 2 == 1 {
        Some(samples[n / 2])
    } else {
        Some(((samples[n / 2 - 1] as f64 + samples[n / 2] as f64) / 2.0) as f32)
    }
}

/// Weiszfeld geometric median of equal-length vectors
pub fn geometric_median(samples: &[Vec<f64>]) -> Option<Vec<f64>> {
    let first = samples.first()?;
    let dims = first.len();
    let n = samples.len() as f64;

    let mut estimate: Vec<f64> = (0..dims).map(|d| samples.iter().map(|s| s[d]).sum::<f64>() / n).collect();

    for _ in 0..c::GEOMEDIAN_MAX_ITERATIONS {
        let mut numerator = vec![0.0f64; dims];
        let mut denominator = 0.0f64;
        for sample in samples {
            let distance = sample
                .iter()
                .zip(&estimate)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            if distance < 1e-12 {
                // The estimate sits on a sample; Weiszfeld's update is undefined there
                continue;
            }
            for d in 0..dims {
                numerator[d] += sample[d] / distance;
            }
            denominator += 1.0 / distance;
        }
        if denominator == 0.0 {
            break;
        }
        let next: Vec<f64> = numerator.iter().map(|v| v / denominator).collect();
        let shift = next
            .iter()
            .zip(&estimate)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        estimate = next;
        if shift < c::GEOMEDIAN_TOLERANCE {
            break;
        }
    }
    Some(estimate)
}
