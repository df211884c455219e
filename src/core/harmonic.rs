//! Per-pixel harmonic regression over a composite series.
//!
//! Regressors are [1, t, cos(2 pi f t), sin(2 pi f t)] for f = 1..H, with t in
//! years since the first frame. The fit is ordinary least squares through the
//! normal equations, solved in f64 per pixel over that pixel's valid samples
//! with an SVD that rejects rank-deficient designs.

use crate::constants::time as c;
use crate::core::composite::{CompositeFrame, CompositeSeries};
use crate::core::tiling::map_pixels;
use crate::types::{Band, BandType, ErosionError, ErosionResult, Raster};
use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

pub const FITTED_BAND: &str = "fitted";
pub const FITTED_PREVIOUS_BAND: &str = "fittedp";
pub const FITTED_NEXT_BAND: &str = "fittedn";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicParams {
    /// Number of harmonic pairs H
    pub harmonics: usize,
    /// Physically valid range of the fitted band
    pub clamp_range: (f32, f32),
    /// Type the fitted values are cast to after clamping
    pub output_type: BandType,
}

impl Default for HarmonicParams {
    fn default() -> Self {
        Self {
            harmonics: c::DEFAULT_HARMONICS,
            clamp_range: (0.0, 10_000.0),
            output_type: BandType::Int16,
        }
    }
}

/// Fitted per-pixel coefficients
#[derive(Debug, Clone)]
pub struct HarmonicModel {
    pub harmonics: usize,
    /// Time origin (first frame timestamp)
    pub t0: DateTime<Utc>,
    /// Coefficients per pixel, `None` where the pixel could not be fitted
    pub coefficients: Array2<Option<Vec<f64>>>,
}

impl HarmonicModel {
    pub fn term_count(&self) -> usize {
        2 + 2 * self.harmonics
    }

    /// Fitted value at `time` for every fitted pixel
    pub fn evaluate_at(&self, time: DateTime<Utc>) -> Array2<Option<f64>> {
        let row = regressors(years_between(self.t0, time), self.harmonics);
        self.coefficients
            .map(|coefs| coefs.as_ref().map(|b| b.iter().zip(&row).map(|(b, x)| b * x).sum::<f64>()))
    }

    pub fn fitted_pixels(&self) -> usize {
        self.coefficients.iter().filter(|c| c.is_some()).count()
    }
}

fn years_between(t0: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    (t - t0).num_seconds() as f64 / 86_400.0 / c::DAYS_PER_YEAR
}

fn regressors(t: f64, harmonics: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + 2 * harmonics);
    row.push(1.0);
    row.push(t);
    for f in 1..=harmonics {
        row.push((2.0 * std::f64::consts::PI * f as f64 * t).cos());
    }
    for f in 1..=harmonics {
        row.push((2.0 * std::f64::consts::PI * f as f64 * t).sin());
    }
    row
}

/// Relative threshold below which a singular value of X'X counts as zero
const RANK_TOLERANCE: f64 = 1e-12;

fn design_matrix(t0: DateTime<Utc>, frames: &[CompositeFrame], harmonics: usize) -> Array2<f64> {
    let mut design = Array2::zeros((frames.len(), 2 + 2 * harmonics));
    for (mut row, frame) in design.rows_mut().into_iter().zip(frames) {
        row.assign(&Array1::from(regressors(years_between(t0, frame.timestamp), harmonics)));
    }
    design
}

/// Least squares through the normal equations; `None` when X'X is rank deficient
fn least_squares(design: ArrayView2<f64>, targets: ArrayView1<f64>) -> Option<Vec<f64>> {
    let xtx = design.t().dot(&design);
    let xty = design.t().dot(&targets);
    solve_normal_equations(&xtx, &xty)
}

pub(crate) fn solve_normal_equations(xtx: &Array2<f64>, xty: &Array1<f64>) -> Option<Vec<f64>> {
    let p = xty.len();
    if xtx.dim() != (p, p) || p == 0 {
        return None;
    }
    let a = DMatrix::from_fn(p, p, |r, k| xtx[[r, k]]);
    let b = DVector::from_iterator(p, xty.iter().copied());
    let scale = a.amax();
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let eps = scale * RANK_TOLERANCE;
    let svd = a.svd(true, true);
    if svd.rank(eps) < p {
        return None;
    }
    svd.solve(&b, eps).ok().map(|x| x.iter().copied().collect())
}

/// Harmonic smoother for one band of a composite series
#[derive(Debug)]
pub struct HarmonicSmoother {
    params: HarmonicParams,
}

impl HarmonicSmoother {
    pub fn new(params: HarmonicParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(HarmonicParams::default())
    }

    /// Fit the per-pixel model.
    ///
    /// Fails when the series cannot determine the model at all; pixels with too
    /// few valid samples are left unfitted.
    pub fn fit(&self, series: &CompositeSeries, band: &str) -> ErosionResult<HarmonicModel> {
        let harmonics = self.params.harmonics;
        if harmonics == 0 {
            return Err(ErosionError::Config("Harmonic order must be at least 1".to_string()));
        }
        let terms = 2 + 2 * harmonics;
        let first = series
            .frames
            .first()
            .ok_or_else(|| ErosionError::UnderdeterminedModel("Empty series".to_string()))?;
        if series.len() < terms {
            return Err(ErosionError::UnderdeterminedModel(format!(
                "{} samples cannot determine {} harmonic terms; reduce the harmonic order or add samples",
                series.len(),
                terms
            )));
        }

        let t0 = first.timestamp;
        let design = design_matrix(t0, &series.frames, harmonics);
        if least_squares(design.view(), Array1::<f64>::zeros(series.len()).view()).is_none() {
            return Err(ErosionError::UnderdeterminedModel(format!(
                "Sample timestamps give collinear regressors for {} harmonics",
                harmonics
            )));
        }

        let bands = series.band_series(band)?;
        let dim = first.raster.dim();
        for b in &bands {
            crate::types::check_dim(dim, b.dim())?;
        }

        log::info!(
            "Fitting {} harmonics to band {} over {} samples ({}x{} pixels)",
            harmonics,
            band,
            series.len(),
            dim.0,
            dim.1
        );

        let coefficients = map_pixels(dim, |i, j| {
            let (samples, targets): (Vec<usize>, Vec<f64>) = bands
                .iter()
                .enumerate()
                .filter_map(|(k, b)| b.get(i, j).map(|v| (k, v as f64)))
                .unzip();
            if samples.len() < terms {
                return None;
            }
            least_squares(design.select(Axis(0), &samples).view(), Array1::from(targets).view())
        });

        let model = HarmonicModel { harmonics, t0, coefficients };
        let unfitted = dim.0 * dim.1 - model.fitted_pixels();
        if unfitted > 0 {
            log::warn!("{} pixels lack enough valid samples for the harmonic fit", unfitted);
        }
        Ok(model)
    }

    /// Gap-free reconstruction with previous/next fitted neighbours.
    ///
    /// Each output frame carries `fitted`, the input band, `fittedp` and
    /// `fittedn`; the neighbour bands are 0 at the series ends.
    pub fn smooth(&self, series: &CompositeSeries, band: &str) -> ErosionResult<CompositeSeries> {
        let model = self.fit(series, band)?;
        let (lo, hi) = self.params.clamp_range;
        let output_type = self.params.output_type;

        let fitted: Vec<Band> = series
            .frames
            .iter()
            .map(|frame| {
                let values = model
                    .evaluate_at(frame.timestamp)
                    .mapv(|v| v.map(|v| output_type.cast(v.clamp(lo as f64, hi as f64))));
                Band::from_options(FITTED_BAND, &values).with_type(output_type)
            })
            .collect();

        let dim = fitted.first().map(|b| b.dim()).unwrap_or((0, 0));
        let zeros = Band::new(FITTED_BAND, Array2::zeros(dim)).with_type(output_type);

        let mut frames = Vec::with_capacity(series.len());
        for (k, frame) in series.frames.iter().enumerate() {
            let previous = if k == 0 { &zeros } else { &fitted[k - 1] };
            let next = fitted.get(k + 1).unwrap_or(&zeros);

            let raster = Raster::new(frame.raster.grid.clone())
                .with_band(fitted[k].clone())?
                .with_band(frame.raster.band(band)?.clone())?
                .with_band(previous.clone().renamed(FITTED_PREVIOUS_BAND))?
                .with_band(next.clone().renamed(FITTED_NEXT_BAND))?;

            frames.push(CompositeFrame {
                interval: frame.interval,
                timestamp: frame.timestamp,
                raster,
                scene_count: frame.scene_count,
            });
        }
        Ok(CompositeSeries { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    #[test]
    fn test_solve_normal_equations() {
        let x = solve_normal_equations(&array![[2.0, 1.0], [1.0, 3.0]], &array![3.0, 5.0]).unwrap();
        approx::assert_relative_eq!(x[0], 0.8, epsilon = 1e-10);
        approx::assert_relative_eq!(x[1], 1.4, epsilon = 1e-10);
    }

    #[test]
    fn test_singular_system() {
        assert!(solve_normal_equations(&array![[1.0, 2.0], [2.0, 4.0]], &array![1.0, 2.0]).is_none());
        assert!(solve_normal_equations(&Array2::zeros((2, 2)), &array![0.0, 0.0]).is_none());
    }

    #[test]
    fn test_least_squares_recovers_line() {
        let design = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let targets = array![2.5, 4.5, 8.5, 10.5];
        let b = least_squares(design.view(), targets.view()).unwrap();
        approx::assert_relative_eq!(b[0], 2.3, epsilon = 1e-9);
        approx::assert_relative_eq!(b[1], 2.8, epsilon = 1e-9);

        let collinear = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        assert!(least_squares(collinear.view(), array![1.0, 2.0, 3.0].view()).is_none());
    }

    #[test]
    fn test_regressor_layout() {
        let row = regressors(0.25, 2);
        assert_eq!(row.len(), 6);
        assert_eq!(row[0], 1.0);
        assert_eq!(row[1], 0.25);
        approx::assert_abs_diff_eq!(row[2], 0.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(row[4], 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(row[3], -1.0, epsilon = 1e-12);
    }
}
