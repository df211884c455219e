//! Sustainability factor S = 1 / (L * V).
//!
//! L is a landscape structure term from Sobel edges of a NIR median composite,
//! V a vegetation term from the time integral of fitted FCover, modulated by
//! bare-soil frequency as a land-use proxy.

use crate::constants::sustainability as c;
use crate::core::focal::sobel_magnitude;
use crate::core::tiling::{map_pixels, TileScheme};
use crate::types::{check_dim, Band, ErosionError, ErosionResult};
use serde::{Deserialize, Serialize};

pub const SUSTAINABILITY_BAND: &str = "sustainability_factor";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SustainabilityParams {
    pub land_use_scale: f32,
    pub land_use_range: (f32, f32),
    /// S at or above this is masked
    pub max_restorable_s: f32,
    /// Bare-soil frequency at or above this is masked
    pub permanent_bare_frequency: f32,
    /// Digital number corresponding to reflectance (and FCover) 1.0
    pub sr_band_scale: f32,
    pub tiles: TileScheme,
}

impl Default for SustainabilityParams {
    fn default() -> Self {
        Self {
            land_use_scale: c::LAND_USE_SCALE,
            land_use_range: c::LAND_USE_RANGE,
            max_restorable_s: c::MAX_RESTORABLE_S,
            permanent_bare_frequency: c::PERMANENT_BARE_FREQUENCY,
            sr_band_scale: 10_000.0,
            tiles: TileScheme::default(),
        }
    }
}

/// Mean of pairwise averages of consecutive samples (absolute value)
pub fn trapezoidal_mean(samples: &[f32]) -> Option<f32> {
    if samples.len() < 2 {
        return None;
    }
    let sum: f64 = samples.windows(2).map(|w| (w[0] as f64 + w[1] as f64) / 2.0).sum();
    Some((sum / (samples.len() - 1) as f64).abs() as f32)
}

#[derive(Debug)]
pub struct SustainabilityFactorModel {
    params: SustainabilityParams,
}

impl SustainabilityFactorModel {
    pub fn new(params: SustainabilityParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(SustainabilityParams::default())
    }

    /// Landscape factor 1 + sqrt((|Sx| + |Sy|) / scale)
    pub fn landscape_factor(&self, nir: &Band) -> ErosionResult<Band> {
        let scale = self.params.sr_band_scale;
        let validity = nir.validity();
        let values = ndarray::Array2::from_shape_fn(nir.dim(), |(i, j)| {
            if validity[[i, j]] {
                nir.data[[i, j]]
            } else {
                f32::NAN
            }
        });
        let edges = self.params.tiles.map_focal(&values, 1, |view| {
            let valid = view.mapv(|v| v.is_finite());
            Ok(sobel_magnitude(view, valid.view()))
        })?;
        let landscape = edges.mapv(|e| e.map(|e| 1.0 + (e / scale).sqrt()));
        Ok(Band::from_options("landscape_factor", &landscape))
    }

    /// Vegetation factor exp(clamp(scale * (1 - bsf), lo, hi) * integral(fcover) / sr_scale)
    pub fn vegetation_factor(&self, bare_soil_frequency: &Band, fitted_fcover: &[&Band]) -> ErosionResult<Band> {
        let dim = bare_soil_frequency.dim();
        for band in fitted_fcover {
            check_dim(dim, band.dim())?;
        }
        let (lo, hi) = self.params.land_use_range;
        let land_use_scale = self.params.land_use_scale;
        let sr_scale = self.params.sr_band_scale;

        let values = map_pixels(dim, |i, j| {
            let bsf = bare_soil_frequency.get(i, j)?;
            let samples: Vec<f32> = fitted_fcover.iter().filter_map(|b| b.get(i, j)).collect();
            let integral = trapezoidal_mean(&samples)?;
            let land_use = (land_use_scale * (1.0 - bsf)).clamp(lo, hi);
            Some((land_use * integral / sr_scale).exp())
        });
        Ok(Band::from_options("vegetation_factor", &values))
    }

    /// S, masked where S >= max_restorable_s or the pixel was never or permanently bare
    pub fn compute(&self, nir_median: &Band, bare_soil_frequency: &Band, fitted_fcover: &[&Band]) -> ErosionResult<Band> {
        let dim = nir_median.dim();
        check_dim(dim, bare_soil_frequency.dim())?;
        if fitted_fcover.len() < 2 {
            return Err(ErosionError::InvalidInput(format!(
                "Vegetation integral needs at least 2 fitted samples, got {}",
                fitted_fcover.len()
            )));
        }
        log::info!("Computing sustainability factor over {} fitted samples", fitted_fcover.len());

        let landscape = self.landscape_factor(nir_median)?;
        let vegetation = self.vegetation_factor(bare_soil_frequency, fitted_fcover)?;
        let max_s = self.params.max_restorable_s;
        let permanent = self.params.permanent_bare_frequency;

        let values = map_pixels(dim, |i, j| {
            let bsf = bare_soil_frequency.get(i, j)?;
            if bsf <= 0.0 || bsf >= permanent {
                return None;
            }
            let s = 1.0 / (landscape.get(i, j)? * vegetation.get(i, j)?);
            if s < max_s {
                Some(s)
            } else {
                None
            }
        });
        let band = Band::from_options(SUSTAINABILITY_BAND, &values);
        log::debug!("Sustainability factor defined on {} pixels", band.valid_count());
        Ok(band)
    }
}
