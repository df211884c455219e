//! GEOS3 bare-soil detection (Demattê et al. 2020) and bare-soil frequency.

use crate::constants::{geos3 as c, terrain};
use crate::core::spectral::{normalized_difference, reflectance};
use crate::core::tiling::map_pixels;
use crate::types::{check_dim, Band, BandType, ErosionError, ErosionResult, Raster, Scene, SceneCollection, ValidityMask};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Name of the bare-soil flag band
pub const GEOS3_BAND: &str = "GEOS3";

/// Reflectance bands read by the GEOS3 rule
pub const GEOS3_INPUT_BANDS: [&str; 6] = ["B2", "B3", "B4", "B8", "B11", "B12"];

/// GEOS3 thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Geos3Params {
    pub ndvi_range: (f32, f32),
    pub nbr2_range: (f32, f32),
    pub vnsir_max: f32,
    pub sr_band_scale: f32,
    /// Band whose valid pixels count as clear observations
    pub reference_band: String,
}

impl Default for Geos3Params {
    fn default() -> Self {
        Self {
            ndvi_range: c::NDVI_RANGE,
            nbr2_range: c::NBR2_RANGE,
            vnsir_max: c::VNSIR_MAX,
            sr_band_scale: 10_000.0,
            reference_band: "B2".to_string(),
        }
    }
}

/// Bare-soil detector
#[derive(Debug)]
pub struct BareSoilDetector {
    params: Geos3Params,
}

impl BareSoilDetector {
    pub fn new(params: Geos3Params) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(Geos3Params::default())
    }

    /// GEOS3 flag band: 1 for bare soil, 0 otherwise, masked where any index is undefined
    pub fn detect(&self, raster: &Raster) -> ErosionResult<Band> {
        let scale = self.params.sr_band_scale;
        let b2 = reflectance(raster, "B2", scale)?;
        let b3 = reflectance(raster, "B3", scale)?;
        let b4 = reflectance(raster, "B4", scale)?;
        let b8 = reflectance(raster, "B8", scale)?;
        let b11 = reflectance(raster, "B11", scale)?;
        let b12 = reflectance(raster, "B12", scale)?;

        let ndvi = normalized_difference(&b8, &b4, "ndvi")?;
        let nbr2 = normalized_difference(&b11, &b12, "nbr2")?;

        let (ndvi_lo, ndvi_hi) = self.params.ndvi_range;
        let (nbr2_lo, nbr2_hi) = self.params.nbr2_range;
        let vnsir_max = self.params.vnsir_max;

        let flags = map_pixels(raster.dim(), |i, j| {
            let n = ndvi.get(i, j)?;
            let r = nbr2.get(i, j)?;
            let vnsir = 1.0
                - ((2.0 * b4.get(i, j)? - b3.get(i, j)? - b2.get(i, j)?)
                    + 3.0 * (b12.get(i, j)? - b8.get(i, j)?));
            let bare = (ndvi_lo..=ndvi_hi).contains(&n) && (nbr2_lo..=nbr2_hi).contains(&r) && vnsir <= vnsir_max;
            Some(if bare { 1.0 } else { 0.0 })
        });
        Ok(Band::from_options(GEOS3_BAND, &flags).with_type(BandType::UInt8))
    }

    /// Scene with the GEOS3 band appended
    pub fn add_geos3(&self, scene: &Scene) -> ErosionResult<Scene> {
        let flags = self.detect(&scene.raster)?;
        Ok(scene.with_raster(scene.raster.clone().with_band(flags)?))
    }

    /// Scene restricted to its bare-soil pixels
    pub fn bare_soil_scene(&self, scene: &Scene) -> ErosionResult<Scene> {
        let flags = self.detect(&scene.raster)?;
        let bare = Array2::from_shape_fn(flags.dim(), |(i, j)| flags.get(i, j) == Some(1.0));
        Ok(scene.with_raster(scene.raster.update_mask(&bare)?))
    }

    /// Share of clear observations flagged as bare soil.
    ///
    /// Pixels never observed are masked.
    pub fn frequency(&self, scenes: &SceneCollection) -> ErosionResult<Band> {
        let first = scenes
            .first()
            .ok_or_else(|| ErosionError::InvalidInput("Bare soil frequency needs at least one scene".to_string()))?;
        let dim = first.raster.dim();
        log::info!("Computing bare soil frequency over {} scenes", scenes.len());

        let mut bare = Array2::<u32>::zeros(dim);
        let mut observed = Array2::<u32>::zeros(dim);
        for scene in scenes.iter() {
            check_dim(dim, scene.raster.dim())?;
            let reference = scene.raster.band(&self.params.reference_band)?;
            let flags = self.detect(&scene.raster)?;
            for ((i, j), count) in observed.indexed_iter_mut() {
                if reference.is_valid(i, j) {
                    *count += 1;
                    if flags.get(i, j) == Some(1.0) {
                        bare[[i, j]] += 1;
                    }
                }
            }
        }

        let values = Array2::from_shape_fn(dim, |(i, j)| {
            let n = observed[[i, j]];
            if n == 0 {
                None
            } else {
                Some(bare[[i, j]] as f32 / n as f32)
            }
        });
        Ok(Band::from_options("bare_soil_frequency", &values))
    }
}

/// Exclusion layers applied to the bare-soil frequency
#[derive(Debug, Clone, Default)]
pub struct LandMasks {
    /// true = not water
    pub not_water: Option<ValidityMask>,
    /// true = not built-up
    pub not_builtup: Option<ValidityMask>,
}

/// Restrict the frequency to land, non-built-up pixels with slope <= 26.6 degrees
pub fn restrict_frequency(frequency: &Band, masks: &LandMasks, slope_deg: &Band) -> ErosionResult<Band> {
    restrict_frequency_with_slope(frequency, masks, slope_deg, terrain::MAX_BARE_SOIL_SLOPE_DEG)
}

pub fn restrict_frequency_with_slope(
    frequency: &Band,
    masks: &LandMasks,
    slope_deg: &Band,
    max_slope_deg: f32,
) -> ErosionResult<Band> {
    let dim = frequency.dim();
    check_dim(dim, slope_deg.dim())?;
    for mask in [&masks.not_water, &masks.not_builtup].into_iter().flatten() {
        check_dim(dim, mask.dim())?;
    }
    let keep = Array2::from_shape_fn(dim, |(i, j)| {
        masks.not_water.as_ref().map_or(true, |m| m[[i, j]])
            && masks.not_builtup.as_ref().map_or(true, |m| m[[i, j]])
            && slope_deg.get(i, j).map_or(false, |s| s <= max_slope_deg)
    });
    frequency.update_mask(&keep)
}

/// Pixels bare at least once but below the permanently-bare threshold
pub fn restorable_mask(frequency: &Band, permanently_bare: f32) -> ValidityMask {
    Array2::from_shape_fn(frequency.dim(), |(i, j)| {
        frequency.get(i, j).map_or(false, |f| f > 0.0 && f < permanently_bare)
    })
}
