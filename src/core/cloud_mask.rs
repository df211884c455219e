//! Cloud and cloud-shadow masking for optical scenes.
//!
//! Clouds come from an external cloud-probability grid. Shadows are dark,
//! non-water pixels that overlap the cloud footprint cast away from the sun.
//! The union is cleaned with a morphological opening on a coarse working grid,
//! buffered, and applied as a validity mask to every reflectance band.

use crate::constants::cloud as c;
use crate::core::focal::{dilate, directional_projection, disk_halo, downsample_any, erode, upsample_nearest};
use crate::core::tiling::TileScheme;
use crate::types::{check_dim, ErosionError, ErosionResult, Scene, SceneCollection, ValidityMask};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Cloud and shadow masking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    /// Cloud probability (0-100) above which a pixel is cloudy
    pub cloud_probability_threshold: f32,
    /// NIR reflectance (0-1) below which a non-water pixel is a shadow candidate
    pub nir_dark_threshold: f32,
    /// Maximum cloud-to-shadow distance, in pixels of the scene grid
    pub shadow_projection_px: usize,
    /// Buffer added around the cleaned cloud/shadow mask (m)
    pub buffer_m: f64,
    /// Resolution of the grid the opening and buffer run on (m)
    pub mask_resolution_m: f64,
    /// Opening radius in coarse pixels
    pub opening_radius_px: f64,
    /// Digital number corresponding to reflectance 1.0
    pub sr_band_scale: f32,
    pub nir_band: String,
    /// Scenes whose metadata cloud cover is at or above this are dropped before masking
    pub max_cloudy_pixel_percentage: f64,
    pub tiles: TileScheme,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            cloud_probability_threshold: c::CLOUD_PROBABILITY_THRESHOLD,
            nir_dark_threshold: c::NIR_DARK_THRESHOLD,
            shadow_projection_px: c::SHADOW_PROJECTION_PX,
            buffer_m: c::BUFFER_M,
            mask_resolution_m: c::MASK_RESOLUTION_M,
            opening_radius_px: c::OPENING_RADIUS_PX,
            sr_band_scale: 10_000.0,
            nir_band: "B8".to_string(),
            max_cloudy_pixel_percentage: c::MAX_CLOUDY_PIXEL_PERCENTAGE,
            tiles: TileScheme::default(),
        }
    }
}

/// Intermediate and final masks for one scene (true = flagged)
#[derive(Debug, Clone)]
pub struct CloudShadowResult {
    pub clouds: Array2<bool>,
    pub dark_pixels: Array2<bool>,
    pub cloud_projection: Array2<bool>,
    pub shadows: Array2<bool>,
    /// Cleaned and buffered cloud/shadow union
    pub cloud_mask: Array2<bool>,
    pub statistics: CloudMaskStats,
}

#[derive(Debug, Clone, Default)]
pub struct CloudMaskStats {
    pub total_pixels: usize,
    pub cloud_pixels: usize,
    pub shadow_pixels: usize,
    pub masked_pixels: usize,
    pub masked_percentage: f64,
}

/// s2cloudless-style cloud and shadow masker
#[derive(Debug)]
pub struct CloudShadowMasker {
    params: CloudMaskParams,
}

impl CloudShadowMasker {
    pub fn new(params: CloudMaskParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(CloudMaskParams::default())
    }

    pub fn params(&self) -> &CloudMaskParams {
        &self.params
    }

    /// Detect clouds and shadows in a scene.
    ///
    /// `not_water` marks land pixels; without it every pixel may be a shadow.
    pub fn detect(&self, scene: &Scene, not_water: Option<&ValidityMask>) -> ErosionResult<CloudShadowResult> {
        let dim = scene.raster.dim();
        let probability = scene.cloud_probability.as_ref().ok_or_else(|| {
            ErosionError::Metadata(format!("Scene {} has no cloud probability grid", scene.metadata.id))
        })?;
        check_dim(dim, probability.dim())?;
        if let Some(mask) = not_water {
            check_dim(dim, mask.dim())?;
        }

        log::debug!("Cloud masking scene {} ({}x{})", scene.metadata.id, dim.0, dim.1);

        let threshold = self.params.cloud_probability_threshold;
        let clouds = probability.mapv(|p| p > threshold);

        let nir = scene.raster.band(&self.params.nir_band)?;
        let dark_limit = self.params.nir_dark_threshold * self.params.sr_band_scale;
        let dark_pixels = Array2::from_shape_fn(dim, |(i, j)| {
            let land = not_water.map_or(true, |m| m[[i, j]]);
            land && nir.get(i, j).map_or(false, |v| v < dark_limit)
        });

        let (cloud_projection, shadows) = match scene.metadata.mean_solar_azimuth {
            Some(solar_azimuth) => {
                let shadow_azimuth = (solar_azimuth + 180.0) % 360.0;
                let distance = self.params.shadow_projection_px;
                let projection = self.params.tiles.map_focal(&clouds, distance, |view| {
                    Ok(directional_projection(view, shadow_azimuth, distance))
                })?;
                let mut shadows = projection.clone();
                Zip::from(&mut shadows).and(&dark_pixels).for_each(|s, &d| *s = *s && d);
                (projection, shadows)
            }
            None => {
                log::warn!("Scene {} has no solar azimuth; skipping shadow detection", scene.metadata.id);
                (Array2::from_elem(dim, false), Array2::from_elem(dim, false))
            }
        };

        let mut union = clouds.clone();
        Zip::from(&mut union).and(&shadows).for_each(|u, &s| *u = *u || s);

        let cloud_mask = self.clean(&union, scene.raster.grid.pixel_size())?;
        let statistics = self.statistics(&clouds, &shadows, &cloud_mask);

        log::debug!(
            "Scene {}: {} cloud, {} shadow, {:.1}% masked",
            scene.metadata.id,
            statistics.cloud_pixels,
            statistics.shadow_pixels,
            statistics.masked_percentage
        );

        Ok(CloudShadowResult {
            clouds,
            dark_pixels,
            cloud_projection,
            shadows,
            cloud_mask,
            statistics,
        })
    }

    /// Mask every band of the scene where `result.cloud_mask` is set
    pub fn apply(&self, scene: &Scene, result: &CloudShadowResult) -> ErosionResult<Scene> {
        let clear = result.cloud_mask.mapv(|m| !m);
        Ok(scene.with_raster(scene.raster.update_mask(&clear)?))
    }

    pub fn mask_scene(&self, scene: &Scene, not_water: Option<&ValidityMask>) -> ErosionResult<Scene> {
        let result = self.detect(scene, not_water)?;
        self.apply(scene, &result)
    }

    /// Drop overly cloudy scenes, then mask the rest
    pub fn mask_collection(&self, scenes: &SceneCollection, not_water: Option<&ValidityMask>) -> ErosionResult<SceneCollection> {
        let kept = scenes.filter_cloudy(self.params.max_cloudy_pixel_percentage);
        log::info!(
            "Cloud masking {} of {} scenes (cloud cover < {}%)",
            kept.len(),
            scenes.len(),
            self.params.max_cloudy_pixel_percentage
        );
        kept.try_map(|scene| self.mask_scene(scene, not_water))
    }

    /// Opening then buffer, both on the coarse working grid
    fn clean(&self, union: &Array2<bool>, pixel_size: f64) -> ErosionResult<Array2<bool>> {
        if pixel_size <= 0.0 {
            return Err(ErosionError::InvalidInput("Pixel size must be positive".to_string()));
        }
        let factor = ((self.params.mask_resolution_m / pixel_size).round() as usize).max(1);
        let coarse = downsample_any(union.view(), factor)?;

        let opening = self.params.opening_radius_px;
        let buffer = 2.0 * self.params.buffer_m / self.params.mask_resolution_m;
        let halo = 2 * disk_halo(opening) + disk_halo(buffer);

        let cleaned = self.params.tiles.map_focal(&coarse, halo, |view| {
            let opened = dilate(erode(view, opening).view(), opening);
            Ok(dilate(opened.view(), buffer))
        })?;

        upsample_nearest(cleaned.view(), factor, union.dim())
    }

    fn statistics(&self, clouds: &Array2<bool>, shadows: &Array2<bool>, cloud_mask: &Array2<bool>) -> CloudMaskStats {
        let count = |a: &Array2<bool>| a.iter().filter(|&&v| v).count();
        let total_pixels = cloud_mask.len();
        let masked_pixels = count(cloud_mask);
        CloudMaskStats {
            total_pixels,
            cloud_pixels: count(clouds),
            shadow_pixels: count(shadows),
            masked_pixels,
            masked_percentage: if total_pixels > 0 {
                100.0 * masked_pixels as f64 / total_pixels as f64
            } else {
                0.0
            },
        }
    }
}
