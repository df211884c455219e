//! End-to-end soil erosion hazard pipeline.
//!
//! Scenes are cloud masked, enriched with FCover and screened for bare soil;
//! a regular FCover series is composited and smoothed into the sustainability
//! factor. DEM and soil covariates give LS and K. The four factors multiply
//! into the hazard raster.

use crate::config::PipelineConfig;
use crate::core::bare_soil::{restorable_mask, restrict_frequency_with_slope, BareSoilDetector, LandMasks, GEOS3_INPUT_BANDS};
use crate::core::cloud_mask::CloudShadowMasker;
use crate::core::composite::{CompositeSeries, Reducer, TemporalCompositor, TimeIntervalSet};
use crate::core::fcover::{FCoverEstimator, FCOVER_BAND};
use crate::core::harmonic::{HarmonicSmoother, FITTED_BAND};
use crate::core::hazard::ErosionHazardModel;
use crate::core::soil_erodibility::{ErodibilityResult, SoilCovariateProvider, SoilErodibilityModel};
use crate::core::statistics::{AreaBreakdown, Histogram};
use crate::core::sustainability::SustainabilityFactorModel;
use crate::core::terrain::{TerrainFactorModel, TerrainFactors};
use crate::types::{check_dim, Band, ErosionError, ErosionResult, Raster, SceneCollection, TimeInterval};

/// Everything the pipeline reads
pub struct PipelineInputs<'a> {
    pub scenes: &'a SceneCollection,
    pub period: TimeInterval,
    /// Elevation (m) on the scene grid
    pub dem: &'a Band,
    /// Upstream contributing area (m2) on the scene grid
    pub contributing_area: &'a Band,
    /// Rainfall erosivity R on the scene grid
    pub rainfall_erosivity: &'a Band,
    pub soil: &'a dyn SoilCovariateProvider,
    /// Administrative region name, used to pick the soil dataset
    pub region: &'a str,
    pub land_masks: LandMasks,
}

/// Every factor and intermediate product of a run
#[derive(Debug, Clone)]
pub struct ErosionOutputs {
    pub erodibility: ErodibilityResult,
    pub terrain: TerrainFactors,
    /// Restricted to land, non-built-up, gentle slopes, then to pixels where S is defined
    pub bare_soil_frequency: Band,
    /// Computed from the frequency before restorability masking
    pub area_breakdown: AreaBreakdown,
    /// Median of bare-soil observations on pixels where S is defined
    pub bare_soil_composite: Raster,
    pub median_composite: Raster,
    /// Smoothed FCover series (`fitted`, `fcover`, `fittedp`, `fittedn`)
    pub fcover_series: CompositeSeries,
    pub sustainability: Band,
    pub hazard: Band,
    pub hazard_histogram: Histogram,
}

pub struct ErosionPipeline {
    config: PipelineConfig,
}

impl ErosionPipeline {
    pub fn new(config: PipelineConfig) -> ErosionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn standard() -> Self {
        Self { config: PipelineConfig::default() }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, inputs: &PipelineInputs) -> ErosionResult<ErosionOutputs> {
        let config = &self.config;
        let scenes = inputs.scenes.filter_date(&inputs.period);
        let grid = scenes
            .first()
            .map(|s| s.raster.grid.clone())
            .ok_or_else(|| ErosionError::InvalidInput(format!(
                "No scenes between {} and {}",
                inputs.period.start, inputs.period.end
            )))?;
        let dim = grid.dim();
        check_dim(dim, inputs.dem.dim())?;
        check_dim(dim, inputs.contributing_area.dim())?;
        check_dim(dim, inputs.rainfall_erosivity.dim())?;

        log::info!(
            "Running erosion pipeline for {} over {} scenes on a {}x{} grid",
            inputs.region,
            scenes.len(),
            dim.0,
            dim.1
        );

        let erodibility =
            SoilErodibilityModel::new(config.soil.clone()).compute_for_region(inputs.soil, inputs.region)?;
        check_dim(dim, erodibility.k_factor.dim())?;

        let terrain = TerrainFactorModel::new(config.terrain.clone()).compute_from_dem(
            inputs.dem,
            grid.pixel_size(),
            inputs.contributing_area,
        )?;

        let masker = CloudShadowMasker::new(config.cloud.clone());
        let masked = masker.mask_collection(&scenes, inputs.land_masks.not_water.as_ref())?;
        if masked.is_empty() {
            return Err(ErosionError::InvalidInput("Every scene was rejected by the cloud filter".to_string()));
        }
        let masked = FCoverEstimator::new(config.fcover.clone()).add_fcover_all(&masked)?;

        let detector = BareSoilDetector::new(config.geos3.clone());
        let frequency = detector.frequency(&masked)?;
        let bare_soil_frequency = restrict_frequency_with_slope(
            &frequency,
            &inputs.land_masks,
            &terrain.slope_aspect.slope,
            config.max_bare_soil_slope_deg,
        )?;

        let pixel_area_km2 = grid.pixel_size() * grid.pixel_size() / 1e6;
        let area_breakdown = AreaBreakdown::compute(
            &bare_soil_frequency,
            None,
            pixel_area_km2 * (dim.0 * dim.1) as f64,
            config.sustainability.permanent_bare_frequency,
        )?;

        let median = TemporalCompositor::new(grid.clone(), Reducer::Median);
        let restorable = restorable_mask(&bare_soil_frequency, config.sustainability.permanent_bare_frequency);
        let bare_scenes = masked.try_map(|scene| detector.bare_soil_scene(scene))?;
        let bare_soil_composite = median.reduce(&bare_scenes, &GEOS3_INPUT_BANDS)?.update_mask(&restorable)?;
        let median_composite = median.reduce(&masked, &[config.cloud.nir_band.as_str()])?;

        let intervals = TimeIntervalSet::from_span(inputs.period.start, inputs.period.end, config.interval_days)?;
        let fcover_composites = TemporalCompositor::new(grid.clone(), config.reducer.clone())
            .composite(&masked, &[FCOVER_BAND], &intervals)?;
        let fcover_series = HarmonicSmoother::new(config.harmonic.clone()).smooth(&fcover_composites, FCOVER_BAND)?;

        let fitted = fcover_series.band_series(FITTED_BAND)?;
        let sustainability = SustainabilityFactorModel::new(config.sustainability.clone()).compute(
            median_composite.band(&config.cloud.nir_band)?,
            &bare_soil_frequency,
            &fitted,
        )?;

        // Outputs are restricted to pixels with restoration potential
        let restorable = sustainability.validity();
        let bare_soil_frequency = bare_soil_frequency.update_mask(&restorable)?;
        let bare_soil_composite = bare_soil_composite.update_mask(&restorable)?;

        let hazard = ErosionHazardModel::new().compute(
            inputs.rainfall_erosivity,
            &erodibility.k_factor,
            &terrain.ls,
            &sustainability,
        )?;

        let hazard_histogram = Histogram::compute(&hazard, None, &config.histogram)?;
        log::info!("Erosion pipeline finished: hazard defined on {} pixels", hazard.valid_count());

        Ok(ErosionOutputs {
            erodibility,
            terrain,
            bare_soil_frequency,
            area_breakdown,
            bare_soil_composite,
            median_composite,
            fcover_series,
            sustainability,
            hazard,
            hazard_histogram,
        })
    }
}
