//! Pipeline configuration, loadable from JSON.
//!
//! Every section falls back to the published defaults, so a document only
//! needs the values it changes:
//!
//! ```json
//! { "interval_days": 60, "harmonic": { "harmonics": 3 } }
//! ```

use crate::constants::{terrain, time};
use crate::core::bare_soil::Geos3Params;
use crate::core::cloud_mask::CloudMaskParams;
use crate::core::composite::Reducer;
use crate::core::fcover::FCoverParams;
use crate::core::harmonic::HarmonicParams;
use crate::core::soil_erodibility::SoilErodibilityParams;
use crate::core::statistics::HistogramParams;
use crate::core::sustainability::SustainabilityParams;
use crate::core::terrain::LsParams;
use crate::types::{ErosionError, ErosionResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub soil: SoilErodibilityParams,
    pub terrain: LsParams,
    pub cloud: CloudMaskParams,
    pub geos3: Geos3Params,
    pub fcover: FCoverParams,
    pub harmonic: HarmonicParams,
    pub sustainability: SustainabilityParams,
    pub histogram: HistogramParams,
    /// Target composite interval length (days)
    pub interval_days: f64,
    /// Reducer for the FCover time series composites
    pub reducer: Reducer,
    /// Bare-soil frequency is only kept on slopes up to this steepness (degrees)
    pub max_bare_soil_slope_deg: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            soil: SoilErodibilityParams::default(),
            terrain: LsParams::default(),
            cloud: CloudMaskParams::default(),
            geos3: Geos3Params::default(),
            fcover: FCoverParams::default(),
            harmonic: HarmonicParams::default(),
            sustainability: SustainabilityParams::default(),
            histogram: HistogramParams::default(),
            interval_days: time::DEFAULT_INTERVAL_DAYS,
            reducer: Reducer::Median,
            max_bare_soil_slope_deg: terrain::MAX_BARE_SOIL_SLOPE_DEG,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> ErosionResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ErosionResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading pipeline configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> ErosionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> ErosionResult<()> {
        fn positive(name: &str, value: f64) -> ErosionResult<()> {
            if value > 0.0 {
                Ok(())
            } else {
                Err(ErosionError::Config(format!("{} must be positive, got {}", name, value)))
            }
        }
        fn ordered(name: &str, (lo, hi): (f32, f32)) -> ErosionResult<()> {
            if lo <= hi {
                Ok(())
            } else {
                Err(ErosionError::Config(format!("{} range ({}, {}) is inverted", name, lo, hi)))
            }
        }

        positive("interval_days", self.interval_days)?;
        positive("terrain.cell_size_m", self.terrain.cell_size_m as f64)?;
        positive("terrain.max_contributing_area_m2", self.terrain.max_contributing_area_m2 as f64)?;
        positive("cloud.sr_band_scale", self.cloud.sr_band_scale as f64)?;
        positive("cloud.mask_resolution_m", self.cloud.mask_resolution_m)?;
        positive("cloud.tiles.tile_size", self.cloud.tiles.tile_size as f64)?;
        positive("geos3.sr_band_scale", self.geos3.sr_band_scale as f64)?;
        positive("fcover.sr_band_scale", self.fcover.sr_band_scale as f64)?;
        positive("sustainability.sr_band_scale", self.sustainability.sr_band_scale as f64)?;
        positive("sustainability.tiles.tile_size", self.sustainability.tiles.tile_size as f64)?;
        positive("histogram.max_buckets", self.histogram.max_buckets as f64)?;

        if self.harmonic.harmonics == 0 {
            return Err(ErosionError::Config("harmonic.harmonics must be at least 1".to_string()));
        }
        ordered("harmonic.clamp_range", self.harmonic.clamp_range)?;
        ordered("sustainability.land_use_range", self.sustainability.land_use_range)?;
        ordered("geos3.ndvi_range", self.geos3.ndvi_range)?;
        ordered("geos3.nbr2_range", self.geos3.nbr2_range)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.harmonic.harmonics, 4);
        assert_eq!(config.cloud.cloud_probability_threshold, 40.0);
    }

    #[test]
    fn test_partial_document() {
        let config = PipelineConfig::from_json_str(
            r#"{ "interval_days": 60, "harmonic": { "harmonics": 3 }, "reducer": "geometric_median" }"#,
        )
        .unwrap();
        assert_eq!(config.interval_days, 60.0);
        assert_eq!(config.harmonic.harmonics, 3);
        assert_eq!(config.harmonic.clamp_range, (0.0, 10_000.0));
        assert_eq!(config.reducer, Reducer::GeometricMedian);
    }

    #[test]
    fn test_quality_mosaic_reducer() {
        let config = PipelineConfig::from_json_str(r#"{ "reducer": { "quality_mosaic": { "band": "fcover" } } }"#).unwrap();
        assert_eq!(config.reducer, Reducer::QualityMosaic { band: "fcover".to_string() });
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "interval_days": 0 }"#),
            Err(ErosionError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "harmonic": { "harmonics": 0 } }"#),
            Err(ErosionError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "harmonic": { "clamp_range": [10.0, 0.0] } }"#),
            Err(ErosionError::Config(_))
        ));
        assert!(matches!(PipelineConfig::from_json_str("{ not json"), Err(ErosionError::Json(_))));
    }

    #[test]
    fn test_from_file_roundtrip() {
        let mut config = PipelineConfig::default();
        config.interval_days = 15.0;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();

        let loaded = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.interval_days, 15.0);
        assert_eq!(loaded.cloud.nir_band, "B8");
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/soilwatch.json"),
            Err(ErosionError::Io(_))
        ));
    }
}
