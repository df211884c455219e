//! SoilWatch: soil erosion hazard mapping with the Revised Universal Soil Loss Equation.
//!
//! The hazard is the product R x K x LS x S of rainfall erosivity, soil
//! erodibility, a terrain factor and a vegetation-based sustainability
//! factor derived from a Sentinel-2 time series. Inputs are co-registered
//! rasters; fetching imagery and writing products is left to the caller.

pub mod types;
pub mod constants;
pub mod config;
pub mod core;
pub mod pipeline;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    Band, BandType, Raster, GridSpec, GeoTransform, CoordinateSystem, BoundingBox,
    Scene, SceneMetadata, SceneCollection, TimeInterval, ValidityMask,
    ErosionError, ErosionResult,
};

pub use config::PipelineConfig;
pub use pipeline::{ErosionPipeline, ErosionOutputs, PipelineInputs};
