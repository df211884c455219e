//! Core erosion modelling modules

pub mod tiling;
pub mod focal;
pub mod spectral;
pub mod soil_erodibility;
pub mod terrain;
pub mod cloud_mask;
pub mod bare_soil;
pub mod fcover;
pub mod composite;
pub mod harmonic;
pub mod sustainability;
pub mod hazard;
pub mod statistics;

// Re-export main types
pub use tiling::{TileScheme, Tile};
pub use soil_erodibility::{
    SoilErodibilityModel, SoilErodibilityParams, SoilCovariates, SoilCovariateProvider, SoilDataSource,
    ErodibilityResult, TextureClass, HydrologicGroup,
};
pub use terrain::{TerrainFactorModel, LsParams, SlopeAspect, TerrainFactors};
pub use cloud_mask::{CloudShadowMasker, CloudMaskParams, CloudShadowResult};
pub use bare_soil::{BareSoilDetector, Geos3Params, LandMasks};
pub use fcover::{FCoverEstimator, FCoverNetwork, FCoverParams, ViewGeometry};
pub use composite::{TemporalCompositor, TimeIntervalSet, Reducer, CompositeSeries, CompositeFrame};
pub use harmonic::{HarmonicSmoother, HarmonicParams, HarmonicModel};
pub use sustainability::{SustainabilityFactorModel, SustainabilityParams};
pub use hazard::ErosionHazardModel;
pub use statistics::{AreaBreakdown, Histogram, HistogramParams, zonal_mean};
