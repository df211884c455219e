use crate::constants::soil as c;
use crate::core::tiling::map_pixels;
use crate::types::{check_dim, Band, ErosionError, ErosionResult, ValidityMask};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Soil texture class (Jones et al. scheme plus an organic class)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureClass {
    Coarse,
    Medium,
    MediumFine,
    Fine,
    VeryFine,
    Organic,
}

impl TextureClass {
    pub fn code(self) -> u8 {
        match self {
            TextureClass::Coarse => 1,
            TextureClass::Medium => 2,
            TextureClass::MediumFine => 3,
            TextureClass::Fine => 4,
            TextureClass::VeryFine => 5,
            TextureClass::Organic => 9,
        }
    }
}

/// Packing density band (t/m3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackingDensity {
    /// < 1.40
    Low,
    /// [1.40, 1.75]
    Medium,
    /// > 1.75
    High,
}

impl PackingDensity {
    pub fn from_value(packing_density: f32) -> Self {
        if packing_density < c::PACKING_LOW_LIMIT {
            PackingDensity::Low
        } else if packing_density <= c::PACKING_HIGH_LIMIT {
            PackingDensity::Medium
        } else {
            PackingDensity::High
        }
    }
}

/// USDA hydrologic soil group, including dual groups for drained/undrained soils
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HydrologicGroup {
    A,
    B,
    C,
    D,
    AD,
    BD,
    CD,
}

impl HydrologicGroup {
    pub fn from_code(code: f32) -> ErosionResult<Self> {
        let unknown = || ErosionError::Domain(format!("Unknown hydrologic soil group code {}", code));
        if !code.is_finite() || code.fract() != 0.0 {
            return Err(unknown());
        }
        match code as i32 {
            1 => Ok(HydrologicGroup::A),
            2 => Ok(HydrologicGroup::B),
            3 => Ok(HydrologicGroup::C),
            4 => Ok(HydrologicGroup::D),
            14 => Ok(HydrologicGroup::AD),
            24 => Ok(HydrologicGroup::BD),
            34 => Ok(HydrologicGroup::CD),
            _ => Err(unknown()),
        }
    }
}

/// Structural missing cells of the lookup tables resolve to this code
pub const UNCLASSIFIED: u8 = 0;

/// Texture class from clay, sand and organic matter (percent).
///
/// Organic soils (OM above a clay-dependent threshold) override the mineral classes.
pub fn texture_class(clay: f32, sand: f32, organic_matter: f32) -> TextureClass {
    if is_organic(clay, organic_matter) {
        return TextureClass::Organic;
    }
    if clay > 60.0 {
        TextureClass::VeryFine
    } else if clay >= 35.0 {
        TextureClass::Fine
    } else if clay < 18.0 && sand > 65.0 {
        TextureClass::Coarse
    } else if sand > 15.0 {
        TextureClass::Medium
    } else {
        TextureClass::MediumFine
    }
}

/// OM threshold interpolated from 20% (0% clay) to 30% (50% clay), clamped outside
pub fn organic_threshold(clay: f32) -> f32 {
    let (clay_lo, clay_hi) = c::ORGANIC_CLAY_RANGE;
    let (om_lo, om_hi) = c::ORGANIC_OM_RANGE;
    let t = ((clay - clay_lo) / (clay_hi - clay_lo)).clamp(0.0, 1.0);
    om_lo + t * (om_hi - om_lo)
}

pub fn is_organic(clay: f32, organic_matter: f32) -> bool {
    organic_matter >= organic_threshold(clay)
}

/// Structure class from texture and packing density. Missing cells give [`UNCLASSIFIED`].
pub fn structure_class(texture: TextureClass, packing: PackingDensity) -> u8 {
    use PackingDensity as P;
    use TextureClass as T;
    match (texture, packing) {
        (T::Coarse, P::Low) => 4,
        (T::Coarse, P::Medium) => 3,
        (T::Coarse, P::High) => 2,
        (T::Medium, P::Low) => 3,
        (T::Medium, P::Medium) | (T::Medium, P::High) => 2,
        (T::MediumFine, P::Low) | (T::MediumFine, P::Medium) => 2,
        (T::MediumFine, P::High) => 1,
        (T::Fine, P::Low) | (T::VeryFine, P::Low) => 2,
        (T::Fine, P::Medium) | (T::Fine, P::High) | (T::VeryFine, P::Medium) | (T::VeryFine, P::High) => 1,
        (T::Organic, P::Low) => 4,
        (T::Organic, P::Medium) => 3,
        // No published value for dense organic soils
        (T::Organic, P::High) => UNCLASSIFIED,
    }
}

/// Permeability class from hydrologic group and adjusted Ksat. Missing cells give [`UNCLASSIFIED`].
pub fn permeability_class(group: HydrologicGroup, adjusted_ksat: f32) -> u8 {
    use HydrologicGroup as G;
    let k = adjusted_ksat;
    match group {
        G::A if k > c::KSAT_MODERATE_FAST_MAX => 1,
        G::A | G::AD if k > c::KSAT_MODERATE_MAX && k <= c::KSAT_MODERATE_FAST_MAX => 2,
        G::B | G::BD if k > c::KSAT_MODERATE_LOW_MAX && k <= c::KSAT_MODERATE_MAX => 3,
        G::C if k > c::KSAT_SLOW_MAX && k <= c::KSAT_MODERATE_LOW_MAX => 4,
        G::CD if k > c::KSAT_VERY_SLOW_MAX && k <= c::KSAT_SLOW_MAX => 5,
        G::D if k <= c::KSAT_VERY_SLOW_MAX => 6,
        _ => UNCLASSIFIED,
    }
}

/// K from textural factor inputs and the two classes
pub fn k_value(clay: f32, sand: f32, silt: f32, organic_matter: f32, structure: u8, permeability: u8) -> f64 {
    let m = ((sand + silt) as f64) * (100.0 - clay as f64);
    (c::K_TEXTURE_COEFF * m.max(0.0).powf(c::K_TEXTURE_EXPONENT) * (c::K_OM_OFFSET - organic_matter as f64)
        + c::K_STRUCTURE_COEFF * (structure as f64 - 2.0)
        + c::K_PERMEABILITY_COEFF * (permeability as f64 - 3.0))
        / 100.0
        * c::K_SI_CONVERSION
}

/// Which covariate dataset to draw soil inputs from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoilDataSource {
    /// Coarse global dataset (250 m)
    Global,
    /// High-resolution regional dataset (30 m)
    Regional,
}

impl SoilDataSource {
    pub fn for_region(region: &str) -> Self {
        if c::REGIONAL_DATASET_REGIONS.iter().any(|r| *r == region) {
            SoilDataSource::Regional
        } else {
            SoilDataSource::Global
        }
    }
}

/// Co-registered soil covariates (percent, t/m3, fraction, Ksat in micrometres/s)
#[derive(Debug, Clone)]
pub struct SoilCovariates {
    pub clay: Array2<f32>,
    pub sand: Array2<f32>,
    pub silt: Array2<f32>,
    pub organic_matter: Array2<f32>,
    pub bulk_density: Array2<f32>,
    pub coarse_fragments: Array2<f32>,
    pub ksat: Array2<f32>,
    pub hydrologic_group: Array2<f32>,
    pub valid: Option<ValidityMask>,
}

/// Three depth strata (0-5, 5-15, 15-30 cm) of one global covariate
#[derive(Debug, Clone)]
pub struct DepthStrata {
    pub top: Array2<f32>,
    pub middle: Array2<f32>,
    pub bottom: Array2<f32>,
}

impl DepthStrata {
    fn mean_scaled(&self, divisor: f32) -> ErosionResult<Array2<f32>> {
        check_dim(self.top.dim(), self.middle.dim())?;
        check_dim(self.top.dim(), self.bottom.dim())?;
        Ok((&self.top + &self.middle + &self.bottom) / (3.0 * divisor))
    }
}

/// Global dataset layers in their native units
#[derive(Debug, Clone)]
pub struct GlobalSoilLayers {
    /// g/kg
    pub clay: DepthStrata,
    /// g/kg
    pub sand: DepthStrata,
    /// g/kg
    pub silt: DepthStrata,
    /// Soil organic carbon, dg/kg
    pub soc: DepthStrata,
    /// cg/cm3
    pub bulk_density: DepthStrata,
    /// Coarse fragments, per 10000
    pub coarse_fragments: DepthStrata,
    /// Ksat scaled by 1e4
    pub ksat: DepthStrata,
    pub hydrologic_group: Array2<f32>,
}

/// Regional dataset layers in their native units
#[derive(Debug, Clone)]
pub struct RegionalSoilLayers {
    /// percent
    pub clay: Array2<f32>,
    pub sand: Array2<f32>,
    pub silt: Array2<f32>,
    /// Organic carbon, g/kg
    pub organic_carbon: Array2<f32>,
    /// t/m3
    pub bulk_density: Array2<f32>,
    /// Coarse fragments and hydraulic properties come from the global set
    pub coarse_fragments: DepthStrata,
    pub ksat: DepthStrata,
    pub hydrologic_group: Array2<f32>,
}

impl SoilCovariates {
    pub fn from_global(layers: &GlobalSoilLayers) -> ErosionResult<Self> {
        Ok(Self {
            clay: layers.clay.mean_scaled(10.0)?,
            sand: layers.sand.mean_scaled(10.0)?,
            silt: layers.silt.mean_scaled(10.0)?,
            organic_matter: layers.soc.mean_scaled(100.0)? * c::SOC_TO_SOM,
            bulk_density: layers.bulk_density.mean_scaled(100.0)?,
            coarse_fragments: layers.coarse_fragments.mean_scaled(10_000.0)?,
            ksat: layers.ksat.mean_scaled(10_000.0)?,
            hydrologic_group: layers.hydrologic_group.clone(),
            valid: None,
        })
    }

    /// Missing regional values are read as zero
    pub fn from_regional(layers: &RegionalSoilLayers) -> ErosionResult<Self> {
        let unmask = |a: &Array2<f32>| a.mapv(|v| if v.is_finite() { v } else { 0.0 });
        Ok(Self {
            clay: unmask(&layers.clay),
            sand: unmask(&layers.sand),
            silt: unmask(&layers.silt),
            organic_matter: unmask(&layers.organic_carbon) / 10.0 * c::SOC_TO_SOM,
            bulk_density: unmask(&layers.bulk_density),
            coarse_fragments: layers.coarse_fragments.mean_scaled(10_000.0)?,
            ksat: layers.ksat.mean_scaled(10_000.0)?,
            hydrologic_group: layers.hydrologic_group.clone(),
            valid: None,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.clay.dim()
    }

    fn check_shapes(&self) -> ErosionResult<()> {
        let dim = self.dim();
        for grid in [
            &self.sand,
            &self.silt,
            &self.organic_matter,
            &self.bulk_density,
            &self.coarse_fragments,
            &self.ksat,
            &self.hydrologic_group,
        ] {
            check_dim(dim, grid.dim())?;
        }
        if let Some(valid) = &self.valid {
            check_dim(dim, valid.dim())?;
        }
        Ok(())
    }

    fn is_valid(&self, i: usize, j: usize) -> bool {
        self.valid.as_ref().map_or(true, |v| v[[i, j]])
    }
}

/// Raster-access seam for soil covariates
pub trait SoilCovariateProvider: Sync {
    fn covariates(&self, source: SoilDataSource) -> ErosionResult<SoilCovariates>;
}

/// Soil erodibility model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilErodibilityParams {
    pub max_sand_pct: f32,
    pub max_silt_pct: f32,
    pub max_organic_matter_pct: f32,
}

impl Default for SoilErodibilityParams {
    fn default() -> Self {
        Self {
            max_sand_pct: c::MAX_SAND_PCT,
            max_silt_pct: c::MAX_SILT_PCT,
            max_organic_matter_pct: c::MAX_ORGANIC_MATTER_PCT,
        }
    }
}

/// Classification grids produced alongside K
#[derive(Debug, Clone)]
pub struct SoilClassification {
    pub texture: Array2<u8>,
    pub structure: Array2<u8>,
    pub permeability: Array2<u8>,
}

/// K-factor output
#[derive(Debug, Clone)]
pub struct ErodibilityResult {
    pub k_factor: Band,
    pub classification: SoilClassification,
}

/// Soil erodibility (K) model
pub struct SoilErodibilityModel {
    params: SoilErodibilityParams,
}

#[derive(Clone, Copy, Default)]
struct PixelK {
    k: Option<f32>,
    texture: u8,
    structure: u8,
    permeability: u8,
}

impl SoilErodibilityModel {
    pub fn new(params: SoilErodibilityParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(SoilErodibilityParams::default())
    }

    /// Select the dataset for `region` and compute K
    pub fn compute_for_region(&self, provider: &dyn SoilCovariateProvider, region: &str) -> ErosionResult<ErodibilityResult> {
        let source = SoilDataSource::for_region(region);
        log::info!("Computing K-factor for region '{}' from {:?} soil covariates", region, source);
        let covariates = provider.covariates(source)?;
        self.compute(&covariates)
    }

    pub fn compute(&self, covariates: &SoilCovariates) -> ErosionResult<ErodibilityResult> {
        covariates.check_shapes()?;
        let groups = self.validate(covariates)?;
        let dim = covariates.dim();
        log::debug!("K-factor inputs {}x{}, params {:?}", dim.0, dim.1, self.params);

        let pixels = map_pixels(dim, |i, j| match groups[[i, j]] {
            Some(group) => self.pixel(covariates, group, i, j),
            None => PixelK::default(),
        });

        let k_values = pixels.mapv(|p| p.k);
        let result = ErodibilityResult {
            k_factor: Band::from_options("K", &k_values),
            classification: SoilClassification {
                texture: pixels.mapv(|p| p.texture),
                structure: pixels.mapv(|p| p.structure),
                permeability: pixels.mapv(|p| p.permeability),
            },
        };
        log::info!("K-factor computed: {} valid pixels", result.k_factor.valid_count());
        Ok(result)
    }

    fn pixel(&self, s: &SoilCovariates, group: HydrologicGroup, i: usize, j: usize) -> PixelK {
        let clay = s.clay[[i, j]];
        let sand = s.sand[[i, j]].min(self.params.max_sand_pct);
        let silt = s.silt[[i, j]].min(self.params.max_silt_pct);
        let om = s.organic_matter[[i, j]].min(self.params.max_organic_matter_pct);

        let packing = PackingDensity::from_value(s.bulk_density[[i, j]] + c::PACKING_CLAY_COEFF * clay);
        let texture = texture_class(clay, sand, om);
        let structure = structure_class(texture, packing);

        let adjusted_ksat = s.ksat[[i, j]] * (1.0 - s.coarse_fragments[[i, j]]);
        let permeability = permeability_class(group, adjusted_ksat);

        PixelK {
            k: Some(k_value(clay, sand, silt, om, structure, permeability) as f32),
            texture: texture.code(),
            structure,
            permeability,
        }
    }

    /// Range checks on every valid pixel, returning the parsed hydrologic groups
    /// (`None` where the pixel is masked).
    ///
    /// A group code outside the enumerated set is malformed input and fails the
    /// whole grid. [`UNCLASSIFIED`] is reserved for well-formed inputs that fall
    /// into a gap of the published tables.
    fn validate(&self, s: &SoilCovariates) -> ErosionResult<Array2<Option<HydrologicGroup>>> {
        let mut groups = Array2::from_elem(s.dim(), None);
        let checks: [(&str, &Array2<f32>, f32); 5] = [
            ("clay", &s.clay, 100.0),
            ("sand", &s.sand, 100.0),
            ("silt", &s.silt, 100.0),
            ("organic matter", &s.organic_matter, 100.0),
            ("coarse fragments", &s.coarse_fragments, 1.0),
        ];
        for ((i, j), _) in s.clay.indexed_iter() {
            if !s.is_valid(i, j) {
                continue;
            }
            for (name, grid, max) in &checks {
                let v = grid[[i, j]];
                if !v.is_finite() || v < 0.0 || v > *max {
                    return Err(ErosionError::Domain(format!(
                        "{} value {} at ({}, {}) outside [0, {}]",
                        name, v, i, j, max
                    )));
                }
            }
            for (name, v) in [("bulk density", s.bulk_density[[i, j]]), ("Ksat", s.ksat[[i, j]])] {
                if !v.is_finite() || v < 0.0 {
                    return Err(ErosionError::Domain(format!(
                        "{} value {} at ({}, {}) must be finite and non-negative",
                        name, v, i, j
                    )));
                }
            }
            groups[[i, j]] = Some(HydrologicGroup::from_code(s.hydrologic_group[[i, j]])?);
        }
        Ok(groups)
    }
}
