use chrono::{DateTime, Duration, Utc};
use ndarray::Array2;
use num_traits::{Bounded, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Validity mask (true = valid pixel)
pub type ValidityMask = Array2<bool>;

/// Coordinate system enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (latitude, longitude)
    Geographic,
    /// Projected coordinates (e.g., UTM)
    Projected { epsg: u32 },
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        CoordinateSystem::Geographic
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }
}

/// Grid geometry shared by every band of a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    pub coordinate_system: CoordinateSystem,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize, geo_transform: GeoTransform, coordinate_system: CoordinateSystem) -> Self {
        Self { rows, cols, geo_transform, coordinate_system }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Pixel size in grid units (metres for projected grids)
    pub fn pixel_size(&self) -> f64 {
        self.geo_transform.pixel_width.abs()
    }

    pub fn bounds(&self) -> BoundingBox {
        let gt = &self.geo_transform;
        let x0 = gt.top_left_x;
        let x1 = gt.top_left_x + gt.pixel_width * self.cols as f64;
        let y0 = gt.top_left_y;
        let y1 = gt.top_left_y + gt.pixel_height * self.rows as f64;
        BoundingBox {
            min_lon: x0.min(x1),
            max_lon: x0.max(x1),
            min_lat: y0.min(y1),
            max_lat: y0.max(y1),
        }
    }
}

/// Numeric storage type of a band. Values are held as f32 in memory and
/// cast through this type whenever a stage writes back "in the band's type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandType {
    UInt8,
    UInt16,
    Int16,
    Int32,
    Float32,
}

impl BandType {
    /// Truncate toward zero and saturate to the type's range
    pub fn cast(self, value: f64) -> f32 {
        if !value.is_finite() {
            return value as f32;
        }
        match self {
            BandType::UInt8 => saturate::<u8>(value),
            BandType::UInt16 => saturate::<u16>(value),
            BandType::Int16 => saturate::<i16>(value),
            BandType::Int32 => saturate::<i32>(value),
            BandType::Float32 => value as f32,
        }
    }
}

fn saturate<T: Bounded + ToPrimitive>(value: f64) -> f32 {
    let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
    value.trunc().clamp(lo, hi) as f32
}

/// A named raster band with an optional per-pixel validity mask
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub band_type: BandType,
    pub data: Array2<f32>,
    pub mask: Option<ValidityMask>,
}

impl Band {
    pub fn new(name: impl Into<String>, data: Array2<f32>) -> Self {
        Self {
            name: name.into(),
            band_type: BandType::Float32,
            data,
            mask: None,
        }
    }

    /// Build a band from per-pixel optional values; `None` becomes a masked pixel
    pub fn from_options(name: impl Into<String>, values: &Array2<Option<f32>>) -> Self {
        let data = values.mapv(|v| v.unwrap_or(f32::NAN));
        let mask = values.mapv(|v| v.is_some());
        Self {
            name: name.into(),
            band_type: BandType::Float32,
            data,
            mask: Some(mask),
        }
    }

    /// A band in which no pixel is valid
    pub fn fully_masked(name: impl Into<String>, dim: (usize, usize), band_type: BandType) -> Self {
        Self {
            name: name.into(),
            band_type,
            data: Array2::from_elem(dim, f32::NAN),
            mask: Some(Array2::from_elem(dim, false)),
        }
    }

    pub fn with_type(mut self, band_type: BandType) -> Self {
        self.band_type = band_type;
        self
    }

    pub fn with_mask(mut self, mask: ValidityMask) -> ErosionResult<Self> {
        check_dim(self.dim(), mask.dim())?;
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_valid(&self, i: usize, j: usize) -> bool {
        let masked_in = self.mask.as_ref().map_or(true, |m| m[[i, j]]);
        masked_in && self.data[[i, j]].is_finite()
    }

    /// Value at (i, j) if the pixel is valid
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if self.is_valid(i, j) {
            Some(self.data[[i, j]])
        } else {
            None
        }
    }

    pub fn validity(&self) -> ValidityMask {
        match &self.mask {
            Some(mask) => Array2::from_shape_fn(self.dim(), |(i, j)| mask[[i, j]] && self.data[[i, j]].is_finite()),
            None => self.data.mapv(|v| v.is_finite()),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.validity().iter().filter(|&&v| v).count()
    }

    /// New band whose mask is the conjunction of the current mask and `mask`
    pub fn update_mask(&self, mask: &ValidityMask) -> ErosionResult<Band> {
        check_dim(self.dim(), mask.dim())?;
        let combined = match &self.mask {
            Some(current) => Array2::from_shape_fn(self.dim(), |(i, j)| current[[i, j]] && mask[[i, j]]),
            None => mask.clone(),
        };
        Ok(Band {
            name: self.name.clone(),
            band_type: self.band_type,
            data: self.data.clone(),
            mask: Some(combined),
        })
    }
}

/// Georeferenced multi-band grid. All bands share the grid geometry.
#[derive(Debug, Clone)]
pub struct Raster {
    pub grid: GridSpec,
    pub bands: Vec<Band>,
}

impl Raster {
    pub fn new(grid: GridSpec) -> Self {
        Self { grid, bands: Vec::new() }
    }

    /// Raster whose bands are all fully masked
    pub fn fully_masked(grid: GridSpec, bands: &[(String, BandType)]) -> Self {
        let dim = grid.dim();
        let bands = bands
            .iter()
            .map(|(name, band_type)| Band::fully_masked(name.clone(), dim, *band_type))
            .collect();
        Self { grid, bands }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.grid.dim()
    }

    /// Add a band, replacing any existing band of the same name
    pub fn add_band(&mut self, band: Band) -> ErosionResult<()> {
        check_dim(self.dim(), band.dim())?;
        match self.bands.iter_mut().find(|b| b.name == band.name) {
            Some(existing) => *existing = band,
            None => self.bands.push(band),
        }
        Ok(())
    }

    pub fn with_band(mut self, band: Band) -> ErosionResult<Self> {
        self.add_band(band)?;
        Ok(self)
    }

    pub fn band(&self, name: &str) -> ErosionResult<&Band> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ErosionError::MissingBand(name.to_string()))
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> ErosionResult<Raster> {
        let bands = names
            .iter()
            .map(|n| self.band(n.as_ref()).cloned())
            .collect::<ErosionResult<Vec<_>>>()?;
        Ok(Raster { grid: self.grid.clone(), bands })
    }

    /// Apply `mask` to every band
    pub fn update_mask(&self, mask: &ValidityMask) -> ErosionResult<Raster> {
        let bands = self
            .bands
            .iter()
            .map(|b| b.update_mask(mask))
            .collect::<ErosionResult<Vec<_>>>()?;
        Ok(Raster { grid: self.grid.clone(), bands })
    }
}

/// Scene acquisition metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Scene-wide cloudy pixel percentage from the product metadata
    pub cloudy_pixel_percentage: Option<f64>,
    pub mean_solar_azimuth: Option<f64>,
    pub mean_solar_zenith: Option<f64>,
    /// Mean viewing incidence azimuth per band name (degrees)
    #[serde(default)]
    pub mean_incidence_azimuth: HashMap<String, f64>,
    /// Mean viewing incidence zenith per band name (degrees)
    #[serde(default)]
    pub mean_incidence_zenith: HashMap<String, f64>,
}

impl SceneMetadata {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            acquired,
            cloudy_pixel_percentage: None,
            mean_solar_azimuth: None,
            mean_solar_zenith: None,
            mean_incidence_azimuth: HashMap::new(),
            mean_incidence_zenith: HashMap::new(),
        }
    }
}

/// A raster plus its acquisition metadata and cloud probability (0-100)
#[derive(Debug, Clone)]
pub struct Scene {
    pub raster: Raster,
    pub metadata: SceneMetadata,
    pub cloud_probability: Option<Array2<f32>>,
}

impl Scene {
    pub fn new(raster: Raster, metadata: SceneMetadata) -> Self {
        Self { raster, metadata, cloud_probability: None }
    }

    pub fn with_cloud_probability(mut self, probability: Array2<f32>) -> ErosionResult<Self> {
        check_dim(self.raster.dim(), probability.dim())?;
        self.cloud_probability = Some(probability);
        Ok(self)
    }

    pub fn acquired(&self) -> DateTime<Utc> {
        self.metadata.acquired
    }

    /// Same metadata, different pixels
    pub fn with_raster(&self, raster: Raster) -> Scene {
        Scene {
            raster,
            metadata: self.metadata.clone(),
            cloud_probability: self.cloud_probability.clone(),
        }
    }
}

/// Scenes ordered by acquisition time
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    scenes: Vec<Scene>,
}

impl SceneCollection {
    pub fn new(mut scenes: Vec<Scene>) -> Self {
        scenes.sort_by_key(|s| s.metadata.acquired);
        Self { scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.scenes.iter()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn first(&self) -> Option<&Scene> {
        self.scenes.first()
    }

    pub fn filter_date(&self, interval: &TimeInterval) -> SceneCollection {
        self.filtered(|s| interval.contains(s.acquired()))
    }

    pub fn filter_bounds(&self, bounds: &BoundingBox) -> SceneCollection {
        self.filtered(|s| s.raster.grid.bounds().intersects(bounds))
    }

    /// Keep scenes whose cloudy pixel percentage is below `max_percentage`.
    /// Scenes without the metadata field are kept.
    pub fn filter_cloudy(&self, max_percentage: f64) -> SceneCollection {
        self.filtered(|s| s.metadata.cloudy_pixel_percentage.map_or(true, |p| p < max_percentage))
    }

    fn filtered<F: Fn(&Scene) -> bool>(&self, keep: F) -> SceneCollection {
        SceneCollection {
            scenes: self.scenes.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// Apply a per-scene transform, failing if any scene fails
    pub fn try_map<F>(&self, f: F) -> ErosionResult<SceneCollection>
    where
        F: Fn(&Scene) -> ErosionResult<Scene> + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        let scenes = {
            use rayon::prelude::*;
            self.scenes.par_iter().map(&f).collect::<ErosionResult<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let scenes = self.scenes.iter().map(&f).collect::<ErosionResult<Vec<_>>>()?;

        Ok(SceneCollection::new(scenes))
    }
}

impl FromIterator<Scene> for SceneCollection {
    fn from_iter<I: IntoIterator<Item = Scene>>(iter: I) -> Self {
        SceneCollection::new(iter.into_iter().collect())
    }
}

/// Half-open [start, end) time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ErosionResult<Self> {
        if end <= start {
            return Err(ErosionError::InvalidInput(format!(
                "Interval end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_days(&self) -> f64 {
        self.duration().num_seconds() as f64 / 86_400.0
    }

    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.duration().num_seconds() / 2)
    }
}

pub(crate) fn check_dim(expected: (usize, usize), found: (usize, usize)) -> ErosionResult<()> {
    if expected != found {
        return Err(ErosionError::ShapeMismatch { expected, found });
    }
    Ok(())
}

/// Error types for erosion modelling
#[derive(Debug, thiserror::Error)]
pub enum ErosionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Physically impossible input values
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Underdetermined model: {0}")]
    UnderdeterminedModel(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for erosion modelling operations
pub type ErosionResult<T> = Result<T, ErosionError>;
