//! Fractional vegetation cover from the SNAP biophysical FCover network.
//!
//! The network is fixed (5 tansig hidden neurons, one linear output); nothing
//! is trained at runtime. Inputs are min-max normalised to [-1, 1] and the
//! output is de-normalised back to [0, 1].

use crate::constants::fcover as c;
use crate::core::spectral::reflectance;
use crate::core::tiling::map_pixels;
use crate::types::{Band, ErosionError, ErosionResult, Scene, SceneCollection, SceneMetadata};
use serde::{Deserialize, Serialize};

pub const FCOVER_BAND: &str = "fcover";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FCoverParams {
    /// Digital number corresponding to reflectance 1.0
    pub sr_band_scale: f32,
    /// Band whose numeric type the output is cast to
    pub type_reference_band: String,
}

impl Default for FCoverParams {
    fn default() -> Self {
        Self {
            sr_band_scale: 10_000.0,
            type_reference_band: "B4".to_string(),
        }
    }
}

/// Sun and sensor angles for one scene (degrees)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewGeometry {
    pub view_zenith: f64,
    pub view_azimuth: f64,
    pub sun_zenith: f64,
    pub sun_azimuth: f64,
}

impl ViewGeometry {
    /// Mean incidence angles over the network's input bands.
    ///
    /// If any band lacks an incidence angle the published default is used.
    /// Solar angles are required.
    pub fn from_metadata(metadata: &SceneMetadata) -> ErosionResult<Self> {
        let sun_zenith = metadata.mean_solar_zenith.ok_or_else(|| {
            ErosionError::Metadata(format!("Scene {} has no mean solar zenith angle", metadata.id))
        })?;
        let sun_azimuth = metadata.mean_solar_azimuth.ok_or_else(|| {
            ErosionError::Metadata(format!("Scene {} has no mean solar azimuth angle", metadata.id))
        })?;

        let band_mean = |angles: &std::collections::HashMap<String, f64>, fallback: f64, what: &str| {
            let values: Option<Vec<f64>> = c::INPUT_BANDS.iter().map(|b| angles.get(*b).copied()).collect();
            match values {
                Some(v) => v.iter().sum::<f64>() / v.len() as f64,
                None => {
                    log::warn!("Scene {} lacks per-band {} angles; using {} degrees", metadata.id, what, fallback);
                    fallback
                }
            }
        };

        Ok(Self {
            view_zenith: band_mean(&metadata.mean_incidence_zenith, c::DEFAULT_INCIDENCE_ZENITH_DEG, "incidence zenith"),
            view_azimuth: band_mean(&metadata.mean_incidence_azimuth, c::DEFAULT_INCIDENCE_AZIMUTH_DEG, "incidence azimuth"),
            sun_zenith,
            sun_azimuth,
        })
    }

    /// Normalised geometry inputs: cos(view zenith), cos(sun zenith), cos(relative azimuth).
    /// The relative azimuth term is not normalised.
    fn inputs(&self) -> [f64; 3] {
        let view = normalize(self.view_zenith.to_radians().cos(), c::INPUT_NORMALISATION[8]);
        let sun = normalize(self.sun_zenith.to_radians().cos(), c::INPUT_NORMALISATION[9]);
        let rel_az = (self.sun_azimuth - self.view_azimuth).to_radians().cos();
        [view, sun, rel_az]
    }
}

fn normalize(value: f64, (min, max): (f64, f64)) -> f64 {
    2.0 * (value - min) / (max - min) - 1.0
}

fn denormalize(value: f64, (min, max): (f64, f64)) -> f64 {
    0.5 * (value + 1.0) * (max - min) + min
}

pub fn tansig(x: f64) -> f64 {
    2.0 / (1.0 + (-2.0 * x).exp()) - 1.0
}

/// The fixed FCover network
#[derive(Debug, Clone, Copy, Default)]
pub struct FCoverNetwork;

impl FCoverNetwork {
    /// FCover in [0, 1] (before any clamping) for 8 reflectances in network band order
    pub fn predict(&self, reflectances: &[f64; 8], geometry: &ViewGeometry) -> f64 {
        let mut inputs = [0.0f64; 11];
        for (k, &r) in reflectances.iter().enumerate() {
            inputs[k] = normalize(r, c::INPUT_NORMALISATION[k]);
        }
        inputs[8..].copy_from_slice(&geometry.inputs());

        let mut output = c::OUTPUT_BIAS;
        for (neuron, weights) in c::HIDDEN_WEIGHTS.iter().enumerate() {
            let sum: f64 = weights.iter().zip(inputs.iter()).map(|(w, x)| w * x).sum::<f64>() + c::HIDDEN_BIAS[neuron];
            output += c::OUTPUT_WEIGHTS[neuron] * tansig(sum);
        }
        denormalize(output, c::OUTPUT_DENORMALISATION)
    }
}

/// Appends an FCover band to scenes
#[derive(Debug)]
pub struct FCoverEstimator {
    params: FCoverParams,
    network: FCoverNetwork,
}

impl FCoverEstimator {
    pub fn new(params: FCoverParams) -> Self {
        Self { params, network: FCoverNetwork }
    }

    pub fn standard() -> Self {
        Self::new(FCoverParams::default())
    }

    /// FCover band scaled back to the reflectance scale and cast to the reference band type
    pub fn estimate(&self, scene: &Scene) -> ErosionResult<Band> {
        let geometry = ViewGeometry::from_metadata(&scene.metadata)?;
        let scale = self.params.sr_band_scale;
        let bands = c::INPUT_BANDS
            .iter()
            .map(|name| reflectance(&scene.raster, name, scale))
            .collect::<ErosionResult<Vec<_>>>()?;
        let band_type = scene.raster.band(&self.params.type_reference_band)?.band_type;

        log::debug!("FCover for scene {} with geometry {:?}", scene.metadata.id, geometry);

        let values = map_pixels(scene.raster.dim(), |i, j| {
            let mut r = [0.0f64; 8];
            for (k, band) in bands.iter().enumerate() {
                r[k] = band.get(i, j)? as f64;
            }
            let fcover = self.network.predict(&r, &geometry);
            Some(band_type.cast(fcover * scale as f64))
        });
        Ok(Band::from_options(FCOVER_BAND, &values).with_type(band_type))
    }

    pub fn add_fcover(&self, scene: &Scene) -> ErosionResult<Scene> {
        let band = self.estimate(scene)?;
        Ok(scene.with_raster(scene.raster.clone().with_band(band)?))
    }

    pub fn add_fcover_all(&self, scenes: &SceneCollection) -> ErosionResult<SceneCollection> {
        log::info!("Estimating FCover for {} scenes", scenes.len());
        scenes.try_map(|scene| self.add_fcover(scene))
    }
}
