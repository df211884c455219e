//! Python bindings over numpy arrays. Masked pixels travel as NaN.

use crate::core::hazard::ErosionHazardModel;
use crate::core::soil_erodibility::{SoilCovariates, SoilErodibilityModel};
use crate::core::terrain::TerrainFactorModel;
use crate::types::{Band, ErosionError};
use ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;

fn to_py_err(e: ErosionError) -> PyErr {
    match e {
        ErosionError::Domain(_) | ErosionError::InvalidInput(_) | ErosionError::ShapeMismatch { .. } => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
    }
}

fn band(name: &str, array: &PyReadonlyArray2<f32>) -> Band {
    Band::new(name, array.as_array().to_owned())
}

fn unmasked(band: &Band) -> Array2<f32> {
    Array2::from_shape_fn(band.dim(), |(i, j)| band.get(i, j).unwrap_or(f32::NAN))
}

/// K-factor from soil covariates in model units
#[pyfunction]
#[allow(clippy::too_many_arguments)]
fn k_factor<'py>(
    py: Python<'py>,
    clay: PyReadonlyArray2<f32>,
    sand: PyReadonlyArray2<f32>,
    silt: PyReadonlyArray2<f32>,
    organic_matter: PyReadonlyArray2<f32>,
    bulk_density: PyReadonlyArray2<f32>,
    coarse_fragments: PyReadonlyArray2<f32>,
    ksat: PyReadonlyArray2<f32>,
    hydrologic_group: PyReadonlyArray2<f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let covariates = SoilCovariates {
        clay: clay.as_array().to_owned(),
        sand: sand.as_array().to_owned(),
        silt: silt.as_array().to_owned(),
        organic_matter: organic_matter.as_array().to_owned(),
        bulk_density: bulk_density.as_array().to_owned(),
        coarse_fragments: coarse_fragments.as_array().to_owned(),
        ksat: ksat.as_array().to_owned(),
        hydrologic_group: hydrologic_group.as_array().to_owned(),
        valid: None,
    };
    let result = SoilErodibilityModel::standard().compute(&covariates).map_err(to_py_err)?;
    Ok(unmasked(&result.k_factor).into_pyarray(py))
}

/// (slope, aspect) in degrees from a DEM
#[pyfunction]
fn slope_aspect<'py>(
    py: Python<'py>,
    dem: PyReadonlyArray2<f32>,
    pixel_size: f64,
) -> PyResult<(&'py PyArray2<f32>, &'py PyArray2<f32>)> {
    let result = TerrainFactorModel::standard()
        .slope_aspect(&band("elevation", &dem), pixel_size)
        .map_err(to_py_err)?;
    Ok((unmasked(&result.slope).into_pyarray(py), unmasked(&result.aspect).into_pyarray(py)))
}

/// LS factor from slope, aspect (degrees) and contributing area (m2)
#[pyfunction]
fn ls_factor<'py>(
    py: Python<'py>,
    slope: PyReadonlyArray2<f32>,
    aspect: PyReadonlyArray2<f32>,
    contributing_area: PyReadonlyArray2<f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let ls = TerrainFactorModel::standard()
        .compute_ls(&band("slope", &slope), &band("aspect", &aspect), &band("area", &contributing_area))
        .map_err(to_py_err)?;
    Ok(unmasked(&ls).into_pyarray(py))
}

/// Hazard R x K x LS x S
#[pyfunction]
fn erosion_hazard<'py>(
    py: Python<'py>,
    rainfall_erosivity: PyReadonlyArray2<f32>,
    k: PyReadonlyArray2<f32>,
    ls: PyReadonlyArray2<f32>,
    s: PyReadonlyArray2<f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let hazard = ErosionHazardModel::new()
        .compute(&band("R", &rainfall_erosivity), &band("K", &k), &band("LS", &ls), &band("S", &s))
        .map_err(to_py_err)?;
    Ok(unmasked(&hazard).into_pyarray(py))
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(k_factor, m)?)?;
    m.add_function(wrap_pyfunction!(slope_aspect, m)?)?;
    m.add_function(wrap_pyfunction!(ls_factor, m)?)?;
    m.add_function(wrap_pyfunction!(erosion_hazard, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("model_constants_version", crate::constants::MODEL_CONSTANTS_VERSION)?;
    Ok(())
}
