use crate::core::tiling::map_pixels;
use crate::types::{check_dim, Band, BandType, ErosionError, ErosionResult, Raster};

/// Band rescaled from digital numbers to [0, 1] reflectance.
///
/// Negative valid reflectance is a data-quality problem and fails the call.
pub fn reflectance(raster: &Raster, name: &str, scale: f32) -> ErosionResult<Band> {
    if scale <= 0.0 {
        return Err(ErosionError::InvalidInput(format!("Reflectance scale {} must be positive", scale)));
    }
    let band = raster.band(name)?;
    let (rows, cols) = band.dim();
    for i in 0..rows {
        for j in 0..cols {
            if let Some(v) = band.get(i, j) {
                if v < 0.0 {
                    return Err(ErosionError::Domain(format!(
                        "Negative reflectance {} in band {} at ({}, {})",
                        v, name, i, j
                    )));
                }
            }
        }
    }
    Ok(Band {
        name: band.name.clone(),
        band_type: BandType::Float32,
        data: band.data.mapv(|v| v / scale),
        mask: band.mask.clone(),
    })
}

/// (a - b) / (a + b); a zero denominator gives a masked pixel
pub fn normalized_difference(a: &Band, b: &Band, name: &str) -> ErosionResult<Band> {
    check_dim(a.dim(), b.dim())?;
    let values = map_pixels(a.dim(), |i, j| {
        let (x, y) = (a.get(i, j)?, b.get(i, j)?);
        let sum = x + y;
        if sum == 0.0 {
            None
        } else {
            Some((x - y) / sum)
        }
    });
    Ok(Band::from_options(name, &values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform, GridSpec};
    use ndarray::Array2;

    fn raster(b8: f32, b4: f32) -> Raster {
        let grid = GridSpec::new(2, 2, GeoTransform::north_up(0.0, 0.0, 10.0), CoordinateSystem::Geographic);
        Raster::new(grid)
            .with_band(Band::new("B8", Array2::from_elem((2, 2), b8)))
            .unwrap()
            .with_band(Band::new("B4", Array2::from_elem((2, 2), b4)))
            .unwrap()
    }

    #[test]
    fn test_ndvi() {
        let r = raster(3000.0, 1000.0);
        let nir = reflectance(&r, "B8", 1e4).unwrap();
        let red = reflectance(&r, "B4", 1e4).unwrap();
        let ndvi = normalized_difference(&nir, &red, "ndvi").unwrap();
        approx::assert_relative_eq!(ndvi.get(0, 0).unwrap(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_denominator_masked() {
        let r = raster(0.0, 0.0);
        let ndvi = normalized_difference(r.band("B8").unwrap(), r.band("B4").unwrap(), "ndvi").unwrap();
        assert_eq!(ndvi.valid_count(), 0);
    }

    #[test]
    fn test_negative_reflectance_is_domain_error() {
        let r = raster(-5.0, 100.0);
        assert!(matches!(reflectance(&r, "B8", 1e4), Err(ErosionError::Domain(_))));
    }
}
