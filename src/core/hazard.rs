use crate::core::tiling::map_pixels;
use crate::types::{check_dim, Band, ErosionResult};

pub const HAZARD_BAND: &str = "soil_erosion_hazard";

/// RUSLE hazard A = R * K * LS * S
#[derive(Debug, Default)]
pub struct ErosionHazardModel;

impl ErosionHazardModel {
    pub fn new() -> Self {
        Self
    }

    /// Pixel-wise product; a pixel is valid only where all four factors are
    pub fn compute(&self, rainfall_erosivity: &Band, k: &Band, ls: &Band, s: &Band) -> ErosionResult<Band> {
        let dim = rainfall_erosivity.dim();
        check_dim(dim, k.dim())?;
        check_dim(dim, ls.dim())?;
        check_dim(dim, s.dim())?;

        let values = map_pixels(dim, |i, j| {
            Some(rainfall_erosivity.get(i, j)? * k.get(i, j)? * ls.get(i, j)? * s.get(i, j)?)
        });
        let hazard = Band::from_options(HAZARD_BAND, &values);
        log::info!("Erosion hazard defined on {} of {} pixels", hazard.valid_count(), dim.0 * dim.1);
        Ok(hazard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_product_and_mask_propagation() {
        let r = Band::new("R", Array2::from_elem((2, 2), 500.0));
        let k = Band::new("K", Array2::from_elem((2, 2), 0.02));
        let ls = Band::new("LS", Array2::from_elem((2, 2), 1.5));
        let mut s_values = Array2::from_elem((2, 2), Some(0.4f32));
        s_values[[1, 0]] = None;
        let s = Band::from_options("S", &s_values);

        let a = ErosionHazardModel::new().compute(&r, &k, &ls, &s).unwrap();
        approx::assert_relative_eq!(a.get(0, 0).unwrap(), 6.0, epsilon = 1e-4);
        assert_eq!(a.get(1, 0), None);
        assert_eq!(a.valid_count(), 3);
    }

    #[test]
    fn test_shape_mismatch() {
        let r = Band::new("R", Array2::zeros((2, 2)));
        let k = Band::new("K", Array2::zeros((3, 2)));
        assert!(ErosionHazardModel::new().compute(&r, &k, &r, &r).is_err());
    }
}
