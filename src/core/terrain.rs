use crate::constants::terrain as c;
use crate::core::tiling::map_pixels;
use crate::types::{check_dim, Band, ErosionError, ErosionResult};
use serde::{Deserialize, Serialize};

/// Parameters for the slope length and steepness computation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LsParams {
    /// Contributing areas above this (m2) are treated as channelised flow and clamped
    pub max_contributing_area_m2: f32,
    /// Cell size (m) of the grid the contributing area refers to
    pub cell_size_m: f32,
}

impl Default for LsParams {
    fn default() -> Self {
        Self {
            max_contributing_area_m2: c::MAX_CONTRIBUTING_AREA_M2,
            cell_size_m: c::DEFAULT_CELL_SIZE_M,
        }
    }
}

/// Slope and aspect derived from a DEM
#[derive(Debug, Clone)]
pub struct SlopeAspect {
    /// Degrees
    pub slope: Band,
    /// Compass degrees of the downslope direction, [0, 360)
    pub aspect: Band,
}

/// Terrain factors
#[derive(Debug, Clone)]
pub struct TerrainFactors {
    pub slope_aspect: SlopeAspect,
    pub ls: Band,
}

/// Flow path multiplier for an aspect: 1 for cardinal octants, sqrt(2) for diagonal ones
pub fn slope_direction(aspect_deg: f32) -> ErosionResult<f32> {
    if !(0.0..=360.0).contains(&aspect_deg) {
        return Err(ErosionError::Domain(format!("Aspect {} outside [0, 360]", aspect_deg)));
    }
    for (lower, upper, diagonal) in c::ASPECT_BINS {
        if aspect_deg > lower && aspect_deg <= upper {
            return Ok(if diagonal { std::f32::consts::SQRT_2 } else { 1.0 });
        }
    }
    // [0, 22.5] is north
    Ok(1.0)
}

/// Slope steepness factor S
pub fn steepness(slope_rad: f32) -> f32 {
    if slope_rad.tan() < c::STEEPNESS_TAN_THRESHOLD {
        c::MILD_S.0 * slope_rad.sin() + c::MILD_S.1
    } else {
        c::STEEP_S.0 * slope_rad.sin() + c::STEEP_S.1
    }
}

/// Slope length factor L (Desmet & Govers)
pub fn slope_length(slope_rad: f32, direction: f32, contributing_area: f32, cell_size: f32) -> f32 {
    let sin = slope_rad.sin();
    let beta = (sin / (c::BETA_DIVISOR * 3.0 * (sin.powf(c::BETA_SLOPE_EXPONENT) + c::BETA_OFFSET))).abs();
    let m = beta / (beta + 1.0);
    let ratio = 2.0 * contributing_area / (2.0 * cell_size * direction * c::UNIT_PLOT_LENGTH_M);
    ratio.powf(m) * (m + 1.0)
}

/// Convert upstream drainage area (km2, coarse grid) to m2 per fine cell
pub fn contributing_area_from_upstream_km2(upstream_km2: &Band, fine_cells_per_coarse_cell: f32) -> ErosionResult<Band> {
    if fine_cells_per_coarse_cell <= 0.0 {
        return Err(ErosionError::InvalidInput("Cell ratio must be positive".to_string()));
    }
    let data = upstream_km2.data.mapv(|v| v * 1_000_000.0 / fine_cells_per_coarse_cell);
    Ok(Band {
        name: "contributing_area".to_string(),
        band_type: upstream_km2.band_type,
        data,
        mask: upstream_km2.mask.clone(),
    })
}

/// Terrain (LS) factor model
pub struct TerrainFactorModel {
    params: LsParams,
}

impl TerrainFactorModel {
    pub fn new(params: LsParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(LsParams::default())
    }

    /// Slope and aspect from central differences over the 4-neighbourhood.
    ///
    /// Border pixels take the gradient of their nearest interior cell.
    pub fn slope_aspect(&self, dem: &Band, pixel_size: f64) -> ErosionResult<SlopeAspect> {
        let (rows, cols) = dem.dim();
        if rows < 3 || cols < 3 {
            return Err(ErosionError::InvalidInput(format!(
                "DEM of {}x{} is too small for slope computation",
                rows, cols
            )));
        }
        if pixel_size <= 0.0 {
            return Err(ErosionError::InvalidInput("Pixel size must be positive".to_string()));
        }
        log::debug!("Computing slope and aspect from {}x{} DEM at {} m", rows, cols, pixel_size);

        let spacing = pixel_size as f32;
        let pixels = map_pixels((rows, cols), |i, j| {
            let (i, j) = (i.clamp(1, rows - 2), j.clamp(1, cols - 2));
            dem.get(i, j)?;
            let east = dem.get(i, j + 1)?;
            let west = dem.get(i, j - 1)?;
            let north = dem.get(i - 1, j)?;
            let south = dem.get(i + 1, j)?;

            let dz_dx = (east - west) / (2.0 * spacing);
            let dz_dy = (north - south) / (2.0 * spacing);
            let slope = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
            let aspect = if slope == 0.0 {
                0.0
            } else {
                let a = (-dz_dx).atan2(-dz_dy).to_degrees();
                if a < 0.0 { a + 360.0 } else { a }
            };
            Some((slope, aspect))
        });

        Ok(SlopeAspect {
            slope: Band::from_options("slope", &pixels.mapv(|p| p.map(|(s, _)| s))),
            aspect: Band::from_options("aspect", &pixels.mapv(|p| p.map(|(_, a)| a))),
        })
    }

    /// LS factor from slope (degrees), aspect (degrees) and contributing area (m2)
    /// on a grid of `cell_size_m`
    pub fn compute_ls(&self, slope_deg: &Band, aspect_deg: &Band, contributing_area: &Band) -> ErosionResult<Band> {
        self.ls_on_grid(slope_deg, aspect_deg, contributing_area, self.params.cell_size_m)
    }

    /// Slope, aspect and LS from a DEM. The contributing area is on the DEM
    /// grid, so `pixel_size` is also the cell length of the L term.
    pub fn compute_from_dem(&self, dem: &Band, pixel_size: f64, contributing_area: &Band) -> ErosionResult<TerrainFactors> {
        let slope_aspect = self.slope_aspect(dem, pixel_size)?;
        let cell_size = pixel_size as f32;
        if cell_size != self.params.cell_size_m {
            log::debug!(
                "Using the DEM pixel size {} m instead of the configured cell size {} m for LS",
                cell_size,
                self.params.cell_size_m
            );
        }
        let ls = self.ls_on_grid(&slope_aspect.slope, &slope_aspect.aspect, contributing_area, cell_size)?;
        Ok(TerrainFactors { slope_aspect, ls })
    }

    fn ls_on_grid(&self, slope_deg: &Band, aspect_deg: &Band, contributing_area: &Band, cell_size: f32) -> ErosionResult<Band> {
        if !(cell_size > 0.0) {
            return Err(ErosionError::InvalidInput(format!("Cell size {} must be positive", cell_size)));
        }
        let dim = slope_deg.dim();
        check_dim(dim, aspect_deg.dim())?;
        check_dim(dim, contributing_area.dim())?;
        self.validate(slope_deg, aspect_deg, contributing_area)?;

        log::info!("Computing LS factor over {}x{} pixels of {} m", dim.0, dim.1, cell_size);
        let max_area = self.params.max_contributing_area_m2;

        let values = map_pixels(dim, |i, j| {
            let slope = slope_deg.get(i, j)?.to_radians();
            let aspect = aspect_deg.get(i, j)?;
            let area = contributing_area.get(i, j)?.min(max_area);
            let direction = slope_direction(aspect).ok()?;
            Some(slope_length(slope, direction, area, cell_size) * steepness(slope))
        });
        Ok(Band::from_options("LS", &values))
    }

    fn validate(&self, slope_deg: &Band, aspect_deg: &Band, contributing_area: &Band) -> ErosionResult<()> {
        let (rows, cols) = slope_deg.dim();
        for i in 0..rows {
            for j in 0..cols {
                if let Some(s) = slope_deg.get(i, j) {
                    if !(0.0..=90.0).contains(&s) {
                        return Err(ErosionError::Domain(format!("Slope {} at ({}, {}) outside [0, 90]", s, i, j)));
                    }
                }
                if let Some(a) = aspect_deg.get(i, j) {
                    slope_direction(a)?;
                }
                if let Some(area) = contributing_area.get(i, j) {
                    if area < 0.0 {
                        return Err(ErosionError::Domain(format!("Negative contributing area at ({}, {})", i, j)));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_dem_gives_minimum_ls() {
        let model = TerrainFactorModel::standard();
        let dem = Band::new("dem", Array2::from_elem((6, 6), 1500.0));
        for area in [0.0f32, 900.0, 6000.0] {
            let factors = model
                .compute_from_dem(&dem, 30.0, &Band::new("upa", Array2::from_elem((6, 6), area)))
                .unwrap();
            for v in factors.ls.data.iter() {
                assert_relative_eq!(*v, 0.03, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_slope_and_aspect_of_ramp() {
        // Elevation rises to the north by 3 m per 30 m row: downslope faces south
        let dem = Band::new("dem", Array2::from_shape_fn((5, 5), |(i, _)| 100.0 - 3.0 * i as f32));
        let sa = TerrainFactorModel::standard().slope_aspect(&dem, 30.0).unwrap();
        let expected = (0.1f32).atan().to_degrees();
        assert_relative_eq!(sa.slope.get(2, 2).unwrap(), expected, epsilon = 1e-4);
        assert_relative_eq!(sa.aspect.get(2, 2).unwrap(), 180.0, epsilon = 1e-3);
        assert_relative_eq!(sa.slope.get(0, 0).unwrap(), expected, epsilon = 1e-4);
    }

    #[test]
    fn test_border_takes_nearest_interior_gradient() {
        let dem = Band::new("dem", Array2::from_shape_fn((5, 6), |(i, j)| (i * i) as f32 + 2.0 * (j * j) as f32));
        let sa = TerrainFactorModel::standard().slope_aspect(&dem, 10.0).unwrap();
        assert_eq!(sa.slope.valid_count(), 30);
        for (edge, interior) in [((0, 3), (1, 3)), ((4, 2), (3, 2)), ((2, 0), (2, 1)), ((2, 5), (2, 4)), ((0, 0), (1, 1)), ((4, 5), (3, 4))] {
            assert_eq!(sa.slope.get(edge.0, edge.1), sa.slope.get(interior.0, interior.1), "{:?}", edge);
            assert_eq!(sa.aspect.get(edge.0, edge.1), sa.aspect.get(interior.0, interior.1), "{:?}", edge);
        }
        assert_ne!(sa.slope.get(1, 1), sa.slope.get(3, 4));
    }

    #[test]
    fn test_ls_from_dem_uses_dem_pixel_size() {
        let dem = Band::new("dem", Array2::from_shape_fn((5, 5), |(i, _)| 100.0 - 1.5 * i as f32));
        let area = Band::new("upa", Array2::from_elem((5, 5), 600.0));
        let configured = TerrainFactorModel::standard();
        let factors = configured.compute_from_dem(&dem, 10.0, &area).unwrap();

        let at_ten = TerrainFactorModel::new(LsParams { cell_size_m: 10.0, ..LsParams::default() });
        let expected = at_ten
            .compute_ls(&factors.slope_aspect.slope, &factors.slope_aspect.aspect, &area)
            .unwrap();
        let at_thirty = configured
            .compute_ls(&factors.slope_aspect.slope, &factors.slope_aspect.aspect, &area)
            .unwrap();
        assert_eq!(factors.ls.data, expected.data);
        assert!(factors.ls.data[[2, 2]] > at_thirty.data[[2, 2]]);
    }

    #[test]
    fn test_aspect_east_facing() {
        // Falls toward the east
        let dem = Band::new("dem", Array2::from_shape_fn((5, 5), |(_, j)| 100.0 - 2.0 * j as f32));
        let sa = TerrainFactorModel::standard().slope_aspect(&dem, 10.0).unwrap();
        assert_relative_eq!(sa.aspect.get(2, 2).unwrap(), 90.0, epsilon = 1e-3);
    }

    #[test]
    fn test_slope_direction_bins() {
        assert_eq!(slope_direction(0.0).unwrap(), 1.0);
        assert_eq!(slope_direction(45.0).unwrap(), std::f32::consts::SQRT_2);
        assert_eq!(slope_direction(90.0).unwrap(), 1.0);
        assert_eq!(slope_direction(135.0).unwrap(), std::f32::consts::SQRT_2);
        assert_eq!(slope_direction(350.0).unwrap(), 1.0);
        assert!(slope_direction(-1.0).is_err());
    }

    #[test]
    fn test_steepness_branches() {
        assert_relative_eq!(steepness(0.0), 0.03);
        let steep = 20.0f32.to_radians();
        assert_relative_eq!(steepness(steep), 16.8 * steep.sin() - 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_contributing_area_clamped() {
        let model = TerrainFactorModel::standard();
        let slope = Band::new("slope", Array2::from_elem((2, 2), 8.0));
        let aspect = Band::new("aspect", Array2::from_elem((2, 2), 180.0));
        let at_limit = model.compute_ls(&slope, &aspect, &Band::new("a", Array2::from_elem((2, 2), 4000.0))).unwrap();
        let above = model.compute_ls(&slope, &aspect, &Band::new("a", Array2::from_elem((2, 2), 90_000.0))).unwrap();
        assert_eq!(at_limit.data, above.data);
        let below = model.compute_ls(&slope, &aspect, &Band::new("a", Array2::from_elem((2, 2), 100.0))).unwrap();
        assert!(below.data[[0, 0]] < at_limit.data[[0, 0]]);
    }

    #[test]
    fn test_upstream_area_conversion() {
        let upa = Band::new("upa", Array2::from_elem((1, 1), 0.009));
        let area = contributing_area_from_upstream_km2(&upa, 9.0).unwrap();
        assert_relative_eq!(area.data[[0, 0]], 1000.0, epsilon = 1e-2);
    }

    #[test]
    fn test_invalid_slope_rejected() {
        let model = TerrainFactorModel::standard();
        let slope = Band::new("slope", Array2::from_elem((2, 2), 95.0));
        let aspect = Band::new("aspect", Array2::from_elem((2, 2), 0.0));
        let area = Band::new("area", Array2::from_elem((2, 2), 10.0));
        assert!(matches!(model.compute_ls(&slope, &aspect, &area), Err(ErosionError::Domain(_))));
    }
}
