//! Scalar and array reductions of output rasters: bare-soil area breakdown,
//! automatic histograms and zonal means.

use crate::types::{check_dim, Band, ErosionError, ErosionResult, ValidityMask};
use serde::{Deserialize, Serialize};

/// Region area split by bare-soil frequency (km2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaBreakdown {
    pub total_km2: f64,
    /// Never observed bare, or excluded from observation
    pub never_bare_km2: f64,
    /// Bare on some observations but below the permanent threshold
    pub bare_km2: f64,
    pub permanently_bare_km2: f64,
}

impl AreaBreakdown {
    /// Shares from pixel counts, scaled to the true region area.
    ///
    /// `region` selects the pixels inside the region (all pixels when `None`).
    pub fn compute(
        frequency: &Band,
        region: Option<&ValidityMask>,
        true_area_km2: f64,
        permanently_bare: f32,
    ) -> ErosionResult<Self> {
        if let Some(mask) = region {
            check_dim(frequency.dim(), mask.dim())?;
        }
        if !(true_area_km2 >= 0.0) {
            return Err(ErosionError::Domain(format!("Region area {} km2 is not a valid area", true_area_km2)));
        }

        let mut total = 0usize;
        let mut bare = 0usize;
        let mut permanent = 0usize;
        for ((i, j), _) in frequency.data.indexed_iter() {
            if !region.map_or(true, |m| m[[i, j]]) {
                continue;
            }
            total += 1;
            match frequency.get(i, j) {
                Some(f) if f >= permanently_bare => permanent += 1,
                Some(f) if f > 0.0 => bare += 1,
                _ => {}
            }
        }
        if total == 0 {
            return Err(ErosionError::Domain("Region contains no pixels; area shares are undefined".to_string()));
        }

        let bare_km2 = true_area_km2 * bare as f64 / total as f64;
        let permanently_bare_km2 = true_area_km2 * permanent as f64 / total as f64;
        log::debug!("Area breakdown over {} pixels: {} bare, {} permanently bare", total, bare, permanent);
        Ok(Self {
            total_km2: true_area_km2,
            never_bare_km2: true_area_km2 - bare_km2 - permanently_bare_km2,
            bare_km2,
            permanently_bare_km2,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    pub max_buckets: usize,
    /// When set, bucket width is this value times a power of two
    pub min_bucket_width: Option<f64>,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self { max_buckets: 255, min_bucket_width: None }
    }
}

/// Fixed-width histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bucket_min: f64,
    pub bucket_width: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Histogram of the valid pixels of `band` inside `region`
    pub fn compute(band: &Band, region: Option<&ValidityMask>, params: &HistogramParams) -> ErosionResult<Self> {
        if params.max_buckets == 0 {
            return Err(ErosionError::InvalidInput("Histogram needs at least one bucket".to_string()));
        }
        let values = zone_values(band, region)?;
        if values.is_empty() {
            return Ok(Self { bucket_min: 0.0, bucket_width: 0.0, counts: Vec::new() });
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let (bucket_min, width) = match params.min_bucket_width {
            Some(min_width) if min_width > 0.0 => {
                let mut width = min_width;
                while range / width >= params.max_buckets as f64 {
                    width *= 2.0;
                }
                ((min / width).floor() * width, width)
            }
            Some(_) => {
                return Err(ErosionError::InvalidInput("Minimum bucket width must be positive".to_string()));
            }
            None if range > 0.0 => (min, range / params.max_buckets as f64),
            None => (min, 1.0),
        };

        let buckets = (((max - bucket_min) / width).floor() as usize + 1).min(params.max_buckets.max(1));
        let mut counts = vec![0u64; buckets];
        for v in values {
            let idx = (((v - bucket_min) / width).floor() as usize).min(buckets - 1);
            counts[idx] += 1;
        }
        Ok(Self { bucket_min, bucket_width: width, counts })
    }

    /// (bucket start, count) pairs
    pub fn pairs(&self) -> Vec<(f64, u64)> {
        self.counts
            .iter()
            .enumerate()
            .map(|(k, &n)| (self.bucket_min + k as f64 * self.bucket_width, n))
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Mean of the valid pixels inside `region`; `None` when there are none
pub fn zonal_mean(band: &Band, region: Option<&ValidityMask>) -> ErosionResult<Option<f64>> {
    let values = zone_values(band, region)?;
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
}

fn zone_values(band: &Band, region: Option<&ValidityMask>) -> ErosionResult<Vec<f64>> {
    if let Some(mask) = region {
        check_dim(band.dim(), mask.dim())?;
    }
    let (rows, cols) = band.dim();
    let mut values = Vec::new();
    for i in 0..rows {
        for j in 0..cols {
            if !region.map_or(true, |m| m[[i, j]]) {
                continue;
            }
            if let Some(v) = band.get(i, j) {
                values.push(v as f64);
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_area_breakdown() {
        let mut values = Array2::from_elem((2, 5), Some(0.5f32));
        values[[0, 0]] = Some(0.0);
        values[[0, 1]] = Some(0.97);
        values[[0, 2]] = None;
        let freq = Band::from_options("bare_soil_frequency", &values);
        let areas = AreaBreakdown::compute(&freq, None, 100.0, 0.95).unwrap();
        assert_relative_eq!(areas.bare_km2, 70.0);
        assert_relative_eq!(areas.permanently_bare_km2, 10.0);
        assert_relative_eq!(areas.never_bare_km2, 20.0);
    }

    #[test]
    fn test_empty_region_is_domain_error() {
        let freq = Band::new("f", Array2::from_elem((2, 2), 0.5));
        let region = Array2::from_elem((2, 2), false);
        assert!(matches!(
            AreaBreakdown::compute(&freq, Some(&region), 10.0, 0.95),
            Err(ErosionError::Domain(_))
        ));
    }

    #[test]
    fn test_histogram_with_min_bucket_width() {
        let band = Band::new("f", Array2::from_shape_vec((1, 5), vec![0.0, 10.0, 20.0, 55.0, 100.0]).unwrap());
        let params = HistogramParams { max_buckets: 10, min_bucket_width: Some(5.0) };
        let hist = Histogram::compute(&band, None, &params).unwrap();
        // 5 -> 10 -> 20: 100 / 20 = 5 buckets < 10
        assert_eq!(hist.bucket_width, 20.0);
        assert_eq!(hist.total(), 5);
        assert_eq!(hist.counts.len(), 6);
        assert_eq!(hist.pairs()[2], (40.0, 1));
    }

    #[test]
    fn test_histogram_auto_width() {
        let band = Band::new("f", Array2::from_shape_vec((1, 4), vec![0.0, 1.0, 2.0, 4.0]).unwrap());
        let params = HistogramParams { max_buckets: 4, min_bucket_width: None };
        let hist = Histogram::compute(&band, None, &params).unwrap();
        assert_eq!(hist.counts, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_zonal_mean() {
        let band = Band::new("slope", Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, f32::NAN]).unwrap());
        let zone = Array2::from_shape_vec((2, 2), vec![true, true, false, true]).unwrap();
        assert_eq!(zonal_mean(&band, Some(&zone)).unwrap(), Some(1.5));
        assert_eq!(zonal_mean(&band, None).unwrap(), Some(2.0));
        let empty = Array2::from_elem((2, 2), false);
        assert_eq!(zonal_mean(&band, Some(&empty)).unwrap(), None);
    }
}
