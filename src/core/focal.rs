//! Neighbourhood operations on grids: Sobel edges, binary morphology,
//! directional cloud projection and block resampling.

use crate::types::{ErosionError, ErosionResult};
use ndarray::{Array2, ArrayView2};

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// |Sobel_x| + |Sobel_y| with replicated borders.
///
/// Invalid neighbours are replaced by the centre value; an invalid centre yields `None`.
pub fn sobel_magnitude(values: ArrayView2<f32>, valid: ArrayView2<bool>) -> Array2<Option<f32>> {
    let (rows, cols) = values.dim();
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        if !valid[[i, j]] {
            return None;
        }
        let centre = values[[i, j]];
        let mut gx = 0.0f32;
        let mut gy = 0.0f32;
        for (ki, di) in (-1i64..=1).enumerate() {
            for (kj, dj) in (-1i64..=1).enumerate() {
                let ii = (i as i64 + di).clamp(0, rows as i64 - 1) as usize;
                let jj = (j as i64 + dj).clamp(0, cols as i64 - 1) as usize;
                let v = if valid[[ii, jj]] { values[[ii, jj]] } else { centre };
                gx += SOBEL_X[ki][kj] * v;
                gy += SOBEL_Y[ki][kj] * v;
            }
        }
        Some(gx.abs() + gy.abs())
    })
}

/// Offsets of a circular structuring element of radius `radius` pixels
pub fn disk_offsets(radius: f64) -> Vec<(i64, i64)> {
    let r = radius.max(0.0);
    let reach = r.floor() as i64;
    let mut offsets = Vec::new();
    for di in -reach..=reach {
        for dj in -reach..=reach {
            if ((di * di + dj * dj) as f64) <= r * r {
                offsets.push((di, dj));
            }
        }
    }
    offsets
}

/// Halo needed for a disk of `radius`
pub fn disk_halo(radius: f64) -> usize {
    radius.max(0.0).floor() as usize
}

/// Binary erosion (focal minimum). Neighbours outside the grid are ignored.
pub fn erode(mask: ArrayView2<bool>, radius: f64) -> Array2<bool> {
    let offsets = disk_offsets(radius);
    focal_reduce(mask, &offsets, true, |acc, v| acc && v)
}

/// Binary dilation (focal maximum). Neighbours outside the grid are ignored.
pub fn dilate(mask: ArrayView2<bool>, radius: f64) -> Array2<bool> {
    let offsets = disk_offsets(radius);
    focal_reduce(mask, &offsets, false, |acc, v| acc || v)
}

fn focal_reduce<F>(mask: ArrayView2<bool>, offsets: &[(i64, i64)], init: bool, op: F) -> Array2<bool>
where
    F: Fn(bool, bool) -> bool,
{
    let (rows, cols) = mask.dim();
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        let mut acc = init;
        for &(di, dj) in offsets {
            let ii = i as i64 + di;
            let jj = j as i64 + dj;
            if ii >= 0 && jj >= 0 && (ii as usize) < rows && (jj as usize) < cols {
                acc = op(acc, mask[[ii as usize, jj as usize]]);
            }
        }
        acc
    })
}

/// Cast source pixels along a compass direction.
///
/// Every pixel reachable from a source by stepping up to `max_distance` pixels in
/// direction `azimuth_deg` (0 = north/up, 90 = east/right) is marked, sources included.
pub fn directional_projection(sources: ArrayView2<bool>, azimuth_deg: f64, max_distance: usize) -> Array2<bool> {
    let (rows, cols) = sources.dim();
    let theta = azimuth_deg.to_radians();
    let d_row = -theta.cos();
    let d_col = theta.sin();

    let mut projected = Array2::from_elem((rows, cols), false);
    for ((i, j), &is_source) in sources.indexed_iter() {
        if !is_source {
            continue;
        }
        for step in 0..=max_distance {
            let ii = (i as f64 + d_row * step as f64).round() as i64;
            let jj = (j as f64 + d_col * step as f64).round() as i64;
            if ii < 0 || jj < 0 || ii as usize >= rows || jj as usize >= cols {
                break;
            }
            projected[[ii as usize, jj as usize]] = true;
        }
    }
    projected
}

/// Aggregate `factor` x `factor` blocks; a coarse pixel is set if any fine pixel is set
pub fn downsample_any(mask: ArrayView2<bool>, factor: usize) -> ErosionResult<Array2<bool>> {
    if factor == 0 {
        return Err(ErosionError::InvalidInput("Resampling factor must be positive".to_string()));
    }
    let (rows, cols) = mask.dim();
    let coarse_rows = (rows + factor - 1) / factor;
    let coarse_cols = (cols + factor - 1) / factor;
    let mut coarse = Array2::from_elem((coarse_rows, coarse_cols), false);
    for ((i, j), &v) in mask.indexed_iter() {
        if v {
            coarse[[i / factor, j / factor]] = true;
        }
    }
    Ok(coarse)
}

/// Nearest-neighbour upsampling of a coarse grid back to `dim`
pub fn upsample_nearest(coarse: ArrayView2<bool>, factor: usize, dim: (usize, usize)) -> ErosionResult<Array2<bool>> {
    if factor == 0 {
        return Err(ErosionError::InvalidInput("Resampling factor must be positive".to_string()));
    }
    let (coarse_rows, coarse_cols) = coarse.dim();
    if coarse_rows * factor < dim.0 || coarse_cols * factor < dim.1 {
        return Err(ErosionError::ShapeMismatch {
            expected: ((dim.0 + factor - 1) / factor, (dim.1 + factor - 1) / factor),
            found: coarse.dim(),
        });
    }
    Ok(Array2::from_shape_fn(dim, |(i, j)| coarse[[i / factor, j / factor]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sobel_flat_is_zero() {
        let values = Array2::from_elem((5, 5), 1200.0f32);
        let valid = Array2::from_elem((5, 5), true);
        let edges = sobel_magnitude(values.view(), valid.view());
        assert!(edges.iter().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn test_sobel_vertical_edge() {
        let values = Array2::from_shape_fn((5, 6), |(_, j)| if j < 3 { 0.0f32 } else { 1.0 });
        let valid = Array2::from_elem((5, 6), true);
        let edges = sobel_magnitude(values.view(), valid.view());
        assert_eq!(edges[[2, 2]], Some(4.0));
        assert_eq!(edges[[2, 3]], Some(4.0));
        assert_eq!(edges[[2, 0]], Some(0.0));
    }

    #[test]
    fn test_opening_removes_speck() {
        let mut mask = Array2::from_elem((9, 9), false);
        mask[[1, 1]] = true;
        for i in 3..9 {
            for j in 3..9 {
                mask[[i, j]] = true;
            }
        }
        let opened = dilate(erode(mask.view(), 1.0).view(), 1.0);
        assert!(!opened[[1, 1]]);
        assert!(opened[[5, 5]]);
    }

    #[test]
    fn test_disk_offsets() {
        assert_eq!(disk_offsets(0.5), vec![(0, 0)]);
        assert_eq!(disk_offsets(1.0).len(), 5);
        assert_eq!(disk_offsets(1.67).len(), 9);
    }

    #[test]
    fn test_directional_projection_north() {
        let mut sources = Array2::from_elem((8, 8), false);
        sources[[5, 4]] = true;
        let projected = directional_projection(sources.view(), 0.0, 3);
        assert!(projected[[5, 4]]);
        assert!(projected[[2, 4]]);
        assert!(!projected[[1, 4]]);
        assert!(!projected[[6, 4]]);
    }

    #[test]
    fn test_resample_roundtrip_dims() {
        let mut mask = Array2::from_elem((7, 5), false);
        mask[[6, 4]] = true;
        let coarse = downsample_any(mask.view(), 3).unwrap();
        assert_eq!(coarse.dim(), (3, 2));
        assert!(coarse[[2, 1]]);
        let fine = upsample_nearest(coarse.view(), 3, (7, 5)).unwrap();
        assert_eq!(fine.dim(), (7, 5));
        assert!(fine[[6, 3]]);
        assert!(!fine[[0, 0]]);
    }
}
