use crate::types::{ErosionError, ErosionResult};
use ndarray::{s, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Tile partitioning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileScheme {
    /// Tile edge length in pixels
    pub tile_size: usize,
}

impl Default for TileScheme {
    fn default() -> Self {
        Self { tile_size: 512 }
    }
}

/// Rectangular block of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row0: usize,
    pub col0: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Tile {
    /// Grow the tile by `halo` pixels on every side, clipped to the grid
    pub fn with_halo(&self, halo: usize, dim: (usize, usize)) -> Tile {
        let row0 = self.row0.saturating_sub(halo);
        let col0 = self.col0.saturating_sub(halo);
        let row1 = (self.row0 + self.rows + halo).min(dim.0);
        let col1 = (self.col0 + self.cols + halo).min(dim.1);
        Tile { row0, col0, rows: row1 - row0, cols: col1 - col0 }
    }
}

impl TileScheme {
    pub fn new(tile_size: usize) -> ErosionResult<Self> {
        if tile_size == 0 {
            return Err(ErosionError::Config("Tile size must be positive".to_string()));
        }
        Ok(Self { tile_size })
    }

    pub fn tiles(&self, dim: (usize, usize)) -> Vec<Tile> {
        let size = self.tile_size.max(1);
        let (rows, cols) = dim;
        let mut tiles = Vec::new();
        for row0 in (0..rows).step_by(size) {
            for col0 in (0..cols).step_by(size) {
                tiles.push(Tile {
                    row0,
                    col0,
                    rows: size.min(rows - row0),
                    cols: size.min(cols - col0),
                });
            }
        }
        tiles
    }

    /// Run a focal operation tile by tile.
    ///
    /// `f` receives the tile grown by `halo` pixels and must return an array of the
    /// same shape; only the tile core is kept. The output is only assembled once
    /// every tile has succeeded.
    pub fn map_focal<T, U, F>(&self, input: &Array2<T>, halo: usize, f: F) -> ErosionResult<Array2<U>>
    where
        T: Sync,
        U: Clone + Default + Send,
        F: Fn(ArrayView2<T>) -> ErosionResult<Array2<U>> + Sync,
    {
        let dim = input.dim();
        let tiles = self.tiles(dim);
        log::debug!("Focal operation over {} tiles (halo {})", tiles.len(), halo);

        let run = |tile: &Tile| -> ErosionResult<(Tile, Array2<U>)> {
            let window = tile.with_halo(halo, dim);
            let view = input.slice(s![
                window.row0..window.row0 + window.rows,
                window.col0..window.col0 + window.cols
            ]);
            let result = f(view)?;
            if result.dim() != (window.rows, window.cols) {
                return Err(ErosionError::ShapeMismatch {
                    expected: (window.rows, window.cols),
                    found: result.dim(),
                });
            }
            let r0 = tile.row0 - window.row0;
            let c0 = tile.col0 - window.col0;
            let core = result.slice(s![r0..r0 + tile.rows, c0..c0 + tile.cols]).to_owned();
            Ok((*tile, core))
        };

        #[cfg(feature = "parallel")]
        let blocks = {
            use rayon::prelude::*;
            tiles.par_iter().map(run).collect::<ErosionResult<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let blocks = tiles.iter().map(run).collect::<ErosionResult<Vec<_>>>()?;

        let mut output = Array2::<U>::default(dim);
        for (tile, block) in blocks {
            output
                .slice_mut(s![tile.row0..tile.row0 + tile.rows, tile.col0..tile.col0 + tile.cols])
                .assign(&block);
        }
        Ok(output)
    }
}

/// Evaluate `f` at every pixel of a grid
pub fn map_pixels<T, F>(dim: (usize, usize), f: F) -> Array2<T>
where
    T: Clone + Default + Send,
    F: Fn(usize, usize) -> T + Sync + Send,
{
    let mut output = Array2::<T>::default(dim);

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut output).par_for_each(|(i, j), value| *value = f(i, j));

    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut output).for_each(|(i, j), value| *value = f(i, j));

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_cover_grid_exactly() {
        let scheme = TileScheme::new(4).unwrap();
        let tiles = scheme.tiles((10, 7));
        assert_eq!(tiles.len(), 3 * 2);
        let covered: usize = tiles.iter().map(|t| t.rows * t.cols).sum();
        assert_eq!(covered, 70);
    }

    #[test]
    fn test_halo_clipped_at_edges() {
        let tile = Tile { row0: 0, col0: 4, rows: 4, cols: 3 };
        let grown = tile.with_halo(2, (10, 7));
        assert_eq!(grown, Tile { row0: 0, col0: 2, rows: 6, cols: 5 });
    }

    #[test]
    fn test_map_focal_matches_untiled() {
        let input = Array2::from_shape_fn((13, 11), |(i, j)| (i * 31 + j * 7) as f32);
        // 3x3 box sum, edges ignored
        let box_sum = |view: ArrayView2<f32>| -> ErosionResult<Array2<f32>> {
            let (rows, cols) = view.dim();
            Ok(Array2::from_shape_fn((rows, cols), |(i, j)| {
                let mut sum = 0.0;
                for di in -1i64..=1 {
                    for dj in -1i64..=1 {
                        let (ii, jj) = (i as i64 + di, j as i64 + dj);
                        if ii >= 0 && jj >= 0 && (ii as usize) < rows && (jj as usize) < cols {
                            sum += view[[ii as usize, jj as usize]];
                        }
                    }
                }
                sum
            }))
        };
        let whole = box_sum(input.view()).unwrap();
        let tiled = TileScheme::new(4).unwrap().map_focal(&input, 1, box_sum).unwrap();
        assert_eq!(whole, tiled);
    }

    #[test]
    fn test_map_focal_fails_whole_region() {
        let input = Array2::<f32>::zeros((8, 8));
        let result: ErosionResult<Array2<f32>> = TileScheme::new(4)
            .unwrap()
            .map_focal(&input, 0, |_| Err(ErosionError::Processing("tile failed".to_string())));
        assert!(result.is_err());
    }

    #[test]
    fn test_map_pixels() {
        let out = map_pixels((3, 4), |i, j| i * 10 + j);
        assert_eq!(out[[2, 3]], 23);
    }
}
