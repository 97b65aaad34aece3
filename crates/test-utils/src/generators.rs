//! Synthetic raster generators.
//!
//! These generators create predictable, verifiable pixel patterns that can
//! be used to check tile placement after a merge.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a pixel-interleaved grid where every sample equals `value`.
pub fn create_constant_grid(width: usize, height: usize, bands: usize, value: f32) -> Vec<f32> {
    vec![value; width * height * bands]
}

/// Creates a single-band grid filled with `value`, surrounded by a
/// `border`-pixel frame of `nodata`.
///
/// Useful to check that merges treat no-data as transparent.
pub fn create_framed_grid(width: usize, height: usize, border: usize, value: f32, nodata: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let on_frame = row < border
                || col < border
                || row + border >= height
                || col + border >= width;
            data.push(if on_frame { nodata } else { value });
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(4, 3);
        assert_eq!(grid.len(), 12);
        assert_eq!(grid[4 + 2], 2001.0);
    }

    #[test]
    fn test_create_framed_grid() {
        let grid = create_framed_grid(5, 4, 1, 7.0, 0.0);
        assert_eq!(grid.len(), 20);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[5 + 1], 7.0);
        assert_eq!(grid[19], 0.0);
        assert_eq!(grid.iter().filter(|v| **v == 7.0).count(), 6);
    }
}
