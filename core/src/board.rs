use crate::{Error, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Inner-corner grid dimensions and physical square size of the calibration
/// checkerboard. Immutable for the duration of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardGeometry {
    /// Inner corners along the board's x axis.
    pub cols: usize,
    /// Inner corners along the board's y axis.
    pub rows: usize,
    /// Physical square edge length in meters.
    pub square_size: f64,
}

impl BoardGeometry {
    pub fn new(cols: usize, rows: usize, square_size: f64) -> Result<Self> {
        if cols < 3 || rows < 3 {
            return Err(Error::InvalidParameters(format!(
                "board needs at least 3x3 inner corners, got {cols}x{rows}"
            )));
        }
        if !square_size.is_finite() || square_size <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "board square size must be finite and positive, got {square_size}"
            )));
        }
        Ok(Self {
            cols,
            rows,
            square_size,
        })
    }

    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Canonical planar object-point template: row-major corners at
    /// `(x * s, y * s, 0)`. Identical for every image of a given board.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(self.corner_count());
        for y in 0..self.rows {
            for x in 0..self.cols {
                points.push(Point3::new(
                    x as f64 * self.square_size,
                    y as f64 * self.square_size,
                    0.0,
                ));
            }
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_layout_is_row_major() {
        let board = BoardGeometry::new(4, 3, 0.05).unwrap();
        let pts = board.object_points();
        assert_eq!(pts.len(), 12);
        assert!((pts[0].coords - Point3::new(0.0, 0.0, 0.0).coords).norm() < 1e-12);
        assert!((pts[3].coords - Point3::new(0.15, 0.0, 0.0).coords).norm() < 1e-12);
        assert!((pts[11].coords - Point3::new(0.15, 0.10, 0.0).coords).norm() < 1e-12);
    }

    #[test]
    fn rejects_too_small_grid() {
        assert!(BoardGeometry::new(2, 6, 0.05).is_err());
        assert!(BoardGeometry::new(9, 2, 0.05).is_err());
        assert!(BoardGeometry::new(9, 6, 0.0).is_err());
        assert!(BoardGeometry::new(9, 6, f64::NAN).is_err());
    }

    #[test]
    fn template_matches_demo_board() {
        let board = BoardGeometry::new(9, 6, 0.0082).unwrap();
        assert_eq!(board.corner_count(), 54);
        let pts = board.object_points();
        assert!((pts[53].x - 8.0 * 0.0082).abs() < 1e-12);
        assert!((pts[53].y - 5.0 * 0.0082).abs() < 1e-12);
        assert_eq!(pts[53].z, 0.0);
    }
}
