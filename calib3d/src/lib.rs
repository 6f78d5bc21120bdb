pub use rigscan_core::{Error, Result};

pub mod pattern;
pub use pattern::{corner_subpix, find_chessboard_corners};

pub mod project;
pub use project::{project_points, project_points_with_distortion, reprojection_rms};

pub mod pnp;
pub use pnp::{solve_pnp_dlt, solve_pnp_refine};

pub mod mono;
pub use mono::{calibrate_camera, CalibrationOutcome};

pub mod stereo;
pub use stereo::{stereo_calibrate, stereo_rectify, StereoExtrinsics};

pub mod distortion;
pub use distortion::{
    init_undistort_rectify_map, undistort_image, undistort_image_rgb, undistort_points,
};

/// Explicit iteration/tolerance budget for iterative routines. Always passed
/// at the call site; nothing in this crate falls back to solver defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCriteria {
    pub max_iters: usize,
    pub eps: f64,
}

impl TermCriteria {
    pub fn new(max_iters: usize, eps: f64) -> Self {
        Self { max_iters, eps }
    }

    /// Subpixel corner refinement budget used by the corner extractor.
    pub fn corner_refinement() -> Self {
        Self::new(50, 0.01)
    }

    /// Relative-pose polish budget used by stereo calibration.
    pub fn stereo_calibration() -> Self {
        Self::new(100, 1e-5)
    }
}
