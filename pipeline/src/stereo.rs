//! Stereo calibration stage: paired corner datasets in, stereo rig and
//! rectification set out.

use crate::{Error, OutputSink, Result};
use rigscan_calib3d::{stereo_calibrate, stereo_rectify, TermCriteria};
use rigscan_core::{
    CameraIntrinsics, CameraModel, CornerDataset, Distortion, RectificationSet, StereoRig,
};
use std::path::Path;

pub struct StereoCalibrator {
    criteria: TermCriteria,
}

impl StereoCalibrator {
    pub fn new(criteria: TermCriteria) -> Self {
        Self { criteria }
    }

    /// Calibrate the rig from two persisted corner datasets and derive the
    /// rectification set for `image_size`.
    ///
    /// Intrinsics are held fixed throughout: pass each camera's model from a
    /// prior monocular run, or `None` to assume a nominal undistorted camera.
    /// Any failure (unreadable file, count mismatch, empty dataset) aborts
    /// before anything is persisted; the rig and rectification files are only
    /// written together with a successful solve.
    pub fn run(
        &self,
        left_corner_file: &Path,
        right_corner_file: &Path,
        left_model: Option<CameraModel>,
        right_model: Option<CameraModel>,
        image_size: (u32, u32),
        sink: &OutputSink,
    ) -> Result<(StereoRig, RectificationSet)> {
        let left = CornerDataset::load(left_corner_file)?;
        let right = CornerDataset::load(right_corner_file)?;
        if left.is_empty() || right.is_empty() {
            return Err(Error::NoValidObservations(
                "one or both corner datasets are empty".to_string(),
            ));
        }
        if left.len() != right.len() {
            return Err(Error::DatasetMismatch(format!(
                "left has {} observations, right has {}; pairing is positional",
                left.len(),
                right.len()
            )));
        }

        let left_model = left_model.unwrap_or_else(|| nominal_camera(image_size));
        let right_model = right_model.unwrap_or_else(|| nominal_camera(image_size));

        let extrinsics = stereo_calibrate(&left, &right, &left_model, &right_model, self.criteria)?;
        log::info!(
            "stereo calibrated over {} pair(s), rms {:.4} px, baseline {:.4}",
            left.len(),
            extrinsics.rms_reprojection_error,
            extrinsics.translation.norm()
        );

        let rectification = stereo_rectify(
            &left_model,
            &right_model,
            &extrinsics.rotation,
            &extrinsics.translation,
            image_size,
        )?;

        let rig = StereoRig {
            left: left_model,
            right: right_model,
            rotation: extrinsics.rotation,
            translation: extrinsics.translation,
            essential: extrinsics.essential,
            fundamental: extrinsics.fundamental,
            rms_reprojection_error: extrinsics.rms_reprojection_error,
            calibration_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        rig.save(&sink.stereo_calibration_file())?;
        rectification.save(&sink.stereo_rectify_file())?;
        Ok((rig, rectification))
    }
}

/// Stand-in camera model when no monocular calibration is supplied.
fn nominal_camera(image_size: (u32, u32)) -> CameraModel {
    CameraModel::new(
        CameraIntrinsics::ideal(image_size.0, image_size.1),
        Distortion::none(),
        0.0,
        String::new(),
    )
}
