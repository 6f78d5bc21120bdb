use crate::storage::{
    mat3_to_rows, mat3x4_to_rows, mat4_to_rows, read_json, rows_to_mat3, rows_to_mat3x4,
    rows_to_mat4, write_json,
};
use crate::{CameraIntrinsics, Distortion, Result};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One camera's calibrated model. Produced once per monocular calibration run
/// and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    pub rms_reprojection_error: f64,
    pub calibration_time: String,
}

#[derive(Serialize, Deserialize)]
struct CameraModelRecord {
    camera_matrix: [[f64; 3]; 3],
    distortion_coefficients: Vec<f64>,
    image_width: u32,
    image_height: u32,
    reprojection_error: f64,
    calibration_time: String,
}

impl CameraModel {
    pub fn new(
        intrinsics: CameraIntrinsics,
        distortion: Distortion,
        rms_reprojection_error: f64,
        calibration_time: String,
    ) -> Self {
        Self {
            intrinsics,
            distortion,
            rms_reprojection_error,
            calibration_time,
        }
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.intrinsics.width, self.intrinsics.height)
    }

    fn to_record(&self) -> CameraModelRecord {
        CameraModelRecord {
            camera_matrix: mat3_to_rows(&self.intrinsics.matrix()),
            distortion_coefficients: self.distortion.coefficients().to_vec(),
            image_width: self.intrinsics.width,
            image_height: self.intrinsics.height,
            reprojection_error: self.rms_reprojection_error,
            calibration_time: self.calibration_time.clone(),
        }
    }

    fn from_record(record: CameraModelRecord) -> Result<Self> {
        let k = rows_to_mat3(&record.camera_matrix);
        if record.distortion_coefficients.len() > 8 {
            return Err(crate::Error::Parse(format!(
                "distortion vector has {} entries, at most 8 supported",
                record.distortion_coefficients.len()
            )));
        }
        Ok(Self {
            intrinsics: CameraIntrinsics::new(
                k[(0, 0)],
                k[(1, 1)],
                k[(0, 2)],
                k[(1, 2)],
                record.image_width,
                record.image_height,
            ),
            distortion: Distortion::from_coefficients(&record.distortion_coefficients),
            rms_reprojection_error: record.reprojection_error,
            calibration_time: record.calibration_time,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, &self.to_record())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_record(read_json(path)?)
    }
}

/// Calibrated two-camera rig: both camera models plus the left-to-right
/// extrinsic geometry and the derived epipolar matrices.
#[derive(Debug, Clone)]
pub struct StereoRig {
    pub left: CameraModel,
    pub right: CameraModel,
    /// Rotation mapping left-camera coordinates into the right camera frame.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rms_reprojection_error: f64,
    pub calibration_time: String,
}

#[derive(Serialize, Deserialize)]
struct StereoRigRecord {
    left_camera_matrix: [[f64; 3]; 3],
    left_distortion_coefficients: Vec<f64>,
    right_camera_matrix: [[f64; 3]; 3],
    right_distortion_coefficients: Vec<f64>,
    rotation_matrix: [[f64; 3]; 3],
    translation_vector: [f64; 3],
    essential_matrix: [[f64; 3]; 3],
    fundamental_matrix: [[f64; 3]; 3],
    image_width: u32,
    image_height: u32,
    reprojection_error: f64,
    calibration_time: String,
}

impl StereoRig {
    pub fn image_size(&self) -> (u32, u32) {
        self.left.image_size()
    }

    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let record = StereoRigRecord {
            left_camera_matrix: mat3_to_rows(&self.left.intrinsics.matrix()),
            left_distortion_coefficients: self.left.distortion.coefficients().to_vec(),
            right_camera_matrix: mat3_to_rows(&self.right.intrinsics.matrix()),
            right_distortion_coefficients: self.right.distortion.coefficients().to_vec(),
            rotation_matrix: mat3_to_rows(&self.rotation),
            translation_vector: [
                self.translation[0],
                self.translation[1],
                self.translation[2],
            ],
            essential_matrix: mat3_to_rows(&self.essential),
            fundamental_matrix: mat3_to_rows(&self.fundamental),
            image_width: self.left.intrinsics.width,
            image_height: self.left.intrinsics.height,
            reprojection_error: self.rms_reprojection_error,
            calibration_time: self.calibration_time.clone(),
        };
        write_json(path, &record)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let record: StereoRigRecord = read_json(path)?;
        let camera = |k: &[[f64; 3]; 3], d: &[f64]| -> CameraModel {
            let k = rows_to_mat3(k);
            CameraModel {
                intrinsics: CameraIntrinsics::new(
                    k[(0, 0)],
                    k[(1, 1)],
                    k[(0, 2)],
                    k[(1, 2)],
                    record.image_width,
                    record.image_height,
                ),
                distortion: Distortion::from_coefficients(d),
                rms_reprojection_error: record.reprojection_error,
                calibration_time: record.calibration_time.clone(),
            }
        };
        let left = camera(
            &record.left_camera_matrix,
            &record.left_distortion_coefficients,
        );
        let right = camera(
            &record.right_camera_matrix,
            &record.right_distortion_coefficients,
        );
        Ok(Self {
            left,
            right,
            rotation: rows_to_mat3(&record.rotation_matrix),
            translation: Vector3::new(
                record.translation_vector[0],
                record.translation_vector[1],
                record.translation_vector[2],
            ),
            essential: rows_to_mat3(&record.essential_matrix),
            fundamental: rows_to_mat3(&record.fundamental_matrix),
            rms_reprojection_error: record.reprojection_error,
            calibration_time: record.calibration_time,
        })
    }
}

/// Valid-pixel rectangle of a rectified image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Epipolar rectification transforms for a stereo rig at one target image
/// size. A pure function of the rig plus that size; recomputed rather than
/// mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RectificationSet {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth reprojection matrix.
    pub q: Matrix4<f64>,
    pub left_roi: Roi,
    pub right_roi: Roi,
}

#[derive(Serialize, Deserialize)]
struct RectificationSetRecord {
    #[serde(rename = "R1")]
    r1: [[f64; 3]; 3],
    #[serde(rename = "R2")]
    r2: [[f64; 3]; 3],
    #[serde(rename = "P1")]
    p1: [[f64; 4]; 3],
    #[serde(rename = "P2")]
    p2: [[f64; 4]; 3],
    #[serde(rename = "Q")]
    q: [[f64; 4]; 4],
    left_roi_x: u32,
    left_roi_y: u32,
    left_roi_width: u32,
    left_roi_height: u32,
    right_roi_x: u32,
    right_roi_y: u32,
    right_roi_width: u32,
    right_roi_height: u32,
}

impl RectificationSet {
    /// New-camera intrinsic block of a rectified projection matrix.
    pub fn new_camera(p: &Matrix3x4<f64>, size: (u32, u32)) -> CameraIntrinsics {
        CameraIntrinsics::new(p[(0, 0)], p[(1, 1)], p[(0, 2)], p[(1, 2)], size.0, size.1)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let record = RectificationSetRecord {
            r1: mat3_to_rows(&self.r1),
            r2: mat3_to_rows(&self.r2),
            p1: mat3x4_to_rows(&self.p1),
            p2: mat3x4_to_rows(&self.p2),
            q: mat4_to_rows(&self.q),
            left_roi_x: self.left_roi.x,
            left_roi_y: self.left_roi.y,
            left_roi_width: self.left_roi.width,
            left_roi_height: self.left_roi.height,
            right_roi_x: self.right_roi.x,
            right_roi_y: self.right_roi.y,
            right_roi_width: self.right_roi.width,
            right_roi_height: self.right_roi.height,
        };
        write_json(path, &record)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let record: RectificationSetRecord = read_json(path)?;
        Ok(Self {
            r1: rows_to_mat3(&record.r1),
            r2: rows_to_mat3(&record.r2),
            p1: rows_to_mat3x4(&record.p1),
            p2: rows_to_mat3x4(&record.p2),
            q: rows_to_mat4(&record.q),
            left_roi: Roi::new(
                record.left_roi_x,
                record.left_roi_y,
                record.left_roi_width,
                record.left_roi_height,
            ),
            right_roi: Roi::new(
                record.right_roi_x,
                record.right_roi_y,
                record.right_roi_width,
                record.right_roi_height,
            ),
        })
    }
}
