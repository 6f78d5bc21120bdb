use crate::{Error, Result};
use nalgebra::{Point2, Point3};
use rigscan_core::{CameraIntrinsics, Distortion, Pose};

/// Project world points through a pose and pinhole intrinsics.
pub fn project_points(
    points: &[Point3<f64>],
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|p| project_one(p, intrinsics, pose, None))
        .collect()
}

/// Project world points with the lens distortion model applied.
pub fn project_points_with_distortion(
    points: &[Point3<f64>],
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
    distortion: &Distortion,
) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|p| project_one(p, intrinsics, pose, Some(distortion)))
        .collect()
}

pub(crate) fn project_one(
    point: &Point3<f64>,
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
    distortion: Option<&Distortion>,
) -> Point2<f64> {
    let pc = pose.rotation * point.coords + pose.translation;
    if pc[2].abs() <= 1e-12 {
        return Point2::new(f64::NAN, f64::NAN);
    }
    let x = pc[0] / pc[2];
    let y = pc[1] / pc[2];
    let (xd, yd) = match distortion {
        Some(d) => d.apply(x, y),
        None => (x, y),
    };
    Point2::new(
        intrinsics.fx * xd + intrinsics.cx,
        intrinsics.fy * yd + intrinsics.cy,
    )
}

/// Root-mean-square pixel distance between observed and reprojected points.
pub fn reprojection_rms(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
    distortion: Option<&Distortion>,
) -> Result<f64> {
    if object_points.len() != image_points.len() {
        return Err(Error::DatasetMismatch(format!(
            "{} object points vs {} image points",
            object_points.len(),
            image_points.len()
        )));
    }

    let mut sq_sum = 0.0f64;
    let mut count = 0usize;
    for (p3, p2) in object_points.iter().zip(image_points.iter()) {
        let pred = project_one(p3, intrinsics, pose, distortion);
        if !pred.x.is_finite() {
            continue;
        }
        sq_sum += (pred.x - p2.x).powi(2) + (pred.y - p2.y).powi(2);
        count += 1;
    }
    if count == 0 {
        return Err(Error::DegenerateGeometry(
            "no projectable points for rms".to_string(),
        ));
    }
    Ok((sq_sum / count as f64).sqrt())
}

/// RMS across a batch of views sharing one camera but one pose each.
pub fn batch_reprojection_rms(
    object_points: &[Point3<f64>],
    image_point_sets: &[&[Point2<f64>]],
    intrinsics: &CameraIntrinsics,
    poses: &[Pose],
    distortion: Option<&Distortion>,
) -> Result<f64> {
    if image_point_sets.len() != poses.len() {
        return Err(Error::DatasetMismatch(format!(
            "{} point sets vs {} poses",
            image_point_sets.len(),
            poses.len()
        )));
    }

    let mut sq_sum = 0.0f64;
    let mut count = 0usize;
    for (points, pose) in image_point_sets.iter().zip(poses.iter()) {
        for (p3, p2) in object_points.iter().zip(points.iter()) {
            let pred = project_one(p3, intrinsics, pose, distortion);
            if !pred.x.is_finite() {
                continue;
            }
            sq_sum += (pred.x - p2.x).powi(2) + (pred.y - p2.y).powi(2);
            count += 1;
        }
    }
    if count == 0 {
        return Err(Error::DegenerateGeometry(
            "no projectable points for batch rms".to_string(),
        ));
    }
    Ok((sq_sum / count as f64).sqrt())
}
