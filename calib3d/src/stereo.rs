//! Stereo extrinsic calibration and epipolar rectification.
//!
//! Intrinsics are held fixed: each view's board pose is recovered per camera
//! by PnP under the supplied camera models, the per-view relative transforms
//! are averaged over the rotation manifold, and a bounded Levenberg-Marquardt
//! polish minimizes the right-camera reprojection residual.

use crate::distortion::{init_undistort_rectify_map, undistort_points};
use crate::mono::{estimate_homography_dlt, pose_from_homography};
use crate::pnp::{params_to_pose, pose_to_params, solve_pnp_refine};
use crate::project::project_one;
use crate::{Error, Result, TermCriteria};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Vector3};
use rigscan_core::{
    skew_symmetric, CameraModel, CornerDataset, CornerObservation, Pose, RectificationSet, Roi,
};

/// Relative geometry of a calibrated stereo pair, before being wrapped into a
/// persisted `StereoRig`.
#[derive(Debug, Clone)]
pub struct StereoExtrinsics {
    /// Rotation mapping left-camera coordinates into the right camera frame.
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rms_reprojection_error: f64,
}

/// Estimate the left-to-right extrinsics from paired corner datasets with
/// both cameras' intrinsics held fixed.
///
/// Pairing is positional: observation `i` of the left dataset must picture
/// the same board placement as observation `i` of the right dataset, so
/// unequal counts are a hard failure.
pub fn stereo_calibrate(
    left: &CornerDataset,
    right: &CornerDataset,
    left_model: &CameraModel,
    right_model: &CameraModel,
    criteria: TermCriteria,
) -> Result<StereoExtrinsics> {
    if left.is_empty() || right.is_empty() {
        return Err(Error::NoValidObservations(
            "stereo calibration needs at least one observation pair".to_string(),
        ));
    }
    if left.len() != right.len() {
        return Err(Error::DatasetMismatch(format!(
            "left has {} observations, right has {}",
            left.len(),
            right.len()
        )));
    }
    if left.board != right.board {
        return Err(Error::DatasetMismatch(
            "left and right datasets describe different boards".to_string(),
        ));
    }

    let template = left.board.object_points();
    let template_2d: Vec<Point2<f64>> = template.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let pose_budget = TermCriteria::new(20, 1e-10);

    // Planar board: seed each view's pose from its homography (the DLT over
    // coplanar points is degenerate), then polish with LM under the fixed
    // intrinsics and distortion.
    let board_pose = |observation: &CornerObservation, model: &CameraModel| -> Result<Pose> {
        let pinhole = if model.distortion.is_zero() {
            observation.points.clone()
        } else {
            undistort_points(&observation.points, &model.intrinsics, &model.distortion)?
        };
        let h = estimate_homography_dlt(&template_2d, &pinhole)?;
        let seed = pose_from_homography(&model.intrinsics.inverse_matrix(), &h)?;
        solve_pnp_refine(
            &seed,
            &template,
            &observation.points,
            &model.intrinsics,
            Some(&model.distortion),
            pose_budget,
        )
    };

    let mut left_poses = Vec::with_capacity(left.len());
    let mut right_poses = Vec::with_capacity(right.len());
    for (obs_l, obs_r) in left.observations.iter().zip(right.observations.iter()) {
        left_poses.push(board_pose(obs_l, left_model)?);
        right_poses.push(board_pose(obs_r, right_model)?);
    }

    // Average the per-view relative transforms; SVD projects the rotation sum
    // back onto SO(3).
    let mut rotation_sum = Matrix3::<f64>::zeros();
    let mut translation_sum = Vector3::zeros();
    for (pose_l, pose_r) in left_poses.iter().zip(right_poses.iter()) {
        let rel = pose_l.relative_to(pose_r);
        rotation_sum += rel.rotation;
        translation_sum += rel.translation;
    }
    let svd = rotation_sum.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| Error::DegenerateGeometry("SVD U missing averaging rotations".to_string()))?;
    let vt = svd
        .v_t
        .ok_or_else(|| Error::DegenerateGeometry("SVD V^T missing averaging rotations".to_string()))?;
    let mut rotation = u * vt;
    if rotation.determinant() < 0.0 {
        rotation = -rotation;
    }
    let translation = translation_sum / left.len() as f64;

    let initial = Pose::new(rotation, translation);
    let polished =
        refine_relative_pose(&initial, &template, right, right_model, &left_poses, criteria);

    let rms = stereo_rms(
        &template,
        left,
        right,
        left_model,
        right_model,
        &left_poses,
        &polished,
    )?;

    let essential = skew_symmetric(&polished.translation) * polished.rotation;
    let fundamental = right_model.intrinsics.inverse_matrix().transpose()
        * essential
        * left_model.intrinsics.inverse_matrix();

    Ok(StereoExtrinsics {
        rotation: polished.rotation,
        translation: polished.translation,
        essential,
        fundamental,
        rms_reprojection_error: rms,
    })
}

/// Bouguet-style rectification for a horizontal stereo rig.
///
/// Both cameras are rotated halfway toward each other, then the pair is spun
/// so the baseline lies along the rectified x axis. The rectified projections
/// share focal length and principal point (zero disparity at infinity), and
/// the per-camera valid-pixel ROIs are measured from the undistort/rectify
/// maps.
pub fn stereo_rectify(
    left: &CameraModel,
    right: &CameraModel,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    image_size: (u32, u32),
) -> Result<RectificationSet> {
    let baseline = translation.norm();
    if baseline <= 1e-12 {
        return Err(Error::DegenerateGeometry(
            "stereo rectification requires a non-zero baseline".to_string(),
        ));
    }

    // Split the relative rotation between the two cameras.
    let om = Rotation3::from_matrix_unchecked(*rotation).scaled_axis();
    let half_back = Rotation3::new(-om * 0.5).into_inner();
    let t_half = half_back * translation;

    // Spin the half-rotated pair so the baseline lands on the x axis.
    let axis_sign = if t_half[0] >= 0.0 { 1.0 } else { -1.0 };
    let target = Vector3::new(axis_sign, 0.0, 0.0);
    let w = t_half.cross(&target);
    let w_norm = w.norm();
    let align = if w_norm > 1e-12 {
        let angle = (t_half[0].abs() / baseline).clamp(-1.0, 1.0).acos();
        Rotation3::new(w * (angle / w_norm)).into_inner()
    } else {
        Matrix3::identity()
    };

    let r1 = align * half_back.transpose();
    let r2 = align * half_back;
    let t_new = r2 * translation;
    let tx = t_new[0];

    let f = 0.25
        * (left.intrinsics.fx + left.intrinsics.fy + right.intrinsics.fx + right.intrinsics.fy);
    let cx = 0.5 * (left.intrinsics.cx + right.intrinsics.cx);
    let cy = 0.5 * (left.intrinsics.cy + right.intrinsics.cy);

    let p1 = Matrix3x4::new(
        f, 0.0, cx, 0.0, //
        0.0, f, cy, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );
    let p2 = Matrix3x4::new(
        f, 0.0, cx, tx * f, //
        0.0, f, cy, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );

    let mut q = Matrix4::<f64>::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -cx;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -cy;
    q[(2, 3)] = f;
    q[(3, 2)] = -1.0 / tx;

    let new_camera = rigscan_core::CameraIntrinsics::new(f, f, cx, cy, image_size.0, image_size.1);
    let left_roi = valid_roi(image_size, left, &r1, &new_camera)?;
    let right_roi = valid_roi(image_size, right, &r2, &new_camera)?;

    Ok(RectificationSet {
        r1,
        r2,
        p1,
        p2,
        q,
        left_roi,
        right_roi,
    })
}

/// Largest axis-aligned rectangle of rectified pixels whose undistort/rectify
/// map samples inside the source frame.
fn valid_roi(
    image_size: (u32, u32),
    camera: &CameraModel,
    rectification: &Matrix3<f64>,
    new_camera: &rigscan_core::CameraIntrinsics,
) -> Result<Roi> {
    let (width, height) = image_size;
    let (map_x, map_y) = init_undistort_rectify_map(
        image_size,
        &camera.intrinsics,
        &camera.distortion,
        rectification,
        new_camera,
    )?;

    let src_w = camera.intrinsics.width.max(width) as f32;
    let src_h = camera.intrinsics.height.max(height) as f32;
    let in_source = |idx: usize| {
        let x = map_x[idx];
        let y = map_y[idx];
        x >= 0.0 && y >= 0.0 && x <= src_w - 1.0 && y <= src_h - 1.0
    };

    let mut x0 = 0u32;
    let mut x1 = width;
    let mut y0 = None;
    let mut y1 = 0u32;
    for y in 0..height {
        let row = (y * width) as usize;
        let mut first = None;
        let mut last = None;
        for x in 0..width {
            if in_source(row + x as usize) {
                if first.is_none() {
                    first = Some(x);
                }
                last = Some(x);
            }
        }
        let (Some(first), Some(last)) = (first, last) else {
            continue;
        };
        if y0.is_none() {
            y0 = Some(y);
            x0 = first;
            x1 = last + 1;
        } else {
            x0 = x0.max(first);
            x1 = x1.min(last + 1);
        }
        y1 = y + 1;
    }

    match y0 {
        Some(y0) if x1 > x0 => Ok(Roi::new(x0, y0, x1 - x0, y1 - y0)),
        _ => Ok(Roi::default()),
    }
}

/// Bounded LM polish of the relative pose against the right-camera residuals,
/// holding the fixed intrinsics and the left-camera board poses.
fn refine_relative_pose(
    initial: &Pose,
    template: &[Point3<f64>],
    right: &CornerDataset,
    right_model: &CameraModel,
    left_poses: &[Pose],
    criteria: TermCriteria,
) -> Pose {
    // Board corners expressed in the left camera frame are the fixed 3D
    // anchors; only the 6 relative-pose parameters move.
    let mut anchors: Vec<Point3<f64>> = Vec::new();
    let mut targets: Vec<Point2<f64>> = Vec::new();
    for (obs_r, pose_l) in right.observations.iter().zip(left_poses.iter()) {
        for (p3, p2) in template.iter().zip(obs_r.points.iter()) {
            anchors.push(pose_l.transform_point(p3));
            targets.push(*p2);
        }
    }

    let mut params = pose_to_params(initial);
    let mut lambda = 1e-3;
    let residual = |params: &[f64; 6]| -> f64 {
        let pose = params_to_pose(params);
        anchors
            .iter()
            .zip(targets.iter())
            .map(|(p3, p2)| {
                let pred = project_one(
                    p3,
                    &right_model.intrinsics,
                    &pose,
                    Some(&right_model.distortion),
                );
                if pred.x.is_finite() {
                    (pred.x - p2.x).powi(2) + (pred.y - p2.y).powi(2)
                } else {
                    0.0
                }
            })
            .sum()
    };
    let mut current = residual(&params);

    for _ in 0..criteria.max_iters {
        let base = params_to_pose(&params);
        let eps = 1e-7;
        let mut jtj = nalgebra::Matrix6::<f64>::zeros();
        let mut jtr = nalgebra::Vector6::<f64>::zeros();

        for (p3, p2) in anchors.iter().zip(targets.iter()) {
            let pred0 = project_one(p3, &right_model.intrinsics, &base, Some(&right_model.distortion));
            if !pred0.x.is_finite() {
                continue;
            }
            let mut ju = [0.0f64; 6];
            let mut jv = [0.0f64; 6];
            for k in 0..6 {
                let mut perturbed = params;
                perturbed[k] += eps;
                let pose_k = params_to_pose(&perturbed);
                let pred1 = project_one(
                    p3,
                    &right_model.intrinsics,
                    &pose_k,
                    Some(&right_model.distortion),
                );
                ju[k] = (pred1.x - pred0.x) / eps;
                jv[k] = (pred1.y - pred0.y) / eps;
            }
            let ru = pred0.x - p2.x;
            let rv = pred0.y - p2.y;
            for k in 0..6 {
                jtr[k] += ju[k] * ru + jv[k] * rv;
                for l in 0..6 {
                    jtj[(k, l)] += ju[k] * ju[l] + jv[k] * jv[l];
                }
            }
        }

        let mut lhs = jtj;
        for i in 0..6 {
            lhs[(i, i)] *= 1.0 + lambda;
        }
        let Some(delta) = lhs.lu().solve(&jtr) else {
            break;
        };

        let mut next = params;
        for k in 0..6 {
            next[k] -= delta[k];
        }
        let next_err = residual(&next);
        if next_err < current {
            params = next;
            current = next_err;
            lambda /= 10.0;
            if delta.norm() < criteria.eps {
                break;
            }
        } else {
            lambda *= 10.0;
        }
    }

    params_to_pose(&params)
}

/// Combined RMS across both cameras: left residuals under the per-view board
/// poses, right residuals under the composed relative pose.
fn stereo_rms(
    template: &[Point3<f64>],
    left: &CornerDataset,
    right: &CornerDataset,
    left_model: &CameraModel,
    right_model: &CameraModel,
    left_poses: &[Pose],
    relative: &Pose,
) -> Result<f64> {
    let mut sq_sum = 0.0f64;
    let mut count = 0usize;

    for ((obs_l, obs_r), pose_l) in left
        .observations
        .iter()
        .zip(right.observations.iter())
        .zip(left_poses.iter())
    {
        let pose_r = Pose::new(
            relative.rotation * pose_l.rotation,
            relative.rotation * pose_l.translation + relative.translation,
        );
        for ((p3, p2_l), p2_r) in template
            .iter()
            .zip(obs_l.points.iter())
            .zip(obs_r.points.iter())
        {
            let pred_l = project_one(
                p3,
                &left_model.intrinsics,
                pose_l,
                Some(&left_model.distortion),
            );
            let pred_r = project_one(
                p3,
                &right_model.intrinsics,
                &pose_r,
                Some(&right_model.distortion),
            );
            if pred_l.x.is_finite() {
                sq_sum += (pred_l.x - p2_l.x).powi(2) + (pred_l.y - p2_l.y).powi(2);
                count += 1;
            }
            if pred_r.x.is_finite() {
                sq_sum += (pred_r.x - p2_r.x).powi(2) + (pred_r.y - p2_r.y).powi(2);
                count += 1;
            }
        }
    }

    if count == 0 {
        return Err(Error::DegenerateGeometry(
            "no projectable correspondences for stereo rms".to_string(),
        ));
    }
    Ok((sq_sum / count as f64).sqrt())
}
