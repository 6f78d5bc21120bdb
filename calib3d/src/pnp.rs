//! Perspective-n-Point pose estimation: DLT initialization plus
//! Levenberg-Marquardt refinement over an axis-angle parameterization.

use crate::project::project_one;
use crate::{Error, Result, TermCriteria};
use nalgebra::{DMatrix, Matrix2x6, Matrix3, Matrix3x4, Matrix6, Point2, Point3, Rotation3, Vector2, Vector3, Vector6};
use rayon::prelude::*;
use rigscan_core::{CameraIntrinsics, Distortion, Pose};

/// Direct Linear Transform pose estimate from 2D-3D correspondences.
pub fn solve_pnp_dlt(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
) -> Result<Pose> {
    if object_points.len() != image_points.len() {
        return Err(Error::DatasetMismatch(
            "solve_pnp_dlt needs paired point sets".to_string(),
        ));
    }
    if object_points.len() < 6 {
        return Err(Error::InvalidParameters(
            "solve_pnp_dlt needs at least 6 correspondences".to_string(),
        ));
    }

    let k_inv = intrinsics.inverse_matrix();
    let n = object_points.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);

    for (i, (obj, pix)) in object_points.iter().zip(image_points.iter()).enumerate() {
        let ray = k_inv * Vector3::new(pix.x, pix.y, 1.0);
        let xn = ray[0] / ray[2];
        let yn = ray[1] / ray[2];
        let (xw, yw, zw) = (obj.x, obj.y, obj.z);

        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = xw;
        a[(r0, 1)] = yw;
        a[(r0, 2)] = zw;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -xn * xw;
        a[(r0, 9)] = -xn * yw;
        a[(r0, 10)] = -xn * zw;
        a[(r0, 11)] = -xn;

        a[(r1, 4)] = xw;
        a[(r1, 5)] = yw;
        a[(r1, 6)] = zw;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -yn * xw;
        a[(r1, 9)] = -yn * yw;
        a[(r1, 10)] = -yn * zw;
        a[(r1, 11)] = -yn;
    }

    let svd = a.svd(true, true);
    let vt = svd
        .v_t
        .ok_or_else(|| Error::DegenerateGeometry("SVD failed in solve_pnp_dlt".to_string()))?;
    let p = vt.row(vt.nrows() - 1);

    let mut pmat = Matrix3x4::<f64>::zeros();
    for r in 0..3 {
        for c in 0..4 {
            pmat[(r, c)] = p[(0, r * 4 + c)];
        }
    }

    // The nullspace sign is arbitrary; pick the one that puts the scene in
    // front of the camera.
    let mut depth_sum = 0.0;
    for obj in object_points {
        depth_sum +=
            pmat[(2, 0)] * obj.x + pmat[(2, 1)] * obj.y + pmat[(2, 2)] * obj.z + pmat[(2, 3)];
    }
    if depth_sum < 0.0 {
        pmat = -pmat;
    }

    let m = Matrix3::new(
        pmat[(0, 0)],
        pmat[(0, 1)],
        pmat[(0, 2)],
        pmat[(1, 0)],
        pmat[(1, 1)],
        pmat[(1, 2)],
        pmat[(2, 0)],
        pmat[(2, 1)],
        pmat[(2, 2)],
    );
    let mut t = Vector3::new(pmat[(0, 3)], pmat[(1, 3)], pmat[(2, 3)]);

    let svd_m = m.svd(true, true);
    let u = svd_m
        .u
        .ok_or_else(|| Error::DegenerateGeometry("SVD U missing in solve_pnp_dlt".to_string()))?;
    let vt_m = svd_m
        .v_t
        .ok_or_else(|| Error::DegenerateGeometry("SVD V^T missing in solve_pnp_dlt".to_string()))?;

    let mut r = u * vt_m;
    let scale =
        (svd_m.singular_values[0] + svd_m.singular_values[1] + svd_m.singular_values[2]) / 3.0;
    if scale.abs() < 1e-12 {
        return Err(Error::DegenerateGeometry(
            "degenerate scale in solve_pnp_dlt".to_string(),
        ));
    }
    t /= scale;

    if r.determinant() < 0.0 {
        r = -r;
        t = -t;
    }

    Ok(Pose::new(r, t))
}

/// Levenberg-Marquardt pose refinement minimizing reprojection error, bounded
/// by the supplied criteria.
pub fn solve_pnp_refine(
    initial: &Pose,
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    distortion: Option<&Distortion>,
    criteria: TermCriteria,
) -> Result<Pose> {
    if object_points.len() != image_points.len() || object_points.len() < 6 {
        return Err(Error::InvalidParameters(
            "solve_pnp_refine needs >=6 paired points".to_string(),
        ));
    }

    let mut params = pose_to_params(initial);
    let mut lambda = 1e-3;
    let mut current_err = total_sq_error(&params, object_points, image_points, intrinsics, distortion);

    for _ in 0..criteria.max_iters {
        let base = params_to_pose(&params);
        let eps = 1e-7;

        let (jtj, jtr) = (0..object_points.len())
            .into_par_iter()
            .map(|i| {
                let p3 = &object_points[i];
                let p2 = &image_points[i];
                let pred0 = project_one(p3, intrinsics, &base, distortion);

                let mut jac = [[0.0f64; 6]; 2];
                for k in 0..6 {
                    let mut perturbed = params;
                    perturbed[k] += eps;
                    let pose_k = params_to_pose(&perturbed);
                    let pred1 = project_one(p3, intrinsics, &pose_k, distortion);
                    jac[0][k] = (pred1.x - pred0.x) / eps;
                    jac[1][k] = (pred1.y - pred0.y) / eps;
                }

                let j = Matrix2x6::from_row_slice(&[
                    jac[0][0], jac[0][1], jac[0][2], jac[0][3], jac[0][4], jac[0][5],
                    jac[1][0], jac[1][1], jac[1][2], jac[1][3], jac[1][4], jac[1][5],
                ]);
                let r = Vector2::new(pred0.x - p2.x, pred0.y - p2.y);
                (j.transpose() * j, j.transpose() * r)
            })
            .reduce(
                || (Matrix6::<f64>::zeros(), Vector6::<f64>::zeros()),
                |a, b| (a.0 + b.0, a.1 + b.1),
            );

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
        let next_err = total_sq_error(&next, object_points, image_points, intrinsics, distortion);

        if next_err < current_err {
            params = next;
            current_err = next_err;
            lambda /= 10.0;
            if delta.norm() < criteria.eps {
                break;
            }
        } else {
            lambda *= 10.0;
        }
    }

    Ok(params_to_pose(&params))
}

fn total_sq_error(
    params: &[f64; 6],
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    distortion: Option<&Distortion>,
) -> f64 {
    let pose = params_to_pose(params);
    object_points
        .par_iter()
        .zip(image_points.par_iter())
        .map(|(p3, p2)| {
            let pred = project_one(p3, intrinsics, &pose, distortion);
            if pred.x.is_finite() {
                (pred.x - p2.x).powi(2) + (pred.y - p2.y).powi(2)
            } else {
                0.0
            }
        })
        .sum()
}

pub(crate) fn pose_to_params(pose: &Pose) -> [f64; 6] {
    let rot = Rotation3::from_matrix_unchecked(pose.rotation);
    let omega = rot.scaled_axis();
    [
        omega[0],
        omega[1],
        omega[2],
        pose.translation[0],
        pose.translation[1],
        pose.translation[2],
    ]
}

pub(crate) fn params_to_pose(params: &[f64; 6]) -> Pose {
    let rot = Rotation3::new(Vector3::new(params[0], params[1], params[2])).into_inner();
    Pose::new(rot, Vector3::new(params[3], params[4], params[5]))
}
