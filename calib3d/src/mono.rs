//! Monocular intrinsic calibration from planar checkerboard observations.
//!
//! Zhang-style closed-form initialization from inter-image homographies,
//! followed by alternating refinement of intrinsics, per-view poses, and
//! distortion until the reprojection error stops improving.

use crate::pnp::{solve_pnp_dlt, solve_pnp_refine};
use crate::project::{batch_reprojection_rms, project_points_with_distortion};
use crate::{Error, Result, TermCriteria};
use nalgebra::{DMatrix, Matrix3, Point2, Point3};
use rigscan_core::{CameraIntrinsics, CameraModel, CornerDataset, Distortion, Pose};

/// Calibration result: the persisted camera model plus the per-observation
/// board poses the solver estimated along the way. Poses are kept so residual
/// visualizations can reproject the template per image.
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub model: CameraModel,
    pub poses: Vec<Pose>,
}

/// Calibrate one camera from a corner dataset.
///
/// The solver always returns a fit for a non-empty dataset: with fewer than
/// three views the intrinsics cannot be constrained from homographies alone,
/// so a nominal camera seeds the refinement and the (high) RMS left behind is
/// the downstream quality signal.
pub fn calibrate_camera(
    dataset: &CornerDataset,
    image_size: (u32, u32),
    criteria: TermCriteria,
) -> Result<CalibrationOutcome> {
    if dataset.is_empty() {
        return Err(Error::NoValidObservations(
            "corner dataset holds no observations".to_string(),
        ));
    }

    let template = dataset.board.object_points();
    let template_2d: Vec<Point2<f64>> =
        template.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let point_sets = dataset.point_sets();

    let mut homographies = Vec::with_capacity(point_sets.len());
    for points in &point_sets {
        homographies.push(estimate_homography_dlt(&template_2d, points)?);
    }

    let mut intrinsics = if homographies.len() >= 3 {
        match intrinsics_from_homographies(&homographies) {
            Ok(k) => CameraIntrinsics::new(
                k[(0, 0)],
                k[(1, 1)],
                k[(0, 2)],
                k[(1, 2)],
                image_size.0,
                image_size.1,
            ),
            Err(e) => {
                log::warn!("closed-form intrinsics failed ({e}); seeding with nominal camera");
                CameraIntrinsics::ideal(image_size.0, image_size.1)
            }
        }
    } else {
        log::warn!(
            "{} view(s) cannot constrain intrinsics; seeding with nominal camera",
            homographies.len()
        );
        CameraIntrinsics::ideal(image_size.0, image_size.1)
    };

    let mut poses = Vec::with_capacity(point_sets.len());
    let k_inv = intrinsics.inverse_matrix();
    for (h, points) in homographies.iter().zip(point_sets.iter()) {
        let pose = pose_from_homography(&k_inv, h)
            .or_else(|_| solve_pnp_dlt(&template, points, &intrinsics))?;
        poses.push(pose);
    }

    let mut distortion = Distortion::none();
    let mut rms = batch_reprojection_rms(&template, &point_sets, &intrinsics, &poses, Some(&distortion))?;

    // Alternating refinement; each step is kept only if it does not degrade
    // the reprojection error, so a degenerate view set cannot diverge.
    for iter in 0..criteria.max_iters {
        let rms_at_start = rms;

        let candidate_k = refit_intrinsics(&template, &point_sets, &poses, intrinsics);
        if let Ok(r) =
            batch_reprojection_rms(&template, &point_sets, &candidate_k, &poses, Some(&distortion))
        {
            if r.is_finite() && r <= rms {
                intrinsics = candidate_k;
                rms = r;
            }
        }

        let mut candidate_poses = poses.clone();
        for (pose, points) in candidate_poses.iter_mut().zip(point_sets.iter()) {
            *pose = solve_pnp_refine(
                pose,
                &template,
                points,
                &intrinsics,
                Some(&distortion),
                TermCriteria::new(5, 1e-9),
            )
            .unwrap_or(*pose);
        }
        if let Ok(r) = batch_reprojection_rms(
            &template,
            &point_sets,
            &intrinsics,
            &candidate_poses,
            Some(&distortion),
        ) {
            if r.is_finite() && r <= rms {
                poses = candidate_poses;
                rms = r;
            }
        }

        if iter % 2 == 0 {
            if let Ok(candidate_d) =
                refit_distortion(&template, &point_sets, &intrinsics, &poses, &distortion)
            {
                if let Ok(r) = batch_reprojection_rms(
                    &template,
                    &point_sets,
                    &intrinsics,
                    &poses,
                    Some(&candidate_d),
                ) {
                    if r.is_finite() && r <= rms {
                        distortion = candidate_d;
                        rms = r;
                    }
                }
            }
        }

        if (rms_at_start - rms).abs() < criteria.eps {
            break;
        }
    }

    if !intrinsics.fx.is_finite() || !intrinsics.fy.is_finite() || !rms.is_finite() {
        return Err(Error::DegenerateGeometry(
            "calibration produced non-finite parameters".to_string(),
        ));
    }

    let model = CameraModel::new(
        intrinsics,
        distortion,
        rms,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    Ok(CalibrationOutcome { model, poses })
}

/// Homography mapping board-plane coordinates to pixels, estimated by the
/// normalized DLT.
pub(crate) fn estimate_homography_dlt(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Result<Matrix3<f64>> {
    if src.len() != dst.len() || src.len() < 4 {
        return Err(Error::InvalidParameters(
            "homography needs >=4 paired points".to_string(),
        ));
    }

    let (src_n, t_src) = hartley_normalize(src)?;
    let (dst_n, t_dst) = hartley_normalize(dst)?;
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let (x, y) = (src_n[i].x, src_n[i].y);
        let (u, v) = (dst_n[i].x, dst_n[i].y);
        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(true, true);
    let vt = svd
        .v_t
        .ok_or_else(|| Error::DegenerateGeometry("SVD failed in homography DLT".to_string()))?;
    let h = vt.row(vt.nrows() - 1);
    let h_norm = Matrix3::new(
        h[(0, 0)],
        h[(0, 1)],
        h[(0, 2)],
        h[(0, 3)],
        h[(0, 4)],
        h[(0, 5)],
        h[(0, 6)],
        h[(0, 7)],
        h[(0, 8)],
    );

    let mut out = t_dst.try_inverse().unwrap_or_else(Matrix3::identity) * h_norm * t_src;
    if out[(2, 2)].abs() > 1e-12 {
        out /= out[(2, 2)];
    }
    Ok(out)
}

fn hartley_normalize(points: &[Point2<f64>]) -> Result<(Vec<Point2<f64>>, Matrix3<f64>)> {
    if points.is_empty() {
        return Err(Error::InvalidParameters(
            "cannot normalize empty point set".to_string(),
        ));
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - mean_x).powi(2) + (p.y - mean_y).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let scale = if mean_dist.abs() > 1e-18 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let normalized = points
        .iter()
        .map(|p| Point2::new((p.x - mean_x) * scale, (p.y - mean_y) * scale))
        .collect();
    let t = Matrix3::new(
        scale,
        0.0,
        -mean_x * scale,
        0.0,
        scale,
        -mean_y * scale,
        0.0,
        0.0,
        1.0,
    );
    Ok((normalized, t))
}

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    [
        h[(0, i)] * h[(0, j)],
        h[(0, i)] * h[(1, j)] + h[(1, i)] * h[(0, j)],
        h[(1, i)] * h[(1, j)],
        h[(2, i)] * h[(0, j)] + h[(0, i)] * h[(2, j)],
        h[(2, i)] * h[(1, j)] + h[(1, i)] * h[(2, j)],
        h[(2, i)] * h[(2, j)],
    ]
}

/// Zhang's closed-form intrinsics from at least three plane homographies.
fn intrinsics_from_homographies(homographies: &[Matrix3<f64>]) -> Result<Matrix3<f64>> {
    if homographies.len() < 3 {
        return Err(Error::InvalidParameters(
            "need >=3 homographies for closed-form intrinsics".to_string(),
        ));
    }

    let mut v = DMatrix::<f64>::zeros(2 * homographies.len(), 6);
    for (i, h) in homographies.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        for j in 0..6 {
            v[(2 * i, j)] = v12[j];
            v[(2 * i + 1, j)] = v11[j] - v22[j];
        }
    }

    let svd = v.svd(true, true);
    let vt = svd.v_t.ok_or_else(|| {
        Error::DegenerateGeometry("SVD failed solving the absolute conic".to_string())
    })?;
    let b = vt.row(vt.nrows() - 1);
    let mut b11 = b[(0, 0)];
    let mut b12 = b[(0, 1)];
    let mut b22 = b[(0, 2)];
    let mut b13 = b[(0, 3)];
    let mut b23 = b[(0, 4)];
    let mut b33 = b[(0, 5)];

    let solve = |b11: f64, b12: f64, b22: f64, b13: f64, b23: f64, b33: f64| -> Option<(f64, f64)> {
        let denom = b11 * b22 - b12 * b12;
        if denom.abs() < 1e-18 || b11.abs() < 1e-18 {
            return None;
        }
        let v0 = (b12 * b13 - b11 * b23) / denom;
        let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
        Some((v0, lambda))
    };

    let (mut v0, mut lambda) = solve(b11, b12, b22, b13, b23, b33)
        .ok_or_else(|| Error::DegenerateGeometry("degenerate conic system".to_string()))?;

    // Nullspace sign is arbitrary; flip once if needed.
    if lambda <= 0.0 {
        b11 = -b11;
        b12 = -b12;
        b22 = -b22;
        b13 = -b13;
        b23 = -b23;
        b33 = -b33;
        (v0, lambda) = solve(b11, b12, b22, b13, b23, b33)
            .ok_or_else(|| Error::DegenerateGeometry("degenerate conic after sign flip".to_string()))?;
    }
    if lambda <= 0.0 {
        return Err(Error::DegenerateGeometry(
            "non-positive lambda solving the absolute conic".to_string(),
        ));
    }

    let denom = b11 * b22 - b12 * b12;
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(Matrix3::new(alpha, gamma, u0, 0.0, beta, v0, 0.0, 0.0, 1.0))
}

/// Board pose from its homography given the intrinsics.
pub(crate) fn pose_from_homography(k_inv: &Matrix3<f64>, h: &Matrix3<f64>) -> Result<Pose> {
    let r1_raw = k_inv * h.column(0).into_owned();
    let r2_raw = k_inv * h.column(1).into_owned();
    let t_raw = k_inv * h.column(2).into_owned();

    // The homography's overall sign is arbitrary; pick the scale sign that
    // puts the board in front of the camera.
    let mut scale = 1.0 / r1_raw.norm().max(1e-18);
    if t_raw[2] * scale < 0.0 {
        scale = -scale;
    }

    let r1 = r1_raw * scale;
    let r2 = r2_raw * scale;
    let r3 = r1.cross(&r2);
    let approx = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| Error::DegenerateGeometry("SVD U missing in pose_from_homography".to_string()))?;
    let vt = svd.v_t.ok_or_else(|| {
        Error::DegenerateGeometry("SVD V^T missing in pose_from_homography".to_string())
    })?;
    let mut r = u * vt;
    if r.determinant() < 0.0 {
        r = -r;
    }

    Ok(Pose::new(r, t_raw * scale))
}

/// Closed-form least-squares refit of (fx, cx) and (fy, cy) holding the poses
/// fixed. Falls back to the previous intrinsics on a degenerate system.
fn refit_intrinsics(
    template: &[Point3<f64>],
    point_sets: &[&[Point2<f64>]],
    poses: &[Pose],
    fallback: CameraIntrinsics,
) -> CameraIntrinsics {
    let mut sx2 = 0.0f64;
    let mut sxu = 0.0f64;
    let mut sx = 0.0f64;
    let mut su = 0.0f64;
    let mut sy2 = 0.0f64;
    let mut syv = 0.0f64;
    let mut sy = 0.0f64;
    let mut sv = 0.0f64;
    let mut n = 0usize;

    for (points, pose) in point_sets.iter().zip(poses.iter()) {
        for (p3, p2) in template.iter().zip(points.iter()) {
            let pc = pose.rotation * p3.coords + pose.translation;
            if pc[2].abs() <= 1e-12 {
                continue;
            }
            let xn = pc[0] / pc[2];
            let yn = pc[1] / pc[2];
            sx2 += xn * xn;
            sxu += xn * p2.x;
            sx += xn;
            su += p2.x;
            sy2 += yn * yn;
            syv += yn * p2.y;
            sy += yn;
            sv += p2.y;
            n += 1;
        }
    }

    if n < 2 {
        return fallback;
    }
    let nf = n as f64;
    let det_x = sx2 * nf - sx * sx;
    let det_y = sy2 * nf - sy * sy;
    if det_x.abs() < 1e-18 || det_y.abs() < 1e-18 {
        return fallback;
    }

    let fx = (sxu * nf - sx * su) / det_x;
    let cx = (sx2 * su - sx * sxu) / det_x;
    let fy = (syv * nf - sy * sv) / det_y;
    let cy = (sy2 * sv - sy * syv) / det_y;
    if !fx.is_finite() || !fy.is_finite() || fx.abs() < 1e-12 || fy.abs() < 1e-12 {
        return fallback;
    }
    CameraIntrinsics::new(fx, fy, cx, cy, fallback.width, fallback.height)
}

/// Gauss-Newton step over the five distortion coefficients with a numeric
/// Jacobian, holding intrinsics and poses fixed.
fn refit_distortion(
    template: &[Point3<f64>],
    point_sets: &[&[Point2<f64>]],
    intrinsics: &CameraIntrinsics,
    poses: &[Pose],
    initial: &Distortion,
) -> Result<Distortion> {
    let total_points: usize = point_sets.iter().map(|s| s.len()).sum();
    if total_points < 10 {
        return Ok(*initial);
    }

    let mut distortion = *initial;
    for _ in 0..5 {
        let mut jtj = nalgebra::Matrix5::<f64>::zeros();
        let mut jtr = nalgebra::Vector5::<f64>::zeros();
        let eps = 1e-7;

        for (points, pose) in point_sets.iter().zip(poses.iter()) {
            let pred = project_points_with_distortion(template, intrinsics, pose, &distortion);
            let perturbed: Vec<_> = (0..5)
                .map(|k| {
                    let mut coeffs = distortion.coefficients();
                    coeffs[k] += eps;
                    project_points_with_distortion(
                        template,
                        intrinsics,
                        pose,
                        &Distortion::from_coefficients(&coeffs),
                    )
                })
                .collect();

            for i in 0..template.len() {
                if !pred[i].x.is_finite() {
                    continue;
                }
                let mut ju = [0.0f64; 5];
                let mut jv = [0.0f64; 5];
                for k in 0..5 {
                    ju[k] = (perturbed[k][i].x - pred[i].x) / eps;
                    jv[k] = (perturbed[k][i].y - pred[i].y) / eps;
                }
                let ru = pred[i].x - points[i].x;
                let rv = pred[i].y - points[i].y;
                for k in 0..5 {
                    jtr[k] += ju[k] * ru + jv[k] * rv;
                    for l in 0..5 {
                        jtj[(k, l)] += ju[k] * ju[l] + jv[k] * jv[l];
                    }
                }
            }
        }

        let Some(delta) = jtj.lu().solve(&jtr) else {
            return Ok(distortion);
        };
        let mut coeffs = distortion.coefficients();
        for k in 0..5 {
            coeffs[k] -= delta[k];
        }
        distortion = Distortion::from_coefficients(&coeffs);
        if delta.norm() < 1e-9 {
            break;
        }
    }

    Ok(distortion)
}
