//! Checkerboard corner detection.
//!
//! Harris response over the luminance image, non-maximum suppression, then a
//! PCA-based assignment of the strongest candidates onto the expected grid.
//! Detected corners come back row-major, matching the board's object-point
//! template, and are refined to subpixel accuracy before returning.

use crate::{Error, Result, TermCriteria};
use image::GrayImage;
use nalgebra::{Matrix2, Point2, SymmetricEigen, Vector2};
use rayon::prelude::*;
use rigscan_core::BoardGeometry;

const HARRIS_K: f64 = 0.04;
const RESPONSE_THRESHOLD: f64 = 0.01;

/// Locate the full inner-corner grid of a checkerboard.
///
/// Fails when the image shows no corner-like structure or when fewer
/// candidates than grid cells survive suppression; the caller treats that as
/// a skipped image, not a fatal condition.
pub fn find_chessboard_corners(
    image: &GrayImage,
    board: &BoardGeometry,
) -> Result<Vec<Point2<f64>>> {
    let need = board.corner_count();
    if image.width() < 8 || image.height() < 8 {
        return Err(Error::InvalidParameters(
            "image too small for checkerboard detection".to_string(),
        ));
    }

    let response = corner_response(image, HARRIS_K, 1);
    let peak = response
        .values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
        .max(0.0);
    if peak <= 0.0 {
        return Err(Error::NoValidObservations(
            "no corner-like structure in image".to_string(),
        ));
    }

    let mut candidates = local_maxima(&response, peak * RESPONSE_THRESHOLD);
    if candidates.len() < need {
        return Err(Error::NoValidObservations(format!(
            "{} corner candidates, grid needs {need}",
            candidates.len()
        )));
    }
    candidates.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate((need * 10).max(need));

    let mut ordered = order_into_grid(&candidates, board)?;
    corner_subpix(image, &mut ordered, 3, TermCriteria::new(25, 1e-3))?;
    Ok(ordered)
}

/// Refine corner positions to subpixel accuracy with a gradient-weighted
/// centroid in a local window, iterating until the shift drops below
/// `criteria.eps` or the iteration budget runs out.
pub fn corner_subpix(
    image: &GrayImage,
    corners: &mut [Point2<f64>],
    win_radius: usize,
    criteria: TermCriteria,
) -> Result<()> {
    if win_radius == 0 {
        return Err(Error::InvalidParameters(
            "corner_subpix needs win_radius >= 1".to_string(),
        ));
    }
    let w = image.width() as i32;
    let h = image.height() as i32;
    let r = win_radius as i32;

    corners.par_iter_mut().for_each(|p| {
        let mut x = p.x;
        let mut y = p.y;
        for _ in 0..criteria.max_iters {
            let cx = x.round() as i32;
            let cy = y.round() as i32;
            let mut weight_sum = 0.0f64;
            let mut wx = 0.0f64;
            let mut wy = 0.0f64;
            for dy in -r..=r {
                for dx in -r..=r {
                    let xx = cx + dx;
                    let yy = cy + dy;
                    if xx <= 0 || yy <= 0 || xx >= w - 1 || yy >= h - 1 {
                        continue;
                    }
                    let gx = (image.get_pixel((xx + 1) as u32, yy as u32)[0] as f64
                        - image.get_pixel((xx - 1) as u32, yy as u32)[0] as f64)
                        * 0.5;
                    let gy = (image.get_pixel(xx as u32, (yy + 1) as u32)[0] as f64
                        - image.get_pixel(xx as u32, (yy - 1) as u32)[0] as f64)
                        * 0.5;
                    let weight = (gx * gx + gy * gy).sqrt();
                    if weight <= 1e-9 {
                        continue;
                    }
                    weight_sum += weight;
                    wx += weight * xx as f64;
                    wy += weight * yy as f64;
                }
            }
            if weight_sum <= 1e-9 {
                break;
            }
            let nx = wx / weight_sum;
            let ny = wy / weight_sum;
            let shift = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
            x = nx;
            y = ny;
            if shift < criteria.eps {
                break;
            }
        }
        p.x = x.clamp(0.0, (image.width() - 1) as f64);
        p.y = y.clamp(0.0, (image.height() - 1) as f64);
    });
    Ok(())
}

struct ResponseMap {
    values: Vec<f64>,
    width: usize,
    height: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: f64,
    y: f64,
    strength: f64,
}

fn corner_response(image: &GrayImage, k: f64, win_radius: usize) -> ResponseMap {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut grad_x = vec![0.0f64; width * height];
    let mut grad_y = vec![0.0f64; width * height];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = image.get_pixel((x + 1) as u32, y as u32)[0] as f64
                - image.get_pixel((x - 1) as u32, y as u32)[0] as f64;
            let gy = image.get_pixel(x as u32, (y + 1) as u32)[0] as f64
                - image.get_pixel(x as u32, (y - 1) as u32)[0] as f64;
            grad_x[y * width + x] = gx * 0.5;
            grad_y[y * width + x] = gy * 0.5;
        }
    }

    let mut values = vec![0.0f64; width * height];
    let r = win_radius as i32;
    values
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            if y < win_radius || y >= height - win_radius {
                return;
            }
            for x in win_radius..width - win_radius {
                let mut sxx = 0.0;
                let mut sxy = 0.0;
                let mut syy = 0.0;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let xx = (x as i32 + dx) as usize;
                        let yy = (y as i32 + dy) as usize;
                        let gx = grad_x[yy * width + xx];
                        let gy = grad_y[yy * width + xx];
                        sxx += gx * gx;
                        sxy += gx * gy;
                        syy += gy * gy;
                    }
                }
                let det = sxx * syy - sxy * sxy;
                let trace = sxx + syy;
                row[x] = det - k * trace * trace;
            }
        });

    ResponseMap {
        values,
        width,
        height,
    }
}

fn local_maxima(response: &ResponseMap, threshold: f64) -> Vec<Candidate> {
    let mut out = Vec::new();
    for y in 1..response.height - 1 {
        for x in 1..response.width - 1 {
            let v = response.values[y * response.width + x];
            if v <= threshold {
                continue;
            }
            let mut is_max = true;
            'scan: for yy in (y - 1)..=(y + 1) {
                for xx in (x - 1)..=(x + 1) {
                    if (xx != x || yy != y) && response.values[yy * response.width + xx] > v {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                out.push(Candidate {
                    x: x as f64,
                    y: y as f64,
                    strength: v,
                });
            }
        }
    }
    out
}

/// Assign candidates to the board grid. Principal axes of the candidate set
/// give board-aligned coordinates; 1D k-means along each axis recovers the
/// row/column centers, and each grid cell greedily takes its nearest unused
/// candidate.
fn order_into_grid(candidates: &[Candidate], board: &BoardGeometry) -> Result<Vec<Point2<f64>>> {
    let points: Vec<Vector2<f64>> = candidates
        .iter()
        .map(|c| Vector2::new(c.x, c.y))
        .collect();
    let need = board.corner_count();
    if points.len() < need {
        return Err(Error::NoValidObservations(
            "not enough candidates to assemble grid".to_string(),
        ));
    }

    let mean = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / points.len() as f64;
    let mut cov = Matrix2::<f64>::zeros();
    for p in &points {
        let d = p - mean;
        cov += d * d.transpose();
    }
    cov /= points.len() as f64;

    let eig = SymmetricEigen::new(cov);
    let (major, minor) = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
        (0usize, 1usize)
    } else {
        (1usize, 0usize)
    };
    let axis_u = eig.eigenvectors.column(major).into_owned();
    let axis_v = eig.eigenvectors.column(minor).into_owned();

    let uv: Vec<(f64, f64)> = points
        .iter()
        .map(|p| {
            let d = p - mean;
            (d.dot(&axis_u), d.dot(&axis_v))
        })
        .collect();

    let u_vals: Vec<f64> = uv.iter().map(|(u, _)| *u).collect();
    let v_vals: Vec<f64> = uv.iter().map(|(_, v)| *v).collect();
    let mut u_centers = kmeans_1d(&u_vals, board.cols, 30);
    let mut v_centers = kmeans_1d(&v_vals, board.rows, 30);
    u_centers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v_centers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut used = vec![false; points.len()];
    let mut ordered = Vec::with_capacity(need);
    for vc in &v_centers {
        for uc in &u_centers {
            let mut best = None;
            let mut best_cost = f64::INFINITY;
            for (i, (u, v)) in uv.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let cost = (u - uc).powi(2) + (v - vc).powi(2);
                if cost < best_cost {
                    best_cost = cost;
                    best = Some(i);
                }
            }
            let idx = best.ok_or_else(|| {
                Error::NoValidObservations("failed to fill checkerboard grid".to_string())
            })?;
            used[idx] = true;
            ordered.push(Point2::new(points[idx][0], points[idx][1]));
        }
    }
    Ok(ordered)
}

fn kmeans_1d(values: &[f64], k: usize, iters: usize) -> Vec<f64> {
    let min_v = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_v = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if k == 1 || (max_v - min_v).abs() < 1e-12 {
        return vec![0.5 * (min_v + max_v); k];
    }

    let mut centers: Vec<f64> = (0..k)
        .map(|i| min_v + i as f64 * (max_v - min_v) / (k as f64 - 1.0))
        .collect();

    for _ in 0..iters {
        let mut sums = vec![0.0f64; k];
        let mut counts = vec![0usize; k];
        for &v in values {
            let mut nearest = 0usize;
            let mut nearest_dist = (v - centers[0]).abs();
            for (i, &c) in centers.iter().enumerate().skip(1) {
                let d = (v - c).abs();
                if d < nearest_dist {
                    nearest_dist = d;
                    nearest = i;
                }
            }
            sums[nearest] += v;
            counts[nearest] += 1;
        }
        for i in 0..k {
            if counts[i] > 0 {
                centers[i] = sums[i] / counts[i] as f64;
            }
        }
    }
    centers
}
