//! Lens distortion correction: point undistortion, undistort/rectify map
//! generation, and whole-image undistortion.

use crate::{Error, Result};
use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Point2, Vector3};
use rayon::prelude::*;
use rigscan_core::{CameraIntrinsics, Distortion};
use rigscan_imgproc::{remap, remap_rgb, BorderMode, Interpolation};

/// Undistort pixel coordinates back to ideal pinhole positions.
pub fn undistort_points(
    distorted: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Result<Vec<Point2<f64>>> {
    if intrinsics.fx.abs() <= 1e-12 || intrinsics.fy.abs() <= 1e-12 {
        return Err(Error::InvalidParameters(
            "undistort_points requires non-zero focal lengths".to_string(),
        ));
    }

    Ok(distorted
        .iter()
        .map(|p| {
            let xd = (p.x - intrinsics.cx) / intrinsics.fx;
            let yd = (p.y - intrinsics.cy) / intrinsics.fy;
            let (xu, yu) = distortion.remove(xd, yd);
            Point2::new(
                intrinsics.fx * xu + intrinsics.cx,
                intrinsics.fy * yu + intrinsics.cy,
            )
        })
        .collect())
}

/// Build per-pixel source-coordinate maps that undistort and rectify in one
/// remap: destination pixels go through the new camera, the inverse
/// rectification rotation, and the forward distortion model.
pub fn init_undistort_rectify_map(
    image_size: (u32, u32),
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    rectification: &Matrix3<f64>,
    new_camera: &CameraIntrinsics,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let (width, height) = image_size;
    if width == 0 || height == 0 {
        return Err(Error::InvalidParameters(
            "undistort/rectify maps need a non-zero image size".to_string(),
        ));
    }

    let k_new_inv = new_camera.inverse_matrix();
    let r_inv = rectification
        .try_inverse()
        .unwrap_or_else(Matrix3::identity);

    let mut map_x = vec![0.0f32; (width * height) as usize];
    let mut map_y = vec![0.0f32; (width * height) as usize];

    map_x
        .par_chunks_mut(width as usize)
        .zip(map_y.par_chunks_mut(width as usize))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            for x in 0..width as usize {
                let dst = Vector3::new(x as f64, y as f64, 1.0);
                let rectified = k_new_inv * dst;
                let original = r_inv * rectified;
                if original[2].abs() <= 1e-12 {
                    row_x[x] = -1.0;
                    row_y[x] = -1.0;
                    continue;
                }
                let xn = original[0] / original[2];
                let yn = original[1] / original[2];
                let (xd, yd) = distortion.apply(xn, yn);
                row_x[x] = (intrinsics.fx * xd + intrinsics.cx) as f32;
                row_y[x] = (intrinsics.fy * yd + intrinsics.cy) as f32;
            }
        });

    Ok((map_x, map_y))
}

/// Undistort a grayscale image against its own intrinsics.
pub fn undistort_image(
    src: &GrayImage,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Result<GrayImage> {
    let (map_x, map_y) = init_undistort_rectify_map(
        (src.width(), src.height()),
        intrinsics,
        distortion,
        &Matrix3::identity(),
        intrinsics,
    )?;
    Ok(remap(
        src,
        &map_x,
        &map_y,
        src.width(),
        src.height(),
        Interpolation::Linear,
        BorderMode::Constant(0),
    ))
}

/// Color variant of [`undistort_image`].
pub fn undistort_image_rgb(
    src: &RgbImage,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Result<RgbImage> {
    let (map_x, map_y) = init_undistort_rectify_map(
        (src.width(), src.height()),
        intrinsics,
        distortion,
        &Matrix3::identity(),
        intrinsics,
    )?;
    Ok(remap_rgb(
        src,
        &map_x,
        &map_y,
        src.width(),
        src.height(),
        Interpolation::Linear,
        BorderMode::Constant(0),
    ))
}
