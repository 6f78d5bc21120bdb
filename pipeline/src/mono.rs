//! Monocular calibration stage: corner dataset in, camera model plus optional
//! residual visualizations and undistorted images out.

use crate::{list_image_files, Error, OutputSink, Result};
use image::{Rgb, RgbImage};
use nalgebra::Point2;
use rigscan_calib3d::{calibrate_camera, undistort_image_rgb, TermCriteria};
use rigscan_calib3d::project::project_points_with_distortion;
use rigscan_core::{CameraModel, CornerDataset, Pose};
use rigscan_imgproc::{
    draw_circle, draw_filled_circle, draw_line, draw_text, resize_rgb, scaled_dimensions,
};
use std::path::{Path, PathBuf};

/// Optional artifacts of a monocular calibration run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoOptions {
    /// Render one detected-vs-reprojected residual image per observation.
    pub render_residuals: bool,
    /// Undistort and persist every source image with the estimated model.
    pub save_undistorted: bool,
}

pub struct MonoCalibrator {
    criteria: TermCriteria,
    options: MonoOptions,
}

impl MonoCalibrator {
    pub fn new(criteria: TermCriteria, options: MonoOptions) -> Self {
        Self { criteria, options }
    }

    /// Calibrate from a persisted corner dataset.
    ///
    /// `image_size` is the nominal (post-scale) size the corner coordinates
    /// live in. A missing or empty corner file fails closed; an abnormally
    /// large RMS in the returned model is a soft signal for auditing, not an
    /// error.
    pub fn run(
        &self,
        corner_file: &Path,
        image_folder: &Path,
        image_size: (u32, u32),
        sink: &OutputSink,
    ) -> Result<CameraModel> {
        let dataset = CornerDataset::load(corner_file)?;
        if dataset.is_empty() {
            return Err(Error::NoValidObservations(format!(
                "{} holds no usable corner sets",
                corner_file.display()
            )));
        }

        let outcome = calibrate_camera(&dataset, image_size, self.criteria)?;
        log::info!(
            "camera calibrated over {} view(s), rms {:.4} px",
            dataset.len(),
            outcome.model.rms_reprojection_error
        );

        outcome.model.save(&sink.camera_calibration_file())?;

        if self.options.render_residuals {
            let rendered = self.render_residuals(&dataset, &outcome.model, &outcome.poses, image_folder, sink);
            log::info!("rendered {rendered} residual image(s)");
        }

        if self.options.save_undistorted {
            let saved = self.save_undistorted(&dataset, &outcome.model, image_folder, sink);
            log::info!("saved {saved} undistorted image(s)");
        }

        Ok(outcome.model)
    }

    /// Best-effort residual rendering; failures are logged per image and never
    /// abort the calibration.
    fn render_residuals(
        &self,
        dataset: &CornerDataset,
        model: &CameraModel,
        poses: &[Pose],
        image_folder: &Path,
        sink: &OutputSink,
    ) -> usize {
        let template = dataset.board.object_points();
        let mut rendered = 0usize;

        for (index, (observation, pose)) in dataset.observations.iter().zip(poses.iter()).enumerate()
        {
            let Some(path) = resolve_source_image(image_folder, &observation.source_image) else {
                log::warn!(
                    "no readable source image for observation {index} ({})",
                    observation.source_image
                );
                continue;
            };
            let base = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    log::warn!("cannot read {}: {e}", path.display());
                    continue;
                }
            };
            let base = if dataset.scale_factor != 1.0 {
                let (w, h) = scaled_dimensions(base.width(), base.height(), dataset.scale_factor);
                resize_rgb(&base, w, h)
            } else {
                base
            };

            let projected = project_points_with_distortion(
                &template,
                &model.intrinsics,
                pose,
                &model.distortion,
            );
            let mut canvas = base;
            let mean = draw_residuals(&mut canvas, &observation.points, &projected);

            match sink.residual_image_file(index) {
                Ok(out_path) => match canvas.save(&out_path) {
                    Ok(()) => rendered += 1,
                    Err(e) => log::warn!("cannot write {}: {e}", out_path.display()),
                },
                Err(e) => log::warn!("cannot prepare residual directory: {e}"),
            }
            log::debug!("observation {index}: mean residual {mean:.3} px");
        }
        rendered
    }

    fn save_undistorted(
        &self,
        dataset: &CornerDataset,
        model: &CameraModel,
        image_folder: &Path,
        sink: &OutputSink,
    ) -> usize {
        let files = match list_image_files(image_folder) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("cannot list {}: {e}", image_folder.display());
                return 0;
            }
        };

        let mut saved = 0usize;
        for path in files {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            let result = (|| -> Result<()> {
                let mut img = image::open(&path)?.to_rgb8();
                if dataset.scale_factor != 1.0 {
                    let (w, h) = scaled_dimensions(img.width(), img.height(), dataset.scale_factor);
                    img = resize_rgb(&img, w, h);
                }
                let undistorted = undistort_image_rgb(&img, &model.intrinsics, &model.distortion)?;
                undistorted.save(sink.undistorted_image_file(&name)?)?;
                Ok(())
            })();
            match result {
                Ok(()) => saved += 1,
                Err(e) => log::warn!("undistortion of {name} failed: {e}"),
            }
        }
        saved
    }
}

/// The dataset records each observation's source file; fall back to the first
/// readable image in the folder only when that file has gone missing.
fn resolve_source_image(folder: &Path, recorded_name: &str) -> Option<PathBuf> {
    let direct = folder.join(recorded_name);
    if direct.is_file() {
        return Some(direct);
    }
    log::warn!(
        "{} not found in {}, falling back to first available image",
        recorded_name,
        folder.display()
    );
    list_image_files(folder).ok()?.into_iter().next()
}

/// Detected corners (green), reprojected corners (red), connecting error
/// vectors (magenta), an error-magnitude ring per corner, and the mean error
/// stamped top-left. Returns the mean error in pixels.
fn draw_residuals(
    canvas: &mut RgbImage,
    detected: &[Point2<f64>],
    projected: &[Point2<f64>],
) -> f64 {
    let errors: Vec<f64> = detected
        .iter()
        .zip(projected.iter())
        .map(|(d, p)| (d - p).norm())
        .collect();
    let max_error = errors.iter().copied().fold(f64::EPSILON, f64::max);
    let mean_error = errors.iter().sum::<f64>() / errors.len().max(1) as f64;

    for (d, p) in detected.iter().zip(projected.iter()) {
        draw_line(
            canvas,
            d.x.round() as i32,
            d.y.round() as i32,
            p.x.round() as i32,
            p.y.round() as i32,
            Rgb([255, 0, 255]),
        );
    }
    for (i, (d, p)) in detected.iter().zip(projected.iter()).enumerate() {
        draw_filled_circle(canvas, d.x.round() as i32, d.y.round() as i32, 3, Rgb([0, 255, 0]));
        draw_filled_circle(canvas, p.x.round() as i32, p.y.round() as i32, 3, Rgb([255, 0, 0]));

        let t = errors[i] / max_error;
        let ring = Rgb([(255.0 * t) as u8, (255.0 * (1.0 - t)) as u8, 0]);
        draw_circle(canvas, d.x.round() as i32, d.y.round() as i32, 5, ring);
    }

    draw_text(
        canvas,
        10,
        10,
        &format!("avg err: {mean_error:.3} px"),
        2,
        Rgb([255, 255, 255]),
    );
    mean_error
}
