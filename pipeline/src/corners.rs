//! Corner extraction stage: folder of checkerboard photos in, corner dataset
//! plus review overlays out.

use crate::{list_image_files, Error, OutputSink, Result};
use image::{Rgb, RgbImage};
use nalgebra::Point2;
use rigscan_calib3d::{corner_subpix, find_chessboard_corners, TermCriteria};
use rigscan_core::{BoardGeometry, CornerDataset, CornerObservation};
use rigscan_imgproc::{
    convert_rgb_to_gray, draw_filled_circle, draw_line, gaussian_blur, resize_rgb,
    scaled_dimensions,
};
use std::path::Path;

const BLUR_SIGMA: f32 = 1.0;
const BLUR_KERNEL: usize = 5;
const SUBPIX_WINDOW: usize = 5;

/// Per-batch outcome counters reported alongside the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionReport {
    pub total_images: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct CornerExtractor {
    board: BoardGeometry,
    scale_factor: f64,
    refinement: TermCriteria,
}

impl CornerExtractor {
    pub fn new(board: BoardGeometry, scale_factor: f64) -> Result<Self> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "scale factor must be finite and positive, got {scale_factor}"
            )));
        }
        Ok(Self {
            board,
            scale_factor,
            refinement: TermCriteria::corner_refinement(),
        })
    }

    /// Process every recognized image in `input_folder`.
    ///
    /// Individual failures (unreadable file, board not found) are logged and
    /// skipped; the batch fails only when no image yields a valid
    /// observation, in which case no corner file is written.
    pub fn run(
        &self,
        input_folder: &Path,
        sink: &OutputSink,
    ) -> Result<(CornerDataset, ExtractionReport)> {
        let files = list_image_files(input_folder)?;
        if files.is_empty() {
            return Err(Error::NoValidObservations(format!(
                "no image files in {}",
                input_folder.display()
            )));
        }

        let mut dataset = CornerDataset::new(self.board, self.scale_factor);
        let mut failed = 0usize;
        for path in &files {
            match self.process_image(path, sink) {
                Ok(observation) => {
                    log::info!("corners detected in {}", observation.source_image);
                    dataset.push(observation)?;
                }
                Err(e) => {
                    log::warn!("skipping {}: {e}", path.display());
                    failed += 1;
                }
            }
        }

        let report = ExtractionReport {
            total_images: files.len(),
            succeeded: dataset.len(),
            failed,
        };
        if dataset.is_empty() {
            return Err(Error::NoValidObservations(format!(
                "no usable checkerboard images among {} candidates",
                report.total_images
            )));
        }

        dataset.save(&sink.corner_data_file()?)?;
        log::info!(
            "corner extraction: {}/{} images accepted",
            report.succeeded,
            report.total_images
        );
        Ok((dataset, report))
    }

    fn process_image(&self, path: &Path, sink: &OutputSink) -> Result<CornerObservation> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        let mut color = image::open(path)?.to_rgb8();
        if self.scale_factor != 1.0 {
            let (w, h) = scaled_dimensions(color.width(), color.height(), self.scale_factor);
            color = resize_rgb(&color, w, h);
        }

        let gray = convert_rgb_to_gray(&color);
        let blurred = gaussian_blur(&gray, BLUR_SIGMA, BLUR_KERNEL);

        let mut corners = find_chessboard_corners(&blurred, &self.board)?;
        corner_subpix(&blurred, &mut corners, SUBPIX_WINDOW, self.refinement)?;

        let mut overlay = color.clone();
        draw_corner_overlay(&mut overlay, &corners, &self.board);
        let overlay_path = sink.corner_image_file(&file_name)?;
        if let Err(e) = overlay.save(&overlay_path) {
            log::warn!("could not write overlay {}: {e}", overlay_path.display());
        }

        Ok(CornerObservation::new(file_name, corners))
    }
}

/// Accepted corners drawn onto the post-scale image: one color per board row,
/// consecutive corners joined so the detected ordering is visible.
fn draw_corner_overlay(img: &mut RgbImage, corners: &[Point2<f64>], board: &BoardGeometry) {
    const ROW_COLORS: [[u8; 3]; 6] = [
        [255, 0, 0],
        [255, 160, 0],
        [220, 220, 0],
        [0, 200, 0],
        [0, 120, 255],
        [180, 0, 255],
    ];

    for (i, pair) in corners.windows(2).enumerate() {
        // Do not connect the wrap from one row's end to the next row's start.
        if (i + 1) % board.cols == 0 {
            continue;
        }
        draw_line(
            img,
            pair[0].x.round() as i32,
            pair[0].y.round() as i32,
            pair[1].x.round() as i32,
            pair[1].y.round() as i32,
            Rgb([255, 255, 255]),
        );
    }
    for (i, corner) in corners.iter().enumerate() {
        let color = ROW_COLORS[(i / board.cols) % ROW_COLORS.len()];
        draw_filled_circle(
            img,
            corner.x.round() as i32,
            corner.y.round() as i32,
            4,
            Rgb(color),
        );
    }
}
