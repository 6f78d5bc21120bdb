use crate::storage::{read_json, write_json};
use crate::{BoardGeometry, Error, Result};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One image's detected corner grid, ordered row-major to match the board's
/// object-point template, plus the image it came from.
#[derive(Debug, Clone)]
pub struct CornerObservation {
    /// File name of the source image inside the scanned folder.
    pub source_image: String,
    pub points: Vec<Point2<f64>>,
}

impl CornerObservation {
    pub fn new(source_image: impl Into<String>, points: Vec<Point2<f64>>) -> Self {
        Self {
            source_image: source_image.into(),
            points,
        }
    }
}

/// Ordered corner observations for one camera, with the board geometry and the
/// detection-time image scale. Produced by the corner extractor, consumed
/// read-only by both calibrators.
#[derive(Debug, Clone)]
pub struct CornerDataset {
    pub board: BoardGeometry,
    pub scale_factor: f64,
    pub observations: Vec<CornerObservation>,
}

#[derive(Serialize, Deserialize)]
struct CornerDatasetRecord {
    board_width: usize,
    board_height: usize,
    square_size: f64,
    image_count: usize,
    scale_factor: f64,
    image_files: Vec<String>,
    corners: Vec<Vec<[f64; 2]>>,
}

impl CornerDataset {
    pub fn new(board: BoardGeometry, scale_factor: f64) -> Self {
        Self {
            board,
            scale_factor,
            observations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Append an observation. Rejects grids whose point count does not match
    /// the board template.
    pub fn push(&mut self, observation: CornerObservation) -> Result<()> {
        if observation.points.len() != self.board.corner_count() {
            return Err(Error::InvalidParameters(format!(
                "observation from {} has {} corners, board expects {}",
                observation.source_image,
                observation.points.len(),
                self.board.corner_count()
            )));
        }
        self.observations.push(observation);
        Ok(())
    }

    pub fn point_sets(&self) -> Vec<&[Point2<f64>]> {
        self.observations.iter().map(|o| o.points.as_slice()).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let record = CornerDatasetRecord {
            board_width: self.board.cols,
            board_height: self.board.rows,
            square_size: self.board.square_size,
            image_count: self.observations.len(),
            scale_factor: self.scale_factor,
            image_files: self
                .observations
                .iter()
                .map(|o| o.source_image.clone())
                .collect(),
            corners: self
                .observations
                .iter()
                .map(|o| o.points.iter().map(|p| [p.x, p.y]).collect())
                .collect(),
        };
        write_json(path, &record)
    }

    /// Load a dataset record. Observations whose corner count does not match
    /// the board are invalid: they are logged and excluded rather than
    /// poisoning the whole dataset.
    pub fn load(path: &Path) -> Result<Self> {
        let record: CornerDatasetRecord = read_json(path)?;
        let board = BoardGeometry::new(record.board_width, record.board_height, record.square_size)?;

        let expected = board.corner_count();
        let mut dataset = CornerDataset::new(board, record.scale_factor);
        for (i, points) in record.corners.iter().enumerate() {
            if points.len() != expected {
                log::warn!(
                    "{}: corner set {} has {} points, expected {}; skipping",
                    path.display(),
                    i,
                    points.len(),
                    expected
                );
                continue;
            }
            let name = record
                .image_files
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("image_{i}"));
            dataset.observations.push(CornerObservation::new(
                name,
                points.iter().map(|p| Point2::new(p[0], p[1])).collect(),
            ));
        }
        Ok(dataset)
    }
}
