pub mod board;
pub mod camera;
pub mod dataset;
pub mod geometry;
pub mod point_cloud;
pub mod storage;

pub use board::*;
pub use camera::*;
pub use dataset::*;
pub use geometry::*;
pub use point_cloud::*;

/// Error taxonomy shared by every stage of the pipeline.
///
/// Expected conditions (bad input, missing files, empty results) are reported
/// through these variants; no stage panics for them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input missing: {0}")]
    InputMissing(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("image i/o failure: {0}")]
    Image(#[from] image::ImageError),

    #[error("no valid observations: {0}")]
    NoValidObservations(String),

    #[error("dataset mismatch: {0}")]
    DatasetMismatch(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
