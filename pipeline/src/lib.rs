//! Folder-driven pipeline stages.
//!
//! Each component consumes upstream artifacts and writes its outputs through
//! an [`OutputSink`]; data flows strictly forward and nothing mutates another
//! stage's output after handoff. Stage ordering is the orchestrating caller's
//! responsibility.

pub mod corners;
pub mod mono;
pub mod reconstruct;
pub mod sink;
pub mod stereo;

pub use corners::{CornerExtractor, ExtractionReport};
pub use mono::{MonoCalibrator, MonoOptions};
pub use reconstruct::{DenseReconstructor, ReconstructionSummary};
pub use sink::OutputSink;
pub use stereo::StereoCalibrator;

pub use rigscan_core::{Error, Result};

/// Case-insensitive extension whitelist for still images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

pub(crate) fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ok| *ok == lower)
        })
        .unwrap_or(false)
}

/// Sorted image files directly inside `folder`.
pub(crate) fn list_image_files(folder: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::InputMissing(folder.display().to_string()));
    }
    let mut files: Vec<_> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn extension_whitelist_is_case_insensitive() {
        assert!(is_image_file(Path::new("a/b/IMG_001.JPG")));
        assert!(is_image_file(Path::new("scan.TIFF")));
        assert!(is_image_file(Path::new("x.png")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("corners")));
    }
}
