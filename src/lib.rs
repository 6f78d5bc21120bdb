pub use rigscan_calib3d as calib3d;
pub use rigscan_core as core;
pub use rigscan_imgproc as imgproc;
pub use rigscan_io as io;
pub use rigscan_pipeline as pipeline;
pub use rigscan_stereo as stereo;

pub use rigscan_core::{Error, Result};
