//! PNG preview output
//!
//! Previews are written at full quality first and optionally squeezed with
//! oxipng afterwards.

use std::{fs, io, path::Path};

use image::{ImageError, RgbaImage};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("PNG optimisation failed: {0}")]
    Optimise(String),
}

/// Save `image` as a PNG at `path`, running oxipng over it when `optimise`
/// is set.
pub fn save_png(image: &RgbaImage, path: &Path, optimise: bool) -> Result<(), PreviewError> {
    if !optimise {
        image.save(path)?;
        return Ok(());
    }

    let temp_path = path.with_extension("temp.png");
    image.save(&temp_path)?;

    let mut options = oxipng::Options::from_preset(2);
    options.bit_depth_reduction = true;

    let result = oxipng::optimize(
        &oxipng::InFile::Path(temp_path.clone()),
        &oxipng::OutFile::Path(Some(path.to_path_buf())),
        &options,
    )
    .map_err(|e| PreviewError::Optimise(e.to_string()));

    if let Err(e) = fs::remove_file(&temp_path) {
        warn!("failed to remove temporary file {}: {}", temp_path.display(), e);
    }

    result
}
