use std::{fs, io, path::Path};

use thiserror::Error;
use tracing::info;

use crate::{
    config::{load_config, ConfigError},
    graphics::{
        bitmap::{read_bitmap_dir, BitmapError},
        nori::{encode, EncodeError, Encoded},
    },
};

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("bitmap error: {0}")]
    Bitmap(#[from] BitmapError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}

/// Builds a NORI file from a JSON config and a directory of BMP files.
///
/// The BMP files are matched to the config's bitmaps in ascending file name
/// order; anything that is not a `.bmp` is ignored.
pub fn create_file(config: &Path, bmp_dir: &Path, output: &Path) -> Result<Encoded, CreateError> {
    let document = load_config(config)?;
    info!(
        "Loaded config {} ({} bitmaps, {} animations)",
        config.display(),
        document.bitmaps.len(),
        document.animations.len()
    );

    let pixels = read_bitmap_dir(bmp_dir, &document)?;
    let encoded = encode(&document, &pixels)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &encoded.bytes)?;
    info!(
        "Wrote {} ({} bytes, {} issues)",
        output.display(),
        encoded.bytes.len(),
        encoded.findings.len()
    );

    Ok(encoded)
}
