use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::{save_config, ConfigError},
    graphics::{
        bitmap::{from_packed, BitmapError},
        nori::{
            decode,
            renderer::{bitmap_to_rgba, RenderError},
            DecodeError, Decoded, FormatDocument,
        },
        preview::{save_png, PreviewError},
    },
};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("bitmap {index}: {source}")]
    Bitmap { index: usize, source: BitmapError },

    #[error("bitmap {index}: {source}")]
    Render { index: usize, source: RenderError },

    #[error("preview error: {0}")]
    Preview(#[from] PreviewError),
}

/// Options for [`NoriExtractor::extract_file`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Also write a PNG preview for every bitmap
    pub write_png: bool,
    /// Run oxipng over the previews
    pub optimise_png: bool,
}

/// What an extraction wrote
#[derive(Debug)]
pub struct ExtractSummary {
    pub config_path: PathBuf,
    pub bitmap_paths: Vec<PathBuf>,
    pub preview_paths: Vec<PathBuf>,
    pub finding_count: usize,
}

/// Handles analysing NORI files and pulling them apart into a JSON config
/// plus one BMP per bitmap
pub struct NoriExtractor {
    options: ExtractOptions,
}

impl NoriExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        NoriExtractor { options }
    }

    /// Decode `path` and log its structure. With `write_config` the JSON
    /// config is written next to the input.
    pub fn analyze_file(&self, path: &Path, write_config: bool) -> Result<Decoded, ExtractError> {
        let data = fs::read(path)?;
        let decoded = decode(&data)?;
        report(&file_stem(path), &decoded);

        if write_config {
            let config_path = path.with_extension("json");
            save_config(&decoded.document, &config_path)?;
            info!("Wrote config {}", config_path.display());
        }

        Ok(decoded)
    }

    /// Decode `path` and write `<name>.json` plus `<name>_NNNN.bmp` for each
    /// bitmap into `output_dir`.
    pub fn extract_file(
        &self,
        path: &Path,
        output_dir: &Path,
    ) -> Result<ExtractSummary, ExtractError> {
        let data = fs::read(path)?;
        let decoded = decode(&data)?;
        let name = file_stem(path);
        report(&name, &decoded);

        fs::create_dir_all(output_dir)?;

        let config_path = output_dir.join(format!("{}.json", name));
        save_config(&decoded.document, &config_path)?;

        let mut summary = ExtractSummary {
            config_path,
            bitmap_paths: Vec::new(),
            preview_paths: Vec::new(),
            finding_count: decoded.findings.len(),
        };

        let document = &decoded.document;
        for index in 0..document.bitmaps.len() {
            let (bmp_path, png_path) = self.extract_bitmap(document, index, &name, output_dir)?;
            summary.bitmap_paths.push(bmp_path);
            summary.preview_paths.extend(png_path);
        }

        info!(
            "Extracted {} bitmaps from {} into {}",
            summary.bitmap_paths.len(),
            path.display(),
            output_dir.display()
        );
        Ok(summary)
    }

    fn extract_bitmap(
        &self,
        document: &FormatDocument,
        index: usize,
        name: &str,
        output_dir: &Path,
    ) -> Result<(PathBuf, Option<PathBuf>), ExtractError> {
        let bitmap = &document.bitmaps[index];
        let bpp = document.gawi.bits_per_pixel;
        let palette = document.palette.as_ref();

        // Zero padded so ascending file name order is bitmap order
        let stem = format!("{}_{:04}", name, index);

        let bmp = from_packed(&bitmap.pixels, bitmap.width, bitmap.height, bpp, palette)
            .map_err(|source| ExtractError::Bitmap { index, source })?;
        let bmp_path = output_dir.join(format!("{}.bmp", stem));
        fs::write(&bmp_path, bmp)?;
        debug!("Wrote {}", bmp_path.display());

        if !self.options.write_png {
            return Ok((bmp_path, None));
        }

        let image = bitmap_to_rgba(bitmap, bpp, palette)
            .map_err(|source| ExtractError::Render { index, source })?;
        let png_path = output_dir.join(format!("{}.png", stem));
        save_png(&image, &png_path, self.options.optimise_png)?;
        debug!("Wrote {}", png_path.display());

        Ok((bmp_path, Some(png_path)))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "nori".to_string())
}

/// Logs the structure of a decoded file, one line per section
pub fn report(name: &str, decoded: &Decoded) {
    let doc = &decoded.document;

    info!("Filename: {}", name);
    info!(
        "NORI version {}, {} animations, size without bitmaps {}, file size {}",
        doc.header.version,
        doc.header.animation_count,
        doc.header.size_without_bitmaps,
        doc.header.total_size
    );
    info!(
        "GAWI: {} bpp, compressed {}, palette {}, {} bitmaps, section size {}",
        doc.gawi.bits_per_pixel,
        doc.gawi.is_compressed(),
        doc.gawi.has_palette(),
        doc.gawi.bitmap_count,
        doc.gawi.section_size
    );
    if let Some(palette) = &doc.palette {
        info!(
            "Palette: size {}, main range {}",
            palette.size,
            palette
                .main_range
                .map(|r| format!("{}..{}", r.start, r.end))
                .unwrap_or_else(|| "none".to_string())
        );
    }

    for (i, bitmap) in doc.bitmaps.iter().enumerate() {
        debug!(
            "Bitmap {}: {}x{}, {} bytes at offset {} (declared {})",
            i, bitmap.width, bitmap.height, bitmap.data_length, bitmap.offset, bitmap.declared_offset
        );
    }
    for animation in &doc.animations {
        debug!(
            "Animation '{}': {} frames",
            animation.name, animation.frame_count
        );
        for (i, frame) in animation.frames.iter().enumerate() {
            debug!(
                "  Frame {}: delay {}, {} planes",
                i, frame.delay, frame.plane_count
            );
        }
    }

    if decoded.findings.is_empty() {
        info!("No issues found");
    } else {
        info!("{} issues found", decoded.findings.len());
    }
}
