//! JSON projection of a decoded document
//!
//! The config holds every header, record and frame field. Pixel payloads are
//! left out; they travel as BMP files next to it.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use thiserror::Error;

use crate::graphics::nori::FormatDocument;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Saves the document structure to a JSON file.
pub fn save_config(document: &FormatDocument, path: &Path) -> Result<(), ConfigError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, document)?;
    Ok(())
}

/// Loads a document structure from a JSON file. Bitmaps come back without
/// pixels.
pub fn load_config(path: &Path) -> Result<FormatDocument, ConfigError> {
    let file = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(file)?)
}

/// Byte blocks as lowercase hex strings
pub(crate) mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(D::Error::custom)
    }
}
