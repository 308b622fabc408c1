//! Graphics processing for NORI sprite files
//!
//! This module provides the NORI format itself plus the BMP and PNG
//! adapters used to move bitmaps in and out of it.

pub mod bitmap;
pub mod nori;
pub mod preview;

// Re-export commonly used items for convenience
pub use nori::{decode, encode, FormatDocument};
