//! Tools for the NORI sprite/animation format: decoding, re-encoding and
//! moving bitmaps in and out as BMP files.

pub mod binary_utils;
pub mod config;
pub mod graphics;
pub mod nori_creator;
pub mod nori_extractor;
