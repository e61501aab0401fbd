//! LazyEyes Frame Model
//!
//! Defines the pixel containers shared by every stage of the pipeline:
//! - **Image:** Interleaved row-major samples with a fixed pixel layout
//! - **Frame:** 8-bit images as delivered by capture and shown on screen
//! - **FloatImage:** 32-bit float images used for pyramid and spectral work
//! - **Color:** Luma extraction, gray-to-BGR expansion, sample conversion
//!
//! Color images use BGR channel order, matching what camera drivers
//! typically deliver.

pub mod color;
pub mod image;

pub use color::*;
pub use image::*;
