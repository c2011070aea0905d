//! Content preparation before embedding.
//!
//! This module provides:
//! - Character-window chunking with boundary preference
//! - Pre-admission estimates of vector count and size
//! - Image validation and the text indexed for an image

mod chunk;
mod image;

pub use chunk::{TextChunk, TextChunker, document_size_mb, estimate_vector_count};
pub use image::{integrated_content, new_image_id, validate_image};
