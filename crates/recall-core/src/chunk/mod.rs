//! Deterministic text chunking.
//!
//! Three independent steps, all in character offsets:
//! - [`measure`] reports size and structure metrics
//! - [`detect_boundaries`] finds headings, definitions and paragraph breaks
//! - [`split`] cuts the text into overlapping chunks, preferring boundaries

mod boundary;
mod measure;
mod splitter;

pub use boundary::{Boundary, BoundaryKind, detect_boundaries};
pub use measure::{CHARS_PER_UNIT, Measurement, SUGGESTED_CHUNK_CHARS, StructureType, measure};
pub use splitter::{Chunk, ChunkOptions, split};

/// Detect boundaries in `source` and split on them.
pub fn chunk(source: &str, options: &ChunkOptions) -> Vec<Chunk> {
    split(source, options, &detect_boundaries(source))
}
