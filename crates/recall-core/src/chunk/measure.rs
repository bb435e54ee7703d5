//! Size and structure metrics for a text source.

use serde::{Deserialize, Serialize};

use super::boundary::{BoundaryKind, detect_boundaries};

/// Characters per estimated processing unit.
pub const CHARS_PER_UNIT: usize = 4;

/// Chunk size assumed when suggesting a chunk count.
pub const SUGGESTED_CHUNK_CHARS: usize = 100_000;

/// Structure found in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    MarkdownHeadings,
    Definitions,
}

/// Metrics reported by [`measure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// UTF-8 length in bytes.
    pub byte_size: usize,
    /// Newlines, plus one for a non-empty unterminated last line.
    pub line_count: usize,
    /// Unicode scalar values.
    pub character_count: usize,
    /// `character_count / 4`. A planning heuristic, not an exact count.
    pub estimated_unit_count: usize,
    /// Chunks of [`SUGGESTED_CHUNK_CHARS`] needed to cover the text, at least one.
    pub suggested_chunk_count: usize,
    pub has_structure: bool,
    pub structure_types: Vec<StructureType>,
}

/// Measure `source`.
pub fn measure(source: &str) -> Measurement {
    let character_count = source.chars().count();
    let newlines = source.bytes().filter(|&b| b == b'\n').count();
    let line_count = newlines + usize::from(!source.is_empty() && !source.ends_with('\n'));

    let boundaries = detect_boundaries(source);
    let mut structure_types = Vec::new();
    if boundaries
        .iter()
        .any(|b| b.kind == BoundaryKind::MarkdownHeading)
    {
        structure_types.push(StructureType::MarkdownHeadings);
    }
    if boundaries.iter().any(|b| b.kind == BoundaryKind::Definition) {
        structure_types.push(StructureType::Definitions);
    }

    Measurement {
        byte_size: source.len(),
        line_count,
        character_count,
        estimated_unit_count: character_count / CHARS_PER_UNIT,
        suggested_chunk_count: character_count.div_ceil(SUGGESTED_CHUNK_CHARS).max(1),
        has_structure: !structure_types.is_empty(),
        structure_types,
    }
}
