//! Overlapping, boundary-aware chunks.

use serde::{Deserialize, Serialize};

use super::boundary::Boundary;

/// Splitter settings. All sizes are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Longest chunk produced.
    pub target_size: usize,
    /// Characters each chunk repeats from the end of the previous one.
    pub overlap: usize,
    /// How far before the target end a cut point is searched for.
    pub look_back: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_size: 100_000,
            overlap: 500,
            look_back: 2000,
        }
    }
}

/// One piece of a split source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    /// Character offset of the first character, inclusive.
    pub start_offset: usize,
    /// Character offset one past the last character.
    pub end_offset: usize,
    pub text: String,
    /// Leading characters shared with the previous chunk.
    pub overlap_with_previous: usize,
}

impl Chunk {
    pub fn char_count(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// Split `source` into ordered chunks no longer than `options.target_size`.
///
/// When a chunk would end mid-text, the cut moves back to the last of
/// `boundaries` inside the look-back window, else to the end of the last
/// blank-line pair, else to the end of the last newline. A cut point is only
/// taken if the chunk stays longer than the overlap; otherwise the chunk
/// ends exactly at the target size. `boundaries` must be sorted by offset.
///
/// Dropping each chunk's first `overlap_with_previous` characters and
/// concatenating gives back `source`.
pub fn split(source: &str, options: &ChunkOptions, boundaries: &[Boundary]) -> Vec<Chunk> {
    // Byte position of every character, plus the end.
    let positions: Vec<usize> = source
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(source.len()))
        .collect();
    let len = positions.len() - 1;
    let target = options.target_size.max(1);
    let text = |start: usize, end: usize| source[positions[start]..positions[end]].to_string();

    if len <= target {
        return vec![Chunk {
            index: 0,
            start_offset: 0,
            end_offset: len,
            text: source.to_string(),
            overlap_with_previous: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut pos = 0;
    let mut previous_end: usize = 0;

    loop {
        let mut end = (pos + target).min(len);
        if end < len {
            let window_start = end.saturating_sub(options.look_back).max(pos);
            if let Some(cut) = find_cut(source, &positions, boundaries, pos, window_start, end)
                .filter(|&cut| cut - pos > options.overlap)
            {
                end = cut;
            }
        }

        chunks.push(Chunk {
            index: chunks.len(),
            start_offset: pos,
            end_offset: end,
            text: text(pos, end),
            overlap_with_previous: previous_end.saturating_sub(pos),
        });

        if end >= len {
            break;
        }
        previous_end = end;
        pos = end.saturating_sub(options.overlap).max(pos + 1);
    }

    chunks
}

/// Best cut point in `[window_start, end]`, by preference.
fn find_cut(
    source: &str,
    positions: &[usize],
    boundaries: &[Boundary],
    pos: usize,
    window_start: usize,
    end: usize,
) -> Option<usize> {
    let upto = boundaries.partition_point(|b| b.offset <= end);
    if let Some(boundary) = boundaries[..upto].last() {
        if boundary.offset >= window_start && boundary.offset > pos {
            return Some(boundary.offset);
        }
    }

    let window = &source[positions[window_start]..positions[end]];
    let after = |byte: usize, skip: usize| window_start + window[..byte].chars().count() + skip;
    if let Some(byte) = window.rfind("\n\n") {
        return Some(after(byte, 2));
    }
    window.rfind('\n').map(|byte| after(byte, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::boundary::detect_boundaries;

    fn reconstruct(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.chars().skip(c.overlap_with_previous).collect::<String>())
            .collect()
    }

    fn options(target_size: usize, overlap: usize, look_back: usize) -> ChunkOptions {
        ChunkOptions {
            target_size,
            overlap,
            look_back,
        }
    }

    #[test]
    fn test_short_source_is_one_chunk() {
        let chunks = split("hello", &ChunkOptions::default(), &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_offset, 5);
        assert_eq!(chunks[0].overlap_with_previous, 0);

        let chunks = split("", &ChunkOptions::default(), &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn test_flat_250k_chars() {
        let source: String = (0..250_000)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunks = split(&source, &ChunkOptions::default(), &[]);

        let spans: Vec<_> = chunks.iter().map(|c| (c.start_offset, c.end_offset)).collect();
        assert_eq!(spans, vec![(0, 100_000), (99_500, 199_500), (199_000, 250_000)]);
        assert_eq!(chunks[1].overlap_with_previous, 500);
        assert_eq!(reconstruct(&chunks), source);
    }

    #[test]
    fn test_cuts_after_last_newline_in_window() {
        let source = format!("{}\n{}", "a".repeat(70), "b".repeat(100));
        let chunks = split(&source, &options(100, 10, 50), &[]);
        assert_eq!(chunks[0].end_offset, 71);
        assert!(chunks[0].text.ends_with('\n'));
        assert_eq!(chunks[1].start_offset, 61);
        assert_eq!(reconstruct(&chunks), source);
    }

    #[test]
    fn test_prefers_blank_line_pair_over_later_newline() {
        let source = format!("{}\n\n{}\n{}", "a".repeat(60), "b".repeat(20), "c".repeat(100));
        let chunks = split(&source, &options(100, 10, 50), &[]);
        assert_eq!(chunks[0].end_offset, 62);
    }

    #[test]
    fn test_prefers_detected_boundary() {
        let source = format!(
            "{}\n# Part two\n{}\n{}",
            "a".repeat(60),
            "b".repeat(20),
            "c".repeat(100)
        );
        let boundaries = detect_boundaries(&source);
        let chunks = split(&source, &options(100, 10, 50), &boundaries);
        assert_eq!(chunks[0].end_offset, 61);
        assert!(chunks[1].text[chunks[1].overlap_with_previous..].starts_with("# Part two"));
        assert_eq!(reconstruct(&chunks), source);
    }

    #[test]
    fn test_cut_inside_overlap_is_ignored() {
        // The only newline leaves a chunk no longer than the overlap.
        let source = format!("{}\n{}", "a".repeat(5), "b".repeat(200));
        let chunks = split(&source, &options(100, 10, 100), &[]);
        assert_eq!(chunks[0].end_offset, 100);
    }

    #[test]
    fn test_overlap_larger_than_target_still_progresses() {
        let source = "x".repeat(50);
        let chunks = split(&source, &options(10, 20, 5), &[]);
        assert!(chunks.windows(2).all(|w| w[1].start_offset > w[0].start_offset));
        assert_eq!(chunks.last().unwrap().end_offset, 50);
        assert_eq!(reconstruct(&chunks), source);
    }

    #[test]
    fn test_multibyte_text_is_split_on_characters() {
        let source = "é".repeat(250);
        let chunks = split(&source, &options(100, 10, 20), &[]);
        assert_eq!(chunks[0].text.chars().count(), 100);
        assert_eq!(reconstruct(&chunks), source);
    }
}
