//! Structural split points in text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s").expect("heading pattern is valid"));

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:async\s+def|def|class|function|func|(?:pub(?:\([a-z]+\))?\s+)?(?:async\s+)?(?:fn|struct|enum|trait|mod|impl))\b",
    )
    .expect("definition pattern is valid")
});

/// What kind of structure starts at a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryKind {
    /// `#` to `######` followed by whitespace.
    MarkdownHeading,
    /// An unindented definition keyword (`def`, `class`, `fn`, `struct`, ...).
    Definition,
    /// The first line after a run of blank lines.
    ParagraphBreak,
}

/// A point where a chunk may be cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    /// Character offset of the first character of the boundary line.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    pub kind: BoundaryKind,
    /// The marker line, trimmed. Empty for paragraph breaks.
    pub text: String,
}

/// Scan `source` line by line for headings, definitions and paragraph
/// breaks.
///
/// Offsets are strictly increasing: a line yields at most one boundary, and
/// a heading or definition right after a blank run wins over the paragraph
/// break. Blank lines at the start or end of the text are not breaks.
pub fn detect_boundaries(source: &str) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    let mut offset = 0;
    let mut seen_text = false;
    let mut after_blank = false;

    for (index, line) in source.split_inclusive('\n').enumerate() {
        let width = line.chars().count();
        if line.trim().is_empty() {
            after_blank = seen_text;
            offset += width;
            continue;
        }

        let kind = if HEADING.is_match(line) {
            Some(BoundaryKind::MarkdownHeading)
        } else if DEFINITION.is_match(line) {
            Some(BoundaryKind::Definition)
        } else if after_blank {
            Some(BoundaryKind::ParagraphBreak)
        } else {
            None
        };

        if let Some(kind) = kind {
            let text = match kind {
                BoundaryKind::ParagraphBreak => String::new(),
                _ => line.trim().to_string(),
            };
            boundaries.push(Boundary {
                offset,
                line: index + 1,
                kind,
                text,
            });
        }

        seen_text = true;
        after_blank = false;
        offset += width;
    }

    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(usize, BoundaryKind)> {
        detect_boundaries(source)
            .into_iter()
            .map(|b| (b.line, b.kind))
            .collect()
    }

    #[test]
    fn test_markdown_headings() {
        let source = "# Title\nintro\n## Section\n####### not a heading\n#nospace\n";
        let boundaries = detect_boundaries(source);
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].offset, 0);
        assert_eq!(boundaries[0].text, "# Title");
        assert_eq!(boundaries[1].line, 3);
        assert_eq!(boundaries[1].offset, "# Title\nintro\n".len());
    }

    #[test]
    fn test_definitions_must_be_unindented() {
        let source = "import os\ndef run():\n    def inner():\n        pass\nclass A:\n    pass\n";
        assert_eq!(
            kinds(source),
            vec![(2, BoundaryKind::Definition), (5, BoundaryKind::Definition)]
        );
    }

    #[test]
    fn test_definition_keywords() {
        for line in [
            "fn main() {}",
            "pub fn f() {}",
            "pub(crate) async fn g() {}",
            "impl<T> Foo for T {}",
            "pub struct S;",
            "async def handler():",
            "function go() {",
            "func main() {",
        ] {
            assert_eq!(kinds(line), vec![(1, BoundaryKind::Definition)], "{line}");
        }
        for line in ["default = 1", "classify(x)", "fnord", "  fn indented() {}"] {
            assert!(kinds(line).is_empty(), "{line}");
        }
    }

    #[test]
    fn test_paragraph_breaks() {
        let source = "\n\none\n\n\ntwo\nthree\n   \nfour\n\n";
        let boundaries = detect_boundaries(source);
        assert_eq!(
            boundaries.iter().map(|b| b.line).collect::<Vec<_>>(),
            vec![6, 9]
        );
        assert_eq!(boundaries[0].offset, "\n\none\n\n\n".len());
        assert!(boundaries.iter().all(|b| b.text.is_empty()));
    }

    #[test]
    fn test_heading_after_blank_is_one_boundary() {
        let source = "text\n\n# Next\nmore\n";
        assert_eq!(kinds(source), vec![(3, BoundaryKind::MarkdownHeading)]);
    }

    #[test]
    fn test_offsets_count_characters() {
        let source = "héllo wörld\n\nnext";
        let boundaries = detect_boundaries(source);
        assert_eq!(boundaries[0].offset, 13);
    }

    #[test]
    fn test_plain_text_has_no_boundaries() {
        assert!(detect_boundaries("just one line of prose").is_empty());
        assert!(detect_boundaries("").is_empty());
    }
}
