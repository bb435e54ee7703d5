//! Chunking commands for recall CLI: `info`, `boundaries` and `chunk`.
//!
//! Each reads one file (invalid UTF-8 is replaced) and prints JSON.

use std::path::Path;

use anyhow::Context;
use recall_core::chunk::{self, ChunkOptions, Measurement};
use serde::Serialize;

#[derive(Serialize)]
struct FileInfo<'a> {
    file: &'a Path,
    #[serde(flatten)]
    measurement: Measurement,
}

/// Print size and structure metrics.
pub fn info(path: &Path) -> anyhow::Result<()> {
    let source = read_text(path)?;
    print_json(&FileInfo {
        file: path,
        measurement: chunk::measure(&source),
    })
}

/// Print detected boundaries.
pub fn boundaries(path: &Path) -> anyhow::Result<()> {
    let source = read_text(path)?;
    print_json(&chunk::detect_boundaries(&source))
}

/// Print the chunks of a file.
pub fn split(path: &Path, size: usize, overlap: usize) -> anyhow::Result<()> {
    if size == 0 {
        anyhow::bail!("--size must be at least 1");
    }
    let source = read_text(path)?;
    let options = ChunkOptions {
        target_size: size,
        overlap,
        ..ChunkOptions::default()
    };
    tracing::debug!(
        "Chunking {} with size {} and overlap {}",
        path.display(),
        size,
        overlap
    );
    print_json(&chunk::chunk(&source, &options))
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    if !path.is_file() {
        anyhow::bail!("{} is not a file", path.display());
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
