use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::{PipelineError, PipelineResult};
use crate::structuring::{Structured, WordEntry};

const INDENT: &[u8] = b"    ";

/// Pretty JSON with four-space indentation and non-ASCII left as is.
pub fn render_json(result: &Structured) -> serde_json::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(INDENT));
    result.serialize(&mut serializer)?;
    Ok(buffer)
}

/// Replaces `path` with the rendered result. The bytes go to a temporary file
/// next to the target first, so a failed write leaves the old file intact.
pub fn write_result(path: &Path, result: &Structured) -> PipelineResult<()> {
    let write_error = |source: std::io::Error| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let bytes = render_json(result).map_err(|err| write_error(err.into()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".ocr-wordlist-")
        .suffix(".json.tmp")
        .tempfile_in(dir)
        .map_err(write_error)?;
    tmp.write_all(&bytes).map_err(write_error)?;
    tmp.as_file().sync_all().map_err(write_error)?;
    tmp.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}

/// Reads a written word list back. A sentinel file yields `Structured::Failed`.
pub fn read_result(path: &Path) -> anyhow::Result<Structured> {
    use anyhow::Context;

    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if value == serde_json::json!([crate::structuring::SENTINEL]) {
        return Ok(Structured::Failed);
    }
    let entries: Vec<WordEntry> = serde_json::from_value(value)
        .with_context(|| format!("unexpected word list layout in {}", path.display()))?;
    Ok(Structured::Entries(entries))
}
