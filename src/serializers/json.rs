//! JSON serialization helpers for trace graphs.

use crate::error::Result;
use crate::models::TraceGraph;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Serialize a trace to JSON text
///
/// `Some(n)` pretty-prints with `n` spaces of indentation; `None` produces
/// compact output.
pub fn trace_to_json(trace: &TraceGraph, indent: Option<usize>) -> Result<String> {
    match indent {
        None => Ok(serde_json::to_string(trace)?),
        Some(width) => {
            let indent = " ".repeat(width);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut buf = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            trace.serialize(&mut serializer)?;
            // serde_json only ever writes valid UTF-8
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
    }
}

/// Deserialize JSON text into a validated TraceGraph
pub fn trace_from_json(payload: &str) -> Result<TraceGraph> {
    Ok(serde_json::from_str(payload)?)
}

/// Persist a trace as a UTF-8 JSON file, creating parent directories
pub fn save_trace_json(
    trace: &TraceGraph,
    path: impl AsRef<Path>,
    indent: Option<usize>,
) -> Result<PathBuf> {
    let output_path = path.as_ref().to_path_buf();
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&output_path, trace_to_json(trace, indent)?)?;
    Ok(output_path)
}

/// Load a trace from a UTF-8 JSON file
pub fn load_trace_json(path: impl AsRef<Path>) -> Result<TraceGraph> {
    let payload = fs::read_to_string(path)?;
    trace_from_json(&payload)
}
