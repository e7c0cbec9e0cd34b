//! Encode/decode boundary for persisted traces
//!
//! Traces are stored as schema-versioned JSON. Decoding always re-runs the
//! graph's structural validation, so a dangling edge in a file is reported
//! as an error rather than loaded.

pub mod json;

pub use json::{load_trace_json, save_trace_json, trace_from_json, trace_to_json};
