//! Storage backends for completed traces
//!
//! The tracer hands every finished [`TraceGraph`] to a [`StorageBackend`].
//! Two implementations ship with the crate:
//!
//! - **MemoryStore**: process-lifetime map, the default
//! - **FileStore**: one JSON file per trace under a directory
//!
//! Any other backend can be plugged in by implementing the trait.

pub mod file;
pub mod memory;

use crate::error::Result;
use crate::models::TraceGraph;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Persistence contract for traces
///
/// `save` overwrites any trace previously saved under the same `trace_id`.
pub trait StorageBackend: Send + Sync {
    /// Persist one trace
    fn save(&self, trace: &TraceGraph) -> Result<()>;

    /// Return one trace by id when present
    fn load(&self, trace_id: &str) -> Result<Option<TraceGraph>>;

    /// List known trace ids
    fn list_traces(&self) -> Result<Vec<String>>;
}
