//! Core tracing runtime
//!
//! - [`context`]: per-execution-unit current trace and node
//! - [`span`]: scoped lifecycle of one node
//! - [`tracer`]: opening, closing and persisting traces
//! - [`traced`]: wrapping plain functions in spans

pub mod context;
pub mod handle;
pub mod span;
pub mod traced;
pub mod tracer;
pub mod tracer_config;

pub use context::{
    clear_context, get_current_node, get_current_trace, propagate_context, push_current_node,
    push_current_trace, reset_current_node, reset_current_trace, Context, ContextGuard, NodeToken,
    TraceContextExt, TraceToken, WithTraceContext,
};
pub use handle::{ErrorInfo, NodeHandle, TraceHandle};
pub use span::{EnteredSpan, Span};
pub use traced::{trace_node, trace_node_async};
pub use tracer::{TraceContext, TraceScope, Tracer};
pub use tracer_config::{TracerConfig, REDACTED, TRUNCATED_SUFFIX};
