//! Instrumenting plain functions.
//!
//! These wrap a unit of work in a child span of whatever is currently being
//! traced. Outside a trace they call the work directly, so instrumented code
//! runs unchanged in untraced contexts. The body reaches its node through
//! [`get_current_node`](super::context::get_current_node).

use super::span::Span;
use std::fmt;
use std::future::Future;

/// Run `f` as a child span of the current node, if a trace is active
pub fn trace_node<T, E, F>(
    name: impl Into<String>,
    node_type: impl Into<String>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: fmt::Display + fmt::Debug,
{
    match Span::current(name, node_type) {
        Some(span) => span.run(|_| f()),
        None => f(),
    }
}

/// Async form of [`trace_node`]
pub async fn trace_node_async<T, E, F, Fut>(
    name: impl Into<String>,
    node_type: impl Into<String>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + fmt::Debug,
{
    match Span::current(name, node_type) {
        Some(span) => span.run_async(|_| f()).await,
        None => f().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{
        clear_context, get_current_node, push_current_trace, reset_current_trace, TraceContextExt,
    };
    use crate::core::handle::TraceHandle;
    use crate::core::tracer_config::TracerConfig;
    use crate::models::{NodeStatus, NodeType, TraceGraph};

    #[test]
    fn test_no_trace_calls_through() {
        clear_context();
        let result: Result<i32, String> = trace_node("untraced", NodeType::ToolCall, || {
            assert!(get_current_node().is_none());
            Ok(5)
        });
        assert_eq!(result, Ok(5));
    }

    #[test]
    fn test_records_child_span() {
        clear_context();
        let trace = TraceHandle::new(TraceGraph::new("traced"), TracerConfig::default());
        let token = push_current_trace(trace.clone());

        let result: Result<(), String> = trace_node("lookup", NodeType::Retrieval, || {
            let node = get_current_node().unwrap();
            node.input([("query", "rust")]);
            Err("not found".to_string())
        });
        reset_current_trace(token);

        assert!(result.is_err());
        let graph = trace.snapshot();
        let node = graph.nodes.values().next().unwrap();
        assert_eq!(node.name, "lookup");
        assert_eq!(node.node_type, "retrieval");
        assert_eq!(node.status, NodeStatus::Failed);
        assert_eq!(node.input_data["query"], serde_json::json!("rust"));
    }

    #[test]
    fn test_async_no_trace_calls_through() {
        clear_context();
        let result: Result<&str, String> =
            tokio_test::block_on(trace_node_async("untraced", "custom", || async { Ok("done") }));
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn test_async_records_child_of_current_node() {
        clear_context();
        let trace = TraceHandle::new(TraceGraph::new("traced-async"), TracerConfig::default());
        let root = trace.create_node("root".into(), "custom".into(), None);
        let cx = crate::core::context::Context::new()
            .with_trace(trace.clone())
            .with_node(root.clone());

        let result: Result<(), String> = trace_node_async("child", NodeType::LlmCall, || async {
            tokio::task::yield_now().await;
            get_current_node().unwrap().output([("tokens", 12)]);
            Ok(())
        })
        .with_trace_context(cx)
        .await;

        assert!(result.is_ok());
        let graph = trace.snapshot();
        let child = graph.children_of(root.id())[0];
        assert_eq!(child.name, "child");
        assert_eq!(child.status, NodeStatus::Completed);
        assert_eq!(child.output_data["tokens"], serde_json::json!(12));
    }
}
