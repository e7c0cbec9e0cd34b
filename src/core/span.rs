//! Spans: the scoped lifecycle of one node.
//!
//! A [`Span`] is created `pending`, becomes `running` when entered and is
//! closed exactly once. Closing records the outcome, stamps `end_time` and
//! restores the node that was current before the span was entered.

use super::context::{
    get_current_node, get_current_trace, push_current_node, reset_current_node, Context, NodeToken,
    TraceContextExt,
};
use super::handle::{ErrorInfo, NodeHandle, Outcome, TraceHandle};
use crate::error::{NodetracerError, Result};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use tracing::debug;

/// A node that has been created but not yet entered
#[must_use = "a span stays pending until it is entered or run"]
#[derive(Debug)]
pub struct Span {
    node: NodeHandle,
}

impl Span {
    /// Create a span in `trace`, or in the current trace when `None`
    pub fn new(
        trace: Option<&TraceHandle>,
        name: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Result<Span> {
        match trace {
            Some(trace) => Ok(Self::in_trace(trace, name, node_type)),
            None => {
                let trace = get_current_trace().ok_or(NodetracerError::NoActiveTrace)?;
                Ok(Self::in_trace(&trace, name, node_type))
            }
        }
    }

    /// Create a span in `trace`
    ///
    /// The current node becomes the parent when it belongs to `trace`;
    /// otherwise the new node is a root.
    pub fn in_trace(trace: &TraceHandle, name: impl Into<String>, node_type: impl Into<String>) -> Span {
        let parent = get_current_node().filter(|node| node.trace().ptr_eq(trace));
        Span {
            node: trace.create_node(name.into(), node_type.into(), parent.as_ref()),
        }
    }

    /// Create a span in the current trace, or `None` when nothing is being traced
    pub fn current(name: impl Into<String>, node_type: impl Into<String>) -> Option<Span> {
        let trace = get_current_trace()?;
        Some(Self::in_trace(&trace, name, node_type))
    }

    pub(crate) fn root(trace: &TraceHandle, name: impl Into<String>, node_type: impl Into<String>) -> Span {
        Span {
            node: trace.create_node(name.into(), node_type.into(), None),
        }
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.node
    }

    /// Mark the node running and make it the current node
    pub fn enter(self) -> EnteredSpan {
        self.node.mark_running();
        let token = push_current_node(self.node.clone());
        EnteredSpan {
            node: self.node,
            token: Some(token),
            closed: false,
        }
    }

    /// Start the node without touching the thread's context
    pub(crate) fn start(self) -> ActiveSpan {
        self.node.mark_running();
        ActiveSpan {
            node: self.node,
            closed: false,
        }
    }

    /// Run `f` inside this span and return its result unchanged
    ///
    /// An `Err` marks the node failed.
    pub fn run<T, E, F>(self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&NodeHandle) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let entered = self.enter();
        let result = f(entered.handle());
        entered.finish_with(Outcome::from_result(&result));
        result
    }

    /// Async form of [`Span::run`]
    ///
    /// The body runs with this span's node as the current node on every
    /// poll. Dropping the returned future before it completes marks the node
    /// `cancelled`.
    pub async fn run_async<T, E, F, Fut>(self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(NodeHandle) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display + fmt::Debug,
    {
        let active = self.start();
        let cx = Context::current().with_node(active.node.clone());
        let node = active.node.clone();
        let body = cx.run(|| f(node));
        let result = body.with_trace_context(cx).await;
        active.finish(Outcome::from_result(&result));
        result
    }
}

impl Deref for Span {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.node
    }
}

/// A running span that is the current node of this thread
///
/// Leaving scope without calling [`EnteredSpan::exit`] closes the span:
/// as `completed` normally, as `failed` during a panic. The guard is tied to
/// the thread it was entered on; async code should use [`Span::run_async`].
#[must_use = "dropping an entered span closes it immediately"]
pub struct EnteredSpan {
    node: NodeHandle,
    token: Option<NodeToken>,
    closed: bool,
}

impl EnteredSpan {
    pub fn handle(&self) -> &NodeHandle {
        &self.node
    }

    /// Close the span normally
    pub fn exit(self) {
        self.finish_with(Outcome::Completed);
    }

    /// Close the span recording `err`
    pub fn fail<E>(self, err: &E)
    where
        E: fmt::Display + fmt::Debug + ?Sized,
    {
        self.finish_with(Outcome::Failed(ErrorInfo::from_error(err)));
    }

    pub fn fail_with(self, info: ErrorInfo) {
        self.finish_with(Outcome::Failed(info));
    }

    /// Close the span as `cancelled`
    pub fn cancel(self) {
        self.finish_with(Outcome::Cancelled);
    }

    pub(crate) fn finish_with(mut self, outcome: Outcome) {
        self.close(outcome);
    }

    fn close(&mut self, outcome: Outcome) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.node.finalize(outcome);

        if let Some(token) = self.token.take() {
            let still_current = get_current_node().is_some_and(|current| {
                current.id() == self.node.id() && current.trace().ptr_eq(self.node.trace())
            });
            if still_current {
                reset_current_node(token);
            } else {
                debug!(
                    node_id = self.node.id(),
                    "Span closed out of order; current node left unchanged"
                );
            }
        }
    }
}

impl Deref for EnteredSpan {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.node
    }
}

impl Drop for EnteredSpan {
    fn drop(&mut self) {
        self.close(Outcome::on_drop(false));
    }
}

impl fmt::Debug for EnteredSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnteredSpan")
            .field("node", &self.node)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Running span owned by an async flow. Dropped unfinished means cancelled.
pub(crate) struct ActiveSpan {
    node: NodeHandle,
    closed: bool,
}

impl ActiveSpan {
    pub(crate) fn node(&self) -> &NodeHandle {
        &self.node
    }

    pub(crate) fn finish(mut self, outcome: Outcome) {
        self.close(outcome);
    }

    fn close(&mut self, outcome: Outcome) {
        if !self.closed {
            self.closed = true;
            self.node.finalize(outcome);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.close(Outcome::on_drop(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{clear_context, push_current_trace, reset_current_trace};
    use crate::core::tracer_config::TracerConfig;
    use crate::models::{NodeStatus, TraceGraph};

    fn new_trace() -> TraceHandle {
        TraceHandle::new(TraceGraph::new("span-test"), TracerConfig::default())
    }

    #[test]
    fn test_new_without_trace_fails() {
        clear_context();
        let err = Span::new(None, "orphan", "custom").unwrap_err();
        assert!(matches!(err, NodetracerError::NoActiveTrace));
        assert!(Span::current("orphan", "custom").is_none());
    }

    #[test]
    fn test_new_uses_current_trace() {
        clear_context();
        let trace = new_trace();
        let token = push_current_trace(trace.clone());

        let span = Span::new(None, "from-context", "tool_call").unwrap();
        assert!(span.trace().ptr_eq(&trace));
        assert_eq!(span.snapshot().unwrap().node_type, "tool_call");

        reset_current_trace(token);
    }

    #[test]
    fn test_lifecycle_pending_running_completed() {
        clear_context();
        let trace = new_trace();
        let span = Span::in_trace(&trace, "step", "custom");
        assert_eq!(span.status(), Some(NodeStatus::Pending));

        let entered = span.enter();
        assert_eq!(entered.status(), Some(NodeStatus::Running));
        assert_eq!(get_current_node().unwrap().id(), entered.id());
        let id = entered.id().to_string();
        entered.exit();

        let node = trace.node(&id).unwrap();
        assert_eq!(node.status, NodeStatus::Completed);
        assert!(node.start_time.is_some());
        assert!(node.end_time.is_some());
        assert!(get_current_node().is_none());
    }

    #[test]
    fn test_nested_spans_set_parent_and_depth() {
        clear_context();
        let trace = new_trace();
        let outer = Span::in_trace(&trace, "outer", "custom").enter();
        let inner = Span::in_trace(&trace, "inner", "custom").enter();

        let node = inner.snapshot().unwrap();
        assert_eq!(node.parent_id.as_deref(), Some(outer.id()));
        assert_eq!(node.depth, 1);

        inner.exit();
        assert_eq!(get_current_node().unwrap().id(), outer.id());
        outer.exit();
        assert!(get_current_node().is_none());
    }

    #[test]
    fn test_current_node_from_other_trace_is_not_a_parent() {
        clear_context();
        let first = new_trace();
        let second = new_trace();
        let outer = Span::in_trace(&first, "outer", "custom").enter();

        let foreign = Span::in_trace(&second, "foreign", "custom");
        let node = foreign.snapshot().unwrap();
        assert!(node.parent_id.is_none());
        assert_eq!(node.depth, 0);

        drop(foreign);
        outer.exit();
    }

    #[test]
    fn test_fail_records_error_and_restores_context() {
        clear_context();
        let trace = new_trace();
        let outer = Span::in_trace(&trace, "outer", "custom").enter();
        let inner = Span::in_trace(&trace, "inner", "custom").enter();
        let id = inner.id().to_string();

        inner.fail("boom");

        let node = trace.node(&id).unwrap();
        assert_eq!(node.status, NodeStatus::Failed);
        assert_eq!(node.error.as_deref(), Some("boom"));
        assert_eq!(get_current_node().unwrap().id(), outer.id());
        outer.exit();
    }

    #[test]
    fn test_explicit_cancel_survives_exit() {
        clear_context();
        let trace = new_trace();
        let entered = Span::in_trace(&trace, "cancelled", "custom").enter();
        entered.set_status(NodeStatus::Cancelled);
        let id = entered.id().to_string();
        entered.exit();
        assert_eq!(trace.node(&id).unwrap().status, NodeStatus::Cancelled);
    }

    #[test]
    fn test_drop_completes_span() {
        clear_context();
        let trace = new_trace();
        let id = {
            let entered = Span::in_trace(&trace, "scoped", "custom").enter();
            entered.id().to_string()
        };
        assert_eq!(trace.node(&id).unwrap().status, NodeStatus::Completed);
        assert!(get_current_node().is_none());
    }

    #[test]
    fn test_panic_marks_span_failed() {
        clear_context();
        let trace = new_trace();
        let span = Span::in_trace(&trace, "panics", "custom");
        let id = span.id().to_string();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _entered = span.enter();
            panic!("kaboom");
        }));

        assert!(result.is_err());
        let node = trace.node(&id).unwrap();
        assert_eq!(node.status, NodeStatus::Failed);
        assert_eq!(node.error_type.as_deref(), Some("panic"));
        assert!(get_current_node().is_none());
    }

    #[test]
    fn test_run_returns_result_unchanged() {
        clear_context();
        let trace = new_trace();

        let ok: std::result::Result<i32, String> = Span::in_trace(&trace, "ok", "custom").run(|node| {
            node.output([("value", 42)]);
            Ok(42)
        });
        assert_eq!(ok, Ok(42));

        let err: std::result::Result<i32, String> =
            Span::in_trace(&trace, "err", "custom").run(|_| Err("bad input".to_string()));
        assert_eq!(err, Err("bad input".to_string()));

        let graph = trace.snapshot();
        let nodes = graph.nodes_by_sequence();
        assert_eq!(nodes[0].status, NodeStatus::Completed);
        assert_eq!(nodes[0].output_data["value"], serde_json::json!(42));
        assert_eq!(nodes[1].status, NodeStatus::Failed);
        assert_eq!(nodes[1].error.as_deref(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_run_async_nests_across_await() {
        clear_context();
        let trace = new_trace();
        let cx = Context::new().with_trace(trace.clone());

        let result: std::result::Result<(), String> = async {
            Span::current("parent", "custom")
                .unwrap()
                .run_async(|parent| async move {
                    tokio::task::yield_now().await;
                    let child = Span::current("child", "custom").unwrap();
                    assert_eq!(child.snapshot().unwrap().parent_id.as_deref(), Some(parent.id()));
                    child.run_async(|_| async { Ok(()) }).await
                })
                .await
        }
        .with_trace_context(cx)
        .await;

        assert!(result.is_ok());
        let graph = trace.snapshot();
        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.nodes.values().all(|n| n.status == NodeStatus::Completed));
    }

    #[tokio::test]
    async fn test_dropped_async_span_is_cancelled() {
        clear_context();
        let trace = new_trace();
        let span = Span::in_trace(&trace, "slow", "custom");
        let id = span.id().to_string();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            span.run_async(|_| async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok::<_, String>(())
            }),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(trace.node(&id).unwrap().status, NodeStatus::Cancelled);
    }
}
