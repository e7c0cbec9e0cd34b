//! Context propagation primitives for traces and nodes.
//!
//! Each thread carries two independent slots, the active trace and the active
//! node, both unset by default. Synchronous code nests through push/reset
//! pairs. Async code runs under [`TraceContextExt::with_trace_context`], which
//! swaps a flow's own context in for the duration of every poll, so context
//! follows the logical flow across suspension points and worker threads.
//!
//! New threads and spawned tasks start with an empty context. Carry context
//! across that boundary explicitly with [`propagate_context`] or
//! [`TraceContextExt::in_current_trace_context`].

use super::handle::{NodeHandle, TraceHandle};
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};

thread_local! {
    static CURRENT: RefCell<Context> = RefCell::new(Context::new());
}

fn replace_current(cx: Context) -> Context {
    CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), cx))
}

/// Snapshot of both context slots
///
/// Cloning is cheap; a snapshot shares the underlying traces with the
/// context it was taken from.
#[derive(Debug, Clone, Default)]
pub struct Context {
    trace: Option<TraceHandle>,
    node: Option<NodeHandle>,
}

impl Context {
    /// An empty context with both slots unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current execution unit's context
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_node(mut self, node: NodeHandle) -> Self {
        self.node = Some(node);
        self
    }

    pub fn trace(&self) -> Option<&TraceHandle> {
        self.trace.as_ref()
    }

    pub fn node(&self) -> Option<&NodeHandle> {
        self.node.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_none() && self.node.is_none()
    }

    /// Make this the current context until the guard is dropped
    #[must_use]
    pub fn attach(self) -> ContextGuard {
        let previous = replace_current(self);
        ContextGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }

    /// Run `f` with this context attached
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.clone().attach();
        f()
    }
}

/// Guard for an attached [`Context`]; restores the previous one on drop
pub struct ContextGuard {
    previous: Option<Context>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            replace_current(previous);
        }
    }
}

/// Restore token for the trace slot
#[must_use = "pass the token to reset_current_trace to restore the prior trace"]
pub struct TraceToken {
    prior: Option<TraceHandle>,
    _not_send: PhantomData<Rc<()>>,
}

/// Restore token for the node slot
#[must_use = "pass the token to reset_current_node to restore the prior node"]
pub struct NodeToken {
    prior: Option<NodeHandle>,
    _not_send: PhantomData<Rc<()>>,
}

/// Return the active trace for this execution context
pub fn get_current_trace() -> Option<TraceHandle> {
    CURRENT.with(|current| current.borrow().trace.clone())
}

/// Return the active node for this execution context
pub fn get_current_node() -> Option<NodeHandle> {
    CURRENT.with(|current| current.borrow().node.clone())
}

/// Set the active trace and tokenise the prior value
pub fn push_current_trace(trace: TraceHandle) -> TraceToken {
    let prior = CURRENT.with(|current| current.borrow_mut().trace.replace(trace));
    TraceToken {
        prior,
        _not_send: PhantomData,
    }
}

/// Set the active node and tokenise the prior value
pub fn push_current_node(node: NodeHandle) -> NodeToken {
    let prior = CURRENT.with(|current| current.borrow_mut().node.replace(node));
    NodeToken {
        prior,
        _not_send: PhantomData,
    }
}

/// Restore the trace that was active when `token` was issued
pub fn reset_current_trace(token: TraceToken) {
    CURRENT.with(|current| current.borrow_mut().trace = token.prior);
}

/// Restore the node that was active when `token` was issued
pub fn reset_current_node(token: NodeToken) {
    CURRENT.with(|current| current.borrow_mut().node = token.prior);
}

/// Clear trace and node from the current context
pub fn clear_context() {
    replace_current(Context::new());
}

/// Bind `f` to a snapshot of the current context
///
/// The returned closure can run on any thread; it sees the captured trace and
/// node instead of that thread's own (typically empty) context.
pub fn propagate_context<F, R>(f: F) -> impl FnOnce() -> R + Send
where
    F: FnOnce() -> R + Send,
{
    let cx = Context::current();
    move || cx.run(f)
}

/// Future that runs under its own trace context on every poll
///
/// Spans entered while the inner future runs are recorded into the flow's
/// context and carried over to the next poll, whichever thread performs it.
pub struct WithTraceContext<F> {
    inner: Pin<Box<F>>,
    cx: Option<Context>,
}

impl<F: Future> Future for WithTraceContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let flow = this.cx.take().unwrap_or_default();
        let guard = PollGuard {
            slot: &mut this.cx,
            previous: Some(replace_current(flow)),
        };
        let result = this.inner.as_mut().poll(task);
        drop(guard);
        result
    }
}

/// Swaps the thread's own context back in after a poll, panics included.
struct PollGuard<'a> {
    slot: &'a mut Option<Context>,
    previous: Option<Context>,
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        let flow = replace_current(self.previous.take().unwrap_or_default());
        *self.slot = Some(flow);
    }
}

/// Extension methods binding futures to a trace context
pub trait TraceContextExt: Future + Sized {
    /// Run this future under `cx`
    fn with_trace_context(self, cx: Context) -> WithTraceContext<Self> {
        WithTraceContext {
            inner: Box::pin(self),
            cx: Some(cx),
        }
    }

    /// Run this future under a snapshot of the current context
    fn in_current_trace_context(self) -> WithTraceContext<Self> {
        self.with_trace_context(Context::current())
    }
}

impl<F: Future> TraceContextExt for F {}
