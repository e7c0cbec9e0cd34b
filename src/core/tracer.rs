//! Tracer: opens traces, owns their root spans and persists them on close.
//!
//! A trace is `open` from [`Tracer::start_trace`] (or the start of a
//! combinator) until its scope ends, then `closed` for good. Closing stamps
//! `end_time`, restores the previously current trace and hands the final
//! snapshot to the tracer's [`StorageBackend`].

use super::context::{
    get_current_trace, push_current_trace, reset_current_trace, Context, TraceContextExt, TraceToken,
    WithTraceContext,
};
use super::handle::{ErrorInfo, NodeHandle, Outcome, TraceHandle};
use super::span::{ActiveSpan, EnteredSpan, Span};
use super::tracer_config::TracerConfig;
use crate::config::get_settings;
use crate::error::Result;
use crate::models::{NodeType, TraceGraph};
use crate::storage::{MemoryStore, StorageBackend};
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for recording traces
#[derive(Clone)]
pub struct Tracer {
    storage: Arc<dyn StorageBackend>,
    config: TracerConfig,
}

impl Tracer {
    /// Create a tracer
    ///
    /// # Arguments
    ///
    /// * `storage` - Backend every closed trace is saved to
    /// * `config` - Capture policy applied to every trace this tracer opens
    pub fn new(storage: Arc<dyn StorageBackend>, config: TracerConfig) -> Self {
        Self { storage, config }
    }

    pub fn with_storage(storage: Arc<dyn StorageBackend>) -> Self {
        Self::new(storage, TracerConfig::default())
    }

    /// Create a tracer from the global [`Settings`](crate::config::Settings)
    pub fn from_settings() -> Result<Self> {
        let settings = get_settings();
        let config = TracerConfig::from_settings(&settings)?;
        Ok(Self::new(settings.storage, config))
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    fn open(&self, name: &str) -> TraceHandle {
        let mut graph = TraceGraph::new(name);
        graph.start_time = Some(Utc::now());
        debug!(trace_id = graph.trace_id.as_str(), trace_name = name, "Trace started");
        TraceHandle::new(graph, self.config.clone())
    }

    /// Open a trace and make it the current trace of this thread
    ///
    /// The root span, named after the trace, is entered immediately. The
    /// trace closes when the returned scope is finished, failed or dropped.
    pub fn start_trace(&self, name: impl Into<String>) -> TraceScope {
        let name = name.into();
        let trace = self.open(&name);
        let trace_token = push_current_trace(trace.clone());
        let root = Span::root(&trace, name, NodeType::Custom).enter();
        TraceScope {
            context: TraceContext {
                trace,
                root: root.handle().clone(),
            },
            root: Some(root),
            trace_token: Some(trace_token),
            storage: self.storage.clone(),
            closed: false,
        }
    }

    /// Run `f` inside a new trace and return its result unchanged
    ///
    /// An `Err` marks the root node failed. A failure to save the trace is
    /// logged and does not replace the result.
    pub fn trace<T, E, F>(&self, name: impl Into<String>, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&TraceContext) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let scope = self.start_trace(name);
        let result = f(scope.context());
        let saved = match &result {
            Ok(_) => scope.finish(),
            Err(e) => scope.fail(e),
        };
        if let Err(e) = saved {
            warn!(error = %e, "Failed to save trace");
        }
        result
    }

    /// Async form of [`Tracer::trace`]
    ///
    /// The body runs under the new trace's context on every poll, whichever
    /// worker thread polls it. The trace is saved on a blocking thread when a
    /// tokio runtime is available. Dropping the returned future before it
    /// completes closes the root span as `cancelled` and still saves the trace.
    pub async fn trace_async<T, E, F, Fut>(&self, name: impl Into<String>, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(TraceContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display + fmt::Debug,
    {
        let name = name.into();
        let trace = self.open(&name);
        let root = Span::root(&trace, name, NodeType::Custom).start();
        let context = TraceContext {
            trace: trace.clone(),
            root: root.node().clone(),
        };
        let guard = RootGuard {
            root: Some(root),
            trace: trace.clone(),
            storage: self.storage.clone(),
        };

        let cx = Context::new().with_trace(trace).with_node(context.root.clone());
        let body = cx.run(|| f(context));
        let mut flow = RootedFlow {
            body: body.with_trace_context(cx),
            guard,
        };
        let result = (&mut flow.body).await;

        let RootedFlow { body, guard } = flow;
        drop(body);
        guard.complete(Outcome::from_result(&result)).await;
        result
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::with_storage(Arc::new(MemoryStore::new()))
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The trace and root node handed to traced code
#[derive(Debug, Clone)]
pub struct TraceContext {
    trace: TraceHandle,
    root: NodeHandle,
}

impl TraceContext {
    pub fn trace(&self) -> &TraceHandle {
        &self.trace
    }

    pub fn root(&self) -> &NodeHandle {
        &self.root
    }

    pub fn trace_id(&self) -> &str {
        self.trace.trace_id()
    }

    /// Create a span in this trace, parented on the current node
    pub fn span(&self, name: impl Into<String>, node_type: impl Into<String>) -> Span {
        Span::in_trace(&self.trace, name, node_type)
    }
}

/// An open trace bound to the thread that started it
#[must_use = "dropping the scope closes the trace immediately"]
pub struct TraceScope {
    context: TraceContext,
    root: Option<EnteredSpan>,
    trace_token: Option<TraceToken>,
    storage: Arc<dyn StorageBackend>,
    closed: bool,
}

impl TraceScope {
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Close the trace normally and return the saved graph
    pub fn finish(mut self) -> Result<TraceGraph> {
        self.close(Outcome::Completed)
    }

    /// Close the trace with its root failed by `err`
    pub fn fail<E>(mut self, err: &E) -> Result<TraceGraph>
    where
        E: fmt::Display + fmt::Debug + ?Sized,
    {
        self.close(Outcome::Failed(ErrorInfo::from_error(err)))
    }

    fn close(&mut self, outcome: Outcome) -> Result<TraceGraph> {
        self.closed = true;
        if let Some(root) = self.root.take() {
            root.finish_with(outcome);
        }
        let graph = self.context.trace.close();

        if let Some(token) = self.trace_token.take() {
            let still_current = get_current_trace().is_some_and(|current| current.ptr_eq(&self.context.trace));
            if still_current {
                reset_current_trace(token);
            } else {
                debug!(
                    trace_id = graph.trace_id.as_str(),
                    "Trace closed out of order; current trace left unchanged"
                );
            }
        }

        persist(self.storage.as_ref(), &graph)?;
        Ok(graph)
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close(Outcome::on_drop(false)) {
            warn!(trace_id = self.context.trace_id(), error = %e, "Failed to save trace");
        }
    }
}

impl fmt::Debug for TraceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceScope")
            .field("context", &self.context)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Body of an async trace and its root guard.
///
/// Fields drop in declaration order, so spans still open inside a cancelled
/// body are closed before the guard saves the trace.
struct RootedFlow<F> {
    body: WithTraceContext<F>,
    guard: RootGuard,
}

/// Root of an async trace; closes and saves the trace if the flow is dropped.
struct RootGuard {
    root: Option<ActiveSpan>,
    trace: TraceHandle,
    storage: Arc<dyn StorageBackend>,
}

impl RootGuard {
    fn close(&mut self, outcome: Outcome) -> Option<TraceGraph> {
        let root = self.root.take()?;
        root.finish(outcome);
        Some(self.trace.close())
    }

    async fn complete(mut self, outcome: Outcome) {
        if let Some(graph) = self.close(outcome) {
            persist_async(self.storage.clone(), graph).await;
        }
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        if let Some(graph) = self.close(Outcome::on_drop(true)) {
            if let Err(e) = persist(self.storage.as_ref(), &graph) {
                warn!(trace_id = graph.trace_id.as_str(), error = %e, "Failed to save cancelled trace");
            }
        }
    }
}

fn persist(storage: &dyn StorageBackend, graph: &TraceGraph) -> Result<()> {
    storage.save(graph)?;
    info!(
        trace_id = graph.trace_id.as_str(),
        trace_name = graph.name.as_str(),
        nodes = graph.nodes.len(),
        "Trace saved"
    );
    Ok(())
}

async fn persist_async(storage: Arc<dyn StorageBackend>, graph: TraceGraph) {
    let trace_id = graph.trace_id.clone();
    let saved = match tokio::runtime::Handle::try_current() {
        Ok(handle) => match handle.spawn_blocking(move || persist(storage.as_ref(), &graph)).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(trace_id = trace_id.as_str(), error = %e, "Trace save task did not complete");
                return;
            }
        },
        Err(_) => persist(storage.as_ref(), &graph),
    };
    if let Err(e) = saved {
        warn!(trace_id = trace_id.as_str(), error = %e, "Failed to save trace");
    }
}
