//! Plain-text rendering of recorded traces.

use crate::models::{Node, Payload, TraceGraph};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

/// How much detail [`render_trace`] prints per node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Verbosity {
    /// Name and status
    Minimal,
    /// Adds node type and duration
    #[default]
    Standard,
    /// Adds payloads, annotations, errors and edges
    Full,
}

/// Render the node tree of a trace
///
/// Roots and siblings are listed in sequence order. A node whose parent is
/// missing from the trace is drawn as a root, as is the earliest node of any
/// parent cycle, so every node appears exactly once.
pub fn render_trace(trace: &TraceGraph, verbosity: Verbosity) -> String {
    let mut children: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();
    let mut roots = Vec::new();
    for node in trace.nodes_by_sequence() {
        match node.parent_id.as_deref() {
            Some(parent) if trace.nodes.contains_key(parent) => {
                children.entry(parent).or_default().push(node);
            }
            _ => roots.push(node),
        }
    }

    // Cyclic parent chains never reach a root.
    let mut reached = HashSet::new();
    for root in &roots {
        mark_reached(root, &children, &mut reached);
    }
    for node in trace.nodes_by_sequence() {
        if !reached.contains(node.id.as_str()) {
            mark_reached(node, &children, &mut reached);
            roots.push(node);
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", trace_header(trace));
    let mut drawn = HashSet::new();
    for (i, root) in roots.iter().enumerate() {
        render_node(&mut out, root, &children, &mut drawn, "", i + 1 == roots.len(), verbosity);
    }

    if verbosity == Verbosity::Full && !trace.edges.is_empty() {
        let _ = writeln!(out, "Edges:");
        for edge in &trace.edges {
            let _ = write!(
                out,
                "  {} -[{}]-> {}",
                node_label(trace, &edge.source_id),
                edge.edge_type,
                node_label(trace, &edge.target_id)
            );
            if !edge.label.is_empty() {
                let _ = write!(out, " ({})", edge.label);
            }
            out.push('\n');
        }
    }

    out.trim_end().to_string()
}

fn trace_header(trace: &TraceGraph) -> String {
    let name = if trace.name.is_empty() { "<unnamed>" } else { &trace.name };
    format!("Trace {} [{}]", name, trace.trace_id)
}

fn node_label<'a>(trace: &'a TraceGraph, id: &'a str) -> &'a str {
    trace.node(id).map(|node| node.name.as_str()).unwrap_or(id)
}

fn mark_reached<'a>(node: &'a Node, children: &BTreeMap<&str, Vec<&'a Node>>, reached: &mut HashSet<&'a str>) {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if reached.insert(node.id.as_str()) {
            if let Some(kids) = children.get(node.id.as_str()) {
                stack.extend(kids.iter().copied());
            }
        }
    }
}

fn render_node<'a>(
    out: &mut String,
    node: &'a Node,
    children: &BTreeMap<&str, Vec<&'a Node>>,
    drawn: &mut HashSet<&'a str>,
    prefix: &str,
    last: bool,
    verbosity: Verbosity,
) {
    drawn.insert(node.id.as_str());
    let branch = if last { "└── " } else { "├── " };
    let _ = writeln!(out, "{}{}{}", prefix, branch, node_line(node, verbosity));

    let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
    if verbosity == Verbosity::Full {
        for detail in node_details(node) {
            let _ = writeln!(out, "{}    {}", child_prefix, detail);
        }
    }

    let kids: Vec<&Node> = children
        .get(node.id.as_str())
        .map(|kids| kids.iter().copied().filter(|kid| !drawn.contains(kid.id.as_str())).collect())
        .unwrap_or_default();
    for (i, child) in kids.iter().enumerate() {
        render_node(out, child, children, drawn, &child_prefix, i + 1 == kids.len(), verbosity);
    }
}

fn node_line(node: &Node, verbosity: Verbosity) -> String {
    match verbosity {
        Verbosity::Minimal => format!("{} [{}]", node.name, node.status),
        Verbosity::Standard | Verbosity::Full => format!(
            "{} ({}) [{}] {}",
            node.name,
            node.node_type,
            node.status,
            format_duration(node.duration_ms())
        ),
    }
}

fn node_details(node: &Node) -> Vec<String> {
    let mut details = Vec::new();
    if !node.input_data.is_empty() {
        details.push(format!("input: {}", payload_json(&node.input_data)));
    }
    if !node.output_data.is_empty() {
        details.push(format!("output: {}", payload_json(&node.output_data)));
    }
    if !node.metadata.is_empty() {
        details.push(format!("metadata: {}", payload_json(&node.metadata)));
    }
    for note in &node.annotations {
        details.push(format!("note: {}", note));
    }
    if let Some(error) = &node.error {
        match &node.error_type {
            Some(error_type) => details.push(format!("error: {}: {}", error_type, error)),
            None => details.push(format!("error: {}", error)),
        }
    }
    details
}

/// Compact JSON with keys in a stable order
fn payload_json(payload: &Payload) -> String {
    let sorted: BTreeMap<&String, &serde_json::Value> = payload.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_else(|_| "<unserializable>".to_string())
}

fn format_duration(duration_ms: Option<f64>) -> String {
    match duration_ms {
        Some(ms) => format!("{:.0}ms", ms),
        None => "-".to_string(),
    }
}

/// Summary block: identity, counts and status/type breakdowns
pub fn render_summary(trace: &TraceGraph) -> String {
    let mut status_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut type_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in trace.nodes.values() {
        *status_counts.entry(node.status.as_str()).or_default() += 1;
        *type_counts.entry(node.node_type.as_str()).or_default() += 1;
    }

    let name = if trace.name.is_empty() { "<unnamed>" } else { &trace.name };
    let duration = match trace.duration_ms() {
        Some(ms) => format!("{:.0}ms", ms),
        None => "unknown".to_string(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "Trace ID: {}", trace.trace_id);
    let _ = writeln!(out, "Name: {}", name);
    let _ = writeln!(out, "Schema: {}", trace.schema_version);
    let _ = writeln!(out, "Duration: {}", duration);
    let _ = writeln!(out, "Nodes: {}", trace.nodes.len());
    let _ = writeln!(out, "Edges: {}", trace.edges.len());
    let _ = writeln!(out, "Status counts:");
    for (status, count) in &status_counts {
        let _ = writeln!(out, "  - {}: {}", status, count);
    }
    let _ = write!(out, "Node type counts:");
    for (node_type, count) in &type_counts {
        let _ = write!(out, "\n  - {}: {}", node_type, count);
    }
    out
}
