//! Export of the service reference graph for visualization and debugging.
//!
//! The export is a plain snapshot: one node per definition or alias, one
//! edge per reference the reference analysis could resolve.
//! It serializes to JSON or YAML and renders to Graphviz DOT or Mermaid.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::compiler::passes::AnalyzeServiceReferencesPass;
use crate::compiler::CompilerPass;
use crate::container::{ContainerBuilder, SERVICE_CONTAINER_ID};
use crate::error::{CompileError, CompileResult};

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Definition,
    Alias,
}

/// A service id in the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: String,
    pub kind: NodeKind,
    /// Class of a definition, target of an alias
    pub label: Option<String>,
    pub public: bool,
    pub shared: bool,
    pub lazy: bool,
    pub tags: Vec<String>,
}

/// One use of a service by another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEdge {
    pub from: String,
    pub to: String,
    pub lazy: bool,
    pub weak: bool,
    pub by_constructor: bool,
    /// Behavior of the reference when the target is missing
    pub invalid_behavior: Option<String>,
}

/// Counts and provenance of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub definition_count: usize,
    pub alias_count: usize,
    pub edge_count: usize,
    pub compiled: bool,
    pub exported_at: String,
    pub version: String,
}

/// A snapshot of the container's reference graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
    pub metadata: ExportMetadata,
}

/// Output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
    /// Graphviz
    Dot,
    Mermaid,
}

/// What ends up in an export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub include_aliases: bool,
    pub include_private: bool,
    /// The container's own definition
    pub include_internal: bool,
    /// Keep only definitions carrying one of these tags (empty keeps all)
    pub tag_filter: IndexSet<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_aliases: true,
            include_private: true,
            include_internal: false,
            tag_filter: IndexSet::new(),
        }
    }
}

/// Builds and renders [`GraphExport`]s.
#[derive(Debug, Clone, Default)]
pub struct GraphExporter {
    options: ExportOptions,
}

impl GraphExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Analyzes the references of `container` and snapshots the result.
    ///
    /// The reference graph is cleared again afterwards, as it is after a
    /// compilation.
    pub fn build(&self, container: &mut ContainerBuilder) -> CompileResult<GraphExport> {
        AnalyzeServiceReferencesPass::full().process(container)?;
        let export = self.snapshot(container);
        container.graph_mut().clear();
        Ok(export)
    }

    fn snapshot(&self, container: &ContainerBuilder) -> GraphExport {
        let mut nodes = Vec::new();
        for (id, definition) in container.definitions() {
            if id == SERVICE_CONTAINER_ID && !self.options.include_internal {
                continue;
            }
            if !self.options.include_private && !definition.is_public() {
                continue;
            }
            if !self.options.tag_filter.is_empty()
                && !definition.tags().keys().any(|tag| self.options.tag_filter.contains(tag))
            {
                continue;
            }
            nodes.push(ExportNode {
                id: id.clone(),
                kind: NodeKind::Definition,
                label: definition.class().map(str::to_string),
                public: definition.is_public(),
                shared: definition.is_shared(),
                lazy: definition.is_lazy(),
                tags: definition.tags().keys().cloned().collect(),
            });
        }
        if self.options.include_aliases {
            for (id, alias) in container.aliases() {
                if !self.options.include_private && !alias.is_public() {
                    continue;
                }
                nodes.push(ExportNode {
                    id: id.clone(),
                    kind: NodeKind::Alias,
                    label: Some(alias.id().to_string()),
                    public: alias.is_public(),
                    shared: true,
                    lazy: false,
                    tags: Vec::new(),
                });
            }
        }

        let graph = container.graph();
        let kept: IndexSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();

        let edges: Vec<ExportEdge> = graph
            .edges()
            .iter()
            .filter_map(|edge| {
                let from = graph.source_of(edge).id();
                let to = graph.dest_of(edge).id();
                if !kept.contains(from) || !kept.contains(to) {
                    return None;
                }
                Some(ExportEdge {
                    from: from.to_string(),
                    to: to.to_string(),
                    lazy: edge.is_lazy(),
                    weak: edge.is_weak(),
                    by_constructor: edge.is_by_constructor(),
                    invalid_behavior: edge.reference().map(|reference| format!("{:?}", reference.invalid_behavior())),
                })
            })
            .collect();

        let definition_count = nodes.iter().filter(|node| node.kind == NodeKind::Definition).count();
        let alias_count = nodes.iter().filter(|node| node.kind == NodeKind::Alias).count();
        let edge_count = edges.len();
        GraphExport {
            nodes,
            edges,
            metadata: ExportMetadata {
                definition_count,
                alias_count,
                edge_count,
                compiled: container.is_compiled(),
                exported_at: chrono::Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Renders `graph` in `format`.
    pub fn export(&self, graph: &GraphExport, format: ExportFormat) -> CompileResult<String> {
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(graph).map_err(|e| export_error("JSON", e)),
            ExportFormat::Yaml => serde_yaml::to_string(graph).map_err(|e| export_error("YAML", e)),
            ExportFormat::Dot => Ok(to_dot(graph)),
            ExportFormat::Mermaid => Ok(to_mermaid(graph)),
        }
    }

    pub fn build_and_export(&self, container: &mut ContainerBuilder, format: ExportFormat) -> CompileResult<String> {
        let graph = self.build(container)?;
        self.export(&graph, format)
    }
}

/// Reads back a JSON export.
pub fn from_json(json: &str) -> CompileResult<GraphExport> {
    serde_json::from_str(json).map_err(|e| export_error("JSON", e))
}

fn export_error(format: &str, error: impl std::fmt::Display) -> CompileError {
    CompileError::Runtime(format!("Cannot export the service graph as {}: {}", format, error))
}

fn dot_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn to_dot(graph: &GraphExport) -> String {
    let mut output = String::new();
    output.push_str("digraph ServiceGraph {\n");
    output.push_str("  rankdir=LR;\n");
    output.push_str("  node [shape=box];\n\n");

    for node in &graph.nodes {
        let (shape, color) = match node.kind {
            NodeKind::Definition if node.public => ("box", "lightblue"),
            NodeKind::Definition => ("box", "white"),
            NodeKind::Alias => ("ellipse", "lightgrey"),
        };
        let label = match &node.label {
            Some(label) => format!("{}\\n{}", dot_escape(&node.id), dot_escape(label)),
            None => dot_escape(&node.id),
        };
        output.push_str(&format!(
            "  \"{}\" [label=\"{}\", shape={}, fillcolor={}, style=filled];\n",
            dot_escape(&node.id),
            label,
            shape,
            color
        ));
    }

    output.push('\n');

    for edge in &graph.edges {
        let style = if edge.weak {
            "dotted"
        } else if edge.lazy {
            "dashed"
        } else {
            "solid"
        };
        output.push_str(&format!(
            "  \"{}\" -> \"{}\" [style={}];\n",
            dot_escape(&edge.from),
            dot_escape(&edge.to),
            style
        ));
    }

    output.push_str("}\n");
    output
}

fn to_mermaid(graph: &GraphExport) -> String {
    // mermaid ids cannot hold dots or backslashes; nodes are numbered
    let index: IndexSet<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
    let mut output = String::new();
    output.push_str("graph TD\n");

    for (i, node) in graph.nodes.iter().enumerate() {
        let label = node.id.replace('"', "#quot;");
        match node.kind {
            NodeKind::Alias => output.push_str(&format!("  n{}([\"{}\"])\n", i, label)),
            _ => output.push_str(&format!("  n{}[\"{}\"]\n", i, label)),
        }
    }

    for edge in &graph.edges {
        let (Some(from), Some(to)) = (index.get_index_of(edge.from.as_str()), index.get_index_of(edge.to.as_str())) else {
            continue;
        };
        let arrow = if edge.lazy || edge.weak { "-.->" } else { "-->" };
        output.push_str(&format!("  n{} {} n{}\n", from, arrow, to));
    }

    output.push_str("\n  classDef public fill:#e1f5fe\n");
    for (i, node) in graph.nodes.iter().enumerate() {
        if node.kind == NodeKind::Definition && node.public {
            output.push_str(&format!("  class n{} public\n", i));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::Argument;
    use crate::reference::{InvalidBehavior, Reference};

    fn container() -> ContainerBuilder {
        let mut container = ContainerBuilder::new();
        container
            .register("app", Some("App\\App"))
            .set_public(true)
            .add_argument(Reference::new("router"))
            .add_argument(Argument::service_closure(Reference::new("profiler")))
            .add_argument(Reference::with_behavior("cache", InvalidBehavior::Null));
        container.register("router", Some("App\\Router")).add_tag("routing");
        container.register("profiler", Some("App\\Profiler"));
        container.set_alias("app.router", "router").unwrap();
        container
    }

    #[test]
    fn snapshots_nodes_and_edges() {
        let mut container = container();
        let graph = GraphExporter::new().build(&mut container).unwrap();

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, ["app", "router", "profiler", "app.router"]);
        assert_eq!(graph.nodes[3].kind, NodeKind::Alias);
        assert_eq!(graph.nodes[1].tags, ["routing"]);
        assert_eq!(graph.metadata.definition_count, 3);
        assert_eq!(graph.metadata.alias_count, 1);

        let closure = graph.edges.iter().find(|edge| edge.to == "profiler").unwrap();
        assert!(closure.lazy);
        assert!(!graph.edges.iter().any(|edge| edge.to == "cache"));
        assert!(container.graph().is_empty());
    }

    #[test]
    fn filters_private_services() {
        let mut container = container();
        let options = ExportOptions {
            include_private: false,
            ..ExportOptions::default()
        };
        let graph = GraphExporter::new().with_options(options).build(&mut container).unwrap();
        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, ["app"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn json_export_reads_back() {
        let mut container = container();
        let exporter = GraphExporter::new();
        let graph = exporter.build(&mut container).unwrap();
        let json = exporter.export(&graph, ExportFormat::Json).unwrap();
        assert_eq!(from_json(&json).unwrap(), graph);
        assert!(exporter.export(&graph, ExportFormat::Yaml).unwrap().contains("definition_count: 3"));
    }

    #[test]
    fn renders_dot_and_mermaid() {
        let mut container = container();
        let exporter = GraphExporter::new();
        let graph = exporter.build(&mut container).unwrap();

        let dot = exporter.export(&graph, ExportFormat::Dot).unwrap();
        assert!(dot.starts_with("digraph ServiceGraph {"));
        assert!(dot.contains("\"app\" -> \"router\" [style=solid];"));
        assert!(dot.contains("\"app\" -> \"profiler\" [style=dashed];"));
        assert!(dot.contains("label=\"router\\nApp\\\\Router\""));

        let mermaid = exporter.export(&graph, ExportFormat::Mermaid).unwrap();
        assert!(mermaid.contains("  n0[\"app\"]"));
        assert!(mermaid.contains("  n3([\"app.router\"])"));
        assert!(mermaid.contains("  n0 --> n1"));
        assert!(mermaid.contains("  n0 -.-> n2"));
        assert!(mermaid.contains("  class n0 public"));
    }
}
