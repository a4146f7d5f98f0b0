//! The service reference graph.
//!
//! Nodes are service ids holding their current value (a definition or an
//! alias); edges record one service's use of another together with the
//! [`Reference`] that created them. The graph is rebuilt from scratch by
//! the reference analysis pass and read by the passes that follow it in
//! the same phase. Nodes and edges live in an arena and point at each
//! other by index.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::definition::{Alias, Definition};
use crate::error::{CompileError, CompileResult};
use crate::reference::Reference;

/// Value held by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Definition(Arc<Definition>),
    Alias(Alias),
}

/// A service id in the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    id: String,
    value: Option<NodeValue>,
    in_edges: Vec<usize>,
    out_edges: Vec<usize>,
}

impl GraphNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `None` when the id is referenced but neither defined nor aliased.
    pub fn value(&self) -> Option<&NodeValue> {
        self.value.as_ref()
    }

    pub fn definition(&self) -> Option<&Arc<Definition>> {
        match &self.value {
            Some(NodeValue::Definition(definition)) => Some(definition),
            _ => None,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.value, Some(NodeValue::Alias(_)))
    }

    pub fn is_definition(&self) -> bool {
        matches!(self.value, Some(NodeValue::Definition(_)))
    }

    pub fn in_edge_indices(&self) -> &[usize] {
        &self.in_edges
    }

    pub fn out_edge_indices(&self) -> &[usize] {
        &self.out_edges
    }
}

/// One use of a service by another.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    source: usize,
    dest: usize,
    reference: Option<Reference>,
    lazy: bool,
    weak: bool,
    by_constructor: bool,
}

impl GraphEdge {
    pub fn source_index(&self) -> usize {
        self.source
    }

    pub fn dest_index(&self) -> usize {
        self.dest
    }

    /// `None` for alias-to-target edges.
    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// The use happens behind a closure, iterator or lazy proxy.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// The use does not force instantiation.
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The use is part of instantiating the source.
    pub fn is_by_constructor(&self) -> bool {
        self.by_constructor
    }
}

/// Flags attached to a new edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeKind {
    pub lazy: bool,
    pub weak: bool,
    pub by_constructor: bool,
}

/// Directed graph of service uses.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{EdgeKind, Reference, ServiceReferenceGraph};
///
/// let mut graph = ServiceReferenceGraph::new();
/// graph.connect(Some("newsletter"), None, Some("mailer"), None, Some(Reference::new("mailer")), EdgeKind::default());
///
/// let mailer = graph.node("mailer").unwrap();
/// assert_eq!(mailer.in_edge_indices().len(), 1);
/// assert_eq!(graph.in_edges("mailer").next().map(|e| graph.source_of(e).id()), Some("newsletter"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceReferenceGraph {
    nodes: IndexMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
}

impl ServiceReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> CompileResult<&GraphNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| CompileError::invalid(format!("There is no node with id \"{}\".", id)))
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    pub fn node_at(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn source_of(&self, edge: &GraphEdge) -> &GraphNode {
        &self.nodes[edge.source]
    }

    pub fn dest_of(&self, edge: &GraphEdge) -> &GraphNode {
        &self.nodes[edge.dest]
    }

    /// Edges pointing at `id`; empty for unknown ids.
    pub fn in_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        let indices = self.nodes.get(id).map(|n| n.in_edges.as_slice()).unwrap_or_default();
        indices.iter().map(move |&i| &self.edges[i])
    }

    /// Edges leaving `id`; empty for unknown ids.
    pub fn out_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        let indices = self.nodes.get(id).map(|n| n.out_edges.as_slice()).unwrap_or_default();
        indices.iter().map(move |&i| &self.edges[i])
    }

    /// Adds an edge, creating both nodes on demand.
    ///
    /// Edges without a source or a destination are not recorded. A value
    /// given for an existing node without one fills it in.
    pub fn connect(
        &mut self,
        source_id: Option<&str>,
        source_value: Option<NodeValue>,
        dest_id: Option<&str>,
        dest_value: Option<NodeValue>,
        reference: Option<Reference>,
        kind: EdgeKind,
    ) {
        let (Some(source_id), Some(dest_id)) = (source_id, dest_id) else {
            return;
        };
        let source = self.create_node(source_id, source_value);
        let dest = self.create_node(dest_id, dest_value);
        let index = self.edges.len();
        self.edges.push(GraphEdge {
            source,
            dest,
            reference,
            lazy: kind.lazy,
            weak: kind.weak,
            by_constructor: kind.by_constructor,
        });
        self.nodes[source].out_edges.push(index);
        self.nodes[dest].in_edges.push(index);
    }

    fn create_node(&mut self, id: &str, value: Option<NodeValue>) -> usize {
        if let Some(index) = self.nodes.get_index_of(id) {
            if self.nodes[index].value.is_none() {
                self.nodes[index].value = value;
            }
            return index;
        }
        let (index, _) = self.nodes.insert_full(
            id.to_string(),
            GraphNode {
                id: id.to_string(),
                value,
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            },
        );
        index
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}
