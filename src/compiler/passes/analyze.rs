use std::sync::Arc;

use tracing::debug;

use crate::argument::Argument;
use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::definition::{Callable, Definition};
use crate::error::CompileResult;
use crate::graph::{EdgeKind, NodeValue, ServiceReferenceGraph};
use crate::reference::{InvalidBehavior, Reference};
use crate::value::{Value, ValueMap};

/// Rebuilds the service reference graph.
///
/// Every reference held by a definition becomes an edge from that
/// definition to the definition its target resolves to; aliases get an
/// edge to their target. Edges are flagged lazy when the use sits behind a
/// closure, iterator or lazy service, weak for
/// [`InvalidBehavior::IgnoreUninitialized`] references, and by-constructor
/// for arguments, the factory and everything up to the last wither call.
/// References to missing services produce no edge.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{AnalyzeServiceReferencesPass, CompilerPass, ContainerBuilder, MethodCall, Reference, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.register("logger", Some("App\\Logger"));
/// container.register("mailer", Some("App\\Mailer")).add_argument(Reference::new("logger"));
/// container
///     .register("newsletter", Some("App\\Newsletter"))
///     .add_method_call(MethodCall::new("setMailer", [Value::reference("mailer")]))
///     .unwrap();
///
/// AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
///
/// let graph = container.graph();
/// let edge = graph.in_edges("logger").next().unwrap();
/// assert_eq!(graph.source_of(edge).id(), "mailer");
/// assert!(edge.is_by_constructor());
/// assert!(!graph.in_edges("mailer").next().unwrap().is_by_constructor());
/// ```
#[derive(Debug, Clone)]
pub struct AnalyzeServiceReferencesPass {
    only_constructor_arguments: bool,
    current_id: String,
    current: Option<Arc<Definition>>,
    lazy: bool,
    by_constructor: bool,
    by_factory: bool,
}

impl AnalyzeServiceReferencesPass {
    fn new(only_constructor_arguments: bool) -> Self {
        Self {
            only_constructor_arguments,
            current_id: String::new(),
            current: None,
            lazy: false,
            by_constructor: false,
            by_factory: false,
        }
    }

    /// Records constructor arguments and factories only.
    pub fn constructor_only() -> Self {
        Self::new(true)
    }

    /// Records every use, including properties, calls and configurators.
    pub fn full() -> Self {
        Self::new(false)
    }

    fn visit(&mut self, container: &mut ContainerBuilder, value: &Value, is_root: bool) {
        match value {
            Value::Reference(reference) => self.connect(container, reference),
            Value::Array(map) => self.visit_map(container, map),
            Value::Argument(argument) => {
                let lazy = self.lazy;
                self.lazy = !self.by_factory || !matches!(argument, Argument::Iterator(_));
                match argument {
                    Argument::ServiceClosure(inner) => self.visit(container, inner, false),
                    _ => {
                        if let Some(values) = argument.values() {
                            self.visit_map(container, values);
                        }
                    }
                }
                self.lazy = lazy;
            }
            Value::Definition(definition) => self.visit_definition(container, definition, is_root),
            _ => {}
        }
    }

    fn visit_map(&mut self, container: &mut ContainerBuilder, map: &ValueMap) {
        for value in map.values() {
            self.visit(container, value, false);
        }
    }

    fn visit_callable(&mut self, container: &mut ContainerBuilder, callable: Option<&Callable>) {
        if let Some(Callable::Method(target, _)) = callable {
            self.visit(container, target, false);
        }
    }

    fn visit_definition(&mut self, container: &mut ContainerBuilder, definition: &Arc<Definition>, is_root: bool) {
        if is_root {
            if definition.is_synthetic() || definition.is_abstract() {
                return;
            }
            self.current = Some(definition.clone());
        } else if self.current.as_ref().map_or(false, |current| Arc::ptr_eq(current, definition)) {
            return;
        }

        let lazy = self.lazy;
        self.lazy = false;
        let by_constructor = self.by_constructor;
        self.by_constructor = is_root || by_constructor;

        let by_factory = self.by_factory;
        self.by_factory = true;
        self.visit_callable(container, definition.factory());
        self.by_factory = by_factory;
        self.visit_map(container, definition.arguments());

        let calls = definition.method_calls();
        let mut setters = calls;
        let mut properties_seen = false;
        if let Some(last_wither) = calls.iter().rposition(|call| call.returns_clone) {
            self.visit_map(container, definition.properties());
            properties_seen = true;
            for call in &calls[..=last_wither] {
                self.visit_map(container, &call.arguments);
            }
            setters = &calls[last_wither + 1..];
        }

        self.by_constructor = by_constructor;
        if !self.only_constructor_arguments {
            if !properties_seen {
                self.visit_map(container, definition.properties());
            }
            for call in setters {
                self.visit_map(container, &call.arguments);
            }
            self.visit_callable(container, definition.configurator());
        }
        self.lazy = lazy;
    }

    fn connect(&mut self, container: &mut ContainerBuilder, reference: &Reference) {
        let target = container
            .find_definition_arc(reference.id())
            .map(|(id, definition)| (id, definition.clone()));
        let (target_id, target_definition) = match target {
            Some((id, definition)) => (Some(id), Some(definition)),
            None => (None, None),
        };
        let kind = EdgeKind {
            lazy: self.lazy || target_definition.as_ref().map_or(false, |d| d.is_lazy()),
            weak: reference.invalid_behavior() == InvalidBehavior::IgnoreUninitialized,
            by_constructor: self.by_constructor,
        };
        let current = self.current.clone().map(NodeValue::Definition);
        container.graph_mut().connect(
            Some(&self.current_id),
            current,
            target_id.as_deref(),
            target_definition.map(NodeValue::Definition),
            Some(reference.clone()),
            kind,
        );
    }
}

impl CompilerPass for AnalyzeServiceReferencesPass {
    fn name(&self) -> &'static str {
        "AnalyzeServiceReferencesPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        container.graph_mut().clear();
        self.lazy = false;
        self.by_constructor = false;
        self.by_factory = false;

        let mut graph = std::mem::take(container.graph_mut());
        for (id, alias) in container.aliases() {
            let target = container.find_definition_arc(alias.id());
            connect_alias(&mut graph, id, alias, target);
        }
        *container.graph_mut() = graph;

        let definitions: Vec<(String, Arc<Definition>)> = container
            .definitions()
            .iter()
            .map(|(id, definition)| (id.clone(), definition.clone()))
            .collect();
        for (id, definition) in definitions {
            self.current_id = id;
            self.visit(container, &Value::Definition(definition), true);
        }
        self.current_id.clear();
        self.current = None;

        debug!(
            nodes = container.graph().len(),
            edges = container.graph().edges().len(),
            "service reference graph rebuilt"
        );
        Ok(())
    }
}

fn connect_alias(
    graph: &mut ServiceReferenceGraph,
    id: &str,
    alias: &crate::definition::Alias,
    target: Option<(String, &Arc<Definition>)>,
) {
    let (target_id, target_value) = match target {
        Some((target_id, definition)) => (Some(target_id), Some(NodeValue::Definition(definition.clone()))),
        None => (None, None),
    };
    graph.connect(
        Some(id),
        Some(NodeValue::Alias(alias.clone())),
        target_id.as_deref(),
        target_value,
        None,
        EdgeKind::default(),
    );
}
