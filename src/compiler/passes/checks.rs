//! Validation passes that run once references are resolved.

use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::Definition;
use crate::error::{CompileError, CompileResult};
use crate::graph::{GraphEdge, ServiceReferenceGraph};
use crate::internal::IdSet;
use crate::value::{ArgKey, Value, ValueMap};

/// Rejects construction-time reference cycles.
///
/// Works on the graph built by
/// [`AnalyzeServiceReferencesPass`](crate::AnalyzeServiceReferencesPass).
/// From every node, edges are followed depth first; reaching the starting
/// node again is fatal and reports the whole path. Lazy and weak edges are
/// skipped, and so are uses from method calls and properties: those cycles
/// can be broken at instantiation time.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{AnalyzeServiceReferencesPass, CheckCircularReferencesPass, CompilerPass, ContainerBuilder, Reference};
///
/// let mut container = ContainerBuilder::new();
/// container.register("a", Some("App\\A")).add_argument(Reference::new("b"));
/// container.register("b", Some("App\\B")).add_argument(Reference::new("c"));
/// container.register("c", Some("App\\C")).add_argument(Reference::new("a"));
///
/// AnalyzeServiceReferencesPass::constructor_only().process(&mut container).unwrap();
/// let err = CheckCircularReferencesPass::new().process(&mut container).unwrap_err();
/// assert_eq!(err.to_string(), "Circular reference detected for service \"a\", path: \"a -> b -> c -> a\".");
/// ```
#[derive(Debug, Default, Clone)]
pub struct CheckCircularReferencesPass {
    visited: IdSet<usize>,
    path: Vec<usize>,
}

impl CheckCircularReferencesPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn follows(graph: &ServiceReferenceGraph, edge: &GraphEdge) -> bool {
        if edge.is_lazy() || edge.is_weak() {
            return false;
        }
        edge.is_by_constructor() || graph.source_of(edge).is_alias()
    }

    fn search(&mut self, graph: &ServiceReferenceGraph, origin: usize, node: usize) -> CompileResult<()> {
        for &index in graph.node_at(node).out_edge_indices() {
            let edge = &graph.edges()[index];
            if !Self::follows(graph, edge) {
                continue;
            }
            let dest = edge.dest_index();
            if dest == origin {
                let mut path: Vec<String> = self.path.iter().map(|&i| graph.node_at(i).id().to_string()).collect();
                let id = graph.node_at(origin).id().to_string();
                path.push(id.clone());
                return Err(CompileError::circular(id, path));
            }
            if self.visited.insert(dest) {
                self.path.push(dest);
                self.search(graph, origin, dest)?;
                self.path.pop();
            }
        }
        Ok(())
    }
}

impl CompilerPass for CheckCircularReferencesPass {
    fn name(&self) -> &'static str {
        "CheckCircularReferencesPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let graph = container.graph();
        // definitions in registration order, then nodes only the graph knows
        let mut origins: Vec<usize> = container.definitions().keys().filter_map(|id| graph.index_of(id)).collect();
        let listed: IdSet<usize> = origins.iter().copied().collect();
        origins.extend((0..graph.len()).filter(|index| !listed.contains(index)));

        let mut result = Ok(());
        for origin in origins {
            self.visited.clear();
            self.visited.insert(origin);
            self.path.clear();
            self.path.push(origin);
            result = self.search(graph, origin, origin);
            if result.is_err() {
                break;
            }
        }
        self.visited.clear();
        self.path.clear();
        result
    }
}

/// Rejects references to abstract definitions.
///
/// Abstract definitions are templates for child definitions and are
/// dropped before the container is dumped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckReferenceValidityPass;

impl RecursivePass for CheckReferenceValidityPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        match value {
            Value::Definition(definition) if is_root && (definition.is_synthetic() || definition.is_abstract()) => {
                Ok(None)
            }
            Value::Reference(reference) => {
                let target = cx.container.definitions().get(reference.id());
                if target.map_or(false, |definition| definition.is_abstract()) {
                    return Err(CompileError::runtime(format!(
                        "The definition \"{}\" has a reference to an abstract definition \"{}\". Abstract definitions cannot be the target of references.",
                        cx.current_id,
                        reference.id()
                    )));
                }
                Ok(None)
            }
            _ => walk_children(self, cx, value),
        }
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for CheckReferenceValidityPass {
    fn name(&self) -> &'static str {
        "CheckReferenceValidityPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

/// Checks that positional arguments are contiguous and come before named
/// ones, for constructors and method calls.
///
/// When not throwing, problems are recorded on the definition and raised
/// later by [`DefinitionErrorExceptionPass`](crate::DefinitionErrorExceptionPass)
/// if the definition survives.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CheckArgumentsValidityPass, CompilerPass, ContainerBuilder, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.register("mailer", Some("App\\Mailer")).set_argument(1usize, Value::from("smtp://localhost"));
///
/// CheckArgumentsValidityPass::new(false).process(&mut container).unwrap();
/// assert_eq!(
///     container.definition("mailer").unwrap().errors(),
///     ["Invalid constructor argument 2 for service \"mailer\": argument 1 must be defined before. Check your service definition."]
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CheckArgumentsValidityPass {
    throw_on_error: bool,
}

impl Default for CheckArgumentsValidityPass {
    fn default() -> Self {
        Self::new(true)
    }
}

/// PHP-style named argument: an identifier, possibly namespaced.
fn is_named_argument(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '\\' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '\\')
}

enum ArgumentProblem {
    NotAnInteger(String),
    Gap { position: usize, expected: usize },
    PositionalAfterNamed,
}

fn check_arguments(arguments: &ValueMap) -> Option<ArgumentProblem> {
    let mut expected = 0;
    let mut named = false;
    for key in arguments.keys() {
        if let ArgKey::Named(name) = key {
            if is_named_argument(name) {
                named = true;
                continue;
            }
        }
        match key {
            ArgKey::Index(position) if *position == expected => expected += 1,
            ArgKey::Index(position) => {
                return Some(ArgumentProblem::Gap {
                    position: *position,
                    expected: expected + 1,
                })
            }
            other => return Some(ArgumentProblem::NotAnInteger(other.to_string())),
        }
        if named {
            return Some(ArgumentProblem::PositionalAfterNamed);
        }
    }
    None
}

impl CheckArgumentsValidityPass {
    pub fn new(throw_on_error: bool) -> Self {
        Self { throw_on_error }
    }

    fn problems(&self, id: &str, definition: &Definition) -> Vec<String> {
        let mut messages = Vec::new();
        match check_arguments(definition.arguments()) {
            Some(ArgumentProblem::NotAnInteger(key)) => messages.push(format!(
                "Invalid constructor argument for service \"{}\": integer expected but found string \"{}\". Check your service definition.",
                id, key
            )),
            Some(ArgumentProblem::Gap { position, expected }) => messages.push(format!(
                "Invalid constructor argument {} for service \"{}\": argument {} must be defined before. Check your service definition.",
                position + 1,
                id,
                expected
            )),
            Some(ArgumentProblem::PositionalAfterNamed) => messages.push(format!(
                "Invalid constructor argument for service \"{}\": cannot use positional argument after named argument. Check your service definition.",
                id
            )),
            None => {}
        }
        for call in definition.method_calls() {
            let method = &call.method;
            match check_arguments(&call.arguments) {
                Some(ArgumentProblem::NotAnInteger(key)) => messages.push(format!(
                    "Invalid argument for method call \"{}\" of service \"{}\": integer expected but found string \"{}\". Check your service definition.",
                    method, id, key
                )),
                Some(ArgumentProblem::Gap { position, expected }) => messages.push(format!(
                    "Invalid argument {} for method call \"{}\" of service \"{}\": argument {} must be defined before. Check your service definition.",
                    position + 1,
                    method,
                    id,
                    expected
                )),
                Some(ArgumentProblem::PositionalAfterNamed) => messages.push(format!(
                    "Invalid argument for method call \"{}\" of service \"{}\": cannot use positional argument after named argument. Check your service definition.",
                    method, id
                )),
                None => {}
            }
        }
        messages
    }
}

impl RecursivePass for CheckArgumentsValidityPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };
        let messages = self.problems(&cx.current_id, definition);
        if messages.is_empty() {
            return walk_children(self, cx, value);
        }
        if self.throw_on_error {
            return Err(CompileError::runtime(messages[0].clone()));
        }
        let mut flagged = (**definition).clone();
        for message in messages {
            flagged.add_error(message);
        }
        let current = Value::definition(flagged);
        Ok(Some(walk_children(self, cx, &current)?.unwrap_or(current)))
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for CheckArgumentsValidityPass {
    fn name(&self) -> &'static str {
        "CheckArgumentsValidityPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

/// Fails on references to missing services whose invalid behavior is to
/// throw.
///
/// Runs after removal, so only references that survived every other
/// resolution are reported. The error suggests similarly named services.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CheckExceptionOnInvalidReferenceBehaviorPass, CompilerPass, ContainerBuilder, Reference};
///
/// let mut container = ContainerBuilder::new();
/// container.register("mailer", Some("App\\Mailer"));
/// container.register("newsletter", Some("App\\Newsletter")).add_argument(Reference::new("mailr"));
///
/// let err = CheckExceptionOnInvalidReferenceBehaviorPass.process(&mut container).unwrap_err();
/// assert_eq!(
///     err.to_string(),
///     "The service \"newsletter\" has a dependency on a non-existent service \"mailr\". Did you mean this: \"mailer\"?"
/// );
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckExceptionOnInvalidReferenceBehaviorPass;

impl RecursivePass for CheckExceptionOnInvalidReferenceBehaviorPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Reference(reference) = value else {
            return walk_children(self, cx, value);
        };
        let id = reference.id();
        if reference.invalid_behavior().tolerates_missing() || cx.container.has(id) {
            return Ok(None);
        }

        let mut source = cx.current_id.clone();
        if source.starts_with('.') {
            let graph = cx.container.graph();
            if let Some(edge) = graph.in_edges(&source).find(|edge| graph.source_of(edge).is_definition()) {
                source = graph.source_of(edge).id().to_string();
            }
        }
        Err(CompileError::ServiceNotFound {
            id: id.to_string(),
            alternatives: cx.container.service_alternatives(id, Some(&source)),
            source_id: Some(source),
        })
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for CheckExceptionOnInvalidReferenceBehaviorPass {
    fn name(&self) -> &'static str {
        "CheckExceptionOnInvalidReferenceBehaviorPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::AnalyzeServiceReferencesPass;
    use crate::definition::MethodCall;
    use crate::reference::{InvalidBehavior, Reference};

    fn analyzed(container: &mut ContainerBuilder) {
        AnalyzeServiceReferencesPass::constructor_only().process(container).unwrap();
    }

    #[test]
    fn cycles_through_method_calls_are_allowed() {
        let mut container = ContainerBuilder::new();
        container.register("a", None).add_argument(Reference::new("b"));
        container.register("b", None).add_argument(Reference::new("c"));
        container
            .register("c", None)
            .add_method_call(MethodCall::new("setA", [Value::reference("a")]))
            .unwrap();
        analyzed(&mut container);
        CheckCircularReferencesPass::new().process(&mut container).unwrap();
    }

    #[test]
    fn lazy_and_weak_edges_break_cycles() {
        let mut container = ContainerBuilder::new();
        container.register("a", None).add_argument(Reference::new("b"));
        container
            .register("b", None)
            .add_argument(crate::argument::Argument::service_closure(Reference::new("a")));
        container.register("c", None).add_argument(Reference::new("d"));
        container
            .register("d", None)
            .add_argument(Reference::with_behavior("c", InvalidBehavior::IgnoreUninitialized));
        analyzed(&mut container);
        CheckCircularReferencesPass::new().process(&mut container).unwrap();
    }

    #[test]
    fn cycles_are_reported_from_their_first_node() {
        let mut container = ContainerBuilder::new();
        container.register("entry", None).add_argument(Reference::new("a"));
        container.register("a", None).add_argument(Reference::new("b"));
        container.register("b", None).add_argument(Reference::new("a"));
        analyzed(&mut container);
        let err = CheckCircularReferencesPass::new().process(&mut container).unwrap_err();
        assert!(err.is_circular());
        assert_eq!(err.to_string(), "Circular reference detected for service \"a\", path: \"a -> b -> a\".");
    }

    #[test]
    fn cycles_start_at_the_first_registered_service() {
        let mut container = ContainerBuilder::new();
        container.register("a", None).add_argument(Reference::new("alias_b"));
        container.register("b", None).add_argument(Reference::new("a"));
        container.set_alias("alias_b", "b").unwrap();
        analyzed(&mut container);
        let err = CheckCircularReferencesPass::new().process(&mut container).unwrap_err();
        assert_eq!(err.to_string(), "Circular reference detected for service \"a\", path: \"a -> b -> a\".");
    }

    #[test]
    fn abstract_targets_are_rejected() {
        let mut container = ContainerBuilder::new();
        container.register("base", Some("App\\Base")).set_abstract(true);
        container.register("other", Some("App\\Base")).set_abstract(true).add_argument(Reference::new("base"));
        CheckReferenceValidityPass.process(&mut container).unwrap();

        container.register("user", Some("App\\User")).add_argument(Reference::new("base"));
        let err = CheckReferenceValidityPass.process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The definition \"user\" has a reference to an abstract definition \"base\". Abstract definitions cannot be the target of references."
        );
    }

    #[test]
    fn argument_problems_are_described() {
        let mut container = ContainerBuilder::new();
        container
            .register("named", None)
            .set_argument(ArgKey::Named("dsn".to_string()), Value::from("smtp://"))
            .set_argument(0usize, Value::from(1));
        container
            .register("replaced", None)
            .set_argument(ArgKey::Replace(0), Value::from(1));
        let mut call = MethodCall::new("setLogger", []);
        std::sync::Arc::make_mut(&mut call.arguments).insert(ArgKey::Index(2), Value::Null);
        container.register("calls", None).add_method_call(call).unwrap();

        CheckArgumentsValidityPass::new(false).process(&mut container).unwrap();

        assert_eq!(
            container.definition("named").unwrap().errors(),
            ["Invalid constructor argument for service \"named\": cannot use positional argument after named argument. Check your service definition."]
        );
        assert_eq!(
            container.definition("replaced").unwrap().errors(),
            ["Invalid constructor argument for service \"replaced\": integer expected but found string \"index_0\". Check your service definition."]
        );
        assert_eq!(
            container.definition("calls").unwrap().errors(),
            ["Invalid argument 3 for method call \"setLogger\" of service \"calls\": argument 1 must be defined before. Check your service definition."]
        );

        let err = CheckArgumentsValidityPass::new(true).process(&mut container).unwrap_err();
        assert!(err.to_string().starts_with("Invalid constructor argument for service \"named\""));
    }

    #[test]
    fn missing_references_are_reported_unless_tolerated() {
        let mut container = ContainerBuilder::new();
        container
            .register("client", None)
            .add_argument(Reference::with_behavior("missing", InvalidBehavior::Ignore))
            .add_argument(Reference::with_behavior("missing", InvalidBehavior::Null))
            .add_argument(Reference::new("service_container"));
        CheckExceptionOnInvalidReferenceBehaviorPass.process(&mut container).unwrap();

        container.register("logger", None);
        container.register("user", None).add_argument(Reference::new("loger"));
        let err = CheckExceptionOnInvalidReferenceBehaviorPass.process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The service \"user\" has a dependency on a non-existent service \"loger\". Did you mean this: \"logger\"?"
        );
    }

    #[test]
    fn anonymous_services_report_their_consumer() {
        let mut container = ContainerBuilder::new();
        container.register(".1_Client~abcdefg", None).add_argument(Reference::new("nowhere"));
        container.register("app", None).add_argument(Reference::new(".1_Client~abcdefg"));
        analyzed(&mut container);
        let err = CheckExceptionOnInvalidReferenceBehaviorPass.process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The service \"app\" has a dependency on a non-existent service \"nowhere\"."
        );
    }
}
