use indexmap::IndexMap;

use crate::compiler::{process_root, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::{Callable, Definition};
use crate::error::CompileResult;
use crate::internal::{IdSet, ResolutionPath};
use crate::reference::Reference;
use crate::value::Value;

/// Tag opting a service out of inlining.
pub const DO_NOT_INLINE_TAG: &str = "container.do_not_inline";

/// Replaces references by the definition they point at, when the
/// definition has no reason to exist on its own.
///
/// A private shared service used by a single shared service is moved into
/// it; a private non-shared service is copied into every user. Inlined
/// definitions are then removed. Lazy, synthetic, deprecated and erroneous
/// services are never inlined, nor are services tagged
/// `container.do_not_inline` or services used through a closure, an
/// iterator or a weak reference. Needs an up-to-date reference graph.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{AnalyzeServiceReferencesPass, CompilerPass, ContainerBuilder, InlineServiceDefinitionsPass, Reference};
///
/// let mut container = ContainerBuilder::new();
/// container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("router"));
/// container.register("router", Some("App\\Router"));
///
/// AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
/// InlineServiceDefinitionsPass::new().process(&mut container).unwrap();
///
/// assert!(!container.has_definition("router"));
/// let inlined = container.definition("app").unwrap().arguments()[0].as_definition().unwrap().clone();
/// assert_eq!(inlined.class(), Some("App\\Router"));
/// ```
#[derive(Debug, Default)]
pub struct InlineServiceDefinitionsPass {
    /// Inlined ids, and whether the definition must outlive inlining
    inlined: IndexMap<String, bool>,
    not_inlinable: IdSet<String>,
    processed: IdSet<String>,
    nesting: Vec<String>,
    cloning: ResolutionPath,
}

impl InlineServiceDefinitionsPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_inlinable(&self, container: &ContainerBuilder, current_id: &str, id: &str, definition: &Definition) -> bool {
        if definition.has_errors()
            || definition.is_deprecated()
            || definition.is_lazy()
            || definition.is_synthetic()
            || definition.has_tag(DO_NOT_INLINE_TAG)
            || self.nesting.iter().any(|nested| nested == id)
        {
            return false;
        }
        let graph = container.graph();
        if !definition.is_shared() {
            return graph.in_edges(id).all(|edge| !edge.is_weak() && !edge.is_lazy());
        }
        if definition.is_public() {
            return false;
        }
        if !graph.has_node(id) {
            return true;
        }
        if current_id == id {
            return false;
        }

        let mut sources: IdSet<&str> = IdSet::default();
        let mut uses = 0;
        for edge in graph.in_edges(id) {
            if edge.is_weak() || edge.is_lazy() {
                return false;
            }
            sources.insert(graph.source_of(edge).id());
            uses += 1;
        }
        if sources.len() != 1 {
            return false;
        }
        let built_by_service = matches!(
            definition.factory(),
            Some(Callable::Method(Value::Reference(_), _)) | Some(Callable::Method(Value::Definition(_), _))
        );
        if uses > 1 && built_by_service {
            return false;
        }
        sources
            .iter()
            .next()
            .and_then(|source| container.definitions().get(*source))
            .map_or(false, |source| source.is_shared())
    }

    fn inline_reference(&mut self, cx: &mut WalkContext<'_>, reference: &Reference) -> CompileResult<Option<Value>> {
        let id = reference.id();
        let Some(definition) = cx.container.definitions().get(id).cloned() else {
            return Ok(None);
        };
        if !self.is_inlinable(cx.container, &cx.current_id, id, &definition) {
            if cx.current_id != id {
                self.not_inlinable.insert(id.to_string());
            }
            return Ok(None);
        }

        cx.container.log(self.name(), format!("Inlined service \"{}\" to \"{}\".", id, cx.current_id));
        self.inlined
            .insert(id.to_string(), definition.is_public() || !definition.is_shared());

        let current = Value::Definition(definition.clone());
        if definition.is_shared() {
            let parent = std::mem::replace(&mut cx.current_id, id.to_string());
            self.nesting.push(id.to_string());
            let walked = walk_children(self, cx, &current);
            self.nesting.pop();
            cx.current_id = parent;
            self.processed.insert(id.to_string());
            return Ok(Some(match walked? {
                Some(Value::Definition(walked)) => {
                    cx.container.replace_definition_arc(id, walked.clone());
                    Value::Definition(walked)
                }
                _ => current,
            }));
        }

        self.cloning.enter(id)?;
        let walked = self.process_value(cx, &current, false);
        self.cloning.leave();
        Ok(Some(walked?.unwrap_or(current)))
    }
}

impl RecursivePass for InlineServiceDefinitionsPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        match value {
            // references inside closures and iterators stay lazy
            Value::Argument(_) => Ok(None),
            Value::Definition(definition) if !self.cloning.is_empty() && definition.is_shared() => Ok(None),
            Value::Reference(reference) => self.inline_reference(cx, reference),
            _ => walk_children(self, cx, value),
        }
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for InlineServiceDefinitionsPass {
    fn name(&self) -> &'static str {
        "InlineServiceDefinitionsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let ids: Vec<String> = container.definitions().keys().cloned().collect();
        let mut result = Ok(());
        for id in ids {
            if self.processed.contains(&id) || container.graph().out_edges(&id).next().is_none() {
                continue;
            }
            let Some(definition) = container.definitions().get(&id).cloned() else {
                continue;
            };
            self.processed.insert(id.clone());
            result = process_root(self, container, &id, definition);
            if result.is_err() {
                break;
            }
        }

        if result.is_ok() {
            for (id, outlives) in &self.inlined {
                if !outlives {
                    container.remove_definition(id);
                    continue;
                }
                if self.not_inlinable.contains(id) {
                    continue;
                }
                let removable = container
                    .definitions()
                    .get(id)
                    .map_or(false, |definition| !definition.is_shared() && !definition.is_public());
                if removable {
                    container.remove_definition(id);
                }
            }
        }

        self.inlined.clear();
        self.not_inlinable.clear();
        self.processed.clear();
        self.nesting.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::Argument;
    use crate::compiler::passes::AnalyzeServiceReferencesPass;

    fn inline(container: &mut ContainerBuilder) -> CompileResult<()> {
        AnalyzeServiceReferencesPass::full().process(container)?;
        InlineServiceDefinitionsPass::new().process(container)
    }

    fn inlined_class(container: &ContainerBuilder, id: &str, position: usize) -> Option<String> {
        container.definition(id).ok()?.arguments()[position]
            .as_definition()
            .and_then(|definition| definition.class().map(str::to_string))
    }

    #[test]
    fn chains_of_single_use_services_collapse() {
        let mut container = ContainerBuilder::new();
        container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("router"));
        container.register("router", Some("App\\Router")).add_argument(Reference::new("matcher"));
        container.register("matcher", Some("App\\Matcher"));

        inline(&mut container).unwrap();

        assert!(!container.has_definition("router"));
        assert!(!container.has_definition("matcher"));
        let router = container.definition("app").unwrap().arguments()[0].as_definition().unwrap().clone();
        assert_eq!(router.arguments()[0].as_definition().unwrap().class(), Some("App\\Matcher"));
        assert_eq!(
            container.log_entries(),
            [
                "InlineServiceDefinitionsPass: Inlined service \"router\" to \"app\".",
                "InlineServiceDefinitionsPass: Inlined service \"matcher\" to \"router\".",
            ]
        );
    }

    #[test]
    fn shared_services_used_twice_stay() {
        let mut container = ContainerBuilder::new();
        container.register("a", None).set_public(true).add_argument(Reference::new("logger"));
        container.register("b", None).set_public(true).add_argument(Reference::new("logger"));
        container.register("logger", Some("App\\Logger"));

        inline(&mut container).unwrap();

        assert!(container.has_definition("logger"));
        assert_eq!(container.definition("a").unwrap().arguments()[0], Value::reference("logger"));
    }

    #[test]
    fn non_shared_services_are_copied_into_every_user() {
        let mut container = ContainerBuilder::new();
        container.register("a", None).set_public(true).add_argument(Reference::new("request"));
        container.register("b", None).set_public(true).add_argument(Reference::new("request"));
        container.register("request", Some("App\\Request")).set_shared(false);

        inline(&mut container).unwrap();

        assert!(!container.has_definition("request"));
        assert_eq!(inlined_class(&container, "a", 0).as_deref(), Some("App\\Request"));
        assert_eq!(inlined_class(&container, "b", 0).as_deref(), Some("App\\Request"));
    }

    #[test]
    fn some_services_are_never_inlined() {
        let mut container = ContainerBuilder::new();
        container
            .register("app", None)
            .set_public(true)
            .add_argument(Reference::new("lazy"))
            .add_argument(Reference::new("opted_out"))
            .add_argument(Reference::new("exposed"))
            .add_argument(Argument::service_closure(Reference::new("closure")));
        container.register("lazy", None).set_lazy(true);
        container.register("opted_out", None).add_tag(DO_NOT_INLINE_TAG);
        container.register("exposed", None).set_public(true);
        container.register("closure", None);

        inline(&mut container).unwrap();

        for id in ["lazy", "opted_out", "exposed", "closure"] {
            assert!(container.has_definition(id), "{} was inlined", id);
        }
        assert!(container.log_entries().is_empty());
    }

    #[test]
    fn self_referencing_prototypes_are_circular() {
        let mut container = ContainerBuilder::new();
        container.register("app", None).set_public(true).add_argument(Reference::new("node"));
        container
            .register("node", None)
            .set_shared(false)
            .add_argument(Reference::new("node"));

        let err = inline(&mut container).unwrap_err();
        assert_eq!(err.to_string(), "Circular reference detected for service \"node\", path: \"node -> node\".");
    }
}
