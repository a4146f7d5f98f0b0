use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::error::{CompileError, CompileResult};
use crate::reference::InvalidBehavior;
use crate::value::Value;

/// Tag marking definitions whose errors are reported by the runtime.
pub const ERROR_TAG: &str = "container.error";

/// Raises the first error recorded on any surviving definition.
///
/// Private definitions only used through references that defer failures
/// to runtime keep their errors; they are reported if the service is ever
/// requested.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, DefinitionErrorExceptionPass};
///
/// let mut container = ContainerBuilder::new();
/// container
///     .register("mailer", Some("App\\Mailer"))
///     .set_public(true)
///     .add_error("Cannot autowire service \"mailer\".")
///     .add_error("Second problem.");
///
/// let err = DefinitionErrorExceptionPass.process(&mut container).unwrap_err();
/// assert_eq!(err.to_string(), "Cannot autowire service \"mailer\".");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct DefinitionErrorExceptionPass;

impl DefinitionErrorExceptionPass {
    /// True when every use of `id` tolerates a failure at runtime.
    fn deferred_to_runtime(cx: &WalkContext<'_>) -> bool {
        let graph = cx.container.graph();
        let mut edges = graph.in_edges(&cx.current_id).peekable();
        if edges.peek().is_none() {
            return false;
        }
        edges.all(|edge| {
            edge.reference()
                .map_or(false, |reference| reference.invalid_behavior() == InvalidBehavior::RuntimeException)
        })
    }
}

impl RecursivePass for DefinitionErrorExceptionPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };
        let Some(first) = definition.errors().first() else {
            return walk_children(self, cx, value);
        };
        if definition.has_tag(ERROR_TAG) {
            return walk_children(self, cx, value);
        }
        if is_root && !definition.is_public() && Self::deferred_to_runtime(cx) {
            return walk_children(self, cx, value);
        }
        Err(CompileError::runtime(first.clone()))
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for DefinitionErrorExceptionPass {
    fn name(&self) -> &'static str {
        "DefinitionErrorExceptionPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::passes::AnalyzeServiceReferencesPass;
    use crate::definition::Definition;
    use crate::reference::Reference;

    #[test]
    fn errors_of_inline_definitions_are_raised() {
        let mut container = ContainerBuilder::new();
        let mut inline = Definition::with_class("App\\Broken");
        inline.add_error("Inline problem.");
        container.register("app", Some("App\\App")).set_public(true).add_argument(Value::from(inline));
        let err = DefinitionErrorExceptionPass.process(&mut container).unwrap_err();
        assert_eq!(err.to_string(), "Inline problem.");
    }

    #[test]
    fn runtime_only_uses_defer_the_error() {
        let mut container = ContainerBuilder::new();
        container.register(".errored.app.mailer", Some("App\\Mailer")).add_error("Mailer is missing.");
        container
            .register("app", Some("App\\App"))
            .set_public(true)
            .add_argument(Reference::typed(".errored.app.mailer", "App\\Mailer", InvalidBehavior::RuntimeException, None));
        AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
        DefinitionErrorExceptionPass.process(&mut container).unwrap();

        container.register("other", Some("App\\Other")).set_public(true).add_argument(Reference::new(".errored.app.mailer"));
        AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
        let err = DefinitionErrorExceptionPass.process(&mut container).unwrap_err();
        assert_eq!(err.to_string(), "Mailer is missing.");
    }

    #[test]
    fn tagged_definitions_are_skipped() {
        let mut container = ContainerBuilder::new();
        container
            .register("broken", Some("App\\Broken"))
            .set_public(true)
            .add_tag(ERROR_TAG)
            .add_error("Broken.");
        DefinitionErrorExceptionPass.process(&mut container).unwrap();
    }
}
