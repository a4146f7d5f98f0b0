use std::collections::VecDeque;

use tracing::debug;

use crate::argument::Argument;
use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::definition::{Callable, Definition};
use crate::error::CompileResult;
use crate::internal::IdSet;
use crate::reference::InvalidBehavior;
use crate::value::{Value, ValueMap};

/// Drops abstract definitions.
///
/// Abstract definitions only exist to be extended by child definitions,
/// which have been flattened by now.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveAbstractDefinitionsPass;

impl CompilerPass for RemoveAbstractDefinitionsPass {
    fn name(&self) -> &'static str {
        "RemoveAbstractDefinitionsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let abstract_ids: Vec<String> = container
            .definitions()
            .iter()
            .filter(|(_, definition)| definition.is_abstract())
            .map(|(id, _)| id.clone())
            .collect();
        for id in abstract_ids {
            container.remove_definition(&id);
            container.log(self.name(), format!("Removed service \"{}\"; reason: abstract.", id));
        }
        Ok(())
    }
}

/// Drops private definitions that no surviving service or alias uses.
///
/// Public definitions and alias targets are the roots; every reference
/// found anywhere in a kept definition (arguments, properties, method
/// calls, factory, configurator and nested values) keeps its target alive,
/// except references that only apply once the target is initialized.
/// Removing a definition can orphan the ones it used; the pass keeps
/// going until nothing else can be removed.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, Reference, RemoveUnusedDefinitionsPass};
///
/// let mut container = ContainerBuilder::new();
/// container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("router"));
/// container.register("router", Some("App\\Router"));
/// container.register("orphan", Some("App\\Orphan")).add_argument(Reference::new("helper"));
/// container.register("helper", Some("App\\Helper"));
///
/// RemoveUnusedDefinitionsPass.process(&mut container).unwrap();
///
/// assert!(container.has_definition("router"));
/// assert!(!container.has_definition("orphan"));
/// assert!(!container.has_definition("helper"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveUnusedDefinitionsPass;

fn collect_map(values: &ValueMap, out: &mut Vec<String>) {
    for value in values.values() {
        collect_value(value, out);
    }
}

fn collect_callable(callable: Option<&Callable>, out: &mut Vec<String>) {
    if let Some(Callable::Method(target, _)) = callable {
        collect_value(target, out);
    }
}

fn collect_value(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Reference(reference) => {
            if reference.invalid_behavior() != InvalidBehavior::IgnoreUninitialized {
                out.push(reference.id().to_string());
            }
        }
        Value::Array(map) => collect_map(map, out),
        Value::Argument(Argument::ServiceClosure(inner)) => collect_value(inner, out),
        Value::Argument(argument) => {
            if let Some(values) = argument.values() {
                collect_map(values, out);
            }
        }
        Value::Definition(definition) => collect_definition(definition, out),
        _ => {}
    }
}

/// Ids referenced from anywhere inside `definition`.
fn collect_definition(definition: &Definition, out: &mut Vec<String>) {
    collect_map(definition.arguments(), out);
    collect_map(definition.properties(), out);
    for call in definition.method_calls() {
        collect_map(&call.arguments, out);
    }
    collect_callable(definition.factory(), out);
    collect_callable(definition.configurator(), out);
}

impl CompilerPass for RemoveUnusedDefinitionsPass {
    fn name(&self) -> &'static str {
        "RemoveUnusedDefinitionsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let mut pending: VecDeque<String> = container
            .definitions()
            .iter()
            .filter(|(_, definition)| definition.is_public())
            .map(|(id, _)| id.clone())
            .chain(container.aliases().values().map(|alias| alias.id().to_string()))
            .collect();

        let mut connected: IdSet<String> = IdSet::default();
        let mut found = Vec::new();
        while let Some(id) = pending.pop_front() {
            let Some((id, definition)) = container.find_definition_arc(&id) else {
                continue;
            };
            if !connected.insert(id) {
                continue;
            }
            collect_definition(definition, &mut found);
            pending.extend(found.drain(..));
        }

        let unused: Vec<String> = container
            .definitions()
            .keys()
            .filter(|id| !connected.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &unused {
            container.remove_definition(id);
            container.log(self.name(), format!("Removed service \"{}\"; reason: unused.", id));
        }
        debug!(kept = connected.len(), removed = unused.len(), "unused definitions removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::MethodCall;
    use crate::reference::Reference;

    #[test]
    fn abstract_definitions_are_removed() {
        let mut container = ContainerBuilder::new();
        container.register("base", None).set_abstract(true);
        container.register("mailer", None);
        RemoveAbstractDefinitionsPass.process(&mut container).unwrap();
        assert!(!container.has_definition("base"));
        assert!(container.has_definition("mailer"));
        assert_eq!(
            container.log_entries(),
            ["RemoveAbstractDefinitionsPass: Removed service \"base\"; reason: abstract."]
        );
    }

    #[test]
    fn every_slot_keeps_its_targets_alive() {
        let mut container = ContainerBuilder::new();
        let mut inline = Definition::with_class("App\\Inline");
        inline.add_argument(Reference::new("from_inline"));
        container
            .register("app", None)
            .set_public(true)
            .set_property("logger", Value::reference("from_property"))
            .add_argument(Value::from(inline))
            .add_argument(Argument::service_closure(Reference::new("from_closure")))
            .add_argument(Reference::with_behavior("weak", InvalidBehavior::IgnoreUninitialized))
            .set_configurator(Some(Callable::service_method("from_configurator", "configure")))
            .add_method_call(MethodCall::new("setCache", [Value::reference("from_call")]))
            .unwrap();
        for id in ["from_inline", "from_property", "from_closure", "from_configurator", "from_call", "weak"] {
            container.register(id, None);
        }
        container.register("target", None);
        container.set_alias("target.alias", "target").unwrap();

        RemoveUnusedDefinitionsPass.process(&mut container).unwrap();

        for id in ["from_inline", "from_property", "from_closure", "from_configurator", "from_call", "target"] {
            assert!(container.has_definition(id), "{} was removed", id);
        }
        assert!(!container.has_definition("weak"));
        assert_eq!(
            container.log_entries(),
            ["RemoveUnusedDefinitionsPass: Removed service \"weak\"; reason: unused."]
        );
    }

    #[test]
    fn removal_reaches_a_fixed_point() {
        let mut container = ContainerBuilder::new();
        container.register("a", None).add_argument(Reference::new("b"));
        container.register("b", None).add_argument(Reference::new("c"));
        container.register("c", None).add_argument(Reference::new("a"));
        container.register("kept", None).set_public(true);

        RemoveUnusedDefinitionsPass.process(&mut container).unwrap();
        let remaining: Vec<String> = container.definitions().keys().cloned().collect();
        assert_eq!(remaining, vec!["service_container".to_string(), "kept".to_string()]);

        RemoveUnusedDefinitionsPass.process(&mut container).unwrap();
        let again: Vec<String> = container.definitions().keys().cloned().collect();
        assert_eq!(again, remaining);
    }
}
