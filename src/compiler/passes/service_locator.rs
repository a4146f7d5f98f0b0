use std::sync::Arc;

use crate::argument::Argument;
use crate::class::SERVICE_LOCATOR_CLASS;
use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::{ContainerBuilder, SERVICE_CONTAINER_ID};
use crate::definition::{Alias, Callable, Definition, TagAttributes};
use crate::error::{CompileError, CompileResult};
use crate::internal::hash_id;
use crate::reference::Reference;
use crate::value::{sort_keys, ArgKey, Value, ValueMap};

use super::find_and_sort_tagged_services;

/// Tag of service locator definitions.
pub const SERVICE_LOCATOR_TAG: &str = "container.service_locator";

/// Registers a private locator holding `services` and returns a reference
/// to it.
///
/// Locators with the same content are shared. With a `caller_id`, the
/// returned reference points at a per-caller locator derived from the
/// shared one, which also inherits the caller's bindings.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{register_service_locator, ContainerBuilder, Reference, Value, ValueMap};
///
/// let mut container = ContainerBuilder::new();
/// let mut services = ValueMap::new();
/// services.insert("logger".into(), Value::from(Reference::new("logger")));
///
/// let locator = register_service_locator(&mut container, services.clone(), None);
/// assert!(locator.id().starts_with(".service_locator."));
/// assert_eq!(register_service_locator(&mut container, services, None), locator);
/// ```
pub fn register_service_locator(
    container: &mut ContainerBuilder,
    services: ValueMap,
    caller_id: Option<&str>,
) -> Reference {
    let services: ValueMap = services
        .into_iter()
        .map(|(key, value)| match value {
            Value::Argument(Argument::ServiceClosure(_)) => (key, value),
            other => (key, Value::Argument(Argument::service_closure(other))),
        })
        .collect();
    let mut locator = Definition::with_class(SERVICE_LOCATOR_CLASS);
    locator.add_argument(Value::from(services)).add_tag(SERVICE_LOCATOR_TAG);
    if let Some(caller) = caller_id.and_then(|id| container.definition(id).ok()) {
        locator.bindings = caller.bindings().clone();
    }

    let id = format!(".service_locator.{}", locator_hash(&locator));
    if !container.has_definition(&id) {
        container.replace_definition_arc(&id, Arc::new(locator));
    }
    let Some(caller_id) = caller_id else {
        return Reference::new(id);
    };

    let context_id = format!("{}.{}", id, caller_id);
    let mut attributes = TagAttributes::new();
    attributes.insert("id".to_string(), Value::from(caller_id));
    container
        .register(&context_id, Some(SERVICE_LOCATOR_CLASS))
        .set_factory(Some(Callable::service_method(id, "withContext")))
        .add_tag_with("container.service_locator_context", attributes)
        .add_argument(caller_id)
        .add_argument(Reference::new(SERVICE_CONTAINER_ID));
    Reference::new(context_id)
}

fn locator_hash(locator: &Definition) -> String {
    let bindings: Vec<String> = locator.bindings().keys().cloned().collect();
    hash_id(&format!("{:?}|{:?}|{:?}", locator.class(), locator.arguments(), bindings))
}

/// Turns the first argument of every `container.service_locator` service
/// into a map of lazy service closures.
///
/// List entries holding a reference are keyed by the referenced id. Inline
/// locator definitions and locator arguments are registered as shared
/// private locators and replaced by a reference to them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceLocatorTagPass;

impl ServiceLocatorTagPass {
    fn wrap_services(&self, current_id: &str, services: &ValueMap) -> CompileResult<ValueMap> {
        let mut wrapped = ValueMap::with_capacity(services.len());
        let mut position: Option<usize> = Some(0);
        for (key, value) in services.iter() {
            if let Value::Argument(Argument::ServiceClosure(_)) = value {
                wrapped.insert(key.clone(), value.clone());
                continue;
            }
            let Value::Reference(reference) = value else {
                return Err(CompileError::invalid(format!(
                    "Invalid definition for service \"{}\": an array of references is expected as first argument when the \"container.service_locator\" tag is set, \"{}\" found for key \"{}\".",
                    current_id,
                    value.type_name(),
                    key
                )));
            };
            let mut key = key.clone();
            match (key.index(), position) {
                (Some(index), Some(expected)) if index == expected => {
                    key = ArgKey::Named(reference.id().to_string());
                    position = Some(expected + 1);
                }
                (Some(_), _) => position = None,
                _ => {}
            }
            wrapped.insert(key, Value::Argument(Argument::service_closure(value.clone())));
        }
        sort_keys(&mut wrapped);
        Ok(wrapped)
    }
}

impl RecursivePass for ServiceLocatorTagPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        if let Value::Argument(Argument::ServiceLocator(locator)) = value {
            let values = match &locator.tagged {
                Some(tagged) => find_and_sort_tagged_services(tagged, cx.container, &[])?,
                None => (*locator.values).clone(),
            };
            let values = match walk_children(self, cx, &Value::from(values.clone()))? {
                Some(Value::Array(walked)) => (*walked).clone(),
                _ => values,
            };
            return Ok(Some(Value::from(register_service_locator(cx.container, values, None))));
        }
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };

        let mut current: Option<Definition> = None;
        for (key, binding) in definition.bindings() {
            if let Some(new) = self.process_value(cx, binding.value(), false)? {
                current
                    .get_or_insert_with(|| (**definition).clone())
                    .bindings
                    .insert(key.clone(), binding.with_value(new));
            }
        }
        if !definition.has_tag(SERVICE_LOCATOR_TAG) {
            return match current {
                Some(current) => {
                    let current = Value::definition(current);
                    Ok(Some(walk_children(self, cx, &current)?.unwrap_or(current)))
                }
                None => walk_children(self, cx, value),
            };
        }

        let mut locator = current.unwrap_or_else(|| (**definition).clone());
        if locator.class().is_none() {
            locator.set_class(Some(SERVICE_LOCATOR_CLASS.to_string()));
        }
        let services = match locator.arguments().get(&ArgKey::Index(0)) {
            Some(Value::Argument(Argument::TaggedIterator(tagged))) => {
                let tagged = tagged.clone();
                find_and_sort_tagged_services(&tagged, cx.container, &[])?
            }
            Some(Value::Array(services)) => (**services).clone(),
            _ => {
                return Err(CompileError::invalid(format!(
                    "Invalid definition for service \"{}\": an array of references is expected as first argument when the \"container.service_locator\" tag is set.",
                    cx.current_id
                )))
            }
        };
        let services = self.wrap_services(&cx.current_id, &services)?;
        locator.set_argument(0, Value::from(services));

        let id = format!(".service_locator.{}", locator_hash(&locator));
        if is_root {
            if id != cx.current_id {
                cx.container.set_alias(&id, Alias::new(cx.current_id.clone()))?;
            }
            return Ok(Some(Value::definition(locator)));
        }
        locator.set_public(false);
        cx.container.replace_definition_arc(&id, Arc::new(locator));
        Ok(Some(Value::from(Reference::new(id))))
    }
}

impl CompilerPass for ServiceLocatorTagPass {
    fn name(&self) -> &'static str {
        "ServiceLocatorTagPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}
