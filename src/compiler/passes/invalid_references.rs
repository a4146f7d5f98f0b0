use std::sync::Arc;

use crate::argument::Argument;
use crate::compiler::CompilerPass;
use crate::container::{ContainerBuilder, EXCLUDED_TAG};
use crate::definition::Definition;
use crate::error::{CompileError, CompileResult};
use crate::reference::{InvalidBehavior, Reference};
use crate::value::{ArgKey, Value, ValueMap};

/// Raised by a reference to drop; caught by the closest enclosing
/// collection allowed to drop it.
struct Ignored;

type Resolution = Result<Option<Value>, Ignored>;

/// Which slot of a definition a collection belongs to. Decides what an
/// ignored reference removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Arguments,
    Properties,
    Calls,
}

/// Replaces references to missing services according to their invalid
/// behavior.
///
/// With [`InvalidBehavior::Null`] the reference becomes `null`. With
/// [`InvalidBehavior::Ignore`] the enclosing element is dropped: a
/// constructor argument becomes `null`, a property is removed, a method
/// call is removed, and entries of nested arrays or iterators are removed
/// (lists are renumbered). Services tagged `container.excluded` count as
/// missing. Synthetic and abstract definitions are left alone.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, InvalidBehavior, MethodCall, Reference, ResolveInvalidReferencesPass, Value};
///
/// let mut container = ContainerBuilder::new();
/// container
///     .register("newsletter", Some("App\\Newsletter"))
///     .add_argument(Reference::with_behavior("logger", InvalidBehavior::Null))
///     .add_method_call(MethodCall::new("setTracer", [Value::from(Reference::with_behavior("tracer", InvalidBehavior::Ignore))]))
///     .unwrap();
///
/// ResolveInvalidReferencesPass::new().process(&mut container).unwrap();
///
/// let newsletter = container.definition("newsletter").unwrap();
/// assert_eq!(newsletter.arguments()[0], Value::Null);
/// assert!(newsletter.method_calls().is_empty());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ResolveInvalidReferencesPass {
    current_id: String,
}

impl ResolveInvalidReferencesPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&mut self, container: &mut ContainerBuilder, value: &Value, root: Slot, level: usize) -> CompileResult<Resolution> {
        match value {
            Value::Reference(reference) => self.resolve_reference(container, reference),
            Value::Array(map) => Ok(self
                .resolve_map(container, map, root, level)?
                .map(|map| map.map(|map| Value::Array(Arc::new(map))))),
            Value::Argument(Argument::ServiceClosure(inner)) => Ok(self
                .resolve(container, inner, Slot::Properties, level + 1)?
                .map(|inner| inner.map(|inner| Value::Argument(Argument::ServiceClosure(Box::new(inner)))))),
            Value::Argument(argument) => match argument.values() {
                Some(values) => Ok(self
                    .resolve_map(container, values, root, level + 1)?
                    .map(|values| values.map(|values| Value::Argument(argument.with_values(Arc::new(values)))))),
                None => Ok(Ok(None)),
            },
            Value::Definition(definition) => {
                Ok(Ok(self.resolve_definition(container, definition)?.map(Value::definition)))
            }
            _ => Ok(Ok(None)),
        }
    }

    /// Resolves every entry of `map`, `level` deep into slot `root`.
    fn resolve_map(
        &mut self,
        container: &mut ContainerBuilder,
        map: &ValueMap,
        root: Slot,
        level: usize,
    ) -> CompileResult<Result<Option<ValueMap>, Ignored>> {
        let sequential = map.keys().enumerate().all(|(position, key)| *key == ArgKey::Index(position));
        let mut out: Option<ValueMap> = None;
        let mut removed = false;
        for (key, item) in map.iter() {
            match self.resolve(container, item, root, level + 1)? {
                Ok(None) => {}
                Ok(Some(value)) => {
                    out.get_or_insert_with(|| map.clone()).insert(key.clone(), value);
                }
                Err(Ignored) => {
                    let depth = root_depth(root);
                    if depth < level || (depth > 0 && level == 0) {
                        out.get_or_insert_with(|| map.clone()).shift_remove(key);
                        removed = true;
                    } else if depth > 0 {
                        return Ok(Err(Ignored));
                    } else {
                        out.get_or_insert_with(|| map.clone()).insert(key.clone(), Value::Null);
                    }
                }
            }
        }
        if let Some(out) = out.as_mut() {
            if sequential && removed {
                let values: Vec<Value> = out.drain(..).map(|(_, value)| value).collect();
                out.extend(values.into_iter().enumerate().map(|(position, value)| (ArgKey::Index(position), value)));
            }
        }
        Ok(Ok(out))
    }

    fn resolve_definition(&mut self, container: &mut ContainerBuilder, definition: &Definition) -> CompileResult<Option<Definition>> {
        if definition.is_synthetic() || definition.is_abstract() {
            return Ok(None);
        }
        let mut out: Option<Definition> = None;
        if let Ok(Some(arguments)) = self.resolve_map(container, definition.arguments(), Slot::Arguments, 0)? {
            out.get_or_insert_with(|| definition.clone()).set_arguments(arguments);
        }
        if let Ok(Some(properties)) = self.resolve_map(container, definition.properties(), Slot::Properties, 0)? {
            out.get_or_insert_with(|| definition.clone()).set_properties(properties);
        }

        let mut calls = Vec::with_capacity(definition.method_calls().len());
        let mut calls_changed = false;
        for call in definition.method_calls() {
            match self.resolve_map(container, &call.arguments, Slot::Calls, root_depth(Slot::Calls))? {
                Ok(None) => calls.push(call.clone()),
                Ok(Some(arguments)) => {
                    calls_changed = true;
                    let mut call = call.clone();
                    call.arguments = Arc::new(arguments);
                    calls.push(call);
                }
                Err(Ignored) => calls_changed = true,
            }
        }
        if calls_changed {
            out.get_or_insert_with(|| definition.clone()).calls = calls;
        }
        Ok(out)
    }

    fn resolve_reference(&mut self, container: &mut ContainerBuilder, reference: &Reference) -> CompileResult<Resolution> {
        let id = reference.id();
        let exists = match container.definitions().get(id) {
            Some(definition) => !definition.has_tag(EXCLUDED_TAG),
            None => container.has_alias(id),
        };
        if exists {
            return Ok(Ok(None));
        }

        if let Ok(current) = container.definition(&self.current_id) {
            if current.inner_service_id() == Some(id) && current.decoration_on_invalid() == Some(InvalidBehavior::Null) {
                return Ok(Ok(Some(Value::Null)));
            }
        }

        match reference.invalid_behavior() {
            InvalidBehavior::RuntimeException if reference.is_typed() && !container.has(id) => {
                let message = CompileError::ServiceNotFound {
                    id: id.to_string(),
                    source_id: Some(self.current_id.clone()),
                    alternatives: Vec::new(),
                }
                .to_string();
                let errored = format!(".errored.{}.{}", self.current_id, id);
                container.register(&errored, reference.type_hint()).add_error(message);
                Ok(Ok(Some(Value::Reference(reference.retarget(errored)))))
            }
            InvalidBehavior::Null => Ok(Ok(Some(Value::Null))),
            InvalidBehavior::Ignore => Ok(Err(Ignored)),
            _ => Ok(Ok(None)),
        }
    }
}

/// Depth at which the entries of a slot's own collection sit.
fn root_depth(root: Slot) -> usize {
    match root {
        Slot::Arguments => 0,
        Slot::Properties => 1,
        Slot::Calls => 2,
    }
}

impl CompilerPass for ResolveInvalidReferencesPass {
    fn name(&self) -> &'static str {
        "ResolveInvalidReferencesPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let ids: Vec<String> = container.definitions().keys().cloned().collect();
        for id in ids {
            let Some(definition) = container.definitions().get(&id).cloned() else {
                continue;
            };
            self.current_id = id.clone();
            if let Some(resolved) = self.resolve_definition(container, &definition)? {
                container.replace_definition_arc(&id, Arc::new(resolved));
            }
        }
        self.current_id.clear();
        Ok(())
    }
}
