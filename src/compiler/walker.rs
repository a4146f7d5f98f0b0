//! The recursive walker shared by structural passes.
//!
//! A pass implements [`RecursivePass::process_value`] and returns `None`
//! when a node is left untouched. Parents are only copied when one of their
//! children actually changed, so untouched subtrees keep their `Arc`
//! identity from one pass to the next.

use std::sync::Arc;

use crate::argument::Argument;
use crate::class::MethodMetadata;
use crate::container::{ContainerBuilder, EXCLUDED_TAG};
use crate::definition::{Callable, Changes, Definition};
use crate::error::{CompileError, CompileResult};
use crate::value::{Value, ValueMap};

/// State visible to a pass while it walks one root definition.
pub struct WalkContext<'a> {
    pub container: &'a mut ContainerBuilder,
    /// Id of the root definition being walked
    pub current_id: String,
    errors: Vec<(String, String)>,
}

impl<'a> WalkContext<'a> {
    pub fn new(container: &'a mut ContainerBuilder, current_id: impl Into<String>) -> Self {
        Self {
            container,
            current_id: current_id.into(),
            errors: Vec::new(),
        }
    }

    /// Records a deferred error on the current root definition.
    ///
    /// Errors are attached once the root has been written back.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push((self.current_id.clone(), message.into()));
    }

    pub(crate) fn take_errors(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.errors)
    }
}

/// A pass that rewrites the definition forest node by node.
pub trait RecursivePass {
    /// Returns the replacement of `value`, or `None` to keep it.
    ///
    /// The default walks into the children of `value`; overriding passes
    /// call [`walk_children`] for the same effect.
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        let _ = is_root;
        walk_children(self, cx, value)
    }

    /// Skip scalar array entries without calling `process_value`.
    fn skip_scalars(&self) -> bool {
        false
    }
}

/// Walks the children of `value`, rebuilding it if any child changed.
pub fn walk_children<P>(pass: &mut P, cx: &mut WalkContext<'_>, value: &Value) -> CompileResult<Option<Value>>
where
    P: RecursivePass + ?Sized,
{
    match value {
        Value::Array(map) => Ok(walk_map(pass, cx, map)?.map(Value::Array)),
        Value::Argument(Argument::ServiceClosure(inner)) => Ok(pass
            .process_value(cx, inner, false)?
            .map(|v| Value::Argument(Argument::ServiceClosure(Box::new(v))))),
        Value::Argument(argument) => match argument.values() {
            Some(values) => Ok(walk_map(pass, cx, values)?.map(|v| Value::Argument(argument.with_values(v)))),
            None => Ok(None),
        },
        Value::Definition(definition) => Ok(walk_definition(pass, cx, definition)?.map(Value::Definition)),
        _ => Ok(None),
    }
}

/// Walks every entry of `map`, copying it on the first change.
pub fn walk_map<P>(pass: &mut P, cx: &mut WalkContext<'_>, map: &Arc<ValueMap>) -> CompileResult<Option<Arc<ValueMap>>>
where
    P: RecursivePass + ?Sized,
{
    let mut out: Option<ValueMap> = None;
    for (index, item) in map.values().enumerate() {
        if pass.skip_scalars() && item.is_scalar() {
            continue;
        }
        if let Some(new) = pass.process_value(cx, item, false)? {
            out.get_or_insert_with(|| (**map).clone())[index] = new;
        }
    }
    Ok(out.map(Arc::new))
}

fn walk_definition<P>(
    pass: &mut P,
    cx: &mut WalkContext<'_>,
    definition: &Arc<Definition>,
) -> CompileResult<Option<Arc<Definition>>>
where
    P: RecursivePass + ?Sized,
{
    let mut out: Option<Definition> = None;
    if let Some(arguments) = walk_map(pass, cx, &definition.arguments)? {
        out.get_or_insert_with(|| (**definition).clone()).arguments = arguments;
    }
    if let Some(properties) = walk_map(pass, cx, &definition.properties)? {
        out.get_or_insert_with(|| (**definition).clone()).properties = properties;
    }
    for (index, call) in definition.calls.iter().enumerate() {
        if let Some(arguments) = walk_map(pass, cx, &call.arguments)? {
            out.get_or_insert_with(|| (**definition).clone()).calls[index].arguments = arguments;
        }
    }
    if definition.changes.contains(Changes::FACTORY) {
        if let Some(Callable::Method(target, method)) = &definition.factory {
            if let Some(target) = pass.process_value(cx, target, false)? {
                out.get_or_insert_with(|| (**definition).clone()).factory = Some(Callable::Method(target, method.clone()));
            }
        }
    }
    if definition.changes.contains(Changes::CONFIGURATOR) {
        if let Some(Callable::Method(target, method)) = &definition.configurator {
            if let Some(target) = pass.process_value(cx, target, false)? {
                out.get_or_insert_with(|| (**definition).clone()).configurator =
                    Some(Callable::Method(target, method.clone()));
            }
        }
    }
    Ok(out.map(Arc::new))
}

/// Runs `pass` over every definition of `container`, in registration order.
///
/// Definitions added while walking are not visited; definitions tagged
/// `container.excluded` are skipped. A root that comes back changed is
/// written back under its id.
pub fn process_definitions<P>(pass: &mut P, container: &mut ContainerBuilder) -> CompileResult<()>
where
    P: RecursivePass + ?Sized,
{
    let ids: Vec<String> = container.definitions().keys().cloned().collect();
    for id in ids {
        let Some(definition) = container.definitions().get(&id).cloned() else {
            continue;
        };
        if definition.has_tag(EXCLUDED_TAG) {
            continue;
        }
        process_root(pass, container, &id, definition)?;
    }
    Ok(())
}

/// Walks a single root definition and writes the result back.
pub(crate) fn process_root<P>(
    pass: &mut P,
    container: &mut ContainerBuilder,
    id: &str,
    definition: Arc<Definition>,
) -> CompileResult<()>
where
    P: RecursivePass + ?Sized,
{
    let root = Value::Definition(definition.clone());
    let mut cx = WalkContext::new(container, id);
    let result = pass.process_value(&mut cx, &root, true);
    let errors = cx.take_errors();
    if let Some(Value::Definition(new)) = result? {
        if !Arc::ptr_eq(&new, &definition) && container.has_definition(id) {
            container.replace_definition_arc(id, new);
        }
    }
    apply_errors(container, errors);
    Ok(())
}

fn apply_errors(container: &mut ContainerBuilder, errors: Vec<(String, String)>) {
    for (id, message) in errors {
        if let Ok(definition) = container.definition_mut(&id) {
            definition.add_error(message);
        }
    }
}

/// A resolved constructor, method or function.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Declaring class; `None` for functions
    pub class: Option<String>,
    pub method: MethodMetadata,
}

impl Signature {
    /// `Class::method`, or just `method` when `Class` is the service id.
    pub fn label(&self, current_id: &str) -> String {
        match &self.class {
            Some(class) if class != current_id => format!("{}::{}", class, self.method.name),
            _ => self.method.name.clone(),
        }
    }
}

fn invalid_service(current_id: &str, detail: impl AsRef<str>) -> CompileError {
    CompileError::runtime(format!("Invalid service \"{}\": {}", current_id, detail.as_ref()))
}

/// Class of `definition`, looked up through its parents if needed.
pub(crate) fn class_of(container: &ContainerBuilder, definition: &Definition) -> CompileResult<Option<String>> {
    let mut current = definition.clone();
    loop {
        if let Some(class) = current.class() {
            return Ok(Some(class.to_string()));
        }
        match current.parent() {
            Some(parent) => current = container.find_definition(parent)?.clone(),
            None => return Ok(None),
        }
    }
}

/// Constructor used to instantiate `definition`: its factory method or its
/// class constructor. `None` for synthetic services and, unless
/// `required`, for classes without a constructor.
pub fn constructor_of(
    container: &ContainerBuilder,
    current_id: &str,
    definition: &Definition,
    required: bool,
) -> CompileResult<Option<Signature>> {
    if definition.is_synthetic() {
        return Ok(None);
    }
    match definition.factory() {
        Some(Callable::Function(function)) => {
            let method = container.classes().function(function).ok_or_else(|| {
                invalid_service(current_id, format!("function \"{}\" does not exist.", function))
            })?;
            return Ok(Some(Signature {
                class: None,
                method: method.clone(),
            }));
        }
        Some(Callable::Method(target, method)) => {
            if method == "__construct" {
                return Err(invalid_service(current_id, "\"__construct()\" cannot be used as a factory method."));
            }
            let class = match target {
                Value::Reference(reference) => {
                    let factory = container.find_definition(reference.id())?;
                    class_of(container, factory)?
                }
                Value::Definition(inline) => inline.class().map(str::to_string),
                Value::String(class) => Some(class.clone()),
                _ => definition.class().map(str::to_string),
            };
            let mut owner = Definition::new();
            owner.set_class(class);
            return method_of(container, current_id, &owner, method).map(Some);
        }
        None => {}
    }

    let class = class_of(container, definition)?;
    let Some(class) = class else {
        return Err(invalid_service(current_id, "the class is not set."));
    };
    let Some(meta) = container.classes().get(&class) else {
        return Err(invalid_service(current_id, format!("class \"{}\" does not exist.", class)));
    };
    let quoted = if class != current_id {
        format!(" \"{}\"", class)
    } else {
        String::new()
    };
    match container.classes().constructor(&meta.name) {
        None if required => Err(invalid_service(current_id, format!("class{} has no constructor.", quoted))),
        None => Ok(None),
        Some((_, constructor)) if !constructor.public => {
            let subject = if class != current_id {
                format!("constructor of class \"{}\"", class)
            } else {
                "its constructor".to_string()
            };
            Err(invalid_service(current_id, format!("{} must be public.", subject)))
        }
        Some((owner, constructor)) => Ok(Some(Signature {
            class: Some(owner),
            method: constructor.clone(),
        })),
    }
}

/// Method `name` of the class of `definition`.
pub fn method_of(
    container: &ContainerBuilder,
    current_id: &str,
    definition: &Definition,
    name: &str,
) -> CompileResult<Signature> {
    if name.eq_ignore_ascii_case("__construct") {
        return constructor_of(container, current_id, definition, true)?
            .ok_or_else(|| invalid_service(current_id, "the class is not set."));
    }
    let Some(class) = class_of(container, definition)? else {
        return Err(invalid_service(current_id, "the class is not set."));
    };
    if !container.classes().exists(&class) {
        return Err(invalid_service(current_id, format!("class \"{}\" does not exist.", class)));
    }
    let label = if class != current_id {
        format!("{}::{}", class, name)
    } else {
        name.to_string()
    };
    let Some((owner, method)) = container.classes().method(&class, name) else {
        return Err(invalid_service(current_id, format!("method \"{}()\" does not exist.", label)));
    };
    if !method.public {
        return Err(invalid_service(current_id, format!("method \"{}()\" must be public.", label)));
    }
    Ok(Signature {
        class: Some(owner),
        method: method.clone(),
    })
}
