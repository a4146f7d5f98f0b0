use indexmap::IndexMap;

use crate::class::{CONTAINER_INTERFACE, SERVICE_PROVIDER_INTERFACE, SERVICE_SUBSCRIBER_INTERFACE};
use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::{BoundArgument, Definition, TagAttributes};
use crate::error::{CompileError, CompileResult};
use crate::internal::camel_case;
use crate::reference::{InvalidBehavior, Reference};
use crate::value::{ArgKey, Value, ValueMap};

use super::{is_class_like, register_service_locator};

const SUBSCRIBER_TAG: &str = "container.service_subscriber";
const LOCATOR_TAG: &str = "container.service_subscriber.locator";

/// Wires service subscribers to a locator of the services they declare.
///
/// The class of a service tagged `container.service_subscriber` lists the
/// services it needs. Tag attributes `key` and `id` map an entry to a
/// service id; when the subscriber is autowired, unmapped entries fall back
/// to their type. A locator holding typed references is registered and
/// bound to the container interfaces of the subscriber.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{
///     ClassMetadata, CompilerPass, ContainerBuilder, RegisterServiceSubscribersPass, TagAttributes, Value,
///     SERVICE_SUBSCRIBER_INTERFACE,
/// };
///
/// let mut container = ContainerBuilder::new();
/// container.register_class(
///     ClassMetadata::class("App\\Controller")
///         .implements(SERVICE_SUBSCRIBER_INTERFACE)
///         .subscribes(Some("logger"), "App\\Logger"),
/// );
/// let mut tag = TagAttributes::new();
/// tag.insert("key".to_string(), Value::from("logger"));
/// tag.insert("id".to_string(), Value::from("app.logger"));
/// container.register("controller", Some("App\\Controller")).add_tag_with("container.service_subscriber", tag);
///
/// RegisterServiceSubscribersPass.process(&mut container).unwrap();
/// assert!(container.definition("controller").unwrap().has_tag("container.service_subscriber.locator"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterServiceSubscribersPass;

impl RegisterServiceSubscribersPass {
    fn register(&self, container: &mut ContainerBuilder, id: &str, definition: &Definition) -> CompileResult<Definition> {
        let mut service_map: IndexMap<String, String> = IndexMap::new();
        let autowire = definition.is_autowired();

        for attributes in definition.tag(SUBSCRIBER_TAG) {
            if attributes.is_empty() {
                continue;
            }
            let unknown: Vec<&str> = attributes
                .keys()
                .map(String::as_str)
                .filter(|name| *name != "key" && *name != "id")
                .collect();
            if !unknown.is_empty() {
                return Err(CompileError::invalid(format!(
                    "The \"container.service_subscriber\" tag accepts only the \"key\" and \"id\" attributes, \"{}\" given for service \"{}\".",
                    unknown.join("\", \""),
                    id
                )));
            }
            let key = attributes.get("key").and_then(Value::to_scalar_string);
            let target = attributes.get("id").and_then(Value::to_scalar_string);
            match (key, target) {
                (Some(key), Some(target)) => {
                    service_map.insert(key, target);
                }
                (Some(key), None) => {
                    return Err(CompileError::invalid(format!(
                        "Missing \"id\" attribute on \"container.service_subscriber\" tag with key=\"{}\" for service \"{}\".",
                        key, id
                    )))
                }
                (None, Some(target)) => {
                    service_map.insert(target.clone(), target);
                }
                (None, None) => {}
            }
        }

        let class = match definition.class() {
            Some(class) => container
                .parameters_mut()
                .resolve_value(&Value::from(class))?
                .to_scalar_string()
                .unwrap_or_default(),
            None => String::new(),
        };
        let Some(metadata) = container.classes().get(&class).cloned() else {
            return Err(CompileError::invalid(format!(
                "Class \"{}\" used for service \"{}\" cannot be found.",
                class, id
            )));
        };
        if !container.classes().is_a(&metadata.name, SERVICE_SUBSCRIBER_INTERFACE) {
            return Err(CompileError::invalid(format!(
                "Service \"{}\" must implement interface \"{}\".",
                id, SERVICE_SUBSCRIBER_INTERFACE
            )));
        }

        let mut subscriber_map = ValueMap::new();
        for subscribed in &metadata.subscribed_services {
            let raw_key = subscribed.key.clone().unwrap_or_else(|| subscribed.type_hint.clone());
            if !is_valid_type(&subscribed.type_hint) {
                return Err(CompileError::invalid(format!(
                    "\"{}::getSubscribedServices()\" must return valid types for service \"{}\" key \"{}\", \"{}\" returned.",
                    class, id, raw_key, subscribed.type_hint
                )));
            }
            let (ty, behavior) = match subscribed.type_hint.strip_prefix('?') {
                Some(ty) => (ty.to_string(), InvalidBehavior::Ignore),
                None => (subscribed.type_hint.clone(), InvalidBehavior::Exception),
            };
            let key = subscribed.key.clone().unwrap_or_else(|| ty.clone());

            let target = match service_map.shift_remove(&key) {
                Some(target) => target,
                None if autowire => ty.clone(),
                None => {
                    return Err(CompileError::invalid(format!(
                        "Service \"{}\" misses a \"container.service_subscriber\" tag with \"key\"/\"id\" attributes corresponding to entry \"{}\" as returned by \"{}::getSubscribedServices()\".",
                        id, key, class
                    )))
                }
            };

            let mut name = subscribed.key.clone();
            if let Some(current) = &name {
                if let Some(position) = current.find("::get") {
                    name = Some(lcfirst(&current[position + 5..]));
                } else if current.contains("::") {
                    name = None;
                }
            }
            if let Some(current) = name.clone() {
                if !container.has(&current) && !container.has(&format!("{} ${}", ty, current)) {
                    let camel = camel_case(&current);
                    if container.has(&format!("{} ${}", ty, camel)) {
                        name = Some(camel);
                    }
                }
            }

            let reference = Reference::typed(target, ty, behavior, name.as_deref());
            subscriber_map.insert(ArgKey::Named(key), Value::from(reference));
        }

        if !service_map.is_empty() {
            let keys: Vec<&str> = service_map.keys().map(String::as_str).collect();
            let subject = if keys.len() > 1 {
                format!("keys \"{}\" do", keys.join("\", \""))
            } else {
                format!("key \"{}\" does", keys[0])
            };
            return Err(CompileError::invalid(format!(
                "Service {} not exist in the map returned by \"{}::getSubscribedServices()\" for service \"{}\".",
                subject, class, id
            )));
        }

        let locator = register_service_locator(container, subscriber_map, Some(id));
        let mut resolved = definition.clone();
        let mut attributes = TagAttributes::new();
        attributes.insert("id".to_string(), Value::from(locator.id()));
        resolved.add_tag_with(LOCATOR_TAG, attributes);

        let mut bindings = IndexMap::new();
        bindings.insert(CONTAINER_INTERFACE.to_string(), BoundArgument::used(locator.clone()));
        bindings.insert(SERVICE_PROVIDER_INTERFACE.to_string(), BoundArgument::used(locator));
        for (key, binding) in definition.bindings() {
            bindings.entry(key.clone()).or_insert_with(|| binding.clone());
        }
        resolved.bindings = bindings;
        Ok(resolved)
    }
}

/// `Type`, `?Type`, `A|B` or `A&B`, made of identifiers.
fn is_valid_type(ty: &str) -> bool {
    let ty = ty.strip_prefix('?').unwrap_or(ty);
    if ty.contains('|') && ty.contains('&') {
        return false;
    }
    ty.split(['|', '&']).all(|part| {
        is_class_like(part)
            || (!part.is_empty()
                && part.starts_with(|c: char| c.is_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_alphanumeric() || c == '_'))
    })
}

fn lcfirst(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl RecursivePass for RegisterServiceSubscribersPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };
        if !is_root || definition.is_abstract() || !definition.has_tag(SUBSCRIBER_TAG) {
            return walk_children(self, cx, value);
        }
        let id = cx.current_id.clone();
        let resolved = Value::definition(self.register(cx.container, &id, definition)?);
        Ok(Some(walk_children(self, cx, &resolved)?.unwrap_or(resolved)))
    }
}

impl CompilerPass for RegisterServiceSubscribersPass {
    fn name(&self) -> &'static str {
        "RegisterServiceSubscribersPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

/// Points references to the container interfaces inside a subscriber at
/// the subscriber's own locator.
#[derive(Debug, Default, Clone)]
pub struct ResolveServiceSubscribersPass {
    locator: Option<String>,
}

impl RecursivePass for ResolveServiceSubscribersPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        if let Value::Reference(reference) = value {
            if let Some(locator) = &self.locator {
                if reference.id() == CONTAINER_INTERFACE || reference.id() == SERVICE_PROVIDER_INTERFACE {
                    return Ok(Some(Value::from(Reference::new(locator.clone()))));
                }
            }
            return Ok(None);
        }
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };

        let outer = self.locator.take();
        let result = match definition.tag(LOCATOR_TAG).first() {
            Some(attributes) => {
                self.locator = attributes.get("id").and_then(Value::to_scalar_string);
                let mut cleared = (**definition).clone();
                cleared.clear_tag(LOCATOR_TAG);
                let cleared = Value::definition(cleared);
                walk_children(self, cx, &cleared).map(|walked| Some(walked.unwrap_or(cleared)))
            }
            None => walk_children(self, cx, value),
        };
        self.locator = outer;
        result
    }
}

impl CompilerPass for ResolveServiceSubscribersPass {
    fn name(&self) -> &'static str {
        "ResolveServiceSubscribersPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let result = process_definitions(self, container);
        self.locator = None;
        result
    }
}
