use std::sync::Arc;

use crate::argument::{Argument, TaggedIteratorArgument};
use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::error::{CompileError, CompileResult};
use crate::reference::{InvalidBehavior, Reference};
use crate::value::{push_positional, ArgKey, Value, ValueMap};

const DEFAULT_PRIORITY_METHOD: &str = "getDefaultPriority";
const DEFAULT_INDEX_METHOD: &str = "getDefaultName";

struct Tagged {
    priority: i64,
    index: Option<String>,
    id: String,
    class: Option<String>,
}

/// Every service tagged `tagged.tag`, sorted by descending priority.
///
/// Services with equal priorities keep their registration order. The
/// priority comes from the tag's `priority` attribute, else from the
/// static default-priority method of the service class, else 0. When the
/// argument is indexed, keys come from the index attribute, the default
/// index method, the id of the decorated service, or the service id, and
/// the values are typed references named after their key.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{find_and_sort_tagged_services, ContainerBuilder, TagAttributes, TaggedIteratorArgument, Value};
///
/// let mut container = ContainerBuilder::new();
/// for (id, priority) in [("a", 0), ("b", 5), ("c", 5), ("d", -1)] {
///     let mut attributes = TagAttributes::new();
///     attributes.insert("priority".to_string(), Value::from(priority));
///     container.register(id, None).add_tag_with("app.handler", attributes);
/// }
///
/// let sorted = find_and_sort_tagged_services(&TaggedIteratorArgument::new("app.handler"), &mut container, &[]).unwrap();
/// let ids: Vec<&str> = sorted.values().filter_map(|v| v.as_reference()).map(|r| r.id()).collect();
/// assert_eq!(ids, ["b", "c", "a", "d"]);
/// ```
pub fn find_and_sort_tagged_services(
    tagged: &TaggedIteratorArgument,
    container: &mut ContainerBuilder,
    exclude: &[String],
) -> CompileResult<ValueMap> {
    let tag = tagged.tag.as_str();
    let priority_method = tagged.default_priority_method.as_deref().unwrap_or(DEFAULT_PRIORITY_METHOD);
    let index_method = tagged.default_index_method.as_deref().unwrap_or(DEFAULT_INDEX_METHOD);
    let indexed = tagged.index_attribute.is_some() || tagged.default_index_method.is_some() || tagged.needs_indexes;

    let mut services: Vec<Tagged> = Vec::new();
    for (id, occurrences) in container.find_tagged_service_ids(tag, true)? {
        if exclude.contains(&id) || tagged.exclude.contains(&id) {
            continue;
        }
        let definition = container.definition(&id)?.clone();
        let class = match definition.class() {
            Some(class) => container
                .parameters_mut()
                .resolve_value(&Value::from(class))?
                .to_scalar_string()
                .filter(|class| !class.is_empty()),
            None => None,
        };

        let mut default_priority: Option<i64> = None;
        let mut default_index: Option<String> = None;
        for attributes in occurrences {
            let priority = match attributes.get("priority") {
                Some(priority) => to_priority(priority),
                None => {
                    if default_priority.is_none() {
                        if let Some(class) = &class {
                            default_priority = default_from_method(container, &id, class, priority_method, tag, "priority")?
                                .map(|v| to_priority(&v));
                        }
                    }
                    default_priority.unwrap_or(0)
                }
            };
            if !indexed {
                services.push(Tagged {
                    priority,
                    index: None,
                    id: id.clone(),
                    class: None,
                });
                break;
            }

            let explicit = tagged
                .index_attribute
                .as_deref()
                .and_then(|attribute| attributes.get(attribute))
                .and_then(Value::to_scalar_string);
            let index = match explicit {
                Some(index) => index,
                None => {
                    if default_index.is_none() {
                        if let Some(class) = &class {
                            let attribute = tagged.index_attribute.as_deref().unwrap_or("index");
                            default_index = default_from_method(container, &id, class, index_method, tag, attribute)?
                                .and_then(|v| v.to_scalar_string());
                        }
                    }
                    let decorated = definition
                        .tag("container.decorator")
                        .first()
                        .and_then(|attributes| attributes.get("id"))
                        .and_then(Value::to_scalar_string);
                    default_index.clone().or(decorated).unwrap_or_else(|| id.clone())
                }
            };
            services.push(Tagged {
                priority,
                index: Some(index),
                id: id.clone(),
                class: class.clone(),
            });
        }
    }

    services.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut references = ValueMap::with_capacity(services.len());
    for service in services {
        match service.index {
            None => push_positional(&mut references, Value::from(Reference::new(service.id))),
            Some(index) => {
                let reference = match service.class {
                    Some(class) => Reference::typed(service.id, class, InvalidBehavior::Exception, Some(&index)),
                    None => Reference::new(service.id),
                };
                references.insert(ArgKey::parse(&index), Value::from(reference));
            }
        }
    }
    Ok(references)
}

fn to_priority(value: &Value) -> i64 {
    match value {
        Value::Int(priority) => *priority,
        Value::Float(priority) => *priority as i64,
        Value::Bool(priority) => i64::from(*priority),
        Value::String(priority) => priority.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Value returned by the static `method` of `class`, if it has one.
fn default_from_method(
    container: &ContainerBuilder,
    id: &str,
    class: &str,
    method: &str,
    tag: &str,
    attribute: &str,
) -> CompileResult<Option<Value>> {
    let Some((owner, metadata)) = container.classes().method(class, method) else {
        return Ok(None);
    };
    if !metadata.is_static {
        return Err(CompileError::invalid(format!(
            "Either method \"{}::{}()\" should be static or tag \"{}\" on service \"{}\" is missing attribute \"{}\".",
            owner, method, tag, id, attribute
        )));
    }
    if !metadata.public {
        return Err(CompileError::invalid(format!(
            "Either method \"{}::{}()\" should be public or tag \"{}\" on service \"{}\" is missing attribute \"{}\".",
            owner, method, tag, id, attribute
        )));
    }
    let value = metadata.static_value.clone().unwrap_or_default();
    let valid = if attribute == "priority" {
        matches!(value, Value::Int(_))
    } else {
        matches!(value, Value::String(_) | Value::Int(_))
    };
    if !valid {
        let expected = if attribute == "priority" { "an integer" } else { "a string" };
        return Err(CompileError::invalid(format!(
            "Method \"{}::{}()\" should return {} (\"{}\" returned), or tag \"{}\" on service \"{}\" is missing attribute \"{}\".",
            owner,
            method,
            expected,
            value.type_name(),
            tag,
            id,
            attribute
        )));
    }
    Ok(Some(value))
}

/// Fills tagged iterator arguments with the services carrying their tag.
///
/// A service never receives itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveTaggedIteratorArgumentPass;

impl RecursivePass for ResolveTaggedIteratorArgumentPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Argument(Argument::TaggedIterator(tagged)) = value else {
            return walk_children(self, cx, value);
        };
        let exclude = [cx.current_id.clone()];
        let values = find_and_sort_tagged_services(tagged, cx.container, &exclude)?;
        if *tagged.values == values {
            return Ok(None);
        }
        Ok(Some(Value::Argument(Argument::TaggedIterator(TaggedIteratorArgument {
            values: Arc::new(values),
            ..tagged.clone()
        }))))
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for ResolveTaggedIteratorArgumentPass {
    fn name(&self) -> &'static str {
        "ResolveTaggedIteratorArgumentPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}
