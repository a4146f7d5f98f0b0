use indexmap::IndexMap;

use crate::compiler::{process_root, walk_children, CompilerConfig, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::{Alias, TagAttributes};
use crate::error::{CompileError, CompileResult};
use crate::reference::{InvalidBehavior, Reference};
use crate::value::Value;

/// Tag recording which service a decorator decorates.
pub const DECORATOR_TAG: &str = "container.decorator";

/// Pseudo id decorators use to refer to the service they decorate.
pub const INNER_ID: &str = ".inner";

/// Replaces decorated services by their decorators.
///
/// Decorators are applied by descending priority, in registration order
/// for equal priorities. The decorated service is moved to
/// `<decorator>.inner` (or the id the decorator asked for), its id becomes
/// an alias to the decorator and `.inner` references inside the decorator
/// point at the moved service. Tags follow the outermost decorator, except
/// the tags describing the behavior of the decorated service itself.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, DecoratorServicePass, InvalidBehavior, Reference};
///
/// let mut container = ContainerBuilder::new();
/// container.register("mailer", Some("App\\Mailer")).set_public(true).add_tag("app.mailer");
/// container
///     .register("mailer.logging", Some("App\\LoggingMailer"))
///     .add_argument(Reference::new(".inner"))
///     .set_decorated_service(Some("mailer"), None, 0, InvalidBehavior::Exception)
///     .unwrap();
///
/// DecoratorServicePass::default().process(&mut container).unwrap();
///
/// assert_eq!(container.alias("mailer").unwrap().id(), "mailer.logging");
/// assert!(container.alias("mailer").unwrap().is_public());
/// let decorator = container.definition("mailer.logging").unwrap();
/// assert_eq!(decorator.arguments()[0].as_reference().unwrap().id(), "mailer.logging.inner");
/// assert!(decorator.has_tag("app.mailer"));
/// assert!(!container.definition("mailer.logging.inner").unwrap().has_tag("app.mailer"));
/// ```
#[derive(Debug, Clone)]
pub struct DecoratorServicePass {
    tags_to_keep: Vec<String>,
    renamed_id: String,
}

impl Default for DecoratorServicePass {
    fn default() -> Self {
        Self::new(CompilerConfig::default().behavior_describing_tags)
    }
}

impl DecoratorServicePass {
    /// `tags_to_keep` stay on the decorated service.
    pub fn new(tags_to_keep: Vec<String>) -> Self {
        Self {
            tags_to_keep,
            renamed_id: String::new(),
        }
    }
}

impl RecursivePass for DecoratorServicePass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        match value {
            Value::Reference(reference) if reference.id() == INNER_ID => Ok(Some(Value::from(
                Reference::with_behavior(self.renamed_id.clone(), reference.invalid_behavior()),
            ))),
            _ => walk_children(self, cx, value),
        }
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for DecoratorServicePass {
    fn name(&self) -> &'static str {
        "DecoratorServicePass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let mut queue: Vec<(i32, usize, String)> = container
            .definitions()
            .iter()
            .filter_map(|(id, definition)| definition.decorated_service().map(|d| (d.priority, id.clone())))
            .enumerate()
            .map(|(order, (priority, id))| (priority, order, id))
            .collect();
        queue.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        // inner id -> id of the definition currently carrying its tags
        let mut decorating: IndexMap<String, String> = IndexMap::new();
        let mut decorated_ids: IndexMap<String, String> = IndexMap::new();

        for (_, _, id) in queue {
            let Some(decoration) = container.definition(&id)?.decorated_service().cloned() else {
                continue;
            };
            let inner = decoration.inner.clone();
            let renamed = decoration.renamed.clone().unwrap_or_else(|| format!("{}.inner", id));
            decorated_ids.entry(inner.clone()).or_insert_with(|| renamed.clone());

            self.renamed_id = renamed.clone();
            let arc = container.definition_arc(&id)?.clone();
            process_root(self, container, &id, arc)?;
            {
                let definition = container.definition_mut(&id)?;
                definition.set_decoration(None);
                definition.inner_service_id = Some(renamed.clone());
                definition.decoration_on_invalid = Some(decoration.invalid_behavior);
            }

            let (public, synthetic) = if let Some(alias) = container.aliases().get(&inner).cloned() {
                container.set_alias(&renamed, Alias::new(alias.id()))?;
                let synthetic = container.find_definition(alias.id()).map_or(false, |d| d.is_synthetic());
                (alias.is_public(), synthetic)
            } else if container.has_definition(&inner) {
                let mut moved = container.definition(&inner)?.clone();
                let public = moved.is_public();
                let synthetic = moved.is_synthetic();
                moved.set_public(false);
                container.set_definition(&renamed, moved)?;
                decorating.insert(inner.clone(), renamed.clone());
                (public, synthetic)
            } else {
                match decoration.invalid_behavior {
                    InvalidBehavior::Ignore => {
                        container.remove_definition(&id);
                        container.log(self.name(), format!("Removed decorator \"{}\"; reason: \"{}\" does not exist.", id, inner));
                        continue;
                    }
                    InvalidBehavior::Null => (container.definition(&id)?.is_public(), false),
                    _ => {
                        return Err(CompileError::ServiceNotFound {
                            alternatives: container.service_alternatives(&inner, Some(&id)),
                            id: inner,
                            source_id: Some(id),
                        })
                    }
                }
            };

            if synthetic {
                return Err(CompileError::invalid(format!(
                    "A synthetic service cannot be decorated: service \"{}\" cannot decorate \"{}\".",
                    id, inner
                )));
            }

            if let Some(carrier) = decorating.get(&inner).cloned() {
                let carrier_tags = container.definition(&carrier)?.tags().clone();
                let mut moved: IndexMap<String, Vec<TagAttributes>> = IndexMap::new();
                let mut kept: IndexMap<String, Vec<TagAttributes>> = IndexMap::new();
                for (tag, occurrences) in carrier_tags {
                    if self.tags_to_keep.contains(&tag) {
                        kept.insert(tag, occurrences);
                    } else {
                        moved.insert(tag, occurrences);
                    }
                }
                let decorator = container.definition_mut(&id)?;
                for (tag, occurrences) in decorator.tags().clone() {
                    moved.insert(tag, occurrences);
                }
                decorator.set_tags(moved);
                container.definition_mut(&carrier)?.set_tags(kept);
                decorating.insert(inner.clone(), id.clone());
            }

            container.set_alias(&inner, id.as_str())?.set_public(public);
        }

        for (inner, carrier) in decorating {
            let mut attributes = TagAttributes::new();
            attributes.insert("id".to_string(), Value::from(inner.as_str()));
            if let Some(renamed) = decorated_ids.get(&inner) {
                attributes.insert("inner".to_string(), Value::from(renamed.as_str()));
            }
            if let Ok(definition) = container.definition_mut(&carrier) {
                definition.add_tag_with(DECORATOR_TAG, attributes);
            }
        }
        self.renamed_id.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decorate(container: &mut ContainerBuilder, id: &str, inner: &str, priority: i32, behavior: InvalidBehavior) {
        container
            .register(id, Some("App\\Decorator"))
            .add_argument(Reference::new(INNER_ID))
            .set_decorated_service(Some(inner), None, priority, behavior)
            .unwrap();
    }

    #[test]
    fn priorities_nest_decorators_with_fifo_ties() {
        let mut container = ContainerBuilder::new();
        container.register("mailer", Some("App\\Mailer"));
        decorate(&mut container, "low", "mailer", -5, InvalidBehavior::Exception);
        decorate(&mut container, "first", "mailer", 0, InvalidBehavior::Exception);
        decorate(&mut container, "second", "mailer", 0, InvalidBehavior::Exception);

        DecoratorServicePass::default().process(&mut container).unwrap();

        assert_eq!(container.alias("mailer").unwrap().id(), "low");
        assert_eq!(container.resolve_alias_chain("low.inner").unwrap(), "second");
        assert_eq!(container.resolve_alias_chain("second.inner").unwrap(), "first");
        assert_eq!(container.definition("first.inner").unwrap().class(), Some("App\\Mailer"));

        let low = container.definition("low").unwrap();
        assert_eq!(low.inner_service_id(), Some("low.inner"));
        let tag = &low.tag(DECORATOR_TAG)[0];
        assert_eq!(tag["id"], Value::from("mailer"));
        assert_eq!(tag["inner"], Value::from("first.inner"));
        assert!(!container.definition("first").unwrap().has_tag(DECORATOR_TAG));
    }

    #[test]
    fn behavior_describing_tags_stay_on_the_decorated_service() {
        let mut container = ContainerBuilder::new();
        container
            .register("locator", Some("App\\Locator"))
            .add_tag("container.service_locator")
            .add_tag("app.custom");
        decorate(&mut container, "traced", "locator", 0, InvalidBehavior::Exception);

        DecoratorServicePass::default().process(&mut container).unwrap();

        let moved = container.definition("traced.inner").unwrap();
        assert!(moved.has_tag("container.service_locator"));
        assert!(!moved.has_tag("app.custom"));
        assert!(container.definition("traced").unwrap().has_tag("app.custom"));
    }

    #[test]
    fn missing_inner_services_follow_the_invalid_behavior() {
        let mut container = ContainerBuilder::new();
        decorate(&mut container, "ignored", "nope", 0, InvalidBehavior::Ignore);
        decorate(&mut container, "nulled", "nope", 0, InvalidBehavior::Null);

        DecoratorServicePass::default().process(&mut container).unwrap();

        assert!(!container.has_definition("ignored"));
        assert_eq!(container.alias("nope").unwrap().id(), "nulled");
        assert_eq!(container.definition("nulled").unwrap().decoration_on_invalid(), Some(InvalidBehavior::Null));

        let mut container = ContainerBuilder::new();
        decorate(&mut container, "strict", "nope", 0, InvalidBehavior::Exception);
        let err = DecoratorServicePass::default().process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The service \"strict\" has a dependency on a non-existent service \"nope\"."
        );
    }

    #[test]
    fn synthetic_services_cannot_be_decorated() {
        let mut container = ContainerBuilder::new();
        container.register("request", None).set_synthetic(true);
        decorate(&mut container, "wrapper", "request", 0, InvalidBehavior::Exception);
        let err = DecoratorServicePass::default().process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A synthetic service cannot be decorated: service \"wrapper\" cannot decorate \"request\"."
        );
    }
}
