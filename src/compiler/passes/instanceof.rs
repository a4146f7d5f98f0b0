use std::sync::Arc;

use indexmap::IndexMap;

use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::definition::{BoundArgument, Changes, Definition, MethodCall, TagAttributes};
use crate::error::{CompileError, CompileResult};
use crate::value::Value;

/// Applies `instanceof` conditionals, both explicit and autoconfigured.
///
/// Every matching conditional becomes an abstract parent inserted between
/// the definition and its original parent, so the child-definition pass
/// merges them like any other parent. Tags and method calls of the
/// conditionals accumulate on the definition itself; decorators only
/// receive tags listed in `tags_to_keep` (or the ones of a conditional on
/// their exact class).
#[derive(Debug, Default, Clone)]
pub struct ResolveInstanceofConditionalsPass {
    tags_to_keep: Vec<String>,
}

impl ResolveInstanceofConditionalsPass {
    pub fn new(tags_to_keep: Vec<String>) -> Self {
        Self { tags_to_keep }
    }

    fn process_definition(
        &self,
        container: &mut ContainerBuilder,
        id: &str,
        definition: &Definition,
    ) -> CompileResult<Option<Definition>> {
        let autoconfigured = if definition.is_autoconfigured() {
            container.autoconfigured_instanceof().clone()
        } else {
            IndexMap::new()
        };
        if definition.instanceof_conditionals().is_empty() && autoconfigured.is_empty() {
            return Ok(None);
        }
        let Some(class) = definition.class() else {
            return Ok(None);
        };
        let class = match container.parameters_mut().resolve_value(&Value::from(class))? {
            Value::String(class) if !class.is_empty() => class,
            _ => return Ok(None),
        };

        let mut conditionals: IndexMap<String, Vec<Definition>> =
            autoconfigured.into_iter().map(|(ty, template)| (ty, vec![template])).collect();
        for (ty, template) in definition.instanceof_conditionals() {
            if !container.classes().exists(ty) {
                return Err(CompileError::runtime(format!(
                    "\"{}\" is set as an \"instanceof\" conditional, but it does not exist.",
                    ty
                )));
            }
            conditionals.entry(ty.clone()).or_default().push(template.clone());
        }

        let mut resolved = definition.clone();
        resolved.instanceof.clear();

        let mut shared = None;
        let mut instanceof_tags: Vec<(String, IndexMap<String, Vec<TagAttributes>>)> = Vec::new();
        let mut instanceof_calls: Vec<MethodCall> = Vec::new();
        let mut instanceof_bindings: IndexMap<String, BoundArgument> = IndexMap::new();
        let root = format!(".abstract.instanceof.{}", id);
        let mut parent: Option<String> = definition.parent().map(str::to_string);
        let mut matched = false;

        for (ty, templates) in conditionals {
            if ty != class && !container.classes().is_subclass_of(&class, &ty) {
                continue;
            }
            for (key, mut template) in templates.into_iter().enumerate() {
                matched = true;
                template.set_abstract(true);
                template.parent = Some(parent.clone().unwrap_or_else(|| root.clone()));

                instanceof_tags.push((ty.clone(), std::mem::take(&mut template.tags)));
                let mut bindings = std::mem::take(&mut template.bindings);
                for (key, binding) in instanceof_bindings {
                    bindings.entry(key).or_insert(binding);
                }
                instanceof_bindings = bindings;
                instanceof_calls.append(&mut template.calls);
                if template.changes.contains(Changes::SHARED) {
                    shared = Some(template.shared);
                }

                let template_id = format!(".instanceof.{}.{}.{}", ty, key, id);
                container.replace_definition_arc(&template_id, Arc::new(template));
                parent = Some(template_id);
            }
        }

        if !matched {
            return Ok((!definition.instanceof_conditionals().is_empty()).then_some(resolved));
        }

        if !definition.is_child() {
            let mut base = resolved.clone();
            base.bindings.clear();
            base.set_arguments(Default::default());
            base.calls.clear();
            base.set_decoration(None);
            base.tags.clear();
            base.set_abstract(true);
            container.replace_definition_arc(&root, Arc::new(base));
        }

        resolved.parent = parent;
        if let Some(shared) = shared {
            if !resolved.changes.contains(Changes::SHARED) {
                resolved.set_shared(shared);
            }
        }

        for (ty, tags) in instanceof_tags.iter().rev() {
            let keeps_all = resolved.decorated_service().is_none() || resolved.class() == Some(ty.as_str());
            for (name, occurrences) in tags {
                if !keeps_all && !self.tags_to_keep.contains(name) {
                    continue;
                }
                for attributes in occurrences {
                    if resolved.tag(name).contains(attributes) {
                        continue;
                    }
                    resolved.add_tag_with(name.clone(), attributes.clone());
                }
            }
        }

        instanceof_calls.append(&mut resolved.calls);
        resolved.calls = instanceof_calls;
        for (key, binding) in instanceof_bindings {
            resolved.bindings.entry(key).or_insert(binding);
        }

        Ok(Some(resolved))
    }
}

impl CompilerPass for ResolveInstanceofConditionalsPass {
    fn name(&self) -> &'static str {
        "ResolveInstanceofConditionalsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        for (ty, template) in container.autoconfigured_instanceof() {
            if !template.arguments().is_empty() {
                return Err(CompileError::invalid(format!(
                    "Autoconfigured instanceof for type \"{}\" defines arguments but these are not supported and should be removed.",
                    ty
                )));
            }
        }

        let ids: Vec<String> = container.definitions().keys().cloned().collect();
        for id in ids {
            let Some(definition) = container.definitions().get(&id).cloned() else {
                continue;
            };
            if let Some(resolved) = self.process_definition(container, &id, &definition)? {
                container.replace_definition_arc(&id, Arc::new(resolved));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassMetadata;
    use crate::compiler::passes::ResolveChildDefinitionsPass;
    use crate::definition::MethodCall;

    fn container() -> ContainerBuilder {
        let mut container = ContainerBuilder::new();
        container.register_class(ClassMetadata::interface("App\\Handler"));
        container.register_class(ClassMetadata::class("App\\MailHandler").implements("App\\Handler"));
        container
    }

    #[test]
    fn conditionals_become_parents() {
        let mut container = container();
        let definition = container.register("handler", Some("App\\MailHandler"));
        definition
            .instanceof_mut("App\\Handler")
            .add_tag("app.handler")
            .set_lazy(true)
            .add_method_call(MethodCall::new("setLogger", []))
            .unwrap();

        ResolveInstanceofConditionalsPass::default().process(&mut container).unwrap();

        let handler = container.definition("handler").unwrap();
        assert_eq!(handler.parent(), Some(".instanceof.App\\Handler.0.handler"));
        assert!(handler.has_tag("app.handler"));
        assert!(handler.has_method_call("setLogger"));
        assert!(handler.instanceof_conditionals().is_empty());
        assert!(container.definition(".abstract.instanceof.handler").unwrap().is_abstract());

        ResolveChildDefinitionsPass::new().process(&mut container).unwrap();
        let handler = container.definition("handler").unwrap();
        assert!(handler.is_lazy());
        assert_eq!(handler.class(), Some("App\\MailHandler"));
        assert_eq!(handler.method_calls().len(), 1);
    }

    #[test]
    fn autoconfiguration_needs_the_flag() {
        let mut container = container();
        container.register_for_autoconfiguration("App\\Handler").add_tag("app.handler");
        container.register("plain", Some("App\\MailHandler"));
        container.register("auto", Some("App\\MailHandler")).set_autoconfigured(true);

        ResolveInstanceofConditionalsPass::default().process(&mut container).unwrap();

        assert!(!container.definition("plain").unwrap().has_tag("app.handler"));
        assert!(container.definition("auto").unwrap().has_tag("app.handler"));
    }

    #[test]
    fn unknown_conditional_types_are_rejected() {
        let mut container = container();
        container.register("handler", Some("App\\MailHandler")).instanceof_mut("App\\Missing");
        let err = ResolveInstanceofConditionalsPass::default().process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"App\\Missing\" is set as an \"instanceof\" conditional, but it does not exist."
        );
    }

    #[test]
    fn autoconfigured_arguments_are_rejected() {
        let mut container = container();
        container.register_for_autoconfiguration("App\\Handler").add_argument("x");
        let err = ResolveInstanceofConditionalsPass::default().process(&mut container).unwrap_err();
        assert!(err.to_string().starts_with("Autoconfigured instanceof for type \"App\\Handler\" defines arguments"));
    }
}
