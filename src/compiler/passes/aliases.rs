use indexmap::IndexMap;

use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::{ContainerBuilder, SERVICE_CONTAINER_ID};
use crate::definition::TagAttributes;
use crate::error::{CompileError, CompileResult};
use crate::value::Value;

/// Rewrites references to aliases so they point at the definition the
/// alias chain ends on.
///
/// Aliases pointing at other aliases are flattened the same way. Using a
/// deprecated alias from a service that is not deprecated itself is
/// logged.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, Reference, ResolveReferencesToAliasesPass};
///
/// let mut container = ContainerBuilder::new();
/// container.register("mailer.smtp", Some("App\\SmtpMailer"));
/// container.set_alias("mailer.default", "mailer.smtp").unwrap();
/// container.set_alias("mailer", "mailer.default").unwrap();
/// container.register("newsletter", Some("App\\Newsletter")).add_argument(Reference::new("mailer"));
///
/// ResolveReferencesToAliasesPass.process(&mut container).unwrap();
///
/// let newsletter = container.definition("newsletter").unwrap();
/// assert_eq!(newsletter.arguments()[0].as_reference().unwrap().id(), "mailer.smtp");
/// assert_eq!(container.alias("mailer").unwrap().id(), "mailer.smtp");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveReferencesToAliasesPass;

impl ResolveReferencesToAliasesPass {
    fn definition_id(&self, container: &mut ContainerBuilder, current_id: &str, id: &str) -> CompileResult<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut id = id.to_string();
        while let Some(alias) = container.aliases().get(&id).cloned() {
            if let Some(deprecation) = alias.deprecation(&id) {
                let referrer_deprecated = match container.definitions().get(current_id) {
                    Some(definition) => definition.is_deprecated(),
                    None => container.aliases().get(current_id).map_or(false, |a| a.is_deprecated()),
                };
                if !referrer_deprecated {
                    container.log(
                        self.name(),
                        format!(
                            "Since {} {}: {} It is being referenced by the \"{}\" service.",
                            deprecation.package, deprecation.version, deprecation.message, current_id
                        ),
                    );
                }
            }
            if seen.contains(&id) {
                seen.push(id.clone());
                return Err(CompileError::circular(id, seen));
            }
            seen.push(id);
            id = alias.id().to_string();
        }
        Ok(id)
    }
}

impl RecursivePass for ResolveReferencesToAliasesPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Reference(reference) = value else {
            return walk_children(self, cx, value);
        };
        let target = self.definition_id(cx.container, &cx.current_id, reference.id())?;
        if target == reference.id() {
            return Ok(None);
        }
        Ok(Some(Value::Reference(reference.retarget(target))))
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for ResolveReferencesToAliasesPass {
    fn name(&self) -> &'static str {
        "ResolveReferencesToAliasesPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)?;

        let aliases: Vec<(String, String, bool)> = container
            .aliases()
            .iter()
            .map(|(id, alias)| (id.clone(), alias.id().to_string(), alias.is_public()))
            .collect();
        for (id, target, public) in aliases {
            let resolved = self.definition_id(container, &id, &target)?;
            if resolved != target {
                if let Some(alias) = container.alias_mut(&id) {
                    let deprecation = alias.deprecation_template().cloned();
                    *alias = resolved.into();
                    alias.set_public(public);
                    alias.set_deprecation(deprecation);
                }
            }
        }
        Ok(())
    }
}

/// Drops private aliases.
///
/// Runs once references have been rewritten to the definitions the aliases
/// pointed at, so nothing can reach a private alias anymore.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemovePrivateAliasesPass;

impl CompilerPass for RemovePrivateAliasesPass {
    fn name(&self) -> &'static str {
        "RemovePrivateAliasesPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let private: Vec<String> = container
            .aliases()
            .iter()
            .filter(|(_, alias)| alias.is_private())
            .map(|(id, _)| id.clone())
            .collect();
        for id in private {
            container.remove_alias(&id);
            container.log(self.name(), format!("Removed service \"{}\"; reason: private alias.", id));
        }
        Ok(())
    }
}

/// Moves private definitions under the id of the alias pointing at them.
///
/// The first alias found for a private definition takes its place, other
/// aliases to it are redirected to that id and references are renamed.
/// A public deprecated alias leaves a `container.private` tag carrying its
/// deprecation on the moved definition.
#[derive(Debug, Default, Clone)]
pub struct ReplaceAliasByActualDefinitionPass {
    replacements: IndexMap<String, String>,
}

impl RecursivePass for ReplaceAliasByActualDefinitionPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        if let Value::Reference(reference) = value {
            return Ok(self
                .replacements
                .get(reference.id())
                .map(|replacement| Value::Reference(reference.retarget(replacement.clone()))));
        }
        walk_children(self, cx, value)
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for ReplaceAliasByActualDefinitionPass {
    fn name(&self) -> &'static str {
        "ReplaceAliasByActualDefinitionPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let mut seen_targets: Vec<String> = Vec::new();
        let aliases: Vec<(String, crate::definition::Alias)> =
            container.aliases().iter().map(|(id, alias)| (id.clone(), alias.clone())).collect();

        for (alias_id, target) in aliases {
            let target_id = target.id().to_string();
            if target_id == SERVICE_CONTAINER_ID {
                continue;
            }
            if let Some(replacement) = self.replacements.get(&target_id).cloned() {
                let alias = container.set_alias(&alias_id, replacement.as_str())?;
                alias.set_public(target.is_public());
                alias.set_deprecation(target.deprecation_template().cloned());
            }
            if seen_targets.contains(&target_id) {
                continue;
            }
            seen_targets.push(target_id.clone());

            let definition = container.definition(&target_id)?;
            if definition.is_public() {
                continue;
            }
            let mut definition = definition.clone();
            definition.set_public(target.is_public());
            if target.is_public() {
                if let Some(deprecation) = target.deprecation(&alias_id) {
                    let mut attributes = TagAttributes::new();
                    attributes.insert("package".to_string(), Value::from(deprecation.package));
                    attributes.insert("version".to_string(), Value::from(deprecation.version));
                    definition.add_tag_with("container.private", attributes);
                }
            }
            container.set_definition(&alias_id, definition)?;
            container.remove_definition(&target_id);
            self.replacements.insert(target_id, alias_id);
        }

        let result = process_definitions(self, container);
        self.replacements.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    #[test]
    fn alias_cycles_are_reported() {
        let mut container = ContainerBuilder::new();
        container.set_alias("a", "b").unwrap();
        container.set_alias("b", "a").unwrap();
        container.register("user", None).add_argument(Reference::new("a"));
        let err = ResolveReferencesToAliasesPass.process(&mut container).unwrap_err();
        assert_eq!(err.to_string(), "Circular reference detected for service \"a\", path: \"a -> b -> a\".");
    }

    #[test]
    fn deprecated_aliases_are_logged() {
        let mut container = ContainerBuilder::new();
        container.register("mailer.smtp", None);
        container.set_alias("mailer", "mailer.smtp").unwrap().set_deprecated("acme/mailer", "1.2", "").unwrap();
        container.register("newsletter", None).add_argument(Reference::new("mailer"));
        container
            .register("legacy", None)
            .add_argument(Reference::new("mailer"))
            .set_deprecated("acme/legacy", "1.0", "")
            .unwrap();

        ResolveReferencesToAliasesPass.process(&mut container).unwrap();

        assert_eq!(
            container.log_entries(),
            ["ResolveReferencesToAliasesPass: Since acme/mailer 1.2: The \"mailer\" service alias is deprecated. You should stop using it, as it will be removed in the future. It is being referenced by the \"newsletter\" service."]
        );
        assert!(container.alias("mailer").unwrap().is_deprecated());
    }

    #[test]
    fn private_aliases_are_removed() {
        let mut container = ContainerBuilder::new();
        container.register("mailer.smtp", None).set_public(true);
        container.set_alias("mailer", "mailer.smtp").unwrap();
        container.set_alias("app.mailer", crate::definition::Alias::public("mailer.smtp")).unwrap();

        RemovePrivateAliasesPass.process(&mut container).unwrap();

        assert!(!container.has_alias("mailer"));
        assert!(container.has_alias("app.mailer"));
        assert_eq!(
            container.log_entries(),
            ["RemovePrivateAliasesPass: Removed service \"mailer\"; reason: private alias."]
        );
    }

    #[test]
    fn private_targets_take_the_place_of_their_alias() {
        let mut container = ContainerBuilder::new();
        container.register("mailer.smtp", Some("App\\SmtpMailer"));
        container.register("public.target", Some("App\\Logger")).set_public(true);
        container.set_alias("mailer", crate::definition::Alias::public("mailer.smtp")).unwrap();
        container.set_alias("mailer.alt", "mailer.smtp").unwrap();
        container.set_alias("logger", "public.target").unwrap();
        container.register("newsletter", None).add_argument(Reference::new("mailer.smtp"));

        ReplaceAliasByActualDefinitionPass::default().process(&mut container).unwrap();

        assert!(!container.has_definition("mailer.smtp"));
        let moved = container.definition("mailer").unwrap();
        assert_eq!(moved.class(), Some("App\\SmtpMailer"));
        assert!(moved.is_public());
        assert_eq!(container.alias("mailer.alt").unwrap().id(), "mailer");
        assert_eq!(container.alias("logger").unwrap().id(), "public.target");
        let argument = &container.definition("newsletter").unwrap().arguments()[0];
        assert_eq!(argument.as_reference().unwrap().id(), "mailer");
    }
}
