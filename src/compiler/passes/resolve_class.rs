use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::error::{CompileError, CompileResult};

use super::is_class_like;

/// Uses class-like service ids (`App\Mailer`) as the class of definitions
/// that have none.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveClassPass;

impl CompilerPass for ResolveClassPass {
    fn name(&self) -> &'static str {
        "ResolveClassPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let mut resolved = Vec::new();
        for (id, definition) in container.definitions() {
            if definition.is_synthetic() || definition.class().is_some() || !is_class_like(id) {
                continue;
            }
            if definition.is_child() && !container.classes().exists(id) {
                return Err(CompileError::invalid(format!(
                    "Service definition \"{}\" has a parent but no class, and its name looks like a FQCN. Either the class is missing or you want to inherit it from the parent service. To resolve this ambiguity, please rename this service to a non-FQCN (e.g. using dots), or create the missing class.",
                    id
                )));
            }
            resolved.push(id.clone());
        }
        for id in resolved {
            container.definition_mut(&id)?.set_class(Some(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;

    #[test]
    fn class_like_ids_become_classes() {
        let mut container = ContainerBuilder::new();
        container.register("App\\Mailer", None);
        container.register("mailer", None);
        container.register("App\\Typed", Some("App\\Other"));

        ResolveClassPass.process(&mut container).unwrap();

        assert_eq!(container.definition("App\\Mailer").unwrap().class(), Some("App\\Mailer"));
        assert_eq!(container.definition("mailer").unwrap().class(), None);
        assert_eq!(container.definition("App\\Typed").unwrap().class(), Some("App\\Other"));
    }

    #[test]
    fn class_like_children_need_an_existing_class() {
        let mut container = ContainerBuilder::new();
        container.set_definition("App\\Child", Definition::child("parent")).unwrap();
        let err = ResolveClassPass.process(&mut container).unwrap_err();
        assert!(err.to_string().starts_with("Service definition \"App\\Child\" has a parent but no class"));
    }
}
