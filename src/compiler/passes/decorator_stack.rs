use std::sync::Arc;

use indexmap::IndexMap;

use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::definition::Definition;
use crate::error::{CompileError, CompileResult};
use crate::reference::InvalidBehavior;
use crate::value::{Value, ValueMap};

/// Tag of services whose arguments are a stack of decorators.
pub const STACK_TAG: &str = "container.stack";

/// Expands decorator stacks.
///
/// A service tagged `container.stack` lists its decorators as arguments,
/// outermost first; the last entry is the decorated service. Inline
/// definitions are registered as `.stack_id.N`, references (to plain
/// services or to other stacks) become child definitions of their target.
/// Every layer then decorates the last one, registered in reverse so the
/// decorator pass nests them in stack order, and the stack id becomes an
/// alias to the outermost layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveDecoratorStackPass;

impl ResolveDecoratorStackPass {
    fn resolve_stack(
        &self,
        stacks: &IndexMap<String, Arc<ValueMap>>,
        path: &mut Vec<String>,
    ) -> CompileResult<IndexMap<String, Definition>> {
        let mut definitions = IndexMap::new();
        let Some(id) = path.last().cloned() else {
            return Ok(definitions);
        };
        let Some(stack) = stacks.get(&id) else {
            definitions.insert(id.clone(), Definition::child(id));
            return Ok(definitions);
        };
        if let Some(first) = path.iter().position(|entry| *entry == id) {
            if first != path.len() - 1 {
                return Err(CompileError::circular(id, path[first..].to_vec()));
            }
        }

        let prefix = format!(".{}.", id);
        for (key, entry) in stack.iter() {
            let layer = format!("{}{}", prefix, key);
            let mut template = match entry {
                Value::Definition(definition) => match definition.parent() {
                    Some(parent) if stacks.contains_key(parent) => {
                        path.push(parent.to_string());
                        Some((**definition).clone())
                    }
                    _ => {
                        definitions.insert(layer, (**definition).clone());
                        continue;
                    }
                },
                Value::Reference(reference) => {
                    path.push(reference.id().to_string());
                    None
                }
                other => {
                    return Err(CompileError::invalid(format!(
                        "Invalid service \"{}\": unexpected value of type \"{}\" found in the stack of decorators.",
                        id,
                        other.type_name()
                    )))
                }
            };
            for sub_id in self.resolve_stack(stacks, path)?.into_keys() {
                let definition = match template.take() {
                    Some(mut definition) => {
                        definition.set_parent(Some(sub_id.clone()));
                        definition
                    }
                    None => Definition::child(sub_id.clone()),
                };
                definitions.insert(format!("{}{}", layer, sub_id), definition);
            }
            path.pop();
        }

        if path.len() == 1 {
            let decorated = definitions.keys().last().cloned();
            let count = definitions.len();
            for (index, definition) in definitions.values_mut().enumerate() {
                definition.set_public(false).clear_tags();
                if index + 1 == count {
                    definition.set_decoration(None);
                } else {
                    definition.set_decorated_service(decorated.as_deref(), None, 0, InvalidBehavior::Exception)?;
                }
            }
        }
        Ok(definitions)
    }
}

impl CompilerPass for ResolveDecoratorStackPass {
    fn name(&self) -> &'static str {
        "ResolveDecoratorStackPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let mut stacks = IndexMap::new();
        for id in container.find_tagged_service_ids(STACK_TAG, false)?.into_keys() {
            let definition = container.definition(&id)?;
            if definition.arguments().is_empty() {
                return Err(CompileError::invalid(format!(
                    "Invalid service \"{}\": the stack of decorators is empty.",
                    id
                )));
            }
            stacks.insert(id, definition.arguments_arc().clone());
        }

        let ids: Vec<String> = stacks.keys().cloned().collect();
        for id in ids {
            let resolved = self.resolve_stack(&stacks, &mut vec![id.clone()])?;
            let Some(outermost) = resolved.keys().next().cloned() else {
                continue;
            };
            for (layer, definition) in resolved.into_iter().rev() {
                container.replace_definition_arc(&layer, Arc::new(definition));
            }

            let stack = container.definition(&id)?.clone();
            let alias = container.set_alias(&id, outermost)?;
            if stack.changes().contains(crate::definition::Changes::PUBLIC) {
                alias.set_public(stack.is_public());
            }
            if let Some(deprecation) = stack.deprecation("%alias_id%") {
                alias.set_deprecation(Some(deprecation));
            }
        }
        Ok(())
    }
}
