use indexmap::IndexMap;

use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::Changes;
use crate::error::{CompileError, CompileResult};
use crate::value::{ArgKey, Value, ValueMap};

/// Replaces `%parameter%` placeholders everywhere in definitions: argument
/// values and keys, classes, files, bindings and alias ids. The parameter
/// bag is resolved at the end.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, ResolveParameterPlaceHoldersPass, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.set_parameter("mailer.class", "App\\Mailer");
/// container.set_parameter("port", 25);
/// container.register("mailer", Some("%mailer.class%")).add_argument("%port%").add_argument("smtp:%port%");
///
/// ResolveParameterPlaceHoldersPass::new().process(&mut container).unwrap();
///
/// let mailer = container.definition("mailer").unwrap();
/// assert_eq!(mailer.class(), Some("App\\Mailer"));
/// assert_eq!(mailer.arguments()[0], Value::from(25));
/// assert_eq!(mailer.arguments()[1], Value::from("smtp:25"));
/// ```
#[derive(Debug, Clone)]
pub struct ResolveParameterPlaceHoldersPass {
    throw_on_missing: bool,
}

impl Default for ResolveParameterPlaceHoldersPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveParameterPlaceHoldersPass {
    pub fn new() -> Self {
        Self { throw_on_missing: true }
    }

    /// Missing parameters become `null` and a deferred definition error.
    pub fn lenient() -> Self {
        Self { throw_on_missing: false }
    }

    fn resolve(&self, cx: &mut WalkContext<'_>, value: &Value) -> CompileResult<Value> {
        match cx.container.parameters_mut().resolve_value(value) {
            Ok(resolved) => Ok(resolved),
            Err(error @ CompileError::ParameterNotFound { .. }) if !self.throw_on_missing => {
                cx.add_error(error.to_string());
                Ok(Value::Null)
            }
            Err(error) => Err(with_source(error, &cx.current_id)),
        }
    }

    fn resolve_keys(&self, cx: &mut WalkContext<'_>, map: &ValueMap) -> CompileResult<Option<ValueMap>> {
        if !map.keys().any(|key| matches!(key, ArgKey::Named(name) if name.contains('%'))) {
            return Ok(None);
        }
        let mut resolved = ValueMap::with_capacity(map.len());
        for (key, value) in map {
            let key = match key {
                ArgKey::Named(name) if name.contains('%') => {
                    let name = self.resolve(cx, &Value::from(name.as_str()))?;
                    ArgKey::parse(&name.to_scalar_string().unwrap_or_default())
                }
                other => other.clone(),
            };
            resolved.insert(key, value.clone());
        }
        Ok(Some(resolved))
    }
}

fn with_source(error: CompileError, current_id: &str) -> CompileError {
    match error {
        CompileError::ParameterNotFound {
            key,
            source_id: None,
            source_key,
            alternatives,
        } => CompileError::ParameterNotFound {
            key,
            source_id: Some(current_id.to_string()),
            source_key,
            alternatives,
        },
        other => other,
    }
}

impl RecursivePass for ResolveParameterPlaceHoldersPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        match value {
            Value::String(text) => {
                if !text.contains('%') {
                    return Ok(None);
                }
                let resolved = self.resolve(cx, value)?;
                Ok((resolved != *value).then_some(resolved))
            }
            Value::Array(map) => {
                let walked = walk_children(self, cx, value)?;
                let current = match &walked {
                    Some(Value::Array(current)) => current,
                    _ => map,
                };
                match self.resolve_keys(cx, current)? {
                    Some(resolved) => Ok(Some(Value::from(resolved))),
                    None => Ok(walked),
                }
            }
            Value::Definition(definition) => {
                let mut current = None;
                for (key, binding) in definition.bindings() {
                    if let Some(new) = self.process_value(cx, binding.value(), false)? {
                        current
                            .get_or_insert_with(|| (**definition).clone())
                            .bindings
                            .insert(key.clone(), binding.with_value(new));
                    }
                }
                if definition.changes().contains(Changes::CLASS) {
                    if let Some(class) = definition.class().filter(|class| class.contains('%')) {
                        let class = self.resolve(cx, &Value::from(class))?;
                        current.get_or_insert_with(|| (**definition).clone()).class = class.to_scalar_string();
                    }
                }
                if definition.changes().contains(Changes::FILE) {
                    if let Some(file) = definition.file().filter(|file| file.contains('%')) {
                        let file = self.resolve(cx, &Value::from(file))?;
                        current.get_or_insert_with(|| (**definition).clone()).file = file.to_scalar_string();
                    }
                }
                match current {
                    Some(current) => {
                        let current = Value::definition(current);
                        Ok(Some(walk_children(self, cx, &current)?.unwrap_or(current)))
                    }
                    None => walk_children(self, cx, value),
                }
            }
            _ => walk_children(self, cx, value),
        }
    }
}

impl CompilerPass for ResolveParameterPlaceHoldersPass {
    fn name(&self) -> &'static str {
        "ResolveParameterPlaceHoldersPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)?;

        if container.aliases().keys().any(|id| id.contains('%')) {
            let mut aliases = IndexMap::with_capacity(container.aliases().len());
            for (id, alias) in container.aliases().clone() {
                let resolved = container
                    .parameters_mut()
                    .resolve_value(&Value::from(id.as_str()))
                    .map_err(|error| with_source(error, &id))?;
                aliases.insert(resolved.to_scalar_string().unwrap_or(id), alias);
            }
            container.set_aliases(aliases)?;
        }

        container.parameters_mut().resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    #[test]
    fn missing_parameters_name_the_service() {
        let mut container = ContainerBuilder::new();
        container.register("mailer", None).add_argument("%mailer.dsn%");
        let err = ResolveParameterPlaceHoldersPass::new().process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The service \"mailer\" has a dependency on a non-existent parameter \"mailer.dsn\"."
        );
    }

    #[test]
    fn lenient_resolution_defers_the_error() {
        let mut container = ContainerBuilder::new();
        container.register("mailer", None).add_argument("%mailer.dsn%");
        ResolveParameterPlaceHoldersPass::lenient().process(&mut container).unwrap();
        let mailer = container.definition("mailer").unwrap();
        assert_eq!(mailer.arguments()[0], Value::Null);
        assert_eq!(mailer.errors().len(), 1);
    }

    #[test]
    fn keys_bindings_and_aliases_are_resolved() {
        let mut container = ContainerBuilder::new();
        container.set_parameter("env", "prod");
        container
            .register("mailer", None)
            .add_argument(Value::map([("%env%_dsn", Value::from("smtp://%env%"))]))
            .bind("$env", "%env%");
        container.set_alias("mailer.%env%", "mailer").unwrap();

        ResolveParameterPlaceHoldersPass::new().process(&mut container).unwrap();

        let mailer = container.definition("mailer").unwrap();
        let arguments = mailer.arguments()[0].as_array().unwrap();
        assert_eq!(arguments[&ArgKey::from("prod_dsn")], Value::from("smtp://prod"));
        assert_eq!(mailer.bindings()["$env"].value(), &Value::from("prod"));
        assert!(container.has_alias("mailer.prod"));
    }

    #[test]
    fn escaped_percents_survive_until_the_bag_is_resolved() {
        let mut container = ContainerBuilder::new();
        container.register("formatter", None).add_argument("100%%").add_argument(Reference::new("x"));
        ResolveParameterPlaceHoldersPass::new().process(&mut container).unwrap();
        assert_eq!(container.definition("formatter").unwrap().arguments()[0], Value::from("100%%"));
        assert!(container.parameters().is_resolved());
    }
}
