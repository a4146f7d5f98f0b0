use std::sync::Arc;

use crate::compiler::{method_of, process_definitions, walk_children, CompilerPass, RecursivePass, Signature, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::Definition;
use crate::error::{CompileError, CompileResult};
use crate::value::{ArgKey, Value, ValueMap};

/// Turns `$name` and `Type` argument keys into positions.
///
/// Keys of the constructor and of every method call are matched against
/// the parameters of the called method. When the resolved positions leave
/// gaps in a definition that is not autowired, the arguments stay keyed by
/// parameter name.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{ClassMetadata, CompilerPass, ContainerBuilder, ParameterMetadata, ResolveNamedArgumentsPass, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.register_class(ClassMetadata::class("App\\Mailer").constructor([
///     ParameterMetadata::typed("dsn", "string"),
///     ParameterMetadata::typed("port", "int"),
/// ]));
/// container
///     .register("mailer", Some("App\\Mailer"))
///     .set_argument("$port", 25)
///     .set_argument("$dsn", "smtp://localhost");
///
/// ResolveNamedArgumentsPass.process(&mut container).unwrap();
///
/// let arguments = container.definition("mailer").unwrap().arguments().clone();
/// assert_eq!(arguments[0], Value::from("smtp://localhost"));
/// assert_eq!(arguments[1], Value::from(25));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveNamedArgumentsPass;

impl ResolveNamedArgumentsPass {
    fn resolve_call(
        &self,
        container: &ContainerBuilder,
        current_id: &str,
        definition: &Definition,
        method: &str,
        arguments: &ValueMap,
    ) -> CompileResult<Option<ValueMap>> {
        if arguments.keys().all(|key| !matches!(key, ArgKey::Named(_))) {
            return Ok(None);
        }
        let signature: Signature = method_of(container, current_id, definition, method)?;
        let label = signature.label(current_id);
        let parameters = &signature.method.parameters;

        let mut resolved: Vec<(usize, Option<String>, Value)> = Vec::with_capacity(arguments.len());
        let taken = |resolved: &Vec<(usize, Option<String>, Value)>, position: usize| {
            resolved.iter().any(|(p, _, _)| *p == position)
        };

        for (key, argument) in arguments {
            let name = match key {
                ArgKey::Index(position) | ArgKey::Replace(position) => {
                    resolved.push((*position, None, argument.clone()));
                    continue;
                }
                ArgKey::Named(name) => name,
            };
            if !name.is_empty() && !name.starts_with('$') && !container.classes().exists(name) {
                return Err(CompileError::invalid(format!(
                    "Invalid service \"{}\": did you forget to add the \"$\" prefix to argument \"{}\"?",
                    current_id, name
                )));
            }

            if let Some(parameter_name) = name.strip_prefix('$') {
                let Some(position) = parameters.iter().position(|p| p.name == parameter_name) else {
                    return Err(CompileError::invalid(format!(
                        "Invalid service \"{}\": method \"{}()\" has no argument named \"{}\". Check your service definition.",
                        current_id, label, name
                    )));
                };
                match argument {
                    Value::Array(variadic) if parameters[position].variadic => {
                        for (offset, item) in variadic.values().enumerate() {
                            resolved.push((position + offset, None, item.clone()));
                        }
                    }
                    _ => resolved.push((position, Some(parameter_name.to_string()), argument.clone())),
                }
                continue;
            }

            if !matches!(argument, Value::Null | Value::Reference(_) | Value::Definition(_)) {
                return Err(CompileError::invalid(format!(
                    "Invalid service \"{}\": the value of argument \"{}\" of method \"{}()\" must be null, an instance of \"Reference\" or an instance of \"Definition\", \"{}\" given.",
                    current_id,
                    name,
                    label,
                    argument.type_name()
                )));
            }
            let mut found = false;
            for (position, parameter) in parameters.iter().enumerate() {
                let matches = parameter
                    .type_hint
                    .as_deref()
                    .map(|ty| ty.trim_start_matches('?') == name.as_str())
                    .unwrap_or(false);
                if matches && !taken(&resolved, position) {
                    resolved.push((position, Some(parameter.name.clone()), argument.clone()));
                    found = true;
                }
            }
            if !found {
                return Err(CompileError::invalid(format!(
                    "Invalid service \"{}\": method \"{}()\" has no argument type-hinted as \"{}\". Check your service definition.",
                    current_id, label, name
                )));
            }
        }

        resolved.sort_by_key(|(position, _, _)| *position);
        resolved.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                std::mem::swap(later, earlier);
                true
            } else {
                false
            }
        });
        let is_list = resolved.iter().enumerate().all(|(i, (position, _, _))| i == *position);
        let keep_names = !definition.is_autowired() && !is_list;
        Ok(Some(
            resolved
                .into_iter()
                .map(|(position, name, value)| match name {
                    Some(name) if keep_names => (ArgKey::Named(name), value),
                    _ => (ArgKey::Index(position), value),
                })
                .collect(),
        ))
    }
}

impl RecursivePass for ResolveNamedArgumentsPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };

        let mut current: Option<Definition> = None;
        for (index, call) in definition.method_calls().iter().enumerate() {
            if let Some(arguments) =
                self.resolve_call(cx.container, &cx.current_id, definition, &call.method, &call.arguments)?
            {
                current.get_or_insert_with(|| (**definition).clone()).calls[index].arguments = Arc::new(arguments);
            }
        }
        if let Some(arguments) =
            self.resolve_call(cx.container, &cx.current_id, definition, "__construct", definition.arguments())?
        {
            current.get_or_insert_with(|| (**definition).clone()).set_arguments(arguments);
        }

        match current {
            Some(current) => {
                let current = Value::definition(current);
                Ok(Some(walk_children(self, cx, &current)?.unwrap_or(current)))
            }
            None => walk_children(self, cx, value),
        }
    }
}

impl CompilerPass for ResolveNamedArgumentsPass {
    fn name(&self) -> &'static str {
        "ResolveNamedArgumentsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassMetadata, MethodMetadata, ParameterMetadata};
    use crate::definition::MethodCall;
    use crate::reference::Reference;

    fn classes(container: &mut ContainerBuilder) {
        container
            .register_class(ClassMetadata::class("App\\Mailer"))
            .register_class(ClassMetadata::class("App\\Logger"));
        container.register_class(
            ClassMetadata::class("App\\Newsletter")
                .constructor([
                    ParameterMetadata::typed("mailer", "App\\Mailer"),
                    ParameterMetadata::typed("sender", "string"),
                    ParameterMetadata::typed("cc", "string").with_default(""),
                ])
                .method(MethodMetadata::new("setLogger").param(ParameterMetadata::typed("logger", "App\\Logger"))),
        );
    }

    #[test]
    fn types_and_names_resolve_to_positions() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        let mut call = ValueMap::new();
        call.insert(ArgKey::from("App\\Logger"), Value::reference("logger"));
        container
            .register("newsletter", Some("App\\Newsletter"))
            .set_argument("$sender", "me@example.com")
            .set_argument("App\\Mailer", Reference::new("mailer"))
            .add_method_call(MethodCall::with_arguments("setLogger", call))
            .unwrap();

        ResolveNamedArgumentsPass.process(&mut container).unwrap();

        let newsletter = container.definition("newsletter").unwrap();
        let keys: Vec<ArgKey> = newsletter.arguments().keys().cloned().collect();
        assert_eq!(keys, vec![ArgKey::Index(0), ArgKey::Index(1)]);
        assert_eq!(newsletter.arguments()[0], Value::reference("mailer"));
        assert_eq!(newsletter.method_calls()[0].arguments[0], Value::reference("logger"));
    }

    #[test]
    fn gaps_keep_parameter_names() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.register("newsletter", Some("App\\Newsletter")).set_argument("$cc", "boss@example.com");

        ResolveNamedArgumentsPass.process(&mut container).unwrap();

        let newsletter = container.definition("newsletter").unwrap();
        assert_eq!(newsletter.arguments().get(&ArgKey::Named("cc".into())), Some(&Value::from("boss@example.com")));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.register("newsletter", Some("App\\Newsletter")).set_argument("$nope", 1);
        let err = ResolveNamedArgumentsPass.process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid service \"newsletter\": method \"App\\Newsletter::__construct()\" has no argument named \"$nope\". Check your service definition."
        );
    }

    #[test]
    fn missing_dollar_prefix_is_reported() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.register("newsletter", Some("App\\Newsletter")).set_argument("sender", "x");
        let err = ResolveNamedArgumentsPass.process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid service \"newsletter\": did you forget to add the \"$\" prefix to argument \"sender\"?"
        );
    }
}
