use indexmap::IndexMap;

use super::split_typed_key;
use crate::argument::Argument;
use crate::compiler::{
    constructor_of, method_of, process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext,
};
use crate::container::ContainerBuilder;
use crate::definition::{BindingKind, BoundArgument, Definition, MethodCall};
use crate::error::{CompileError, CompileResult};
use crate::internal::IdSet;
use crate::value::{sort_keys, ArgKey, Value, ValueMap};

const SCALAR_BINDING_TYPES: &[&str] = &["array", "bool", "float", "int", "string", "iterable"];

#[derive(Debug, Clone)]
struct UnusedBinding {
    key: String,
    service_id: String,
    kind: BindingKind,
    file: Option<String>,
}

/// Injects bound arguments into constructor and method-call parameters.
///
/// For every parameter without an explicit argument the bindings are tried
/// in order: `Type $name`, `$name`, then the bare class `Type`. Typed
/// references still waiting for autowiring are resolved from the bindings
/// of the service they belong to. A binding no parameter ever used fails
/// the pass, since it is almost always a typo.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{ClassMetadata, CompilerPass, ContainerBuilder, ParameterMetadata, Reference, ResolveBindingsPass, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.register_class(ClassMetadata::class("App\\Newsletter").constructor([
///     ParameterMetadata::typed("mailer", "App\\Mailer"),
///     ParameterMetadata::typed("sender", "string"),
/// ]));
/// container
///     .register("newsletter", Some("App\\Newsletter"))
///     .bind("App\\Mailer", Reference::new("mailer"))
///     .bind("$sender", "noreply@example.com");
///
/// ResolveBindingsPass::new().process(&mut container).unwrap();
///
/// let arguments = container.definition("newsletter").unwrap().arguments().clone();
/// assert_eq!(arguments[0], Value::reference("mailer"));
/// assert_eq!(arguments[1], Value::from("noreply@example.com"));
/// ```
#[derive(Debug, Default)]
pub struct ResolveBindingsPass {
    used: IdSet<u64>,
    unused: IndexMap<u64, UnusedBinding>,
    error_messages: Vec<String>,
}

impl ResolveBindingsPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn binding_value(&mut self, binding: &BoundArgument) -> Value {
        self.used.insert(binding.identifier());
        self.unused.shift_remove(&binding.identifier());
        binding.value().clone()
    }

    fn track(&mut self, key: &str, binding: &BoundArgument, service_id: &str) {
        let identifier = binding.identifier();
        if binding.is_used() {
            self.used.insert(identifier);
            self.unused.shift_remove(&identifier);
        } else if !self.used.contains(&identifier) {
            self.unused.insert(
                identifier,
                UnusedBinding {
                    key: key.to_string(),
                    service_id: service_id.to_string(),
                    kind: binding.kind(),
                    file: binding.file().map(str::to_string),
                },
            );
        }
    }

    /// Binds the parameters of `method` that have no argument yet.
    ///
    /// Returns `None` when nothing changed.
    fn bind_call(
        &mut self,
        bindings: &IndexMap<String, BoundArgument>,
        binding_names: &IndexMap<String, String>,
        signature_label: &str,
        parameters: &[crate::class::ParameterMetadata],
        arguments: &ValueMap,
    ) -> Option<ValueMap> {
        let mut resolved = arguments.clone();
        for (position, parameter) in parameters.iter().enumerate() {
            let is_set = |key: &ArgKey| {
                resolved
                    .get(key)
                    .map_or(false, |v| !matches!(v, Value::Argument(Argument::Abstract(_))) && v.as_str() != Some(""))
            };
            if is_set(&ArgKey::Index(position)) || is_set(&ArgKey::Named(parameter.name.clone())) {
                continue;
            }

            let type_hint = parameter
                .type_hint
                .as_deref()
                .map(|ty| ty.trim_start_matches('?').trim_start_matches('\\'));
            let typed_key = type_hint.map(|ty| format!("{} ${}", ty, parameter.name));
            let named_key = format!("${}", parameter.name);

            let binding = typed_key
                .as_deref()
                .and_then(|key| bindings.get(key))
                .or_else(|| bindings.get(&named_key))
                .or_else(|| parameter.class_type().and_then(|ty| bindings.get(ty.trim_start_matches('\\'))));
            if let Some(binding) = binding {
                let value = self.binding_value(binding);
                resolved.insert(ArgKey::Index(position), value);
                continue;
            }

            if let Some(key) = binding_names.get(&parameter.name) {
                let argument_type = key.split(' ').next().unwrap_or_default();
                self.error_messages.push(format!(
                    "Did you forget to add the type \"{}\" to argument \"${}\" of method \"{}()\"?",
                    argument_type, parameter.name, signature_label
                ));
            }
        }

        for (position, parameter) in parameters.iter().enumerate() {
            let named = ArgKey::Named(parameter.name.clone());
            if !resolved.contains_key(&named)
                || (position > 0 && !resolved.contains_key(&ArgKey::Index(position - 1)))
            {
                continue;
            }
            if let Some(value) = resolved.shift_remove(&named) {
                resolved.entry(ArgKey::Index(position)).or_insert(value);
            }
        }

        if resolved == *arguments {
            return None;
        }
        sort_keys(&mut resolved);
        Some(resolved)
    }

    fn unused_binding_error(&self, unused: &UnusedBinding) -> CompileError {
        let (argument_type, argument_name) = split_typed_key(&unused.key);
        let mut subject = String::new();
        if let Some(ty) = argument_type {
            subject.push_str(&format!("of type \"{}\" ", ty));
        }
        if let Some(name) = argument_name {
            subject.push_str(&format!("named \"${}\" ", name));
        }
        match unused.kind {
            BindingKind::Defaults => subject.push_str("under \"_defaults\""),
            BindingKind::Instanceof => subject.push_str("under \"_instanceof\""),
            BindingKind::Service => subject.push_str(&format!("for service \"{}\"", unused.service_id)),
        }
        if let Some(file) = &unused.file {
            subject.push_str(&format!(" in file \"{}\"", file));
        }

        let mut message = format!(
            "A binding is configured for an argument {}, but no corresponding argument has been found. It may be unused and should be removed, or it may have a typo.",
            subject
        );
        if !self.error_messages.is_empty() {
            let one_of = if self.error_messages.len() > 1 { " one of" } else { "" };
            message.push_str(&format!("\nCould be related to{}:", one_of));
            for error in &self.error_messages {
                message.push_str("\n - ");
                message.push_str(error);
            }
        }
        CompileError::invalid(message)
    }
}

impl RecursivePass for ResolveBindingsPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        if let Value::Reference(reference) = value {
            if !reference.is_unresolved_type() {
                return Ok(None);
            }
            let Ok(root) = cx.container.definition(&cx.current_id) else {
                return Ok(None);
            };
            let typed = reference.name().map(|name| format!("{} ${}", reference.id(), name));
            let binding = typed
                .as_deref()
                .and_then(|key| root.bindings().get(key))
                .or_else(|| root.bindings().get(reference.id()))
                .cloned();
            return Ok(binding.map(|binding| self.binding_value(&binding)));
        }

        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };
        if definition.bindings().is_empty() {
            return walk_children(self, cx, value);
        }

        let bindings = definition.bindings().clone();
        let mut binding_names: IndexMap<String, String> = IndexMap::new();
        for (key, binding) in &bindings {
            self.track(key, binding, &cx.current_id);
            let (Some(ty), Some(name)) = split_typed_key(key) else {
                continue;
            };
            binding_names.insert(name.to_string(), key.clone());
            if SCALAR_BINDING_TYPES.contains(&ty) {
                continue;
            }
            let valid = matches!(
                binding.value(),
                Value::Null
                    | Value::Reference(_)
                    | Value::Definition(_)
                    | Value::Argument(Argument::TaggedIterator(_))
                    | Value::Argument(Argument::ServiceLocator(_))
            );
            if !valid {
                return Err(CompileError::invalid(format!(
                    "Invalid value for binding key \"{}\" for service \"{}\": expected \"Reference\", \"Definition\", \"TaggedIteratorArgument\", \"ServiceLocatorArgument\" or null, \"{}\" given.",
                    key,
                    cx.current_id,
                    binding.value().type_name()
                )));
            }
        }

        if definition.is_abstract() {
            return walk_children(self, cx, value);
        }

        let constructor = match constructor_of(cx.container, &cx.current_id, definition, false) {
            Ok(constructor) => constructor,
            Err(error) => {
                let message = error.to_string();
                self.error_messages.push(message.clone());
                cx.add_error(message);
                return walk_children(self, cx, value);
            }
        };

        let mut current: Option<Definition> = None;
        for (index, call) in definition.method_calls().iter().enumerate() {
            let signature = match method_of(cx.container, &cx.current_id, definition, &call.method) {
                Ok(signature) => signature,
                Err(_) if definition.factory().is_some() => continue,
                Err(error) => return Err(error),
            };
            let label = format!("{}::{}", signature.class.as_deref().unwrap_or_default(), signature.method.name);
            if let Some(arguments) =
                self.bind_call(&bindings, &binding_names, &label, &signature.method.parameters, &call.arguments)
            {
                let resolved = current.get_or_insert_with(|| (**definition).clone());
                resolved.calls[index] = MethodCall {
                    arguments: arguments.into(),
                    ..call.clone()
                };
            }
        }
        if let Some(signature) = constructor {
            let label = match &signature.class {
                Some(class) => format!("{}::{}", class, signature.method.name),
                None => signature.method.name.clone(),
            };
            if let Some(arguments) = self.bind_call(
                &bindings,
                &binding_names,
                &label,
                &signature.method.parameters,
                definition.arguments(),
            ) {
                current.get_or_insert_with(|| (**definition).clone()).set_arguments(arguments);
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
}

impl CompilerPass for ResolveBindingsPass {
    fn name(&self) -> &'static str {
        "ResolveBindingsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        self.used = container.removed_binding_ids().clone();
        let result = process_definitions(self, container).and_then(|()| {
            let unused = self
                .unused
                .iter()
                .find(|(identifier, _)| !self.used.contains(*identifier))
                .map(|(_, unused)| unused.clone());
            match unused {
                Some(unused) => Err(self.unused_binding_error(&unused)),
                None => Ok(()),
            }
        });
        self.used.clear();
        self.unused.clear();
        self.error_messages.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassMetadata, ParameterMetadata};
    use crate::reference::{InvalidBehavior, Reference};

    fn classes(container: &mut ContainerBuilder) {
        container.register_class(ClassMetadata::class("App\\Newsletter").constructor([
            ParameterMetadata::typed("mailer", "App\\Mailer"),
            ParameterMetadata::typed("sender", "string"),
            ParameterMetadata::typed("debug", "bool").with_default(false),
        ]));
    }

    #[test]
    fn bindings_fill_missing_parameters_only() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container
            .register("newsletter", Some("App\\Newsletter"))
            .set_argument(1usize, "explicit@example.com")
            .bind("App\\Mailer $mailer", Reference::new("mailer"))
            .bind("bool $debug", true);

        ResolveBindingsPass::new().process(&mut container).unwrap();

        let arguments = container.definition("newsletter").unwrap().arguments().clone();
        let keys: Vec<ArgKey> = arguments.keys().cloned().collect();
        assert_eq!(keys, vec![ArgKey::Index(0), ArgKey::Index(1), ArgKey::Index(2)]);
        assert_eq!(arguments[0], Value::reference("mailer"));
        assert_eq!(arguments[1], Value::from("explicit@example.com"));
        assert_eq!(arguments[2], Value::from(true));
    }

    #[test]
    fn unused_bindings_are_reported() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.register("newsletter", Some("App\\Newsletter")).bind("$foo", "bar");
        let err = ResolveBindingsPass::new().process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A binding is configured for an argument named \"$foo\" for service \"newsletter\", but no corresponding argument has been found. It may be unused and should be removed, or it may have a typo."
        );
    }

    #[test]
    fn mistyped_bindings_get_a_hint() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.register("newsletter", Some("App\\Newsletter")).bind("int $sender", 3);
        let err = ResolveBindingsPass::new().process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A binding is configured for an argument of type \"int\" named \"$sender\" for service \"newsletter\", but no corresponding argument has been found. It may be unused and should be removed, or it may have a typo.\nCould be related to:\n - Did you forget to add the type \"int\" to argument \"$sender\" of method \"App\\Newsletter::__construct()\"?"
        );
    }

    #[test]
    fn class_typed_bindings_need_service_values() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container
            .register("newsletter", Some("App\\Newsletter"))
            .bind("App\\Mailer $mailer", "smtp");
        let err = ResolveBindingsPass::new().process(&mut container).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Invalid value for binding key \"App\\Mailer $mailer\" for service \"newsletter\""));
    }

    #[test]
    fn unresolved_typed_references_use_the_bindings() {
        let mut container = ContainerBuilder::new();
        container.register_class(ClassMetadata::class("App\\Handler"));
        container
            .register("handler", Some("App\\Handler"))
            .set_property(
                "logger",
                Reference::typed("App\\Logger", "App\\Logger", InvalidBehavior::Exception, Some("logger")),
            )
            .bind("App\\Logger $logger", Reference::new("monolog"));

        ResolveBindingsPass::new().process(&mut container).unwrap();

        let handler = container.definition("handler").unwrap();
        assert_eq!(handler.properties()[&ArgKey::from("logger")], Value::reference("monolog"));
    }

    #[test]
    fn bindings_of_removed_services_count_as_used() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.register("newsletter", Some("App\\Newsletter")).bind("$foo", "bar");
        let shared = container.definition("newsletter").unwrap().bindings().clone();
        container.register("other", Some("App\\Newsletter")).set_bindings(shared);
        container.remove_definition("other");

        ResolveBindingsPass::new().process(&mut container).unwrap();
    }
}
