use indexmap::IndexMap;

use crate::class::ClassMetadata;
use crate::compiler::{
    constructor_of, method_of, process_definitions, process_root, walk_children, CompilerPass, RecursivePass,
    Signature, WalkContext,
};
use crate::container::{ContainerBuilder, EXCLUDED_TAG};
use crate::definition::{Definition, MethodCall};
use crate::error::{CompileError, CompileResult};
use crate::reference::{InvalidBehavior, Reference};
use crate::value::{sort_keys, ArgKey, Value, ValueMap};

/// Service ids usable for each class or interface, built once per run.
#[derive(Debug, Default)]
struct TypeIndex {
    types: IndexMap<String, String>,
    ambiguous: IndexMap<String, Vec<String>>,
    explicit: IndexMap<String, String>,
}

impl TypeIndex {
    fn build(container: &ContainerBuilder) -> Self {
        let mut index = Self::default();
        for (id, definition) in container.definitions() {
            index.add(container, id, definition);
        }
        index
    }

    fn add(&mut self, container: &ContainerBuilder, id: &str, definition: &Definition) {
        if definition.is_abstract() || id.is_empty() || id.starts_with('.') || definition.is_deprecated() {
            return;
        }
        for ty in definition.autowiring_types() {
            self.explicit.entry(ty.clone()).or_insert_with(|| id.to_string());
        }
        let classes = container.classes();
        let Some(class) = definition.class().and_then(|class| classes.get(class)) else {
            return;
        };
        for interface in classes.interfaces(&class.name) {
            self.set(interface, id);
        }
        self.set(class.name.clone(), id);
        for parent in classes.parents(&class.name) {
            self.set(parent, id);
        }
    }

    /// A type claimed by a second id becomes ambiguous for good.
    fn set(&mut self, ty: String, id: &str) {
        if let Some(ids) = self.ambiguous.get_mut(&ty) {
            ids.push(id.to_string());
            return;
        }
        match self.types.get(&ty) {
            Some(existing) if existing == id => {}
            Some(_) => {
                let first = self.types.shift_remove(&ty).unwrap_or_default();
                self.ambiguous.insert(ty, vec![first, id.to_string()]);
            }
            None => {
                self.types.insert(ty, id.to_string());
            }
        }
    }

    /// Id to inject for `ty`, trying `Type $name` aliases, the type
    /// itself, explicit autowiring types and finally the index.
    fn lookup(&self, container: &ContainerBuilder, ty: &str, name: Option<&str>) -> Option<String> {
        let usable = |id: &str| container.has(id) && container.find_definition(id).map_or(false, |d| !d.is_abstract());

        if let Some(name) = name {
            let named = format!("{} ${}", ty, name);
            if usable(&named) {
                return Some(named);
            }
            let prefix = format!("{} $", ty);
            if usable(name)
                && container
                    .aliases()
                    .iter()
                    .any(|(id, alias)| alias.id() == name && id.starts_with(&prefix))
            {
                return Some(name.to_string());
            }
        }
        if usable(ty) {
            return Some(ty.to_string());
        }
        if let Some(id) = self.explicit.get(ty) {
            return Some(id.clone());
        }
        self.types.get(ty).cloned()
    }
}

/// Where the first `container.excluded` namespace covering `ty` came from.
fn excluded_source(container: &ContainerBuilder, ty: &str) -> Option<String> {
    let mut namespace = ty;
    loop {
        if let Ok(definition) = container.definition(namespace) {
            if let Some(attributes) = definition.tag(EXCLUDED_TAG).first() {
                let source = attributes.get("source").and_then(Value::as_str).unwrap_or("from autowiring");
                return Some(source.to_string());
            }
        }
        match namespace.rfind('\\') {
            Some(position) => namespace = &namespace[..position],
            None => return None,
        }
    }
}

/// Wires autowired definitions from the type hints of their classes.
///
/// Constructor and method-call parameters without an explicit argument
/// receive a reference to the service matching their type: a
/// `Type $name` alias, a service named after the type, a service declaring
/// the type in its autowiring types or the only service whose class
/// extends or implements it. A type implemented by two services is never
/// guessed. When nothing matches, a concrete class can be registered on
/// the fly as a private autowired service; otherwise the parameter falls
/// back to its default, to `null` when nullable, or fails.
///
/// Failures are fatal only when the pass throws; otherwise they are
/// recorded on the definition and reported later if it survives removal.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{AutowirePass, ClassMetadata, CompilerPass, ContainerBuilder, ParameterMetadata};
///
/// let mut container = ContainerBuilder::new();
/// container
///     .register_class(ClassMetadata::interface("App\\MailerInterface"))
///     .register_class(ClassMetadata::class("App\\SmtpMailer").implements("App\\MailerInterface"))
///     .register_class(
///         ClassMetadata::class("App\\Newsletter")
///             .constructor([ParameterMetadata::typed("mailer", "App\\MailerInterface")]),
///     );
/// container.register("mailer.smtp", Some("App\\SmtpMailer"));
/// container.autowire("newsletter", Some("App\\Newsletter"));
///
/// AutowirePass::new(true).process(&mut container).unwrap();
///
/// let newsletter = container.definition("newsletter").unwrap();
/// assert_eq!(newsletter.arguments()[0].as_reference().unwrap().id(), "mailer.smtp");
/// ```
#[derive(Debug)]
pub struct AutowirePass {
    throw_on_error: bool,
    create_missing: bool,
    index: TypeIndex,
    last_failure: Option<String>,
}

impl Default for AutowirePass {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Parameter receiving the decorated service, when exactly one matches.
struct InnerSlot {
    call: usize,
    position: usize,
    id: String,
    class: String,
}

impl AutowirePass {
    pub fn new(throw_on_error: bool) -> Self {
        Self {
            throw_on_error,
            create_missing: false,
            index: TypeIndex::default(),
            last_failure: None,
        }
    }

    /// Registers missing concrete classes as private autowired services.
    pub fn creating_missing(mut self, create_missing: bool) -> Self {
        self.create_missing = create_missing;
        self
    }

    fn failure(&self, current_id: &str, message: impl Into<String>) -> CompileError {
        CompileError::Autowiring {
            service_id: current_id.to_string(),
            message: message.into(),
        }
    }

    fn resolve_type(
        &mut self,
        cx: &mut WalkContext<'_>,
        ty: &str,
        name: Option<&str>,
        create: bool,
    ) -> CompileResult<Option<String>> {
        self.last_failure = None;
        if let Some(id) = self.index.lookup(cx.container, ty, name) {
            return Ok(Some(id));
        }
        if create && self.create_missing {
            return self.create_definition(cx, ty);
        }
        Ok(None)
    }

    /// Registers `ty` as a private autowired service and wires it right
    /// away; the definition is dropped again if its own wiring fails.
    fn create_definition(&mut self, cx: &mut WalkContext<'_>, ty: &str) -> CompileResult<Option<String>> {
        let instantiable = cx.container.classes().get(ty).map_or(false, ClassMetadata::is_instantiable);
        if !instantiable || cx.container.has(ty) || excluded_source(cx.container, ty).is_some() {
            return Ok(None);
        }
        cx.container.autowire(ty, Some(ty));
        let definition = cx.container.definition_arc(ty)?.clone();

        let throw_on_error = std::mem::replace(&mut self.throw_on_error, true);
        let outcome = process_root(self, cx.container, ty, definition);
        self.throw_on_error = throw_on_error;

        match outcome {
            Ok(()) => {
                cx.container.log(
                    "AutowirePass",
                    format!("Registered service \"{}\" to autowire \"{}\".", ty, cx.current_id),
                );
                Ok(Some(ty.to_string()))
            }
            Err(CompileError::Autowiring { message, .. }) => {
                cx.container.remove_definition(ty);
                self.last_failure = Some(message);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn type_not_found_message(&mut self, container: &ContainerBuilder, current_id: &str, ty: &str, label: &str) -> String {
        let message = if let Some(source) = excluded_source(container, ty) {
            format!(
                "Cannot autowire service \"{}\": {} needs an instance of \"{}\" but this type has been excluded {}.",
                current_id, label, ty, source
            )
        } else {
            let detail = match container.classes().get(ty) {
                None => format!("has type \"{}\" but this class was not found.", ty),
                Some(class) => {
                    let alternatives = self.type_alternatives(container, ty);
                    let reason = if container.has(ty) {
                        "this service is abstract"
                    } else {
                        "no such service exists"
                    };
                    let mut detail = format!(
                        "references {} \"{}\" but {}.{}",
                        class.kind_label(),
                        ty,
                        reason,
                        alternatives
                    );
                    if class.is_interface() && alternatives.is_empty() {
                        detail.push_str(" Did you create a class that implements this interface?");
                    }
                    detail
                }
            };
            format!("Cannot autowire service \"{}\": {} {}", current_id, label, detail)
        };

        match self.last_failure.take() {
            Some(previous) => format!("{}\n{}", previous, message),
            None => message,
        }
    }

    fn type_alternatives(&self, container: &ContainerBuilder, ty: &str) -> String {
        let classes = container.classes();
        let kind = classes.get(ty).map_or("class", ClassMetadata::kind_label);

        let parents: Vec<String> = classes
            .parents(ty)
            .into_iter()
            .chain(classes.interfaces(ty))
            .filter(|parent| {
                container.has(parent) && container.find_definition(parent).map_or(false, |d| !d.is_abstract())
            })
            .collect();
        let labelled = |parent: &String| {
            let kind = classes.get(parent).map_or("class", ClassMetadata::kind_label);
            format!("{} \"{}\"", kind, parent)
        };
        match parents.as_slice() {
            [] => {}
            [only] => return format!(" Try changing the type-hint to \"{}\" instead.", only),
            [init @ .., last] => {
                let listed: Vec<String> = init.iter().map(|parent| labelled(parent)).collect();
                return format!(
                    " Try changing the type-hint to one of its parents: {}, or {}.",
                    listed.join(", "),
                    labelled(last)
                );
            }
        }

        let prefix = format!("{} $", ty);
        let names: Vec<&str> = container
            .aliases()
            .keys()
            .filter_map(|id| id.strip_prefix(&prefix))
            .collect();
        if !names.is_empty() && !container.has(ty) {
            return format!(
                " Available autowiring aliases for this {} are: \"${}\".",
                kind,
                names.join("\", \"$")
            );
        }

        if !container.has(ty) {
            if let Some(similar) = container.service_ids().find(|id| id.eq_ignore_ascii_case(ty)) {
                return format!(" Did you mean \"{}\"?", similar);
            }
        }
        if let Some(ids) = self.index.ambiguous.get(ty) {
            return format!(
                " You should maybe alias this {} to one of these existing services: \"{}\".",
                kind,
                ids.join("\", \"")
            );
        }
        String::new()
    }

    fn autowire_definition(
        &mut self,
        cx: &mut WalkContext<'_>,
        definition: &Definition,
        is_root: bool,
    ) -> CompileResult<Option<Definition>> {
        let Some(class) = definition.class().map(str::to_string) else {
            return Ok(None);
        };
        let Some(class) = cx.container.classes().get(&class).map(|meta| meta.name.clone()) else {
            cx.container.log(
                "AutowirePass",
                format!(
                    "Skipping service \"{}\": Class or interface \"{}\" cannot be loaded.",
                    cx.current_id, class
                ),
            );
            return Ok(None);
        };

        let constructor = constructor_of(cx.container, &cx.current_id, definition, false)
            .map_err(|error| self.failure(&cx.current_id, error.to_string()))?;
        let owner = Definition::with_class(class.as_str());

        let mut calls: Vec<(Signature, ValueMap)> = Vec::new();
        if let Some(constructor) = constructor.clone() {
            calls.push((constructor, definition.arguments().clone()));
        }
        for call in definition.method_calls() {
            let signature = method_of(cx.container, &cx.current_id, &owner, &call.method)?;
            calls.push((signature, (*call.arguments).clone()));
        }

        let inner = if is_root { self.inner_slot(cx, &calls) } else { None };

        let mut changed = false;
        let mut resolved_calls = Vec::with_capacity(calls.len());
        for (position, (signature, arguments)) in calls.iter().enumerate() {
            let slot = inner.as_ref().filter(|slot| slot.call == position);
            match self.autowire_method(cx, signature, arguments, slot)? {
                Some(resolved) => {
                    changed = true;
                    resolved_calls.push(resolved);
                }
                None => resolved_calls.push(arguments.clone()),
            }
        }
        if !changed {
            return Ok(None);
        }

        let mut resolved = definition.clone();
        let mut resolved_calls = resolved_calls.into_iter();
        if constructor.is_some() {
            if let Some(arguments) = resolved_calls.next() {
                resolved.set_arguments(arguments);
            }
        }
        resolved.calls = definition
            .method_calls()
            .iter()
            .zip(resolved_calls)
            .map(|(call, arguments)| MethodCall {
                arguments: arguments.into(),
                ..call.clone()
            })
            .collect();
        Ok(Some(resolved))
    }

    /// Finds the single parameter, across every autowired method, whose
    /// type accepts the decorated service.
    fn inner_slot(&self, cx: &WalkContext<'_>, calls: &[(Signature, ValueMap)]) -> Option<InnerSlot> {
        let root = cx.container.definition(&cx.current_id).ok()?;
        let inner_id = root.inner_service_id()?;
        if !cx.container.has(inner_id) {
            return None;
        }
        let decorated_class = cx.container.find_definition(inner_id).ok()?.class()?.to_string();
        let classes = cx.container.classes();

        let mut found = None;
        for (call, (signature, arguments)) in calls.iter().enumerate() {
            for (position, parameter) in autowired_parameters(signature).iter().enumerate() {
                if is_set(arguments, position) {
                    continue;
                }
                let Some(ty) = parameter.class_type() else { continue };
                if !classes.is_a(&decorated_class, ty.trim_start_matches('\\')) {
                    continue;
                }
                if found.is_some() {
                    return None;
                }
                found = Some(InnerSlot {
                    call,
                    position,
                    id: inner_id.to_string(),
                    class: decorated_class.clone(),
                });
            }
        }
        found
    }

    /// Fills the parameters of one method; `None` when nothing changed.
    fn autowire_method(
        &mut self,
        cx: &mut WalkContext<'_>,
        signature: &Signature,
        arguments: &ValueMap,
        inner: Option<&InnerSlot>,
    ) -> CompileResult<Option<ValueMap>> {
        let label = signature.label(&cx.current_id);
        let parameters = autowired_parameters(signature);
        let mut resolved = arguments.clone();
        let mut defaults: Vec<usize> = Vec::new();

        for (position, parameter) in parameters.iter().enumerate() {
            let key = ArgKey::Index(position);
            if is_set(&resolved, position) {
                continue;
            }
            if let Some(slot) = inner.filter(|slot| slot.position == position) {
                resolved.insert(
                    key,
                    Value::from(Reference::typed(slot.id.clone(), slot.class.clone(), InvalidBehavior::Exception, None)),
                );
                continue;
            }

            let Some(ty) = parameter.class_type().map(|ty| ty.trim_start_matches('\\').to_string()) else {
                if resolved.contains_key(&key) {
                    continue;
                }
                if let Some(default) = &parameter.default {
                    resolved.insert(key, default.clone());
                    defaults.push(position);
                    continue;
                }
                let hint = match parameter.type_hint.as_deref() {
                    Some(ty) => format!("is type-hinted \"{}\"", ty.trim_start_matches('?').trim_start_matches('\\')),
                    None => "has no type-hint".to_string(),
                };
                return Err(self.failure(
                    &cx.current_id,
                    format!(
                        "Cannot autowire service \"{}\": argument \"${}\" of method \"{}()\" {}, you should configure its value explicitly.",
                        cx.current_id, parameter.name, label, hint
                    ),
                ));
            };

            let create = parameter.default.is_none();
            match self.resolve_type(cx, &ty, Some(&parameter.name), create)? {
                Some(id) => {
                    resolved.insert(
                        key,
                        Value::from(Reference::typed(id, ty.as_str(), InvalidBehavior::Exception, None)),
                    );
                }
                None => {
                    let subject = format!("argument \"${}\" of method \"{}()\"", parameter.name, label);
                    let message = self.type_not_found_message(cx.container, &cx.current_id, &ty, &subject);
                    if let Some(default) = &parameter.default {
                        resolved.insert(key, default.clone());
                        defaults.push(position);
                    } else if parameter.allows_null() {
                        resolved.insert(key, Value::Null);
                    } else {
                        return Err(self.failure(&cx.current_id, message));
                    }
                }
            }
        }

        // trailing defaults are left to the language
        let mut position = parameters.len();
        if !parameters.is_empty() && !resolved.contains_key(&ArgKey::Index(position)) {
            while position > 0 {
                position -= 1;
                if !defaults.contains(&position) {
                    break;
                }
                resolved.shift_remove(&ArgKey::Index(position));
            }
        }

        sort_keys(&mut resolved);
        if resolved == *arguments {
            return Ok(None);
        }
        Ok(Some(resolved))
    }

    fn process_typed_reference(&mut self, cx: &mut WalkContext<'_>, reference: &Reference) -> CompileResult<Option<Value>> {
        let ty = reference.id().to_string();
        let create = !reference.invalid_behavior().tolerates_missing();
        if let Some(id) = self.resolve_type(cx, &ty, reference.name(), create)? {
            if id == ty {
                return Ok(None);
            }
            return Ok(Some(Value::from(reference.retarget(id))));
        }
        if reference.invalid_behavior() != InvalidBehavior::RuntimeException {
            return Ok(None);
        }

        let message = self.type_not_found_message(cx.container, &cx.current_id, &ty, "it");
        let errored = format!(".errored.{}.{}", cx.current_id, ty);
        cx.container.register(&errored, Some(ty.as_str())).add_error(message);
        Ok(Some(Value::from(reference.retarget(errored))))
    }

    fn do_process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        if let Value::Reference(reference) = value {
            if reference.is_unresolved_type() {
                return self.process_typed_reference(cx, reference);
            }
            return Ok(None);
        }

        let walked = walk_children(self, cx, value)?;
        let current = walked.as_ref().unwrap_or(value);
        let Value::Definition(definition) = current else {
            return Ok(walked);
        };
        if !definition.is_autowired() || definition.is_abstract() || definition.class().is_none() {
            return Ok(walked);
        }
        match self.autowire_definition(cx, definition, is_root)? {
            Some(resolved) => Ok(Some(Value::definition(resolved))),
            None => Ok(walked),
        }
    }
}

/// Parameters autowiring fills: every one but a trailing variadic.
fn autowired_parameters(signature: &Signature) -> &[crate::class::ParameterMetadata] {
    let parameters = signature.method.parameters.as_slice();
    match parameters.split_last() {
        Some((last, init)) if last.variadic => init,
        _ => parameters,
    }
}

/// An argument counts as set unless missing or the empty string.
fn is_set(arguments: &ValueMap, position: usize) -> bool {
    arguments
        .get(&ArgKey::Index(position))
        .map_or(false, |value| value.as_str() != Some(""))
}

impl RecursivePass for AutowirePass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, is_root: bool) -> CompileResult<Option<Value>> {
        match self.do_process_value(cx, value, is_root) {
            Err(CompileError::Autowiring { message, .. }) if !self.throw_on_error => {
                cx.add_error(message);
                walk_children(self, cx, value)
            }
            outcome => outcome,
        }
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for AutowirePass {
    fn name(&self) -> &'static str {
        "AutowirePass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        self.index = TypeIndex::build(container);
        let result = process_definitions(self, container);
        self.index = TypeIndex::default();
        self.last_failure = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ParameterMetadata;
    use crate::compiler::passes::DecoratorServicePass;

    fn mailers(container: &mut ContainerBuilder) {
        container
            .register_class(ClassMetadata::interface("App\\MailerInterface"))
            .register_class(ClassMetadata::class("App\\SmtpMailer").implements("App\\MailerInterface"))
            .register_class(ClassMetadata::class("App\\SendmailMailer").implements("App\\MailerInterface"))
            .register_class(
                ClassMetadata::class("App\\Newsletter")
                    .constructor([ParameterMetadata::typed("mailer", "App\\MailerInterface")]),
            );
    }

    #[test]
    fn ambiguous_types_are_never_guessed() {
        let mut container = ContainerBuilder::new();
        mailers(&mut container);
        container.register("mailer.smtp", Some("App\\SmtpMailer"));
        container.register("mailer.sendmail", Some("App\\SendmailMailer"));
        container.autowire("newsletter", Some("App\\Newsletter"));

        let err = AutowirePass::new(true).process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot autowire service \"newsletter\": argument \"$mailer\" of method \"App\\Newsletter::__construct()\" references interface \"App\\MailerInterface\" but no such service exists. You should maybe alias this interface to one of these existing services: \"mailer.smtp\", \"mailer.sendmail\"."
        );
    }

    #[test]
    fn soft_mode_records_the_failure_on_the_definition() {
        let mut container = ContainerBuilder::new();
        mailers(&mut container);
        container.register("mailer.smtp", Some("App\\SmtpMailer"));
        container.register("mailer.sendmail", Some("App\\SendmailMailer"));
        container.autowire("newsletter", Some("App\\Newsletter"));

        AutowirePass::new(false).process(&mut container).unwrap();

        let newsletter = container.definition("newsletter").unwrap();
        assert!(newsletter.arguments().is_empty());
        assert_eq!(newsletter.errors().len(), 1);
        assert!(newsletter.errors()[0].contains("\"mailer.smtp\", \"mailer.sendmail\""));
    }

    #[test]
    fn explicit_autowiring_types_win() {
        let mut container = ContainerBuilder::new();
        mailers(&mut container);
        container.register("mailer.smtp", Some("App\\SmtpMailer"));
        container
            .register("mailer.sendmail", Some("App\\SendmailMailer"))
            .add_autowiring_type("App\\MailerInterface");
        container.autowire("newsletter", Some("App\\Newsletter"));

        AutowirePass::new(true).process(&mut container).unwrap();

        let argument = &container.definition("newsletter").unwrap().arguments()[0];
        assert_eq!(argument.as_reference().unwrap().id(), "mailer.sendmail");
    }

    #[test]
    fn named_aliases_take_precedence_over_the_type() {
        let mut container = ContainerBuilder::new();
        container
            .register_class(ClassMetadata::class("App\\Logger"))
            .register_class(ClassMetadata::class("App\\Audit").constructor([
                ParameterMetadata::typed("auditLogger", "App\\Logger"),
                ParameterMetadata::typed("logger", "App\\Logger"),
            ]));
        container.register("logger.main", Some("App\\Logger"));
        container.register("logger.audit", Some("App\\Logger"));
        container.set_alias("App\\Logger", "logger.main").unwrap();
        container.set_alias("App\\Logger $auditLogger", "logger.audit").unwrap();
        container.autowire("audit", Some("App\\Audit"));

        AutowirePass::new(true).process(&mut container).unwrap();

        let arguments = container.definition("audit").unwrap().arguments().clone();
        assert_eq!(arguments[0].as_reference().unwrap().id(), "App\\Logger $auditLogger");
        assert_eq!(arguments[1].as_reference().unwrap().id(), "App\\Logger");
    }

    #[test]
    fn missing_concrete_classes_are_registered_on_demand() {
        let mut container = ContainerBuilder::new();
        container
            .register_class(ClassMetadata::class("App\\Clock"))
            .register_class(
                ClassMetadata::class("App\\Scheduler").constructor([ParameterMetadata::typed("clock", "App\\Clock")]),
            );
        container.autowire("scheduler", Some("App\\Scheduler"));

        AutowirePass::new(true).creating_missing(true).process(&mut container).unwrap();

        let clock = container.definition("App\\Clock").unwrap();
        assert!(clock.is_private());
        assert!(clock.is_autowired());
        let argument = &container.definition("scheduler").unwrap().arguments()[0];
        assert_eq!(argument.as_reference().unwrap().id(), "App\\Clock");

        let mut container = ContainerBuilder::new();
        container
            .register_class(ClassMetadata::class("App\\Clock"))
            .register_class(
                ClassMetadata::class("App\\Scheduler").constructor([ParameterMetadata::typed("clock", "App\\Clock")]),
            );
        container.autowire("scheduler", Some("App\\Scheduler"));
        let err = AutowirePass::new(true).process(&mut container).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot autowire service \"scheduler\": argument \"$clock\" of method \"App\\Scheduler::__construct()\" references class \"App\\Clock\" but no such service exists."
        );
    }

    #[test]
    fn helpers_that_cannot_be_wired_are_dropped() {
        let mut container = ContainerBuilder::new();
        container
            .register_class(ClassMetadata::class("App\\Connection").constructor([ParameterMetadata::new("dsn")]))
            .register_class(
                ClassMetadata::class("App\\Repository")
                    .constructor([ParameterMetadata::typed("connection", "App\\Connection")]),
            );
        container.autowire("repository", Some("App\\Repository"));

        let err = AutowirePass::new(true).creating_missing(true).process(&mut container).unwrap_err();
        assert!(!container.has_definition("App\\Connection"));
        let message = err.to_string();
        assert!(message.starts_with(
            "Cannot autowire service \"App\\Connection\": argument \"$dsn\" of method \"__construct()\" has no type-hint"
        ));
        assert!(message.ends_with("references class \"App\\Connection\" but no such service exists."));
    }

    #[test]
    fn defaults_and_nullables_fill_the_gaps() {
        let mut container = ContainerBuilder::new();
        container
            .register_class(ClassMetadata::class("App\\Logger"))
            .register_class(ClassMetadata::class("App\\Client").constructor([
                ParameterMetadata::typed("logger", "App\\Logger").nullable(),
                ParameterMetadata::typed("retries", "int").with_default(3),
            ]))
            .register_class(ClassMetadata::class("App\\Mailer").constructor([ParameterMetadata::new("dsn")]));
        container.autowire("client", Some("App\\Client"));
        container.autowire("mailer", Some("App\\Mailer"));

        AutowirePass::new(false).process(&mut container).unwrap();

        let client = container.definition("client").unwrap();
        assert_eq!(client.arguments().len(), 1);
        assert_eq!(client.arguments()[0], Value::Null);
        assert_eq!(
            container.definition("mailer").unwrap().errors(),
            ["Cannot autowire service \"mailer\": argument \"$dsn\" of method \"App\\Mailer::__construct()\" has no type-hint, you should configure its value explicitly."]
        );
    }

    #[test]
    fn decorators_receive_the_decorated_service() {
        let mut container = ContainerBuilder::new();
        mailers(&mut container);
        container.register_class(
            ClassMetadata::class("App\\TracedMailer")
                .implements("App\\MailerInterface")
                .constructor([ParameterMetadata::typed("inner", "App\\MailerInterface")]),
        );
        container.register("mailer", Some("App\\SmtpMailer"));
        container
            .autowire("mailer.traced", Some("App\\TracedMailer"))
            .set_decorated_service(Some("mailer"), None, 0, InvalidBehavior::Exception)
            .unwrap();

        DecoratorServicePass::default().process(&mut container).unwrap();
        AutowirePass::new(true).process(&mut container).unwrap();

        let argument = &container.definition("mailer.traced").unwrap().arguments()[0];
        assert_eq!(argument.as_reference().unwrap().id(), "mailer.traced.inner");
    }

    #[test]
    fn unresolved_runtime_references_point_at_an_errored_service() {
        let mut container = ContainerBuilder::new();
        container.register("locator", Some("App\\Locator")).add_argument(Reference::typed(
            "App\\Missing",
            "App\\Missing",
            InvalidBehavior::RuntimeException,
            None,
        ));

        AutowirePass::new(true).process(&mut container).unwrap();

        let errored = ".errored.locator.App\\Missing";
        let argument = &container.definition("locator").unwrap().arguments()[0];
        assert_eq!(argument.as_reference().unwrap().id(), errored);
        assert_eq!(
            container.definition(errored).unwrap().errors(),
            ["Cannot autowire service \"locator\": it has type \"App\\Missing\" but this class was not found."]
        );
    }
}
