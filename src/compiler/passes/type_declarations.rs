use indexmap::IndexSet;

use crate::argument::Argument;
use crate::class::{ParameterMetadata, SERVICE_LOCATOR_CLASS};
use crate::compiler::{
    class_of, constructor_of, method_of, process_definitions, walk_children, CompilerPass, RecursivePass, Signature,
    WalkContext,
};
use crate::container::ContainerBuilder;
use crate::definition::Definition;
use crate::error::{CompileError, CompileResult};
use crate::value::{ArgKey, Value, ValueMap};

const CLOSURE_CLASS: &str = "Closure";
const GENERATOR_CLASS: &str = "Symfony\\Component\\DependencyInjection\\Argument\\RewindableGenerator";
const LOCATOR_TYPES: &[&str] = &[
    SERVICE_LOCATOR_CLASS,
    "Psr\\Container\\ContainerInterface",
    "Symfony\\Contracts\\Service\\ServiceProviderInterface",
];

/// What an argument evaluates to, as far as types go.
#[derive(Debug, Clone, PartialEq)]
enum Checked {
    Null,
    Bool(bool),
    Int,
    Float,
    String,
    Array(Option<Value>),
    Object(String),
}

impl Checked {
    fn describe(&self) -> &str {
        match self {
            Checked::Null => "null",
            Checked::Bool(_) => "bool",
            Checked::Int => "int",
            Checked::Float => "float",
            Checked::String => "string",
            Checked::Array(_) => "array",
            Checked::Object(class) => class,
        }
    }
}

/// Checks constructor and method-call arguments against the declared
/// parameter types of the class metadata.
///
/// Values are typed the way they will be at runtime: references by the
/// class of the service they point at, closures as `Closure`, iterators as
/// a traversable generator and locators as a service locator. Integers are
/// accepted for `float`, objects with `__toString` for `string` and
/// invokable objects for `callable`.
///
/// Without `autoload`, definitions and referenced services whose class is
/// not registered are not checked. With it, an unregistered class of a
/// checked definition is an error.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CheckTypeDeclarationsPass, ClassMetadata, CompilerPass, ContainerBuilder, ParameterMetadata, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.register_class(
///     ClassMetadata::class("App\\Mailer").constructor([ParameterMetadata::typed("port", "int")]),
/// );
/// container.register("mailer", Some("App\\Mailer")).add_argument(Value::from("25"));
///
/// let err = CheckTypeDeclarationsPass::new(true).process(&mut container).unwrap_err();
/// assert_eq!(
///     err.to_string(),
///     "Invalid definition for service \"mailer\": argument 1 of \"App\\Mailer::__construct()\" accepts \"int\", \"string\" passed."
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct CheckTypeDeclarationsPass {
    autoload: bool,
    skipped_ids: IndexSet<String>,
}

impl CheckTypeDeclarationsPass {
    pub fn new(autoload: bool) -> Self {
        Self {
            autoload,
            skipped_ids: IndexSet::new(),
        }
    }

    /// Leaves the definitions with these ids unchecked.
    pub fn skipping<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    fn check_definition(&self, cx: &WalkContext<'_>, definition: &Definition) -> CompileResult<()> {
        let container = &*cx.container;
        let Some(class) = definition.class() else {
            return Ok(());
        };
        if class == SERVICE_LOCATOR_CLASS || definition.is_abstract() {
            return Ok(());
        }
        if !self.autoload && !container.classes().exists(class) {
            return Ok(());
        }

        if let Some(constructor) = constructor_of(container, &cx.current_id, definition, false)? {
            self.check_signature(cx, &constructor, definition.arguments())?;
        }
        for call in definition.method_calls() {
            let method = match method_of(container, &cx.current_id, definition, &call.method) {
                Ok(method) => method,
                Err(_) if definition.factory().is_some() => continue,
                Err(err) => return Err(err),
            };
            self.check_signature(cx, &method, &call.arguments)?;
        }
        Ok(())
    }

    fn check_signature(&self, cx: &WalkContext<'_>, signature: &Signature, values: &ValueMap) -> CompileResult<()> {
        let method = &signature.method;
        let label = match &signature.class {
            Some(class) => format!("{}::{}", class, method.name),
            None => method.name.clone(),
        };
        let required = method.required_parameter_count();
        if values.len() < required {
            return Err(CompileError::invalid(format!(
                "Invalid definition for service \"{}\": \"{}()\" requires {} arguments, {} passed.",
                cx.current_id,
                label,
                required,
                values.len()
            )));
        }

        let checks = method.parameters.len().min(values.len());
        for (position, parameter) in method.parameters.iter().take(checks).enumerate() {
            if parameter.type_hint.is_none() || parameter.variadic {
                continue;
            }
            let value = values
                .get(&ArgKey::Named(parameter.name.clone()))
                .or_else(|| values.get(&ArgKey::Index(position)));
            if let Some(value) = value {
                self.check_type(cx, &label, position, parameter, value)?;
            }
        }

        if let Some(last) = method.parameters.last().filter(|p| p.variadic && p.type_hint.is_some()) {
            let position = method.parameters.len() - 1;
            for value in values.values().skip(position) {
                self.check_type(cx, &label, position, last, value)?;
            }
        }
        Ok(())
    }

    fn check_type(
        &self,
        cx: &WalkContext<'_>,
        label: &str,
        position: usize,
        parameter: &ParameterMetadata,
        value: &Value,
    ) -> CompileResult<()> {
        let Some(declared) = parameter.type_hint.as_deref() else {
            return Ok(());
        };
        let Some(checked) = self.checked_type(cx.container, value)? else {
            return Ok(());
        };
        if checked == Checked::Null && parameter.allows_null() {
            return Ok(());
        }
        let declared = declared.trim_start_matches('?');
        let accepted = declared
            .split('|')
            .any(|member| member.split('&').all(|ty| self.accepts(cx.container, ty.trim(), &checked)));
        if accepted {
            return Ok(());
        }
        let shown = if parameter.nullable && !declared.contains('|') {
            format!("?{}", declared)
        } else {
            declared.to_string()
        };
        Err(CompileError::invalid(format!(
            "Invalid definition for service \"{}\": argument {} of \"{}()\" accepts \"{}\", \"{}\" passed.",
            cx.current_id,
            position + 1,
            label,
            shown,
            checked.describe()
        )))
    }

    /// Type of `value`, or `None` when it cannot be known at compile time.
    fn checked_type(&self, container: &ContainerBuilder, value: &Value) -> CompileResult<Option<Checked>> {
        let class = match value {
            Value::Null => return Ok(Some(Checked::Null)),
            Value::Bool(flag) => return Ok(Some(Checked::Bool(*flag))),
            Value::Int(_) => return Ok(Some(Checked::Int)),
            Value::Float(_) => return Ok(Some(Checked::Float)),
            Value::String(s) if s.contains("%env(") => return Ok(None),
            Value::String(_) => return Ok(Some(Checked::String)),
            Value::Array(map) => return Ok(Some(Checked::Array(map.values().next().cloned()))),
            Value::Argument(Argument::ServiceClosure(_)) => CLOSURE_CLASS.to_string(),
            Value::Argument(Argument::Iterator(_)) | Value::Argument(Argument::TaggedIterator(_)) => {
                GENERATOR_CLASS.to_string()
            }
            Value::Argument(Argument::ServiceLocator(_)) => SERVICE_LOCATOR_CLASS.to_string(),
            Value::Argument(Argument::Abstract(_)) => return Ok(None),
            Value::Reference(reference) => {
                let Ok(target) = container.find_definition(reference.id()) else {
                    return Ok(None);
                };
                match class_of(container, target)? {
                    Some(class) => class,
                    None => return Ok(None),
                }
            }
            Value::Definition(definition) => match class_of(container, definition)? {
                Some(class) => class,
                None => return Ok(None),
            },
        };
        let builtin = [CLOSURE_CLASS, GENERATOR_CLASS, SERVICE_LOCATOR_CLASS].contains(&class.as_str());
        if !self.autoload && !builtin && !container.classes().exists(&class) {
            return Ok(None);
        }
        Ok(Some(Checked::Object(class)))
    }

    fn accepts(&self, container: &ContainerBuilder, ty: &str, checked: &Checked) -> bool {
        let classes = container.classes();
        match (ty.to_ascii_lowercase().as_str(), checked) {
            ("mixed", _) => true,
            ("null", Checked::Null) => true,
            ("bool", Checked::Bool(_)) => true,
            ("false", Checked::Bool(false)) | ("true", Checked::Bool(true)) => true,
            ("int", Checked::Int) => true,
            ("float", Checked::Int | Checked::Float) => true,
            ("string", Checked::String) => true,
            ("string", Checked::Object(class)) => classes.method(class, "__toString").is_some(),
            ("array" | "iterable", Checked::Array(_)) => true,
            ("iterable", Checked::Object(class)) => {
                class == GENERATOR_CLASS || classes.is_a(class, "Traversable")
            }
            ("callable", Checked::Array(first)) => matches!(
                first,
                Some(Value::Reference(_)) | Some(Value::Definition(_)) | Some(Value::String(_))
            ),
            ("callable", Checked::Object(class)) => {
                class == CLOSURE_CLASS || classes.method(class, "__invoke").is_some()
            }
            ("object", Checked::Object(_)) => true,
            (_, Checked::Object(class)) => {
                let ty = ty.trim_start_matches('\\');
                if class == GENERATOR_CLASS {
                    return ty == GENERATOR_CLASS || ty == "Traversable" || ty == "Countable";
                }
                if class == SERVICE_LOCATOR_CLASS {
                    return LOCATOR_TYPES.contains(&ty);
                }
                classes.is_a(class, ty)
            }
            _ => false,
        }
    }
}

impl RecursivePass for CheckTypeDeclarationsPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        if self.skipped_ids.contains(&cx.current_id) {
            return Ok(None);
        }
        if let Value::Definition(definition) = value {
            if !definition.has_errors() && !definition.is_deprecated() {
                self.check_definition(cx, definition)?;
            }
        }
        walk_children(self, cx, value)
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for CheckTypeDeclarationsPass {
    fn name(&self) -> &'static str {
        "CheckTypeDeclarationsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}
