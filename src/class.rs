//! Static class metadata.
//!
//! Autowiring, named arguments, bindings and type checks need to know the
//! shape of the classes services are built from. That knowledge is supplied
//! up front as [`ClassMetadata`] registered in a [`ClassRegistry`]; no pass
//! ever inspects code at compile time.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::value::Value;

/// Interface implemented by classes declaring their subscribed services.
pub const SERVICE_SUBSCRIBER_INTERFACE: &str = "Symfony\\Contracts\\Service\\ServiceSubscriberInterface";
/// Interface of containers and service locators.
pub const CONTAINER_INTERFACE: &str = "Psr\\Container\\ContainerInterface";
/// Interface of service locators able to list what they provide.
pub const SERVICE_PROVIDER_INTERFACE: &str = "Symfony\\Contracts\\Service\\ServiceProviderInterface";
/// Class of generated service locators.
pub const SERVICE_LOCATOR_CLASS: &str = "Symfony\\Component\\DependencyInjection\\ServiceLocator";

const BUILTIN_TYPES: &[&str] = &[
    "int", "float", "string", "bool", "array", "iterable", "callable", "object", "mixed", "null", "false", "true",
    "void", "never", "self", "static", "parent",
];

/// True for types that cannot name a service.
pub fn is_builtin_type(ty: &str) -> bool {
    BUILTIN_TYPES.contains(&ty.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassKind {
    #[default]
    Class,
    Abstract,
    Interface,
}

/// One parameter of a constructor, method or function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMetadata {
    pub name: String,
    pub type_hint: Option<String>,
    pub nullable: bool,
    pub default: Option<Value>,
    pub variadic: bool,
}

impl ParameterMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
            nullable: false,
            default: None,
            variadic: false,
        }
    }

    pub fn typed(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            type_hint: Some(ty.into()),
            ..Self::new(name)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Type that can name a service; builtin types yield `None`.
    pub fn class_type(&self) -> Option<&str> {
        self.type_hint.as_deref().filter(|ty| !is_builtin_type(ty))
    }

    pub fn allows_null(&self) -> bool {
        self.nullable
            || matches!(self.type_hint.as_deref(), None | Some("mixed") | Some("null"))
            || matches!(self.default, Some(Value::Null))
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some() || self.variadic
    }
}

/// A constructor, method or function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodMetadata {
    pub name: String,
    pub parameters: Vec<ParameterMetadata>,
    pub public: bool,
    pub is_static: bool,
    /// Marked for setter injection during autowiring
    pub required: bool,
    /// Returns a modified clone (`static` return type)
    pub returns_static: bool,
    /// Value returned by a static method when evaluated at compile time
    pub static_value: Option<Value>,
}

impl MethodMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            public: true,
            is_static: false,
            required: false,
            returns_static: false,
            static_value: None,
        }
    }

    pub fn param(mut self, parameter: ParameterMetadata) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn params<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = ParameterMetadata>,
    {
        self.parameters.extend(parameters);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn wither(mut self) -> Self {
        self.returns_static = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    /// A static method evaluating to `value`.
    pub fn static_returning(mut self, value: impl Into<Value>) -> Self {
        self.is_static = true;
        self.static_value = Some(value.into());
        self
    }

    pub fn is_variadic(&self) -> bool {
        self.parameters.last().map_or(false, |p| p.variadic)
    }

    pub fn required_parameter_count(&self) -> usize {
        self.parameters
            .iter()
            .rposition(|p| !p.is_optional())
            .map_or(0, |last| last + 1)
    }
}

/// Entry of a service subscriber's map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribedService {
    /// Explicit key; list entries are keyed by their type
    pub key: Option<String>,
    /// Type, optionally prefixed with `?`
    pub type_hint: String,
}

/// Shape of one class or interface.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{ClassMetadata, ClassRegistry, ParameterMetadata};
///
/// let mut classes = ClassRegistry::new();
/// classes.register(ClassMetadata::interface("App\\MailerInterface"));
/// classes.register(
///     ClassMetadata::class("App\\SmtpMailer")
///         .implements("App\\MailerInterface")
///         .constructor([ParameterMetadata::typed("dsn", "string")]),
/// );
///
/// assert!(classes.is_subclass_of("App\\SmtpMailer", "App\\MailerInterface"));
/// assert_eq!(classes.constructor("App\\SmtpMailer").unwrap().1.parameters.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetadata {
    pub name: String,
    pub kind: ClassKind,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub constructor: Option<MethodMetadata>,
    pub methods: Vec<MethodMetadata>,
    pub subscribed_services: Vec<SubscribedService>,
}

impl ClassMetadata {
    fn with_kind(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            interfaces: Vec::new(),
            constructor: None,
            methods: Vec::new(),
            subscribed_services: Vec::new(),
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::with_kind(name, ClassKind::Class)
    }

    pub fn abstract_class(name: impl Into<String>) -> Self {
        Self::with_kind(name, ClassKind::Abstract)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_kind(name, ClassKind::Interface)
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Public constructor taking `parameters`.
    pub fn constructor<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = ParameterMetadata>,
    {
        self.constructor = Some(MethodMetadata::new("__construct").params(parameters));
        self
    }

    pub fn with_constructor(mut self, constructor: MethodMetadata) -> Self {
        self.constructor = Some(MethodMetadata {
            name: "__construct".to_string(),
            ..constructor
        });
        self
    }

    pub fn method(mut self, method: MethodMetadata) -> Self {
        self.methods.push(method);
        self
    }

    pub fn subscribes(mut self, key: Option<&str>, type_hint: impl Into<String>) -> Self {
        self.subscribed_services.push(SubscribedService {
            key: key.map(str::to_string),
            type_hint: type_hint.into(),
        });
        self
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    /// Concrete class whose constructor, if any, is public.
    pub fn is_instantiable(&self) -> bool {
        self.kind == ClassKind::Class && self.constructor.as_ref().map_or(true, |c| c.public)
    }

    /// `"interface"` or `"class"`, as used in messages.
    pub fn kind_label(&self) -> &'static str {
        if self.is_interface() {
            "interface"
        } else {
            "class"
        }
    }

    fn own_method(&self, name: &str) -> Option<&MethodMetadata> {
        if name.eq_ignore_ascii_case("__construct") {
            return self.constructor.as_ref();
        }
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// Every class and function known to the compiler.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: IndexMap<String, Arc<ClassMetadata>>,
    functions: IndexMap<String, Arc<MethodMetadata>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ClassMetadata) -> &mut Self {
        self.classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    /// Registers a plain function usable as a factory.
    pub fn register_function(&mut self, function: MethodMetadata) -> &mut Self {
        self.functions.insert(function.name.clone(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ClassMetadata> {
        self.classes.get(name.trim_start_matches('\\')).map(Arc::as_ref)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn function(&self, name: &str) -> Option<&MethodMetadata> {
        self.functions.get(name).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Parent classes, nearest first.
    pub fn parents(&self, class: &str) -> Vec<String> {
        let mut parents = Vec::new();
        let mut current = self.get(class).and_then(|c| c.parent.clone());
        while let Some(parent) = current {
            if parents.contains(&parent) || parent == class {
                break;
            }
            current = self.get(&parent).and_then(|c| c.parent.clone());
            parents.push(parent);
        }
        parents
    }

    /// Every interface implemented by `class`, its parents and their
    /// parent interfaces.
    pub fn interfaces(&self, class: &str) -> Vec<String> {
        let mut seen = IndexSet::new();
        let mut pending: Vec<String> = Vec::new();
        for owner in std::iter::once(class.to_string()).chain(self.parents(class)) {
            if let Some(meta) = self.get(&owner) {
                pending.extend(meta.interfaces.iter().cloned());
                if meta.is_interface() && owner != class {
                    pending.push(owner.clone());
                }
            }
        }
        while let Some(interface) = pending.pop() {
            if interface == class || !seen.insert(interface.clone()) {
                continue;
            }
            if let Some(meta) = self.get(&interface) {
                pending.extend(meta.interfaces.iter().cloned());
                pending.extend(meta.parent.iter().cloned());
            }
        }
        let mut interfaces: Vec<String> = seen.into_iter().collect();
        interfaces.sort();
        interfaces
    }

    /// True when `class` strictly extends or implements `ty`.
    pub fn is_subclass_of(&self, class: &str, ty: &str) -> bool {
        class != ty && (self.parents(class).iter().any(|p| p == ty) || self.interfaces(class).iter().any(|i| i == ty))
    }

    /// True when `class` is `ty` or one of its subtypes.
    pub fn is_a(&self, class: &str, ty: &str) -> bool {
        class == ty || self.is_subclass_of(class, ty)
    }

    /// Constructor of `class`, inherited from a parent if needed, along
    /// with the name of the declaring class.
    pub fn constructor(&self, class: &str) -> Option<(String, &MethodMetadata)> {
        self.method(class, "__construct")
    }

    /// Method `name` (case-insensitive) of `class` or one of its parents.
    pub fn method(&self, class: &str, name: &str) -> Option<(String, &MethodMetadata)> {
        std::iter::once(class.to_string())
            .chain(self.parents(class))
            .find_map(|owner| {
                let meta = self.classes.get(&owner)?;
                meta.own_method(name).map(|m| (owner.clone(), m))
            })
    }

    /// Every non-constructor method, own methods first, overridden
    /// parent methods skipped.
    pub fn methods(&self, class: &str) -> Vec<(String, &MethodMetadata)> {
        let mut methods: Vec<(String, &MethodMetadata)> = Vec::new();
        for owner in std::iter::once(class.to_string()).chain(self.parents(class)) {
            let Some(meta) = self.classes.get(&owner) else { continue };
            for method in &meta.methods {
                if !methods.iter().any(|(_, m)| m.name.eq_ignore_ascii_case(&method.name)) {
                    methods.push((owner.clone(), method));
                }
            }
        }
        methods
    }

    /// True when a method of a parent with the same name is required.
    pub(crate) fn is_required_method(&self, class: &str, name: &str) -> bool {
        std::iter::once(class.to_string())
            .chain(self.parents(class))
            .chain(self.interfaces(class))
            .filter_map(|owner| self.classes.get(&owner))
            .filter_map(|meta| meta.own_method(name))
            .any(|m| m.required)
    }
}
