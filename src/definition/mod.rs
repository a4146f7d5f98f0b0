//! Service definitions.
//!
//! A [`Definition`] describes how to build one service: its class,
//! constructor arguments, method calls, properties, tags and lifecycle
//! flags. A definition with a [`parent`](Definition::parent) is a *child
//! definition*; it only records what it changes relative to its parent and
//! is flattened by the child-definition pass.

mod alias;
mod binding;

use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::error::{CompileError, CompileResult};
use crate::reference::InvalidBehavior;
use crate::value::{push_positional, ArgKey, Value, ValueMap};

pub use alias::{Alias, DEFAULT_ALIAS_DEPRECATION_TEMPLATE};
pub(crate) use alias::check_alias_id;
pub use binding::{BindingKind, BoundArgument};
pub(crate) use binding::normalize_binding_key;

pub const DEFAULT_DEPRECATION_TEMPLATE: &str =
    "The \"%service_id%\" service is deprecated. You should stop using it, as it will be removed in the future.";

/// Attributes of one tag occurrence.
pub type TagAttributes = IndexMap<String, Value>;

bitflags! {
    /// Attributes explicitly assigned on a definition.
    ///
    /// Child definitions override their parent exactly for the flags set
    /// here; everything else is inherited.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Changes: u16 {
        const CLASS = 1;
        const FILE = 1 << 1;
        const FACTORY = 1 << 2;
        const CONFIGURATOR = 1 << 3;
        const SHARED = 1 << 4;
        const PUBLIC = 1 << 5;
        const LAZY = 1 << 6;
        const DEPRECATED = 1 << 7;
        const AUTOWIRED = 1 << 8;
        const DECORATED_SERVICE = 1 << 9;
        const AUTOCONFIGURED = 1 << 10;
    }
}

/// A factory or configurator.
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    /// Plain function name
    Function(String),
    /// Method on a target: `Null` (the service's own class), a class name,
    /// a [`Reference`](crate::Reference) or an inline [`Definition`]
    Method(Value, String),
}

impl Callable {
    /// `Class::method`
    pub fn static_method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Callable::Method(Value::String(class.into()), method.into())
    }

    /// `@service->method`
    pub fn service_method(id: impl Into<String>, method: impl Into<String>) -> Self {
        Callable::Method(Value::reference(id), method.into())
    }

    /// Static method of the definition's own class, resolved later.
    pub fn own_class(method: impl Into<String>) -> Self {
        Callable::Method(Value::Null, method.into())
    }

    pub fn target(&self) -> Option<&Value> {
        match self {
            Callable::Method(target, _) => Some(target),
            Callable::Function(_) => None,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Callable::Method(_, method) => method,
            Callable::Function(name) => name,
        }
    }
}

/// A method call made after instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Arc<ValueMap>,
    /// The method returns a modified clone ("wither")
    pub returns_clone: bool,
}

impl MethodCall {
    pub fn new<I>(method: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::with_arguments(
            method,
            arguments.into_iter().enumerate().map(|(i, v)| (ArgKey::Index(i), v)).collect(),
        )
    }

    pub fn with_arguments(method: impl Into<String>, arguments: ValueMap) -> Self {
        Self {
            method: method.into(),
            arguments: Arc::new(arguments),
            returns_clone: false,
        }
    }

    pub fn wither(mut self) -> Self {
        self.returns_clone = true;
        self
    }
}

/// Deprecation notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deprecation {
    pub package: String,
    pub version: String,
    pub message: String,
}

impl Deprecation {
    pub(crate) fn render(&self, placeholder: &str, id: &str) -> Deprecation {
        Deprecation {
            message: self.message.replace(placeholder, id),
            ..self.clone()
        }
    }
}

pub(crate) fn validate_template(message: &str, placeholder: &str, default: &str) -> CompileResult<String> {
    if message.is_empty() {
        return Ok(default.to_string());
    }
    if message.contains(['\r', '\n']) || message.contains("*/") {
        return Err(CompileError::invalid("Invalid characters found in deprecation template."));
    }
    if !message.contains(placeholder) {
        return Err(CompileError::invalid(format!(
            "The deprecation template must contain the \"{}\" placeholder.",
            placeholder
        )));
    }
    Ok(message.to_string())
}

/// Service being decorated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub inner: String,
    /// Id the decorated service is moved to, `<decorator>.inner` by default
    pub renamed: Option<String>,
    pub priority: i32,
    pub invalid_behavior: InvalidBehavior,
}

/// Blueprint of one service.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Definition, Reference, Value};
///
/// let mut mailer = Definition::with_class("App\\Mailer");
/// mailer
///     .add_argument(Value::from("smtp://localhost"))
///     .add_argument(Reference::new("logger"))
///     .add_tag("app.mailer")
///     .set_public(true);
///
/// assert_eq!(mailer.class(), Some("App\\Mailer"));
/// assert_eq!(mailer.arguments().len(), 2);
/// assert!(mailer.has_tag("app.mailer"));
/// assert!(mailer.is_shared());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub(crate) class: Option<String>,
    pub(crate) file: Option<String>,
    pub(crate) factory: Option<Callable>,
    pub(crate) configurator: Option<Callable>,
    pub(crate) arguments: Arc<ValueMap>,
    pub(crate) properties: Arc<ValueMap>,
    pub(crate) calls: Vec<MethodCall>,
    pub(crate) instanceof: IndexMap<String, Definition>,
    pub(crate) tags: IndexMap<String, Vec<TagAttributes>>,
    pub(crate) bindings: IndexMap<String, BoundArgument>,
    pub(crate) deprecation: Option<Deprecation>,
    pub(crate) decorated: Option<Decoration>,
    pub(crate) autowiring_types: Vec<String>,
    pub(crate) errors: Vec<String>,
    pub(crate) parent: Option<String>,
    pub(crate) changes: Changes,
    pub(crate) shared: bool,
    pub(crate) public: bool,
    pub(crate) synthetic: bool,
    pub(crate) abstract_: bool,
    pub(crate) lazy: bool,
    pub(crate) autowired: bool,
    pub(crate) autoconfigured: bool,
    pub(crate) inherit_tags: bool,
    pub(crate) inner_service_id: Option<String>,
    pub(crate) decoration_on_invalid: Option<InvalidBehavior>,
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            class: None,
            file: None,
            factory: None,
            configurator: None,
            arguments: Arc::default(),
            properties: Arc::default(),
            calls: Vec::new(),
            instanceof: IndexMap::new(),
            tags: IndexMap::new(),
            bindings: IndexMap::new(),
            deprecation: None,
            decorated: None,
            autowiring_types: Vec::new(),
            errors: Vec::new(),
            parent: None,
            changes: Changes::empty(),
            shared: true,
            public: false,
            synthetic: false,
            abstract_: false,
            lazy: false,
            autowired: false,
            autoconfigured: false,
            inherit_tags: false,
            inner_service_id: None,
            decoration_on_invalid: None,
        }
    }
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(class: impl Into<String>) -> Self {
        let mut definition = Self::default();
        definition.set_class(Some(class.into()));
        definition
    }

    /// A child definition inheriting from `parent`.
    pub fn child(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::default()
        }
    }

    // ----- class, file, factory, configurator -----

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn set_class(&mut self, class: Option<String>) -> &mut Self {
        self.changes |= Changes::CLASS;
        self.class = class;
        self
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn set_file(&mut self, file: Option<String>) -> &mut Self {
        self.changes |= Changes::FILE;
        self.file = file;
        self
    }

    pub fn factory(&self) -> Option<&Callable> {
        self.factory.as_ref()
    }

    pub fn set_factory(&mut self, factory: Option<Callable>) -> &mut Self {
        self.changes |= Changes::FACTORY;
        self.factory = factory;
        self
    }

    pub fn configurator(&self) -> Option<&Callable> {
        self.configurator.as_ref()
    }

    pub fn set_configurator(&mut self, configurator: Option<Callable>) -> &mut Self {
        self.changes |= Changes::CONFIGURATOR;
        self.configurator = configurator;
        self
    }

    // ----- arguments -----

    pub fn arguments(&self) -> &ValueMap {
        &self.arguments
    }

    /// Shared handle on the argument map; identity survives untouched passes.
    pub fn arguments_arc(&self) -> &Arc<ValueMap> {
        &self.arguments
    }

    pub fn set_arguments(&mut self, arguments: ValueMap) -> &mut Self {
        self.arguments = Arc::new(arguments);
        self
    }

    pub fn add_argument(&mut self, value: impl Into<Value>) -> &mut Self {
        push_positional(Arc::make_mut(&mut self.arguments), value.into());
        self
    }

    pub fn set_argument(&mut self, key: impl Into<ArgKey>, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.arguments).insert(key.into(), value.into());
        self
    }

    /// Replaces an existing argument.
    ///
    /// On a child definition a positional key is recorded as `index_N`, to
    /// be applied over the parent's argument N during flattening.
    pub fn replace_argument(&mut self, key: impl Into<ArgKey>, value: impl Into<Value>) -> CompileResult<&mut Self> {
        let key = key.into();
        let value = value.into();
        if self.parent.is_some() {
            let key = match key {
                ArgKey::Index(index) | ArgKey::Replace(index) => ArgKey::Replace(index),
                ArgKey::Named(name) if name.starts_with('$') => ArgKey::Named(name),
                ArgKey::Named(_) => {
                    return Err(CompileError::invalid(
                        "The argument must be an existing index or the name of a constructor's parameter.",
                    ))
                }
            };
            Arc::make_mut(&mut self.arguments).insert(key, value);
            return Ok(self);
        }
        if self.arguments.is_empty() {
            return Err(CompileError::OutOfBounds(
                "Cannot replace arguments if none have been configured yet.".to_string(),
            ));
        }
        if let ArgKey::Index(index) = key {
            if index > self.arguments.len() - 1 {
                return Err(CompileError::OutOfBounds(format!(
                    "The index \"{}\" is not in the range [0, {}].",
                    index,
                    self.arguments.len() - 1
                )));
            }
        }
        if !self.arguments.contains_key(&key) {
            return Err(CompileError::OutOfBounds(format!("The argument \"{}\" doesn't exist.", key)));
        }
        Arc::make_mut(&mut self.arguments).insert(key, value);
        Ok(self)
    }

    pub fn argument(&self, key: impl Into<ArgKey>) -> CompileResult<&Value> {
        let key = key.into();
        self.arguments
            .get(&key)
            .ok_or_else(|| CompileError::OutOfBounds(format!("The argument \"{}\" doesn't exist.", key)))
    }

    // ----- properties -----

    pub fn properties(&self) -> &ValueMap {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: ValueMap) -> &mut Self {
        self.properties = Arc::new(properties);
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.properties).insert(ArgKey::Named(name.into()), value.into());
        self
    }

    // ----- method calls -----

    pub fn method_calls(&self) -> &[MethodCall] {
        &self.calls
    }

    pub fn set_method_calls(&mut self, calls: Vec<MethodCall>) -> &mut Self {
        self.calls = calls;
        self
    }

    pub fn add_method_call(&mut self, call: MethodCall) -> CompileResult<&mut Self> {
        if call.method.is_empty() {
            return Err(CompileError::invalid("Method name cannot be empty."));
        }
        self.calls.push(call);
        Ok(self)
    }

    pub fn remove_method_call(&mut self, method: &str) -> &mut Self {
        self.calls.retain(|call| call.method != method);
        self
    }

    pub fn has_method_call(&self, method: &str) -> bool {
        self.calls.iter().any(|call| call.method == method)
    }

    // ----- instanceof conditionals -----

    pub fn instanceof_conditionals(&self) -> &IndexMap<String, Definition> {
        &self.instanceof
    }

    pub fn set_instanceof_conditionals(&mut self, conditionals: IndexMap<String, Definition>) -> &mut Self {
        self.instanceof = conditionals;
        self
    }

    /// Template applied when this definition's class is a subtype of `ty`.
    pub fn instanceof_mut(&mut self, ty: impl Into<String>) -> &mut Definition {
        self.instanceof.entry(ty.into()).or_default()
    }

    pub fn is_autoconfigured(&self) -> bool {
        self.autoconfigured
    }

    pub fn set_autoconfigured(&mut self, autoconfigured: bool) -> &mut Self {
        self.changes |= Changes::AUTOCONFIGURED;
        self.autoconfigured = autoconfigured;
        self
    }

    // ----- tags -----

    pub fn tags(&self) -> &IndexMap<String, Vec<TagAttributes>> {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: IndexMap<String, Vec<TagAttributes>>) -> &mut Self {
        self.tags = tags;
        self
    }

    pub fn tag(&self, name: &str) -> &[TagAttributes] {
        self.tags.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn add_tag(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_tag_with(name, TagAttributes::new())
    }

    pub fn add_tag_with(&mut self, name: impl Into<String>, attributes: TagAttributes) -> &mut Self {
        self.tags.entry(name.into()).or_default().push(attributes);
        self
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn clear_tag(&mut self, name: &str) -> &mut Self {
        self.tags.shift_remove(name);
        self
    }

    pub fn clear_tags(&mut self) -> &mut Self {
        self.tags.clear();
        self
    }

    // ----- flags -----

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn set_shared(&mut self, shared: bool) -> &mut Self {
        self.changes |= Changes::SHARED;
        self.shared = shared;
        self
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_private(&self) -> bool {
        !self.public
    }

    pub fn set_public(&mut self, public: bool) -> &mut Self {
        self.changes |= Changes::PUBLIC;
        self.public = public;
        self
    }

    pub fn set_private(&mut self, private: bool) -> &mut Self {
        self.set_public(!private)
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Synthetic services are injected at runtime and have no blueprint.
    pub fn set_synthetic(&mut self, synthetic: bool) -> &mut Self {
        self.synthetic = synthetic;
        if !self.changes.contains(Changes::PUBLIC) {
            self.public = true;
        }
        self
    }

    pub fn is_abstract(&self) -> bool {
        self.abstract_
    }

    pub fn set_abstract(&mut self, abstract_: bool) -> &mut Self {
        self.abstract_ = abstract_;
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn set_lazy(&mut self, lazy: bool) -> &mut Self {
        self.changes |= Changes::LAZY;
        self.lazy = lazy;
        self
    }

    pub fn is_autowired(&self) -> bool {
        self.autowired
    }

    pub fn set_autowired(&mut self, autowired: bool) -> &mut Self {
        self.changes |= Changes::AUTOWIRED;
        self.autowired = autowired;
        self
    }

    pub fn autowiring_types(&self) -> &[String] {
        &self.autowiring_types
    }

    /// Declares that this service is the autowiring candidate for `ty`.
    pub fn add_autowiring_type(&mut self, ty: impl Into<String>) -> &mut Self {
        let ty = ty.into();
        if !self.autowiring_types.contains(&ty) {
            self.autowiring_types.push(ty);
        }
        self
    }

    // ----- deprecation -----

    /// Marks the definition deprecated.
    ///
    /// The message template must mention `%service_id%`; an empty message
    /// selects [`DEFAULT_DEPRECATION_TEMPLATE`].
    pub fn set_deprecated(&mut self, package: &str, version: &str, message: &str) -> CompileResult<&mut Self> {
        let message = validate_template(message, "%service_id%", DEFAULT_DEPRECATION_TEMPLATE)?;
        self.changes |= Changes::DEPRECATED;
        self.deprecation = Some(Deprecation {
            package: package.to_string(),
            version: version.to_string(),
            message,
        });
        Ok(self)
    }

    pub fn clear_deprecation(&mut self) -> &mut Self {
        self.changes |= Changes::DEPRECATED;
        self.deprecation = None;
        self
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation.is_some()
    }

    /// Deprecation with `%service_id%` replaced by `id`.
    pub fn deprecation(&self, id: &str) -> Option<Deprecation> {
        self.deprecation.as_ref().map(|d| d.render("%service_id%", id))
    }

    // ----- decoration -----

    pub fn decorated_service(&self) -> Option<&Decoration> {
        self.decorated.as_ref()
    }

    /// Declares that this service decorates `inner`.
    ///
    /// Passing `None` removes a previous decoration.
    pub fn set_decorated_service(
        &mut self,
        inner: Option<&str>,
        renamed: Option<&str>,
        priority: i32,
        invalid_behavior: InvalidBehavior,
    ) -> CompileResult<&mut Self> {
        if let (Some(inner), Some(renamed)) = (inner, renamed) {
            if inner == renamed {
                return Err(CompileError::invalid(format!(
                    "The decorated service inner name for \"{}\" must be different than the service name itself.",
                    inner
                )));
            }
        }
        self.changes |= Changes::DECORATED_SERVICE;
        self.decorated = inner.map(|inner| Decoration {
            inner: inner.to_string(),
            renamed: renamed.map(str::to_string),
            priority,
            invalid_behavior,
        });
        Ok(self)
    }

    pub(crate) fn set_decoration(&mut self, decoration: Option<Decoration>) -> &mut Self {
        self.changes |= Changes::DECORATED_SERVICE;
        self.decorated = decoration;
        self
    }

    /// Id the decorated service was moved to, once decoration is resolved.
    pub fn inner_service_id(&self) -> Option<&str> {
        self.inner_service_id.as_deref()
    }

    pub fn decoration_on_invalid(&self) -> Option<InvalidBehavior> {
        self.decoration_on_invalid
    }

    // ----- bindings -----

    pub fn bindings(&self) -> &IndexMap<String, BoundArgument> {
        &self.bindings
    }

    pub fn set_bindings(&mut self, bindings: IndexMap<String, BoundArgument>) -> &mut Self {
        self.bindings = bindings
            .into_iter()
            .map(|(key, binding)| (normalize_binding_key(&key), binding))
            .collect();
        self
    }

    /// Binds `value` to every parameter matching `key`.
    pub fn bind(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.bindings.insert(normalize_binding_key(key), BoundArgument::new(value));
        self
    }

    // ----- errors -----

    pub fn add_error(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(message.into());
        self
    }

    /// Copies every error recorded on `other`.
    pub fn add_errors_from(&mut self, other: &Definition) -> &mut Self {
        self.errors.extend(other.errors.iter().cloned());
        self
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    // ----- inheritance -----

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn set_parent(&mut self, parent: Option<String>) -> &mut Self {
        self.parent = parent;
        self
    }

    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    pub fn inherits_tags(&self) -> bool {
        self.inherit_tags
    }

    /// Child definitions also receive their parent's tags.
    pub fn set_inherit_tags(&mut self, inherit: bool) -> &mut Self {
        self.inherit_tags = inherit;
        self
    }

    pub fn changes(&self) -> Changes {
        self.changes
    }

    pub fn set_changes(&mut self, changes: Changes) -> &mut Self {
        self.changes = changes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    #[test]
    fn setters_record_changes() {
        let mut def = Definition::new();
        assert!(def.changes().is_empty());
        def.set_public(true).set_lazy(true).set_abstract(true);
        assert_eq!(def.changes(), Changes::PUBLIC | Changes::LAZY);
        assert!(Definition::with_class("Foo").changes().contains(Changes::CLASS));
    }

    #[test]
    fn replace_argument_on_child_records_index_marker() {
        let mut child = Definition::child("parent");
        child.replace_argument(1, "b2").unwrap();
        assert_eq!(child.arguments().get(&ArgKey::Replace(1)), Some(&Value::from("b2")));
        assert!(child.replace_argument("foo", Value::Null).is_err());
    }

    #[test]
    fn replace_argument_checks_bounds() {
        let mut def = Definition::new();
        let err = def.replace_argument(0, "x").unwrap_err();
        assert_eq!(err.to_string(), "Cannot replace arguments if none have been configured yet.");

        def.add_argument("a");
        let err = def.replace_argument(3, "x").unwrap_err();
        assert_eq!(err.to_string(), "The index \"3\" is not in the range [0, 0].");
        def.replace_argument(0, "z").unwrap();
        assert_eq!(def.argument(0).unwrap(), &Value::from("z"));
    }

    #[test]
    fn deprecation_template_must_name_the_service() {
        let mut def = Definition::new();
        let err = def.set_deprecated("acme/pkg", "1.2", "gone").unwrap_err();
        assert_eq!(err.to_string(), "The deprecation template must contain the \"%service_id%\" placeholder.");
        def.set_deprecated("acme/pkg", "1.2", "").unwrap();
        let deprecation = def.deprecation("mailer").unwrap();
        assert!(deprecation.message.starts_with("The \"mailer\" service is deprecated."));
    }

    #[test]
    fn decoration_rejects_identical_inner_name() {
        let mut def = Definition::new();
        let err = def
            .set_decorated_service(Some("foo"), Some("foo"), 0, InvalidBehavior::Exception)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The decorated service inner name for \"foo\" must be different than the service name itself."
        );
    }

    #[test]
    fn bindings_are_normalized() {
        let mut def = Definition::new();
        def.bind("Foo   $bar", Reference::new("baz"));
        assert!(def.bindings().contains_key("Foo $bar"));
    }

    #[test]
    fn synthetic_services_default_to_public() {
        let mut def = Definition::new();
        def.set_synthetic(true);
        assert!(def.is_public());

        let mut private = Definition::new();
        private.set_public(false).set_synthetic(true);
        assert!(private.is_private());
    }
}
