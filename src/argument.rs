//! Argument wrappers: values whose instantiation is deferred or collected.

use std::sync::Arc;

use crate::value::{Value, ValueMap};

/// Special argument kinds understood by the passes.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A single service, instantiated on first use
    ServiceClosure(Box<Value>),
    /// A lazily iterated list of services
    Iterator(Arc<ValueMap>),
    /// A keyed collection of lazily instantiated services
    ServiceLocator(ServiceLocatorArgument),
    /// All services carrying a tag, sorted by priority
    TaggedIterator(TaggedIteratorArgument),
    /// Placeholder that must be replaced before the container is usable
    Abstract(String),
}

impl Argument {
    pub fn service_closure(value: impl Into<Value>) -> Self {
        Argument::ServiceClosure(Box::new(value.into()))
    }

    pub fn iterator<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        match Value::list(values) {
            Value::Array(map) => Argument::Iterator(map),
            _ => Argument::Iterator(Arc::default()),
        }
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Argument::TaggedIterator(TaggedIteratorArgument::new(tag))
    }

    /// The wrapped collection, if the wrapper holds one.
    pub fn values(&self) -> Option<&Arc<ValueMap>> {
        match self {
            Argument::Iterator(values) => Some(values),
            Argument::ServiceLocator(locator) => Some(&locator.values),
            Argument::TaggedIterator(tagged) => Some(&tagged.values),
            Argument::ServiceClosure(_) | Argument::Abstract(_) => None,
        }
    }

    /// Same wrapper around another collection.
    pub fn with_values(&self, values: Arc<ValueMap>) -> Self {
        match self {
            Argument::Iterator(_) => Argument::Iterator(values),
            Argument::ServiceLocator(locator) => Argument::ServiceLocator(ServiceLocatorArgument {
                values,
                tagged: locator.tagged.clone(),
            }),
            Argument::TaggedIterator(tagged) => Argument::TaggedIterator(TaggedIteratorArgument {
                values,
                ..tagged.clone()
            }),
            other => other.clone(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Argument::ServiceClosure(_) => "ServiceClosureArgument",
            Argument::Iterator(_) => "IteratorArgument",
            Argument::ServiceLocator(_) => "ServiceLocatorArgument",
            Argument::TaggedIterator(_) => "TaggedIteratorArgument",
            Argument::Abstract(_) => "AbstractArgument",
        }
    }
}

/// Keyed lazy collection; optionally filled from a tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceLocatorArgument {
    pub values: Arc<ValueMap>,
    pub tagged: Option<TaggedIteratorArgument>,
}

impl ServiceLocatorArgument {
    pub fn new(values: ValueMap) -> Self {
        Self {
            values: Arc::new(values),
            tagged: None,
        }
    }

    pub fn from_tag(tagged: TaggedIteratorArgument) -> Self {
        Self {
            values: Arc::default(),
            tagged: Some(tagged),
        }
    }
}

/// Collects every service tagged `tag`.
///
/// When an index attribute (or default index method) is configured the
/// collection is keyed; otherwise it is a plain list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaggedIteratorArgument {
    pub tag: String,
    pub index_attribute: Option<String>,
    pub default_index_method: Option<String>,
    pub default_priority_method: Option<String>,
    pub needs_indexes: bool,
    pub exclude: Vec<String>,
    pub values: Arc<ValueMap>,
}

impl TaggedIteratorArgument {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn index_by(mut self, attribute: impl Into<String>) -> Self {
        self.index_attribute = Some(attribute.into());
        self.needs_indexes = true;
        self
    }

    pub fn default_index_method(mut self, method: impl Into<String>) -> Self {
        self.default_index_method = Some(method.into());
        self.needs_indexes = true;
        self
    }

    pub fn default_priority_method(mut self, method: impl Into<String>) -> Self {
        self.default_priority_method = Some(method.into());
        self
    }

    pub fn exclude(mut self, id: impl Into<String>) -> Self {
        self.exclude.push(id.into());
        self
    }
}
