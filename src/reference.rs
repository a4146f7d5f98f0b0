//! References between services.

use std::fmt;

/// What happens when a reference points at a service that does not exist.
///
/// The declaration order matters: every behavior strictly greater than
/// [`InvalidBehavior::Exception`] tolerates a missing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum InvalidBehavior {
    /// Fail when the service is requested at runtime, not at compile time
    RuntimeException,
    /// Fail the compilation
    #[default]
    Exception,
    /// Inject `null`
    Null,
    /// Drop the argument, method call or property that holds the reference
    Ignore,
    /// Only inject the service if something else already instantiated it
    IgnoreUninitialized,
}

impl InvalidBehavior {
    /// True when a missing target is not an error.
    pub fn tolerates_missing(self) -> bool {
        self > InvalidBehavior::Exception
    }
}

/// A lazy pointer from one definition to another service id.
///
/// A reference may additionally carry the declared type of the parameter
/// it was created for (and that parameter's name). Such typed references
/// are produced by autowiring, tagged collections and service subscribers;
/// a typed reference whose id equals its type is still waiting for the
/// autowiring pass to pick a concrete service.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{InvalidBehavior, Reference};
///
/// let plain = Reference::new("logger");
/// assert_eq!(plain.id(), "logger");
/// assert_eq!(plain.invalid_behavior(), InvalidBehavior::Exception);
///
/// let typed = Reference::typed("App\\Logger", "App\\Logger", InvalidBehavior::Exception, Some("logger"));
/// assert!(typed.is_unresolved_type());
/// assert_eq!(typed.to_string(), "App\\Logger");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    id: String,
    invalid_behavior: InvalidBehavior,
    type_hint: Option<String>,
    name: Option<String>,
}

impl Reference {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_behavior(id, InvalidBehavior::Exception)
    }

    pub fn with_behavior(id: impl Into<String>, invalid_behavior: InvalidBehavior) -> Self {
        Self {
            id: id.into(),
            invalid_behavior,
            type_hint: None,
            name: None,
        }
    }

    /// Creates a reference carrying its declared type and parameter name.
    pub fn typed(
        id: impl Into<String>,
        type_hint: impl Into<String>,
        invalid_behavior: InvalidBehavior,
        name: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            invalid_behavior,
            type_hint: Some(type_hint.into()),
            name: name.map(str::to_string),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn invalid_behavior(&self) -> InvalidBehavior {
        self.invalid_behavior
    }

    pub fn type_hint(&self) -> Option<&str> {
        self.type_hint.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_typed(&self) -> bool {
        self.type_hint.is_some()
    }

    /// A typed reference whose target is still its own type.
    pub fn is_unresolved_type(&self) -> bool {
        self.type_hint.as_deref() == Some(self.id.as_str())
    }

    /// Same reference, pointing at another id.
    pub fn retarget(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for Reference {
    fn from(id: &str) -> Self {
        Reference::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behaviors_above_exception_tolerate_missing_targets() {
        assert!(!InvalidBehavior::RuntimeException.tolerates_missing());
        assert!(!InvalidBehavior::Exception.tolerates_missing());
        assert!(InvalidBehavior::Null.tolerates_missing());
        assert!(InvalidBehavior::Ignore.tolerates_missing());
        assert!(InvalidBehavior::IgnoreUninitialized.tolerates_missing());
    }

    #[test]
    fn retarget_keeps_type_information() {
        let typed = Reference::typed("Foo", "Foo", InvalidBehavior::Null, Some("foo"));
        let moved = typed.retarget("foo.impl");
        assert_eq!(moved.id(), "foo.impl");
        assert_eq!(moved.type_hint(), Some("Foo"));
        assert_eq!(moved.name(), Some("foo"));
        assert_eq!(moved.invalid_behavior(), InvalidBehavior::Null);
        assert!(!moved.is_unresolved_type());
    }
}
