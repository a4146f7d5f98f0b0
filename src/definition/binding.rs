//! Bound arguments: explicit values for parameters matched by type or name.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Value;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Where a binding was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingKind {
    /// On the service itself
    #[default]
    Service,
    /// In the `_defaults` section of a loader
    Defaults,
    /// On an `_instanceof` conditional
    Instanceof,
}

/// A value bound to every parameter matching a binding key.
///
/// Binding keys have three forms: `$name`, `Type` and `Type $name`. Copies
/// of a binding (made when a child definition inherits it, for example)
/// share the same [`identifier`](BoundArgument::identifier), which is how
/// the binding resolver decides that a binding was used somewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgument {
    value: Value,
    identifier: u64,
    used: bool,
    kind: BindingKind,
    file: Option<String>,
}

impl BoundArgument {
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_kind(value, BindingKind::Service, None)
    }

    pub fn with_kind(value: impl Into<Value>, kind: BindingKind, file: Option<&str>) -> Self {
        Self {
            value: value.into(),
            identifier: SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1,
            used: false,
            kind,
            file: file.map(str::to_string),
        }
    }

    /// A binding that never triggers the unused-binding error.
    pub fn used(value: impl Into<Value>) -> Self {
        let mut binding = Self::new(value);
        binding.used = true;
        binding
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Same binding identity around another value.
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

/// Normalizes `Type   $name` into `Type $name`.
pub(crate) fn normalize_binding_key(key: &str) -> String {
    match key.find('$') {
        Some(pos) if pos > 0 => {
            let ty = key[..pos].trim_end_matches([' ', '\t']);
            format!("{} {}", ty, &key[pos..])
        }
        _ => key.to_string(),
    }
}
