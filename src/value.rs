//! Argument values: the nodes of a definition forest.
//!
//! Every slot of a [`Definition`] (constructor arguments, method-call
//! arguments, properties, factory and configurator targets) holds a
//! [`Value`]. Arrays and nested definitions are reference counted so that a
//! pass rewriting one leaf only copies the path from the root to that leaf;
//! untouched subtrees keep their pointer identity (see [`Value::same`]).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::argument::Argument;
use crate::definition::Definition;
use crate::reference::Reference;

/// Key of an argument, property or array entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgKey {
    /// Positional slot
    Index(usize),
    /// `index_N`: replaces the parent's positional argument N in a child definition
    Replace(usize),
    /// `$name`, `Type`, `Type $name`, a property name or an array key
    Named(String),
}

impl ArgKey {
    /// Parses the textual forms `"3"`, `"index_3"` and anything else.
    pub fn parse(key: &str) -> Self {
        if let Ok(index) = key.parse::<usize>() {
            return ArgKey::Index(index);
        }
        if let Some(rest) = key.strip_prefix("index_") {
            if let Ok(index) = rest.parse::<usize>() {
                return ArgKey::Replace(index);
            }
        }
        ArgKey::Named(key.to_string())
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            ArgKey::Index(index) => Some(*index),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ArgKey::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, ArgKey::Index(_))
    }
}

impl fmt::Display for ArgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKey::Index(index) => write!(f, "{}", index),
            ArgKey::Replace(index) => write!(f, "index_{}", index),
            ArgKey::Named(name) => f.write_str(name),
        }
    }
}

impl From<usize> for ArgKey {
    fn from(index: usize) -> Self {
        ArgKey::Index(index)
    }
}

impl From<&str> for ArgKey {
    fn from(key: &str) -> Self {
        ArgKey::parse(key)
    }
}

impl From<String> for ArgKey {
    fn from(key: String) -> Self {
        ArgKey::parse(&key)
    }
}

/// Ordered map of argument values.
pub type ValueMap = IndexMap<ArgKey, Value>;

/// One node of a definition forest.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Reference, Value};
///
/// let args = Value::list([Value::from("smtp://localhost"), Value::from(Reference::new("logger"))]);
/// let map = args.as_array().unwrap();
/// assert_eq!(map.len(), 2);
/// assert!(map[1].as_reference().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Arc<ValueMap>),
    Reference(Reference),
    Definition(Arc<Definition>),
    Argument(Argument),
}

impl Value {
    /// Array with sequential integer keys.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Array(Arc::new(items.into_iter().enumerate().map(|(i, v)| (ArgKey::Index(i), v)).collect()))
    }

    /// Array with explicit keys.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<ArgKey>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Array(Arc::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn reference(id: impl Into<String>) -> Self {
        Value::Reference(Reference::new(id))
    }

    pub fn definition(definition: Definition) -> Self {
        Value::Definition(Arc::new(definition))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, booleans, numbers and strings.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<ValueMap>> {
        match self {
            Value::Array(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_definition(&self) -> Option<&Arc<Definition>> {
        match self {
            Value::Definition(definition) => Some(definition),
            _ => None,
        }
    }

    pub fn as_argument(&self) -> Option<&Argument> {
        match self {
            Value::Argument(argument) => Some(argument),
            _ => None,
        }
    }

    /// Renders a scalar the way it is interpolated into strings.
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(true) => Some("1".to_string()),
            Value::Bool(false) => Some(String::new()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Reference(_) => "Reference",
            Value::Definition(_) => "Definition",
            Value::Argument(argument) => argument.type_name(),
        }
    }

    /// Identity comparison: shared arrays and definitions must be the same
    /// allocation, everything else compares by value.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Definition(a), Value::Definition(b)) => Arc::ptr_eq(a, b),
            _ => self == other,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        Value::Reference(reference)
    }
}

impl From<Definition> for Value {
    fn from(definition: Definition) -> Self {
        Value::Definition(Arc::new(definition))
    }
}

impl From<Argument> for Value {
    fn from(argument: Argument) -> Self {
        Value::Argument(argument)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Array(Arc::new(map))
    }
}

/// Appends `value` after the highest positional key, like a list push.
pub(crate) fn push_positional(map: &mut ValueMap, value: Value) {
    let next = map.keys().filter_map(ArgKey::index).max().map_or(0, |max| max + 1);
    map.insert(ArgKey::Index(next), value);
}

/// Sorts entries so positional keys come first in ascending order.
pub(crate) fn sort_keys(map: &mut ValueMap) {
    map.sort_by(|a, _, b, _| a.cmp(b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_textual_keys() {
        assert_eq!(ArgKey::parse("2"), ArgKey::Index(2));
        assert_eq!(ArgKey::parse("index_4"), ArgKey::Replace(4));
        assert_eq!(ArgKey::parse("$mailer"), ArgKey::Named("$mailer".into()));
        assert_eq!(ArgKey::parse("index_x"), ArgKey::Named("index_x".into()));
        assert_eq!(ArgKey::Replace(1).to_string(), "index_1");
    }

    #[test]
    fn push_appends_after_highest_index() {
        let mut map = ValueMap::new();
        map.insert(ArgKey::Index(3), Value::Null);
        map.insert(ArgKey::Named("$x".into()), Value::Null);
        push_positional(&mut map, Value::from(1));
        assert_eq!(map.get(&ArgKey::Index(4)), Some(&Value::Int(1)));
    }

    #[test]
    fn same_compares_shared_nodes_by_identity() {
        let a = Value::list([Value::from(1)]);
        let b = a.clone();
        let c = Value::list([Value::from(1)]);
        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a, c);
    }
}
