//! Container parameters and `%placeholder%` resolution.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{CompileError, CompileResult};
use crate::internal::alternatives;
use crate::value::{ArgKey, Value, ValueMap};

/// Ordered parameter bag.
///
/// Strings may embed other parameters as `%name%`; `%%` escapes a literal
/// percent sign. A string made of a single placeholder resolves to the
/// parameter's value with its own type, while embedded placeholders must
/// resolve to strings or numbers.
///
/// `env(NAME)` parameters never need to be defined: they resolve to an
/// opaque placeholder standing for the environment variable, which
/// [`resolve_env_placeholders`](ParameterBag::resolve_env_placeholders)
/// turns back into `%env(NAME)%` for messages.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{ParameterBag, Value};
///
/// let mut bag = ParameterBag::new();
/// bag.set("host", "localhost");
/// bag.set("port", 25);
/// bag.set("dsn", "smtp://%host%:%port%");
///
/// assert_eq!(bag.resolve_value(&Value::from("%dsn%")).unwrap(), Value::from("smtp://localhost:25"));
/// assert_eq!(bag.resolve_value(&Value::from("%port%")).unwrap(), Value::from(25));
/// assert_eq!(bag.resolve_value(&Value::from("100%%")).unwrap(), Value::from("100%%"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParameterBag {
    parameters: IndexMap<String, Value>,
    env_placeholders: IndexMap<String, String>,
    resolved: bool,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.parameters.shift_remove(name)
    }

    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Value of `name`; `env(NAME)` yields the placeholder of that variable.
    pub fn get(&mut self, name: &str) -> CompileResult<Value> {
        if let Some(value) = self.parameters.get(name) {
            return Ok(value.clone());
        }
        if let Some(env) = name.strip_prefix("env(").and_then(|rest| rest.strip_suffix(')')) {
            return Ok(Value::String(self.env_placeholder(env)));
        }
        Err(CompileError::ParameterNotFound {
            key: name.to_string(),
            source_id: None,
            source_key: None,
            alternatives: alternatives(name, self.parameters.keys().map(String::as_str)),
        })
    }

    fn env_placeholder(&mut self, env: &str) -> String {
        if let Some(placeholder) = self.env_placeholders.get(env) {
            return placeholder.clone();
        }
        let mut hasher = DefaultHasher::new();
        env.hash(&mut hasher);
        let sanitized: String = env
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let placeholder = format!("env_{:016x}_{}", hasher.finish(), sanitized);
        self.env_placeholders.insert(env.to_string(), placeholder.clone());
        placeholder
    }

    /// Environment variable names with a placeholder handed out so far.
    pub fn env_names(&self) -> impl Iterator<Item = &str> {
        self.env_placeholders.keys().map(String::as_str)
    }

    /// Replaces env placeholders in `text` by `%env(NAME)%`, returning the
    /// rewritten text and the names that were found.
    pub fn resolve_env_placeholders(&self, text: &str) -> (String, Vec<String>) {
        let mut out = text.to_string();
        let mut used = Vec::new();
        for (env, placeholder) in &self.env_placeholders {
            if out.contains(placeholder.as_str()) {
                out = out.replace(placeholder.as_str(), &format!("%env({})%", env));
                used.push(env.clone());
            }
        }
        (out, used)
    }

    /// Resolves every parameter in place.
    pub fn resolve(&mut self) -> CompileResult<()> {
        if self.resolved {
            return Ok(());
        }
        let names: Vec<String> = self.parameters.keys().cloned().collect();
        let mut resolved = IndexMap::with_capacity(names.len());
        for name in names {
            let value = self.parameters[&name].clone();
            let value = self.resolve_value(&value).map_err(|e| match e {
                CompileError::ParameterNotFound {
                    key,
                    source_id: None,
                    alternatives,
                    ..
                } => CompileError::ParameterNotFound {
                    key,
                    source_id: None,
                    source_key: Some(name.clone()),
                    alternatives,
                },
                other => other,
            })?;
            resolved.insert(name, unescape(value));
        }
        self.parameters = resolved;
        self.resolved = true;
        Ok(())
    }

    /// Replaces placeholders in `value`, recursing into arrays (keys
    /// included).
    pub fn resolve_value(&mut self, value: &Value) -> CompileResult<Value> {
        self.resolve_value_in(value, &mut Vec::new())
    }

    fn resolve_value_in(&mut self, value: &Value, resolving: &mut Vec<String>) -> CompileResult<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, resolving),
            Value::Array(map) => {
                let mut out = ValueMap::with_capacity(map.len());
                for (key, item) in map.iter() {
                    let key = match key {
                        ArgKey::Named(name) if name.contains('%') => {
                            match self.resolve_string(name, &mut resolving.clone())? {
                                Value::String(s) => ArgKey::parse(&s),
                                other => ArgKey::parse(&other.to_scalar_string().unwrap_or_default()),
                            }
                        }
                        other => other.clone(),
                    };
                    out.insert(key, self.resolve_value_in(item, &mut resolving.clone())?);
                }
                if out == **map {
                    return Ok(value.clone());
                }
                Ok(Value::Array(Arc::new(out)))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&mut self, s: &str, resolving: &mut Vec<String>) -> CompileResult<Value> {
        if let Some(name) = whole_placeholder(s) {
            if resolving.iter().any(|r| r == name) {
                resolving.push(name.to_string());
                return Err(CompileError::ParameterCircularReference {
                    path: circular_path(resolving),
                });
            }
            resolving.push(name.to_string());
            let value = self.get(name)?;
            if self.resolved {
                return Ok(value);
            }
            return self.resolve_value_in(&value, resolving);
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            if let Some(stripped) = after.strip_prefix('%') {
                out.push_str("%%");
                rest = stripped;
                continue;
            }
            let end = after.find(|c: char| c == '%' || c.is_whitespace());
            match end {
                Some(end) if after.as_bytes()[end] == b'%' && end > 0 => {
                    let name = &after[..end];
                    if resolving.iter().any(|r| r == name) {
                        let mut path = resolving.clone();
                        path.push(name.to_string());
                        return Err(CompileError::ParameterCircularReference {
                            path: circular_path(&path),
                        });
                    }
                    let resolved = self.get(name)?;
                    let text = match &resolved {
                        Value::String(_) | Value::Int(_) | Value::Float(_) => resolved.to_scalar_string().unwrap_or_default(),
                        other => {
                            return Err(CompileError::runtime(format!(
                                "A string value must be composed of strings and/or numbers, but found parameter \"{}\" of type \"{}\" inside string value \"{}\".",
                                name,
                                other.type_name(),
                                s
                            )))
                        }
                    };
                    if self.resolved {
                        out.push_str(&text);
                    } else {
                        let mut nested = resolving.clone();
                        nested.push(name.to_string());
                        match self.resolve_string(&text, &mut nested)? {
                            Value::String(inner) => out.push_str(&inner),
                            other => out.push_str(&other.to_scalar_string().unwrap_or_default()),
                        }
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let name = s.strip_prefix('%')?.strip_suffix('%')?;
    if name.is_empty() || name.contains('%') || name.chars().any(char::is_whitespace) {
        return None;
    }
    Some(name)
}

/// Trims the resolution stack to the cycle itself.
fn circular_path(resolving: &[String]) -> Vec<String> {
    let Some(last) = resolving.last() else {
        return Vec::new();
    };
    let start = resolving.iter().position(|r| r == last).unwrap_or(0);
    resolving[start..resolving.len() - 1].to_vec()
}

fn unescape(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace("%%", "%")),
        Value::Array(map) => Value::Array(Arc::new(
            map.iter().map(|(k, v)| (k.clone(), unescape(v.clone()))).collect(),
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_parameters_with_alternatives() {
        let mut bag = ParameterBag::new();
        bag.set("mailer.host", "localhost");
        let err = bag.resolve_value(&Value::from("%mailer.hots%")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You have requested a non-existent parameter \"mailer.hots\". Did you mean this: \"mailer.host\"?"
        );
    }

    #[test]
    fn detects_parameter_cycles() {
        let mut bag = ParameterBag::new();
        bag.set("a", "%b%");
        bag.set("b", "x%a%");
        let err = bag.resolve().unwrap_err();
        assert!(err.is_circular());
        assert_eq!(err.to_string(), "Circular reference detected for parameter \"b\" (\"b\" > \"a\" > \"b\").");
    }

    #[test]
    fn embedded_placeholders_must_be_scalar() {
        let mut bag = ParameterBag::new();
        bag.set("list", Value::list([Value::from(1)]));
        let err = bag.resolve_value(&Value::from("items: %list%")).unwrap_err();
        assert!(err.to_string().starts_with("A string value must be composed of strings and/or numbers"));
    }

    #[test]
    fn env_placeholders_round_trip_into_messages() {
        let mut bag = ParameterBag::new();
        let placeholder = bag.resolve_value(&Value::from("%env(DATABASE_URL)%")).unwrap();
        let placeholder = placeholder.as_str().unwrap().to_string();
        assert!(placeholder.starts_with("env_"));
        let (text, envs) = bag.resolve_env_placeholders(&format!("bad dsn \"{}\"", placeholder));
        assert_eq!(text, "bad dsn \"%env(DATABASE_URL)%\"");
        assert_eq!(envs, vec!["DATABASE_URL".to_string()]);
    }

    #[test]
    fn resolve_unescapes_percent_signs() {
        let mut bag = ParameterBag::new();
        bag.set("rate", "100%%");
        bag.resolve().unwrap();
        assert_eq!(bag.get("rate").unwrap(), Value::from("100%"));
    }
}
