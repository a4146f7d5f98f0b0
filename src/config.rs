//! Compiler configuration.
//!
//! [`CompilerConfig`] decides which optional passes the default pipeline
//! contains and how autowiring behaves. It can be built in code, read from
//! `FERROUS_CONTAINER_*` environment variables through
//! [`EnvironmentConfigSource`], or (with the `config` feature) parsed from
//! JSON or YAML.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Prefix of the environment variables read by [`CompilerConfig::from_env`].
pub const ENV_PREFIX: &str = "FERROUS_CONTAINER";

/// Settings of the default pass pipeline.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::CompilerConfig;
///
/// let config = CompilerConfig::default();
/// assert!(config.inline_services);
/// assert!(!config.check_type_declarations);
/// assert!(config.behavior_describing_tags.iter().any(|t| t == "container.service_locator"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct CompilerConfig {
    /// Run the type-declaration check after autowiring
    pub check_type_declarations: bool,
    /// Inline private services used once and non-shared services
    pub inline_services: bool,
    /// Remove private services nothing refers to
    pub remove_unused: bool,
    /// Let autowiring register definitions for unknown concrete types
    pub autowire_creates_missing: bool,
    /// Fail on the first autowiring error instead of deferring it
    pub throw_on_autowire_error: bool,
    /// Tag marking services whose dependencies are preloaded eagerly
    pub hot_path_tag: String,
    /// Tag given to services unreachable from public ones
    pub no_preload_tag: String,
    /// Tags describing a service's behavior, never moved to its decorators
    pub behavior_describing_tags: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            check_type_declarations: false,
            inline_services: true,
            remove_unused: true,
            autowire_creates_missing: true,
            throw_on_autowire_error: false,
            hot_path_tag: "container.hot_path".to_string(),
            no_preload_tag: "container.no_preload".to_string(),
            behavior_describing_tags: [
                "container.do_not_inline",
                "container.service_locator",
                "container.service_subscriber",
                "kernel.event_subscriber",
                "kernel.event_listener",
                "kernel.locale_aware",
                "kernel.reset",
            ]
            .iter()
            .map(|tag| tag.to_string())
            .collect(),
        }
    }
}

impl CompilerConfig {
    /// Defaults overridden by `FERROUS_CONTAINER_*` environment variables.
    pub fn from_env() -> CompileResult<Self> {
        Self::default().merge_source(&EnvironmentConfigSource::with_prefix(ENV_PREFIX))
    }

    /// Overrides every setting `source` provides.
    ///
    /// Keys are the field names; `behavior_describing_tags` is a comma
    /// separated list.
    pub fn merge_source(mut self, source: &dyn ConfigSource) -> CompileResult<Self> {
        let flags: [(&str, &mut bool); 5] = [
            ("check_type_declarations", &mut self.check_type_declarations),
            ("inline_services", &mut self.inline_services),
            ("remove_unused", &mut self.remove_unused),
            ("autowire_creates_missing", &mut self.autowire_creates_missing),
            ("throw_on_autowire_error", &mut self.throw_on_autowire_error),
        ];
        for (key, slot) in flags {
            if let Some(raw) = source.get(key) {
                *slot = parse_bool(key, &raw)?;
            }
        }
        if let Some(tag) = source.get("hot_path_tag") {
            self.hot_path_tag = tag;
        }
        if let Some(tag) = source.get("no_preload_tag") {
            self.no_preload_tag = tag;
        }
        if let Some(tags) = source.get("behavior_describing_tags") {
            self.behavior_describing_tags = tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(self)
    }

    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> CompileResult<Self> {
        serde_json::from_str(json).map_err(|e| CompileError::Config(e.to_string()))
    }

    #[cfg(feature = "config")]
    pub fn from_yaml_str(yaml: &str) -> CompileResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| CompileError::Config(e.to_string()))
    }

    #[cfg(feature = "config")]
    pub fn to_json_string(&self) -> CompileResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CompileError::Config(e.to_string()))
    }

    pub fn is_behavior_describing(&self, tag: &str) -> bool {
        self.behavior_describing_tags.iter().any(|t| t == tag)
    }
}

fn parse_bool(key: &str, raw: &str) -> CompileResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(CompileError::Config(format!(
            "\"{}\" expects a boolean, got \"{}\"",
            key, other
        ))),
    }
}

/// A source of raw configuration values.
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    /// Raw value of `key`, if the source defines it.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads `PREFIX_KEY` environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvironmentConfigSource {
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn variable(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(self.variable(key)).ok()
    }
}

/// In-memory source, mostly for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MapConfigSource {
    values: indexmap::IndexMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_override_defaults() {
        let source = MapConfigSource::new()
            .set("inline_services", "off")
            .set("check_type_declarations", "1")
            .set("behavior_describing_tags", "a, b,,c");
        let config = CompilerConfig::default().merge_source(&source).unwrap();
        assert!(!config.inline_services);
        assert!(config.check_type_declarations);
        assert_eq!(config.behavior_describing_tags, vec!["a", "b", "c"]);
        assert!(config.remove_unused);
    }

    #[test]
    fn invalid_booleans_are_rejected() {
        let source = MapConfigSource::new().set("remove_unused", "maybe");
        let err = CompilerConfig::default().merge_source(&source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid compiler configuration: \"remove_unused\" expects a boolean, got \"maybe\""
        );
    }

    #[test]
    fn environment_variables_are_prefixed() {
        env::set_var("FERROUS_CONTAINER_TEST_ONLY_HOT_PATH_TAG", "app.hot");
        let source = EnvironmentConfigSource::with_prefix("ferrous_container_test_only");
        assert_eq!(source.get("hot_path_tag"), Some("app.hot".to_string()));
        env::remove_var("FERROUS_CONTAINER_TEST_ONLY_HOT_PATH_TAG");
    }

    #[cfg(feature = "config")]
    #[test]
    fn parses_json_and_yaml() {
        let config = CompilerConfig::from_json_str(r#"{"inline_services": false}"#).unwrap();
        assert!(!config.inline_services);
        assert!(config.remove_unused);

        let config = CompilerConfig::from_yaml_str("hot_path_tag: app.hot\n").unwrap();
        assert_eq!(config.hot_path_tag, "app.hot");
    }
}
