//! Error types for container compilation.

use thiserror::Error;

/// Compilation errors
///
/// Every fatal condition raised while building or compiling a container.
/// Messages are complete sentences naming the offending service id, so the
/// `Display` output can be shown to the end user verbatim.
///
/// Soft problems (the ones a later pass may still fix or give more context
/// to) are not represented here: they are accumulated on the definition via
/// [`Definition::add_error`](crate::Definition::add_error) and only turned
/// into a [`CompileError::Runtime`] by the error-exception pass at the end of
/// the pipeline.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::CompileError;
///
/// let missing = CompileError::ServiceNotFound {
///     id: "mailer".to_string(),
///     source_id: Some("newsletter".to_string()),
///     alternatives: vec!["mailer.smtp".to_string()],
/// };
/// assert_eq!(
///     missing.to_string(),
///     "The service \"newsletter\" has a dependency on a non-existent service \"mailer\". Did you mean this: \"mailer.smtp\"?"
/// );
///
/// let circular = CompileError::CircularReference {
///     id: "a".to_string(),
///     path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
/// };
/// assert_eq!(
///     circular.to_string(),
///     "Circular reference detected for service \"a\", path: \"a -> b -> a\"."
/// );
/// ```
#[derive(Debug, Error)]
pub enum CompileError {
    /// A service id could not be found
    #[error("{}", service_not_found(.id, .source_id, .alternatives))]
    ServiceNotFound {
        id: String,
        source_id: Option<String>,
        alternatives: Vec<String>,
    },
    /// A `%parameter%` could not be found
    #[error("{}", parameter_not_found(.key, .source_id, .source_key, .alternatives))]
    ParameterNotFound {
        key: String,
        source_id: Option<String>,
        source_key: Option<String>,
        alternatives: Vec<String>,
    },
    /// Service references, aliases, parents or decorator stacks form a cycle
    #[error("Circular reference detected for service \"{id}\", path: \"{}\".", .path.join(" -> "))]
    CircularReference { id: String, path: Vec<String> },
    /// Parameters reference each other in a cycle
    #[error("{}", parameter_circular_reference(.path))]
    ParameterCircularReference { path: Vec<String> },
    /// Invalid configuration of a definition, alias or tag
    #[error("{0}")]
    InvalidArgument(String),
    /// A pass could not complete
    #[error("{0}")]
    Runtime(String),
    /// An argument index or key does not exist
    #[error("{0}")]
    OutOfBounds(String),
    /// Autowiring could not supply an argument
    #[error("{message}")]
    Autowiring { service_id: String, message: String },
    /// An error whose message referenced environment placeholders
    #[error("{message}")]
    EnvParameter {
        envs: Vec<String>,
        message: String,
        #[source]
        source: Box<CompileError>,
    },
    /// Compiler configuration could not be loaded
    #[error("Invalid compiler configuration: {0}")]
    Config(String),
}

impl CompileError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CompileError::InvalidArgument(message.into())
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        CompileError::Runtime(message.into())
    }

    pub(crate) fn not_found(id: impl Into<String>) -> Self {
        CompileError::ServiceNotFound {
            id: id.into(),
            source_id: None,
            alternatives: Vec::new(),
        }
    }

    pub(crate) fn circular(id: impl Into<String>, path: Vec<String>) -> Self {
        CompileError::CircularReference { id: id.into(), path }
    }

    /// True for cycle errors of any kind.
    pub fn is_circular(&self) -> bool {
        match self {
            CompileError::CircularReference { .. } | CompileError::ParameterCircularReference { .. } => true,
            CompileError::EnvParameter { source, .. } => source.is_circular(),
            _ => false,
        }
    }

    /// Environment variables named by an [`CompileError::EnvParameter`] wrapper.
    pub fn env_names(&self) -> &[String] {
        match self {
            CompileError::EnvParameter { envs, .. } => envs,
            _ => &[],
        }
    }
}

fn alternatives_suffix(alternatives: &[String]) -> String {
    match alternatives.len() {
        0 => String::new(),
        1 => format!(" Did you mean this: \"{}\"?", alternatives[0]),
        _ => format!(" Did you mean one of these: \"{}\"?", alternatives.join("\", \"")),
    }
}

fn service_not_found(id: &str, source_id: &Option<String>, alternatives: &[String]) -> String {
    let head = match source_id {
        Some(source) => format!("The service \"{}\" has a dependency on a non-existent service \"{}\".", source, id),
        None => format!("You have requested a non-existent service \"{}\".", id),
    };
    head + &alternatives_suffix(alternatives)
}

fn parameter_not_found(
    key: &str,
    source_id: &Option<String>,
    source_key: &Option<String>,
    alternatives: &[String],
) -> String {
    let head = match (source_id, source_key) {
        (Some(id), _) => format!("The service \"{}\" has a dependency on a non-existent parameter \"{}\".", id, key),
        (None, Some(parent)) => format!("The parameter \"{}\" has a dependency on a non-existent parameter \"{}\".", parent, key),
        (None, None) => format!("You have requested a non-existent parameter \"{}\".", key),
    };
    head + &alternatives_suffix(alternatives)
}

fn parameter_circular_reference(path: &[String]) -> String {
    let first = path.first().map(String::as_str).unwrap_or_default();
    format!(
        "Circular reference detected for parameter \"{}\" (\"{}\" > \"{}\").",
        first,
        path.join("\" > \""),
        first
    )
}

/// Result type for compilation
///
/// A convenience alias for `Result<T, CompileError>` used throughout the
/// crate.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompileError, CompileResult};
///
/// fn require_class(class: Option<&str>) -> CompileResult<&str> {
///     class.ok_or_else(|| CompileError::Runtime("the class is not set".to_string()))
/// }
///
/// assert!(require_class(Some("App\\Mailer")).is_ok());
/// assert!(require_class(None).is_err());
/// ```
pub type CompileResult<T> = Result<T, CompileError>;
