//! Aliases: id-to-id indirections.

use std::fmt;

use super::Deprecation;
use crate::error::{CompileError, CompileResult};

pub const DEFAULT_ALIAS_DEPRECATION_TEMPLATE: &str =
    "The \"%alias_id%\" service alias is deprecated. You should stop using it, as it will be removed in the future.";

/// Points one service id at another.
///
/// Aliases are private unless made public; private aliases are dropped
/// during the removal phase once every reference has been rewritten to
/// their target.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::Alias;
///
/// let mut alias = Alias::new("mailer.smtp");
/// assert!(alias.is_private());
/// alias.set_public(true);
/// assert_eq!(alias.to_string(), "mailer.smtp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    id: String,
    public: bool,
    deprecation: Option<Deprecation>,
}

impl Alias {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public: false,
            deprecation: None,
        }
    }

    pub fn public(id: impl Into<String>) -> Self {
        Self {
            public: true,
            ..Self::new(id)
        }
    }

    /// Target id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_private(&self) -> bool {
        !self.public
    }

    pub fn set_public(&mut self, public: bool) -> &mut Self {
        self.public = public;
        self
    }

    /// Marks the alias deprecated.
    ///
    /// The message template must mention `%alias_id%`; an empty message
    /// selects the default template.
    pub fn set_deprecated(&mut self, package: &str, version: &str, message: &str) -> CompileResult<&mut Self> {
        let message = super::validate_template(message, "%alias_id%", DEFAULT_ALIAS_DEPRECATION_TEMPLATE)?;
        self.deprecation = Some(Deprecation {
            package: package.to_string(),
            version: version.to_string(),
            message,
        });
        Ok(self)
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation.is_some()
    }

    /// Deprecation with `%alias_id%` replaced by `alias_id`.
    pub fn deprecation(&self, alias_id: &str) -> Option<Deprecation> {
        self.deprecation.as_ref().map(|d| d.render("%alias_id%", alias_id))
    }

    pub(crate) fn deprecation_template(&self) -> Option<&Deprecation> {
        self.deprecation.as_ref()
    }

    pub(crate) fn set_deprecation(&mut self, deprecation: Option<Deprecation>) {
        self.deprecation = deprecation;
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for Alias {
    fn from(id: &str) -> Self {
        Alias::new(id)
    }
}

impl From<String> for Alias {
    fn from(id: String) -> Self {
        Alias::new(id)
    }
}

pub(crate) fn check_alias_id(alias: &str) -> CompileResult<()> {
    if alias.is_empty() || alias.ends_with('\\') || alias.contains(['\0', '\r', '\n', '\'']) {
        return Err(CompileError::invalid(format!("Invalid alias id: \"{}\".", alias)));
    }
    Ok(())
}
