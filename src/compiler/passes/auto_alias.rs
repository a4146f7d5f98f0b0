use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::definition::Alias;
use crate::error::{CompileError, CompileResult};
use crate::value::Value;

/// Replaces services tagged `auto_alias` by an alias to the id their
/// `format` attribute resolves to, when that id exists.
///
/// ```rust
/// use ferrous_container::{AutoAliasServicePass, CompilerPass, ContainerBuilder, TagAttributes, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.set_parameter("transport", "smtp");
/// container.register("mailer.smtp", Some("App\\SmtpMailer"));
/// let mut tag = TagAttributes::new();
/// tag.insert("format".to_string(), Value::from("mailer.%transport%"));
/// container.register("mailer", None).add_tag_with("auto_alias", tag);
///
/// AutoAliasServicePass.process(&mut container).unwrap();
/// assert_eq!(container.alias("mailer").unwrap().id(), "mailer.smtp");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoAliasServicePass;

impl CompilerPass for AutoAliasServicePass {
    fn name(&self) -> &'static str {
        "AutoAliasServicePass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        for (id, tags) in container.find_tagged_service_ids("auto_alias", false)? {
            for tag in tags {
                let Some(format) = tag.get("format") else {
                    return Err(CompileError::invalid(format!(
                        "Missing tag information \"format\" on auto_alias service \"{}\".",
                        id
                    )));
                };
                let alias_id = match container.parameters_mut().resolve_value(format)? {
                    Value::String(alias_id) => alias_id,
                    other => other.to_scalar_string().unwrap_or_default(),
                };
                if alias_id == id || !(container.has_definition(&alias_id) || container.has_alias(&alias_id)) {
                    continue;
                }
                let public = container.definition(&id).map(|d| d.is_public()).unwrap_or(false);
                let mut alias = Alias::new(alias_id);
                alias.set_public(public);
                container.set_alias(&id, alias)?;
            }
        }
        Ok(())
    }
}
