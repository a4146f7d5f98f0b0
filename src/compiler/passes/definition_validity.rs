use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::error::{CompileError, CompileResult};
use crate::value::Value;

use super::service_locator::SERVICE_LOCATOR_TAG;

/// Validates the basic shape of every definition.
///
/// Synthetic services must be public, every other non-abstract service
/// needs a class (a factory alone is not enough) and tag attributes must
/// be scalars or arrays of scalars.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckDefinitionValidityPass;

/// Ids generated for anonymous services: `.N_name~hash`.
fn is_anonymous_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix('.') else {
        return false;
    };
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || !rest[digits..].starts_with('_') {
        return false;
    }
    match rest.rsplit_once('~') {
        Some((_, hash)) => {
            hash.len() == 7 && hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        }
        None => false,
    }
}

fn validate_attribute(id: &str, tag: &str, value: &Value, path: &mut Vec<String>) -> CompileResult<()> {
    match value {
        Value::Array(nested) => {
            for (name, value) in nested.iter() {
                path.push(name.to_string());
                validate_attribute(id, tag, value, path)?;
                path.pop();
            }
            Ok(())
        }
        scalar if scalar.is_scalar() => Ok(()),
        _ => Err(CompileError::runtime(format!(
            "A \"tags\" attribute must be of a scalar-type for service \"{}\", tag \"{}\", attribute \"{}\".",
            id,
            tag,
            path.join(".")
        ))),
    }
}

impl CompilerPass for CheckDefinitionValidityPass {
    fn name(&self) -> &'static str {
        "CheckDefinitionValidityPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        for (id, definition) in container.definitions() {
            if definition.is_synthetic() && !definition.is_public() {
                return Err(CompileError::runtime(format!(
                    "A synthetic service (\"{}\") must be public.",
                    id
                )));
            }

            let needs_class = !definition.is_abstract()
                && !definition.is_synthetic()
                && definition.class().is_none()
                && !definition.has_tag(SERVICE_LOCATOR_TAG)
                && (definition.factory().is_none() || !is_anonymous_id(id));
            if needs_class {
                if definition.factory().is_some() {
                    return Err(CompileError::runtime(format!(
                        "Please add the class to service \"{}\" even if it is constructed by a factory since we might need to add method calls based on compile-time checks.",
                        id
                    )));
                }
                if container.classes().exists(id) {
                    if id.starts_with('\\') && id.matches('\\').count() > 1 {
                        return Err(CompileError::runtime(format!(
                            "The definition for \"{}\" has no class attribute, and appears to reference a class or interface. Please specify the class attribute explicitly or remove the leading backslash by renaming the service to \"{}\" to get rid of this error.",
                            id,
                            &id[1..]
                        )));
                    }
                    return Err(CompileError::runtime(format!(
                        "The definition for \"{}\" has no class attribute, and appears to reference a class or interface in the global namespace. Leaving out the \"class\" attribute is only allowed for namespaced classes. Please specify the class attribute explicitly to get rid of this error.",
                        id
                    )));
                }
                return Err(CompileError::runtime(format!(
                    "The definition for \"{}\" has no class. If you intend to inject this service dynamically at runtime, please mark it as synthetic=true. If this is an abstract definition solely used by child definitions, please add abstract=true, otherwise specify a class to get rid of this error.",
                    id
                )));
            }

            for (tag, occurrences) in definition.tags() {
                for attributes in occurrences {
                    for (name, value) in attributes {
                        validate_attribute(id, tag, value, &mut vec![name.clone()])?;
                    }
                }
            }
        }
        Ok(())
    }
}
