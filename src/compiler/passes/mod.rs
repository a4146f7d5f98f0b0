//! The built-in compiler passes.
//!
//! Each pass is named after the job it does; the default pipeline in
//! [`PassConfig::default_pipeline`](crate::PassConfig::default_pipeline)
//! decides their order.

mod aliases;
mod analyze;
mod auto_alias;
mod autowire;
mod bindings;
mod checks;
mod child_definitions;
mod decorator;
mod decorator_stack;
mod definition_errors;
mod definition_validity;
mod factory_class;
mod inline;
mod instanceof;
mod invalid_references;
mod named_arguments;
mod parameters;
mod preload;
mod removal;
mod required_methods;
mod resolve_class;
mod service_locator;
mod service_subscribers;
mod tagged_iterator;
mod type_declarations;

pub use aliases::{RemovePrivateAliasesPass, ReplaceAliasByActualDefinitionPass, ResolveReferencesToAliasesPass};
pub use analyze::AnalyzeServiceReferencesPass;
pub use auto_alias::AutoAliasServicePass;
pub use autowire::AutowirePass;
pub use bindings::ResolveBindingsPass;
pub use checks::{
    CheckArgumentsValidityPass, CheckCircularReferencesPass, CheckExceptionOnInvalidReferenceBehaviorPass,
    CheckReferenceValidityPass,
};
pub use child_definitions::ResolveChildDefinitionsPass;
pub use decorator::{DecoratorServicePass, DECORATOR_TAG, INNER_ID};
pub use decorator_stack::{ResolveDecoratorStackPass, STACK_TAG};
pub use definition_errors::{DefinitionErrorExceptionPass, ERROR_TAG};
pub use definition_validity::CheckDefinitionValidityPass;
pub use factory_class::ResolveFactoryClassPass;
pub use inline::{InlineServiceDefinitionsPass, DO_NOT_INLINE_TAG};
pub use instanceof::ResolveInstanceofConditionalsPass;
pub use invalid_references::ResolveInvalidReferencesPass;
pub use named_arguments::ResolveNamedArgumentsPass;
pub use parameters::ResolveParameterPlaceHoldersPass;
pub use preload::{ResolveHotPathPass, ResolveNoPreloadPass};
pub use removal::{RemoveAbstractDefinitionsPass, RemoveUnusedDefinitionsPass};
pub use required_methods::AutowireRequiredMethodsPass;
pub use resolve_class::ResolveClassPass;
pub use service_locator::{register_service_locator, ServiceLocatorTagPass, SERVICE_LOCATOR_TAG};
pub use service_subscribers::{RegisterServiceSubscribersPass, ResolveServiceSubscribersPass};
pub use tagged_iterator::{find_and_sort_tagged_services, ResolveTaggedIteratorArgumentPass};
pub use type_declarations::CheckTypeDeclarationsPass;

/// True for namespaced identifiers such as `App\Mailer`.
pub(crate) fn is_class_like(id: &str) -> bool {
    let mut segments = 0;
    for segment in id.split('\\') {
        let mut chars = segment.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        if !(first.is_alphabetic() || first == '_') || !chars.all(|c| c.is_alphanumeric() || c == '_') {
            return false;
        }
        segments += 1;
    }
    segments > 1
}

/// Splits `Type $name` binding or alias keys; `$name` alone has no type.
pub(crate) fn split_typed_key(key: &str) -> (Option<&str>, Option<&str>) {
    match key.split_once(' ') {
        Some((ty, name)) => (Some(ty), name.strip_prefix('$')),
        None => match key.strip_prefix('$') {
            Some(name) => (None, Some(name)),
            None => (Some(key), None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_namespaced_ids() {
        assert!(is_class_like("App\\Mailer"));
        assert!(is_class_like("App\\Mail\\Smtp_2"));
        assert!(!is_class_like("Mailer"));
        assert!(!is_class_like("app.mailer"));
        assert!(!is_class_like("App\\"));
        assert!(!is_class_like("\\App\\Mailer"));
        assert!(!is_class_like("App\\2Fast"));
    }

    #[test]
    fn splits_typed_keys() {
        assert_eq!(split_typed_key("App\\Logger $log"), (Some("App\\Logger"), Some("log")));
        assert_eq!(split_typed_key("$log"), (None, Some("log")));
        assert_eq!(split_typed_key("App\\Logger"), (Some("App\\Logger"), None));
    }
}
