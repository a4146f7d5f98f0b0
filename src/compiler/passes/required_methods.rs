use crate::compiler::{class_of, process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::MethodCall;
use crate::error::CompileResult;
use crate::value::Value;

/// Adds a call to every `required` method of autowired services.
///
/// A method counts as required when it, or the method it overrides in a
/// parent class or interface, is marked so. Withers are called first, in
/// declaration order, followed by the calls already configured and then
/// the required setters. Methods that are already called are left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutowireRequiredMethodsPass;

impl RecursivePass for AutowireRequiredMethodsPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let walked = walk_children(self, cx, value)?;
        let current = walked.as_ref().unwrap_or(value);
        let Value::Definition(definition) = current else {
            return Ok(walked);
        };
        if !definition.is_autowired() || definition.is_abstract() || definition.class().is_none() {
            return Ok(walked);
        }
        let Some(class) = class_of(cx.container, definition)? else {
            return Ok(walked);
        };
        let classes = cx.container.classes();
        if !classes.exists(&class) {
            return Ok(walked);
        }

        let mut withers = Vec::new();
        let mut setters = Vec::new();
        for (_, method) in classes.methods(&class) {
            if definition.method_calls().iter().any(|call| call.method.eq_ignore_ascii_case(&method.name)) {
                continue;
            }
            if method.is_static || !method.public || !classes.is_required_method(&class, &method.name) {
                continue;
            }
            if method.returns_static {
                withers.push(MethodCall::new(method.name.clone(), []).wither());
            } else {
                setters.push(MethodCall::new(method.name.clone(), []));
            }
        }
        if withers.is_empty() && setters.is_empty() {
            return Ok(walked);
        }

        let mut resolved = (**definition).clone();
        let existing = std::mem::take(&mut resolved.calls);
        resolved.calls = withers.into_iter().chain(existing).chain(setters).collect();
        Ok(Some(Value::definition(resolved)))
    }
}

impl CompilerPass for AutowireRequiredMethodsPass {
    fn name(&self) -> &'static str {
        "AutowireRequiredMethodsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassMetadata, MethodMetadata, ParameterMetadata};

    fn classes(container: &mut ContainerBuilder) {
        container
            .register_class(
                ClassMetadata::abstract_class("App\\Base")
                    .method(MethodMetadata::new("setLogger").required().param(ParameterMetadata::typed("logger", "App\\Logger"))),
            )
            .register_class(
                ClassMetadata::class("App\\Mailer")
                    .extends("App\\Base")
                    .method(MethodMetadata::new("setLogger").param(ParameterMetadata::typed("logger", "App\\Logger")))
                    .method(MethodMetadata::new("withClock").required().wither())
                    .method(MethodMetadata::new("setDebug")),
            );
    }

    #[test]
    fn overridden_required_methods_become_calls() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container.autowire("mailer", Some("App\\Mailer"));

        AutowireRequiredMethodsPass.process(&mut container).unwrap();

        let calls = container.definition("mailer").unwrap().method_calls();
        let names: Vec<(&str, bool)> = calls.iter().map(|c| (c.method.as_str(), c.returns_clone)).collect();
        assert_eq!(names, vec![("withClock", true), ("setLogger", false)]);
    }

    #[test]
    fn configured_calls_and_plain_definitions_are_kept() {
        let mut container = ContainerBuilder::new();
        classes(&mut container);
        container
            .autowire("mailer", Some("App\\Mailer"))
            .add_method_call(MethodCall::new("setLogger", [Value::reference("logger")]))
            .unwrap();
        container.register("manual", Some("App\\Mailer"));

        AutowireRequiredMethodsPass.process(&mut container).unwrap();

        let calls = container.definition("mailer").unwrap().method_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, "withClock");
        assert_eq!(calls[1].arguments[0], Value::reference("logger"));
        assert!(container.definition("manual").unwrap().method_calls().is_empty());
    }
}
