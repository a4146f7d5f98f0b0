use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::Callable;
use crate::error::{CompileError, CompileResult};
use crate::value::Value;

/// Gives factories declared without a class the class of their service.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveFactoryClassPass;

impl RecursivePass for ResolveFactoryClassPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };
        let Some(Callable::Method(Value::Null, method)) = definition.factory() else {
            return walk_children(self, cx, value);
        };
        let Some(class) = definition.class() else {
            return Err(CompileError::runtime(format!(
                "The \"{}\" service is defined to be created by a factory, but is missing the factory class. Did you forget to define the factory or service class?",
                cx.current_id
            )));
        };
        let mut resolved = (**definition).clone();
        resolved.set_factory(Some(Callable::static_method(class, method.clone())));
        let resolved = Value::definition(resolved);
        Ok(Some(walk_children(self, cx, &resolved)?.unwrap_or(resolved)))
    }

    fn skip_scalars(&self) -> bool {
        true
    }
}

impl CompilerPass for ResolveFactoryClassPass {
    fn name(&self) -> &'static str {
        "ResolveFactoryClassPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        process_definitions(self, container)
    }
}
