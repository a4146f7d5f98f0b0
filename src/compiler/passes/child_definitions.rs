use std::sync::Arc;

use crate::compiler::{process_definitions, walk_children, CompilerPass, RecursivePass, WalkContext};
use crate::container::ContainerBuilder;
use crate::definition::{Changes, Definition};
use crate::error::{CompileError, CompileResult};
use crate::internal::ResolutionPath;
use crate::value::{ArgKey, Value};

/// Flattens child definitions into plain definitions.
///
/// Parents are resolved first (and stored back resolved), then the child
/// is rebuilt from its parent: everything the child explicitly changed
/// wins, positional arguments are appended, `index_N` arguments replace the
/// parent's argument N and named arguments are set. Tags, abstractness and
/// autoconfiguration always come from the child.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompilerPass, ContainerBuilder, Definition, ResolveChildDefinitionsPass, Value};
///
/// let mut container = ContainerBuilder::new();
/// container.register("base", Some("App\\Mailer")).add_argument("smtp://a").add_argument(25);
/// let mut child = Definition::child("base");
/// child.replace_argument(1, 587).unwrap();
/// container.set_definition("mailer", child).unwrap();
///
/// ResolveChildDefinitionsPass::new().process(&mut container).unwrap();
///
/// let mailer = container.definition("mailer").unwrap();
/// assert_eq!(mailer.class(), Some("App\\Mailer"));
/// assert_eq!(mailer.arguments()[1], Value::from(587));
/// assert!(!mailer.is_child());
/// ```
#[derive(Debug, Default)]
pub struct ResolveChildDefinitionsPass {
    path: ResolutionPath,
}

impl ResolveChildDefinitionsPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&mut self, container: &mut ContainerBuilder, id: &str, child: &Definition) -> CompileResult<Definition> {
        self.resolve_definition(container, id, child).map_err(|error| match error {
            CompileError::InvalidArgument(message) if !message.starts_with("Service \"") => {
                CompileError::InvalidArgument(format!("Service \"{}\": {}", id, message))
            }
            CompileError::Runtime(message) if !message.starts_with("Service \"") => {
                CompileError::Runtime(format!("Service \"{}\": {}", id, message))
            }
            CompileError::OutOfBounds(message) if !message.starts_with("Service \"") => {
                CompileError::OutOfBounds(format!("Service \"{}\": {}", id, message))
            }
            other => other,
        })
    }

    fn resolve_definition(
        &mut self,
        container: &mut ContainerBuilder,
        id: &str,
        child: &Definition,
    ) -> CompileResult<Definition> {
        let Some(parent_id) = child.parent().map(str::to_string) else {
            return Ok(child.clone());
        };
        if !container.has(&parent_id) {
            return Err(CompileError::runtime(format!(
                "Parent definition \"{}\" does not exist.",
                parent_id
            )));
        }
        self.path.enter(&parent_id)?;

        let parent_target = container.resolve_alias_chain(&parent_id)?;
        let mut parent = container.definition(&parent_target)?.clone();
        if parent.is_child() {
            parent = self.resolve(container, &parent_target, &parent)?;
            container.replace_definition_arc(&parent_target, Arc::new(parent.clone()));
        }
        self.path.leave();

        container.log(
            "ResolveChildDefinitionsPass",
            format!("Resolving inheritance for \"{}\" (parent: {}).", id, parent_id),
        );
        merge(&parent, child)
    }
}

fn merge(parent: &Definition, child: &Definition) -> CompileResult<Definition> {
    let mut def = Definition {
        class: parent.class.clone(),
        arguments: parent.arguments.clone(),
        calls: parent.calls.clone(),
        properties: parent.properties.clone(),
        deprecation: parent.deprecation.clone(),
        factory: parent.factory.clone(),
        configurator: parent.configurator.clone(),
        file: parent.file.clone(),
        public: parent.public,
        lazy: parent.lazy,
        autowired: parent.autowired,
        autowiring_types: parent.autowiring_types.clone(),
        changes: parent.changes,
        synthetic: child.synthetic,
        ..Definition::default()
    };
    let mut bindings = child.bindings.clone();
    for (key, binding) in &parent.bindings {
        bindings.entry(key.clone()).or_insert_with(|| binding.clone());
    }
    def.bindings = bindings;

    let changes = child.changes;
    if changes.contains(Changes::CLASS) {
        def.set_class(child.class.clone());
    }
    if changes.contains(Changes::FACTORY) {
        def.set_factory(child.factory.clone());
    }
    if changes.contains(Changes::CONFIGURATOR) {
        def.set_configurator(child.configurator.clone());
    }
    if changes.contains(Changes::FILE) {
        def.set_file(child.file.clone());
    }
    if changes.contains(Changes::PUBLIC) {
        def.set_public(child.public);
    }
    if changes.contains(Changes::LAZY) {
        def.set_lazy(child.lazy);
    }
    if changes.contains(Changes::AUTOWIRED) {
        def.set_autowired(child.autowired);
    }
    if changes.contains(Changes::SHARED) {
        def.set_shared(child.shared);
    }
    if changes.contains(Changes::DECORATED_SERVICE) {
        def.set_decoration(child.decorated.clone());
    }
    if changes.contains(Changes::DEPRECATED) {
        def.deprecation = child.deprecation.clone();
        def.changes |= Changes::DEPRECATED;
    }
    for ty in &child.autowiring_types {
        def.add_autowiring_type(ty.clone());
    }

    for (key, value) in child.arguments.iter() {
        match key {
            ArgKey::Index(_) => {
                def.add_argument(value.clone());
            }
            ArgKey::Replace(index) => {
                def.replace_argument(ArgKey::Index(*index), value.clone())?;
            }
            ArgKey::Named(_) => {
                def.set_argument(key.clone(), value.clone());
            }
        }
    }
    for (key, value) in child.properties.iter() {
        Arc::make_mut(&mut def.properties).insert(key.clone(), value.clone());
    }
    def.calls.extend(child.calls.iter().cloned());

    def.add_errors_from(parent);
    def.add_errors_from(child);

    def.set_abstract(child.abstract_);
    def.tags = child.tags.clone();
    if child.inherit_tags {
        for (name, occurrences) in &parent.tags {
            for attributes in occurrences {
                def.add_tag_with(name.clone(), attributes.clone());
            }
        }
    }
    def.set_autoconfigured(child.autoconfigured);
    if !def.has_tag("proxy") {
        for attributes in parent.tag("proxy") {
            def.add_tag_with("proxy", attributes.clone());
        }
    }
    Ok(def)
}

impl RecursivePass for ResolveChildDefinitionsPass {
    fn process_value(&mut self, cx: &mut WalkContext<'_>, value: &Value, _is_root: bool) -> CompileResult<Option<Value>> {
        let Value::Definition(definition) = value else {
            return walk_children(self, cx, value);
        };
        if !definition.is_child() {
            return walk_children(self, cx, value);
        }

        self.path = ResolutionPath::new();
        let current_id = cx.current_id.clone();
        self.path.enter(&current_id)?;
        let resolved = self.resolve(cx.container, &current_id, definition)?;
        self.path = ResolutionPath::new();

        let resolved = Value::Definition(Arc::new(resolved));
        Ok(Some(walk_children(self, cx, &resolved)?.unwrap_or(resolved)))
    }
}

impl CompilerPass for ResolveChildDefinitionsPass {
    fn name(&self) -> &'static str {
        "ResolveChildDefinitionsPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let result = process_definitions(self, container);
        self.path = ResolutionPath::new();
        result
    }
}
