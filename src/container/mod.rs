//! The container builder: the arena every compiler pass works on.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::class::{ClassMetadata, ClassRegistry, CONTAINER_INTERFACE};
use crate::compiler::{Compiler, CompilerConfig, CompilerPass, PassPhase};
use crate::definition::{check_alias_id, Alias, Definition, TagAttributes};
use crate::error::{CompileError, CompileResult};
use crate::graph::ServiceReferenceGraph;
use crate::internal::{alternatives, camel_case, IdSet};
use crate::parameters::ParameterBag;

/// Id of the container itself.
pub const SERVICE_CONTAINER_ID: &str = "service_container";

/// Tag hiding a definition from every pass.
pub const EXCLUDED_TAG: &str = "container.excluded";

/// Owns the definitions, aliases and parameters of one container.
///
/// Passes receive exclusive access to the builder one at a time; the
/// builder is the only place definitions live, keyed by id in registration
/// order.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{ContainerBuilder, Reference};
///
/// let mut container = ContainerBuilder::new();
/// container.register("logger", Some("App\\Logger")).set_public(true);
/// container
///     .register("mailer", Some("App\\Mailer"))
///     .add_argument(Reference::new("logger"))
///     .set_public(true);
/// container.set_alias("app.mailer", "mailer").unwrap();
///
/// assert_eq!(container.find_definition("app.mailer").unwrap().class(), Some("App\\Mailer"));
/// container.compile().unwrap();
/// assert!(container.has_definition("mailer"));
/// ```
#[derive(Debug)]
pub struct ContainerBuilder {
    definitions: IndexMap<String, Arc<Definition>>,
    aliases: IndexMap<String, Alias>,
    parameters: ParameterBag,
    classes: ClassRegistry,
    graph: ServiceReferenceGraph,
    log: Vec<String>,
    compiler: Compiler,
    autoconfigured_instanceof: IndexMap<String, Definition>,
    removed_ids: IndexSet<String>,
    removed_binding_ids: IdSet<u64>,
    compiled: bool,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    /// Builder whose default pipeline follows `config`.
    pub fn with_config(config: CompilerConfig) -> Self {
        let mut container = Self {
            definitions: IndexMap::new(),
            aliases: IndexMap::new(),
            parameters: ParameterBag::new(),
            classes: ClassRegistry::new(),
            graph: ServiceReferenceGraph::new(),
            log: Vec::new(),
            compiler: Compiler::with_config(&config),
            autoconfigured_instanceof: IndexMap::new(),
            removed_ids: IndexSet::new(),
            removed_binding_ids: IdSet::default(),
            compiled: false,
        };
        container
            .register(SERVICE_CONTAINER_ID, Some(CONTAINER_INTERFACE))
            .set_synthetic(true)
            .set_public(true);
        container
    }

    // ----- definitions -----

    /// Registers a definition of `class` under `id`.
    ///
    /// The id is not validated; use [`set_definition`](Self::set_definition)
    /// for ids coming from configuration.
    pub fn register(&mut self, id: &str, class: Option<&str>) -> &mut Definition {
        let mut definition = Definition::new();
        if let Some(class) = class {
            definition.set_class(Some(class.to_string()));
        }
        self.insert_definition(id.to_string(), definition)
    }

    /// Registers an autowired definition of `class` under `id`.
    pub fn autowire(&mut self, id: &str, class: Option<&str>) -> &mut Definition {
        let definition = self.register(id, class);
        definition.set_autowired(true);
        definition
    }

    /// Stores `definition` under `id`, replacing any alias with that id.
    pub fn set_definition(&mut self, id: &str, definition: Definition) -> CompileResult<&mut Definition> {
        if self.compiled {
            return Err(CompileError::runtime(
                "Adding definition to a compiled container is not allowed.",
            ));
        }
        if id.is_empty() || id.ends_with('\\') || id.contains(['\0', '\r', '\n', '\'']) {
            return Err(CompileError::invalid(format!("Invalid service id: \"{}\".", id)));
        }
        Ok(self.insert_definition(id.to_string(), definition))
    }

    fn insert_definition(&mut self, id: String, definition: Definition) -> &mut Definition {
        self.aliases.shift_remove(&id);
        self.removed_ids.shift_remove(&id);
        let entry = self.definitions.entry(id).or_default();
        *entry = Arc::new(definition);
        Arc::make_mut(entry)
    }

    /// Replaces the definition `id` keeping its position.
    pub(crate) fn replace_definition_arc(&mut self, id: &str, definition: Arc<Definition>) {
        match self.definitions.get_mut(id) {
            Some(slot) => *slot = definition,
            None => {
                self.aliases.shift_remove(id);
                self.definitions.insert(id.to_string(), definition);
            }
        }
    }

    pub fn has_definition(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn definition(&self, id: &str) -> CompileResult<&Definition> {
        self.definition_arc(id).map(Arc::as_ref)
    }

    pub fn definition_arc(&self, id: &str) -> CompileResult<&Arc<Definition>> {
        self.definitions.get(id).ok_or_else(|| CompileError::not_found(id))
    }

    /// Mutable access to the definition `id`, copying it if it is shared.
    pub fn definition_mut(&mut self, id: &str) -> CompileResult<&mut Definition> {
        self.definitions
            .get_mut(id)
            .map(Arc::make_mut)
            .ok_or_else(|| CompileError::not_found(id))
    }

    pub fn definitions(&self) -> &IndexMap<String, Arc<Definition>> {
        &self.definitions
    }

    pub fn set_definitions(&mut self, definitions: IndexMap<String, Definition>) -> CompileResult<()> {
        self.definitions.clear();
        for (id, definition) in definitions {
            self.set_definition(&id, definition)?;
        }
        Ok(())
    }

    /// Removes `id`, remembering it and the bindings it carried.
    pub fn remove_definition(&mut self, id: &str) -> Option<Arc<Definition>> {
        self.remove_bindings(id);
        let removed = self.definitions.shift_remove(id)?;
        self.removed_ids.insert(id.to_string());
        Some(removed)
    }

    /// Marks the bindings of `id` as used, so they are never reported.
    pub fn remove_bindings(&mut self, id: &str) {
        if let Some(definition) = self.definitions.get(id) {
            self.removed_binding_ids
                .extend(definition.bindings().values().map(|b| b.identifier()));
        }
    }

    pub(crate) fn removed_binding_ids(&self) -> &IdSet<u64> {
        &self.removed_binding_ids
    }

    /// Ids removed from the builder so far.
    pub fn removed_ids(&self) -> &IndexSet<String> {
        &self.removed_ids
    }

    // ----- aliases -----

    /// Points `alias` at `target`, replacing any definition with that id.
    pub fn set_alias(&mut self, alias: &str, target: impl Into<Alias>) -> CompileResult<&mut Alias> {
        check_alias_id(alias)?;
        let target = target.into();
        if alias == target.id() {
            return Err(CompileError::invalid(format!(
                "An alias cannot reference itself, got a circular reference on \"{}\".",
                alias
            )));
        }
        self.definitions.shift_remove(alias);
        self.removed_ids.shift_remove(alias);
        let entry = self.aliases.entry(alias.to_string()).or_insert_with(|| Alias::new(""));
        *entry = target;
        Ok(entry)
    }

    pub fn has_alias(&self, id: &str) -> bool {
        self.aliases.contains_key(id)
    }

    pub fn alias(&self, id: &str) -> CompileResult<&Alias> {
        self.aliases
            .get(id)
            .ok_or_else(|| CompileError::invalid(format!("The service alias \"{}\" does not exist.", id)))
    }

    pub(crate) fn alias_mut(&mut self, id: &str) -> Option<&mut Alias> {
        self.aliases.get_mut(id)
    }

    pub fn remove_alias(&mut self, id: &str) -> Option<Alias> {
        let removed = self.aliases.shift_remove(id)?;
        self.removed_ids.insert(id.to_string());
        Some(removed)
    }

    pub fn aliases(&self) -> &IndexMap<String, Alias> {
        &self.aliases
    }

    pub fn set_aliases(&mut self, aliases: IndexMap<String, Alias>) -> CompileResult<()> {
        self.aliases.clear();
        for (id, alias) in aliases {
            self.set_alias(&id, alias)?;
        }
        Ok(())
    }

    /// True for definitions, aliases and the container itself.
    pub fn has(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.aliases.contains_key(id) || id == SERVICE_CONTAINER_ID
    }

    /// Every definition and alias id.
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().chain(self.aliases.keys()).map(String::as_str)
    }

    /// Id reached by following the alias chain from `id`.
    pub fn resolve_alias_chain(&self, id: &str) -> CompileResult<String> {
        let mut current = id.to_string();
        let mut seen: Vec<String> = Vec::new();
        while let Some(alias) = self.aliases.get(&current) {
            current = alias.id().to_string();
            if let Some(start) = seen.iter().position(|s| *s == current) {
                let mut path = seen[start..].to_vec();
                path.push(current.clone());
                return Err(CompileError::circular(current, path));
            }
            seen.push(current.clone());
        }
        Ok(current)
    }

    /// Definition reached by following aliases from `id`.
    pub fn find_definition(&self, id: &str) -> CompileResult<&Definition> {
        let target = self.resolve_alias_chain(id)?;
        self.definition(&target)
    }

    /// [`find_definition`](Self::find_definition) without the cycle error;
    /// `None` when the chain is broken or circular.
    pub(crate) fn find_definition_arc(&self, id: &str) -> Option<(String, &Arc<Definition>)> {
        let target = self.resolve_alias_chain(id).ok()?;
        let definition = self.definitions.get(&target)?;
        Some((target, definition))
    }

    /// Services tagged `tag`, with the attributes of every occurrence.
    ///
    /// Services tagged `container.excluded` are skipped.
    pub fn find_tagged_service_ids(
        &self,
        tag: &str,
        throw_on_abstract: bool,
    ) -> CompileResult<IndexMap<String, Vec<TagAttributes>>> {
        let mut tagged = IndexMap::new();
        for (id, definition) in &self.definitions {
            if !definition.has_tag(tag) || definition.has_tag(EXCLUDED_TAG) {
                continue;
            }
            if throw_on_abstract && definition.is_abstract() {
                return Err(CompileError::invalid(format!(
                    "The service \"{}\" tagged \"{}\" must not be abstract.",
                    id, tag
                )));
            }
            tagged.insert(id.clone(), definition.tag(tag).to_vec());
        }
        Ok(tagged)
    }

    /// Every tag name in use, in order of first appearance.
    pub fn find_tags(&self) -> IndexSet<String> {
        self.definitions
            .values()
            .flat_map(|definition| definition.tags().keys().cloned())
            .collect()
    }

    // ----- autoconfiguration -----

    /// Template applied to every autoconfigured definition whose class is a
    /// subtype of `ty`.
    pub fn register_for_autoconfiguration(&mut self, ty: &str) -> &mut Definition {
        self.autoconfigured_instanceof.entry(ty.to_string()).or_default()
    }

    pub fn autoconfigured_instanceof(&self) -> &IndexMap<String, Definition> {
        &self.autoconfigured_instanceof
    }

    /// Registers an alias `Type $name` so that autowiring picks `id` for
    /// parameters of type `ty` named `name`.
    ///
    /// `name` defaults to `id` and is camel-cased.
    pub fn register_alias_for_argument(&mut self, id: &str, ty: &str, name: Option<&str>) -> CompileResult<&mut Alias> {
        let name = name.unwrap_or(id);
        let parsed = camel_case(name);
        if !parsed.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            let service = if id != name {
                format!(" for service \"{}\"", id)
            } else {
                String::new()
            };
            return Err(CompileError::invalid(format!(
                "Invalid argument name \"{}\"{}: the first character must be a letter.",
                name, service
            )));
        }
        if parsed != name {
            self.set_alias(&format!(".{} ${}", ty, name), format!("{} ${}", ty, parsed))?;
        }
        self.set_alias(&format!("{} ${}", ty, parsed), id)
    }

    // ----- parameters -----

    pub fn parameters(&self) -> &ParameterBag {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterBag {
        &mut self.parameters
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<crate::Value>) -> &mut Self {
        self.parameters.set(name, value);
        self
    }

    /// Rewrites env placeholders in `text` as `%env(NAME)%`.
    pub fn resolve_env_placeholders(&self, text: &str) -> (String, Vec<String>) {
        self.parameters.resolve_env_placeholders(text)
    }

    // ----- classes -----

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    pub fn register_class(&mut self, class: ClassMetadata) -> &mut Self {
        self.classes.register(class);
        self
    }

    // ----- graph -----

    pub fn graph(&self) -> &ServiceReferenceGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ServiceReferenceGraph {
        &mut self.graph
    }

    // ----- compilation -----

    /// Appends `"PassName: message"` to the compilation log.
    pub fn log(&mut self, pass: &str, message: impl AsRef<str>) {
        let line = format!("{}: {}", pass, message.as_ref());
        debug!(pass, message = message.as_ref(), "compiler log");
        self.log.push(line);
    }

    pub fn log_entries(&self) -> &[String] {
        &self.log
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut Compiler {
        &mut self.compiler
    }

    /// Adds `pass` to `phase`; higher priorities run first.
    pub fn add_compiler_pass(&mut self, pass: Box<dyn CompilerPass>, phase: PassPhase, priority: i32) -> &mut Self {
        self.compiler.add_pass(pass, phase, priority);
        self
    }

    /// Runs every configured pass.
    ///
    /// On failure the builder is left as the failing pass left it.
    pub fn compile(&mut self) -> CompileResult<()> {
        let mut compiler = std::mem::take(&mut self.compiler);
        let result = compiler.compile(self);
        self.compiler = compiler;
        result?;
        self.compiled = true;
        info!(
            definitions = self.definitions.len(),
            aliases = self.aliases.len(),
            removed = self.removed_ids.len(),
            "container compiled"
        );
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Alternatives for a missing service id, for error messages.
    pub(crate) fn service_alternatives(&self, id: &str, skip: Option<&str>) -> Vec<String> {
        alternatives(
            id,
            self.service_ids()
                .filter(|candidate| !candidate.starts_with('.') && Some(*candidate) != skip),
        )
    }
}
