//! The compiler: an ordered pipeline of passes over a [`ContainerBuilder`].
//!
//! Passes are grouped in phases that always run in the same order (merge,
//! before optimization, optimization, before removing, removing, after
//! removing). Within a phase, passes run by descending priority and in
//! registration order for equal priorities.

pub mod passes;
mod walker;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

pub use crate::config::CompilerConfig;
use crate::container::ContainerBuilder;
use crate::error::{CompileError, CompileResult};
use crate::observer::{CompilerObserver, Observers};

pub use walker::{
    constructor_of, method_of, process_definitions, walk_children, walk_map, RecursivePass, Signature, WalkContext,
};
pub(crate) use walker::{class_of, process_root};

/// One transformation or validation of the container.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{CompileResult, CompilerPass, ContainerBuilder, PassPhase};
///
/// struct TagEverything;
///
/// impl CompilerPass for TagEverything {
///     fn name(&self) -> &'static str {
///         "TagEverything"
///     }
///
///     fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
///         let ids: Vec<String> = container.definitions().keys().cloned().collect();
///         for id in ids {
///             container.definition_mut(&id)?.add_tag("app.seen");
///         }
///         Ok(())
///     }
/// }
///
/// let mut container = ContainerBuilder::new();
/// container.register("mailer", Some("App\\Mailer")).set_public(true);
/// container.add_compiler_pass(Box::new(TagEverything), PassPhase::BeforeOptimization, 0);
/// container.compile().unwrap();
/// assert!(container.definition("mailer").unwrap().has_tag("app.seen"));
/// ```
pub trait CompilerPass: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()>;
}

/// Phases of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassPhase {
    Merge,
    BeforeOptimization,
    Optimization,
    BeforeRemoving,
    Removing,
    AfterRemoving,
}

impl PassPhase {
    pub const ALL: [PassPhase; 6] = [
        PassPhase::Merge,
        PassPhase::BeforeOptimization,
        PassPhase::Optimization,
        PassPhase::BeforeRemoving,
        PassPhase::Removing,
        PassPhase::AfterRemoving,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

struct RegisteredPass {
    priority: i32,
    pass: Box<dyn CompilerPass>,
}

/// The passes of each phase.
#[derive(Default)]
pub struct PassConfig {
    phases: [Vec<RegisteredPass>; 6],
}

impl fmt::Debug for PassConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(PassPhase::ALL.iter().map(|phase| (phase, self.pass_names(*phase))))
            .finish()
    }
}

impl PassConfig {
    /// No pass at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard pipeline, shaped by `config`.
    pub fn default_pipeline(config: &CompilerConfig) -> Self {
        use passes::*;

        let mut pipeline = Self::empty();
        let mut add = |phase: PassPhase, pass: Box<dyn CompilerPass>| pipeline.add_pass(pass, phase, 0);

        add(PassPhase::BeforeOptimization, Box::new(ResolveClassPass));
        add(
            PassPhase::BeforeOptimization,
            Box::new(ResolveInstanceofConditionalsPass::new(config.behavior_describing_tags.clone())),
        );

        add(PassPhase::Optimization, Box::new(AutoAliasServicePass));
        add(PassPhase::Optimization, Box::new(ResolveDecoratorStackPass));
        add(PassPhase::Optimization, Box::new(ResolveChildDefinitionsPass::new()));
        add(PassPhase::Optimization, Box::new(RegisterServiceSubscribersPass));
        add(PassPhase::Optimization, Box::new(ResolveParameterPlaceHoldersPass::new()));
        add(PassPhase::Optimization, Box::new(ResolveFactoryClassPass));
        add(PassPhase::Optimization, Box::new(ResolveNamedArgumentsPass));
        add(PassPhase::Optimization, Box::new(AutowireRequiredMethodsPass));
        add(PassPhase::Optimization, Box::new(ResolveBindingsPass::new()));
        add(PassPhase::Optimization, Box::new(ServiceLocatorTagPass));
        add(
            PassPhase::Optimization,
            Box::new(DecoratorServicePass::new(config.behavior_describing_tags.clone())),
        );
        add(PassPhase::Optimization, Box::new(CheckDefinitionValidityPass));
        add(
            PassPhase::Optimization,
            Box::new(
                AutowirePass::new(config.throw_on_autowire_error).creating_missing(config.autowire_creates_missing),
            ),
        );
        add(PassPhase::Optimization, Box::new(ServiceLocatorTagPass));
        add(PassPhase::Optimization, Box::new(ResolveTaggedIteratorArgumentPass));
        add(PassPhase::Optimization, Box::new(ResolveServiceSubscribersPass::default()));
        add(PassPhase::Optimization, Box::new(ResolveReferencesToAliasesPass));
        add(PassPhase::Optimization, Box::new(ResolveInvalidReferencesPass::new()));
        add(PassPhase::Optimization, Box::new(AnalyzeServiceReferencesPass::constructor_only()));
        add(PassPhase::Optimization, Box::new(CheckCircularReferencesPass::new()));
        add(PassPhase::Optimization, Box::new(CheckReferenceValidityPass));
        add(PassPhase::Optimization, Box::new(CheckArgumentsValidityPass::new(false)));
        if config.check_type_declarations {
            add(PassPhase::Optimization, Box::new(CheckTypeDeclarationsPass::new(true)));
        }

        add(PassPhase::BeforeRemoving, Box::new(AnalyzeServiceReferencesPass::full()));
        add(PassPhase::BeforeRemoving, Box::new(ResolveHotPathPass::new(&config.hot_path_tag)));
        add(PassPhase::BeforeRemoving, Box::new(ResolveNoPreloadPass::new(&config.no_preload_tag)));

        add(PassPhase::Removing, Box::new(RemovePrivateAliasesPass));
        add(PassPhase::Removing, Box::new(ReplaceAliasByActualDefinitionPass::default()));
        add(PassPhase::Removing, Box::new(RemoveAbstractDefinitionsPass));
        if config.remove_unused {
            add(PassPhase::Removing, Box::new(RemoveUnusedDefinitionsPass));
        }
        add(PassPhase::Removing, Box::new(AnalyzeServiceReferencesPass::full()));
        add(PassPhase::Removing, Box::new(CheckExceptionOnInvalidReferenceBehaviorPass));
        if config.inline_services {
            add(PassPhase::Removing, Box::new(InlineServiceDefinitionsPass::new()));
        }
        add(PassPhase::Removing, Box::new(AnalyzeServiceReferencesPass::full()));
        add(PassPhase::Removing, Box::new(DefinitionErrorExceptionPass));

        pipeline
    }

    /// Adds `pass` after every pass of `phase` with a priority at least
    /// as high.
    pub fn add_pass(&mut self, pass: Box<dyn CompilerPass>, phase: PassPhase, priority: i32) {
        let passes = &mut self.phases[phase.slot()];
        let position = passes.iter().position(|p| p.priority < priority).unwrap_or(passes.len());
        passes.insert(position, RegisteredPass { priority, pass });
    }

    /// Names of the passes of `phase`, in execution order.
    pub fn pass_names(&self, phase: PassPhase) -> Vec<&'static str> {
        self.phases[phase.slot()].iter().map(|p| p.pass.name()).collect()
    }

    /// Every pass name, phase after phase.
    pub fn all_pass_names(&self) -> Vec<&'static str> {
        PassPhase::ALL.iter().flat_map(|phase| self.pass_names(*phase)).collect()
    }

    /// Removes every pass of `phase`.
    pub fn clear_phase(&mut self, phase: PassPhase) {
        self.phases[phase.slot()].clear();
    }
}

/// Runs a [`PassConfig`] over a container.
#[derive(Debug)]
pub struct Compiler {
    passes: PassConfig,
    observers: Observers,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::with_config(&CompilerConfig::default())
    }
}

impl Compiler {
    pub fn with_config(config: &CompilerConfig) -> Self {
        Self::with_passes(PassConfig::default_pipeline(config))
    }

    pub fn with_passes(passes: PassConfig) -> Self {
        Self {
            passes,
            observers: Observers::new(),
        }
    }

    pub fn pass_config(&self) -> &PassConfig {
        &self.passes
    }

    pub fn pass_config_mut(&mut self) -> &mut PassConfig {
        &mut self.passes
    }

    pub fn add_pass(&mut self, pass: Box<dyn CompilerPass>, phase: PassPhase, priority: i32) {
        self.passes.add_pass(pass, phase, priority);
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CompilerObserver>) {
        self.observers.add(observer);
    }

    /// Runs every pass in order; the first error aborts the compilation.
    ///
    /// Error messages mentioning env placeholders are rewritten to show
    /// `%env(NAME)%` and wrapped in [`CompileError::EnvParameter`]. The
    /// reference graph is cleared whatever the outcome.
    pub fn compile(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let result = self.run(container);
        container.graph_mut().clear();
        result
    }

    fn run(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        for phase in PassPhase::ALL {
            for registered in self.passes.phases[phase.slot()].iter_mut() {
                let name = registered.pass.name();
                debug!(pass = name, ?phase, "running compiler pass");
                self.observers.pass_started(name, phase);
                let log_start = container.log_entries().len();
                let started = Instant::now();
                let outcome = registered.pass.process(container);
                for line in &container.log_entries()[log_start..] {
                    self.observers.logged(line);
                }
                if let Err(error) = outcome {
                    let error = resolve_env_in_error(container, error);
                    warn!(pass = name, ?phase, %error, "compilation aborted");
                    self.observers.pass_failed(name, phase, &error);
                    return Err(error);
                }
                self.observers.pass_finished(name, phase, started.elapsed());
            }
        }
        Ok(())
    }
}

fn resolve_env_in_error(container: &ContainerBuilder, error: CompileError) -> CompileError {
    let message = error.to_string();
    let (resolved, envs) = container.resolve_env_placeholders(&message);
    if envs.is_empty() {
        return error;
    }
    let source = match error {
        CompileError::InvalidArgument(_) => CompileError::InvalidArgument(resolved),
        CompileError::OutOfBounds(_) => CompileError::OutOfBounds(resolved),
        CompileError::Autowiring { service_id, .. } => CompileError::Autowiring {
            service_id,
            message: resolved,
        },
        _ => CompileError::Runtime(resolved),
    };
    CompileError::EnvParameter {
        message: format!(
            "Incompatible use of dynamic environment variables \"{}\" found in parameters.",
            envs.join("\", \"")
        ),
        envs,
        source: Box::new(source),
    }
}
