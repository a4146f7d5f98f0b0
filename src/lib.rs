//! # ferrous-container
//!
//! The compile step of a dependency injection container: service
//! definitions go in, an optimized and validated set of definitions comes
//! out.
//!
//! ## Features
//!
//! - **Definitions and aliases**: classes, arguments, method calls, tags,
//!   child definitions and decoration, all kept in registration order
//! - **Autowiring**: constructor and setter injection from class metadata,
//!   with named and typed bindings
//! - **Ordered pipeline**: passes grouped in phases and sorted by priority,
//!   with room for custom passes
//! - **Graph checks**: circular references, invalid references and abstract
//!   targets are reported with the path that caused them
//! - **Optimization**: private aliases are folded away, unused services
//!   removed and single-use services inlined
//! - **Observability**: `tracing` spans, a compiler log and pluggable
//!   [`CompilerObserver`]s
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_container::{ClassMetadata, ContainerBuilder, ParameterMetadata};
//!
//! let mut container = ContainerBuilder::new();
//! container
//!     .register_class(ClassMetadata::class("App\\Transport"))
//!     .register_class(
//!         ClassMetadata::class("App\\Mailer").constructor([ParameterMetadata::typed("transport", "App\\Transport")]),
//!     );
//!
//! container.register("App\\Transport", None);
//! container.autowire("mailer", Some("App\\Mailer")).set_public(true);
//!
//! container.compile().unwrap();
//!
//! // the transport was only used by the mailer, so it now lives inside it
//! assert!(!container.has_definition("App\\Transport"));
//! let transport = container.definition("mailer").unwrap().arguments()[0].as_definition().unwrap().clone();
//! assert_eq!(transport.class(), Some("App\\Transport"));
//! assert!(container
//!     .log_entries()
//!     .iter()
//!     .any(|line| line == "InlineServiceDefinitionsPass: Inlined service \"App\\Transport\" to \"mailer\"."));
//! ```
//!
//! ## Custom Passes
//!
//! ```rust
//! use ferrous_container::{CompileResult, CompilerPass, ContainerBuilder, PassPhase};
//!
//! struct PublicByDefault;
//!
//! impl CompilerPass for PublicByDefault {
//!     fn name(&self) -> &'static str {
//!         "PublicByDefault"
//!     }
//!
//!     fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
//!         let ids: Vec<String> = container.definitions().keys().cloned().collect();
//!         for id in ids {
//!             container.definition_mut(&id)?.set_public(true);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut container = ContainerBuilder::new();
//! container.register("cache", Some("App\\Cache"));
//! container.add_compiler_pass(Box::new(PublicByDefault), PassPhase::BeforeOptimization, 10);
//! container.compile().unwrap();
//! assert!(container.definition("cache").unwrap().is_public());
//! ```
//!
//! ## Errors
//!
//! Every pass returns a [`CompileResult`]; the first error stops the
//! compilation.
//!
//! ```rust
//! use ferrous_container::{CompileError, ContainerBuilder, Reference};
//!
//! let mut container = ContainerBuilder::new();
//! container.register("mailer", Some("App\\Mailer")).set_public(true).add_argument(Reference::new("loger"));
//! container.register("logger", Some("App\\Logger"));
//!
//! let err = container.compile().unwrap_err();
//! assert!(matches!(err, CompileError::ServiceNotFound { .. }));
//! ```

// Module declarations
pub mod argument;
pub mod class;
pub mod compiler;
pub mod config;
pub mod container;
pub mod definition;
pub mod error;
pub mod graph;
pub mod observer;
pub mod parameters;
pub mod reference;
pub mod value;

#[cfg(feature = "graph-export")]
pub mod graph_export;

mod internal;

// Core re-exports
pub use argument::{Argument, ServiceLocatorArgument, TaggedIteratorArgument};
pub use container::{ContainerBuilder, EXCLUDED_TAG, SERVICE_CONTAINER_ID};
pub use definition::{
    Alias, BindingKind, BoundArgument, Callable, Changes, Decoration, Definition, Deprecation, MethodCall,
    TagAttributes, DEFAULT_ALIAS_DEPRECATION_TEMPLATE, DEFAULT_DEPRECATION_TEMPLATE,
};
pub use error::{CompileError, CompileResult};
pub use parameters::ParameterBag;
pub use reference::{InvalidBehavior, Reference};
pub use value::{ArgKey, Value, ValueMap};

// Class metadata
pub use class::{
    is_builtin_type, ClassKind, ClassMetadata, ClassRegistry, MethodMetadata, ParameterMetadata, SubscribedService,
    CONTAINER_INTERFACE, SERVICE_LOCATOR_CLASS, SERVICE_PROVIDER_INTERFACE, SERVICE_SUBSCRIBER_INTERFACE,
};

// Compiler and pipeline
pub use compiler::{
    constructor_of, method_of, process_definitions, walk_children, walk_map, Compiler, CompilerPass, PassConfig,
    PassPhase, RecursivePass, Signature, WalkContext,
};
pub use config::{CompilerConfig, ConfigSource, EnvironmentConfigSource, MapConfigSource, ENV_PREFIX};
pub use graph::{EdgeKind, GraphEdge, GraphNode, NodeValue, ServiceReferenceGraph};
pub use observer::{CompilerObserver, Observers, PassTiming, PassTimings, TracingObserver};

// Built-in passes
pub use compiler::passes::{
    find_and_sort_tagged_services, register_service_locator, AnalyzeServiceReferencesPass, AutoAliasServicePass,
    AutowirePass, AutowireRequiredMethodsPass, CheckArgumentsValidityPass, CheckCircularReferencesPass,
    CheckDefinitionValidityPass, CheckExceptionOnInvalidReferenceBehaviorPass, CheckReferenceValidityPass,
    CheckTypeDeclarationsPass, DecoratorServicePass, DefinitionErrorExceptionPass, InlineServiceDefinitionsPass,
    RegisterServiceSubscribersPass, RemoveAbstractDefinitionsPass, RemovePrivateAliasesPass,
    RemoveUnusedDefinitionsPass, ReplaceAliasByActualDefinitionPass, ResolveBindingsPass, ResolveChildDefinitionsPass,
    ResolveClassPass, ResolveDecoratorStackPass, ResolveFactoryClassPass, ResolveHotPathPass,
    ResolveInstanceofConditionalsPass, ResolveInvalidReferencesPass, ResolveNamedArgumentsPass,
    ResolveNoPreloadPass, ResolveParameterPlaceHoldersPass, ResolveReferencesToAliasesPass,
    ResolveServiceSubscribersPass, ResolveTaggedIteratorArgumentPass, ServiceLocatorTagPass, DECORATOR_TAG,
    DO_NOT_INLINE_TAG, ERROR_TAG, INNER_ID, SERVICE_LOCATOR_TAG, STACK_TAG,
};

// Graph export
#[cfg(feature = "graph-export")]
pub use graph_export::{ExportFormat, ExportOptions, GraphExport, GraphExporter};
