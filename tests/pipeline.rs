use ferrous_container::{
    ClassMetadata, CompileError, CompileResult, Compiler, CompilerConfig, CompilerObserver, CompilerPass, ContainerBuilder,
    PassConfig, PassPhase, PassTimings, Reference,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Named(&'static str);

impl CompilerPass for Named {
    fn name(&self) -> &'static str {
        self.0
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        container.log(self.0, "ran");
        Ok(())
    }
}

struct Failing;

impl CompilerPass for Failing {
    fn name(&self) -> &'static str {
        "Failing"
    }

    fn process(&mut self, _container: &mut ContainerBuilder) -> CompileResult<()> {
        Err(CompileError::Runtime("Nope.".into()))
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl CompilerObserver for Recorder {
    fn pass_started(&self, pass: &str, _phase: PassPhase) {
        self.events.lock().push(format!("start {}", pass));
    }

    fn pass_finished(&self, pass: &str, _phase: PassPhase, _elapsed: Duration) {
        self.events.lock().push(format!("finish {}", pass));
    }

    fn pass_failed(&self, pass: &str, _phase: PassPhase, error: &CompileError) {
        self.events.lock().push(format!("fail {}: {}", pass, error));
    }

    fn logged(&self, line: &str) {
        self.events.lock().push(format!("log {}", line));
    }
}

#[test]
fn default_pipeline_removing_phase() {
    let compiler = Compiler::default();
    assert_eq!(
        compiler.pass_config().pass_names(PassPhase::Removing),
        vec![
            "RemovePrivateAliasesPass",
            "ReplaceAliasByActualDefinitionPass",
            "RemoveAbstractDefinitionsPass",
            "RemoveUnusedDefinitionsPass",
            "AnalyzeServiceReferencesPass",
            "CheckExceptionOnInvalidReferenceBehaviorPass",
            "InlineServiceDefinitionsPass",
            "AnalyzeServiceReferencesPass",
            "DefinitionErrorExceptionPass",
        ]
    );
    let all = compiler.pass_config().all_pass_names();
    assert_eq!(all.first(), Some(&"ResolveClassPass"));
    assert_eq!(all.last(), Some(&"DefinitionErrorExceptionPass"));
    assert!(compiler.pass_config().pass_names(PassPhase::Merge).is_empty());
    assert!(!all.contains(&"CheckTypeDeclarationsPass"));
}

#[test]
fn configuration_shapes_the_pipeline() {
    let config = CompilerConfig {
        inline_services: false,
        remove_unused: false,
        check_type_declarations: true,
        ..CompilerConfig::default()
    };
    let all = Compiler::with_config(&config).pass_config().all_pass_names();
    assert!(!all.contains(&"InlineServiceDefinitionsPass"));
    assert!(!all.contains(&"RemoveUnusedDefinitionsPass"));
    assert!(all.contains(&"CheckTypeDeclarationsPass"));

    let mut container = ContainerBuilder::with_config(config);
    container.register_class(ClassMetadata::class("App\\Unused"));
    container.register("unused", Some("App\\Unused"));
    container.compile().unwrap();
    assert!(container.has_definition("unused"));
}

#[test]
fn custom_passes_slot_into_their_phase() {
    let mut container = ContainerBuilder::new();
    container
        .add_compiler_pass(Box::new(Named("first")), PassPhase::Optimization, 10)
        .add_compiler_pass(Box::new(Named("last")), PassPhase::AfterRemoving, 0)
        .add_compiler_pass(Box::new(Named("merge")), PassPhase::Merge, -100);

    let optimization = container.compiler().pass_config().pass_names(PassPhase::Optimization);
    assert_eq!(optimization[0], "first");
    assert_eq!(optimization[1], "AutoAliasServicePass");

    container.compile().unwrap();
    assert!(container.is_compiled());
    let ran: Vec<&str> = container
        .log_entries()
        .iter()
        .filter(|line| line.ends_with(": ran"))
        .map(String::as_str)
        .collect();
    assert_eq!(ran, ["merge: ran", "first: ran", "last: ran"]);
}

#[test]
fn observers_see_every_pass_and_log_line() {
    let recorder = Arc::new(Recorder::default());
    let mut compiler = Compiler::with_passes(PassConfig::empty());
    compiler.add_pass(Box::new(Named("one")), PassPhase::BeforeOptimization, 0);
    compiler.add_pass(Box::new(Failing), PassPhase::Removing, 0);
    compiler.add_pass(Box::new(Named("never")), PassPhase::AfterRemoving, 0);
    compiler.add_observer(recorder.clone());

    let mut container = ContainerBuilder::new();
    let err = compiler.compile(&mut container).unwrap_err();
    assert_eq!(err.to_string(), "Nope.");
    assert_eq!(
        *recorder.events.lock(),
        ["start one", "log one: ran", "finish one", "start Failing", "fail Failing: Nope."]
    );
}

#[test]
fn timings_count_repeated_passes() {
    let timings = Arc::new(PassTimings::new());
    let mut container = ContainerBuilder::new();
    container.compiler_mut().add_observer(timings.clone());
    container.register("app", Some("App\\App")).set_public(true);
    container.compile().unwrap();

    let report = timings.snapshot();
    assert_eq!(report["AnalyzeServiceReferencesPass"].runs, 4);
    assert_eq!(report["ServiceLocatorTagPass"].runs, 2);
    assert_eq!(report["InlineServiceDefinitionsPass"].runs, 1);
    assert!(timings.total() >= report["InlineServiceDefinitionsPass"].total);
}

#[test]
fn graph_is_cleared_after_compilation() {
    let mut container = ContainerBuilder::new();
    container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("logger"));
    container.register("logger", Some("App\\Logger")).set_public(true);
    container.compile().unwrap();
    assert!(container.graph().is_empty());
}

#[test]
fn hot_path_and_removal_in_one_run() {
    let mut container = ContainerBuilder::new();
    container
        .register("kernel", Some("App\\Kernel"))
        .set_public(true)
        .add_tag("container.hot_path")
        .add_argument(Reference::new("router"));
    container.register("api", Some("App\\Api")).set_public(true).add_argument(Reference::new("router"));
    container.register("router", Some("App\\Router"));
    container.register("orphan", Some("App\\Orphan"));
    container.register("base", None).set_abstract(true);
    container.set_alias("app.router", "router").unwrap();

    container.compile().unwrap();

    let router = container.definition("router").unwrap();
    assert!(router.has_tag("container.hot_path"));
    assert!(!container.definition("api").unwrap().has_tag("container.hot_path"));
    assert!(!container.has_definition("orphan"));
    assert!(!container.has_definition("base"));
    assert!(!container.has_alias("app.router"));

    let log = container.log_entries();
    assert!(log.contains(&"RemovePrivateAliasesPass: Removed service \"app.router\"; reason: private alias.".to_string()));
    assert!(log.contains(&"RemoveAbstractDefinitionsPass: Removed service \"base\"; reason: abstract.".to_string()));
    assert!(log.contains(&"RemoveUnusedDefinitionsPass: Removed service \"orphan\"; reason: unused.".to_string()));
}

#[test]
fn errors_recorded_on_used_definitions_abort() {
    let mut container = ContainerBuilder::new();
    container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("broken"));
    container
        .register("broken", Some("App\\Broken"))
        .set_public(true)
        .add_error("Cannot autowire service \"broken\".");

    let err = container.compile().unwrap_err();
    assert_eq!(err.to_string(), "Cannot autowire service \"broken\".");
    assert!(!container.is_compiled());
}
