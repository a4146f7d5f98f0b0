use ferrous_container::{
    AnalyzeServiceReferencesPass, Argument, CompilerPass, ContainerBuilder, InlineServiceDefinitionsPass, Reference,
    RemoveUnusedDefinitionsPass, Value, SERVICE_CONTAINER_ID,
};
use proptest::prelude::*;

/// Services `s0..sN`, each with its public flag and the indices it uses.
fn services() -> impl Strategy<Value = Vec<(bool, Vec<usize>)>> {
    prop::collection::vec((any::<bool>(), prop::collection::vec(0usize..12, 0..4)), 1..12)
}

fn build(services: &[(bool, Vec<usize>)]) -> ContainerBuilder {
    let mut container = ContainerBuilder::new();
    for (i, (public, uses)) in services.iter().enumerate() {
        let definition = container.register(&format!("s{}", i), Some("App\\Service"));
        definition.set_public(*public);
        for used in uses {
            definition.add_argument(Reference::new(format!("s{}", used % services.len())));
        }
    }
    container
}

fn ids(container: &ContainerBuilder) -> Vec<String> {
    container.definitions().keys().cloned().collect()
}

proptest! {
    #[test]
    fn removal_is_idempotent(services in services()) {
        let mut container = build(&services);
        RemoveUnusedDefinitionsPass.process(&mut container).unwrap();
        let kept = ids(&container);
        let logged = container.log_entries().len();

        RemoveUnusedDefinitionsPass.process(&mut container).unwrap();
        prop_assert_eq!(ids(&container), kept);
        prop_assert_eq!(container.log_entries().len(), logged);
    }

    #[test]
    fn kept_services_only_use_kept_services(services in services()) {
        let mut container = build(&services);
        RemoveUnusedDefinitionsPass.process(&mut container).unwrap();

        for (i, (public, _)) in services.iter().enumerate() {
            if *public {
                let id = format!("s{}", i);
                prop_assert!(container.has_definition(&id));
            }
        }
        for definition in container.definitions().values() {
            for argument in definition.arguments().values() {
                let target = argument.as_reference().unwrap().id();
                prop_assert!(container.has_definition(target), "{} was removed while still used", target);
            }
        }
    }

    #[test]
    fn inlining_never_leaves_dangling_references(services in services()) {
        let mut container = build(&services);
        AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
        // cycles through non-shared services are the only failure; none are generated here
        InlineServiceDefinitionsPass::new().process(&mut container).unwrap();

        fn check(container: &ContainerBuilder, value: &Value) -> bool {
            match value {
                Value::Reference(reference) => container.has_definition(reference.id()),
                Value::Definition(definition) => definition.arguments().values().all(|v| check(container, v)),
                _ => true,
            }
        }
        for definition in container.definitions().values() {
            prop_assert!(definition.arguments().values().all(|v| check(&container, v)));
        }
    }
}

#[test]
fn compilation_inlines_and_removes_in_one_go() {
    let mut container = ContainerBuilder::new();
    container
        .register("app", Some("App\\App"))
        .set_public(true)
        .add_argument(Reference::new("router"))
        .add_argument(Argument::service_closure(Reference::new("profiler")));
    container.register("router", Some("App\\Router")).add_argument(Reference::new("request"));
    container.register("request", Some("App\\Request")).set_shared(false);
    container.register("profiler", Some("App\\Profiler"));
    container.register("debug", Some("App\\Debug")).add_argument(Reference::new("profiler"));

    container.compile().unwrap();

    assert_eq!(ids(&container), [SERVICE_CONTAINER_ID, "app", "profiler"]);
    let router = container.definition("app").unwrap().arguments()[0].as_definition().unwrap().clone();
    assert_eq!(router.class(), Some("App\\Router"));
    let request = router.arguments()[0].as_definition().unwrap();
    assert_eq!(request.class(), Some("App\\Request"));
    assert!(!request.is_shared());
}
