use ferrous_container::{
    find_and_sort_tagged_services, Argument, CompileError, ContainerBuilder, InvalidBehavior, MethodCall, Reference,
    TagAttributes, TaggedIteratorArgument, Value,
};

fn pair(container: &mut ContainerBuilder) {
    container.register("a", Some("App\\A")).set_public(true);
    container.register("b", Some("App\\B")).set_public(true).add_argument(Reference::new("a"));
}

#[test]
fn constructor_cycles_are_fatal() {
    let mut container = ContainerBuilder::new();
    pair(&mut container);
    container.definition_mut("a").unwrap().add_argument(Reference::new("b"));

    let err = container.compile().unwrap_err();
    match &err {
        CompileError::CircularReference { id, path } => {
            assert_eq!(id, "a");
            assert_eq!(path, &["a", "b", "a"]);
        }
        other => panic!("expected a circular reference, got {:?}", other),
    }
    assert_eq!(err.to_string(), "Circular reference detected for service \"a\", path: \"a -> b -> a\".");
}

#[test]
fn longer_cycles_report_the_whole_path() {
    let mut container = ContainerBuilder::new();
    container.register("a", Some("App\\A")).set_public(true).add_argument(Reference::new("b"));
    container.register("b", Some("App\\B")).set_public(true).add_argument(Reference::new("c"));
    container.register("c", Some("App\\C")).set_public(true).add_argument(Reference::new("a"));

    let err = container.compile().unwrap_err();
    assert_eq!(err.to_string(), "Circular reference detected for service \"a\", path: \"a -> b -> c -> a\".");

    let mut container = ContainerBuilder::new();
    for (id, next) in [("a", "b"), ("b", "c"), ("c", "a")] {
        container
            .register(id, Some("App\\Node"))
            .set_public(true)
            .add_method_call(MethodCall::new("setNext", [Value::reference(next)]))
            .unwrap();
    }
    container.compile().unwrap();
}

#[test]
fn cycles_through_aliases_are_named_from_the_first_service() {
    let mut container = ContainerBuilder::new();
    container.register("a", Some("App\\A")).set_public(true).add_argument(Reference::new("alias_b"));
    container.register("b", Some("App\\B")).set_public(true).add_argument(Reference::new("a"));
    container.set_alias("alias_b", "b").unwrap();

    let err = container.compile().unwrap_err();
    match &err {
        CompileError::CircularReference { id, path } => {
            assert_eq!(id, "a");
            assert_eq!(path, &["a", "b", "a"]);
        }
        other => panic!("expected a circular reference, got {:?}", other),
    }
}

#[test]
fn closures_break_cycles() {
    let mut container = ContainerBuilder::new();
    pair(&mut container);
    container
        .definition_mut("a")
        .unwrap()
        .add_argument(Argument::service_closure(Reference::new("b")));
    container.compile().unwrap();
}

#[test]
fn setter_cycles_are_allowed() {
    let mut container = ContainerBuilder::new();
    pair(&mut container);
    container
        .definition_mut("a")
        .unwrap()
        .add_method_call(MethodCall::new("setB", [Value::reference("b")]))
        .unwrap();
    container.compile().unwrap();
    assert!(container.definition("a").unwrap().has_method_call("setB"));
}

#[test]
fn missing_services_suggest_alternatives() {
    let mut container = ContainerBuilder::new();
    container.register("logger", Some("App\\Logger")).set_public(true);
    container.register("mailer", Some("App\\Mailer")).set_public(true).add_argument(Reference::new("loger"));

    let err = container.compile().unwrap_err();
    assert_eq!(
        err.to_string(),
        "The service \"mailer\" has a dependency on a non-existent service \"loger\". Did you mean this: \"logger\"?"
    );
}

#[test]
fn tolerant_references_to_missing_services_are_resolved() {
    let mut container = ContainerBuilder::new();
    container
        .register("mailer", Some("App\\Mailer"))
        .set_public(true)
        .add_argument(Reference::with_behavior("logger", InvalidBehavior::Null))
        .add_method_call(MethodCall::new(
            "setCache",
            [Value::from(Reference::with_behavior("cache", InvalidBehavior::Ignore))],
        ))
        .unwrap();

    container.compile().unwrap();

    let mailer = container.definition("mailer").unwrap();
    assert_eq!(mailer.arguments()[0], Value::Null);
    assert!(!mailer.has_method_call("setCache"));
}

#[test]
fn abstract_definitions_cannot_be_referenced() {
    let mut container = ContainerBuilder::new();
    container.register("base", Some("App\\Base")).set_abstract(true);
    container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("base"));

    let err = container.compile().unwrap_err();
    assert_eq!(
        err.to_string(),
        "The definition \"app\" has a reference to an abstract definition \"base\". Abstract definitions cannot be the target of references."
    );
}

#[test]
fn tagged_services_sort_by_priority_then_registration() {
    let mut container = ContainerBuilder::new();
    for (id, priority) in [("zero", 0), ("first_five", 5), ("second_five", 5), ("negative", -1)] {
        let attributes: TagAttributes = [("priority".to_string(), Value::from(priority))].into_iter().collect();
        container.register(id, Some("App\\Handler")).add_tag_with("app.handler", attributes);
    }

    let sorted =
        find_and_sort_tagged_services(&TaggedIteratorArgument::new("app.handler"), &mut container, &[]).unwrap();
    let ids: Vec<&str> = sorted.values().filter_map(|v| v.as_reference()).map(|r| r.id()).collect();
    assert_eq!(ids, ["first_five", "second_five", "zero", "negative"]);
}
