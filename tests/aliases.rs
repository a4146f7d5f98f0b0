/// Alias resolution through the whole pipeline, plus properties of alias
/// chains of any length.
use ferrous_container::{Alias, CompilerPass, ContainerBuilder, Reference, ResolveReferencesToAliasesPass, Value};
use proptest::prelude::*;

#[test]
fn private_alias_chains_disappear_after_compilation() {
    let mut container = ContainerBuilder::new();
    container.register("mailer", Some("App\\Mailer")).set_public(true);
    container.set_alias("mailer.real_alias", "mailer").unwrap();
    container.set_alias("mailer.alias", "mailer.real_alias").unwrap();
    container
        .register("app", Some("App\\App"))
        .set_public(true)
        .add_argument(Reference::new("mailer.alias"));

    container.compile().unwrap();

    assert!(container.aliases().is_empty());
    assert_eq!(container.definition("app").unwrap().arguments()[0], Value::reference("mailer"));
}

#[test]
fn public_alias_takes_the_place_of_its_private_target() {
    let mut container = ContainerBuilder::new();
    container.register("mailer", Some("App\\Mailer"));
    container.set_alias("app.mailer", Alias::public("mailer")).unwrap();
    container
        .register("newsletter", Some("App\\Newsletter"))
        .set_public(true)
        .add_argument(Reference::new("mailer"))
        .add_argument(Reference::new("app.mailer"));

    container.compile().unwrap();

    assert!(!container.has_definition("mailer"));
    assert!(!container.has_alias("app.mailer"));
    let moved = container.definition("app.mailer").unwrap();
    assert!(moved.is_public());
    assert_eq!(moved.class(), Some("App\\Mailer"));
    let arguments = container.definition("newsletter").unwrap().arguments().clone();
    assert_eq!(arguments[0], Value::reference("app.mailer"));
    assert_eq!(arguments[1], Value::reference("app.mailer"));
}

#[test]
fn alias_cycles_abort_the_compilation() {
    let mut container = ContainerBuilder::new();
    container.set_alias("a", "b").unwrap();
    container.set_alias("b", "a").unwrap();
    let err = container.compile().unwrap_err();
    assert!(err.is_circular());
}

#[test]
fn aliases_cannot_point_at_themselves() {
    let mut container = ContainerBuilder::new();
    let err = container.set_alias("mailer", "mailer").unwrap_err();
    assert_eq!(
        err.to_string(),
        "An alias cannot reference itself, got a circular reference on \"mailer\"."
    );
}

proptest! {
    #[test]
    fn references_through_any_chain_reach_the_definition(length in 1usize..8, pick in 0usize..8) {
        let mut container = ContainerBuilder::new();
        container.register("target", Some("App\\Target"));
        for i in 0..length {
            let next = if i + 1 == length { "target".to_string() } else { format!("alias{}", i + 1) };
            container.set_alias(&format!("alias{}", i), next.as_str()).unwrap();
        }
        let used = format!("alias{}", pick % length);
        container.register("consumer", None).add_argument(Reference::new(used.as_str()));

        prop_assert_eq!(container.resolve_alias_chain(&used).unwrap(), "target");

        ResolveReferencesToAliasesPass.process(&mut container).unwrap();

        let consumer = container.definition("consumer").unwrap();
        prop_assert_eq!(consumer.arguments()[0].as_reference().unwrap().id(), "target");
        for alias in container.aliases().values() {
            prop_assert_eq!(alias.id(), "target");
        }
    }

    #[test]
    fn resolving_aliases_twice_changes_nothing(length in 1usize..6) {
        let mut container = ContainerBuilder::new();
        container.register("target", None);
        for i in 0..length {
            let next = if i == 0 { "target".to_string() } else { format!("alias{}", i - 1) };
            container.set_alias(&format!("alias{}", i), next.as_str()).unwrap();
        }
        container.register("consumer", None).add_argument(Reference::new(format!("alias{}", length - 1)));

        ResolveReferencesToAliasesPass.process(&mut container).unwrap();
        let once = container.definition("consumer").unwrap().clone();
        let aliases = container.aliases().clone();

        ResolveReferencesToAliasesPass.process(&mut container).unwrap();
        prop_assert_eq!(container.definition("consumer").unwrap(), &once);
        prop_assert_eq!(container.aliases(), &aliases);
    }
}
