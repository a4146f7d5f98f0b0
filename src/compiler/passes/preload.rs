//! Preloading hints derived from the service reference graph.

use std::collections::VecDeque;

use tracing::debug;

use crate::compiler::CompilerPass;
use crate::container::ContainerBuilder;
use crate::error::CompileResult;
use crate::graph::ServiceReferenceGraph;
use crate::internal::IdSet;

/// Definitions reachable from `roots` through the edges `follow` accepts.
/// Traversal does not continue past nodes rejected by `enter`.
fn reachable<F, E>(graph: &ServiceReferenceGraph, roots: &[String], follow: F, mut enter: E) -> IdSet<String>
where
    F: Fn(&crate::graph::GraphEdge) -> bool,
    E: FnMut(&str) -> bool,
{
    let mut reached = IdSet::default();
    let mut pending: VecDeque<String> = VecDeque::new();
    for root in roots {
        if reached.insert(root.clone()) {
            pending.push_back(root.clone());
        }
    }
    while let Some(id) = pending.pop_front() {
        for edge in graph.out_edges(&id) {
            if !follow(edge) {
                continue;
            }
            let dest = graph.dest_of(edge);
            if !dest.is_definition() || reached.contains(dest.id()) {
                continue;
            }
            let dest_id = dest.id().to_string();
            if enter(&dest_id) {
                reached.insert(dest_id.clone());
                pending.push_back(dest_id);
            }
        }
    }
    reached
}

/// Propagates the hot-path tag to everything a hot-path service needs to be
/// built.
///
/// Lazy and weak uses are not followed. Deprecated services never carry
/// the tag; it is removed from them if set explicitly.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{AnalyzeServiceReferencesPass, CompilerPass, ContainerBuilder, Reference, ResolveHotPathPass};
///
/// let mut container = ContainerBuilder::new();
/// container.register("kernel", Some("App\\Kernel")).add_tag("container.hot_path").add_argument(Reference::new("router"));
/// container.register("router", Some("App\\Router"));
/// container.register("mailer", Some("App\\Mailer"));
///
/// AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
/// ResolveHotPathPass::new("container.hot_path").process(&mut container).unwrap();
///
/// assert!(container.definition("router").unwrap().has_tag("container.hot_path"));
/// assert!(!container.definition("mailer").unwrap().has_tag("container.hot_path"));
/// ```
#[derive(Debug, Clone)]
pub struct ResolveHotPathPass {
    tag: String,
}

impl Default for ResolveHotPathPass {
    fn default() -> Self {
        Self::new("container.hot_path")
    }
}

impl ResolveHotPathPass {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl CompilerPass for ResolveHotPathPass {
    fn name(&self) -> &'static str {
        "ResolveHotPathPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let mut roots = Vec::new();
        let mut deprecated = Vec::new();
        for (id, definition) in container.definitions() {
            if !definition.has_tag(&self.tag) {
                continue;
            }
            if definition.is_deprecated() {
                deprecated.push(id.clone());
            } else {
                roots.push(id.clone());
            }
        }
        for id in deprecated {
            container.definition_mut(&id)?.clear_tag(&self.tag);
        }

        let definitions = container.definitions();
        let reached = reachable(
            container.graph(),
            &roots,
            |edge| !edge.is_lazy() && !edge.is_weak(),
            |id| definitions.get(id).map_or(false, |definition| !definition.is_deprecated()),
        );

        let mut tagged = 0;
        for id in reached {
            let definition = container.definition_mut(&id)?;
            if !definition.has_tag(&self.tag) {
                definition.add_tag(self.tag.clone());
                tagged += 1;
            }
        }
        debug!(tag = %self.tag, roots = roots.len(), tagged, "hot path resolved");
        Ok(())
    }
}

/// Tags every definition that public services cannot reach with the
/// no-preload tag.
///
/// Roots are public definitions and the targets of public aliases. Weak
/// uses are not followed; lazy ones are, since the class is still needed.
/// Traversal stops at definitions already tagged, deprecated or in error,
/// and those are never tagged by this pass.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{AnalyzeServiceReferencesPass, CompilerPass, ContainerBuilder, Reference, ResolveNoPreloadPass};
///
/// let mut container = ContainerBuilder::new();
/// container.register("app", Some("App\\App")).set_public(true).add_argument(Reference::new("router"));
/// container.register("router", Some("App\\Router"));
/// container.register("debug", Some("App\\Debug"));
///
/// AnalyzeServiceReferencesPass::full().process(&mut container).unwrap();
/// ResolveNoPreloadPass::new("container.no_preload").process(&mut container).unwrap();
///
/// assert!(!container.definition("router").unwrap().has_tag("container.no_preload"));
/// assert!(container.definition("debug").unwrap().has_tag("container.no_preload"));
/// ```
#[derive(Debug, Clone)]
pub struct ResolveNoPreloadPass {
    tag: String,
}

impl Default for ResolveNoPreloadPass {
    fn default() -> Self {
        Self::new("container.no_preload")
    }
}

impl ResolveNoPreloadPass {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl CompilerPass for ResolveNoPreloadPass {
    fn name(&self) -> &'static str {
        "ResolveNoPreloadPass"
    }

    fn process(&mut self, container: &mut ContainerBuilder) -> CompileResult<()> {
        let definitions = container.definitions();
        let stops = |id: &str| {
            definitions
                .get(id)
                .map_or(true, |d| d.has_tag(&self.tag) || d.is_deprecated() || d.has_errors())
        };

        let mut roots: Vec<String> = Vec::new();
        for (id, definition) in definitions {
            if definition.is_public() && !stops(id) {
                roots.push(id.clone());
            }
        }
        for alias in container.aliases().values().filter(|alias| alias.is_public()) {
            if let Some((target, _)) = container.find_definition_arc(alias.id()) {
                if !stops(&target) && !roots.contains(&target) {
                    roots.push(target);
                }
            }
        }

        let preloaded = reachable(container.graph(), &roots, |edge| !edge.is_weak(), |id| !stops(id));

        let unreachable: Vec<String> = definitions
            .iter()
            .filter(|(id, definition)| {
                !preloaded.contains(id.as_str()) && !definition.is_deprecated() && !definition.has_errors()
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &unreachable {
            let definition = container.definition_mut(id)?;
            if !definition.has_tag(&self.tag) {
                definition.add_tag(self.tag.clone());
            }
        }
        debug!(tag = %self.tag, preloaded = preloaded.len(), skipped = unreachable.len(), "preload hints resolved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::Argument;
    use crate::compiler::passes::AnalyzeServiceReferencesPass;
    use crate::definition::{Alias, MethodCall};
    use crate::reference::{InvalidBehavior, Reference};
    use crate::value::Value;

    const HOT: &str = "container.hot_path";
    const NO_PRELOAD: &str = "container.no_preload";

    fn analyze(container: &mut ContainerBuilder) {
        AnalyzeServiceReferencesPass::full().process(container).unwrap();
    }

    #[test]
    fn hot_path_skips_lazy_weak_and_deprecated_uses() {
        let mut container = ContainerBuilder::new();
        container
            .register("kernel", None)
            .add_tag(HOT)
            .add_argument(Reference::new("router"))
            .add_argument(Argument::service_closure(Reference::new("profiler")))
            .add_argument(Reference::with_behavior("cache", InvalidBehavior::IgnoreUninitialized))
            .add_argument(Reference::new("legacy"));
        container
            .register("router", None)
            .add_method_call(MethodCall::new("setMatcher", [Value::reference("matcher")]))
            .unwrap();
        container.register("matcher", None);
        container.register("profiler", None);
        container.register("cache", None);
        container.register("legacy", None).set_deprecated("acme/legacy", "1.0", "").unwrap();
        container
            .register("old", None)
            .add_tag(HOT)
            .set_deprecated("acme/old", "1.0", "")
            .unwrap();
        analyze(&mut container);

        ResolveHotPathPass::default().process(&mut container).unwrap();

        let hot = |id: &str| container.definition(id).unwrap().has_tag(HOT);
        assert!(hot("kernel") && hot("router") && hot("matcher"));
        assert!(!hot("profiler") && !hot("cache") && !hot("legacy") && !hot("old"));
    }

    #[test]
    fn unreachable_services_are_not_preloaded() {
        let mut container = ContainerBuilder::new();
        container
            .register("app", None)
            .set_public(true)
            .add_argument(Argument::service_closure(Reference::new("lazy")))
            .add_argument(Reference::with_behavior("weak", InvalidBehavior::IgnoreUninitialized))
            .add_argument(Reference::new("opted_out"));
        container.register("lazy", None);
        container.register("weak", None);
        container
            .register("opted_out", None)
            .add_tag(NO_PRELOAD)
            .add_argument(Reference::new("behind"));
        container.register("behind", None);
        container.register("aliased", None);
        container.set_alias("public_alias", Alias::public("aliased")).unwrap();
        container.register("broken", None).add_error("broken");
        analyze(&mut container);

        ResolveNoPreloadPass::default().process(&mut container).unwrap();

        let skipped = |id: &str| container.definition(id).unwrap().has_tag(NO_PRELOAD);
        assert!(!skipped("app") && !skipped("lazy") && !skipped("aliased") && !skipped("broken"));
        assert!(skipped("weak") && skipped("opted_out") && skipped("behind"));
    }
}
