/// Property-based tests for pass ordering.
///
/// Within a phase, passes run by descending priority; equal priorities keep
/// their registration order. Phases never interleave.
use ferrous_container::{CompileResult, Compiler, CompilerPass, ContainerBuilder, PassConfig, PassPhase};
use proptest::prelude::*;

const NAMES: [&str; 10] = ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9"];

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

fn phase(index: usize) -> PassPhase {
    PassPhase::ALL[index % PassPhase::ALL.len()]
}

proptest! {
    #[test]
    fn equal_priorities_keep_registration_order(priorities in prop::collection::vec(-3i32..3, 1..10)) {
        let mut config = PassConfig::empty();
        for (i, priority) in priorities.iter().enumerate() {
            config.add_pass(Box::new(Named(NAMES[i])), PassPhase::Optimization, *priority);
        }

        let mut expected: Vec<usize> = (0..priorities.len()).collect();
        expected.sort_by_key(|&i| std::cmp::Reverse(priorities[i]));
        let expected: Vec<&str> = expected.into_iter().map(|i| NAMES[i]).collect();

        prop_assert_eq!(config.pass_names(PassPhase::Optimization), expected);
    }

    #[test]
    fn execution_follows_phases_then_priorities(passes in prop::collection::vec((0usize..6, -3i32..3), 1..10)) {
        let mut compiler = Compiler::with_passes(PassConfig::empty());
        for (i, (slot, priority)) in passes.iter().enumerate() {
            compiler.add_pass(Box::new(Named(NAMES[i])), phase(*slot), *priority);
        }
        let mut container = ContainerBuilder::new();
        compiler.compile(&mut container).unwrap();

        let mut expected: Vec<usize> = (0..passes.len()).collect();
        expected.sort_by_key(|&i| (passes[i].0, std::cmp::Reverse(passes[i].1)));
        let expected: Vec<String> = expected.into_iter().map(|i| format!("{}: ran", NAMES[i])).collect();

        prop_assert_eq!(container.log_entries(), expected.as_slice());
        prop_assert_eq!(compiler.pass_config().all_pass_names().len(), passes.len());
    }
}
