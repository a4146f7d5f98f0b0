#![no_main]

use ferrous_container::{Argument, ContainerBuilder, InvalidBehavior, Reference, Value};
use libfuzzer_sys::fuzz_target;

// Each 4-byte chunk describes one service: flags, two used ids and the kind
// of the second reference. Compilation may fail but must never panic, and a
// successful compilation leaves no reference to a missing service.
fuzz_target!(|data: &[u8]| {
    let chunks: Vec<&[u8]> = data.chunks_exact(4).take(32).collect();
    if chunks.is_empty() {
        return;
    }
    let count = chunks.len();

    let mut container = ContainerBuilder::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let flags = chunk[0];
        let definition = container.register(&format!("s{}", i), Some("App\\Service"));
        definition
            .set_public(flags & 0x01 != 0)
            .set_shared(flags & 0x02 == 0)
            .set_lazy(flags & 0x04 != 0)
            .set_abstract(flags & 0x08 != 0 && flags & 0x01 == 0);
        if flags & 0x10 != 0 {
            definition.add_tag("container.hot_path");
        }

        let first = format!("s{}", chunk[1] as usize % (count + 1));
        definition.add_argument(Reference::new(first));

        let second = format!("s{}", chunk[2] as usize % (count + 1));
        let value: Value = match chunk[3] % 5 {
            0 => Reference::new(second).into(),
            1 => Reference::with_behavior(second, InvalidBehavior::Null).into(),
            2 => Reference::with_behavior(second, InvalidBehavior::Ignore).into(),
            3 => Argument::service_closure(Reference::new(second)).into(),
            _ => Reference::with_behavior(second, InvalidBehavior::RuntimeException).into(),
        };
        definition.add_argument(value);

        if flags & 0x20 != 0 {
            let _ = container.set_alias(&format!("alias{}", i), format!("s{}", i).as_str());
        }
    }

    if container.compile().is_ok() {
        for definition in container.definitions().values() {
            for argument in definition.arguments().values() {
                if let Some(reference) = argument.as_reference() {
                    if reference.invalid_behavior() == InvalidBehavior::Exception {
                        assert!(container.has(reference.id()));
                    }
                }
            }
        }
    }
});
