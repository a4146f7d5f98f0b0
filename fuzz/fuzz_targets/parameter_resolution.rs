#![no_main]

use ferrous_container::{ContainerBuilder, ParameterBag, Value};
use libfuzzer_sys::fuzz_target;

// Arbitrary text split on NUL bytes becomes parameters p0..pN, so placeholders,
// escapes and self references all show up. Resolution must never panic.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut bag = ParameterBag::new();
    for (i, part) in text.split('\0').take(16).enumerate() {
        bag.set(format!("p{}", i), part);
    }
    let _ = bag.clone().resolve();

    let mut container = ContainerBuilder::new();
    for (name, value) in bag.all() {
        container.set_parameter(name, value.clone());
    }
    container
        .register("service", Some("App\\Service"))
        .set_public(true)
        .add_argument(Value::from(text));
    let _ = container.compile();
});
