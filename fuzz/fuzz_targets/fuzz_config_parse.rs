#![no_main]

use engine_defaults::config::{ConfigValidator, DefaultsValidator};
use engine_defaults::{resolve, Config, ServiceDefaults};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = Config::from_toml(text) else {
        return;
    };

    let _ = DefaultsValidator.validate(&config);

    let service = config.default_service.clone();
    let layers = config.layers_with(service.as_deref(), &[]);
    if let Ok(resolved) = resolve(&ServiceDefaults::new(), &layers) {
        assert!(!resolved.engine().is_empty());
        assert!(!resolved.url().is_empty());
    }
});
