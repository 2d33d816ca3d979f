use criterion::{black_box, criterion_group, criterion_main, Criterion};
use engine_defaults::{resolve, Config, ServiceDefaults};

fn layer_chain(depth: usize) -> Vec<ServiceDefaults> {
    let mut layers: Vec<ServiceDefaults> = (0..depth).map(|_| ServiceDefaults::new()).collect();
    layers.push(
        ServiceDefaults::new()
            .with_engine("gpt-4o-mini")
            .with_url("https://api.openai.com/v1"),
    );
    layers
}

fn bench_resolve(c: &mut Criterion) {
    let empty = ServiceDefaults::new();
    let explicit = ServiceDefaults::new()
        .with_engine("explicit")
        .with_url("https://explicit.example");

    let shallow = layer_chain(1);
    c.bench_function("resolve_override_wins", |b| {
        b.iter(|| resolve(black_box(&explicit), black_box(&shallow)))
    });

    let deep = layer_chain(32);
    c.bench_function("resolve_deep_fallback", |b| {
        b.iter(|| resolve(black_box(&empty), black_box(&deep)))
    });

    let config = Config::from_toml(
        "default_service = \"openai\"\n\n[services.openai]\nengine = \"gpt-4o\"\n",
    )
    .expect("bench config should parse");
    c.bench_function("config_layers_and_resolve", |b| {
        b.iter(|| {
            let layers = config.layers_with(black_box(Some("openai")), &[]);
            resolve(&empty, &layers)
        })
    });
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
