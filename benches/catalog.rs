use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use ziptie_schema::{network_registry, Attributes, ClassificationCache, Value};

fn address_attrs(i: u32) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(
        "address".to_string(),
        Value::from(format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff)),
    );
    attrs.insert("asn".to_string(), Value::Int(i64::from(i)));
    attrs
}

fn bench_create_node(c: &mut Criterion) {
    let registry = network_registry().expect("network registry");
    let inputs: Vec<Attributes> = (0..256).map(address_attrs).collect();

    let mut group = c.benchmark_group("create_node");
    group.throughput(Throughput::Elements(inputs.len() as u64));
    group.bench_function("classify_and_build_256", |b| {
        b.iter(|| {
            for attrs in &inputs {
                let node = registry.create_node("IPAddress", attrs.clone()).expect("node");
                criterion::black_box(node.node_id().len());
            }
        });
    });
    group.finish();
}

fn bench_classification_cache(c: &mut Criterion) {
    let registry = network_registry().expect("network registry");
    let cache = ClassificationCache::new(1024);
    let inputs: Vec<Attributes> = (0..256).map(address_attrs).collect();

    c.bench_function("classification_cache_hit_256", |b| {
        b.iter(|| {
            for attrs in &inputs {
                let schema = cache.classify(&registry, "IPAddress", attrs).expect("classify");
                criterion::black_box(schema.class_name.len());
            }
        });
    });
}

fn bench_merge(c: &mut Criterion) {
    let registry = network_registry().expect("network registry");
    let a = registry.create_node("IPAddress", address_attrs(7)).expect("node");
    let b = registry.create_node("IPAddress", address_attrs(7)).expect("node");

    c.bench_function("merge_ip_nodes", |bench| {
        bench.iter(|| criterion::black_box(a.merge(&b).expect("merge")));
    });
}

fn bench_best_match(c: &mut Criterion) {
    let registry = network_registry().expect("network registry");
    c.bench_function("best_match_three_labels", |b| {
        b.iter(|| {
            criterion::black_box(
                registry
                    .best_match(["PublicIPAddress", "IPAddress", "IPv4Address"])
                    .expect("match"),
            )
        });
    });
}

fn bench_records(c: &mut Criterion) {
    let registry = network_registry().expect("network registry");
    let node = registry.create_node("IPAddress", address_attrs(42)).expect("node");

    c.bench_function("to_record_and_back", |b| {
        b.iter(|| {
            let record = node.to_record(true);
            criterion::black_box(registry.node_from_record(&record).expect("rebuild"))
        });
    });
}

criterion_group!(
    benches,
    bench_create_node,
    bench_classification_cache,
    bench_merge,
    bench_best_match,
    bench_records
);
criterion_main!(benches);
