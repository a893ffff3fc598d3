use criterion::{black_box, criterion_group, criterion_main, Criterion};
use peerdns::config::ResolverConfig;
use peerdns::dns::literal::classify;
use peerdns::dns::{DnsResolver, ResolveOptions};

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    let inputs = vec![
        "192.0.2.1",
        "2001:db8::1",
        "[2001:db8::1]",
        "fe80::1%wlan0",
        "vpn.example.com",
        "a-long-label.peers.tunnel.example.net",
    ];

    group.bench_function("classify_mixed_inputs", |b| {
        b.iter(|| {
            for input in &inputs {
                let _ = black_box(classify(black_box(input)));
            }
        });
    });

    group.finish();
}

/// Literal resolution never leaves the process; this measures the fixed
/// overhead of the full resolver entry point.
fn bench_resolve_literal(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let resolver = DnsResolver::new(ResolverConfig::default()).unwrap();

    c.bench_function("resolve_literal", |b| {
        b.to_async(&runtime).iter(|| async {
            let options = ResolveOptions::new();
            black_box(resolver.resolve("192.0.2.1", options).await.unwrap())
        })
    });
}

criterion_group!(benches, bench_classify, bench_resolve_literal);
criterion_main!(benches);
