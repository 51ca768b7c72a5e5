//! Benchmark for host port allocation and hypervisor sampling

use controlplane_operator::{
    Hypervisor, HypervisorRegistry, Node, PortRange, Role, APISERVER_RESOURCE,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bench_request_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_allocation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("request_and_release", |b| {
        let hypervisor = Hypervisor::new("hv-0", "", PortRange::default());
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            let node = format!("node-{}", counter);
            let _ = hypervisor.request_port(black_box("c1"), &node, APISERVER_RESOURCE);
            hypervisor.release_port("c1", &node, APISERVER_RESOURCE);
        });
    });

    group.finish();
}

fn bench_request_half_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_allocation");
    group.throughput(Throughput::Elements(1));

    // Pre-reserve half of the default range
    let hypervisor = Hypervisor::new("hv-0", "", PortRange::default());
    let half = PortRange::default().len() / 2;
    for i in 0..half {
        let _ = hypervisor.request_port("c0", &format!("node-{:05}", i), APISERVER_RESOURCE);
    }

    group.bench_function("request_half_full", |b| {
        b.iter(|| {
            let _ = hypervisor.request_port(black_box("c1"), "probe", APISERVER_RESOURCE);
            hypervisor.release_port("c1", "probe", APISERVER_RESOURCE);
        });
    });

    group.finish();
}

fn bench_concurrent_requests(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_allocation");
    group.throughput(Throughput::Elements(100));

    let hypervisor = Hypervisor::new("hv-0", "", PortRange::default());

    group.bench_function("concurrent_100_requests", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for t in 0..4 {
                    let hypervisor = &hypervisor;
                    scope.spawn(move || {
                        for i in 0..25 {
                            let _ = hypervisor.request_port("c1", &format!("n-{}-{}", t, i), "etcd");
                        }
                    });
                }
            });
            for t in 0..4 {
                for i in 0..25 {
                    hypervisor.release_port("c1", &format!("n-{}-{}", t, i), "etcd");
                }
            }
        });
    });

    group.finish();
}

fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("hypervisor_registry");
    group.throughput(Throughput::Elements(1));

    let registry = HypervisorRegistry::with_rng(StdRng::seed_from_u64(7));
    for i in 0..100 {
        let _ = registry.insert(Hypervisor::new(
            format!("hv-{:03}", i),
            "",
            PortRange::default(),
        ));
    }

    group.bench_function("sample_100", |b| {
        b.iter(|| {
            let _ = black_box(registry.sample());
        });
    });

    group.bench_function("create_node_with_random_hypervisor", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let name = format!("node-{}", counter);
            if let Ok(node) =
                Node::create_with_random_hypervisor("c1", &name, Role::ControlPlane, &registry)
            {
                if let Some(hypervisor) = registry.get(node.hypervisor_name()) {
                    node.release_ports(&hypervisor);
                }
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_request_release,
    bench_request_half_full,
    bench_concurrent_requests,
    bench_sample,
);
criterion_main!(benches);
