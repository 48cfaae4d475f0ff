use concierge::prelude::*;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Matcher throughput over every label and capability
fn bench_matcher(c: &mut Criterion) {
    let capabilities = ["000", "100", "010", "001", "110", "101", "011", "111"];

    c.bench_function("capability_match_all_labels", |b| {
        b.iter(|| {
            let mut granted = 0;
            for label in PermissionLabel::ALL {
                for capability in capabilities {
                    if concierge::core::matches(black_box(label), black_box(capability))
                        .unwrap_or(false)
                    {
                        granted += 1;
                    }
                }
            }
            granted
        });
    });

    c.bench_function("capability_parse", |b| {
        b.iter(|| Capability::parse(black_box("101")));
    });
}

/// Full evaluation against the in-memory store
fn bench_evaluator(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = MemoryStore::new();

    rt.block_on(async {
        SchemaBootstrap::from_config(Arc::new(store.clone()), &ConciergeConfig::development())
            .run(true)
            .await
            .unwrap();
        Registry::new(Arc::new(store.clone()))
            .register_process(
                "admin",
                SITE_GROUP,
                &ProcessSpec {
                    name: "deploy".to_string(),
                    run_command: "./deploy.sh".to_string(),
                    kill_command: "pkill deploy".to_string(),
                },
            )
            .await
            .unwrap();
    });

    let evaluator = PermissionEvaluator::new(Arc::new(store));

    c.bench_function("has_permission_granted", |b| {
        b.iter(|| {
            rt.block_on(async {
                evaluator
                    .has_permission("admin", SITE_GROUP, ADMIN_ROLE, "deploy", PermissionLabel::ReadExecute)
                    .await
                    .is_ok()
            })
        });
    });

    c.bench_function("has_permission_denied_at_role", |b| {
        b.iter(|| {
            rt.block_on(async {
                evaluator
                    .has_permission("test1", SITE_GROUP, ADMIN_ROLE, "deploy", PermissionLabel::Read)
                    .await
                    .is_err()
            })
        });
    });
}

criterion_group!(benches, bench_matcher, bench_evaluator);
criterion_main!(benches);
