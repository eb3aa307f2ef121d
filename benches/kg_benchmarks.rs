use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kgstore::{EntityId, KgStorage, LabelRegistry, RelationId, TripleStore};
use tempfile::TempDir;

fn entity(i: usize) -> EntityId {
    EntityId::parse(format!("Q{}", i)).unwrap()
}

fn relation(i: usize) -> RelationId {
    RelationId::parse(format!("P{}", i)).unwrap()
}

/// Benchmark add_triple throughput inside one transaction
fn bench_add_triple(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_triple");
    group.sample_size(10);

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let storage = KgStorage::open_path(dir.path()).unwrap();
                let mut conn = storage.connect().unwrap();
                let triples = TripleStore::new(&conn);
                for i in 0..size {
                    triples
                        .add_triple(&entity(i), &relation(i % 10), &[entity(i + 1)], false)
                        .unwrap();
                }
                conn.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark cascading delete of subjects with fan-out
fn bench_remove_subject(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_subject");
    group.sample_size(10);

    for fan_out in [10, 100].iter() {
        let dir = TempDir::new().unwrap();
        let storage = KgStorage::open_path(dir.path()).unwrap();
        let mut conn = storage.connect().unwrap();
        let objects: Vec<EntityId> = (0..*fan_out).map(|i| entity(1000 + i)).collect();
        for r in 0..5 {
            TripleStore::new(&conn)
                .add_triple(&entity(1), &relation(r), &objects, false)
                .unwrap();
        }
        conn.commit().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(fan_out), fan_out, |b, _| {
            b.iter(|| {
                let summary = TripleStore::new(&conn).remove_subject(&entity(1)).unwrap();
                criterion::black_box(summary);
                conn.abort().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark inverse index rebuild
fn bench_invert_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("invert_labels");
    group.sample_size(10);

    for size in [1000, 10_000].iter() {
        let dir = TempDir::new().unwrap();
        let storage = KgStorage::open_path(dir.path()).unwrap();
        let mut conn = storage.connect().unwrap();
        {
            let labels = LabelRegistry::new(&conn);
            for i in 0..*size {
                let label = format!("Entity{}", i);
                labels.add_label(&entity(i).into(), Some(label.as_str())).unwrap();
            }
        }
        conn.commit().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                criterion::black_box(LabelRegistry::new(&conn).invert_labels().unwrap());
                conn.abort().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add_triple, bench_remove_subject, bench_invert_labels);
criterion_main!(benches);
