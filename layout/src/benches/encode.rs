use criterion::{criterion_group, BatchSize, Criterion};

fn bench_encode(c: &mut Criterion) {
    let schema = super::image();
    for count in [16, 1 << 10, 1 << 14] {
        let tree = schema.decode(&super::image_buffer(count), 0).unwrap();
        c.bench_function(
            &format!("{}/fn=encode pixels={count}", module_path!()),
            |b| {
                b.iter_batched(
                    || tree.clone(),
                    |tree| schema.encode(tree).unwrap(),
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_encode,
}
