use commonware_layout::Config;
use criterion::{criterion_group, Criterion};
use std::hint::black_box;

fn bench_decode(c: &mut Criterion) {
    let schema = super::image();
    for count in [16, 1 << 10, 1 << 14] {
        let buf = super::image_buffer(count);
        c.bench_function(
            &format!("{}/fn=decode pixels={count}", module_path!()),
            |b| {
                b.iter(|| schema.decode(black_box(&buf), 0).unwrap());
            },
        );
        c.bench_function(
            &format!("{}/fn=report pixels={count}", module_path!()),
            |b| {
                b.iter(|| {
                    schema
                        .report(black_box(&buf), 0, Config::monitored())
                        .unwrap()
                });
            },
        );
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_decode,
}
