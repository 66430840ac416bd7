use std::hint::black_box;

use codspeed_criterion_compat::{
    BenchmarkId, Criterion, Throughput, criterion_group, criterion_main,
};
use loam_parse::Builder;
use loam_parse::calc::{self, CalcGrammar};

fn source(statements: usize) -> String {
    (0..statements)
        .map(|i| format!("let v{i} = (v{i} + {i}) * [1, 2, {i}] - {{ v{i}; {i}; }}; // step {i}\n"))
        .collect()
}

fn benchmark_builder(c: &mut Criterion) {
    let inputs = [("Small", source(10)), ("Large", source(1000))];

    let mut group = c.benchmark_group("Builder Benchmark");

    for (name, text) in &inputs {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("light_tree", name), text, |b, text| {
            b.iter(|| {
                let mut builder = Builder::new(text, &CalcGrammar).unwrap();
                calc::parse(&mut builder);
                let tree = builder.light_tree().unwrap();
                black_box(tree.root().children().unwrap().len());
            });
        });
        group.bench_with_input(BenchmarkId::new("build_tree", name), text, |b, text| {
            b.iter(|| {
                let mut builder = Builder::new(text, &CalcGrammar).unwrap();
                calc::parse(&mut builder);
                black_box(builder.build_tree().unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_builder);
criterion_main!(benches);
